//! Ride message rendering
//!
//! Turns a ride and its participation into the HTML text and inline
//! keyboard posted to every chat that shows the ride.

use crate::fields::{format_date, format_distance, format_duration, format_speed};
use crate::ride::{Participation, ParticipationState, Ride, RIDE_ID_LEN};
use crate::transport::{InlineButton, Keyboard, OutgoingMessage, MAX_MESSAGE_LENGTH};
use regex::Regex;
use std::fmt::Write as _;
use std::sync::LazyLock;

/// Appended to text cut at the message length limit
pub const TRUNCATION_MARKER: &str = "\n…(truncated)";

/// Room kept for closing tags of a cut message
const CLOSING_TAG_RESERVE: usize = 24;

static TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<(/?)([a-z]+)[^>]*>").expect("invalid tag pattern"));

static RIDE_REF_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"#Ride #([0-9A-Za-z]{{{RIDE_ID_LEN}}})\b")).expect("invalid ride ref pattern")
});

/// Rendering variant
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderOptions {
    /// Adds management hints meant for the ride creator
    pub for_creator: bool,
}

/// Formats a ride for the chat; must be pure and deterministic
pub trait RideRenderer: Send + Sync {
    fn render(
        &self,
        ride: &Ride,
        participation: &Participation,
        options: RenderOptions,
    ) -> OutgoingMessage;
}

/// Default HTML renderer
#[derive(Debug, Clone, Copy, Default)]
pub struct HtmlRenderer;

impl RideRenderer for HtmlRenderer {
    fn render(
        &self,
        ride: &Ride,
        participation: &Participation,
        options: RenderOptions,
    ) -> OutgoingMessage {
        let text = truncate_html(&ride_text(ride, participation, options), MAX_MESSAGE_LENGTH);
        OutgoingMessage {
            text,
            keyboard: participation_keyboard(ride),
        }
    }
}

fn ride_text(ride: &Ride, participation: &Participation, options: RenderOptions) -> String {
    let d = &ride.details;
    let mut out = String::new();

    if ride.cancelled {
        out.push_str("❌ <b>CANCELLED</b> ❌\n");
        let _ = writeln!(out, "<s><b>{}</b></s>", escape_html(&d.title));
    } else {
        let _ = writeln!(out, "<b>{}</b>", escape_html(&d.title));
    }
    let _ = writeln!(out, "🚵 {}", escape_html(d.category.label()));
    out.push('\n');

    let _ = writeln!(out, "📅 When: {}", format_date(d.date));
    if let Some(organizer) = &d.organizer {
        let _ = writeln!(out, "👤 Organizer: {}", escape_html(organizer));
    }
    if let Some(meeting_point) = &d.meeting_point {
        let _ = writeln!(out, "📍 Meeting point: {}", escape_html(meeting_point));
    }
    if let Some(route) = &d.route_link {
        let _ = writeln!(
            out,
            "🗺 Route: <a href=\"{}\">{}</a>",
            escape_html(route),
            escape_html(&route_label(route))
        );
    }
    if let Some(km) = d.distance_km {
        let _ = writeln!(out, "📏 Distance: {}", format_distance(km));
    }
    if let Some(minutes) = d.duration_min {
        let _ = writeln!(out, "⏱ Duration: {}", format_duration(minutes));
    }
    if d.speed_min.is_some() || d.speed_max.is_some() {
        let _ = writeln!(out, "🚴 Speed: {}", format_speed(d.speed_min, d.speed_max));
    }
    if let Some(info) = &d.info {
        let _ = writeln!(out, "\nℹ️ {}", escape_html(info));
    }

    out.push('\n');
    for state in ParticipationState::ALL {
        let members = participation.set(state);
        let names: Vec<String> = members
            .iter()
            .map(|p| escape_html(&p.profile.display_name()))
            .collect();
        let list = if names.is_empty() {
            "—".to_string()
        } else {
            names.join(", ")
        };
        let _ = writeln!(out, "{} ({}): {list}", state_heading(state), members.len());
    }

    let _ = write!(out, "\n🎫 #Ride #{}", ride.id);
    if options.for_creator {
        out.push_str(
            "\n\n<i>Reply to this message with /updateride, /cancelride, /dupride or /deleteride to manage the ride</i>",
        );
    }
    out
}

fn state_heading(state: ParticipationState) -> &'static str {
    match state {
        ParticipationState::Joined => "🚴 Joined",
        ParticipationState::Thinking => "🤔 Thinking",
        ParticipationState::Skipped => "🙅 Not interested",
    }
}

/// Host part of a route link, used as its visible label
fn route_label(url: &str) -> String {
    url.split("://")
        .nth(1)
        .and_then(|rest| rest.split('/').next())
        .map_or_else(|| url.to_string(), |host| host.trim_start_matches("www.").to_string())
}

fn participation_keyboard(ride: &Ride) -> Keyboard {
    if ride.cancelled {
        return Keyboard::new();
    }
    Keyboard::new().row(vec![
        InlineButton::callback(
            "✅ Join",
            participation_callback(ParticipationState::Joined, &ride.id),
        ),
        InlineButton::callback(
            "🤔 Maybe",
            participation_callback(ParticipationState::Thinking, &ride.id),
        ),
        InlineButton::callback(
            "🙅 Pass",
            participation_callback(ParticipationState::Skipped, &ride.id),
        ),
    ])
}

fn callback_verb(state: ParticipationState) -> &'static str {
    match state {
        ParticipationState::Joined => "join",
        ParticipationState::Thinking => "think",
        ParticipationState::Skipped => "skip",
    }
}

/// Callback data of a participation button: `join:<id>`, `think:<id>` or `skip:<id>`
pub fn participation_callback(state: ParticipationState, ride_id: &str) -> String {
    format!("{}:{ride_id}", callback_verb(state))
}

pub fn parse_participation_callback(data: &str) -> Option<(ParticipationState, &str)> {
    let (verb, ride_id) = data.split_once(':')?;
    let state = ParticipationState::ALL
        .into_iter()
        .find(|&state| callback_verb(state) == verb)?;
    (!ride_id.is_empty()).then_some((state, ride_id))
}

/// Ride id embedded in a rendered ride message
pub fn extract_ride_id(text: &str) -> Option<String> {
    RIDE_REF_RE
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            other => out.push(other),
        }
    }
    out
}

/// Cut HTML text to `max` characters without leaving a broken tag, entity
/// or unclosed element behind
pub fn truncate_html(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }

    let budget = max.saturating_sub(TRUNCATION_MARKER.chars().count() + CLOSING_TAG_RESERVE);
    let mut cut: String = text.chars().take(budget).collect();

    if let Some(lt) = cut.rfind('<') {
        if cut.get(lt..).is_some_and(|tail| !tail.contains('>')) {
            cut.truncate(lt);
        }
    }
    if let Some(amp) = cut.rfind('&') {
        if cut.get(amp..).is_some_and(|tail| !tail.contains(';')) {
            cut.truncate(amp);
        }
    }

    let mut open: Vec<String> = Vec::new();
    for caps in TAG_RE.captures_iter(&cut) {
        let name = caps[2].to_string();
        if caps[1].is_empty() {
            open.push(name);
        } else if let Some(pos) = open.iter().rposition(|t| *t == name) {
            open.remove(pos);
        }
    }

    let mut out = cut;
    for tag in open.iter().rev() {
        let _ = write!(out, "</{tag}>");
    }
    out.push_str(TRUNCATION_MARKER);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ride::{Participant, RideCategory, RideDetails, UserProfile};
    use chrono::{Duration, Utc};
    use proptest::prelude::*;

    fn ride(title: &str) -> Ride {
        let now = Utc::now();
        Ride {
            id: "AbCdEfGhIjK".into(),
            details: RideDetails {
                title: title.into(),
                category: RideCategory::Gravel,
                organizer: Some("Ann <Fast> & Co".into()),
                date: now + Duration::days(1),
                meeting_point: Some("Bridge".into()),
                route_link: Some("https://www.komoot.com/tour/1".into()),
                distance_km: Some(60.0),
                duration_min: Some(180),
                speed_min: Some(22.0),
                speed_max: Some(26.0),
                info: None,
            },
            cancelled: false,
            created_by: 1,
            updated_by: None,
            created_at: now,
            updated_at: now,
            messages: vec![],
            participation: Participation::default(),
        }
    }

    fn joined(user_id: i64, name: &str) -> Participation {
        Participation {
            joined: vec![Participant {
                profile: UserProfile::new(user_id).with_name(name, None),
                updated_at: Utc::now(),
            }],
            ..Participation::default()
        }
    }

    #[test]
    fn test_render_contains_details_and_ride_ref() {
        let ride = ride("Gravel Sunday");
        let msg = HtmlRenderer.render(&ride, &joined(7, "Sam"), RenderOptions::default());

        assert!(msg.text.starts_with("<b>Gravel Sunday</b>"));
        assert!(msg.text.contains("Ann &lt;Fast&gt; &amp; Co"));
        assert!(msg.text.contains("<a href=\"https://www.komoot.com/tour/1\">komoot.com</a>"));
        assert!(msg.text.contains("📏 Distance: 60 km"));
        assert!(msg.text.contains("⏱ Duration: 3h"));
        assert!(msg.text.contains("🚴 Speed: 22-26 km/h"));
        assert!(msg.text.contains("🚴 Joined (1): Sam"));
        assert!(msg.text.contains("🤔 Thinking (0): —"));
        assert_eq!(extract_ride_id(&msg.text).as_deref(), Some("AbCdEfGhIjK"));
        assert_eq!(
            msg.keyboard.callbacks(),
            vec!["join:AbCdEfGhIjK", "think:AbCdEfGhIjK", "skip:AbCdEfGhIjK"]
        );
    }

    #[test]
    fn test_render_is_deterministic() {
        let ride = ride("Same");
        let participation = joined(3, "Kim");
        let a = HtmlRenderer.render(&ride, &participation, RenderOptions::default());
        let b = HtmlRenderer.render(&ride, &participation, RenderOptions::default());
        assert_eq!(a, b);
    }

    #[test]
    fn test_cancelled_ride_has_banner_and_no_buttons() {
        let mut ride = ride("Called off");
        ride.cancelled = true;
        let msg = HtmlRenderer.render(&ride, &Participation::default(), RenderOptions::default());
        assert!(msg.text.contains("CANCELLED"));
        assert!(msg.keyboard.is_empty());
    }

    #[test]
    fn test_creator_variant_adds_hints() {
        let ride = ride("Mine");
        let plain = HtmlRenderer.render(&ride, &Participation::default(), RenderOptions::default());
        let creator = HtmlRenderer.render(
            &ride,
            &Participation::default(),
            RenderOptions { for_creator: true },
        );
        assert!(!plain.text.contains("/updateride"));
        assert!(creator.text.contains("/updateride"));
    }

    #[test]
    fn test_long_title_is_truncated_with_marker() {
        let mut ride = ride(&"x".repeat(2000));
        ride.details.info = Some("y".repeat(3000));
        let msg = HtmlRenderer.render(&ride, &Participation::default(), RenderOptions::default());

        assert!(msg.text.chars().count() <= MAX_MESSAGE_LENGTH);
        assert!(msg.text.ends_with(TRUNCATION_MARKER));
    }

    #[test]
    fn test_truncate_closes_open_tags_and_drops_partial_entities() {
        let text = format!("<b>{}&amp;</b>", "a".repeat(100));
        let cut = truncate_html(&text, 80);
        assert!(cut.ends_with(&format!("</b>{TRUNCATION_MARKER}")));
        assert!(!cut.contains("&am"));
        assert!(cut.chars().count() <= 80);
    }

    #[test]
    fn test_extract_ride_id_ignores_other_text() {
        assert_eq!(extract_ride_id("no ride here"), None);
        assert_eq!(extract_ride_id("🎫 #Ride #short"), None);
    }

    #[test]
    fn test_parse_participation_callback() {
        assert_eq!(
            parse_participation_callback("think:AbCdEfGhIjK"),
            Some((ParticipationState::Thinking, "AbCdEfGhIjK"))
        );
        assert_eq!(parse_participation_callback("join:"), None);
        assert_eq!(parse_participation_callback("wiz:back"), None);
    }

    proptest! {
        #[test]
        fn prop_rendered_text_never_exceeds_limit(
            title in "[a-zA-Z<>& ]{1,3000}",
            info in proptest::option::of("[a-z&<> ]{0,3000}"),
        ) {
            let mut ride = ride(&title);
            ride.details.info = info;
            let msg = HtmlRenderer.render(&ride, &Participation::default(), RenderOptions { for_creator: true });
            prop_assert!(msg.text.chars().count() <= MAX_MESSAGE_LENGTH);
        }
    }
}
