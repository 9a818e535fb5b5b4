//! Ride fields and their validators
//!
//! The wizard and the parameter commands both parse raw user text through
//! [`Field::parse`], so `-`, blanks and malformed values are treated the
//! same way no matter how a ride is edited.

pub mod date;

use crate::ride::RideCategory;
use chrono::{DateTime, Local, TimeZone, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;
use thiserror::Error;

/// Literal input that erases a clearable field
pub const CLEAR_TOKEN: &str = "-";

const MAX_DISTANCE_KM: f64 = 1000.0;
const MAX_SPEED_KMH: f64 = 100.0;
const MAX_DURATION_MIN: u32 = 48 * 60;

static DURATION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?:(?P<h>\d+(?:[.,]\d+)?)\s*h(?:ours?|rs?)?)?\s*(?:(?P<m>\d+)\s*m(?:in(?:utes?|s)?)?)?$",
    )
    .expect("invalid duration pattern")
});

static CLOCK_DURATION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?P<h>\d+):(?P<m>\d{2})$").expect("invalid h:mm pattern"));

static SPEED_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?P<min>\d+(?:[.,]\d+)?)?\s*(?P<sep>-|–|\+)?\s*(?P<max>\d+(?:[.,]\d+)?)?\s*(?:km/?h)?$",
    )
    .expect("invalid speed pattern")
});

/// User-facing validation failure; never leaves the step that produced it
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct FieldError {
    pub message: String,
}

impl FieldError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn missing(field: Field) -> Self {
        Self::new(format!("Missing required field: {}", field.label()))
    }
}

/// An editable ride field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    Title,
    Category,
    Organizer,
    Date,
    Route,
    Distance,
    Duration,
    Speed,
    MeetingPoint,
    Info,
}

impl Field {
    pub const ALL: [Field; 10] = [
        Field::Title,
        Field::Category,
        Field::Organizer,
        Field::Date,
        Field::Route,
        Field::Distance,
        Field::Duration,
        Field::Speed,
        Field::MeetingPoint,
        Field::Info,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Field::Title => "title",
            Field::Category => "category",
            Field::Organizer => "organizer",
            Field::Date => "date",
            Field::Route => "route",
            Field::Distance => "distance",
            Field::Duration => "duration",
            Field::Speed => "speed",
            Field::MeetingPoint => "meeting point",
            Field::Info => "additional info",
        }
    }

    pub fn kind(self) -> FieldKind {
        match self {
            Field::Title | Field::Organizer | Field::MeetingPoint | Field::Info => FieldKind::Text,
            Field::Category => FieldKind::Category,
            Field::Date => FieldKind::Date,
            Field::Route => FieldKind::Route,
            Field::Distance => FieldKind::Distance,
            Field::Duration => FieldKind::Duration,
            Field::Speed => FieldKind::Speed,
        }
    }

    pub fn is_required(self) -> bool {
        matches!(self, Field::Title | Field::Date)
    }

    /// Key used in `key: value` parameter blocks
    pub fn param_key(self) -> &'static str {
        match self {
            Field::Title => "title",
            Field::Category => "category",
            Field::Organizer => "organizer",
            Field::Date => "when",
            Field::Route => "route",
            Field::Distance => "dist",
            Field::Duration => "duration",
            Field::Speed => "speed",
            Field::MeetingPoint => "meet",
            Field::Info => "info",
        }
    }

    pub fn from_param_key(key: &str) -> Option<Field> {
        let key = key.trim().to_lowercase();
        let field = match key.as_str() {
            "title" => Field::Title,
            "category" | "type" => Field::Category,
            "organizer" => Field::Organizer,
            "when" | "date" => Field::Date,
            "route" => Field::Route,
            "dist" | "distance" => Field::Distance,
            "duration" | "time" => Field::Duration,
            "speed" => Field::Speed,
            "meet" | "meeting" | "meetingpoint" => Field::MeetingPoint,
            "info" => Field::Info,
            _ => return None,
        };
        Some(field)
    }

    /// Validate raw text for this field
    pub fn parse(self, raw: &str, now: DateTime<Local>) -> Result<FieldValue, FieldError> {
        match self.kind() {
            FieldKind::Text if self == Field::Title => parse_title(raw).map(FieldValue::Text),
            FieldKind::Text => parse_text(raw, self).map(FieldValue::Text),
            FieldKind::Category => parse_category(raw).map(FieldValue::Category),
            FieldKind::Date => parse_date(raw, now).map(FieldValue::Date),
            FieldKind::Route => parse_route(raw).map(FieldValue::Route),
            FieldKind::Distance => parse_distance(raw).map(FieldValue::Distance),
            FieldKind::Duration => parse_duration(raw).map(FieldValue::Duration),
            FieldKind::Speed => parse_speed(raw).map(|(min, max)| FieldValue::Speed { min, max }),
        }
    }
}

/// Shape of a field's value; selects the formatter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Category,
    Date,
    Route,
    Distance,
    Duration,
    Speed,
}

/// A parsed field value, tagged by kind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum FieldValue {
    Text(String),
    Category(RideCategory),
    Date(DateTime<Utc>),
    Route(String),
    Distance(f64),
    Duration(u32),
    Speed { min: Option<f64>, max: Option<f64> },
}

impl FieldValue {
    /// Plain-text rendering used in prompts and summaries
    pub fn display(&self) -> String {
        match self {
            FieldValue::Text(text) | FieldValue::Route(text) => text.clone(),
            FieldValue::Category(category) => category.label().to_string(),
            FieldValue::Date(date) => format_date(*date),
            FieldValue::Distance(km) => format_distance(*km),
            FieldValue::Duration(minutes) => format_duration(*minutes),
            FieldValue::Speed { min, max } => format_speed(*min, *max),
        }
    }
}

pub fn is_clear_token(raw: &str) -> bool {
    raw.trim() == CLEAR_TOKEN
}

// ============================================================================
// Validators
// ============================================================================

pub fn parse_title(raw: &str) -> Result<String, FieldError> {
    let title = raw.trim();
    if title.is_empty() {
        return Err(FieldError::new("Title cannot be empty"));
    }
    Ok(title.to_string())
}

fn parse_text(raw: &str, field: Field) -> Result<String, FieldError> {
    let text = raw.trim();
    if text.is_empty() {
        return Err(FieldError::new(format!(
            "Please enter the {} or use {CLEAR_TOKEN} to clear it",
            field.label()
        )));
    }
    Ok(text.to_string())
}

pub fn parse_category(raw: &str) -> Result<RideCategory, FieldError> {
    RideCategory::parse(raw).ok_or_else(|| {
        let known: Vec<&str> = RideCategory::ALL.iter().map(|c| c.key()).collect();
        FieldError::new(format!(
            "Unknown category. Choose one of: {}",
            known.join(", ")
        ))
    })
}

/// Parse a future date/time in the local zone
pub fn parse_date(raw: &str, now: DateTime<Local>) -> Result<DateTime<Utc>, FieldError> {
    let naive = date::parse_naive(raw, now.naive_local()).ok_or_else(|| {
        FieldError::new(
            "Could not understand that date. Try e.g. \"tomorrow 9am\" or \"2026-10-25 09:00\"",
        )
    })?;
    let local = Local
        .from_local_datetime(&naive)
        .earliest()
        .ok_or_else(|| FieldError::new("That time does not exist in the local time zone"))?;
    let date = local.with_timezone(&Utc);
    ensure_upcoming(date, now)?;
    Ok(date)
}

/// Reject ride dates earlier than `now`
pub fn ensure_upcoming(date: DateTime<Utc>, now: DateTime<Local>) -> Result<(), FieldError> {
    if date < now.with_timezone(&Utc) {
        return Err(FieldError::new("The ride date is in the past"));
    }
    Ok(())
}

pub fn parse_route(raw: &str) -> Result<String, FieldError> {
    let url = raw.trim();
    let rest = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"));
    match rest {
        Some(rest) if rest.contains('.') && !rest.contains(char::is_whitespace) => {
            Ok(url.to_string())
        }
        _ => Err(FieldError::new(
            "Please send a valid link starting with http:// or https://",
        )),
    }
}

fn parse_number(raw: &str) -> Option<f64> {
    raw.trim()
        .replace(',', ".")
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
}

pub fn parse_distance(raw: &str) -> Result<f64, FieldError> {
    let lowered = raw.trim().to_lowercase();
    let number = lowered
        .strip_suffix("km")
        .unwrap_or(&lowered)
        .trim();
    match parse_number(number) {
        Some(km) if km > 0.0 && km <= MAX_DISTANCE_KM => Ok(km),
        Some(_) => Err(FieldError::new(format!(
            "Distance must be between 0 and {MAX_DISTANCE_KM} km"
        ))),
        None => Err(FieldError::new("Please enter the distance in km, e.g. 42")),
    }
}

/// Duration in minutes: `90`, `90m`, `2h`, `2h 30m`, `1.5h` or `2:30`
pub fn parse_duration(raw: &str) -> Result<u32, FieldError> {
    let lowered = raw.trim().to_lowercase();
    let invalid = || FieldError::new("Please enter the duration, e.g. 90, 2h or 2h 30m");

    let minutes = if let Ok(plain) = lowered.parse::<u32>() {
        plain
    } else if let Some(caps) = CLOCK_DURATION_RE.captures(&lowered) {
        let hours: u32 = caps["h"].parse().map_err(|_| invalid())?;
        let mins: u32 = caps["m"].parse().map_err(|_| invalid())?;
        if mins >= 60 {
            return Err(invalid());
        }
        hours
            .checked_mul(60)
            .and_then(|h| h.checked_add(mins))
            .ok_or_else(invalid)?
    } else {
        let caps = DURATION_RE.captures(&lowered).ok_or_else(invalid)?;
        if caps.name("h").is_none() && caps.name("m").is_none() {
            return Err(invalid());
        }
        let hours = match caps.name("h") {
            Some(h) => parse_number(h.as_str()).ok_or_else(invalid)?,
            None => 0.0,
        };
        let mins: u32 = match caps.name("m") {
            Some(m) => m.as_str().parse().map_err(|_| invalid())?,
            None => 0,
        };
        let hour_minutes = (hours * 60.0).round();
        if hour_minutes > f64::from(MAX_DURATION_MIN) {
            return Err(invalid());
        }
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let hour_minutes = hour_minutes as u32;
        hour_minutes.checked_add(mins).ok_or_else(invalid)?
    };

    if minutes == 0 || minutes > MAX_DURATION_MIN {
        return Err(FieldError::new("Duration must be between 1 minute and 48 hours"));
    }
    Ok(minutes)
}

/// Speed range in km/h: `25-28`, `25+`, `-28` or a single `25`
pub fn parse_speed(raw: &str) -> Result<(Option<f64>, Option<f64>), FieldError> {
    let lowered = raw.trim().to_lowercase();
    let invalid = || FieldError::new("Please enter the speed, e.g. 25-28, 25+ or -28 (km/h)");
    let caps = SPEED_RE.captures(&lowered).ok_or_else(invalid)?;

    let min = caps.name("min").and_then(|m| parse_number(m.as_str()));
    let max = caps.name("max").and_then(|m| parse_number(m.as_str()));
    let sep = caps.name("sep").map(|m| m.as_str());

    let range = match (min, sep, max) {
        (Some(min), None, None) => (Some(min), Some(min)),
        (Some(min), Some("+"), None) => (Some(min), None),
        (Some(min), Some("-" | "–"), Some(max)) => (Some(min), Some(max)),
        (None, Some("-" | "–"), Some(max)) => (None, Some(max)),
        _ => return Err(invalid()),
    };

    for value in [range.0, range.1].into_iter().flatten() {
        if value <= 0.0 || value > MAX_SPEED_KMH {
            return Err(FieldError::new(format!(
                "Speed must be between 0 and {MAX_SPEED_KMH} km/h"
            )));
        }
    }
    if let (Some(min), Some(max)) = range {
        if min > max {
            return Err(FieldError::new("Minimum speed cannot exceed maximum speed"));
        }
    }
    Ok(range)
}

// ============================================================================
// Formatters
// ============================================================================

fn format_decimal(value: f64) -> String {
    let rounded = (value * 10.0).round() / 10.0;
    format!("{rounded}")
}

pub fn format_distance(km: f64) -> String {
    format!("{} km", format_decimal(km))
}

pub fn format_duration(minutes: u32) -> String {
    match (minutes / 60, minutes % 60) {
        (0, m) => format!("{m}m"),
        (h, 0) => format!("{h}h"),
        (h, m) => format!("{h}h {m}m"),
    }
}

pub fn format_speed(min: Option<f64>, max: Option<f64>) -> String {
    match (min, max) {
        (Some(min), Some(max)) if (min - max).abs() < f64::EPSILON => {
            format!("{} km/h", format_decimal(min))
        }
        (Some(min), Some(max)) => {
            format!("{}-{} km/h", format_decimal(min), format_decimal(max))
        }
        (Some(min), None) => format!("{}+ km/h", format_decimal(min)),
        (None, Some(max)) => format!("up to {} km/h", format_decimal(max)),
        (None, None) => String::new(),
    }
}

pub fn format_date(date: DateTime<Utc>) -> String {
    date.with_timezone(&Local)
        .format("%a, %d %b %Y at %H:%M")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_title_rejects_blank() {
        assert!(parse_title("").is_err());
        assert!(parse_title("   ").is_err());
        assert_eq!(parse_title("  Evening Ride ").unwrap(), "Evening Ride");
    }

    #[test]
    fn test_distance() {
        assert!((parse_distance("42").unwrap() - 42.0).abs() < f64::EPSILON);
        assert!((parse_distance("42,5 km").unwrap() - 42.5).abs() < f64::EPSILON);
        assert!(parse_distance("0").is_err());
        assert!(parse_distance("far").is_err());
        assert!(parse_distance("5000").is_err());
    }

    #[test]
    fn test_duration_forms() {
        assert_eq!(parse_duration("90"), Ok(90));
        assert_eq!(parse_duration("90m"), Ok(90));
        assert_eq!(parse_duration("90 min"), Ok(90));
        assert_eq!(parse_duration("2h"), Ok(120));
        assert_eq!(parse_duration("2h 30m"), Ok(150));
        assert_eq!(parse_duration("2 hours 15 minutes"), Ok(135));
        assert_eq!(parse_duration("1.5h"), Ok(90));
        assert_eq!(parse_duration("2:30"), Ok(150));
        assert!(parse_duration("").is_err());
        assert!(parse_duration("0").is_err());
        assert!(parse_duration("2:75").is_err());
        assert!(parse_duration("soon").is_err());
    }

    #[test]
    fn test_oversized_numbers_are_rejected() {
        assert!(parse_duration("99999999:00").is_err());
        assert!(parse_duration("1h 4294967295m").is_err());
        assert!(parse_duration("4294967295").is_err());
        assert!(parse_duration("99999999999999999999h").is_err());
        assert!(parse_distance("1e308").is_err());
        assert!(parse_distance("99999999999999999999999").is_err());
        assert!(parse_speed("1e308").is_err());
        assert!(parse_speed("25-99999999999999999999").is_err());
    }

    #[test]
    fn test_speed_forms() {
        assert_eq!(parse_speed("25-28"), Ok((Some(25.0), Some(28.0))));
        assert_eq!(parse_speed("25 – 28 km/h"), Ok((Some(25.0), Some(28.0))));
        assert_eq!(parse_speed("25+"), Ok((Some(25.0), None)));
        assert_eq!(parse_speed("-28"), Ok((None, Some(28.0))));
        assert_eq!(parse_speed("25"), Ok((Some(25.0), Some(25.0))));
        assert!(parse_speed("28-25").is_err());
        assert!(parse_speed("fast").is_err());
        assert!(parse_speed("").is_err());
    }

    #[test]
    fn test_route_requires_http_url() {
        assert!(parse_route("https://www.strava.com/routes/123").is_ok());
        assert!(parse_route("http://example.com/x").is_ok());
        assert!(parse_route("strava.com/routes/123").is_err());
        assert!(parse_route("https://nodot").is_err());
    }

    #[test]
    fn test_date_rejects_past() {
        let now = Local::now();
        assert!(parse_date("tomorrow 9am", now).is_ok());
        let yesterday = (now - Duration::days(1)).format("%Y-%m-%d %H:%M").to_string();
        let err = parse_date(&yesterday, now).unwrap_err();
        assert!(err.message.contains("past"));
    }

    #[test]
    fn test_parse_dispatches_by_kind() {
        let now = Local::now();
        assert_eq!(
            Field::Category.parse("road", now),
            Ok(FieldValue::Category(RideCategory::Road))
        );
        assert_eq!(
            Field::MeetingPoint.parse(" Main square ", now),
            Ok(FieldValue::Text("Main square".into()))
        );
        assert!(Field::Organizer.parse("  ", now).is_err());
    }

    #[test]
    fn test_param_keys_round_trip_to_fields() {
        for field in Field::ALL {
            assert_eq!(Field::from_param_key(field.param_key()), Some(field));
        }
        assert_eq!(Field::from_param_key("color"), None);
    }

    #[test]
    fn test_formatters() {
        assert_eq!(format_distance(42.0), "42 km");
        assert_eq!(format_distance(42.56), "42.6 km");
        assert_eq!(format_duration(45), "45m");
        assert_eq!(format_duration(120), "2h");
        assert_eq!(format_duration(150), "2h 30m");
        assert_eq!(format_speed(Some(25.0), Some(28.0)), "25-28 km/h");
        assert_eq!(format_speed(Some(25.0), None), "25+ km/h");
        assert_eq!(format_speed(None, Some(28.0)), "up to 28 km/h");
        assert_eq!(format_speed(Some(25.0), Some(25.0)), "25 km/h");
    }
}
