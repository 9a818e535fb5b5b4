//! Ride domain types
//!
//! A ride is one scheduled group ride: its details, the chat messages that
//! show it, and the three-way participation of users.

use crate::fields::{Field, FieldError, FieldValue};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Ride Ids
// ============================================================================

const BASE62: &[u8; 62] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";

/// Length of a ride id; 62^11 covers the whole `u64` range
pub const RIDE_ID_LEN: usize = 11;

/// Generate a fresh, non-sequential ride id
pub fn generate_ride_id() -> String {
    encode_base62(rand::random::<u64>())
}

/// Encode a 64-bit value as a left-padded base-62 ride id
pub fn encode_base62(mut value: u64) -> String {
    let mut buf = [b'0'; RIDE_ID_LEN];
    for slot in buf.iter_mut().rev() {
        *slot = BASE62[usize::try_from(value % 62).unwrap_or_default()];
        value /= 62;
    }
    buf.iter().map(|&b| char::from(b)).collect()
}

/// Whether `candidate` is shaped like a ride id
pub fn is_ride_id(candidate: &str) -> bool {
    candidate.len() == RIDE_ID_LEN && candidate.bytes().all(|b| b.is_ascii_alphanumeric())
}

// ============================================================================
// Categories
// ============================================================================

/// Kind of ride
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum RideCategory {
    #[default]
    Regular,
    Road,
    Gravel,
    Mtb,
    MtbXc,
    EBike,
    Virtual,
}

impl RideCategory {
    pub const ALL: [RideCategory; 7] = [
        RideCategory::Regular,
        RideCategory::Road,
        RideCategory::Gravel,
        RideCategory::Mtb,
        RideCategory::MtbXc,
        RideCategory::EBike,
        RideCategory::Virtual,
    ];

    /// Stable key used in storage and callback data
    pub fn key(self) -> &'static str {
        match self {
            RideCategory::Regular => "regular",
            RideCategory::Road => "road",
            RideCategory::Gravel => "gravel",
            RideCategory::Mtb => "mtb",
            RideCategory::MtbXc => "mtb-xc",
            RideCategory::EBike => "e-bike",
            RideCategory::Virtual => "virtual",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            RideCategory::Regular => "Regular/Mixed Ride",
            RideCategory::Road => "Road Ride",
            RideCategory::Gravel => "Gravel Ride",
            RideCategory::Mtb => "Mountain/Enduro/Downhill Ride",
            RideCategory::MtbXc => "MTB-XC Ride",
            RideCategory::EBike => "E-Bike Ride",
            RideCategory::Virtual => "Virtual/Indoor Ride",
        }
    }

    /// Parse a key or a label, ignoring case
    pub fn parse(raw: &str) -> Option<Self> {
        let needle = raw.trim().to_lowercase();
        Self::ALL
            .into_iter()
            .find(|c| c.key() == needle || c.label().to_lowercase() == needle)
    }
}

impl fmt::Display for RideCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

// ============================================================================
// Message Handles
// ============================================================================

/// Where a message is sent: a chat and optionally a forum thread
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Destination {
    pub chat_id: i64,
    pub thread_id: Option<i64>,
}

impl Destination {
    pub fn chat(chat_id: i64) -> Self {
        Self {
            chat_id,
            thread_id: None,
        }
    }

    pub fn thread(chat_id: i64, thread_id: Option<i64>) -> Self {
        Self { chat_id, thread_id }
    }
}

/// One rendered copy of a ride in one chat
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageHandle {
    pub chat_id: i64,
    pub message_id: i64,
    pub thread_id: Option<i64>,
}

impl MessageHandle {
    pub fn new(chat_id: i64, message_id: i64, thread_id: Option<i64>) -> Self {
        Self {
            chat_id,
            message_id,
            thread_id,
        }
    }

    pub fn destination(&self) -> Destination {
        Destination::thread(self.chat_id, self.thread_id)
    }
}

// ============================================================================
// Participation
// ============================================================================

/// Which of the three participation sets a user is in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParticipationState {
    Joined,
    Thinking,
    Skipped,
}

impl ParticipationState {
    pub const ALL: [ParticipationState; 3] = [
        ParticipationState::Joined,
        ParticipationState::Thinking,
        ParticipationState::Skipped,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ParticipationState::Joined => "joined",
            ParticipationState::Thinking => "thinking",
            ParticipationState::Skipped => "skipped",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "joined" => Some(ParticipationState::Joined),
            "thinking" => Some(ParticipationState::Thinking),
            "skipped" => Some(ParticipationState::Skipped),
            _ => None,
        }
    }
}

impl fmt::Display for ParticipationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Platform profile of a user, refreshed on every interaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub user_id: i64,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

impl UserProfile {
    pub fn new(user_id: i64) -> Self {
        Self {
            user_id,
            username: None,
            first_name: None,
            last_name: None,
        }
    }

    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    pub fn with_name(mut self, first: impl Into<String>, last: Option<&str>) -> Self {
        self.first_name = Some(first.into());
        self.last_name = last.map(String::from);
        self
    }

    /// Human-facing name: full name when known, then `@username`, then the id
    pub fn display_name(&self) -> String {
        let full: Vec<&str> = [self.first_name.as_deref(), self.last_name.as_deref()]
            .into_iter()
            .flatten()
            .filter(|s| !s.is_empty())
            .collect();
        if !full.is_empty() {
            return full.join(" ");
        }
        match &self.username {
            Some(username) => format!("@{username}"),
            None => format!("User {}", self.user_id),
        }
    }
}

/// A user in one of the participation sets
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Participant {
    pub profile: UserProfile,
    pub updated_at: DateTime<Utc>,
}

impl Participant {
    pub fn user_id(&self) -> i64 {
        self.profile.user_id
    }
}

/// Three disjoint participation sets of a ride
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Participation {
    pub joined: Vec<Participant>,
    pub thinking: Vec<Participant>,
    pub skipped: Vec<Participant>,
}

impl Participation {
    pub fn set(&self, state: ParticipationState) -> &[Participant] {
        match state {
            ParticipationState::Joined => &self.joined,
            ParticipationState::Thinking => &self.thinking,
            ParticipationState::Skipped => &self.skipped,
        }
    }

    pub fn set_mut(&mut self, state: ParticipationState) -> &mut Vec<Participant> {
        match state {
            ParticipationState::Joined => &mut self.joined,
            ParticipationState::Thinking => &mut self.thinking,
            ParticipationState::Skipped => &mut self.skipped,
        }
    }

    pub fn count(&self, state: ParticipationState) -> usize {
        self.set(state).len()
    }

    /// The set a user currently belongs to
    pub fn state_of(&self, user_id: i64) -> Option<ParticipationState> {
        ParticipationState::ALL
            .into_iter()
            .find(|&state| self.set(state).iter().any(|p| p.user_id() == user_id))
    }

    /// Number of sets containing `user_id`; the invariant keeps it at most 1
    pub fn memberships(&self, user_id: i64) -> usize {
        ParticipationState::ALL
            .into_iter()
            .map(|state| {
                self.set(state)
                    .iter()
                    .filter(|p| p.user_id() == user_id)
                    .count()
            })
            .sum()
    }
}

// ============================================================================
// Ride Details
// ============================================================================

/// The user-editable part of a ride
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RideDetails {
    pub title: String,
    pub category: RideCategory,
    pub organizer: Option<String>,
    pub date: DateTime<Utc>,
    pub meeting_point: Option<String>,
    pub route_link: Option<String>,
    pub distance_km: Option<f64>,
    pub duration_min: Option<u32>,
    pub speed_min: Option<f64>,
    pub speed_max: Option<f64>,
    pub info: Option<String>,
}

/// A stored ride
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ride {
    pub id: String,
    pub details: RideDetails,
    pub cancelled: bool,
    pub created_by: i64,
    pub updated_by: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub messages: Vec<MessageHandle>,
    pub participation: Participation,
}

impl Ride {
    pub fn is_creator(&self, user_id: i64) -> bool {
        self.created_by == user_id
    }

    pub fn has_message_in(&self, chat_id: i64) -> bool {
        self.messages.iter().any(|h| h.chat_id == chat_id)
    }
}

/// Partially filled ride details, edited by the wizard and by parameter commands
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RideDraft {
    pub title: Option<String>,
    pub category: Option<RideCategory>,
    pub organizer: Option<String>,
    pub date: Option<DateTime<Utc>>,
    pub meeting_point: Option<String>,
    pub route_link: Option<String>,
    pub distance_km: Option<f64>,
    pub duration_min: Option<u32>,
    pub speed_min: Option<f64>,
    pub speed_max: Option<f64>,
    pub info: Option<String>,
}

impl RideDraft {
    pub fn from_details(details: &RideDetails) -> Self {
        Self {
            title: Some(details.title.clone()),
            category: Some(details.category),
            organizer: details.organizer.clone(),
            date: Some(details.date),
            meeting_point: details.meeting_point.clone(),
            route_link: details.route_link.clone(),
            distance_km: details.distance_km,
            duration_min: details.duration_min,
            speed_min: details.speed_min,
            speed_max: details.speed_max,
            info: details.info.clone(),
        }
    }

    /// Current value of a field, tagged by its kind
    pub fn value(&self, field: Field) -> Option<FieldValue> {
        match field {
            Field::Title => self.title.clone().map(FieldValue::Text),
            Field::Category => self.category.map(FieldValue::Category),
            Field::Organizer => self.organizer.clone().map(FieldValue::Text),
            Field::Date => self.date.map(FieldValue::Date),
            Field::Route => self.route_link.clone().map(FieldValue::Route),
            Field::Distance => self.distance_km.map(FieldValue::Distance),
            Field::Duration => self.duration_min.map(FieldValue::Duration),
            Field::Speed => match (self.speed_min, self.speed_max) {
                (None, None) => None,
                (min, max) => Some(FieldValue::Speed { min, max }),
            },
            Field::MeetingPoint => self.meeting_point.clone().map(FieldValue::Text),
            Field::Info => self.info.clone().map(FieldValue::Text),
        }
    }

    pub fn has_value(&self, field: Field) -> bool {
        self.value(field).is_some()
    }

    /// Store a parsed value; a value of the wrong kind for the field is ignored
    pub fn apply(&mut self, field: Field, value: FieldValue) {
        match (field, value) {
            (Field::Title, FieldValue::Text(v)) => self.title = Some(v),
            (Field::Category, FieldValue::Category(v)) => self.category = Some(v),
            (Field::Organizer, FieldValue::Text(v)) => self.organizer = Some(v),
            (Field::Date, FieldValue::Date(v)) => self.date = Some(v),
            (Field::Route, FieldValue::Route(v)) => self.route_link = Some(v),
            (Field::Distance, FieldValue::Distance(v)) => self.distance_km = Some(v),
            (Field::Duration, FieldValue::Duration(v)) => self.duration_min = Some(v),
            (Field::Speed, FieldValue::Speed { min, max }) => {
                self.speed_min = min;
                self.speed_max = max;
            }
            (Field::MeetingPoint, FieldValue::Text(v)) => self.meeting_point = Some(v),
            (Field::Info, FieldValue::Text(v)) => self.info = Some(v),
            (field, value) => {
                tracing::warn!(?field, ?value, "Ignoring value of mismatched kind");
            }
        }
    }

    /// Erase a field
    pub fn clear(&mut self, field: Field) {
        match field {
            Field::Title => self.title = None,
            Field::Category => self.category = None,
            Field::Organizer => self.organizer = None,
            Field::Date => self.date = None,
            Field::Route => self.route_link = None,
            Field::Distance => self.distance_km = None,
            Field::Duration => self.duration_min = None,
            Field::Speed => {
                self.speed_min = None;
                self.speed_max = None;
            }
            Field::MeetingPoint => self.meeting_point = None,
            Field::Info => self.info = None,
        }
    }

    /// Turn the draft into complete details, requiring title and date
    pub fn complete(&self) -> Result<RideDetails, FieldError> {
        let title = self
            .title
            .clone()
            .ok_or_else(|| FieldError::missing(Field::Title))?;
        let date = self.date.ok_or_else(|| FieldError::missing(Field::Date))?;
        Ok(RideDetails {
            title,
            category: self.category.unwrap_or_default(),
            organizer: self.organizer.clone(),
            date,
            meeting_point: self.meeting_point.clone(),
            route_link: self.route_link.clone(),
            distance_km: self.distance_km,
            duration_min: self.duration_min,
            speed_min: self.speed_min,
            speed_max: self.speed_max,
            info: self.info.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ride_ids_are_fixed_width_base62() {
        assert_eq!(encode_base62(0), "00000000000");
        assert_eq!(encode_base62(61), "0000000000z");
        assert_eq!(encode_base62(62), "00000000010");
        assert_eq!(encode_base62(u64::MAX).len(), RIDE_ID_LEN);

        for _ in 0..100 {
            let id = generate_ride_id();
            assert!(is_ride_id(&id), "bad id {id}");
        }
    }

    #[test]
    fn test_is_ride_id_rejects_other_shapes() {
        assert!(!is_ride_id("short"));
        assert!(!is_ride_id("abc-def_ghi"));
        assert!(!is_ride_id("000000000000"));
    }

    #[test]
    fn test_category_parse_accepts_key_and_label() {
        assert_eq!(RideCategory::parse("mtb-xc"), Some(RideCategory::MtbXc));
        assert_eq!(RideCategory::parse("Road Ride"), Some(RideCategory::Road));
        assert_eq!(RideCategory::parse(" GRAVEL "), Some(RideCategory::Gravel));
        assert_eq!(RideCategory::parse("unicycle"), None);
    }

    #[test]
    fn test_display_name_fallbacks() {
        let named = UserProfile::new(1).with_name("Ann", Some("Lee"));
        assert_eq!(named.display_name(), "Ann Lee");
        let handle = UserProfile::new(2).with_username("rider");
        assert_eq!(handle.display_name(), "@rider");
        assert_eq!(UserProfile::new(3).display_name(), "User 3");
    }

    #[test]
    fn test_draft_speed_is_one_field() {
        let mut draft = RideDraft::default();
        assert!(!draft.has_value(Field::Speed));
        draft.apply(
            Field::Speed,
            FieldValue::Speed {
                min: Some(25.0),
                max: None,
            },
        );
        assert!(draft.has_value(Field::Speed));
        draft.clear(Field::Speed);
        assert_eq!(draft.speed_min, None);
        assert_eq!(draft.speed_max, None);
    }

    #[test]
    fn test_complete_requires_title_and_date() {
        let mut draft = RideDraft {
            title: Some("Evening Ride".into()),
            ..RideDraft::default()
        };
        let err = draft.complete().unwrap_err();
        assert!(err.to_string().contains("date"));

        draft.date = Some(Utc::now());
        let details = draft.complete().unwrap();
        assert_eq!(details.category, RideCategory::Regular);
    }
}
