//! Transport error types

use thiserror::Error;

/// Transport error with classification
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct TransportError {
    pub kind: TransportFailureKind,
    pub message: String,
}

impl TransportError {
    pub fn new(kind: TransportFailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn message_gone(message: impl Into<String>) -> Self {
        Self::new(TransportFailureKind::MessageGone, message)
    }

    pub fn chat_gone(message: impl Into<String>) -> Self {
        Self::new(TransportFailureKind::ChatGone, message)
    }

    pub fn bot_blocked(message: impl Into<String>) -> Self {
        Self::new(TransportFailureKind::BotBlocked, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(TransportFailureKind::Timeout, message)
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(TransportFailureKind::Network, message)
    }

    pub fn unknown(message: impl Into<String>) -> Self {
        Self::new(TransportFailureKind::Unknown, message)
    }

    pub fn is_permanent(&self) -> bool {
        self.kind.is_permanent()
    }
}

/// Why a transport call failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportFailureKind {
    /// Message deleted or no longer editable - permanent
    MessageGone,
    /// Chat deleted, deactivated or migrated - permanent
    ChatGone,
    /// Bot blocked by the user or removed from the chat - permanent
    BotBlocked,
    /// Bot lacks the rights to post or edit - permanent
    InsufficientRights,
    /// Edit carried the same content as the message already shows
    NotModified,
    /// Flood control (429)
    RateLimited,
    /// Call exceeded its time bound
    Timeout,
    /// Connection problems, 5xx
    Network,
    Unknown,
}

impl TransportFailureKind {
    pub fn is_permanent(self) -> bool {
        matches!(
            self,
            Self::MessageGone | Self::ChatGone | Self::BotBlocked | Self::InsufficientRights
        )
    }

    /// Classify a Bot API failure.
    ///
    /// The Bot API only reports a numeric code and a free-text description,
    /// so this falls back to substring matching. Keep every pattern here.
    pub fn classify(error_code: Option<i64>, description: &str) -> Self {
        let text = description.to_lowercase();
        let contains_any = |needles: &[&str]| needles.iter().any(|n| text.contains(n));

        if contains_any(&["message is not modified"]) {
            Self::NotModified
        } else if contains_any(&[
            "message to edit not found",
            "message to delete not found",
            "message_id_invalid",
            "message can't be edited",
            "message can't be deleted",
        ]) {
            Self::MessageGone
        } else if contains_any(&[
            "chat not found",
            "group chat was deactivated",
            "group chat was upgraded",
            "chat was deleted",
        ]) {
            Self::ChatGone
        } else if contains_any(&[
            "bot was blocked",
            "bot was kicked",
            "bot is not a member",
            "user is deactivated",
        ]) {
            Self::BotBlocked
        } else if contains_any(&[
            "not enough rights",
            "have no rights",
            "chat_write_forbidden",
            "need administrator rights",
        ]) {
            Self::InsufficientRights
        } else {
            match error_code {
                Some(429) => Self::RateLimited,
                Some(403) => Self::BotBlocked,
                Some(code) if code >= 500 => Self::Network,
                _ => Self::Unknown,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_permanent_failures() {
        let cases = [
            (400, "Bad Request: message to edit not found", TransportFailureKind::MessageGone),
            (400, "Bad Request: chat not found", TransportFailureKind::ChatGone),
            (403, "Forbidden: bot was blocked by the user", TransportFailureKind::BotBlocked),
            (403, "Forbidden: bot was kicked from the group chat", TransportFailureKind::BotBlocked),
            (400, "Bad Request: not enough rights to send text messages to the chat", TransportFailureKind::InsufficientRights),
        ];
        for (code, description, expected) in cases {
            let kind = TransportFailureKind::classify(Some(code), description);
            assert_eq!(kind, expected, "{description}");
            assert!(kind.is_permanent());
        }
    }

    #[test]
    fn test_classify_transient_failures() {
        assert_eq!(
            TransportFailureKind::classify(Some(429), "Too Many Requests: retry after 5"),
            TransportFailureKind::RateLimited
        );
        assert_eq!(
            TransportFailureKind::classify(Some(502), "Bad Gateway"),
            TransportFailureKind::Network
        );
        assert_eq!(
            TransportFailureKind::classify(
                Some(400),
                "Bad Request: message is not modified: specified new message content is the same"
            ),
            TransportFailureKind::NotModified
        );
        assert!(!TransportFailureKind::RateLimited.is_permanent());
        assert!(!TransportFailureKind::Timeout.is_permanent());
        assert!(!TransportFailureKind::NotModified.is_permanent());
    }
}
