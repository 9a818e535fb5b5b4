//! Wizard events

use crate::ride::MessageHandle;
use crate::route::RouteInfo;

/// Prefix of wizard button callbacks
pub const ACTION_PREFIX: &str = "wiz:";

/// Button actions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WizardAction {
    Back,
    Skip,
    Keep,
    Cancel,
    Confirm,
}

impl WizardAction {
    pub fn as_str(self) -> &'static str {
        match self {
            WizardAction::Back => "back",
            WizardAction::Skip => "skip",
            WizardAction::Keep => "keep",
            WizardAction::Cancel => "cancel",
            WizardAction::Confirm => "confirm",
        }
    }

    pub fn callback_data(self) -> String {
        format!("{ACTION_PREFIX}{}", self.as_str())
    }

    /// Parse `wiz:<action>` callback data
    pub fn from_callback(data: &str) -> Option<Self> {
        let action = match data.strip_prefix(ACTION_PREFIX)? {
            "back" => WizardAction::Back,
            "skip" => WizardAction::Skip,
            "keep" => WizardAction::Keep,
            "cancel" => WizardAction::Cancel,
            "confirm" => WizardAction::Confirm,
            _ => return None,
        };
        Some(action)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum WizardEvent {
    /// Text typed by the user; `message` is their input, deleted once handled
    Text {
        text: String,
        message: Option<MessageHandle>,
    },
    Action(WizardAction),
    /// A route inspection finished; `info` is `None` on failure or timeout
    RouteInspected {
        url: String,
        info: Option<RouteInfo>,
    },
}

impl WizardEvent {
    /// The user message carried by the event, if any
    pub fn input_message(&self) -> Option<MessageHandle> {
        match self {
            WizardEvent::Text { message, .. } => *message,
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_callback_data() {
        for action in [
            WizardAction::Back,
            WizardAction::Skip,
            WizardAction::Keep,
            WizardAction::Cancel,
            WizardAction::Confirm,
        ] {
            assert_eq!(WizardAction::from_callback(&action.callback_data()), Some(action));
        }
        assert_eq!(WizardAction::from_callback("wiz:later"), None);
        assert_eq!(WizardAction::from_callback("join:abc"), None);
    }
}
