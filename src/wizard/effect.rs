//! Effects produced by wizard transitions

use crate::ride::MessageHandle;

/// Effects to be executed after a transition
#[derive(Debug, Clone, PartialEq)]
pub enum WizardEffect {
    /// Edit the step message in place, or send it if there is none
    ShowStep { error: Option<String> },

    /// Delete input and error messages that are no longer relevant
    DeleteMessages { handles: Vec<MessageHandle> },

    /// Fetch the route page; completes with `RouteInspected`
    InspectRoute { url: String },

    /// Save the ride and sync its messages, then close the session
    Commit,

    /// Remove the step message, post `notice` and end the session
    Close { notice: String },
}

impl WizardEffect {
    pub fn show() -> Self {
        WizardEffect::ShowStep { error: None }
    }

    pub fn show_error(error: impl Into<String>) -> Self {
        WizardEffect::ShowStep {
            error: Some(error.into()),
        }
    }
}
