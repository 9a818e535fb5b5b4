//! Wizard conversation state

use super::step::Step;
use crate::ride::{Destination, MessageHandle, RideDraft};
use crate::route::RouteInfo;
use chrono::{DateTime, Local};
use std::fmt;
use std::time::Instant;

/// One conversation per user per chat
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionKey {
    pub user_id: i64,
    pub chat_id: i64,
}

impl SessionKey {
    pub fn new(user_id: i64, chat_id: i64) -> Self {
        Self { user_id, chat_id }
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.user_id, self.chat_id)
    }
}

/// What confirming the wizard does
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WizardMode {
    Create,
    Update { ride_id: String },
    Duplicate { source_ride_id: String },
}

impl WizardMode {
    pub fn title(&self) -> &'static str {
        match self {
            WizardMode::Create => "New ride",
            WizardMode::Update { .. } => "Update ride",
            WizardMode::Duplicate { .. } => "Duplicate ride",
        }
    }
}

/// Inputs to a transition that are not part of the state
#[derive(Debug, Clone, Copy)]
pub struct WizardContext {
    pub now: DateTime<Local>,
}

impl WizardContext {
    pub fn new(now: DateTime<Local>) -> Self {
        Self { now }
    }
}

#[derive(Debug, Clone)]
pub struct ConversationState {
    pub key: SessionKey,
    pub mode: WizardMode,
    pub step: Step,
    pub draft: RideDraft,
    /// Forum thread the wizard was started in
    pub thread_id: Option<i64>,
    /// The single step message, edited in place
    pub prompt: Option<MessageHandle>,
    /// User input and error messages waiting to be deleted
    pub stale: Vec<MessageHandle>,
    /// Route link whose page is being inspected
    pub pending_route: Option<String>,
    /// Data the last route inspection derived
    pub route_info: Option<RouteInfo>,
    pub last_activity: Instant,
}

impl ConversationState {
    pub fn new(key: SessionKey, mode: WizardMode, draft: RideDraft, thread_id: Option<i64>) -> Self {
        Self {
            key,
            mode,
            step: Step::FIRST,
            draft,
            thread_id,
            prompt: None,
            stale: Vec::new(),
            pending_route: None,
            route_info: None,
            last_activity: Instant::now(),
        }
    }

    /// Where the wizard's messages go
    pub fn destination(&self) -> Destination {
        Destination::thread(self.key.chat_id, self.thread_id)
    }

    pub fn is_update(&self) -> bool {
        matches!(self.mode, WizardMode::Update { .. })
    }
}
