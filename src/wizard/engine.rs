//! Wizard engine
//!
//! Runs the pure transition function for one conversation at a time and
//! executes the effects it returns against the transport, the route
//! inspector, the repository and the synchronizer.

use super::effect::WizardEffect;
use super::event::{WizardAction, WizardEvent};
use super::session::SessionStore;
use super::state::{ConversationState, SessionKey, WizardContext, WizardMode};
use super::step::{previous_step, Step};
use super::transition::transition;
use crate::error::{RideError, RideResult};
use crate::fields::{Field, FieldValue, CLEAR_TOKEN};
use crate::render::escape_html;
use crate::repository::RideRepository;
use crate::ride::{MessageHandle, Ride, RideCategory, RideDraft};
use crate::route::RouteInspector;
use crate::sync::MessageSynchronizer;
use crate::transport::{
    InlineButton, Keyboard, OutgoingMessage, Transport, TransportFailureKind,
};
use chrono::Local;
use futures::future::join_all;
use std::collections::VecDeque;
use std::fmt::Write as _;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Prefix of category button callbacks
pub const CATEGORY_PREFIX: &str = "cat:";

pub struct WizardEngine {
    sessions: Arc<SessionStore>,
    repo: RideRepository,
    sync: Arc<MessageSynchronizer>,
    transport: Arc<dyn Transport>,
    inspector: Arc<dyn RouteInspector>,
    route_timeout: Duration,
}

impl WizardEngine {
    pub fn new(
        sessions: Arc<SessionStore>,
        repo: RideRepository,
        sync: Arc<MessageSynchronizer>,
        transport: Arc<dyn Transport>,
        inspector: Arc<dyn RouteInspector>,
        route_timeout: Duration,
    ) -> Self {
        Self {
            sessions,
            repo,
            sync,
            transport,
            inspector,
            route_timeout,
        }
    }

    pub fn is_active(&self, key: SessionKey) -> bool {
        self.sessions.contains(key)
    }

    /// Open a wizard and show its first step
    pub async fn start(
        &self,
        key: SessionKey,
        thread_id: Option<i64>,
        mode: WizardMode,
    ) -> RideResult<()> {
        if self.sessions.contains(key) {
            return Err(RideError::SessionActive);
        }
        let draft = match &mode {
            WizardMode::Create => RideDraft::default(),
            WizardMode::Update { ride_id } => {
                let ride = self.repo.get(ride_id)?;
                if !ride.is_creator(key.user_id) {
                    return Err(RideError::permission_denied(ride_id.as_str(), "update"));
                }
                RideDraft::from_details(&ride.details)
            }
            WizardMode::Duplicate { source_ride_id } => {
                RideDraft::from_details(&self.repo.get(source_ride_id)?.details)
            }
        };

        let session = self
            .sessions
            .start(ConversationState::new(key, mode, draft, thread_id))?;
        let mut state = session.lock().await;
        if let Err(e) = self.show_step(&mut state, None).await {
            self.sessions.remove(key);
            return Err(e);
        }
        tracing::info!(%key, mode = state.mode.title(), "Wizard started");
        Ok(())
    }

    pub async fn handle_text(
        &self,
        key: SessionKey,
        text: &str,
        message: Option<MessageHandle>,
    ) -> RideResult<()> {
        self.process(
            key,
            WizardEvent::Text {
                text: text.to_string(),
                message,
            },
        )
        .await
    }

    pub async fn handle_action(&self, key: SessionKey, action: WizardAction) -> RideResult<()> {
        self.process(key, WizardEvent::Action(action)).await
    }

    /// Remove the step messages of sessions dropped for inactivity
    pub async fn evict_idle(&self) -> usize {
        let evicted = self.sessions.evict_idle(Instant::now());
        for state in &evicted {
            let handles: Vec<MessageHandle> =
                state.prompt.iter().chain(&state.stale).copied().collect();
            self.delete_all(&handles).await;
        }
        evicted.len()
    }

    async fn process(&self, key: SessionKey, event: WizardEvent) -> RideResult<()> {
        let session = self.sessions.get(key).ok_or(RideError::SessionExpired)?;
        let mut state = session.lock().await;
        if !self.sessions.is_current(key, &session) {
            return Err(RideError::SessionExpired);
        }
        state.last_activity = Instant::now();

        let mut queue = VecDeque::from([event]);
        while let Some(event) = queue.pop_front() {
            let input = event.input_message();
            let context = WizardContext::new(Local::now());

            let result = match transition(&state, &context, event) {
                Ok(result) => result,
                Err(rejection) => {
                    tracing::debug!(%key, step = ?state.step, %rejection, "Wizard event rejected");
                    state.stale.extend(input);
                    let shown = self.show_step(&mut state, Some(&rejection.to_string())).await;
                    return self.abort_on_error(key, shown);
                }
            };

            *state = result.new_state;
            for effect in result.effects {
                match self.execute(&mut state, effect).await {
                    Ok(Some(follow_up)) => queue.push_back(follow_up),
                    Ok(None) => {}
                    Err(e) => return self.abort_on_error(key, Err(e)),
                }
            }
        }
        Ok(())
    }

    /// A failing transport ends the conversation instead of leaving it stuck
    fn abort_on_error(&self, key: SessionKey, result: RideResult<()>) -> RideResult<()> {
        if let Err(e) = &result {
            tracing::warn!(%key, error = %e, "Wizard aborted");
            self.sessions.remove(key);
        }
        result
    }

    async fn execute(
        &self,
        state: &mut ConversationState,
        effect: WizardEffect,
    ) -> RideResult<Option<WizardEvent>> {
        match effect {
            WizardEffect::ShowStep { error } => {
                self.show_step(state, error.as_deref()).await?;
                Ok(None)
            }
            WizardEffect::DeleteMessages { handles } => {
                self.delete_all(&handles).await;
                Ok(None)
            }
            WizardEffect::InspectRoute { url } => Ok(Some(self.inspect_route(url).await)),
            WizardEffect::Commit => {
                self.commit(state).await;
                Ok(None)
            }
            WizardEffect::Close { notice } => {
                self.close(state, &notice).await;
                Ok(None)
            }
        }
    }

    async fn inspect_route(&self, url: String) -> WizardEvent {
        let info = match tokio::time::timeout(self.route_timeout, self.inspector.inspect(&url)).await
        {
            Ok(Ok(info)) => info,
            Ok(Err(e)) => {
                tracing::warn!(url = %url, error = %e, "Route inspection failed");
                None
            }
            Err(_) => {
                tracing::warn!(
                    url = %url,
                    timeout_ms = %self.route_timeout.as_millis(),
                    "Route inspection timed out"
                );
                None
            }
        };
        WizardEvent::RouteInspected { url, info }
    }

    /// Save the ride, then close the session whatever the outcome
    async fn commit(&self, state: &mut ConversationState) {
        let key = state.key;
        let notice = match self.save(state).await {
            Ok(ride) if state.is_update() => {
                format!("✅ Ride <b>{}</b> updated", escape_html(&ride.details.title))
            }
            Ok(ride) => format!("✅ Ride <b>{}</b> created", escape_html(&ride.details.title)),
            Err(e) => {
                tracing::error!(%key, mode = state.mode.title(), error = %e, "Failed to save ride");
                format!("❌ {}", escape_html(&e.user_message()))
            }
        };
        self.close(state, &notice).await;
    }

    async fn save(&self, state: &ConversationState) -> RideResult<Ride> {
        let user_id = state.key.user_id;
        match &state.mode {
            WizardMode::Create | WizardMode::Duplicate { .. } => {
                let ride = self.repo.create(&state.draft, user_id)?;
                // A ride saved but not posted stays listed for its creator
                self.sync.post_initial(&ride.id, state.destination()).await?;
                Ok(ride)
            }
            WizardMode::Update { ride_id } => {
                let ride = self.repo.update(ride_id, &state.draft, user_id)?;
                self.sync.resync(ride_id).await?;
                Ok(ride)
            }
        }
    }

    async fn close(&self, state: &mut ConversationState, notice: &str) {
        let mut handles: Vec<MessageHandle> = state.prompt.take().into_iter().collect();
        handles.append(&mut state.stale);
        self.delete_all(&handles).await;

        if let Err(e) = self
            .transport
            .send_message(state.destination(), &OutgoingMessage::text(notice))
            .await
        {
            tracing::warn!(key = %state.key, error = %e, "Could not post wizard notice");
        }
        self.sessions.remove(state.key);
    }

    /// Best effort; a message that is already gone needs no deleting
    async fn delete_all(&self, handles: &[MessageHandle]) {
        join_all(handles.iter().map(|&h| self.transport.delete_message(h))).await;
    }

    /// Edit the step message in place, or send a new one
    async fn show_step(&self, state: &mut ConversationState, error: Option<&str>) -> RideResult<()> {
        let message = step_message(state, error);
        if let Some(handle) = state.prompt {
            match self.transport.edit_message(handle, &message).await {
                Ok(()) => return Ok(()),
                Err(e) if e.kind == TransportFailureKind::NotModified => return Ok(()),
                Err(e) if e.is_permanent() => state.prompt = None,
                Err(e) => return Err(e.into()),
            }
        }
        let handle = self
            .transport
            .send_message(state.destination(), &message)
            .await?;
        state.prompt = Some(handle);
        Ok(())
    }
}

// ============================================================================
// Step Messages
// ============================================================================

/// Render the step message for the current state
pub fn step_message(state: &ConversationState, error: Option<&str>) -> OutgoingMessage {
    let mut text = String::new();
    let step = state.step;
    match step.number() {
        Some(n) => {
            let _ = writeln!(
                text,
                "<b>🚲 {}</b> · step {n}/{}",
                state.mode.title(),
                Step::FIELD_STEPS.len()
            );
        }
        None => {
            let _ = writeln!(text, "<b>🚲 {}</b>", state.mode.title());
        }
    }
    text.push('\n');

    if state.pending_route.is_some() {
        text.push_str("⏳ Checking the route link…");
        let keyboard = Keyboard::new().row(vec![nav_button(WizardAction::Cancel)]);
        return OutgoingMessage::text(text).with_keyboard(keyboard);
    }

    text.push_str(step.prompt());
    let keyboard = match step.field() {
        Some(field) => {
            if let Some(value) = state.draft.value(field) {
                let _ = write!(text, "\n\nCurrent: {}", format_value(&value));
                if step.is_clearable() {
                    let _ = write!(text, "\nSend <code>{CLEAR_TOKEN}</code> to clear it");
                }
            }
            field_keyboard(state, field)
        }
        None => {
            text.push_str("\n\n");
            text.push_str(&summary(&state.draft));
            Keyboard::new()
                .row(vec![
                    nav_button(WizardAction::Back),
                    nav_button(WizardAction::Confirm),
                ])
                .row(vec![nav_button(WizardAction::Cancel)])
        }
    };

    if let Some(error) = error {
        let _ = write!(text, "\n\n⚠️ {}", escape_html(error));
    }
    OutgoingMessage::text(text).with_keyboard(keyboard)
}

fn field_keyboard(state: &ConversationState, field: Field) -> Keyboard {
    let step = state.step;
    let mut keyboard = Keyboard::new();

    if field == Field::Category {
        for pair in RideCategory::ALL.chunks(2) {
            keyboard = keyboard.row(
                pair.iter()
                    .map(|c| InlineButton::callback(c.label(), format!("{CATEGORY_PREFIX}{}", c.key())))
                    .collect(),
            );
        }
    }

    let has_value = state.draft.has_value(field);
    let mut nav = Vec::new();
    if previous_step(step).is_some() {
        nav.push(nav_button(WizardAction::Back));
    }
    if step.is_skippable() && !has_value {
        nav.push(nav_button(WizardAction::Skip));
    }
    if has_value {
        nav.push(nav_button(WizardAction::Keep));
    }
    keyboard
        .row(nav)
        .row(vec![nav_button(WizardAction::Cancel)])
}

fn nav_button(action: WizardAction) -> InlineButton {
    let label = match action {
        WizardAction::Back => "⬅️ Back",
        WizardAction::Skip => "⏭ Skip",
        WizardAction::Keep => "↩️ Keep",
        WizardAction::Cancel => "✖️ Cancel",
        WizardAction::Confirm => "✅ Confirm",
    };
    InlineButton::callback(label, action.callback_data())
}

/// HTML rendering of a field value, one formatter per value kind
fn format_value(value: &FieldValue) -> String {
    match value {
        FieldValue::Route(url) => {
            let url = escape_html(url);
            format!("<a href=\"{url}\">{url}</a>")
        }
        FieldValue::Date(_) => format!("<b>{}</b>", value.display()),
        FieldValue::Category(category) => format!("<i>{}</i>", category.label()),
        FieldValue::Text(_)
        | FieldValue::Distance(_)
        | FieldValue::Duration(_)
        | FieldValue::Speed { .. } => escape_html(&value.display()),
    }
}

/// Every required field, and every optional field that is set
fn summary(draft: &RideDraft) -> String {
    let mut lines = Vec::new();
    for field in Field::ALL {
        match draft.value(field) {
            Some(value) => lines.push(format!("<b>{}:</b> {}", capitalize(field.label()), format_value(&value))),
            None if field.is_required() => {
                lines.push(format!("<b>{}:</b> <i>missing</i>", capitalize(field.label())));
            }
            None => {}
        }
    }
    lines.join("\n")
}

fn capitalize(label: &str) -> String {
    let mut chars = label.chars();
    chars.next().map_or_else(String::new, |first| {
        first.to_uppercase().chain(chars).collect()
    })
}
