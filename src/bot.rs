//! Update dispatcher
//!
//! Routes one inbound platform update to a command, the wizard, or a
//! participation change. Failures are logged and turned into a short reply
//! or callback toast; nothing here propagates an error to the webhook.

pub mod update;

pub use update::Update;

use crate::commands::{parse_command, CommandContext, CommandService};
use crate::error::{RideError, RideResult};
use crate::participation::ParticipationStore;
use crate::render::{escape_html, parse_participation_callback};
use crate::ride::{Destination, ParticipationState};
use crate::sync::MessageSynchronizer;
use crate::transport::{OutgoingMessage, Transport};
use crate::wizard::{SessionKey, WizardAction, WizardEngine, CATEGORY_PREFIX};
use std::sync::Arc;
use update::{CallbackQuery, Message};

pub struct Dispatcher {
    commands: CommandService,
    wizard: Arc<WizardEngine>,
    participation: ParticipationStore,
    sync: Arc<MessageSynchronizer>,
    transport: Arc<dyn Transport>,
}

impl Dispatcher {
    pub fn new(
        commands: CommandService,
        wizard: Arc<WizardEngine>,
        participation: ParticipationStore,
        sync: Arc<MessageSynchronizer>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            commands,
            wizard,
            participation,
            sync,
            transport,
        }
    }

    pub async fn dispatch(&self, update: Update) {
        if let Some(message) = update.message {
            self.on_message(message).await;
        } else if let Some(query) = update.callback_query {
            self.on_callback(query).await;
        } else {
            tracing::debug!(update_id = update.update_id, "Ignoring update kind");
        }
    }

    async fn on_message(&self, message: Message) {
        let (Some(user), Some(text)) = (&message.from, &message.text) else {
            return;
        };
        if user.is_bot {
            return;
        }
        let destination = Destination::thread(message.chat.id, message.thread_id());

        if let Some(command) = parse_command(text) {
            let profile = user.profile();
            let ctx = CommandContext {
                user: &profile,
                chat_id: message.chat.id,
                thread_id: message.thread_id(),
                reply_text: message.reply_text(),
            };
            match self.commands.execute(&command, &ctx).await {
                Ok(Some(reply)) => self.reply(destination, reply).await,
                Ok(None) => {}
                Err(e) => {
                    log_failure(&e, message.chat.id, command.kind.name());
                    self.reply(destination, escape_html(&e.user_message())).await;
                }
            }
            return;
        }

        let key = SessionKey::new(user.id, message.chat.id);
        if !self.wizard.is_active(key) {
            return;
        }
        if let Err(e) = self
            .wizard
            .handle_text(key, text, Some(message.handle()))
            .await
        {
            log_failure(&e, message.chat.id, "wizard input");
            self.reply(destination, escape_html(&e.user_message())).await;
        }
    }

    async fn on_callback(&self, query: CallbackQuery) {
        let toast = self.handle_callback(&query).await;
        if let Err(e) = self
            .transport
            .answer_callback(&query.id, toast.as_deref())
            .await
        {
            tracing::warn!(callback_id = %query.id, error = %e, "Failed to answer callback");
        }
    }

    /// Act on a button press; returns the toast shown to the user
    async fn handle_callback(&self, query: &CallbackQuery) -> Option<String> {
        let data = query.data.as_deref()?;

        if let Some((state, ride_id)) = parse_participation_callback(data) {
            return Some(match self.change_participation(query, ride_id, state).await {
                Ok(toast) => toast,
                Err(e) => {
                    log_failure(&e, query.message.as_ref().map_or(0, |m| m.chat.id), "participation");
                    e.user_message()
                }
            });
        }

        let Some(message) = &query.message else {
            tracing::debug!(data, "Callback without a message");
            return None;
        };
        let key = SessionKey::new(query.from.id, message.chat.id);
        let result = if let Some(action) = WizardAction::from_callback(data) {
            self.wizard.handle_action(key, action).await
        } else if let Some(category) = data.strip_prefix(CATEGORY_PREFIX) {
            self.wizard.handle_text(key, category, None).await
        } else {
            tracing::debug!(data, "Unknown callback data");
            return None;
        };
        result.err().map(|e| {
            log_failure(&e, message.chat.id, "wizard action");
            e.user_message()
        })
    }

    async fn change_participation(
        &self,
        query: &CallbackQuery,
        ride_id: &str,
        state: ParticipationState,
    ) -> RideResult<String> {
        let profile = query.from.profile();
        let changed = self
            .participation
            .set_participation(ride_id, &profile, state)?;
        if !changed {
            return Ok("No change".to_string());
        }
        // The choice is stored; a failed refresh only leaves messages stale
        if let Err(e) = self.sync.resync(ride_id).await {
            tracing::warn!(ride_id, error = %e, "Resync after participation change failed");
        }
        let joined = self
            .participation
            .participation(ride_id)?
            .count(ParticipationState::Joined);
        Ok(match state {
            ParticipationState::Joined => format!("You're in! {joined} riding"),
            ParticipationState::Thinking => "Marked as maybe".to_string(),
            ParticipationState::Skipped => "Marked as not going".to_string(),
        })
    }

    async fn reply(&self, destination: Destination, text: String) {
        if let Err(e) = self
            .transport
            .send_message(destination, &OutgoingMessage::text(text))
            .await
        {
            tracing::warn!(chat_id = destination.chat_id, error = %e, "Failed to send reply");
        }
    }
}

fn log_failure(err: &RideError, chat_id: i64, context: &str) {
    match err {
        RideError::Transport(_) | RideError::Storage(_) => {
            tracing::error!(chat_id, context, error = %err, "Request failed");
        }
        _ => tracing::info!(chat_id, context, error = %err, "Request rejected"),
    }
}
