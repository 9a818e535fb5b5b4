//! Slash commands
//!
//! A command is `/name[@bot] [ride id]` on the first line, optionally
//! followed by a block of `key: value` lines. Without a parameter block the
//! ride-editing commands open the wizard; with one they go straight to the
//! repository.

use crate::error::{RideError, RideResult};
use crate::fields::{format_date, FieldError};
use crate::render::{escape_html, extract_ride_id};
use crate::repository::{RideRepository, ID_PARAM};
use crate::ride::{Destination, UserProfile};
use crate::sync::MessageSynchronizer;
use crate::wizard::{SessionKey, WizardEngine, WizardMode};
use regex::Regex;
use std::fmt::Write as _;
use std::sync::{Arc, LazyLock};

/// Rides per `/listrides` page
pub const LIST_PAGE_SIZE: u64 = 5;

static COMMAND_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^/([A-Za-z_]+)(?:@[A-Za-z0-9_]+)?(?:\s+(\S+))?").expect("valid command regex")
});

static PARAM_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([A-Za-z_]+)\s*:\s*(.*)$").expect("valid parameter regex")
});

const HELP_TEXT: &str = "<b>🚲 Ride bot</b>

/newride · create a ride step by step
/updateride · edit a ride (reply to it or pass its id)
/cancelride · mark a ride as cancelled
/resumeride · undo a cancellation
/deleteride · remove a ride and its messages
/dupride · copy a ride
/listrides · your rides, newest first
/shareride · post a ride into this chat

Any of the ride commands accept <code>key: value</code> lines instead of the wizard:
<code>/newride
title: Morning Ride
when: tomorrow 9am
category: gravel
dist: 60 km</code>";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    NewRide,
    UpdateRide,
    CancelRide,
    ResumeRide,
    DeleteRide,
    DupRide,
    ListRides,
    ShareRide,
    Help,
    Start,
}

impl CommandKind {
    pub fn from_name(name: &str) -> Option<Self> {
        let kind = match name.to_ascii_lowercase().as_str() {
            "newride" => CommandKind::NewRide,
            "updateride" => CommandKind::UpdateRide,
            "cancelride" => CommandKind::CancelRide,
            "resumeride" => CommandKind::ResumeRide,
            "deleteride" => CommandKind::DeleteRide,
            "dupride" => CommandKind::DupRide,
            "listrides" => CommandKind::ListRides,
            "shareride" => CommandKind::ShareRide,
            "help" => CommandKind::Help,
            "start" => CommandKind::Start,
            _ => return None,
        };
        Some(kind)
    }

    pub fn name(self) -> &'static str {
        match self {
            CommandKind::NewRide => "newride",
            CommandKind::UpdateRide => "updateride",
            CommandKind::CancelRide => "cancelride",
            CommandKind::ResumeRide => "resumeride",
            CommandKind::DeleteRide => "deleteride",
            CommandKind::DupRide => "dupride",
            CommandKind::ListRides => "listrides",
            CommandKind::ShareRide => "shareride",
            CommandKind::Help => "help",
            CommandKind::Start => "start",
        }
    }
}

/// A parsed slash command
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    pub kind: CommandKind,
    /// First token after the command word
    pub argument: Option<String>,
    pub params: Vec<(String, String)>,
}

impl Command {
    /// Ride the command refers to: the argument, then an `id:` line, then
    /// the ride shown in the replied-to message
    pub fn ride_reference(&self, reply_text: Option<&str>) -> Option<String> {
        if let Some(argument) = &self.argument {
            let id = argument.trim_start_matches('#');
            if !id.is_empty() {
                return Some(id.to_string());
            }
        }
        if let Some((_, value)) = self
            .params
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(ID_PARAM))
        {
            let id = value.trim().trim_start_matches('#');
            if !id.is_empty() {
                return Some(id.to_string());
            }
        }
        reply_text.and_then(extract_ride_id)
    }

    /// Whether the parameter block sets any ride field
    pub fn has_field_params(&self) -> bool {
        self.params
            .iter()
            .any(|(key, _)| !key.eq_ignore_ascii_case(ID_PARAM))
    }
}

/// Parse a message as a command; `None` for plain text and unknown commands
pub fn parse_command(text: &str) -> Option<Command> {
    let text = text.trim_start();
    let (first_line, rest) = text.split_once('\n').unwrap_or((text, ""));
    let caps = COMMAND_RE.captures(first_line.trim_end())?;
    let kind = CommandKind::from_name(caps.get(1)?.as_str())?;
    Some(Command {
        kind,
        argument: caps.get(2).map(|m| m.as_str().to_string()),
        params: parse_params(rest),
    })
}

/// Parse `key: value` lines.
///
/// Keys are lowercased. A line that is not a `key: value` pair continues
/// the previous value, so free text can span several lines.
pub fn parse_params(block: &str) -> Vec<(String, String)> {
    let mut params: Vec<(String, String)> = Vec::new();
    for line in block.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if let Some(caps) = PARAM_RE.captures(line) {
            params.push((caps[1].to_ascii_lowercase(), caps[2].trim().to_string()));
        } else if let Some((_, value)) = params.last_mut() {
            value.push('\n');
            value.push_str(line);
        } else {
            tracing::debug!(line, "Ignoring text before the first parameter");
        }
    }
    params
}

/// Who sent a command and where
#[derive(Debug, Clone)]
pub struct CommandContext<'a> {
    pub user: &'a UserProfile,
    pub chat_id: i64,
    pub thread_id: Option<i64>,
    /// Text of the message the command replies to
    pub reply_text: Option<&'a str>,
}

impl CommandContext<'_> {
    fn destination(&self) -> Destination {
        Destination::thread(self.chat_id, self.thread_id)
    }

    fn session_key(&self) -> SessionKey {
        SessionKey::new(self.user.user_id, self.chat_id)
    }
}

/// Executes commands against the wizard, repository and synchronizer
pub struct CommandService {
    repo: RideRepository,
    sync: Arc<MessageSynchronizer>,
    wizard: Arc<WizardEngine>,
}

impl CommandService {
    pub fn new(
        repo: RideRepository,
        sync: Arc<MessageSynchronizer>,
        wizard: Arc<WizardEngine>,
    ) -> Self {
        Self { repo, sync, wizard }
    }

    /// Run a command; returns the HTML reply for the chat, if any
    pub async fn execute(
        &self,
        command: &Command,
        ctx: &CommandContext<'_>,
    ) -> RideResult<Option<String>> {
        tracing::info!(
            command = command.kind.name(),
            user_id = ctx.user.user_id,
            chat_id = ctx.chat_id,
            params = command.params.len(),
            "Executing command"
        );
        match command.kind {
            CommandKind::NewRide => self.new_ride(command, ctx).await,
            CommandKind::UpdateRide => self.update_ride(command, ctx).await,
            CommandKind::CancelRide => self.set_cancelled(command, ctx, true).await,
            CommandKind::ResumeRide => self.set_cancelled(command, ctx, false).await,
            CommandKind::DeleteRide => self.delete_ride(command, ctx).await,
            CommandKind::DupRide => self.duplicate_ride(command, ctx).await,
            CommandKind::ListRides => self.list_rides(command, ctx).map(Some),
            CommandKind::ShareRide => self.share_ride(command, ctx).await,
            CommandKind::Help | CommandKind::Start => Ok(Some(HELP_TEXT.to_string())),
        }
    }

    async fn new_ride(
        &self,
        command: &Command,
        ctx: &CommandContext<'_>,
    ) -> RideResult<Option<String>> {
        if !command.has_field_params() {
            self.wizard
                .start(ctx.session_key(), ctx.thread_id, WizardMode::Create)
                .await?;
            return Ok(None);
        }
        let ride = self
            .repo
            .create_from_parameters(&command.params, ctx.user.user_id)?;
        self.sync.post_initial(&ride.id, ctx.destination()).await?;
        Ok(None)
    }

    async fn update_ride(
        &self,
        command: &Command,
        ctx: &CommandContext<'_>,
    ) -> RideResult<Option<String>> {
        let ride_id = require_ride(command, ctx)?;
        if !command.has_field_params() {
            self.wizard
                .start(ctx.session_key(), ctx.thread_id, WizardMode::Update { ride_id })
                .await?;
            return Ok(None);
        }
        let ride = self
            .repo
            .update_from_parameters(&ride_id, &command.params, ctx.user.user_id)?;
        let outcome = self.sync.resync(&ride.id).await?;
        Ok(Some(format!(
            "✅ Ride <b>{}</b> updated ({} message(s) refreshed)",
            escape_html(&ride.details.title),
            outcome.updated_count
        )))
    }

    async fn set_cancelled(
        &self,
        command: &Command,
        ctx: &CommandContext<'_>,
        cancelled: bool,
    ) -> RideResult<Option<String>> {
        let ride_id = require_ride(command, ctx)?;
        let ride = self
            .repo
            .set_cancelled(&ride_id, cancelled, ctx.user.user_id)?;
        self.sync.resync(&ride.id).await?;
        let title = escape_html(&ride.details.title);
        Ok(Some(if cancelled {
            format!("❌ Ride <b>{title}</b> cancelled")
        } else {
            format!("✅ Ride <b>{title}</b> is back on")
        }))
    }

    async fn delete_ride(
        &self,
        command: &Command,
        ctx: &CommandContext<'_>,
    ) -> RideResult<Option<String>> {
        let ride_id = require_ride(command, ctx)?;
        let ride = self.repo.delete(&ride_id, ctx.user.user_id)?;
        self.sync.retract(&ride).await;
        Ok(Some(format!(
            "🗑 Ride <b>{}</b> deleted",
            escape_html(&ride.details.title)
        )))
    }

    async fn duplicate_ride(
        &self,
        command: &Command,
        ctx: &CommandContext<'_>,
    ) -> RideResult<Option<String>> {
        let source_ride_id = require_ride(command, ctx)?;
        if !command.has_field_params() {
            self.wizard
                .start(
                    ctx.session_key(),
                    ctx.thread_id,
                    WizardMode::Duplicate { source_ride_id },
                )
                .await?;
            return Ok(None);
        }
        let ride = self.repo.duplicate_from_parameters(
            &source_ride_id,
            &command.params,
            ctx.user.user_id,
        )?;
        self.sync.post_initial(&ride.id, ctx.destination()).await?;
        Ok(None)
    }

    fn list_rides(&self, command: &Command, ctx: &CommandContext<'_>) -> RideResult<String> {
        let page_number = match &command.argument {
            None => 1,
            Some(raw) => raw
                .parse::<u64>()
                .ok()
                .filter(|&n| n >= 1)
                .ok_or_else(|| FieldError::new("The page must be a positive number"))?,
        };
        let skip = (page_number - 1) * LIST_PAGE_SIZE;
        let page = self
            .repo
            .list_by_creator(ctx.user.user_id, skip, LIST_PAGE_SIZE)?;

        if page.total == 0 {
            return Ok("You have not created any rides yet. Start with /newride".to_string());
        }
        let page_count = page.total.div_ceil(LIST_PAGE_SIZE);
        if page.rides.is_empty() {
            return Ok(format!(
                "There is no page {page_number}. You have {page_count} page(s) of rides"
            ));
        }

        let mut text = format!(
            "<b>Your rides</b> · page {page_number}/{page_count} · {} total\n",
            page.total
        );
        for ride in &page.rides {
            let _ = write!(
                text,
                "\n• <b>{}</b> · {} · <code>{}</code>",
                escape_html(&ride.details.title),
                format_date(ride.details.date),
                ride.id
            );
            if ride.cancelled {
                text.push_str(" ❌");
            }
        }
        if page_number < page_count {
            let _ = write!(text, "\n\nNext: /listrides {}", page_number + 1);
        }
        Ok(text)
    }

    async fn share_ride(
        &self,
        command: &Command,
        ctx: &CommandContext<'_>,
    ) -> RideResult<Option<String>> {
        let ride_id = require_ride(command, ctx)?;
        let shared = self
            .sync
            .share(&ride_id, ctx.destination(), ctx.user.user_id)
            .await?;
        Ok(shared
            .is_none()
            .then(|| "This chat already shows the ride".to_string()))
    }
}

fn require_ride(command: &Command, ctx: &CommandContext<'_>) -> RideResult<String> {
    command.ride_reference(ctx.reply_text).ok_or_else(|| {
        RideError::Validation(FieldError::new(format!(
            "Reply to a ride message or pass its id: /{} <id>",
            command.kind.name()
        )))
    })
}
