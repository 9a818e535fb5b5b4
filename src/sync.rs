//! Message synchronizer
//!
//! Keeps every chat message that shows a ride in step with the stored
//! ride. Posts and resyncs of one ride are serialized through a per-ride
//! lock so that two resyncs can never both prune from a stale handle list.

use crate::error::{RideError, RideResult};
use crate::render::{RenderOptions, RideRenderer};
use crate::repository::RideRepository;
use crate::ride::{Destination, MessageHandle, Ride};
use crate::transport::{OutgoingMessage, Transport, TransportError, TransportFailureKind};
use futures::future::join_all;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

/// Result of pushing a ride to all of its messages
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncOutcome {
    pub updated_count: usize,
    pub removed_count: usize,
    /// Transient failures; those handles are kept for the next resync
    pub failed_count: usize,
}

enum EditResult {
    Updated,
    Unreachable,
    Failed,
}

pub struct MessageSynchronizer {
    repo: RideRepository,
    transport: Arc<dyn Transport>,
    renderer: Arc<dyn RideRenderer>,
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl MessageSynchronizer {
    pub fn new(
        repo: RideRepository,
        transport: Arc<dyn Transport>,
        renderer: Arc<dyn RideRenderer>,
    ) -> Self {
        Self {
            repo,
            transport,
            renderer,
            locks: Mutex::new(HashMap::new()),
        }
    }

    fn ride_lock(&self, ride_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        locks.entry(ride_id.to_string()).or_default().clone()
    }

    /// Creator hints only go to the creator's private chat
    fn render_for(&self, ride: &Ride, chat_id: i64) -> OutgoingMessage {
        let options = RenderOptions {
            for_creator: chat_id == ride.created_by,
        };
        self.renderer.render(ride, &ride.participation, options)
    }

    /// Send the ride to a chat and start tracking the message
    pub async fn post_initial(
        &self,
        ride_id: &str,
        destination: Destination,
    ) -> RideResult<MessageHandle> {
        let lock = self.ride_lock(ride_id);
        let _guard = lock.lock().await;

        let ride = self.repo.get(ride_id)?;
        self.post_locked(&ride, destination).await
    }

    async fn post_locked(&self, ride: &Ride, destination: Destination) -> RideResult<MessageHandle> {
        let message = self.render_for(ride, destination.chat_id);
        let handle = self.transport.send_message(destination, &message).await?;
        self.repo.add_message(&ride.id, handle)?;
        tracing::info!(
            ride_id = %ride.id,
            chat_id = handle.chat_id,
            message_id = handle.message_id,
            thread_id = ?handle.thread_id,
            "Ride posted"
        );
        Ok(handle)
    }

    /// Post the ride to another chat unless that chat already shows it.
    ///
    /// Only the creator may share. Returns `None` when the chat already
    /// carries a copy.
    pub async fn share(
        &self,
        ride_id: &str,
        destination: Destination,
        actor: i64,
    ) -> RideResult<Option<MessageHandle>> {
        let lock = self.ride_lock(ride_id);
        let _guard = lock.lock().await;

        let ride = self.repo.get(ride_id)?;
        if !ride.is_creator(actor) {
            return Err(RideError::permission_denied(ride_id, "share"));
        }
        if ride.has_message_in(destination.chat_id) {
            tracing::debug!(ride_id, chat_id = destination.chat_id, "Ride already in chat");
            return Ok(None);
        }
        self.post_locked(&ride, destination).await.map(Some)
    }

    /// Re-render the ride and push it to every tracked message.
    ///
    /// Messages the platform reports as permanently unreachable are dropped
    /// from the ride; transient failures keep their handle. A partial
    /// success is still a success.
    pub async fn resync(&self, ride_id: &str) -> RideResult<SyncOutcome> {
        let lock = self.ride_lock(ride_id);
        let _guard = lock.lock().await;

        let ride = self.repo.get(ride_id)?;
        let public = self.renderer.render(&ride, &ride.participation, RenderOptions::default());
        let creator = self.renderer.render(
            &ride,
            &ride.participation,
            RenderOptions { for_creator: true },
        );

        let edits = ride.messages.iter().map(|&handle| {
            let message = if handle.chat_id == ride.created_by {
                &creator
            } else {
                &public
            };
            async move {
                let result = self.transport.edit_message(handle, message).await;
                (handle, classify_edit(result))
            }
        });
        let results = join_all(edits).await;

        let mut outcome = SyncOutcome::default();
        let mut surviving = Vec::with_capacity(results.len());
        for (handle, result) in results {
            match result {
                EditResult::Updated => {
                    outcome.updated_count += 1;
                    surviving.push(handle);
                }
                EditResult::Unreachable => {
                    outcome.removed_count += 1;
                    tracing::info!(
                        ride_id,
                        chat_id = handle.chat_id,
                        message_id = handle.message_id,
                        "Dropping unreachable ride message"
                    );
                }
                EditResult::Failed => {
                    outcome.failed_count += 1;
                    surviving.push(handle);
                }
            }
        }

        if outcome.removed_count > 0 {
            self.repo.replace_messages(ride_id, &surviving)?;
        }
        tracing::info!(
            ride_id,
            updated = outcome.updated_count,
            removed = outcome.removed_count,
            failed = outcome.failed_count,
            "Ride resynced"
        );
        Ok(outcome)
    }

    /// Best-effort removal of every message of a ride that is going away
    pub async fn retract(&self, ride: &Ride) -> usize {
        let deletes = ride
            .messages
            .iter()
            .map(|&handle| self.transport.delete_message(handle));
        let deleted = join_all(deletes).await.iter().filter(|r| r.is_ok()).count();
        tracing::info!(ride_id = %ride.id, deleted, total = ride.messages.len(), "Ride messages retracted");
        deleted
    }
}

fn classify_edit(result: Result<(), TransportError>) -> EditResult {
    match result {
        Ok(()) => EditResult::Updated,
        Err(e) if e.kind == TransportFailureKind::NotModified => EditResult::Updated,
        Err(e) if e.is_permanent() => EditResult::Unreachable,
        Err(_) => EditResult::Failed,
    }
}
