//! Mock implementations for testing
//!
//! These mocks stand in for the chat platform and route pages so flows can
//! be driven end to end without network I/O.

use crate::ride::{Destination, MessageHandle, RideDraft};
use crate::route::{RouteError, RouteInfo, RouteInspector};
use crate::transport::{OutgoingMessage, Transport, TransportError};
use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

// ============================================================================
// Mock Transport
// ============================================================================

/// In-memory chat platform recording every call
#[derive(Default)]
pub struct MockTransport {
    next_message_id: AtomicI64,
    delay: Option<Duration>,
    /// Current content of every live message
    messages: Mutex<HashMap<(i64, i64), OutgoingMessage>>,
    failing_messages: Mutex<HashMap<(i64, i64), TransportError>>,
    failing_chats: Mutex<HashMap<i64, TransportError>>,
    /// Record of all sends, in order
    pub sent: Mutex<Vec<(MessageHandle, OutgoingMessage)>>,
    /// Record of all edits, in order
    pub edited: Mutex<Vec<(MessageHandle, OutgoingMessage)>>,
    pub deleted: Mutex<Vec<MessageHandle>>,
    pub answered: Mutex<Vec<(String, Option<String>)>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self {
            next_message_id: AtomicI64::new(100),
            ..Self::default()
        }
    }

    /// Sleep before answering every call
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Make every call touching this message fail
    pub fn fail_message(&self, handle: MessageHandle, error: TransportError) {
        self.failing_messages
            .lock()
            .unwrap()
            .insert((handle.chat_id, handle.message_id), error);
    }

    /// Make every call touching this chat fail
    pub fn fail_chat(&self, chat_id: i64, error: TransportError) {
        self.failing_chats.lock().unwrap().insert(chat_id, error);
    }

    /// What the message currently shows
    pub fn current(&self, handle: MessageHandle) -> Option<OutgoingMessage> {
        self.messages
            .lock()
            .unwrap()
            .get(&(handle.chat_id, handle.message_id))
            .cloned()
    }

    /// Live messages in a chat, oldest first
    pub fn live_in(&self, chat_id: i64) -> Vec<(i64, OutgoingMessage)> {
        let mut live: Vec<(i64, OutgoingMessage)> = self
            .messages
            .lock()
            .unwrap()
            .iter()
            .filter(|((chat, _), _)| *chat == chat_id)
            .map(|((_, id), msg)| (*id, msg.clone()))
            .collect();
        live.sort_by_key(|(id, _)| *id);
        live
    }

    /// Text of every message sent, in order
    pub fn sent_texts(&self) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .map(|(_, msg)| msg.text.clone())
            .collect()
    }

    pub fn edit_count(&self) -> usize {
        self.edited.lock().unwrap().len()
    }

    fn check(&self, chat_id: i64, message_id: Option<i64>) -> Result<(), TransportError> {
        if let Some(err) = self.failing_chats.lock().unwrap().get(&chat_id) {
            return Err(err.clone());
        }
        if let Some(message_id) = message_id {
            if let Some(err) = self
                .failing_messages
                .lock()
                .unwrap()
                .get(&(chat_id, message_id))
            {
                return Err(err.clone());
            }
        }
        Ok(())
    }

    async fn pause(&self) {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send_message(
        &self,
        destination: Destination,
        message: &OutgoingMessage,
    ) -> Result<MessageHandle, TransportError> {
        self.pause().await;
        self.check(destination.chat_id, None)?;

        let message_id = self.next_message_id.fetch_add(1, Ordering::SeqCst);
        let handle = MessageHandle::new(destination.chat_id, message_id, destination.thread_id);
        self.messages
            .lock()
            .unwrap()
            .insert((handle.chat_id, handle.message_id), message.clone());
        self.sent.lock().unwrap().push((handle, message.clone()));
        Ok(handle)
    }

    async fn edit_message(
        &self,
        handle: MessageHandle,
        message: &OutgoingMessage,
    ) -> Result<(), TransportError> {
        self.pause().await;
        self.check(handle.chat_id, Some(handle.message_id))?;

        let mut messages = self.messages.lock().unwrap();
        let Some(current) = messages.get_mut(&(handle.chat_id, handle.message_id)) else {
            return Err(TransportError::message_gone(
                "Bad Request: message to edit not found",
            ));
        };
        *current = message.clone();
        self.edited.lock().unwrap().push((handle, message.clone()));
        Ok(())
    }

    async fn delete_message(&self, handle: MessageHandle) -> Result<(), TransportError> {
        self.pause().await;
        self.check(handle.chat_id, Some(handle.message_id))?;

        self.messages
            .lock()
            .unwrap()
            .remove(&(handle.chat_id, handle.message_id));
        self.deleted.lock().unwrap().push(handle);
        Ok(())
    }

    async fn answer_callback(
        &self,
        callback_id: &str,
        text: Option<&str>,
    ) -> Result<(), TransportError> {
        self.answered
            .lock()
            .unwrap()
            .push((callback_id.to_string(), text.map(String::from)));
        Ok(())
    }
}

// ============================================================================
// Mock Route Inspector
// ============================================================================

/// Route inspector returning queued results
#[derive(Default)]
pub struct MockRouteInspector {
    results: Mutex<VecDeque<Result<Option<RouteInfo>, RouteError>>>,
    delay: Option<Duration>,
    /// Record of inspected links
    pub inspected: Mutex<Vec<String>>,
}

impl MockRouteInspector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn queue_info(&self, info: RouteInfo) {
        self.results.lock().unwrap().push_back(Ok(Some(info)));
    }

    pub fn queue_error(&self, error: RouteError) {
        self.results.lock().unwrap().push_back(Err(error));
    }
}

#[async_trait]
impl RouteInspector for MockRouteInspector {
    async fn inspect(&self, url: &str) -> Result<Option<RouteInfo>, RouteError> {
        self.inspected.lock().unwrap().push(url.to_string());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.results.lock().unwrap().pop_front().unwrap_or(Ok(None))
    }
}

// ============================================================================
// Fixtures
// ============================================================================

/// A complete draft for a ride tomorrow
pub fn draft(title: &str) -> RideDraft {
    RideDraft {
        title: Some(title.to_string()),
        date: Some(Utc::now() + ChronoDuration::days(1)),
        ..RideDraft::default()
    }
}
