//! Chat transport abstraction
//!
//! The core only talks to the chat platform through [`Transport`]. The
//! production adapter speaks the Bot API over HTTP; tests use the mocks in
//! `crate::testing`.

mod error;
mod telegram;

pub use error::{TransportError, TransportFailureKind};
pub use telegram::TelegramTransport;

use crate::ride::{Destination, MessageHandle};
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

/// Maximum length of a message text, in characters
pub const MAX_MESSAGE_LENGTH: usize = 4096;

/// One inline keyboard button
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InlineButton {
    pub text: String,
    pub callback_data: String,
}

impl InlineButton {
    pub fn callback(text: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            callback_data: data.into(),
        }
    }
}

/// Inline keyboard attached to a message
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Keyboard {
    pub rows: Vec<Vec<InlineButton>>,
}

impl Keyboard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn row(mut self, buttons: Vec<InlineButton>) -> Self {
        if !buttons.is_empty() {
            self.rows.push(buttons);
        }
        self
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Every callback payload on the keyboard
    pub fn callbacks(&self) -> Vec<&str> {
        self.rows
            .iter()
            .flatten()
            .map(|b| b.callback_data.as_str())
            .collect()
    }
}

/// HTML-formatted message with an optional keyboard
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutgoingMessage {
    pub text: String,
    pub keyboard: Keyboard,
}

impl OutgoingMessage {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            keyboard: Keyboard::default(),
        }
    }

    pub fn with_keyboard(mut self, keyboard: Keyboard) -> Self {
        self.keyboard = keyboard;
        self
    }
}

/// Chat platform operations used by the core
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send a message and return its handle
    async fn send_message(
        &self,
        destination: Destination,
        message: &OutgoingMessage,
    ) -> Result<MessageHandle, TransportError>;

    /// Replace the text and keyboard of a sent message
    async fn edit_message(
        &self,
        handle: MessageHandle,
        message: &OutgoingMessage,
    ) -> Result<(), TransportError>;

    async fn delete_message(&self, handle: MessageHandle) -> Result<(), TransportError>;

    /// Acknowledge an inline button press, optionally with a toast
    async fn answer_callback(
        &self,
        callback_id: &str,
        text: Option<&str>,
    ) -> Result<(), TransportError>;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Arc<T> {
    async fn send_message(
        &self,
        destination: Destination,
        message: &OutgoingMessage,
    ) -> Result<MessageHandle, TransportError> {
        (**self).send_message(destination, message).await
    }

    async fn edit_message(
        &self,
        handle: MessageHandle,
        message: &OutgoingMessage,
    ) -> Result<(), TransportError> {
        (**self).edit_message(handle, message).await
    }

    async fn delete_message(&self, handle: MessageHandle) -> Result<(), TransportError> {
        (**self).delete_message(handle).await
    }

    async fn answer_callback(
        &self,
        callback_id: &str,
        text: Option<&str>,
    ) -> Result<(), TransportError> {
        (**self).answer_callback(callback_id, text).await
    }
}

/// Wrapper that bounds every call by a timeout and logs failures
pub struct BoundedTransport<T> {
    inner: T,
    timeout: Duration,
}

impl<T: Transport> BoundedTransport<T> {
    pub fn new(inner: T, timeout: Duration) -> Self {
        Self { inner, timeout }
    }

    async fn bounded<R, F>(&self, operation: &'static str, call: F) -> Result<R, TransportError>
    where
        F: std::future::Future<Output = Result<R, TransportError>> + Send,
    {
        let start = std::time::Instant::now();
        let result = match tokio::time::timeout(self.timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::timeout(format!(
                "{operation} timed out after {}s",
                self.timeout.as_secs()
            ))),
        };

        if let Err(e) = &result {
            if e.kind != TransportFailureKind::NotModified {
                tracing::warn!(
                    operation,
                    duration_ms = %start.elapsed().as_millis(),
                    error = %e.message,
                    kind = ?e.kind,
                    permanent = e.is_permanent(),
                    "Transport call failed"
                );
            }
        }
        result
    }
}

#[async_trait]
impl<T: Transport> Transport for BoundedTransport<T> {
    async fn send_message(
        &self,
        destination: Destination,
        message: &OutgoingMessage,
    ) -> Result<MessageHandle, TransportError> {
        self.bounded("send_message", self.inner.send_message(destination, message))
            .await
    }

    async fn edit_message(
        &self,
        handle: MessageHandle,
        message: &OutgoingMessage,
    ) -> Result<(), TransportError> {
        self.bounded("edit_message", self.inner.edit_message(handle, message))
            .await
    }

    async fn delete_message(&self, handle: MessageHandle) -> Result<(), TransportError> {
        self.bounded("delete_message", self.inner.delete_message(handle))
            .await
    }

    async fn answer_callback(
        &self,
        callback_id: &str,
        text: Option<&str>,
    ) -> Result<(), TransportError> {
        self.bounded("answer_callback", self.inner.answer_callback(callback_id, text))
            .await
    }
}
