//! Bot API transport over HTTP

use super::{Keyboard, OutgoingMessage, Transport, TransportError, TransportFailureKind};
use crate::ride::{Destination, MessageHandle};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};

/// Bot API response envelope
#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    error_code: Option<i64>,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SentMessage {
    message_id: i64,
    chat: SentChat,
    message_thread_id: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct SentChat {
    id: i64,
}

/// Bot API client
pub struct TelegramTransport {
    client: reqwest::Client,
    base_url: String,
}

impl TelegramTransport {
    pub fn new(api_url: &str, token: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: format!("{}/bot{token}", api_url.trim_end_matches('/')),
        }
    }

    /// Point the platform at our webhook endpoint
    pub async fn set_webhook(&self, url: &str, secret: Option<&str>) -> Result<(), TransportError> {
        let mut body = json!({
            "url": url,
            "allowed_updates": ["message", "callback_query"],
        });
        if let Some(secret) = secret {
            body["secret_token"] = json!(secret);
        }
        self.call::<Value>("setWebhook", &body).await.map(|_| ())
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        body: &Value,
    ) -> Result<T, TransportError> {
        let response = self
            .client
            .post(format!("{}/{method}", self.base_url))
            .json(body)
            .send()
            .await
            .map_err(|e| TransportError::network(format!("{method}: {e}")))?;

        let status = response.status();
        let envelope: ApiResponse<T> = response.json().await.map_err(|e| {
            TransportError::new(
                TransportFailureKind::classify(Some(i64::from(status.as_u16())), ""),
                format!("{method}: unreadable response ({status}): {e}"),
            )
        })?;

        if envelope.ok {
            return envelope
                .result
                .ok_or_else(|| TransportError::unknown(format!("{method}: missing result")));
        }

        let description = envelope.description.unwrap_or_default();
        let code = envelope
            .error_code
            .or_else(|| Some(i64::from(status.as_u16())));
        Err(TransportError::new(
            TransportFailureKind::classify(code, &description),
            format!("{method}: {description}"),
        ))
    }
}

fn reply_markup(keyboard: &Keyboard) -> Value {
    json!({ "inline_keyboard": keyboard.rows })
}

#[async_trait]
impl Transport for TelegramTransport {
    async fn send_message(
        &self,
        destination: Destination,
        message: &OutgoingMessage,
    ) -> Result<MessageHandle, TransportError> {
        let mut body = json!({
            "chat_id": destination.chat_id,
            "text": message.text,
            "parse_mode": "HTML",
            "link_preview_options": { "is_disabled": true },
        });
        if let Some(thread_id) = destination.thread_id {
            body["message_thread_id"] = json!(thread_id);
        }
        if !message.keyboard.is_empty() {
            body["reply_markup"] = reply_markup(&message.keyboard);
        }

        let sent: SentMessage = self.call("sendMessage", &body).await?;
        Ok(MessageHandle::new(
            sent.chat.id,
            sent.message_id,
            sent.message_thread_id.or(destination.thread_id),
        ))
    }

    async fn edit_message(
        &self,
        handle: MessageHandle,
        message: &OutgoingMessage,
    ) -> Result<(), TransportError> {
        let body = json!({
            "chat_id": handle.chat_id,
            "message_id": handle.message_id,
            "text": message.text,
            "parse_mode": "HTML",
            "link_preview_options": { "is_disabled": true },
            "reply_markup": reply_markup(&message.keyboard),
        });
        self.call::<Value>("editMessageText", &body).await.map(|_| ())
    }

    async fn delete_message(&self, handle: MessageHandle) -> Result<(), TransportError> {
        let body = json!({
            "chat_id": handle.chat_id,
            "message_id": handle.message_id,
        });
        self.call::<Value>("deleteMessage", &body).await.map(|_| ())
    }

    async fn answer_callback(
        &self,
        callback_id: &str,
        text: Option<&str>,
    ) -> Result<(), TransportError> {
        let mut body = json!({ "callback_query_id": callback_id });
        if let Some(text) = text {
            body["text"] = json!(text);
        }
        self.call::<Value>("answerCallbackQuery", &body).await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::InlineButton;

    #[test]
    fn test_reply_markup_shape() {
        let keyboard = Keyboard::new().row(vec![
            InlineButton::callback("Join", "join:abc"),
            InlineButton::callback("Leave", "leave:abc"),
        ]);
        let markup = reply_markup(&keyboard);
        assert_eq!(markup["inline_keyboard"][0][0]["callback_data"], "join:abc");
        assert_eq!(markup["inline_keyboard"][0][1]["text"], "Leave");
    }

    #[test]
    fn test_error_envelope_parses() {
        let raw = r#"{"ok":false,"error_code":403,"description":"Forbidden: bot was blocked by the user"}"#;
        let envelope: ApiResponse<Value> = serde_json::from_str(raw).unwrap();
        assert!(!envelope.ok);
        let kind = TransportFailureKind::classify(
            envelope.error_code,
            envelope.description.as_deref().unwrap_or_default(),
        );
        assert_eq!(kind, TransportFailureKind::BotBlocked);
    }

    #[test]
    fn test_base_url_strips_trailing_slash() {
        let transport = TelegramTransport::new("https://api.telegram.org/", "123:abc");
        assert_eq!(transport.base_url, "https://api.telegram.org/bot123:abc");
    }
}
