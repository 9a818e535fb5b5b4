//! Inbound Bot API update payloads
//!
//! Only the fields the dispatcher reads are modelled; everything else in
//! the webhook body is ignored by serde.

use crate::ride::{MessageHandle, UserProfile};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    pub message: Option<Message>,
    pub callback_query: Option<CallbackQuery>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct User {
    pub id: i64,
    #[serde(default)]
    pub is_bot: bool,
    pub first_name: String,
    pub last_name: Option<String>,
    pub username: Option<String>,
}

impl User {
    pub fn profile(&self) -> UserProfile {
        let profile = UserProfile::new(self.id).with_name(&self.first_name, self.last_name.as_deref());
        match &self.username {
            Some(username) => profile.with_username(username),
            None => profile,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub message_id: i64,
    pub from: Option<User>,
    pub chat: Chat,
    pub text: Option<String>,
    pub message_thread_id: Option<i64>,
    #[serde(default)]
    pub is_topic_message: bool,
    pub reply_to_message: Option<Box<Message>>,
}

impl Message {
    /// Forum topic the message belongs to.
    ///
    /// Outside forum topics the platform also sets `message_thread_id` on
    /// replies; sending into that id fails, so it is ignored.
    pub fn thread_id(&self) -> Option<i64> {
        if self.is_topic_message {
            self.message_thread_id
        } else {
            None
        }
    }

    pub fn handle(&self) -> MessageHandle {
        MessageHandle::new(self.chat.id, self.message_id, self.thread_id())
    }

    pub fn reply_text(&self) -> Option<&str> {
        self.reply_to_message.as_ref()?.text.as_deref()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CallbackQuery {
    pub id: String,
    pub from: User,
    /// The message carrying the pressed button; absent when it is too old
    pub message: Option<Message>,
    pub data: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_topic_reply() {
        let update: Update = serde_json::from_value(json!({
            "update_id": 1,
            "message": {
                "message_id": 42,
                "from": {"id": 7, "is_bot": false, "first_name": "Ana", "username": "ana"},
                "chat": {"id": -100, "type": "supergroup", "title": "Club"},
                "date": 1_700_000_000,
                "message_thread_id": 5,
                "is_topic_message": true,
                "text": "/updateride",
                "reply_to_message": {
                    "message_id": 40,
                    "chat": {"id": -100, "type": "supergroup"},
                    "text": "Morning Ride\n🎫 #Ride #AbCdEfGhIjK"
                }
            }
        }))
        .unwrap();

        let message = update.message.unwrap();
        assert_eq!(message.thread_id(), Some(5));
        assert_eq!(message.handle(), MessageHandle::new(-100, 42, Some(5)));
        assert!(message.reply_text().unwrap().contains("AbCdEfGhIjK"));

        let profile = message.from.unwrap().profile();
        assert_eq!(profile.username.as_deref(), Some("ana"));
        assert_eq!(profile.display_name(), "Ana");
    }

    #[test]
    fn test_reply_thread_outside_topics_is_ignored() {
        let message: Message = serde_json::from_value(json!({
            "message_id": 3,
            "chat": {"id": -5, "type": "group"},
            "message_thread_id": 2,
            "text": "hello"
        }))
        .unwrap();
        assert_eq!(message.thread_id(), None);
        assert!(message.from.is_none());
    }

    #[test]
    fn test_parse_callback_query() {
        let update: Update = serde_json::from_value(json!({
            "update_id": 2,
            "callback_query": {
                "id": "cb-1",
                "from": {"id": 7, "first_name": "Ana"},
                "chat_instance": "x",
                "data": "join:AbCdEfGhIjK",
                "message": {"message_id": 9, "chat": {"id": -100, "type": "group"}}
            }
        }))
        .unwrap();
        let query = update.callback_query.unwrap();
        assert_eq!(query.data.as_deref(), Some("join:AbCdEfGhIjK"));
        assert_eq!(query.message.unwrap().chat.id, -100);
        assert!(update.message.is_none());
    }
}
