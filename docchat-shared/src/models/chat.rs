use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{Message, Timestamp};

/// Default title given to chats created from a first message.
pub const DEFAULT_CHAT_NAME: &str = "New Chat";

/// A conversation thread owned by one user.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Chat {
    pub uuid: Uuid,
    pub name: String,
    pub user_uuid: Uuid,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Chat {
    #[must_use]
    pub fn from_create(create: ChatCreate) -> Self {
        let now = Timestamp::now();
        Self {
            uuid: Uuid::new_v4(),
            name: create.name,
            user_uuid: create.user_uuid,
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatCreate {
    pub name: String,
    pub user_uuid: Uuid,
}

/// Chat list entry: the chat plus activity derived from its latest message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatSummary {
    pub uuid: Uuid,
    pub name: String,
    pub user_uuid: Uuid,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    pub model: Option<String>,
}

impl ChatSummary {
    #[must_use]
    pub fn new(chat: &Chat, last_message: Option<&Message>) -> Self {
        let (updated_at, model) = match last_message {
            Some(message) => (message.created_at, Some(message.model.clone())),
            None => (chat.created_at, None),
        };

        Self {
            uuid: chat.uuid,
            name: chat.name.clone(),
            user_uuid: chat.user_uuid,
            created_at: chat.created_at,
            updated_at,
            model,
        }
    }
}

/// Body of `PATCH /chat/{id}`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatRenameRequest {
    #[serde(default)]
    pub name: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{MessageCreate, Role};

    #[test]
    fn summary_without_messages_uses_chat_creation_time() {
        let chat = Chat::from_create(ChatCreate {
            name: DEFAULT_CHAT_NAME.into(),
            user_uuid: Uuid::new_v4(),
        });

        let summary = ChatSummary::new(&chat, None);

        assert_eq!(summary.updated_at, chat.created_at);
        assert!(summary.model.is_none());
    }

    #[test]
    fn summary_tracks_last_message() {
        let chat = Chat::from_create(ChatCreate {
            name: "Specs".into(),
            user_uuid: Uuid::new_v4(),
        });
        let message = Message::from_create(MessageCreate {
            chat_id: chat.uuid,
            role: Role::User,
            model: "gpt-4o".into(),
            content: "hi".into(),
            components: String::new(),
            error: None,
            in_progress: false,
        });

        let summary = ChatSummary::new(&chat, Some(&message));

        assert_eq!(summary.updated_at, message.created_at);
        assert_eq!(summary.model.as_deref(), Some("gpt-4o"));
    }
}
