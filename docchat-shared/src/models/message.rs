use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};
use uuid::Uuid;

use super::Timestamp;

/// Author of a chat message.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl Role {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::System => "system",
        }
    }
}

impl Display for Role {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for Role {
    type Error = &'static str;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "user" => Ok(Self::User),
            "assistant" => Ok(Self::Assistant),
            "system" => Ok(Self::System),
            _ => Err("invalid message role"),
        }
    }
}

/// A persisted chat message. Assistant messages start `in_progress` and are
/// finalized by the completion task with either `content` or `error`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Message {
    pub uuid: Uuid,
    pub chat_id: Uuid,
    pub role: Role,
    pub model: String,
    pub content: String,
    #[serde(default)]
    pub components: String,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub in_progress: bool,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Message {
    /// Materializes a new record from a create request, stamping identity and times.
    #[must_use]
    pub fn from_create(create: MessageCreate) -> Self {
        let now = Timestamp::now();
        Self {
            uuid: Uuid::new_v4(),
            chat_id: create.chat_id,
            role: create.role,
            model: create.model,
            content: create.content,
            components: create.components,
            error: create.error,
            in_progress: create.in_progress,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Fields required to create a message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MessageCreate {
    pub chat_id: Uuid,
    pub role: Role,
    pub model: String,
    pub content: String,
    #[serde(default)]
    pub components: String,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub in_progress: bool,
}

/// Partial update; `None` leaves the field untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct MessageUpdate {
    pub content: Option<String>,
    pub components: Option<String>,
    pub error: Option<String>,
    pub in_progress: Option<bool>,
}

impl MessageUpdate {
    /// Update recording a successful completion.
    #[must_use]
    pub fn completed(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            in_progress: Some(false),
            ..Self::default()
        }
    }

    /// Update recording a failed completion.
    #[must_use]
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            in_progress: Some(false),
            ..Self::default()
        }
    }

    pub fn apply(&self, message: &mut Message) {
        if let Some(content) = &self.content {
            message.content.clone_from(content);
        }
        if let Some(components) = &self.components {
            message.components.clone_from(components);
        }
        if let Some(error) = &self.error {
            message.error = Some(error.clone());
        }
        if let Some(in_progress) = self.in_progress {
            message.in_progress = in_progress;
        }
        message.updated_at = Timestamp::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pending_assistant() -> Message {
        Message::from_create(MessageCreate {
            chat_id: Uuid::new_v4(),
            role: Role::Assistant,
            model: "test-model".into(),
            content: String::new(),
            components: String::new(),
            error: None,
            in_progress: true,
        })
    }

    #[test]
    fn role_round_trips_through_str() {
        for role in [Role::User, Role::Assistant, Role::System] {
            assert_eq!(Role::try_from(role.as_str()), Ok(role));
        }
        assert!(Role::try_from("tool").is_err());
    }

    #[test]
    fn completed_update_clears_progress_and_sets_content() {
        let mut message = pending_assistant();
        MessageUpdate::completed("answer").apply(&mut message);

        assert_eq!(message.content, "answer");
        assert!(!message.in_progress);
        assert!(message.error.is_none());
        assert!(message.updated_at >= message.created_at);
    }

    #[test]
    fn failed_update_keeps_content_and_records_error() {
        let mut message = pending_assistant();
        MessageUpdate::failed("upstream timed out").apply(&mut message);

        assert_eq!(message.content, "");
        assert_eq!(message.error.as_deref(), Some("upstream timed out"));
        assert!(!message.in_progress);
    }

    #[test]
    fn message_serializes_with_snake_case_role() {
        let message = pending_assistant();
        let value = serde_json::to_value(&message).unwrap();

        assert_eq!(value["role"], "assistant");
        assert_eq!(value["in_progress"], true);
        assert!(value["error"].is_null());
    }
}
