use std::{fmt, sync::Arc};

use serde_json::Value;
use shared::{
    config::server::LlmConfig,
    models::{
        Chat, ChatCreate, ChatSummary, CompletionRequest, DEFAULT_CHAT_NAME, LlmCatalog, Message,
        MessageCreate, Role, StreamEvent,
    },
};
use thiserror::Error;
use tracing::{instrument, warn};
use uuid::Uuid;

use super::{
    chat_stream::SharedStreams,
    completion::CompletionTask,
    completion_client::{CompletionClient, CompletionError},
    repository::{ChatRepository, DocumentRepository, MessageRepository, RepositoryError},
};

#[derive(Debug, Error)]
pub enum ChatServiceError {
    #[error("validation error: {0}")]
    Validation(String),
    #[error("unprocessable: {0}")]
    Unprocessable(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error(transparent)]
    Completion(#[from] CompletionError),
}

pub type ChatServiceResult<T> = Result<T, ChatServiceError>;

/// Chat workflows over the repositories, the completion client and the stream hub.
#[derive(Clone)]
pub struct ChatService {
    chats: Arc<dyn ChatRepository>,
    messages: Arc<dyn MessageRepository>,
    documents: Arc<dyn DocumentRepository>,
    client: Arc<dyn CompletionClient>,
    streams: SharedStreams,
    llm: Arc<LlmConfig>,
}

impl fmt::Debug for ChatService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChatService").finish_non_exhaustive()
    }
}

impl ChatService {
    pub fn new(
        chats: Arc<dyn ChatRepository>,
        messages: Arc<dyn MessageRepository>,
        documents: Arc<dyn DocumentRepository>,
        client: Arc<dyn CompletionClient>,
        streams: SharedStreams,
        llm: Arc<LlmConfig>,
    ) -> Self {
        Self {
            chats,
            messages,
            documents,
            client,
            streams,
            llm,
        }
    }

    pub fn streams(&self) -> &SharedStreams {
        &self.streams
    }

    pub fn messages(&self) -> Arc<dyn MessageRepository> {
        Arc::clone(&self.messages)
    }

    /// Loads a chat, treating chats owned by someone else as missing.
    pub async fn owned_chat(&self, user_uuid: Uuid, chat_id: Uuid) -> ChatServiceResult<Chat> {
        match self.chats.get_chat(chat_id).await? {
            Some(chat) if chat.user_uuid == user_uuid => Ok(chat),
            _ => Err(ChatServiceError::NotFound(format!("chat {chat_id}"))),
        }
    }

    /// Starts a new chat from a first message. Nothing is published: no one can be
    /// listening to a chat that did not exist yet.
    #[instrument(name = "chat.create", skip(self, request), fields(model = %request.model), err)]
    pub async fn create_chat(
        &self,
        user_uuid: Uuid,
        request: CompletionRequest,
    ) -> ChatServiceResult<Chat> {
        validate_request(&request)?;

        let chat = self
            .chats
            .create_chat(ChatCreate {
                name: DEFAULT_CHAT_NAME.to_string(),
                user_uuid,
            })
            .await?;

        let (_, pending) = self
            .create_exchange(chat.uuid, &request.model, &request.message)
            .await?;
        self.spawn_completion(user_uuid, chat.uuid, pending.uuid, request);

        Ok(chat)
    }

    /// Appends a user message and a pending assistant reply to an existing chat.
    #[instrument(name = "chat.post_message", skip(self, request), err)]
    pub async fn post_message(
        &self,
        user_uuid: Uuid,
        chat_id: Uuid,
        request: CompletionRequest,
    ) -> ChatServiceResult<(Message, Message)> {
        validate_request(&request)?;
        self.owned_chat(user_uuid, chat_id).await?;

        let (prompt, pending) = self
            .create_exchange(chat_id, &request.model, &request.message)
            .await?;

        for message in [&prompt, &pending] {
            match StreamEvent::message(message) {
                Ok(event) => self.streams.publish(chat_id, event),
                Err(err) => warn!(error = %err, message_id = %message.uuid, "failed to encode message event"),
            }
        }

        self.spawn_completion(user_uuid, chat_id, pending.uuid, request);
        Ok((prompt, pending))
    }

    async fn create_exchange(
        &self,
        chat_id: Uuid,
        model: &str,
        content: &str,
    ) -> ChatServiceResult<(Message, Message)> {
        let prompt = self
            .messages
            .create_message(MessageCreate {
                chat_id,
                role: Role::User,
                model: model.to_string(),
                content: content.to_string(),
                components: String::new(),
                error: None,
                in_progress: false,
            })
            .await?;

        let pending = self
            .messages
            .create_message(MessageCreate {
                chat_id,
                role: Role::Assistant,
                model: model.to_string(),
                content: String::new(),
                components: String::new(),
                error: None,
                in_progress: true,
            })
            .await?;

        Ok((prompt, pending))
    }

    fn spawn_completion(
        &self,
        user_uuid: Uuid,
        chat_id: Uuid,
        message_id: Uuid,
        request: CompletionRequest,
    ) {
        CompletionTask {
            user_uuid,
            chat_id,
            message_id,
            request,
            messages: Arc::clone(&self.messages),
            documents: Arc::clone(&self.documents),
            client: Arc::clone(&self.client),
            streams: Arc::clone(&self.streams),
        }
        .spawn();
    }

    /// The caller's chats, most recently active first.
    pub async fn summaries(&self, user_uuid: Uuid) -> ChatServiceResult<Vec<ChatSummary>> {
        let chats = self.chats.list_chats(user_uuid).await?;
        let ids: Vec<Uuid> = chats.iter().map(|chat| chat.uuid).collect();
        let last = self.messages.last_messages(&ids).await?;

        let mut summaries: Vec<ChatSummary> = chats
            .iter()
            .map(|chat| ChatSummary::new(chat, last.get(&chat.uuid)))
            .collect();
        summaries.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(summaries)
    }

    pub async fn summary(&self, user_uuid: Uuid, chat_id: Uuid) -> ChatServiceResult<ChatSummary> {
        let chat = self.owned_chat(user_uuid, chat_id).await?;
        let last = self.messages.last_messages(&[chat_id]).await?;
        Ok(ChatSummary::new(&chat, last.get(&chat_id)))
    }

    pub async fn rename(
        &self,
        user_uuid: Uuid,
        chat_id: Uuid,
        name: Option<String>,
    ) -> ChatServiceResult<Chat> {
        let name = name
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty())
            .ok_or_else(|| ChatServiceError::Unprocessable("Name is required".into()))?;

        self.owned_chat(user_uuid, chat_id).await?;
        self.chats
            .rename_chat(chat_id, &name)
            .await?
            .ok_or_else(|| ChatServiceError::NotFound(format!("chat {chat_id}")))
    }

    #[instrument(name = "chat.delete", skip(self), err)]
    pub async fn delete(&self, user_uuid: Uuid, chat_id: Uuid) -> ChatServiceResult<Chat> {
        self.owned_chat(user_uuid, chat_id).await?;
        self.chats
            .delete_chat(chat_id)
            .await?
            .ok_or_else(|| ChatServiceError::NotFound(format!("chat {chat_id}")))
    }

    pub async fn chat_messages(
        &self,
        user_uuid: Uuid,
        chat_id: Uuid,
    ) -> ChatServiceResult<Vec<Message>> {
        self.owned_chat(user_uuid, chat_id).await?;
        Ok(self.messages.chat_messages(chat_id).await?)
    }

    /// Available models: the configured default, or the gateway catalog when enabled.
    pub async fn catalog(&self) -> ChatServiceResult<Value> {
        if !self.llm.use_llm_gateway {
            let catalog = LlmCatalog::single(
                &self.llm.default_model_friendly_name,
                &self.llm.default_model,
            );
            return serde_json::to_value(catalog)
                .map_err(|err| CompletionError::Malformed(err.to_string()).into());
        }
        Ok(self.client.catalog().await?)
    }
}

fn validate_request(request: &CompletionRequest) -> ChatServiceResult<()> {
    if request.model.trim().is_empty() {
        return Err(ChatServiceError::Validation("model must not be empty".into()));
    }
    Ok(())
}
