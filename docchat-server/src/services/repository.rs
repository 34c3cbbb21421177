//! Persistence seams for chats, messages and documents.

use std::collections::HashMap;

use async_trait::async_trait;
use shared::models::{
    Chat, ChatCreate, Document, KnowledgeBase, KnowledgeBaseCreate, Message, MessageCreate,
    MessageUpdate,
};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("corrupt record: {0}")]
    Corrupt(String),
}

pub type RepositoryResult<T> = Result<T, RepositoryError>;

#[async_trait]
pub trait ChatRepository: Send + Sync {
    async fn create_chat(&self, create: ChatCreate) -> RepositoryResult<Chat>;

    async fn get_chat(&self, chat_id: Uuid) -> RepositoryResult<Option<Chat>>;

    /// Chats owned by `user_uuid`, newest first.
    async fn list_chats(&self, user_uuid: Uuid) -> RepositoryResult<Vec<Chat>>;

    async fn rename_chat(&self, chat_id: Uuid, name: &str) -> RepositoryResult<Option<Chat>>;

    /// Removes the chat and all of its messages, returning the removed chat.
    async fn delete_chat(&self, chat_id: Uuid) -> RepositoryResult<Option<Chat>>;
}

#[async_trait]
pub trait MessageRepository: Send + Sync {
    async fn create_message(&self, create: MessageCreate) -> RepositoryResult<Message>;

    async fn update_message(
        &self,
        message_id: Uuid,
        update: MessageUpdate,
    ) -> RepositoryResult<Option<Message>>;

    async fn get_message(&self, message_id: Uuid) -> RepositoryResult<Option<Message>>;

    /// Messages of a chat ordered by creation time.
    async fn chat_messages(&self, chat_id: Uuid) -> RepositoryResult<Vec<Message>>;

    /// Latest message of each chat in `chat_ids` that has any.
    async fn last_messages(&self, chat_ids: &[Uuid]) -> RepositoryResult<HashMap<Uuid, Message>>;
}

#[async_trait]
pub trait DocumentRepository: Send + Sync {
    async fn create_knowledge_base(
        &self,
        owner_uuid: Uuid,
        create: KnowledgeBaseCreate,
    ) -> RepositoryResult<KnowledgeBase>;

    async fn get_knowledge_base(&self, kb_id: Uuid) -> RepositoryResult<Option<KnowledgeBase>>;

    /// Knowledge bases owned by the user plus every public one.
    async fn visible_knowledge_bases(&self, user_uuid: Uuid)
    -> RepositoryResult<Vec<KnowledgeBase>>;

    async fn create_document(&self, document: Document) -> RepositoryResult<Document>;

    async fn list_documents(&self, owner_uuid: Uuid) -> RepositoryResult<Vec<Document>>;

    /// Documents among `ids` owned by `owner_uuid`; unknown or foreign ids are skipped.
    async fn documents_by_ids(
        &self,
        owner_uuid: Uuid,
        ids: &[Uuid],
    ) -> RepositoryResult<Vec<Document>>;

    async fn knowledge_base_documents(&self, kb_id: Uuid) -> RepositoryResult<Vec<Document>>;
}
