//! In-process repositories used when no database is configured.

use std::collections::HashMap;

use async_trait::async_trait;
use shared::models::{
    Chat, ChatCreate, Document, KnowledgeBase, KnowledgeBaseCreate, Message, MessageCreate,
    MessageUpdate, Timestamp,
};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::repository::{
    ChatRepository, DocumentRepository, MessageRepository, RepositoryResult,
};

#[derive(Debug, Default)]
struct MemoryState {
    chats: HashMap<Uuid, Chat>,
    /// Message plus insertion sequence, used to order messages sharing a timestamp.
    messages: HashMap<Uuid, (u64, Message)>,
    next_sequence: u64,
    knowledge_bases: HashMap<Uuid, KnowledgeBase>,
    documents: HashMap<Uuid, Document>,
}

impl MemoryState {
    fn ordered_messages(&self, chat_id: Uuid) -> Vec<&(u64, Message)> {
        let mut messages: Vec<_> = self
            .messages
            .values()
            .filter(|(_, message)| message.chat_id == chat_id)
            .collect();
        messages.sort_by_key(|(sequence, message)| (message.created_at, *sequence));
        messages
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ChatRepository for MemoryStore {
    async fn create_chat(&self, create: ChatCreate) -> RepositoryResult<Chat> {
        let chat = Chat::from_create(create);
        self.state.write().await.chats.insert(chat.uuid, chat.clone());
        Ok(chat)
    }

    async fn get_chat(&self, chat_id: Uuid) -> RepositoryResult<Option<Chat>> {
        Ok(self.state.read().await.chats.get(&chat_id).cloned())
    }

    async fn list_chats(&self, user_uuid: Uuid) -> RepositoryResult<Vec<Chat>> {
        let state = self.state.read().await;
        let mut chats: Vec<Chat> = state
            .chats
            .values()
            .filter(|chat| chat.user_uuid == user_uuid)
            .cloned()
            .collect();
        chats.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(chats)
    }

    async fn rename_chat(&self, chat_id: Uuid, name: &str) -> RepositoryResult<Option<Chat>> {
        let mut state = self.state.write().await;
        Ok(state.chats.get_mut(&chat_id).map(|chat| {
            chat.name = name.to_string();
            chat.updated_at = Timestamp::now();
            chat.clone()
        }))
    }

    async fn delete_chat(&self, chat_id: Uuid) -> RepositoryResult<Option<Chat>> {
        let mut state = self.state.write().await;
        let removed = state.chats.remove(&chat_id);
        if removed.is_some() {
            state
                .messages
                .retain(|_, (_, message)| message.chat_id != chat_id);
        }
        Ok(removed)
    }
}

#[async_trait]
impl MessageRepository for MemoryStore {
    async fn create_message(&self, create: MessageCreate) -> RepositoryResult<Message> {
        let message = Message::from_create(create);
        let mut state = self.state.write().await;
        let sequence = state.next_sequence;
        state.next_sequence += 1;
        state
            .messages
            .insert(message.uuid, (sequence, message.clone()));
        Ok(message)
    }

    async fn update_message(
        &self,
        message_id: Uuid,
        update: MessageUpdate,
    ) -> RepositoryResult<Option<Message>> {
        let mut state = self.state.write().await;
        Ok(state.messages.get_mut(&message_id).map(|(_, message)| {
            update.apply(message);
            message.clone()
        }))
    }

    async fn get_message(&self, message_id: Uuid) -> RepositoryResult<Option<Message>> {
        let state = self.state.read().await;
        Ok(state
            .messages
            .get(&message_id)
            .map(|(_, message)| message.clone()))
    }

    async fn chat_messages(&self, chat_id: Uuid) -> RepositoryResult<Vec<Message>> {
        let state = self.state.read().await;
        Ok(state
            .ordered_messages(chat_id)
            .into_iter()
            .map(|(_, message)| message.clone())
            .collect())
    }

    async fn last_messages(&self, chat_ids: &[Uuid]) -> RepositoryResult<HashMap<Uuid, Message>> {
        let state = self.state.read().await;
        Ok(chat_ids
            .iter()
            .filter_map(|chat_id| {
                state
                    .ordered_messages(*chat_id)
                    .last()
                    .map(|(_, message)| (*chat_id, message.clone()))
            })
            .collect())
    }
}

#[async_trait]
impl DocumentRepository for MemoryStore {
    async fn create_knowledge_base(
        &self,
        owner_uuid: Uuid,
        create: KnowledgeBaseCreate,
    ) -> RepositoryResult<KnowledgeBase> {
        let knowledge_base = KnowledgeBase::from_create(owner_uuid, create);
        self.state
            .write()
            .await
            .knowledge_bases
            .insert(knowledge_base.uuid, knowledge_base.clone());
        Ok(knowledge_base)
    }

    async fn get_knowledge_base(&self, kb_id: Uuid) -> RepositoryResult<Option<KnowledgeBase>> {
        Ok(self.state.read().await.knowledge_bases.get(&kb_id).cloned())
    }

    async fn visible_knowledge_bases(
        &self,
        user_uuid: Uuid,
    ) -> RepositoryResult<Vec<KnowledgeBase>> {
        let state = self.state.read().await;
        let mut visible: Vec<KnowledgeBase> = state
            .knowledge_bases
            .values()
            .filter(|kb| kb.is_visible_to(user_uuid))
            .cloned()
            .collect();
        visible.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(visible)
    }

    async fn create_document(&self, document: Document) -> RepositoryResult<Document> {
        self.state
            .write()
            .await
            .documents
            .insert(document.uuid, document.clone());
        Ok(document)
    }

    async fn list_documents(&self, owner_uuid: Uuid) -> RepositoryResult<Vec<Document>> {
        let state = self.state.read().await;
        let mut documents: Vec<Document> = state
            .documents
            .values()
            .filter(|document| document.owner_uuid == owner_uuid)
            .cloned()
            .collect();
        documents.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(documents)
    }

    async fn documents_by_ids(
        &self,
        owner_uuid: Uuid,
        ids: &[Uuid],
    ) -> RepositoryResult<Vec<Document>> {
        let state = self.state.read().await;
        Ok(ids
            .iter()
            .filter_map(|id| state.documents.get(id))
            .filter(|document| document.owner_uuid == owner_uuid)
            .cloned()
            .collect())
    }

    async fn knowledge_base_documents(&self, kb_id: Uuid) -> RepositoryResult<Vec<Document>> {
        let state = self.state.read().await;
        let mut documents: Vec<Document> = state
            .documents
            .values()
            .filter(|document| document.knowledge_base_id == Some(kb_id))
            .cloned()
            .collect();
        documents.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(documents)
    }
}
