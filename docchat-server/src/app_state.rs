use std::sync::Arc;

use shared::config::server::LlmConfig;
use sqlx::PgPool;

use crate::services::{
    chat_service::ChatService,
    chat_stream::SharedStreams,
    completion_client::CompletionClient,
    memory_store::MemoryStore,
    pg_store::PgStore,
    repository::{ChatRepository, DocumentRepository, MessageRepository},
};

/// Application state shared across all routes.
#[derive(Clone)]
pub struct AppState {
    pub(crate) pool: Option<PgPool>,
    pub(crate) chats: Arc<dyn ChatRepository>,
    pub(crate) messages: Arc<dyn MessageRepository>,
    pub(crate) documents: Arc<dyn DocumentRepository>,
    pub(crate) completion: Arc<dyn CompletionClient>,
    pub(crate) llm: Arc<LlmConfig>,
}

impl AppState {
    /// State backed by the in-process store; used when no database is configured.
    pub fn in_memory(completion: Arc<dyn CompletionClient>, llm: LlmConfig) -> Self {
        let store = Arc::new(MemoryStore::new());
        Self {
            pool: None,
            chats: store.clone(),
            messages: store.clone(),
            documents: store,
            completion,
            llm: Arc::new(llm),
        }
    }

    pub fn postgres(pool: PgPool, completion: Arc<dyn CompletionClient>, llm: LlmConfig) -> Self {
        let store = Arc::new(PgStore::new(pool.clone()));
        Self {
            pool: Some(pool),
            chats: store.clone(),
            messages: store.clone(),
            documents: store,
            completion,
            llm: Arc::new(llm),
        }
    }

    pub fn chat_service(&self, streams: &SharedStreams) -> ChatService {
        ChatService::new(
            Arc::clone(&self.chats),
            Arc::clone(&self.messages),
            Arc::clone(&self.documents),
            Arc::clone(&self.completion),
            Arc::clone(streams),
            Arc::clone(&self.llm),
        )
    }
}

#[cfg(test)]
impl AppState {
    /// In-memory state whose completion client points at the default endpoint.
    pub(crate) fn for_tests() -> Self {
        use crate::services::completion_client::HttpCompletionClient;
        use shared::config::server::Config;

        let llm = Config::default().llm;
        let client = HttpCompletionClient::new(llm.clone()).expect("http client");
        Self::in_memory(Arc::new(client), llm)
    }
}
