//! Background completion of assistant messages.
//!
//! A [`CompletionTask`] owns everything it needs and talks to listeners only
//! through [`ChatStreamManager::publish`](super::chat_stream::ChatStreamManager::publish).

use std::{sync::Arc, time::Instant};

use metrics::{counter, histogram};
use shared::models::{CompletionRequest, Document, KnowledgeBase, MessageUpdate, StreamEvent};
use tokio::task::JoinHandle;
use tracing::{Instrument, error, info, info_span, warn};
use uuid::Uuid;

use super::{
    chat_stream::SharedStreams,
    completion_client::{CompletionClient, CompletionError, CompletionTarget},
    prompt,
    repository::{DocumentRepository, MessageRepository},
};

pub struct CompletionTask {
    pub user_uuid: Uuid,
    pub chat_id: Uuid,
    pub message_id: Uuid,
    pub request: CompletionRequest,
    pub messages: Arc<dyn MessageRepository>,
    pub documents: Arc<dyn DocumentRepository>,
    pub client: Arc<dyn CompletionClient>,
    pub streams: SharedStreams,
}

impl CompletionTask {
    /// Runs the task on the tokio runtime, detached from the request that created it.
    pub fn spawn(self) -> JoinHandle<()> {
        let span = info_span!(
            "completion",
            chat_id = %self.chat_id,
            message_id = %self.message_id,
            model = %self.request.model
        );
        tokio::spawn(self.run().instrument(span))
    }

    /// Produces the assistant reply and records either the content or the error
    /// on the pending message, publishing the final record in both cases.
    pub async fn run(self) {
        let started = Instant::now();

        let (update, outcome) = match self.generate().await {
            Ok(content) => (MessageUpdate::completed(content), "success"),
            Err(err) => {
                error!(error = %err, "completion failed");
                (MessageUpdate::failed(err.to_string()), "error")
            }
        };

        counter!("docchat_completions_total", "outcome" => outcome).increment(1);
        histogram!("docchat_completion_latency_ms")
            .record(started.elapsed().as_secs_f64() * 1000.0);

        self.finish(update).await;
    }

    async fn generate(&self) -> Result<String, CompletionError> {
        let files = self.resolve_files().await?;
        let knowledge_base = self.resolve_knowledge_base().await?;
        let target = CompletionTarget::for_model(&self.request.model);
        let request_type = self.request.request_type;

        let prompt_messages = match &target {
            CompletionTarget::Agent => {
                let kb_documents = match &knowledge_base {
                    Some(kb) => self.documents.knowledge_base_documents(kb.uuid).await?,
                    None => Vec::new(),
                };
                prompt::agent_messages(
                    request_type,
                    &self.request.message,
                    &files,
                    knowledge_base.as_ref().map(|kb| (kb, kb_documents.as_slice())),
                )
            }
            CompletionTarget::Model(_) => {
                let mut combined = files;
                if let Some(kb) = &knowledge_base {
                    combined.extend(self.documents.knowledge_base_documents(kb.uuid).await?);
                }
                prompt::model_messages(request_type, &self.request.message, &combined)
            }
        };

        self.client.complete(&target, &prompt_messages).await
    }

    async fn resolve_files(&self) -> Result<Vec<Document>, CompletionError> {
        if self.request.file_ids.is_empty() {
            return Ok(Vec::new());
        }

        let ids = self
            .request
            .file_ids
            .iter()
            .map(|raw| {
                Uuid::parse_str(raw).map_err(|_| {
                    CompletionError::InvalidRequest(format!("Invalid file_id format: {raw}"))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(self.documents.documents_by_ids(self.user_uuid, &ids).await?)
    }

    async fn resolve_knowledge_base(&self) -> Result<Option<KnowledgeBase>, CompletionError> {
        let Some(raw) = self
            .request
            .knowledge_base_id
            .as_deref()
            .filter(|raw| !raw.is_empty())
        else {
            return Ok(None);
        };

        let kb_id = Uuid::parse_str(raw).map_err(|_| {
            CompletionError::InvalidRequest("Invalid knowledge_base_id format".into())
        })?;

        match self.documents.get_knowledge_base(kb_id).await? {
            Some(kb) if kb.is_visible_to(self.user_uuid) => Ok(Some(kb)),
            _ => Err(CompletionError::InvalidRequest(
                "Knowledge Base not found.".into(),
            )),
        }
    }

    async fn finish(&self, update: MessageUpdate) {
        let updated = match self.messages.update_message(self.message_id, update).await {
            Ok(Some(message)) => message,
            Ok(None) => {
                warn!("assistant message disappeared before completion could be stored");
                return;
            }
            Err(err) => {
                error!(error = %err, "failed to store completion result");
                return;
            }
        };

        match StreamEvent::message(&updated) {
            Ok(event) => {
                self.streams.publish(updated.chat_id, event);
                info!(
                    failed = updated.error.is_some(),
                    "assistant message finalized"
                );
            }
            Err(err) => error!(error = %err, "failed to encode assistant message"),
        }
    }
}
