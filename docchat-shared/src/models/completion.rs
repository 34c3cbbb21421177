use serde::{Deserialize, Serialize};

/// What the caller wants the model to do with the message.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RequestType {
    #[default]
    Message,
    Suggestion,
}

/// Body of `POST /chat` and `POST /chat/{id}/messages`.
///
/// File and knowledge base ids stay as raw strings so malformed ids surface as an
/// error on the assistant message rather than as a rejected request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CompletionRequest {
    pub message: String,
    pub model: String,
    #[serde(default)]
    pub file_ids: Vec<String>,
    #[serde(default)]
    pub knowledge_base_id: Option<String>,
    #[serde(default, rename = "type")]
    pub request_type: RequestType,
}

/// One entry of the LLM catalog returned by `GET /chat/llm/catalog`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LlmCatalogEntry {
    pub name: String,
    pub model: String,
    pub llm_id: String,
    pub is_active: bool,
    pub is_deprecated: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LlmCatalog {
    pub total_count: usize,
    pub count: usize,
    pub next: Option<String>,
    pub previous: Option<String>,
    pub data: Vec<LlmCatalogEntry>,
}

impl LlmCatalog {
    /// Catalog holding only the configured default model.
    #[must_use]
    pub fn single(name: &str, model: &str) -> Self {
        Self {
            total_count: 1,
            count: 1,
            next: None,
            previous: None,
            data: vec![LlmCatalogEntry {
                name: name.to_string(),
                model: model.to_string(),
                llm_id: model.to_string(),
                is_active: true,
                is_deprecated: false,
            }],
        }
    }
}
