//! OpenAI-style chat completion client for model and agent deployments.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use shared::{config::server::LlmConfig, models::Role};
use thiserror::Error;
use tracing::{debug, instrument};

use super::repository::RepositoryError;

/// Model name routed to the retrieval agent deployment instead of a plain LLM.
pub const AGENT_MODEL_NAME: &str = "ttmdocs-agents";

#[derive(Debug, Error)]
pub enum CompletionError {
    #[error("completion request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("completion endpoint returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("malformed completion response: {0}")]
    Malformed(String),
    /// Caller supplied ids that do not resolve; the text is shown to the user verbatim.
    #[error("{0}")]
    InvalidRequest(String),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PromptMessage {
    pub role: Role,
    pub content: String,
}

impl PromptMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// Where a completion is sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompletionTarget {
    Model(String),
    Agent,
}

impl CompletionTarget {
    pub fn for_model(model: &str) -> Self {
        if model == AGENT_MODEL_NAME {
            Self::Agent
        } else {
            Self::Model(model.to_string())
        }
    }
}

#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Runs one non-streaming chat completion and returns the reply text.
    async fn complete(
        &self,
        target: &CompletionTarget,
        messages: &[PromptMessage],
    ) -> Result<String, CompletionError>;

    /// Raw LLM gateway catalog.
    async fn catalog(&self) -> Result<Value, CompletionError>;
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: &'a [PromptMessage],
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Resolved request parameters for one target.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Route {
    url: String,
    model: String,
    token: Option<String>,
}

#[derive(Debug, Clone)]
pub struct HttpCompletionClient {
    http: reqwest::Client,
    config: LlmConfig,
}

impl HttpCompletionClient {
    /// Builds a client honoring the configured request timeout.
    ///
    /// # Errors
    /// Returns an error if the underlying HTTP client cannot be constructed.
    pub fn new(config: LlmConfig) -> Result<Self, CompletionError> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()?;
        Ok(Self { http, config })
    }

    fn endpoint(&self) -> &str {
        self.config.endpoint.trim_end_matches('/')
    }

    fn route(&self, target: &CompletionTarget) -> Route {
        match target {
            CompletionTarget::Model(model) => Route {
                url: format!(
                    "{}/deployments/{}/chat/completions",
                    self.endpoint(),
                    self.config.llm_deployment_id
                ),
                model: format!("datarobot/{model}"),
                token: self.config.api_token.clone(),
            },
            CompletionTarget::Agent => match self.config.agent_deployment_url.as_deref() {
                Some(base) if !base.trim().is_empty() => Route {
                    url: format!("{}/chat/completions", base.trim_end_matches('/')),
                    model: "chat".to_string(),
                    token: Some(
                        self.config
                            .agent_deployment_token
                            .clone()
                            .unwrap_or_else(|| "dummy".to_string()),
                    ),
                },
                _ => Route {
                    url: format!(
                        "{}/deployments/{}/chat/completions",
                        self.endpoint(),
                        self.config.agent_deployment_id
                    ),
                    model: format!("datarobot/{AGENT_MODEL_NAME}"),
                    token: self.config.api_token.clone(),
                },
            },
        }
    }

    fn authorize(builder: reqwest::RequestBuilder, token: Option<&str>) -> reqwest::RequestBuilder {
        match token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, CompletionError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(CompletionError::Status {
        status: status.as_u16(),
        body,
    })
}

fn reply_text(response: ChatCompletionResponse) -> Result<String, CompletionError> {
    response
        .choices
        .into_iter()
        .next()
        .map(|choice| choice.message.content.unwrap_or_default())
        .ok_or_else(|| CompletionError::Malformed("response contained no choices".into()))
}

#[async_trait]
impl CompletionClient for HttpCompletionClient {
    #[instrument(name = "llm.complete", skip(self, messages), fields(messages = messages.len()), err)]
    async fn complete(
        &self,
        target: &CompletionTarget,
        messages: &[PromptMessage],
    ) -> Result<String, CompletionError> {
        let route = self.route(target);
        debug!(url = %route.url, model = %route.model, "sending chat completion");

        let request = self.http.post(&route.url).json(&ChatCompletionRequest {
            model: &route.model,
            messages,
        });
        let response = Self::authorize(request, route.token.as_deref())
            .send()
            .await?;
        let response = check_status(response).await?;
        reply_text(response.json().await?)
    }

    #[instrument(name = "llm.catalog", skip(self), err)]
    async fn catalog(&self) -> Result<Value, CompletionError> {
        let url = format!("{}/genai/llmgw/catalog/", self.endpoint());
        let request = self.http.get(&url);
        let response = Self::authorize(request, self.config.api_token.as_deref())
            .send()
            .await?;
        Ok(check_status(response).await?.json().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::config::server::Config;

    fn client(agent_url: Option<&str>) -> HttpCompletionClient {
        let mut config = Config::default().llm;
        config.endpoint = "https://llm.example.com/api/v2/".into();
        config.llm_deployment_id = "llm-dep".into();
        config.agent_deployment_id = "agent-dep".into();
        config.agent_deployment_url = agent_url.map(str::to_string);
        config.api_token = Some("api-token".into());
        HttpCompletionClient::new(config).unwrap()
    }

    #[test]
    fn target_selects_agent_by_model_name() {
        assert_eq!(
            CompletionTarget::for_model(AGENT_MODEL_NAME),
            CompletionTarget::Agent
        );
        assert_eq!(
            CompletionTarget::for_model("azure/gpt-4o"),
            CompletionTarget::Model("azure/gpt-4o".into())
        );
    }

    #[test]
    fn model_route_uses_llm_deployment() {
        let route = client(None).route(&CompletionTarget::Model("azure/gpt-4o".into()));

        assert_eq!(
            route.url,
            "https://llm.example.com/api/v2/deployments/llm-dep/chat/completions"
        );
        assert_eq!(route.model, "datarobot/azure/gpt-4o");
        assert_eq!(route.token.as_deref(), Some("api-token"));
    }

    #[test]
    fn agent_route_prefers_direct_deployment_url() {
        let route = client(Some("https://agent.example.com/v1/")).route(&CompletionTarget::Agent);

        assert_eq!(route.url, "https://agent.example.com/v1/chat/completions");
        assert_eq!(route.model, "chat");
        assert_eq!(route.token.as_deref(), Some("dummy"));
    }

    #[test]
    fn agent_route_falls_back_to_agent_deployment() {
        let route = client(None).route(&CompletionTarget::Agent);

        assert_eq!(
            route.url,
            "https://llm.example.com/api/v2/deployments/agent-dep/chat/completions"
        );
        assert_eq!(route.model, "datarobot/ttmdocs-agents");
    }

    #[test]
    fn reply_text_reads_first_choice() {
        let response: ChatCompletionResponse = serde_json::from_value(serde_json::json!({
            "choices": [{ "message": { "content": "hello" } }, { "message": { "content": "ignored" } }]
        }))
        .unwrap();
        assert_eq!(reply_text(response).unwrap(), "hello");

        let null_content: ChatCompletionResponse = serde_json::from_value(serde_json::json!({
            "choices": [{ "message": { "content": null } }]
        }))
        .unwrap();
        assert_eq!(reply_text(null_content).unwrap(), "");

        let empty: ChatCompletionResponse =
            serde_json::from_value(serde_json::json!({ "choices": [] })).unwrap();
        assert!(matches!(reply_text(empty), Err(CompletionError::Malformed(_))));
    }

    #[test]
    fn prompt_messages_serialize_with_lowercase_roles() {
        let value = serde_json::to_value(PromptMessage::system("be nice")).unwrap();
        assert_eq!(value["role"], "system");
        assert_eq!(value["content"], "be nice");
    }
}
