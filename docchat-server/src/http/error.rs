use axum::{http::StatusCode, response::IntoResponse};
use serde_json::json;
use thiserror::Error;

use super::problem::ProblemDetails;
use crate::services::{
    chat_service::ChatServiceError, completion_client::CompletionError,
    repository::RepositoryError,
};

pub type AppResult<T> = Result<T, ApiError>;

#[derive(Debug, Error)]
#[error("{code}: {message}")]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: String,
    details: Option<serde_json::Value>,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "validation_failed", message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "unauthenticated", message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "not_found", message)
    }

    pub fn unprocessable(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNPROCESSABLE_ENTITY, "unprocessable", message)
    }

    pub fn bad_gateway(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_GATEWAY, "upstream_error", message)
    }

    pub fn internal_server_error(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "internal_error", message)
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let details = self.details;

        let mut problem = ProblemDetails::new(self.status, self.code, self.message);
        if let Some(details) = details {
            problem = problem.with_details(details);
        }

        problem.into_response()
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            let code = db_err
                .code()
                .unwrap_or_else(|| std::borrow::Cow::Borrowed("unknown"));
            let message = format!("database error {code}");
            return Self::internal_server_error(message)
                .with_details(json!({ "sqlstate": code, "message": db_err.message() }));
        }

        Self::internal_server_error(err.to_string())
    }
}

impl From<http::Error> for ApiError {
    fn from(err: http::Error) -> Self {
        Self::internal_server_error(err.to_string())
    }
}

impl From<RepositoryError> for ApiError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::Database(db_err) => Self::from(db_err),
            RepositoryError::Corrupt(message) => Self::internal_server_error(message),
        }
    }
}

impl From<CompletionError> for ApiError {
    fn from(err: CompletionError) -> Self {
        match err {
            CompletionError::InvalidRequest(message) => Self::bad_request(message),
            CompletionError::Repository(repo_err) => Self::from(repo_err),
            CompletionError::Status { status, body } => {
                Self::bad_gateway(format!("completion endpoint returned {status}"))
                    .with_details(json!({ "upstream_status": status, "body": body }))
            }
            other => Self::bad_gateway(other.to_string()),
        }
    }
}

impl From<ChatServiceError> for ApiError {
    fn from(err: ChatServiceError) -> Self {
        match err {
            ChatServiceError::Validation(message) => Self::bad_request(message),
            ChatServiceError::Unprocessable(message) => Self::unprocessable(message),
            ChatServiceError::NotFound(message) => Self::not_found(message),
            ChatServiceError::Repository(repo_err) => Self::from(repo_err),
            ChatServiceError::Completion(completion_err) => Self::from(completion_err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use http::header::CONTENT_TYPE;
    use serde_json::Value;

    #[test]
    fn new_sets_fields_and_allows_details() {
        let error = ApiError::unprocessable("nope").with_details(json!({ "field": "name" }));
        assert_eq!(error.status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(error.code, "unprocessable");
        assert!(
            error
                .details
                .as_ref()
                .is_some_and(|details| details["field"] == Value::from("name"))
        );
    }

    #[tokio::test]
    async fn into_response_serializes_problem_details() {
        let response = ApiError::not_found("missing chat")
            .with_details(json!({ "resource": "chat" }))
            .into_response();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            response.headers().get(CONTENT_TYPE).unwrap(),
            "application/problem+json"
        );

        let bytes = axum::body::to_bytes(response.into_body(), 1024)
            .await
            .expect("body to bytes");
        let json: Value =
            serde_json::from_slice(&bytes).expect("problem details deserializes to json");
        assert_eq!(json["code"], "not_found");
        assert_eq!(json["message"], "missing chat");
        assert_eq!(json["details"]["resource"], "chat");
    }

    #[test]
    fn chat_service_errors_map_to_matching_status_codes() {
        let validation = ApiError::from(ChatServiceError::Validation("bad".into()));
        assert_eq!(validation.status, StatusCode::BAD_REQUEST);

        let unprocessable = ApiError::from(ChatServiceError::Unprocessable("name".into()));
        assert_eq!(unprocessable.status, StatusCode::UNPROCESSABLE_ENTITY);

        let not_found = ApiError::from(ChatServiceError::NotFound("missing".into()));
        assert_eq!(not_found.status, StatusCode::NOT_FOUND);

        let db = ApiError::from(ChatServiceError::Repository(RepositoryError::Database(
            sqlx::Error::PoolTimedOut,
        )));
        assert_eq!(db.status, StatusCode::INTERNAL_SERVER_ERROR);

        let upstream = ApiError::from(ChatServiceError::Completion(CompletionError::Status {
            status: 503,
            body: "busy".into(),
        }));
        assert_eq!(upstream.status, StatusCode::BAD_GATEWAY);
        assert_eq!(upstream.details.unwrap()["upstream_status"], 503);
    }

    #[test]
    fn invalid_completion_requests_are_client_errors() {
        let error = ApiError::from(CompletionError::InvalidRequest(
            "Invalid file_id format: x".into(),
        ));

        assert_eq!(error.status, StatusCode::BAD_REQUEST);
        assert_eq!(error.message, "Invalid file_id format: x");
    }
}
