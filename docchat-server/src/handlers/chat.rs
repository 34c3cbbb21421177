use axum::{
    Json,
    extract::{Extension, Path, State},
};
use serde_json::Value;
use shared::models::{Chat, ChatRenameRequest, ChatSummary, CompletionRequest, Message};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::{
    app_state::AppState, http::error::AppResult, middleware::request_context::RequestContext,
    services::chat_stream::SharedStreams,
};

/// `POST /api/chat`
pub async fn create_chat(
    State(state): State<Arc<AppState>>,
    Extension(streams): Extension<SharedStreams>,
    Extension(context): Extension<RequestContext>,
    Json(request): Json<CompletionRequest>,
) -> AppResult<Json<Chat>> {
    let user_id = context.require_user()?;
    let chat = state
        .chat_service(&streams)
        .create_chat(user_id, request)
        .await?;
    info!(chat_id = %chat.uuid, %user_id, "chat created");
    Ok(Json(chat))
}

/// `GET /api/chat`
pub async fn list_chats(
    State(state): State<Arc<AppState>>,
    Extension(streams): Extension<SharedStreams>,
    Extension(context): Extension<RequestContext>,
) -> AppResult<Json<Vec<ChatSummary>>> {
    let user_id = context.require_user()?;
    let summaries = state.chat_service(&streams).summaries(user_id).await?;
    Ok(Json(summaries))
}

/// `GET /api/chat/{chat_id}`
pub async fn get_chat(
    State(state): State<Arc<AppState>>,
    Extension(streams): Extension<SharedStreams>,
    Extension(context): Extension<RequestContext>,
    Path(chat_id): Path<Uuid>,
) -> AppResult<Json<ChatSummary>> {
    let user_id = context.require_user()?;
    let summary = state
        .chat_service(&streams)
        .summary(user_id, chat_id)
        .await?;
    Ok(Json(summary))
}

/// `PATCH /api/chat/{chat_id}`
pub async fn rename_chat(
    State(state): State<Arc<AppState>>,
    Extension(streams): Extension<SharedStreams>,
    Extension(context): Extension<RequestContext>,
    Path(chat_id): Path<Uuid>,
    Json(request): Json<ChatRenameRequest>,
) -> AppResult<Json<Chat>> {
    let user_id = context.require_user()?;
    let chat = state
        .chat_service(&streams)
        .rename(user_id, chat_id, request.name)
        .await?;
    Ok(Json(chat))
}

/// `DELETE /api/chat/{chat_id}`
pub async fn delete_chat(
    State(state): State<Arc<AppState>>,
    Extension(streams): Extension<SharedStreams>,
    Extension(context): Extension<RequestContext>,
    Path(chat_id): Path<Uuid>,
) -> AppResult<Json<Chat>> {
    let user_id = context.require_user()?;
    let chat = state
        .chat_service(&streams)
        .delete(user_id, chat_id)
        .await?;
    info!(%chat_id, %user_id, "chat deleted");
    Ok(Json(chat))
}

/// `POST /api/chat/{chat_id}/messages`
///
/// Returns the stored prompt and the pending assistant reply. The reply is
/// completed in the background and delivered through `messages-stream`.
pub async fn post_message(
    State(state): State<Arc<AppState>>,
    Extension(streams): Extension<SharedStreams>,
    Extension(context): Extension<RequestContext>,
    Path(chat_id): Path<Uuid>,
    Json(request): Json<CompletionRequest>,
) -> AppResult<Json<Vec<Message>>> {
    let user_id = context.require_user()?;
    let (prompt, pending) = state
        .chat_service(&streams)
        .post_message(user_id, chat_id, request)
        .await?;
    Ok(Json(vec![prompt, pending]))
}

/// `GET /api/chat/{chat_id}/messages`
pub async fn list_messages(
    State(state): State<Arc<AppState>>,
    Extension(streams): Extension<SharedStreams>,
    Extension(context): Extension<RequestContext>,
    Path(chat_id): Path<Uuid>,
) -> AppResult<Json<Vec<Message>>> {
    let user_id = context.require_user()?;
    let messages = state
        .chat_service(&streams)
        .chat_messages(user_id, chat_id)
        .await?;
    Ok(Json(messages))
}

/// `GET /api/chat/llm/catalog`
pub async fn llm_catalog(
    State(state): State<Arc<AppState>>,
    Extension(streams): Extension<SharedStreams>,
) -> AppResult<Json<Value>> {
    Ok(Json(state.chat_service(&streams).catalog().await?))
}
