use axum::{
    Json,
    extract::{Extension, State},
    http::StatusCode,
};
use shared::models::{Document, DocumentCreate, KnowledgeBase, KnowledgeBaseCreate};
use std::sync::Arc;
use tracing::info;

use crate::{
    app_state::AppState,
    http::error::{ApiError, AppResult},
    middleware::request_context::RequestContext,
};

/// `POST /api/knowledge-bases`
pub async fn create_knowledge_base(
    State(state): State<Arc<AppState>>,
    Extension(context): Extension<RequestContext>,
    Json(request): Json<KnowledgeBaseCreate>,
) -> AppResult<(StatusCode, Json<KnowledgeBase>)> {
    let user_id = context.require_user()?;
    request.validate().map_err(ApiError::bad_request)?;

    let knowledge_base = state
        .documents
        .create_knowledge_base(user_id, request)
        .await?;
    info!(knowledge_base_id = %knowledge_base.uuid, %user_id, "knowledge base created");
    Ok((StatusCode::CREATED, Json(knowledge_base)))
}

/// `GET /api/knowledge-bases`
pub async fn list_knowledge_bases(
    State(state): State<Arc<AppState>>,
    Extension(context): Extension<RequestContext>,
) -> AppResult<Json<Vec<KnowledgeBase>>> {
    let user_id = context.require_user()?;
    let knowledge_bases = state.documents.visible_knowledge_bases(user_id).await?;
    Ok(Json(knowledge_bases))
}

/// `POST /api/files`
///
/// Registers already extracted text. Attaching to a knowledge base requires owning it.
pub async fn create_file(
    State(state): State<Arc<AppState>>,
    Extension(context): Extension<RequestContext>,
    Json(request): Json<DocumentCreate>,
) -> AppResult<(StatusCode, Json<Document>)> {
    let user_id = context.require_user()?;

    if let Some(kb_id) = request.knowledge_base_id {
        match state.documents.get_knowledge_base(kb_id).await? {
            Some(knowledge_base) if knowledge_base.owner_uuid == user_id => {}
            _ => return Err(ApiError::not_found("Knowledge Base not found.")),
        }
    }

    let document = Document::from_create(user_id, request).map_err(ApiError::bad_request)?;
    let document = state.documents.create_document(document).await?;
    info!(document_id = %document.uuid, pages = document.pages.len(), "document stored");
    Ok((StatusCode::CREATED, Json(document)))
}

/// `GET /api/files`
pub async fn list_files(
    State(state): State<Arc<AppState>>,
    Extension(context): Extension<RequestContext>,
) -> AppResult<Json<Vec<Document>>> {
    let user_id = context.require_user()?;
    Ok(Json(state.documents.list_documents(user_id).await?))
}
