use std::sync::Arc;

use axum::{Router, routing::post};

use crate::{app_state::AppState, handlers::documents};

/// Knowledge base and file routes, relative to `/api`.
pub fn create_documents_router() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/knowledge-bases",
            post(documents::create_knowledge_base).get(documents::list_knowledge_bases),
        )
        .route(
            "/files",
            post(documents::create_file).get(documents::list_files),
        )
}
