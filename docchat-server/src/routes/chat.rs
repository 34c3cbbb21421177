use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};

use crate::{
    app_state::AppState,
    handlers::{chat, streaming},
};

/// Chat, message and stream routes, relative to `/api`.
pub fn create_chat_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/chat", post(chat::create_chat).get(chat::list_chats))
        .route("/chat/llm/catalog", get(chat::llm_catalog))
        .route(
            "/chat/{chat_id}",
            get(chat::get_chat)
                .patch(chat::rename_chat)
                .delete(chat::delete_chat),
        )
        .route(
            "/chat/{chat_id}/messages",
            post(chat::post_message).get(chat::list_messages),
        )
        .route(
            "/chat/{chat_id}/messages-stream",
            get(streaming::stream_chat_messages),
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_router_has_routes() {
        assert!(create_chat_router().has_routes());
    }
}
