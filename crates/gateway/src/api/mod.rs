pub mod chat;
pub mod choice;
pub mod conversations;
pub mod health;
pub mod landing;
pub mod preferences;

use axum::http::HeaderMap;
use axum::routing::{get, post};
use axum::Router;

use acre_conversations::Caller;

use crate::state::AppState;

/// Build the full API router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/health", get(health::health))
        // Chat (core runtime)
        .route("/v1/chat", post(chat::chat))
        .route("/v1/chat/choice", post(choice::resolve_choice))
        // Landing-page redirect
        .route("/v1/submit-message", post(landing::submit_message))
        // Conversation history
        .route("/v1/conversations", get(conversations::list_conversations))
        .route("/v1/conversations/:id", get(conversations::get_conversation))
        .route(
            "/v1/conversations/:id/share",
            get(conversations::get_share_view),
        )
        // Research preferences
        .route("/v1/preferences", get(preferences::list_preferences))
        .route("/v1/preferences", post(preferences::add_preference))
}

/// Resolve the caller from request headers.
pub(crate) fn caller_from(headers: &HeaderMap) -> Caller {
    let x_user_id = headers.get("x-user-id").and_then(|v| v.to_str().ok());
    let authorization = headers.get("authorization").and_then(|v| v.to_str().ok());
    Caller::resolve(x_user_id, authorization)
}
