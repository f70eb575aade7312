//! Conversation history endpoints: list, replay, and the share view.

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use serde_json::{json, Value};

use acre_conversations::ConversationRecord;
use acre_domain::message::ConversationState;

use crate::api::caller_from;
use crate::runtime::projector::project;
use crate::state::AppState;

type ApiResult<T> = Result<T, (StatusCode, String)>;

fn internal(e: impl std::fmt::Display) -> (StatusCode, String) {
    tracing::error!(error = %e, "conversation endpoint failed");
    (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
}

pub async fn list_conversations(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<Json<Value>> {
    let caller = caller_from(&headers);
    let records = state
        .archive
        .list(caller.user_id())
        .await
        .map_err(internal)?;

    let items: Vec<Value> = records
        .iter()
        .map(|r| {
            json!({
                "id": r.id,
                "title": r.title,
                "path": r.path,
                "created_at": r.created_at,
            })
        })
        .collect();
    Ok(Json(json!({"conversations": items})))
}

pub async fn get_conversation(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    render(&state, &id, false).await
}

/// Read-only replay with related/followup affordances hidden.
pub async fn get_share_view(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    render(&state, &id, true).await
}

async fn render(state: &AppState, id: &str, share_view: bool) -> ApiResult<Json<Value>> {
    let record = state
        .archive
        .load(id)
        .await
        .map_err(internal)?
        .ok_or_else(|| (StatusCode::NOT_FOUND, format!("no conversation {id}")))?;

    Ok(Json(render_record(record, share_view)))
}

fn render_record(record: ConversationRecord, share_view: bool) -> Value {
    let mut replay = ConversationState::new(&record.id);
    replay.messages = record.messages;
    replay.is_share_view = share_view;

    json!({
        "id": record.id,
        "title": record.title,
        "path": record.path,
        "created_at": record.created_at,
        "turns": project(&replay),
    })
}
