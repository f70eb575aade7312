//! Out-of-band resolution of a pending choice prompt.

use axum::extract::State;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ChoiceBody {
    pub chat_id: String,
    /// `true` accepts the slower economic-data route.
    pub choice: bool,
}

pub async fn resolve_choice(
    State(state): State<AppState>,
    Json(body): Json<ChoiceBody>,
) -> Json<Value> {
    let resolved = state.choice_gate.resolve(&body.chat_id, body.choice);
    tracing::info!(
        conversation_id = %body.chat_id,
        choice = body.choice,
        resolved,
        "choice received"
    );
    Json(json!({"resolved": resolved}))
}
