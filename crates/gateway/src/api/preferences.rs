//! Research-preference endpoints.
//!
//! Preferences are cached onto the turn state at turn start, so an edit
//! here takes effect from the next turn onward.

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::api::caller_from;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct AddPreferenceBody {
    pub preference: String,
}

pub async fn list_preferences(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Json<Value> {
    let caller = caller_from(&headers);
    Json(json!({"preferences": state.preferences.get(caller.user_id())}))
}

pub async fn add_preference(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<AddPreferenceBody>,
) -> Result<Json<Value>, (StatusCode, String)> {
    let caller = caller_from(&headers);
    state
        .preferences
        .add(caller.user_id(), &body.preference)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
    Ok(Json(json!({"preferences": state.preferences.get(caller.user_id())})))
}
