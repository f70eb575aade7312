//! Landing-page submission: turn a free-text box into a research URL.

use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

#[derive(Debug, Deserialize)]
pub struct SubmitMessageBody {
    pub message: String,
}

pub async fn submit_message(Json(body): Json<SubmitMessageBody>) -> Json<Value> {
    let message = body.message.trim();
    if message.is_empty() {
        return Json(json!({"success": false, "error": "empty message"}));
    }

    let encoded: String = url::form_urlencoded::byte_serialize(message.as_bytes()).collect();
    Json(json!({
        "success": true,
        "redirect_url": format!("/research?q={encoded}"),
    }))
}
