//! Related-query suggestion pass.
//!
//! One non-streaming JSON-mode call after the answer is complete. This is
//! a garnish: any failure (transport, refusal, malformed JSON) logs and
//! yields `None` rather than degrading the turn.

use std::sync::Arc;

use serde::Deserialize;

use acre_providers::{ChatRequest, ModelProvider};

use acre_domain::message::{ConversationMessage, MessageKind};

const RELATED_PROMPT: &str = "Given the research question and the answer below, suggest exactly \
     three short follow-up research queries a real-estate or economics \
     analyst would naturally ask next. Respond with JSON only, in the form \
     {\"queries\": [\"...\", \"...\", \"...\"]}.";

#[derive(Deserialize)]
struct RelatedQueries {
    queries: Vec<String>,
}

/// Ask the model for follow-up queries. Soft-fails to `None`.
pub async fn suggest_related(
    provider: Arc<dyn ModelProvider>,
    question: &str,
    answer: &str,
) -> Option<Vec<String>> {
    let user = ConversationMessage::user(
        MessageKind::Input,
        format!("Question: {question}\n\nAnswer: {answer}"),
    );
    let req = ChatRequest {
        system_prompt: Some(RELATED_PROMPT.to_string()),
        messages: vec![user],
        tools: vec![],
        temperature: Some(0.7),
        max_tokens: Some(300),
        json_mode: true,
        model: None,
    };

    let response = match provider.chat(&req).await {
        Ok(response) => response,
        Err(e) => {
            tracing::warn!(error = %e, "related-query call failed");
            return None;
        }
    };

    match serde_json::from_str::<RelatedQueries>(&response.content) {
        Ok(parsed) if !parsed.queries.is_empty() => Some(parsed.queries),
        Ok(_) => None,
        Err(e) => {
            tracing::warn!(error = %e, "related-query response was not valid JSON");
            None
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
