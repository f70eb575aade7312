//! State projector: stored messages back into renderable fragments.
//!
//! Pure function over the transcript, used for full history replay and
//! the read-only share view. Projection never fails: a stored message
//! whose content does not decode renders nothing, because one bad
//! historical entry must not break the whole conversation's re-render.

use serde_json::Value;

use acre_domain::channels::{answer_is_open, extract_channels};
use acre_domain::message::{ConversationMessage, ConversationState, MessageKind, Role};
use acre_domain::tool::ToolRecord;
use acre_domain::ui::{RenderableTurn, UiFragment};

pub fn project(state: &ConversationState) -> Vec<RenderableTurn> {
    let mut out = Vec::new();
    for message in &state.messages {
        project_message(message, state.is_share_view, &mut out);
    }
    out
}

fn project_message(message: &ConversationMessage, share_view: bool, out: &mut Vec<RenderableTurn>) {
    // Tool messages expand to one renderable per record.
    if message.role == Role::Tool {
        out.extend(project_tool_records(message));
        return;
    }

    let fragment = match (message.role, message.kind) {
        (Role::User, Some(MessageKind::Input)) => {
            decode_field(&message.content, "input").map(|text| UiFragment::UserEcho { text })
        }
        (Role::User, Some(MessageKind::InputRelated)) => decode_field(&message.content, "related_query")
            .map(|text| UiFragment::UserEcho { text }),
        (Role::User, Some(MessageKind::Inquiry)) => Some(UiFragment::InquiryPanel {
            content: message.content.clone(),
        }),

        (Role::Assistant, Some(MessageKind::Answer)) => {
            let channels = extract_channels(&message.content);
            Some(UiFragment::AnswerPanel {
                scratchpad: channels.scratchpad,
                answer: channels.answer,
                thinking: answer_is_open(&message.content),
            })
        }
        (Role::Assistant, Some(MessageKind::Related)) if !share_view => {
            decode_queries(&message.content).map(|queries| UiFragment::RelatedPanel { queries })
        }
        (Role::Assistant, Some(MessageKind::Followup)) if !share_view => {
            Some(UiFragment::FollowupPanel)
        }

        // Skip inputs, end sentinels, assistant tool turns, untyped
        // research summaries: never rendered.
        _ => None,
    };

    if let Some(fragment) = fragment {
        out.push(RenderableTurn {
            id: message.id.clone(),
            fragment,
        });
    }
}

fn project_tool_records(message: &ConversationMessage) -> Vec<RenderableTurn> {
    let Ok(records) = serde_json::from_str::<Vec<ToolRecord>>(&message.content) else {
        tracing::debug!(id = %message.id, "undecodable tool message; rendering nothing");
        return Vec::new();
    };

    records
        .iter()
        .filter_map(|record| {
            let fragment = project_record(record)?;
            Some(RenderableTurn {
                id: format!("{}-{}", message.id, record.call_id),
                fragment,
            })
        })
        .collect()
}

fn project_record(record: &ToolRecord) -> Option<UiFragment> {
    // Failed executions carry an error payload; nothing to replay.
    if record.result.get("status").and_then(Value::as_str) == Some("error") {
        return None;
    }

    match record.tool_name.as_str() {
        "search" => Some(UiFragment::SearchResultsPanel {
            query: record
                .result
                .get("query")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            results: record.result.get("results").cloned().unwrap_or(Value::Null),
        }),
        "retrieve" => Some(UiFragment::RetrievedPagePanel {
            url: record
                .result
                .get("url")
                .and_then(Value::as_str)?
                .to_string(),
            title: record
                .result
                .get("title")
                .and_then(Value::as_str)
                .map(str::to_string),
        }),
        "property_search" => Some(UiFragment::PropertyPanel {
            listings: record
                .result
                .get("listings")
                .cloned()
                .unwrap_or(Value::Array(vec![])),
        }),
        // Anything else is an economic-data source; show the raw series.
        other => Some(UiFragment::EconDataPanel {
            source: other.to_string(),
            data: record.result.clone(),
        }),
    }
}

fn decode_field(content: &str, field: &str) -> Option<String> {
    let value: Value = serde_json::from_str(content).ok()?;
    value
        .get(field)
        .and_then(Value::as_str)
        .map(str::to_string)
}

fn decode_queries(content: &str) -> Option<Vec<String>> {
    #[derive(serde::Deserialize)]
    struct Queries {
        queries: Vec<String>,
    }
    serde_json::from_str::<Queries>(content).ok().map(|q| q.queries)
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
