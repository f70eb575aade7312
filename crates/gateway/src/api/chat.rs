//! Chat endpoint: submit a turn and stream its progress as SSE.
//!
//! `submit` returns before generation starts; this handler bridges the
//! turn handle's live channels onto one server-sent event stream. Event
//! types: `turn` (ids, sent first), `ui`, `scratchpad`, `answer`,
//! `thinking`, `collapsed`, `generating`. The `ui` event with
//! `op = "done"` is always last.

use std::convert::Infallible;

use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::Json;
use futures_core::Stream;
use serde::Deserialize;
use serde_json::json;

use acre_domain::emit::UiUpdate;

use crate::api::caller_from;
use crate::runtime::turn::{submit, SubmitInput, TurnHandle};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ChatBody {
    /// Omitted on the first message of a new conversation.
    #[serde(default)]
    pub chat_id: Option<String>,
    #[serde(default)]
    pub input: Option<String>,
    #[serde(default)]
    pub related_query: bool,
    #[serde(default)]
    pub inquiry: bool,
    #[serde(default)]
    pub skip: bool,
}

pub async fn chat(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<ChatBody>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let conversation_id = body
        .chat_id
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    let input = SubmitInput {
        conversation_id,
        input: body.input.unwrap_or_default(),
        related_query: body.related_query,
        inquiry: body.inquiry,
        skip: body.skip,
        caller: caller_from(&headers),
    };

    tracing::info!(
        conversation_id = %input.conversation_id,
        skip = input.skip,
        inquiry = input.inquiry,
        "chat turn submitted"
    );

    let handle = submit(state, input);
    Sse::new(turn_event_stream(handle)).keep_alive(KeepAlive::default())
}

fn ui_event(update: &UiUpdate) -> Event {
    let data = match update {
        UiUpdate::Append(fragment) => json!({"op": "append", "fragment": fragment}),
        UiUpdate::ReplaceAll(fragment) => json!({"op": "replace_all", "fragment": fragment}),
        UiUpdate::Done => json!({"op": "done"}),
    };
    Event::default().event("ui").data(data.to_string())
}

fn turn_event_stream(handle: TurnHandle) -> impl Stream<Item = Result<Event, Infallible>> {
    async_stream::stream! {
        yield Ok(Event::default().event("turn").data(
            json!({
                "id": handle.id,
                "chat_id": handle.conversation_id,
            })
            .to_string(),
        ));

        let mut ui_rx = handle.ui.subscribe();
        let mut scratchpad_rx = handle.scratchpad.subscribe();
        let mut answer_rx = handle.answer.subscribe();
        let mut thinking_rx = handle.thinking.subscribe();
        let mut collapsed_rx = handle.collapsed.subscribe();
        let mut generating_rx = handle.generating.subscribe();

        loop {
            tokio::select! {
                update = ui_rx.recv() => {
                    match update {
                        Some(UiUpdate::Done) => {
                            // Finalization order guarantees this is the
                            // last signal of the turn.
                            yield Ok(ui_event(&UiUpdate::Done));
                            break;
                        }
                        Some(update) => yield Ok(ui_event(&update)),
                        None => break,
                    }
                }
                changed = scratchpad_rx.changed(), if !handle.scratchpad.is_done() || scratchpad_rx.has_changed().unwrap_or(false) => {
                    if changed.is_ok() {
                        let text = scratchpad_rx.borrow_and_update().clone();
                        yield Ok(Event::default().event("scratchpad").data(json!({"text": text}).to_string()));
                    }
                }
                changed = answer_rx.changed(), if !handle.answer.is_done() || answer_rx.has_changed().unwrap_or(false) => {
                    if changed.is_ok() {
                        let text = answer_rx.borrow_and_update().clone();
                        yield Ok(Event::default().event("answer").data(json!({"text": text}).to_string()));
                    }
                }
                changed = thinking_rx.changed(), if !handle.thinking.is_done() || thinking_rx.has_changed().unwrap_or(false) => {
                    if changed.is_ok() {
                        let value = *thinking_rx.borrow_and_update();
                        yield Ok(Event::default().event("thinking").data(json!({"thinking": value}).to_string()));
                    }
                }
                changed = collapsed_rx.changed(), if !handle.collapsed.is_done() || collapsed_rx.has_changed().unwrap_or(false) => {
                    if changed.is_ok() {
                        let value = *collapsed_rx.borrow_and_update();
                        yield Ok(Event::default().event("collapsed").data(json!({"collapsed": value}).to_string()));
                    }
                }
                changed = generating_rx.changed(), if !handle.generating.is_done() || generating_rx.has_changed().unwrap_or(false) => {
                    if changed.is_ok() {
                        let value = *generating_rx.borrow_and_update();
                        yield Ok(Event::default().event("generating").data(json!({"generating": value}).to_string()));
                    }
                }
            }
        }

        // Closing snapshot for clients that missed intermediate events.
        yield Ok(Event::default().event("generating").data(
            json!({"generating": handle.generating.latest()}).to_string(),
        ));
    }
}
