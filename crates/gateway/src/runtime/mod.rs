//! Turn runtime — the orchestration core.
//!
//! Entry point: [`turn::submit`] takes one user input and returns a
//! non-blocking handle of live emitters; the turn body runs in a spawned
//! task that sequences the data-agent route, the research loop, and the
//! commit.

pub mod choice;
pub mod data_agent;
pub mod projector;
pub mod related;
pub mod researcher;
pub mod store;
pub mod turn;

use acre_domain::message::{ConversationMessage, MessageKind};

/// Kinds never sent back to the model.
const NON_OUTGOING_KINDS: [MessageKind; 4] = [
    MessageKind::Tool,
    MessageKind::Followup,
    MessageKind::Related,
    MessageKind::End,
];

/// Build the outgoing message list from stored history: drop kinds the
/// model never sees, then keep the most recent `cap` entries in original
/// relative order.
pub fn trim_history(
    messages: &[ConversationMessage],
    cap: usize,
) -> Vec<ConversationMessage> {
    let kept: Vec<&ConversationMessage> = messages
        .iter()
        .filter(|m| match m.kind {
            Some(kind) => !NON_OUTGOING_KINDS.contains(&kind),
            None => true,
        })
        .collect();

    let skip = kept.len().saturating_sub(cap);
    kept[skip..].iter().map(|m| (*m).clone()).collect()
}
