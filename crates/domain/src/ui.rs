//! Renderable fragments.
//!
//! The gateway never renders pixels; it emits a typed, serde-tagged
//! fragment tree that the web front-end maps onto presentation
//! components. Fragments travel two ways: live over the turn's
//! [`crate::emit::UiStream`], and replayed from stored state by the
//! projector.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::step::DisplayStep;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UiFragment {
    /// Initial "processing" placeholder.
    Spinner,

    /// The user's own message echoed back.
    UserEcho { text: String },

    /// Raw-content passthrough panel for inquiry submissions.
    InquiryPanel { content: String },

    /// Agent-progress panel; replaced wholesale on every agent event.
    AgentPanel { steps: Vec<DisplayStep> },

    /// Binary opt-in prompt for the slower economic-data route.
    ChoicePrompt { conversation_id: String },

    /// The streamed answer with its scratchpad and thinking state.
    AnswerPanel {
        scratchpad: String,
        answer: String,
        thinking: bool,
    },

    /// Web/vector search results, pushed by the search tool.
    SearchResultsPanel { query: String, results: Value },

    /// A fetched page, pushed by the retrieve tool.
    RetrievedPagePanel { url: String, title: Option<String> },

    /// Property listings, pushed by the property-search tool.
    PropertyPanel { listings: Value },

    /// Economic series data (FRED et al.) for replayed tool messages.
    EconDataPanel { source: String, data: Value },

    /// Suggested follow-up queries.
    RelatedPanel { queries: Vec<String> },

    /// Fixed follow-up affordance at the end of a completed turn.
    FollowupPanel,

    ErrorPanel { message: String },
}

/// One renderable unit reconstructed from a stored message, keyed by the
/// message id for stable client-side reconciliation.
#[derive(Debug, Clone, Serialize)]
pub struct RenderableTurn {
    pub id: String,
    pub fragment: UiFragment,
}
