//! External data-agent events and their normalized display form.
//!
//! The external agent is a lazily-produced sequence of heterogeneous JSON
//! events. Classification goes through [`StepPayload`], a tagged union with
//! an explicit `Unknown` passthrough so new provider shapes degrade to
//! raw display instead of crashing the adapter.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::stream::BoxStream;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Raw agent events
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// One raw event from the external data agent, as received on the wire.
///
/// The first event of a sequence carries `needs_economic_data`; subsequent
/// events carry a step payload in `api_stream` (or `data` for terminal
/// payloads) and optionally an `error`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentEvent {
    #[serde(default)]
    pub needs_economic_data: Option<bool>,
    #[serde(default)]
    pub api_stream: Option<Value>,
    #[serde(default)]
    pub data: Option<Value>,
    #[serde(default)]
    pub error: Option<String>,
}

impl AgentEvent {
    pub fn routing(needs_economic_data: bool) -> Self {
        Self {
            needs_economic_data: Some(needs_economic_data),
            ..Default::default()
        }
    }

    pub fn step(payload: Value) -> Self {
        Self {
            api_stream: Some(payload),
            ..Default::default()
        }
    }

    /// The step payload, whichever field it arrived in.
    pub fn payload(&self) -> Option<&Value> {
        self.api_stream.as_ref().or(self.data.as_ref())
    }
}

/// The lazy event-sequence source. The adapter only requires that the
/// first event be inspectable before the rest are consumed.
pub trait DataAgent: Send + Sync {
    fn events(&self, query: &str) -> BoxStream<'static, AgentEvent>;
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Classified payloads
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A step payload classified by its `step_type` tag.
#[derive(Debug, Clone, PartialEq)]
pub enum StepPayload {
    /// The agent echoing the user query back; not displayed as a step.
    UserQuery { query: String },
    ApiCall {
        source: Option<String>,
        query: Option<String>,
        parameters: Option<Value>,
    },
    ApiResponse {
        source: Option<String>,
        results: Option<Value>,
    },
    /// Anything we do not recognize passes through unchanged.
    Unknown(Value),
}

impl StepPayload {
    /// Classify a raw payload by its `step_type` field. Unknown shapes
    /// (missing tag, wrong types) land in [`StepPayload::Unknown`].
    pub fn classify(raw: &Value) -> Self {
        let step_type = raw.get("step_type").and_then(Value::as_str);
        match step_type {
            Some("user_query") => match raw.get("query").and_then(Value::as_str) {
                Some(q) => StepPayload::UserQuery { query: q.to_owned() },
                None => StepPayload::Unknown(raw.clone()),
            },
            Some("api_call") => StepPayload::ApiCall {
                source: raw.get("source").and_then(Value::as_str).map(str::to_owned),
                query: raw.get("query").and_then(Value::as_str).map(str::to_owned),
                parameters: raw.get("parameters").cloned(),
            },
            Some("api_response") => StepPayload::ApiResponse {
                source: raw.get("source").and_then(Value::as_str).map(str::to_owned),
                // Some sources use `results`, others `response`.
                results: raw.get("results").or_else(|| raw.get("response")).cloned(),
            },
            _ => StepPayload::Unknown(raw.clone()),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Display steps
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepState {
    Planning,
    Executing,
    Complete,
    Error,
    Loading,
}

/// Normalized shape for one unit of agent progress. Derived, never stored;
/// rebuilt on every raw event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisplayStep {
    /// Stable per logical step so the UI can transition a row in place.
    pub step_id: String,
    pub step_type: String,
    pub content: Value,
    pub state: StepState,
}

/// The serialized research summary smuggled into the model's context as a
/// synthetic user message (wrapped in the research delimiter tags).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResearchSummary {
    pub query: String,
    pub steps: Vec<DisplayStep>,
    pub api_source_urls: BTreeMap<String, String>,
}

/// Fixed attribution map for the economic data sources.
pub fn api_source_urls() -> BTreeMap<String, String> {
    BTreeMap::from([
        ("FRED".to_owned(), "https://fred.stlouisfed.org".to_owned()),
        ("BLS".to_owned(), "https://www.bls.gov".to_owned()),
        ("CFPB".to_owned(), "https://www.consumerfinance.gov".to_owned()),
        ("HMDA".to_owned(), "https://ffiec.cfpb.gov".to_owned()),
        ("SEC".to_owned(), "https://www.sec.gov".to_owned()),
    ])
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
