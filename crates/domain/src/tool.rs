use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A tool invocation requested by the model (provider-agnostic).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub call_id: String,
    pub tool_name: String,
    pub arguments: Value,
}

/// A completed tool invocation: the call plus its result payload.
///
/// A failed execution is data, not a panic — the result carries
/// `{"status": "error", ...}` and the model decides how to react.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolRecord {
    pub call_id: String,
    pub tool_name: String,
    pub result: Value,
}

/// Tool definition exposed to the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    /// JSON Schema for the tool's parameters.
    pub parameters: Value,
}

/// Body of an assistant transcript message that carried tool calls:
/// the raw text plus the call descriptors, JSON-encoded into `content`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssistantToolTurn {
    pub text: String,
    pub tool_calls: Vec<ToolCall>,
}
