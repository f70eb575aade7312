//! The tool registry: definitions for the model, dispatch for the loop.

use std::sync::Arc;

use serde_json::{json, Value};

use acre_domain::emit::UiStream;
use acre_domain::error::Result;
use acre_domain::tool::{ToolCall, ToolDefinition, ToolRecord};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tool trait
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// One model-invocable tool.
///
/// `execute` receives the turn's UI stream and is expected to push its
/// own display fragment before returning the model-facing payload.
#[async_trait::async_trait]
pub trait ResearchTool: Send + Sync {
    fn name(&self) -> &'static str;
    fn description(&self) -> &'static str;
    /// JSON Schema for the arguments object.
    fn parameters(&self) -> Value;

    async fn execute(&self, arguments: Value, ui: &UiStream) -> Result<Value>;

    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters(),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Registry
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Registration-ordered set of tools.
#[derive(Default)]
pub struct ToolRegistry {
    tools: Vec<Arc<dyn ResearchTool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: Arc<dyn ResearchTool>) {
        tracing::debug!(tool = tool.name(), "tool registered");
        self.tools.push(tool);
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.iter().map(|t| t.definition()).collect()
    }

    fn lookup(&self, name: &str) -> Option<&Arc<dyn ResearchTool>> {
        self.tools.iter().find(|t| t.name() == name)
    }

    /// Execute one call. Never returns an error: unknown tools and failed
    /// executions produce an error-shaped result payload so the model can
    /// read what went wrong and route around it.
    pub async fn execute(&self, call: &ToolCall, ui: &UiStream) -> ToolRecord {
        let result = match self.lookup(&call.tool_name) {
            Some(tool) => match tool.execute(call.arguments.clone(), ui).await {
                Ok(value) => value,
                Err(e) => {
                    tracing::warn!(tool = %call.tool_name, error = %e, "tool execution failed");
                    json!({"status": "error", "message": e.to_string()})
                }
            },
            None => {
                tracing::warn!(tool = %call.tool_name, "unknown tool requested");
                json!({"status": "error", "message": format!("unknown tool: {}", call.tool_name)})
            }
        };

        ToolRecord {
            call_id: call.call_id.clone(),
            tool_name: call.tool_name.clone(),
            result,
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
