use acre_domain::error::Result;
use acre_domain::message::ConversationMessage;
use acre_domain::stream::{BoxStream, FinishReason, StreamEvent, Usage};
use acre_domain::tool::{ToolCall, ToolDefinition};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Request / Response types
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A provider-agnostic chat completion request.
///
/// `messages` is the transcript slice built by the orchestrator; the
/// adapter handles the conversion to each provider's wire shapes
/// (including assistant tool-call turns and tool-result messages encoded
/// as JSON content).
#[derive(Debug, Clone, Default)]
pub struct ChatRequest {
    /// System prompt, sent ahead of the message list.
    pub system_prompt: Option<String>,
    pub messages: Vec<ConversationMessage>,
    /// Tool definitions the model may invoke.
    pub tools: Vec<ToolDefinition>,
    /// Sampling temperature. The research loop always passes 0.
    pub temperature: Option<f32>,
    /// Token budget ceiling. `None` lets the provider choose.
    pub max_tokens: Option<u32>,
    /// When `true`, request valid-JSON-only output (related-queries pass).
    pub json_mode: bool,
    /// Model identifier override. `None` = adapter default.
    pub model: Option<String>,
}

/// A provider-agnostic chat completion response (non-streaming).
#[derive(Debug, Clone)]
pub struct ChatResponse {
    pub content: String,
    pub tool_calls: Vec<ToolCall>,
    pub usage: Option<Usage>,
    pub finish_reason: FinishReason,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Core provider trait
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Trait every model adapter implements.
#[async_trait::async_trait]
pub trait ModelProvider: Send + Sync {
    /// Send a chat completion request and wait for the full response.
    async fn chat(&self, req: &ChatRequest) -> Result<ChatResponse>;

    /// Send a chat completion request and return a stream of events.
    async fn chat_stream(
        &self,
        req: &ChatRequest,
    ) -> Result<BoxStream<'static, Result<StreamEvent>>>;

    /// A unique identifier for this provider instance.
    fn provider_id(&self) -> &str;
}
