//! Tool-augmented research loop.
//!
//! One invocation = one model call: stream text deltas through the
//! two-channel extraction into the live emitters, execute tool calls
//! through the registry, and report the outcome so the orchestrator can
//! decide whether to invoke again.

use std::sync::Arc;

use futures_util::StreamExt;

use acre_domain::channels::extract_channels;
use acre_domain::config::ModelConfig;
use acre_domain::emit::{Emitter, UiStream};
use acre_domain::error::Result;
use acre_domain::message::{ConversationMessage, MessageKind};
use acre_domain::stream::{FinishReason, StreamEvent};
use acre_domain::tool::{AssistantToolTurn, ToolCall, ToolRecord};
use acre_providers::{ChatRequest, ModelProvider};
use acre_tools::ToolRegistry;

use crate::runtime::store::{PrefView, StateCell};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Context and outcome
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct ResearchContext<'a> {
    pub provider: Arc<dyn ModelProvider>,
    pub registry: &'a ToolRegistry,
    pub model: &'a ModelConfig,
    pub prefs: &'a PrefView,
    /// Most recent committed answer, threaded into the system prompt so a
    /// "rewrite that" style request has something to rewrite.
    pub previous_answer: Option<String>,
    pub ui: &'a UiStream,
    pub scratchpad: &'a Emitter<String>,
    pub answer: &'a Emitter<String>,
    pub thinking: &'a Emitter<bool>,
    pub collapsed: &'a Emitter<bool>,
}

/// Result of one loop invocation.
pub struct ResearchOutcome {
    /// Raw accumulated model text (both channels, undelimited noise and
    /// all). Channel extraction happens on this at finalization.
    pub text: String,
    pub has_error: bool,
    pub tool_records: Vec<ToolRecord>,
    pub finish_reason: FinishReason,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// System prompt
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub fn build_system_prompt(preferences: &[String], previous_answer: Option<&str>) -> String {
    let mut prompt = String::from(
        "You are a research assistant specializing in real-estate and economic \
         analysis. Ground every claim in retrieved data and cite sources inline \
         as markdown links. Prefer the provided tools over prior knowledge for \
         anything current. Write a substantive answer of at least three \
         paragraphs unless the question is trivially factual.\n\n\
         Structure every response as exactly two channels:\n\
         <scratchpad>your working notes, source evaluation, and reasoning</scratchpad>\n\
         <answer>the complete user-facing answer</answer>\n\
         Text outside these tags is discarded. Never mention the tags themselves.",
    );

    if !preferences.is_empty() {
        prompt.push_str("\n\nUser preferences to honor:\n");
        for pref in preferences {
            prompt.push_str("- ");
            prompt.push_str(pref);
            prompt.push('\n');
        }
    }

    if let Some(previous) = previous_answer {
        prompt.push_str(
            "\n\nYour previous answer in this conversation, for reference if the \
             user asks for a revision:\n",
        );
        prompt.push_str(previous);
    }

    prompt
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// One invocation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Run one model invocation, streaming into the emitters, executing tool
/// calls, and appending the resulting transcript messages to both the
/// outgoing list and the state cell.
///
/// A provider failure on the initial call propagates (loop-fatal); errors
/// inside the stream are soft and the remainder is still drained.
pub async fn run_research(
    ctx: &ResearchContext<'_>,
    messages: &mut Vec<ConversationMessage>,
    cell: &StateCell,
) -> Result<ResearchOutcome> {
    let req = ChatRequest {
        system_prompt: Some(build_system_prompt(
            &ctx.prefs.preferences,
            ctx.previous_answer.as_deref(),
        )),
        messages: messages.clone(),
        tools: ctx.registry.definitions(),
        temperature: Some(0.0),
        max_tokens: Some(ctx.model.max_tokens),
        json_mode: false,
        model: None,
    };

    let mut stream = ctx.provider.chat_stream(&req).await?;

    let mut text = String::new();
    let mut tool_calls: Vec<ToolCall> = Vec::new();
    let mut tool_records: Vec<ToolRecord> = Vec::new();
    let mut has_error = false;
    let mut finish_reason = FinishReason::Other;

    while let Some(event_result) = stream.next().await {
        let event = match event_result {
            Ok(event) => event,
            Err(e) => {
                tracing::warn!(error = %e, "model stream transport error");
                has_error = true;
                text.push_str(&format!("\n[stream error: {e}]"));
                break;
            }
        };

        match event {
            StreamEvent::TextDelta { text: delta } => {
                text.push_str(&delta);
                // Recomputed from the full accumulated text each delta;
                // idempotent by construction.
                let extracted = extract_channels(&text);
                let answer_open = extracted.answer.is_empty();
                ctx.scratchpad.update(extracted.scratchpad)?;
                ctx.answer.update(extracted.answer)?;
                ctx.thinking.update(answer_open)?;
                ctx.collapsed.update(!answer_open)?;
            }

            StreamEvent::ToolCall {
                call_id,
                tool_name,
                arguments,
            } => {
                let call = ToolCall {
                    call_id,
                    tool_name,
                    arguments,
                };
                tracing::debug!(tool = %call.tool_name, "dispatching tool call");
                let record = ctx.registry.execute(&call, ctx.ui).await;
                tool_calls.push(call);
                tool_records.push(record);
            }

            StreamEvent::ToolResult {
                call_id,
                tool_name,
                result,
            } => match result {
                Some(value) => tool_records.push(ToolRecord {
                    call_id,
                    tool_name,
                    result: value,
                }),
                None => {
                    tracing::warn!(tool = %tool_name, "tool returned no result");
                    has_error = true;
                    text.push_str("\n[a data tool returned no result; the answer may be incomplete]");
                }
            },

            StreamEvent::Done {
                finish_reason: reason,
                usage,
            } => {
                finish_reason = reason;
                if let Some(usage) = usage {
                    tracing::debug!(
                        prompt_tokens = usage.prompt_tokens,
                        completion_tokens = usage.completion_tokens,
                        "model usage"
                    );
                }
            }

            StreamEvent::Error { message } => {
                tracing::warn!(error = %message, "model reported a stream error");
                has_error = true;
                text.push_str(&format!("\n[model error: {message}]"));
                // The model may still produce useful text after a tool
                // error; keep draining.
            }
        }
    }

    // Replay messages for the next iteration and the durable transcript.
    if !tool_calls.is_empty() {
        let turn = AssistantToolTurn {
            text: text.clone(),
            tool_calls: tool_calls.clone(),
        };
        let msg =
            ConversationMessage::assistant(MessageKind::Tool, serde_json::to_string(&turn)?);
        messages.push(msg.clone());
        cell.append(msg);
    } else if !text.is_empty() {
        // A truncated (or otherwise non-terminal) text turn must still be
        // visible to the next invocation, or the list goes out unchanged
        // and the text is lost. Working list only: the durable transcript
        // records the final text as the answer message.
        messages.push(ConversationMessage::assistant(MessageKind::Tool, text.clone()));
    }
    if !tool_records.is_empty() {
        let name = tool_records[0].tool_name.clone();
        let msg = ConversationMessage::tool(name, serde_json::to_string(&tool_records)?);
        messages.push(msg.clone());
        cell.append(msg);
    }

    Ok(ResearchOutcome {
        text,
        has_error,
        tool_records,
        finish_reason,
    })
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;
    use acre_conversations::{ConversationRecord, ConversationSink};
    use acre_domain::message::{ConversationState, Role};
    use acre_domain::stream::BoxStream;
    use acre_providers::ChatResponse;
    use serde_json::{json, Value};

    struct NullSink;

    #[async_trait::async_trait]
    impl ConversationSink for NullSink {
        async fn persist(&self, _record: ConversationRecord) -> Result<()> {
            Ok(())
        }
        async fn load(&self, _id: &str) -> Result<Option<ConversationRecord>> {
            Ok(None)
        }
        async fn list(&self, _user_id: &str) -> Result<Vec<ConversationRecord>> {
            Ok(vec![])
        }
    }

    /// Provider replaying scripted event batches, one per invocation.
    struct Scripted {
        batches: parking_lot::Mutex<Vec<Vec<StreamEvent>>>,
    }

    impl Scripted {
        fn new(batches: Vec<Vec<StreamEvent>>) -> Self {
            Self {
                batches: parking_lot::Mutex::new(batches),
            }
        }
    }

    #[async_trait::async_trait]
    impl ModelProvider for Scripted {
        async fn chat(&self, _req: &ChatRequest) -> Result<ChatResponse> {
            Ok(ChatResponse {
                content: String::new(),
                tool_calls: vec![],
                usage: None,
                finish_reason: FinishReason::Stop,
            })
        }
        async fn chat_stream(
            &self,
            _req: &ChatRequest,
        ) -> Result<BoxStream<'static, Result<StreamEvent>>> {
            let batch = {
                let mut batches = self.batches.lock();
                if batches.is_empty() {
                    vec![]
                } else {
                    batches.remove(0)
                }
            };
            Ok(Box::pin(futures_util::stream::iter(
                batch.into_iter().map(Ok),
            )))
        }
        fn provider_id(&self) -> &str {
            "scripted"
        }
    }

    struct Echo;

    #[async_trait::async_trait]
    impl acre_tools::ResearchTool for Echo {
        fn name(&self) -> &'static str {
            "search"
        }
        fn description(&self) -> &'static str {
            "test"
        }
        fn parameters(&self) -> Value {
            json!({"type": "object"})
        }
        async fn execute(&self, arguments: Value, _ui: &UiStream) -> Result<Value> {
            Ok(json!({"echo": arguments}))
        }
    }

    fn make_ctx<'a>(
        provider: Arc<dyn ModelProvider>,
        registry: &'a ToolRegistry,
        model: &'a ModelConfig,
        prefs: &'a PrefView,
        ui: &'a UiStream,
        emitters: &'a (Emitter<String>, Emitter<String>, Emitter<bool>, Emitter<bool>),
    ) -> ResearchContext<'a> {
        ResearchContext {
            provider,
            registry,
            model,
            prefs,
            previous_answer: None,
            ui,
            scratchpad: &emitters.0,
            answer: &emitters.1,
            thinking: &emitters.2,
            collapsed: &emitters.3,
        }
    }

    fn fixtures() -> (
        ModelConfig,
        PrefView,
        UiStream,
        (Emitter<String>, Emitter<String>, Emitter<bool>, Emitter<bool>),
        StateCell,
    ) {
        (
            ModelConfig::default(),
            PrefView {
                conversation_id: "c1".into(),
                preferences: vec![],
            },
            UiStream::new(),
            (
                Emitter::new(String::new()),
                Emitter::new(String::new()),
                Emitter::new(true),
                Emitter::new(false),
            ),
            StateCell::new(ConversationState::new("c1"), "u1", Arc::new(NullSink)),
        )
    }

    #[tokio::test]
    async fn text_deltas_feed_the_channel_emitters() {
        let provider = Arc::new(Scripted::new(vec![vec![
            StreamEvent::TextDelta {
                text: "<scratchpad>checking".into(),
            },
            StreamEvent::TextDelta {
                text: "</scratchpad><answer>rates ".into(),
            },
            StreamEvent::TextDelta {
                text: "rose</answer>".into(),
            },
            StreamEvent::Done {
                finish_reason: FinishReason::Stop,
                usage: None,
            },
        ]]));
        let registry = ToolRegistry::new();
        let (model, prefs, ui, emitters, cell) = fixtures();
        let ctx = make_ctx(provider, &registry, &model, &prefs, &ui, &emitters);

        let mut messages = vec![ConversationMessage::user(
            MessageKind::Input,
            r#"{"input":"rates?"}"#,
        )];
        let outcome = run_research(&ctx, &mut messages, &cell).await.unwrap();

        assert!(!outcome.has_error);
        assert_eq!(outcome.finish_reason, FinishReason::Stop);
        assert_eq!(emitters.0.latest(), "checking");
        assert_eq!(emitters.1.latest(), "rates rose");
        assert!(!emitters.2.latest());
        assert!(emitters.3.latest());
        // Text-only turn: replayed on the working list, not the cell.
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1].role, Role::Assistant);
        assert!(messages[1].content.contains("rates rose"));
        assert!(cell.snapshot().messages.is_empty());
    }

    #[tokio::test]
    async fn truncated_text_reaches_the_next_invocation() {
        let provider = Arc::new(Scripted::new(vec![vec![
            StreamEvent::TextDelta {
                text: "<scratchpad>cut off mid-".into(),
            },
            StreamEvent::Done {
                finish_reason: FinishReason::Length,
                usage: None,
            },
        ]]));
        let registry = ToolRegistry::new();
        let (model, prefs, ui, emitters, cell) = fixtures();
        let ctx = make_ctx(provider, &registry, &model, &prefs, &ui, &emitters);

        let mut messages = vec![ConversationMessage::user(
            MessageKind::Input,
            r#"{"input":"rates?"}"#,
        )];
        let outcome = run_research(&ctx, &mut messages, &cell).await.unwrap();

        assert_eq!(outcome.finish_reason, FinishReason::Length);
        // The partial text rides along so the next call can continue it.
        assert_eq!(messages.len(), 2);
        assert!(messages[1].content.contains("cut off mid-"));
    }

    #[tokio::test]
    async fn tool_calls_execute_and_append_replay_messages() {
        let provider = Arc::new(Scripted::new(vec![vec![
            StreamEvent::ToolCall {
                call_id: "call_1".into(),
                tool_name: "search".into(),
                arguments: json!({"query": "rent growth"}),
            },
            StreamEvent::Done {
                finish_reason: FinishReason::ToolCalls,
                usage: None,
            },
        ]]));
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(Echo));
        let (model, prefs, ui, emitters, cell) = fixtures();
        let ctx = make_ctx(provider, &registry, &model, &prefs, &ui, &emitters);

        let mut messages = vec![ConversationMessage::user(
            MessageKind::Input,
            r#"{"input":"rents?"}"#,
        )];
        let outcome = run_research(&ctx, &mut messages, &cell).await.unwrap();

        assert_eq!(outcome.finish_reason, FinishReason::ToolCalls);
        assert_eq!(outcome.tool_records.len(), 1);
        assert_eq!(outcome.tool_records[0].result["echo"]["query"], "rent growth");

        // Assistant tool turn + tool results message.
        assert_eq!(messages.len(), 3);
        assert!(messages[1].is_kind(MessageKind::Tool));
        assert!(messages[2].is_kind(MessageKind::Tool));
        assert_eq!(cell.snapshot().messages.len(), 2);
    }

    #[tokio::test]
    async fn null_tool_result_is_a_soft_error() {
        let provider = Arc::new(Scripted::new(vec![vec![
            StreamEvent::ToolResult {
                call_id: "c".into(),
                tool_name: "fred".into(),
                result: None,
            },
            StreamEvent::TextDelta {
                text: "<answer>partial</answer>".into(),
            },
            StreamEvent::Done {
                finish_reason: FinishReason::Stop,
                usage: None,
            },
        ]]));
        let registry = ToolRegistry::new();
        let (model, prefs, ui, emitters, cell) = fixtures();
        let ctx = make_ctx(provider, &registry, &model, &prefs, &ui, &emitters);

        let mut messages = Vec::new();
        let outcome = run_research(&ctx, &mut messages, &cell).await.unwrap();

        assert!(outcome.has_error);
        // Text after the soft error is still consumed.
        assert_eq!(emitters.1.latest(), "partial");
    }

    #[test]
    fn system_prompt_embeds_preferences_and_previous_answer() {
        let prompt = build_system_prompt(
            &["metric units".to_string()],
            Some("the previous answer text"),
        );
        assert!(prompt.contains("metric units"));
        assert!(prompt.contains("the previous answer text"));
        assert!(prompt.contains("<scratchpad>"));
        assert!(prompt.contains("<answer>"));
    }
}
