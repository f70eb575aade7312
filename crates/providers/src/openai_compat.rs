//! OpenAI-compatible adapter.
//!
//! Works with OpenAI, Azure-style gateways, vLLM, Together, and any other
//! endpoint following the chat-completions contract. Converts the
//! transcript's string-log messages to wire shapes: assistant turns whose
//! content decodes as an [`AssistantToolTurn`] become `tool_calls`
//! messages, and tool messages (a JSON array of [`ToolRecord`]) fan out
//! into one wire message per result.

use std::collections::BTreeMap;

use serde_json::Value;

use acre_domain::error::{Error, Result};
use acre_domain::message::{ConversationMessage, Role};
use acre_domain::stream::{BoxStream, FinishReason, StreamEvent, Usage};
use acre_domain::tool::{AssistantToolTurn, ToolDefinition, ToolRecord};

use crate::sse::sse_response_stream;
use crate::traits::{ChatRequest, ChatResponse, ModelProvider};
use crate::util::from_reqwest;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Adapter struct
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct OpenAiCompatProvider {
    id: String,
    base_url: String,
    api_key: String,
    default_model: String,
    client: reqwest::Client,
}

impl OpenAiCompatProvider {
    pub fn new(base_url: &str, api_key: String, default_model: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .build()
            .map_err(from_reqwest)?;

        Ok(Self {
            id: "openai_compat".into(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            default_model: default_model.to_string(),
            client,
        })
    }

    fn authed_post(&self, url: &str) -> reqwest::RequestBuilder {
        self.client
            .post(url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
    }

    fn chat_url(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    fn build_chat_body(&self, req: &ChatRequest, stream: bool) -> Value {
        let mut messages: Vec<Value> = Vec::new();
        if let Some(system) = &req.system_prompt {
            messages.push(serde_json::json!({"role": "system", "content": system}));
        }
        for msg in &req.messages {
            messages.extend(msg_to_openai(msg));
        }

        let model = req
            .model
            .clone()
            .unwrap_or_else(|| self.default_model.clone());

        let mut body = serde_json::json!({
            "model": model,
            "messages": messages,
            "stream": stream,
        });

        if !req.tools.is_empty() {
            let tools: Vec<Value> = req.tools.iter().map(tool_to_openai).collect();
            body["tools"] = Value::Array(tools);
        }
        if let Some(temp) = req.temperature {
            body["temperature"] = serde_json::json!(temp);
        }
        if let Some(max) = req.max_tokens {
            body["max_tokens"] = serde_json::json!(max);
        }
        if req.json_mode {
            body["response_format"] = serde_json::json!({"type": "json_object"});
        }
        if stream {
            body["stream_options"] = serde_json::json!({"include_usage": true});
        }
        body
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Message serialization helpers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Convert one transcript message to zero or more wire messages.
fn msg_to_openai(msg: &ConversationMessage) -> Vec<Value> {
    match msg.role {
        Role::System => vec![serde_json::json!({"role": "system", "content": msg.content})],
        Role::User => vec![serde_json::json!({"role": "user", "content": msg.content})],
        Role::Assistant => vec![assistant_to_openai(msg)],
        Role::Tool => tool_results_to_openai(msg),
    }
}

fn assistant_to_openai(msg: &ConversationMessage) -> Value {
    // An assistant turn that carried tool calls stores them JSON-encoded.
    if let Ok(turn) = serde_json::from_str::<AssistantToolTurn>(&msg.content) {
        if !turn.tool_calls.is_empty() {
            let tool_calls: Vec<Value> = turn
                .tool_calls
                .iter()
                .map(|tc| {
                    serde_json::json!({
                        "id": tc.call_id,
                        "type": "function",
                        "function": {
                            "name": tc.tool_name,
                            "arguments": tc.arguments.to_string(),
                        }
                    })
                })
                .collect();
            let content = if turn.text.is_empty() {
                Value::Null
            } else {
                Value::String(turn.text)
            };
            return serde_json::json!({
                "role": "assistant",
                "content": content,
                "tool_calls": tool_calls,
            });
        }
    }
    serde_json::json!({"role": "assistant", "content": msg.content})
}

fn tool_results_to_openai(msg: &ConversationMessage) -> Vec<Value> {
    match serde_json::from_str::<Vec<ToolRecord>>(&msg.content) {
        Ok(records) => records
            .iter()
            .map(|r| {
                serde_json::json!({
                    "role": "tool",
                    "tool_call_id": r.call_id,
                    "content": r.result.to_string(),
                })
            })
            .collect(),
        // Legacy/hand-written tool entry: pass the raw content through.
        Err(_) => vec![serde_json::json!({
            "role": "tool",
            "tool_call_id": msg.id,
            "content": msg.content,
        })],
    }
}

fn tool_to_openai(tool: &ToolDefinition) -> Value {
    serde_json::json!({
        "type": "function",
        "function": {
            "name": tool.name,
            "description": tool.description,
            "parameters": tool.parameters,
        }
    })
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Response deserialization helpers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn parse_chat_response(body: &Value) -> Result<ChatResponse> {
    let choice = body
        .get("choices")
        .and_then(|c| c.as_array())
        .and_then(|a| a.first())
        .ok_or_else(|| Error::Provider {
            provider: "openai_compat".into(),
            message: "no choices in response".into(),
        })?;

    let message = choice.get("message").ok_or_else(|| Error::Provider {
        provider: "openai_compat".into(),
        message: "no message in choice".into(),
    })?;

    let content = message
        .get("content")
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .to_string();

    let finish_reason = choice
        .get("finish_reason")
        .and_then(|v| v.as_str())
        .map(FinishReason::from_wire)
        .unwrap_or(FinishReason::Other);

    let tool_calls = message
        .get("tool_calls")
        .and_then(|v| v.as_array())
        .map(|arr| {
            arr.iter()
                .filter_map(|tc| {
                    let call_id = tc.get("id")?.as_str()?.to_string();
                    let func = tc.get("function")?;
                    let tool_name = func.get("name")?.as_str()?.to_string();
                    let args_str = func.get("arguments")?.as_str().unwrap_or("{}");
                    let arguments: Value = serde_json::from_str(args_str)
                        .unwrap_or(Value::Object(Default::default()));
                    Some(acre_domain::tool::ToolCall {
                        call_id,
                        tool_name,
                        arguments,
                    })
                })
                .collect()
        })
        .unwrap_or_default();

    let usage = body.get("usage").and_then(parse_openai_usage);

    Ok(ChatResponse {
        content,
        tool_calls,
        usage,
        finish_reason,
    })
}

fn parse_openai_usage(v: &Value) -> Option<Usage> {
    Some(Usage {
        prompt_tokens: v.get("prompt_tokens")?.as_u64()? as u32,
        completion_tokens: v.get("completion_tokens")?.as_u64()? as u32,
        total_tokens: v.get("total_tokens")?.as_u64()? as u32,
    })
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// SSE streaming parser (stateful: assembles tool-call deltas)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Default)]
struct StreamState {
    /// index -> (call_id, tool_name, accumulated args json)
    bufs: BTreeMap<u64, (String, String, String)>,
    last_finish: Option<FinishReason>,
    done_sent: bool,
}

impl StreamState {
    /// Flush assembled tool calls, in index order, as complete events.
    fn flush_tool_calls(&mut self) -> Vec<Result<StreamEvent>> {
        let bufs = std::mem::take(&mut self.bufs);
        bufs.into_values()
            .map(|(call_id, tool_name, args)| {
                let arguments = if args.trim().is_empty() {
                    Value::Object(Default::default())
                } else {
                    serde_json::from_str(&args).unwrap_or_else(|e| {
                        tracing::warn!(
                            tool = %tool_name,
                            error = %e,
                            "tool call arguments are not valid JSON; defaulting to empty object"
                        );
                        Value::Object(Default::default())
                    })
                };
                Ok(StreamEvent::ToolCall {
                    call_id,
                    tool_name,
                    arguments,
                })
            })
            .collect()
    }

    fn parse(&mut self, data: &str) -> Vec<Result<StreamEvent>> {
        if data.trim() == "[DONE]" {
            if self.done_sent {
                return Vec::new();
            }
            let mut events = self.flush_tool_calls();
            self.done_sent = true;
            events.push(Ok(StreamEvent::Done {
                finish_reason: self.last_finish.unwrap_or(FinishReason::Stop),
                usage: None,
            }));
            return events;
        }

        let v: Value = match serde_json::from_str(data) {
            Ok(v) => v,
            Err(e) => return vec![Err(Error::Json(e))],
        };

        let choice = v
            .get("choices")
            .and_then(|c| c.as_array())
            .and_then(|a| a.first());

        // Usage-only chunk (stream_options.include_usage).
        let Some(choice) = choice else {
            if let Some(usage) = v.get("usage").and_then(parse_openai_usage) {
                self.done_sent = true;
                return vec![Ok(StreamEvent::Done {
                    finish_reason: self.last_finish.unwrap_or(FinishReason::Other),
                    usage: Some(usage),
                })];
            }
            return Vec::new();
        };

        // Finish chunk: flush pending tool calls first.
        if let Some(fr) = choice.get("finish_reason").and_then(|f| f.as_str()) {
            let reason = FinishReason::from_wire(fr);
            self.last_finish = Some(reason);
            let mut events = self.flush_tool_calls();
            self.done_sent = true;
            events.push(Ok(StreamEvent::Done {
                finish_reason: reason,
                usage: v.get("usage").and_then(parse_openai_usage),
            }));
            return events;
        }

        let delta = choice.get("delta").unwrap_or(&Value::Null);

        if let Some(tc_arr) = delta.get("tool_calls").and_then(|t| t.as_array()) {
            for tc in tc_arr {
                let idx = tc.get("index").and_then(|i| i.as_u64()).unwrap_or(0);
                let entry = self.bufs.entry(idx).or_default();
                if let Some(id) = tc.get("id").and_then(|i| i.as_str()) {
                    entry.0 = id.to_string();
                }
                if let Some(name) = tc
                    .get("function")
                    .and_then(|f| f.get("name"))
                    .and_then(|n| n.as_str())
                {
                    entry.1 = name.to_string();
                }
                if let Some(args) = tc
                    .get("function")
                    .and_then(|f| f.get("arguments"))
                    .and_then(|a| a.as_str())
                {
                    entry.2.push_str(args);
                }
            }
            return Vec::new();
        }

        if let Some(text) = delta.get("content").and_then(|c| c.as_str()) {
            if !text.is_empty() {
                return vec![Ok(StreamEvent::TextDelta {
                    text: text.to_string(),
                })];
            }
        }

        Vec::new()
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Trait implementation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[async_trait::async_trait]
impl ModelProvider for OpenAiCompatProvider {
    async fn chat(&self, req: &ChatRequest) -> Result<ChatResponse> {
        let url = self.chat_url();
        let body = self.build_chat_body(req, false);

        tracing::debug!(provider = %self.id, url = %url, "chat request");

        let resp = self
            .authed_post(&url)
            .json(&body)
            .send()
            .await
            .map_err(from_reqwest)?;

        let status = resp.status();
        let resp_text = resp.text().await.map_err(from_reqwest)?;

        if !status.is_success() {
            return Err(Error::Provider {
                provider: self.id.clone(),
                message: format!("HTTP {} - {}", status.as_u16(), resp_text),
            });
        }

        let resp_json: Value = serde_json::from_str(&resp_text)?;
        parse_chat_response(&resp_json)
    }

    async fn chat_stream(
        &self,
        req: &ChatRequest,
    ) -> Result<BoxStream<'static, Result<StreamEvent>>> {
        let url = self.chat_url();
        let body = self.build_chat_body(req, true);

        tracing::debug!(provider = %self.id, url = %url, "stream request");

        let resp = self
            .authed_post(&url)
            .json(&body)
            .send()
            .await
            .map_err(from_reqwest)?;

        let status = resp.status();
        if !status.is_success() {
            let err_text = resp.text().await.map_err(from_reqwest)?;
            return Err(Error::Provider {
                provider: self.id.clone(),
                message: format!("HTTP {} - {}", status.as_u16(), err_text),
            });
        }

        let mut state = StreamState::default();
        Ok(sse_response_stream(resp, move |data| state.parse(data)))
    }

    fn provider_id(&self) -> &str {
        &self.id
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;
    use acre_domain::message::MessageKind;
    use acre_domain::tool::ToolCall;

    #[test]
    fn assistant_tool_turn_becomes_tool_calls_message() {
        let turn = AssistantToolTurn {
            text: "checking".into(),
            tool_calls: vec![ToolCall {
                call_id: "call_1".into(),
                tool_name: "search".into(),
                arguments: serde_json::json!({"query": "rates"}),
            }],
        };
        let msg = ConversationMessage::assistant(
            MessageKind::Tool,
            serde_json::to_string(&turn).unwrap(),
        );
        let wire = assistant_to_openai(&msg);
        assert_eq!(wire["role"], "assistant");
        assert_eq!(wire["tool_calls"][0]["function"]["name"], "search");
        assert_eq!(wire["content"], "checking");
    }

    #[test]
    fn tool_message_fans_out_per_record() {
        let records = vec![
            ToolRecord {
                call_id: "c1".into(),
                tool_name: "search".into(),
                result: serde_json::json!({"hits": 2}),
            },
            ToolRecord {
                call_id: "c2".into(),
                tool_name: "retrieve".into(),
                result: serde_json::json!({"ok": true}),
            },
        ];
        let msg = ConversationMessage::tool("search", serde_json::to_string(&records).unwrap());
        let wires = tool_results_to_openai(&msg);
        assert_eq!(wires.len(), 2);
        assert_eq!(wires[0]["tool_call_id"], "c1");
        assert_eq!(wires[1]["tool_call_id"], "c2");
    }

    #[test]
    fn stream_parser_assembles_tool_call_deltas() {
        let mut state = StreamState::default();
        assert!(state
            .parse(r#"{"choices":[{"delta":{"tool_calls":[{"index":0,"id":"call_9","function":{"name":"search","arguments":""}}]}}]}"#)
            .is_empty());
        assert!(state
            .parse(r#"{"choices":[{"delta":{"tool_calls":[{"index":0,"function":{"arguments":"{\"query\":"}}]}}]}"#)
            .is_empty());
        assert!(state
            .parse(r#"{"choices":[{"delta":{"tool_calls":[{"index":0,"function":{"arguments":"\"rents\"}"}}]}}]}"#)
            .is_empty());

        let events = state.parse(r#"{"choices":[{"delta":{},"finish_reason":"tool_calls"}]}"#);
        assert_eq!(events.len(), 2);
        match events[0].as_ref().unwrap() {
            StreamEvent::ToolCall {
                call_id,
                tool_name,
                arguments,
            } => {
                assert_eq!(call_id, "call_9");
                assert_eq!(tool_name, "search");
                assert_eq!(arguments["query"], "rents");
            }
            other => panic!("expected tool call, got {other:?}"),
        }
        assert!(matches!(
            events[1].as_ref().unwrap(),
            StreamEvent::Done {
                finish_reason: FinishReason::ToolCalls,
                ..
            }
        ));
    }

    #[test]
    fn stream_parser_emits_text_deltas_and_done() {
        let mut state = StreamState::default();
        let events = state.parse(r#"{"choices":[{"delta":{"content":"hel"}}]}"#);
        assert!(matches!(
            events[0].as_ref().unwrap(),
            StreamEvent::TextDelta { text } if text == "hel"
        ));

        let events = state.parse(r#"{"choices":[{"delta":{},"finish_reason":"stop"}]}"#);
        assert!(matches!(
            events[0].as_ref().unwrap(),
            StreamEvent::Done {
                finish_reason: FinishReason::Stop,
                ..
            }
        ));

        // The trailing [DONE] sentinel must not emit a second Done.
        assert!(state.parse("[DONE]").is_empty());
    }

    #[test]
    fn malformed_args_default_to_empty_object() {
        let mut state = StreamState::default();
        state.bufs.insert(0, ("c".into(), "search".into(), "{not json".into()));
        let events = state.flush_tool_calls();
        match events[0].as_ref().unwrap() {
            StreamEvent::ToolCall { arguments, .. } => {
                assert!(arguments.as_object().unwrap().is_empty());
            }
            other => panic!("expected tool call, got {other:?}"),
        }
    }
}
