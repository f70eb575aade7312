//! Turn orchestrator.
//!
//! `submit` is non-blocking: it returns a handle of still-open emitters
//! immediately and runs the turn body (data-agent route, research loop,
//! related pass, commit) in a spawned task. The handle is everything the
//! API layer needs to render progress live.

use serde_json::json;

use acre_conversations::Caller;
use acre_domain::channels::{answer_is_open, extract_channels};
use acre_domain::config::LoopMode;
use acre_domain::emit::{Emitter, UiStream};
use acre_domain::error::Result;
use acre_domain::message::{ConversationMessage, ConversationState, MessageKind, Role};
use acre_domain::stream::FinishReason;
use acre_domain::ui::UiFragment;

use crate::runtime::data_agent::{run_data_agent, AgentOutcome};
use crate::runtime::related::suggest_related;
use crate::runtime::researcher::{run_research, ResearchContext};
use crate::runtime::store::StateCell;
use crate::runtime::trim_history;
use crate::state::AppState;

/// Fixed content of a skip-kind user message.
pub const SKIP_CONTENT: &str = r#"{"action":"skip"}"#;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Input and handle
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone)]
pub struct SubmitInput {
    pub conversation_id: String,
    /// Raw user text; ignored when `skip` is set.
    pub input: String,
    /// The input came from clicking a related-query suggestion.
    pub related_query: bool,
    /// The input is a clarifying inquiry rather than a research question.
    pub inquiry: bool,
    pub skip: bool,
    pub caller: Caller,
}

/// Live view of one in-flight turn, returned before generation starts.
#[derive(Clone)]
pub struct TurnHandle {
    pub id: String,
    pub conversation_id: String,
    pub generating: Emitter<bool>,
    /// Flips once the answer channel is first non-empty, so the front-end
    /// can collapse the scratchpad.
    pub collapsed: Emitter<bool>,
    pub ui: UiStream,
    pub scratchpad: Emitter<String>,
    pub answer: Emitter<String>,
    pub thinking: Emitter<bool>,
}

impl TurnHandle {
    fn new(conversation_id: &str) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            conversation_id: conversation_id.to_string(),
            generating: Emitter::new(true),
            collapsed: Emitter::new(false),
            ui: UiStream::new(),
            scratchpad: Emitter::new(String::new()),
            answer: Emitter::new(String::new()),
            thinking: Emitter::new(true),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Submission
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Start a turn. Returns immediately with the live handle; the turn body
/// runs in a spawned task.
pub fn submit(state: AppState, input: SubmitInput) -> TurnHandle {
    let handle = TurnHandle::new(&input.conversation_id);
    // A freshly-created stream cannot be finalized yet.
    let _ = handle.ui.append(UiFragment::Spinner);

    let task_handle = handle.clone();
    tokio::spawn(async move {
        if let Err(e) = run_turn(&state, &input, &task_handle).await {
            tracing::error!(
                conversation_id = %input.conversation_id,
                error = %e,
                "turn failed"
            );
            finalize_with_error(&task_handle, &e.to_string());
        }
    });

    handle
}

/// Loop-fatal path: no persistence, all emitters finalized with the error
/// text, an error panel instead of an answer panel. Emitters that already
/// finalized are left as they are.
fn finalize_with_error(handle: &TurnHandle, message: &str) {
    let _ = handle.thinking.done(false);
    let _ = handle.collapsed.done(true);
    let _ = handle.scratchpad.done_with_current();
    let _ = handle.answer.done(message.to_string());
    let _ = handle.ui.replace_all(UiFragment::ErrorPanel {
        message: message.to_string(),
    });
    let _ = handle.generating.done(false);
    let _ = handle.ui.done();
}

/// Classify the submission into exactly one message kind.
fn classify(input: &SubmitInput) -> ConversationMessage {
    if input.skip {
        ConversationMessage::user(MessageKind::Skip, SKIP_CONTENT)
    } else if input.related_query {
        ConversationMessage::user(
            MessageKind::InputRelated,
            json!({"related_query": input.input}).to_string(),
        )
    } else if input.inquiry {
        ConversationMessage::user(MessageKind::Inquiry, input.input.clone())
    } else {
        ConversationMessage::user(MessageKind::Input, json!({"input": input.input}).to_string())
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Turn body
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

async fn run_turn(state: &AppState, input: &SubmitInput, handle: &TurnHandle) -> Result<()> {
    let provider = state.provider.get()?;
    let model = state.provider.config();
    let user_id = input.caller.user_id();

    // Resume from the archive when the conversation already exists.
    let mut initial = ConversationState::new(&input.conversation_id);
    if let Some(record) = state.archive.load(&input.conversation_id).await? {
        initial.messages = record.messages;
    }

    // Pre-turn lookup: the most recent committed answer, for rewrite-style
    // requests. Threaded into every system prompt this turn.
    let previous_answer = initial
        .last_of_kind(MessageKind::Answer)
        .map(|m| extract_channels(&m.content).answer)
        .filter(|a| !a.is_empty());

    let cell = StateCell::new(initial, user_id, state.archive.clone());

    // First turn of a conversation: fetch and cache preferences.
    if cell.snapshot().cached_preferences.is_none() {
        cell.set_preferences(state.preferences.get(user_id));
    }

    let user_msg = classify(input);
    cell.append(user_msg);

    let cap = state.config.history.cap_for(model.loop_mode);
    let mut outgoing = trim_history(&cell.snapshot().messages, cap);

    // The external data route never runs for a skip.
    if !input.skip {
        if let Some(agent) = &state.data_agent {
            let outcome = run_data_agent(
                agent.as_ref(),
                &input.input,
                &state.choice_gate,
                &input.conversation_id,
                &handle.ui,
            )
            .await?;
            if let AgentOutcome::Summary(message) = outcome {
                cell.append(message.clone());
                outgoing.push(message);
            }
        }
    }

    let prefs = cell.prefs_view();
    let ctx = ResearchContext {
        provider: provider.clone(),
        registry: state.tools.as_ref(),
        model,
        prefs: &prefs,
        previous_answer,
        ui: &handle.ui,
        scratchpad: &handle.scratchpad,
        answer: &handle.answer,
        thinking: &handle.thinking,
        collapsed: &handle.collapsed,
    };

    // Outer loop: repeat invocations until the mode-specific termination
    // condition fires or the iteration ceiling is hit.
    let mut final_text = String::new();
    let mut has_error = false;
    let mut saw_tool_records = false;
    for iteration in 0..model.max_loops.max(1) {
        let outcome = run_research(&ctx, &mut outgoing, &cell).await?;
        saw_tool_records |= !outcome.tool_records.is_empty();
        if !outcome.text.is_empty() {
            final_text = outcome.text;
        }
        has_error = outcome.has_error;

        let terminal = match model.loop_mode {
            LoopMode::StopReason => outcome.finish_reason == FinishReason::Stop,
            // The loop repeats only while neither tool output nor answer
            // text has appeared. Providers in this mode cannot take tool
            // output back as tool-role messages; the conversion pass below
            // hands it over instead.
            LoopMode::ToolSignal => {
                !outcome.tool_records.is_empty()
                    || !extract_channels(&final_text).answer.is_empty()
            }
        };
        if terminal || has_error {
            break;
        }
        tracing::debug!(iteration, "research loop continuing");
    }

    // Providers without native tool-role support: when the loop ended with
    // tool output but no free text, re-present the tool messages as
    // assistant messages and ask once more for prose.
    if model.loop_mode == LoopMode::ToolSignal
        && saw_tool_records
        && !has_error
        && extract_channels(&final_text).answer.is_empty()
    {
        for msg in outgoing.iter_mut().filter(|m| m.role == Role::Tool) {
            msg.role = Role::Assistant;
        }
        let outcome = run_research(&ctx, &mut outgoing, &cell).await?;
        if !outcome.text.is_empty() {
            final_text = outcome.text;
        }
        has_error = outcome.has_error;
    }

    // The durable answer keeps the raw delimited text; extraction happens
    // again at render time.
    cell.append(ConversationMessage::assistant(
        MessageKind::Answer,
        final_text.clone(),
    ));

    let extracted = extract_channels(&final_text);
    handle.thinking.done(false)?;
    if !handle.collapsed.is_done() {
        handle.collapsed.done(true)?;
    }
    handle.scratchpad.done(extracted.scratchpad.clone())?;
    handle.answer.done(extracted.answer.clone())?;
    // Clears the placeholder spinner (and any stale choice prompt) in one
    // op; agent panels are rebuilt from stored state by the projector.
    handle.ui.replace_all(UiFragment::AnswerPanel {
        scratchpad: extracted.scratchpad,
        answer: extracted.answer.clone(),
        thinking: answer_is_open(&final_text),
    })?;

    // Garnish passes: related queries, then the followup sentinel.
    if !has_error && !extracted.answer.is_empty() {
        if let Some(queries) =
            suggest_related(provider.clone(), &input.input, &extracted.answer).await
        {
            cell.append(ConversationMessage::assistant(
                MessageKind::Related,
                json!({"queries": queries}).to_string(),
            ));
            handle.ui.append(UiFragment::RelatedPanel { queries })?;
        }
    }
    cell.append(ConversationMessage::assistant(MessageKind::Followup, ""));
    handle.ui.append(UiFragment::FollowupPanel)?;

    cell.commit().await?;

    handle.generating.done(false)?;
    handle.ui.done()?;

    if has_error {
        tracing::warn!(
            conversation_id = %input.conversation_id,
            "turn completed with degraded output"
        );
    }
    Ok(())
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::choice::ChoiceGate;
    use acre_conversations::{ConversationRecord, ConversationSink, PreferenceStore};
    use acre_domain::channels::extract_research_summary;
    use acre_domain::config::Config;
    use acre_domain::error::Error;
    use acre_domain::step::{AgentEvent, DataAgent, ResearchSummary};
    use acre_domain::stream::{BoxStream, StreamEvent};
    use acre_providers::{ChatRequest, ChatResponse, LazyProvider, ModelProvider};
    use acre_tools::ToolRegistry;
    use parking_lot::Mutex as PlMutex;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[derive(Default)]
    struct MemSink {
        persisted: PlMutex<Vec<ConversationRecord>>,
    }

    #[async_trait::async_trait]
    impl ConversationSink for MemSink {
        async fn persist(&self, record: ConversationRecord) -> Result<()> {
            self.persisted.lock().push(record);
            Ok(())
        }
        async fn load(&self, id: &str) -> Result<Option<ConversationRecord>> {
            Ok(self
                .persisted
                .lock()
                .iter()
                .rev()
                .find(|r| r.id == id)
                .cloned())
        }
        async fn list(&self, _user_id: &str) -> Result<Vec<ConversationRecord>> {
            Ok(self.persisted.lock().clone())
        }
    }

    /// Scripted provider: `chat_stream` replays one event batch per call,
    /// `chat` serves the related-query pass.
    struct Scripted {
        batches: PlMutex<Vec<Vec<StreamEvent>>>,
        related_json: &'static str,
    }

    impl Scripted {
        fn answering(answer_text: &str) -> Self {
            Self {
                batches: PlMutex::new(vec![vec![
                    StreamEvent::TextDelta {
                        text: format!(
                            "<scratchpad>working</scratchpad><answer>{answer_text}</answer>"
                        ),
                    },
                    StreamEvent::Done {
                        finish_reason: FinishReason::Stop,
                        usage: None,
                    },
                ]]),
                related_json: r#"{"queries": ["r1", "r2", "r3"]}"#,
            }
        }
    }

    #[async_trait::async_trait]
    impl ModelProvider for Scripted {
        async fn chat(&self, _req: &ChatRequest) -> Result<ChatResponse> {
            Ok(ChatResponse {
                content: self.related_json.to_string(),
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
                    vec![StreamEvent::Done {
                        finish_reason: FinishReason::Stop,
                        usage: None,
                    }]
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

    struct ScriptedAgent {
        events: Vec<AgentEvent>,
        invoked: Arc<AtomicBool>,
    }

    impl DataAgent for ScriptedAgent {
        fn events(&self, _query: &str) -> BoxStream<'static, AgentEvent> {
            self.invoked.store(true, Ordering::SeqCst);
            Box::pin(futures_util::stream::iter(self.events.clone()))
        }
    }

    struct Fixture {
        state: AppState,
        sink: Arc<MemSink>,
        agent_invoked: Arc<AtomicBool>,
        _tmp: tempfile::TempDir,
    }

    fn fixture(provider: Scripted, agent_events: Option<Vec<AgentEvent>>) -> Fixture {
        let tmp = tempfile::tempdir().unwrap();
        let config = Arc::new(Config::default());
        let sink = Arc::new(MemSink::default());
        let agent_invoked = Arc::new(AtomicBool::new(false));

        let data_agent: Option<Arc<dyn DataAgent>> = agent_events.map(|events| {
            Arc::new(ScriptedAgent {
                events,
                invoked: agent_invoked.clone(),
            }) as Arc<dyn DataAgent>
        });

        let state = AppState {
            config: config.clone(),
            provider: Arc::new(LazyProvider::preset(
                config.model.clone(),
                Arc::new(provider),
            )),
            archive: sink.clone(),
            preferences: Arc::new(PreferenceStore::new(tmp.path()).unwrap()),
            tools: Arc::new(ToolRegistry::new()),
            data_agent,
            choice_gate: Arc::new(ChoiceGate::new(Duration::from_secs(5))),
        };

        Fixture {
            state,
            sink,
            agent_invoked,
            _tmp: tmp,
        }
    }

    fn question(conversation_id: &str, text: &str) -> SubmitInput {
        SubmitInput {
            conversation_id: conversation_id.to_string(),
            input: text.to_string(),
            related_query: false,
            inquiry: false,
            skip: false,
            caller: Caller::User("u1".into()),
        }
    }

    async fn wait_done(handle: &TurnHandle) {
        let mut rx = handle.generating.subscribe();
        tokio::time::timeout(Duration::from_secs(5), async {
            while !handle.generating.is_done() {
                if rx.changed().await.is_err() {
                    break;
                }
            }
        })
        .await
        .expect("turn did not finish");
    }

    fn resolve_when_presented(gate: Arc<ChoiceGate>, id: &'static str, decision: bool) {
        tokio::spawn(async move {
            for _ in 0..1000 {
                if gate.resolve(id, decision) {
                    return;
                }
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        });
    }

    fn kinds_of(record: &ConversationRecord) -> Vec<Option<MessageKind>> {
        record.messages.iter().map(|m| m.kind).collect()
    }

    #[tokio::test]
    async fn plain_question_persists_a_full_turn() {
        let f = fixture(Scripted::answering("unemployment is trending down"), None);
        let handle = submit(f.state.clone(), question("c1", "What is the unemployment rate trend?"));
        wait_done(&handle).await;

        assert_eq!(handle.answer.latest(), "unemployment is trending down");
        assert_eq!(handle.scratchpad.latest(), "working");
        assert!(!handle.thinking.latest());
        assert!(handle.ui.is_done());

        let persisted = f.sink.persisted.lock();
        assert_eq!(persisted.len(), 1);
        let kinds = kinds_of(&persisted[0]);
        assert_eq!(
            kinds,
            vec![
                Some(MessageKind::Input),
                Some(MessageKind::Answer),
                Some(MessageKind::Related),
                Some(MessageKind::Followup),
                Some(MessageKind::End),
            ]
        );
        assert_eq!(persisted[0].messages.last().unwrap().role, Role::Assistant);
    }

    #[tokio::test]
    async fn declined_data_route_leaves_history_untouched() {
        let f = fixture(
            Scripted::answering("an answer"),
            Some(vec![
                AgentEvent::routing(true),
                AgentEvent::step(json!({"step_type": "api_call", "source": "FRED"})),
            ]),
        );
        resolve_when_presented(f.state.choice_gate.clone(), "c1", false);

        let handle = submit(f.state.clone(), question("c1", "mortgage rates?"));
        wait_done(&handle).await;

        assert!(f.agent_invoked.load(Ordering::SeqCst));
        let persisted = f.sink.persisted.lock();
        // No synthetic research-summary message: every persisted message
        // carries a kind.
        assert!(persisted[0].messages.iter().all(|m| m.kind.is_some()));
    }

    #[tokio::test]
    async fn accepted_data_route_appends_one_summary_message() {
        let pair = |src: &str| {
            vec![
                AgentEvent::step(json!({"step_type": "api_call", "source": src, "query": "S"})),
                AgentEvent::step(json!({"step_type": "api_response", "source": src, "results": [1]})),
            ]
        };
        let mut events = vec![AgentEvent::routing(true)];
        events.extend(pair("FRED"));
        events.extend(pair("BLS"));
        events.extend(pair("HMDA"));

        let f = fixture(Scripted::answering("data-backed answer"), Some(events));
        resolve_when_presented(f.state.choice_gate.clone(), "c1", true);

        let handle = submit(f.state.clone(), question("c1", "rate history?"));
        wait_done(&handle).await;

        let persisted = f.sink.persisted.lock();
        let summaries: Vec<_> = persisted[0]
            .messages
            .iter()
            .filter(|m| m.kind.is_none() && m.role == Role::User)
            .collect();
        assert_eq!(summaries.len(), 1);

        let raw = extract_research_summary(&summaries[0].content).unwrap();
        let summary: ResearchSummary = serde_json::from_str(raw).unwrap();
        assert_eq!(summary.steps.len(), 3);
        for key in ["FRED", "BLS", "CFPB", "HMDA", "SEC"] {
            assert!(summary.api_source_urls.contains_key(key));
        }
    }

    #[tokio::test]
    async fn skip_bypasses_the_data_agent_but_still_answers() {
        let f = fixture(
            Scripted::answering("continuing without new input"),
            Some(vec![AgentEvent::routing(true)]),
        );
        let handle = submit(
            f.state.clone(),
            SubmitInput {
                skip: true,
                ..question("c1", "")
            },
        );
        wait_done(&handle).await;

        assert!(!f.agent_invoked.load(Ordering::SeqCst));
        let persisted = f.sink.persisted.lock();
        let user_msg = &persisted[0].messages[0];
        assert_eq!(user_msg.content, SKIP_CONTENT);
        assert!(user_msg.is_kind(MessageKind::Skip));
        assert!(persisted[0]
            .messages
            .iter()
            .any(|m| m.is_kind(MessageKind::Answer)));
    }

    #[tokio::test]
    async fn provider_failure_renders_an_error_panel() {
        struct Failing;

        #[async_trait::async_trait]
        impl ModelProvider for Failing {
            async fn chat(&self, _req: &ChatRequest) -> Result<ChatResponse> {
                Err(Error::Provider {
                    provider: "failing".into(),
                    message: "connection refused".into(),
                })
            }
            async fn chat_stream(
                &self,
                _req: &ChatRequest,
            ) -> Result<BoxStream<'static, Result<StreamEvent>>> {
                Err(Error::Provider {
                    provider: "failing".into(),
                    message: "connection refused".into(),
                })
            }
            fn provider_id(&self) -> &str {
                "failing"
            }
        }

        let tmp = tempfile::tempdir().unwrap();
        let config = Arc::new(Config::default());
        let sink = Arc::new(MemSink::default());
        let state = AppState {
            config: config.clone(),
            provider: Arc::new(LazyProvider::preset(config.model.clone(), Arc::new(Failing))),
            archive: sink.clone(),
            preferences: Arc::new(PreferenceStore::new(tmp.path()).unwrap()),
            tools: Arc::new(ToolRegistry::new()),
            data_agent: None,
            choice_gate: Arc::new(ChoiceGate::new(Duration::from_secs(5))),
        };

        let handle = submit(state, question("c1", "anything"));
        wait_done(&handle).await;

        assert!(handle.answer.latest().contains("connection refused"));
        let fragments = handle.ui.fragments();
        assert_eq!(fragments.len(), 1);
        assert!(matches!(fragments[0], UiFragment::ErrorPanel { .. }));
        // Nothing persisted on a loop-fatal error.
        assert!(sink.persisted.lock().is_empty());
    }

    #[tokio::test]
    async fn answer_panel_replaces_the_placeholder_spinner() {
        let f = fixture(Scripted::answering("all set"), None);
        let handle = submit(f.state.clone(), question("c1", "ready?"));
        wait_done(&handle).await;

        let fragments = handle.ui.fragments();
        assert!(matches!(fragments[0], UiFragment::AnswerPanel { .. }));
        assert!(!fragments
            .iter()
            .any(|frag| matches!(frag, UiFragment::Spinner)));
    }

    #[tokio::test]
    async fn tool_signal_mode_stops_on_tool_output_then_recovers_prose() {
        /// Replays one batch per call and records how many tool-role
        /// messages each outgoing request carried.
        struct ToolThenProse {
            batches: PlMutex<Vec<Vec<StreamEvent>>>,
            tool_roles_per_call: PlMutex<Vec<usize>>,
        }

        #[async_trait::async_trait]
        impl ModelProvider for ToolThenProse {
            async fn chat(&self, _req: &ChatRequest) -> Result<ChatResponse> {
                Ok(ChatResponse {
                    content: r#"{"queries": []}"#.into(),
                    tool_calls: vec![],
                    usage: None,
                    finish_reason: FinishReason::Stop,
                })
            }
            async fn chat_stream(
                &self,
                req: &ChatRequest,
            ) -> Result<BoxStream<'static, Result<StreamEvent>>> {
                self.tool_roles_per_call.lock().push(
                    req.messages
                        .iter()
                        .filter(|m| m.role == Role::Tool)
                        .count(),
                );
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
                "tool-then-prose"
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
            fn parameters(&self) -> serde_json::Value {
                json!({"type": "object"})
            }
            async fn execute(
                &self,
                arguments: serde_json::Value,
                _ui: &UiStream,
            ) -> Result<serde_json::Value> {
                Ok(json!({"echo": arguments}))
            }
        }

        let provider = Arc::new(ToolThenProse {
            batches: PlMutex::new(vec![
                vec![
                    StreamEvent::ToolCall {
                        call_id: "c1".into(),
                        tool_name: "search".into(),
                        arguments: json!({"query": "cap rates"}),
                    },
                    StreamEvent::Done {
                        finish_reason: FinishReason::ToolCalls,
                        usage: None,
                    },
                ],
                vec![
                    StreamEvent::TextDelta {
                        text: "<answer>cap rates widened</answer>".into(),
                    },
                    StreamEvent::Done {
                        finish_reason: FinishReason::Stop,
                        usage: None,
                    },
                ],
            ]),
            tool_roles_per_call: PlMutex::new(Vec::new()),
        });

        let tmp = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.model.loop_mode = LoopMode::ToolSignal;
        let config = Arc::new(config);
        let sink = Arc::new(MemSink::default());
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(Echo));
        let state = AppState {
            config: config.clone(),
            provider: Arc::new(LazyProvider::preset(
                config.model.clone(),
                provider.clone(),
            )),
            archive: sink.clone(),
            preferences: Arc::new(PreferenceStore::new(tmp.path()).unwrap()),
            tools: Arc::new(registry),
            data_agent: None,
            choice_gate: Arc::new(ChoiceGate::new(Duration::from_secs(5))),
        };

        let handle = submit(state, question("c1", "cap rates?"));
        wait_done(&handle).await;

        assert_eq!(handle.answer.latest(), "cap rates widened");
        // Exactly two invocations: the first tool output ends the loop,
        // then the conversion pass asks once more for prose.
        let calls = provider.tool_roles_per_call.lock();
        assert_eq!(calls.len(), 2);
        // The second request carries no tool-role messages: they were
        // re-labeled as assistant turns before the re-send.
        assert_eq!(calls[1], 0);
        assert!(sink.persisted.lock()[0]
            .messages
            .iter()
            .any(|m| m.is_kind(MessageKind::Answer)));
    }

    #[tokio::test]
    async fn second_turn_resumes_from_the_archive() {
        let f = fixture(Scripted::answering("first answer"), None);
        let handle = submit(f.state.clone(), question("c1", "first question"));
        wait_done(&handle).await;

        // Fresh scripted batches for the second turn.
        let provider = Scripted::answering("second answer");
        let state = AppState {
            provider: Arc::new(LazyProvider::preset(
                f.state.config.model.clone(),
                Arc::new(provider),
            )),
            ..f.state.clone()
        };
        let handle = submit(state, question("c1", "and a follow-up"));
        wait_done(&handle).await;

        let persisted = f.sink.persisted.lock();
        let latest = persisted.last().unwrap();
        let answers = latest
            .messages
            .iter()
            .filter(|m| m.is_kind(MessageKind::Answer))
            .count();
        assert_eq!(answers, 2);
        // Exactly one end sentinel per commit; earlier ones are inherited
        // in the history, the newest is last.
        assert!(latest.messages.last().unwrap().is_kind(MessageKind::End));
    }
}
