//! External data-agent adapter.
//!
//! Consumes the agent's lazy event sequence: the first event decides
//! routing, the choice gate asks the user to opt in to the slower route,
//! and accepted sequences are normalized into display steps (one UI
//! replace per event) and finally serialized into one synthetic user
//! message for the research loop's context.

use futures_util::StreamExt;
use serde_json::json;

use acre_domain::channels::wrap_research_summary;
use acre_domain::emit::UiStream;
use acre_domain::error::Result;
use acre_domain::message::{ConversationMessage, Role};
use acre_domain::step::{
    api_source_urls, AgentEvent, DataAgent, DisplayStep, ResearchSummary, StepPayload, StepState,
};
use acre_domain::ui::UiFragment;

use crate::runtime::choice::ChoiceGate;

/// Outcome of the data-agent route for one turn.
pub enum AgentOutcome {
    /// Route not needed, declined, or agent unavailable.
    Skipped,
    /// Route completed; the synthetic research-summary message to append.
    Summary(ConversationMessage),
}

pub async fn run_data_agent(
    agent: &dyn DataAgent,
    query: &str,
    gate: &ChoiceGate,
    conversation_id: &str,
    ui: &UiStream,
) -> Result<AgentOutcome> {
    let mut events = agent.events(query);

    // Peek the routing event without consuming the rest.
    let Some(first) = events.next().await else {
        return Ok(AgentOutcome::Skipped);
    };
    if let Some(error) = &first.error {
        tracing::warn!(error = %error, "data agent failed before routing");
        drain(&mut events).await;
        return Ok(AgentOutcome::Skipped);
    }
    if !first.needs_economic_data.unwrap_or(false) {
        drain(&mut events).await;
        return Ok(AgentOutcome::Skipped);
    }

    // The external route is slower; the user must opt in.
    ui.append(gate.present(conversation_id)?)?;
    let accepted = gate.wait(conversation_id).await;
    if !accepted {
        tracing::info!(conversation_id = %conversation_id, "economic data route declined");
        drain(&mut events).await;
        return Ok(AgentOutcome::Skipped);
    }

    let mut steps: Vec<DisplayStep> = Vec::new();
    let mut seq = 0usize;

    while let Some(event) = events.next().await {
        // One bad step must not void the whole research turn.
        if let Err(e) = process_event(&event, &mut steps, &mut seq) {
            tracing::warn!(error = %e, "skipping malformed agent event");
        }
        if let Err(e) = ui.replace_all(UiFragment::AgentPanel {
            steps: steps.clone(),
        }) {
            tracing::warn!(error = %e, "agent panel update dropped");
        }
    }

    let summary = ResearchSummary {
        query: query.to_string(),
        steps,
        api_source_urls: api_source_urls(),
    };
    let content = wrap_research_summary(&serde_json::to_string(&summary)?);

    // Untyped user-role message: sent to the model, never rendered.
    let message = ConversationMessage {
        id: uuid::Uuid::new_v4().to_string(),
        role: Role::User,
        content,
        kind: None,
        name: None,
    };
    Ok(AgentOutcome::Summary(message))
}

/// Consume the remainder of a sequence we are not using. The generator
/// may hold upstream resources until exhausted.
async fn drain(events: &mut acre_domain::stream::BoxStream<'static, AgentEvent>) {
    while events.next().await.is_some() {}
}

fn process_event(
    event: &AgentEvent,
    steps: &mut Vec<DisplayStep>,
    seq: &mut usize,
) -> Result<()> {
    if let Some(error) = &event.error {
        tracing::warn!(error = %error, "agent step error");
        if let Some(step) = steps.last_mut() {
            step.state = StepState::Error;
        }
        return Ok(());
    }

    let Some(payload) = event.payload() else {
        return Ok(());
    };

    match StepPayload::classify(payload) {
        // The agent echoing the query back adds nothing to the display.
        StepPayload::UserQuery { .. } => {}

        StepPayload::ApiCall {
            source,
            query,
            parameters,
        } => {
            *seq += 1;
            let source = source.unwrap_or_else(|| "unknown".to_string());
            steps.push(DisplayStep {
                step_id: format!("{}-{}", source.to_lowercase(), seq),
                step_type: "api_call".to_string(),
                content: json!({
                    "source": source,
                    "query": query,
                    "parameters": parameters,
                }),
                state: StepState::Executing,
            });
        }

        StepPayload::ApiResponse { source, results } => {
            // Transition the matching in-flight call in place so the UI
            // row flips executing -> complete instead of duplicating.
            let matching = steps.iter_mut().rev().find(|s| {
                s.state == StepState::Executing
                    && source
                        .as_deref()
                        .map(|src| s.content["source"] == src)
                        .unwrap_or(true)
            });
            match matching {
                Some(step) => {
                    step.content["results"] = results.unwrap_or(serde_json::Value::Null);
                    step.state = StepState::Complete;
                }
                None => {
                    *seq += 1;
                    steps.push(DisplayStep {
                        step_id: format!("response-{seq}"),
                        step_type: "api_response".to_string(),
                        content: json!({"source": source, "results": results}),
                        state: StepState::Complete,
                    });
                }
            }
        }

        StepPayload::Unknown(raw) => {
            *seq += 1;
            steps.push(DisplayStep {
                step_id: format!("step-{seq}"),
                step_type: "unknown".to_string(),
                content: raw,
                state: StepState::Complete,
            });
        }
    }
    Ok(())
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
