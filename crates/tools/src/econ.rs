//! HTTP client for the external economic-data agent.
//!
//! The agent speaks newline-delimited JSON over a streaming POST. The
//! request is not sent until the returned stream is first polled, so the
//! routing decision (first event) can be taken without committing to the
//! full sequence cost when the caller declines.

use acre_domain::config::DataAgentConfig;
use acre_domain::step::{AgentEvent, DataAgent};
use acre_domain::stream::BoxStream;

pub struct HttpDataAgent {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpDataAgent {
    pub fn new(config: &DataAgentConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: config.endpoint.clone(),
        }
    }
}

impl DataAgent for HttpDataAgent {
    fn events(&self, query: &str) -> BoxStream<'static, AgentEvent> {
        let client = self.client.clone();
        let endpoint = self.endpoint.clone();
        let query = query.to_string();

        Box::pin(async_stream::stream! {
            let resp = client
                .post(&endpoint)
                .json(&serde_json::json!({"query": query}))
                .send()
                .await;

            let mut resp = match resp {
                Ok(r) if r.status().is_success() => r,
                Ok(r) => {
                    yield AgentEvent {
                        error: Some(format!("data agent HTTP {}", r.status().as_u16())),
                        ..Default::default()
                    };
                    return;
                }
                Err(e) => {
                    yield AgentEvent {
                        error: Some(format!("data agent unreachable: {e}")),
                        ..Default::default()
                    };
                    return;
                }
            };

            let mut buffer = String::new();
            loop {
                match resp.chunk().await {
                    Ok(Some(bytes)) => {
                        buffer.push_str(&String::from_utf8_lossy(&bytes));
                        while let Some(pos) = buffer.find('\n') {
                            let line: String = buffer.drain(..=pos).collect();
                            let line = line.trim();
                            if line.is_empty() {
                                continue;
                            }
                            match serde_json::from_str::<AgentEvent>(line) {
                                Ok(event) => yield event,
                                Err(e) => {
                                    tracing::warn!(error = %e, "skipping unparseable agent line");
                                }
                            }
                        }
                    }
                    Ok(None) => {
                        let leftover = buffer.trim();
                        if !leftover.is_empty() {
                            if let Ok(event) = serde_json::from_str::<AgentEvent>(leftover) {
                                yield event;
                            }
                        }
                        break;
                    }
                    Err(e) => {
                        yield AgentEvent {
                            error: Some(format!("data agent stream: {e}")),
                            ..Default::default()
                        };
                        break;
                    }
                }
            }
        })
    }
}
