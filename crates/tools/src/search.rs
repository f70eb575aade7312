//! Web search tool (Tavily-compatible endpoint).

use serde_json::{json, Value};

use acre_domain::config::ToolsConfig;
use acre_domain::emit::UiStream;
use acre_domain::error::{Error, Result};
use acre_domain::ui::UiFragment;

use crate::registry::ResearchTool;

pub struct SearchTool {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    max_results: usize,
}

impl SearchTool {
    /// Reads the API key from the configured environment variable; the
    /// gateway skips registration when the key is absent.
    pub fn new(config: &ToolsConfig) -> Result<Self> {
        let api_key = std::env::var(&config.search_api_key_env).map_err(|_| {
            Error::Config(format!(
                "missing search API key: set {} in the environment",
                config.search_api_key_env
            ))
        })?;
        Ok(Self {
            client: reqwest::Client::new(),
            endpoint: config.search_endpoint.clone(),
            api_key,
            max_results: config.max_results,
        })
    }
}

#[async_trait::async_trait]
impl ResearchTool for SearchTool {
    fn name(&self) -> &'static str {
        "search"
    }

    fn description(&self) -> &'static str {
        "Search the web for current information. Use for market news, \
         recent statistics, and anything not covered by the economic data \
         sources."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "The search query"
                }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, arguments: Value, ui: &UiStream) -> Result<Value> {
        let query = arguments
            .get("query")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::Other("search: missing query argument".into()))?
            .to_string();

        tracing::debug!(query = %query, "web search");

        let resp = self
            .client
            .post(&self.endpoint)
            .json(&json!({
                "api_key": self.api_key,
                "query": query,
                "max_results": self.max_results,
            }))
            .send()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(Error::Http(format!("search upstream HTTP {}", status.as_u16())));
        }

        let body: Value = resp.json().await.map_err(|e| Error::Http(e.to_string()))?;
        let results = body.get("results").cloned().unwrap_or(Value::Array(vec![]));

        ui.append(UiFragment::SearchResultsPanel {
            query: query.clone(),
            results: results.clone(),
        })?;

        Ok(json!({"query": query, "results": results}))
    }
}
