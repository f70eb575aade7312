//! Property-listing search tool, backed by the internal listings service.

use serde_json::{json, Value};

use acre_domain::config::ToolsConfig;
use acre_domain::emit::UiStream;
use acre_domain::error::{Error, Result};
use acre_domain::ui::UiFragment;

use crate::registry::ResearchTool;

pub struct PropertySearchTool {
    client: reqwest::Client,
    endpoint: String,
    max_results: usize,
}

impl PropertySearchTool {
    pub fn new(config: &ToolsConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: config.property_endpoint.clone(),
            max_results: config.max_results,
        }
    }
}

#[async_trait::async_trait]
impl ResearchTool for PropertySearchTool {
    fn name(&self) -> &'static str {
        "property_search"
    }

    fn description(&self) -> &'static str {
        "Search current property listings. Use when the user asks about \
         homes for sale or rent in a specific area."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "location": {
                    "type": "string",
                    "description": "City, neighborhood, or zip code"
                },
                "max_price": {
                    "type": "number",
                    "description": "Upper price bound in USD"
                },
                "min_beds": {
                    "type": "integer",
                    "description": "Minimum number of bedrooms"
                }
            },
            "required": ["location"]
        })
    }

    async fn execute(&self, arguments: Value, ui: &UiStream) -> Result<Value> {
        let location = arguments
            .get("location")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::Other("property_search: missing location argument".into()))?;

        tracing::debug!(location = %location, "property search");

        let mut body = json!({
            "location": location,
            "limit": self.max_results,
        });
        if let Some(max_price) = arguments.get("max_price").and_then(Value::as_f64) {
            body["max_price"] = json!(max_price);
        }
        if let Some(min_beds) = arguments.get("min_beds").and_then(Value::as_u64) {
            body["min_beds"] = json!(min_beds);
        }

        let resp = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(Error::Http(format!(
                "property upstream HTTP {}",
                status.as_u16()
            )));
        }

        let payload: Value = resp.json().await.map_err(|e| Error::Http(e.to_string()))?;
        let listings = payload
            .get("listings")
            .cloned()
            .unwrap_or(Value::Array(vec![]));

        ui.append(UiFragment::PropertyPanel {
            listings: listings.clone(),
        })?;

        Ok(json!({"location": location, "listings": listings}))
    }
}
