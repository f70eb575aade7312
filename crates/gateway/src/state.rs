use std::sync::Arc;

use acre_conversations::{ConversationSink, FileArchive, PreferenceStore};
use acre_domain::config::Config;
use acre_domain::error::Result;
use acre_domain::step::DataAgent;
use acre_providers::LazyProvider;
use acre_tools::{HttpDataAgent, PropertySearchTool, RetrieveTool, SearchTool, ToolRegistry};

use crate::runtime::choice::ChoiceGate;

/// Shared application state passed to all API handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub provider: Arc<LazyProvider>,
    pub archive: Arc<dyn ConversationSink>,
    pub preferences: Arc<PreferenceStore>,
    pub tools: Arc<ToolRegistry>,
    /// `None` when the external data route is disabled in config.
    pub data_agent: Option<Arc<dyn DataAgent>>,
    pub choice_gate: Arc<ChoiceGate>,
}

impl AppState {
    pub fn build(config: Arc<Config>) -> Result<Self> {
        let archive = Arc::new(FileArchive::new(&config.storage.state_path)?);
        let preferences = Arc::new(PreferenceStore::new(&config.storage.state_path)?);
        let provider = Arc::new(LazyProvider::new(config.model.clone()));

        let mut tools = ToolRegistry::new();
        match SearchTool::new(&config.tools) {
            Ok(tool) => tools.register(Arc::new(tool)),
            Err(e) => tracing::warn!(error = %e, "search tool unavailable"),
        }
        tools.register(Arc::new(RetrieveTool::new()));
        tools.register(Arc::new(PropertySearchTool::new(&config.tools)));

        let data_agent: Option<Arc<dyn DataAgent>> = if config.data_agent.enabled {
            Some(Arc::new(HttpDataAgent::new(&config.data_agent)))
        } else {
            tracing::info!("external data agent disabled");
            None
        };

        let choice_gate = Arc::new(ChoiceGate::new(std::time::Duration::from_secs(
            config.choice.timeout_secs,
        )));

        Ok(Self {
            config,
            provider,
            archive,
            preferences,
            tools: Arc::new(tools),
            data_agent,
            choice_gate,
        })
    }
}
