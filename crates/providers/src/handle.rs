//! Lazily-built provider handle.
//!
//! The gateway constructs one [`LazyProvider`] at startup; the real
//! adapter (and its API-key env lookup) is only built on first use, so the
//! process can boot and serve health checks without credentials. Tests
//! inject scripted providers with [`LazyProvider::preset`].

use std::sync::{Arc, OnceLock};

use acre_domain::config::ModelConfig;
use acre_domain::error::{Error, Result};

use crate::openai_compat::OpenAiCompatProvider;
use crate::traits::ModelProvider;

pub struct LazyProvider {
    config: ModelConfig,
    inner: OnceLock<Arc<dyn ModelProvider>>,
}

impl LazyProvider {
    pub fn new(config: ModelConfig) -> Self {
        Self {
            config,
            inner: OnceLock::new(),
        }
    }

    /// A handle whose provider is already decided. For tests.
    pub fn preset(config: ModelConfig, provider: Arc<dyn ModelProvider>) -> Self {
        let inner = OnceLock::new();
        let _ = inner.set(provider);
        Self { config, inner }
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    /// Get the provider, building it on first call.
    ///
    /// Two concurrent first calls may both build an adapter; `set` keeps
    /// whichever lands first and the loser's instance is dropped.
    pub fn get(&self) -> Result<Arc<dyn ModelProvider>> {
        if let Some(p) = self.inner.get() {
            return Ok(p.clone());
        }

        let api_key = std::env::var(&self.config.api_key_env).map_err(|_| {
            Error::Config(format!(
                "missing API key: set {} in the environment",
                self.config.api_key_env
            ))
        })?;

        let provider: Arc<dyn ModelProvider> = Arc::new(OpenAiCompatProvider::new(
            &self.config.base_url,
            api_key,
            &self.config.model,
        )?);

        tracing::info!(
            base_url = %self.config.base_url,
            model = %self.config.model,
            "model provider initialized"
        );

        let _ = self.inner.set(provider.clone());
        Ok(self.inner.get().cloned().unwrap_or(provider))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::{ChatRequest, ChatResponse};
    use acre_domain::stream::{BoxStream, FinishReason, StreamEvent};

    struct Scripted;

    #[async_trait::async_trait]
    impl ModelProvider for Scripted {
        async fn chat(&self, _req: &ChatRequest) -> Result<ChatResponse> {
            Ok(ChatResponse {
                content: "ok".into(),
                tool_calls: vec![],
                usage: None,
                finish_reason: FinishReason::Stop,
            })
        }

        async fn chat_stream(
            &self,
            _req: &ChatRequest,
        ) -> Result<BoxStream<'static, Result<StreamEvent>>> {
            Ok(Box::pin(futures_util::stream::empty()))
        }

        fn provider_id(&self) -> &str {
            "scripted"
        }
    }

    #[tokio::test]
    async fn preset_skips_env_lookup() {
        let handle = LazyProvider::preset(ModelConfig::default(), Arc::new(Scripted));
        let provider = handle.get().unwrap();
        assert_eq!(provider.provider_id(), "scripted");
        let resp = provider.chat(&ChatRequest::default()).await.unwrap();
        assert_eq!(resp.content, "ok");
    }
}
