//! Configuration for the classification engine.
//!
//! Two values cover every knob: [`AgentConfig`] describes how to reach the
//! vision model, [`ClassifierConfig`] describes how pages are rendered and
//! carries the agent config into the workflow. Both are plain cloneable
//! values — a classifier shares its config with every worker by value, never
//! through shared mutable state.
//!
//! Provider credentials never live here. The provider layer reads its token
//! (and Azure-style options such as deployment and API version) from
//! environment variables, so configs can be logged and diffed safely.

use std::fmt;
use std::sync::Arc;

use edgequake_llm::LLMProvider;

use crate::error::HeraldError;

/// How to construct an LLM agent: provider, model, sampling options.
///
/// Construction from this config is cheap, so every worker task builds its
/// own agent rather than sharing one across tasks.
#[derive(Clone)]
pub struct AgentConfig {
    /// Provider name, e.g. "openai", "azure", "anthropic", "ollama".
    pub provider_name: String,

    /// Model identifier, e.g. "gpt-4.1-nano". Must be vision-capable for
    /// the classify and enhance stages.
    pub model_name: String,

    /// Sampling temperature. Default: 0.1 — marking transcription wants a
    /// model that reports what it sees, not what it imagines.
    pub temperature: f32,

    /// Maximum tokens per completion. Default: 2048. Findings for a single
    /// page are short; this bound keeps runaway rationales in check.
    pub max_tokens: usize,

    /// Pre-constructed provider. Takes precedence over `provider_name`;
    /// used by tests and callers that need custom middleware.
    pub provider: Option<Arc<dyn LLMProvider>>,
}

impl AgentConfig {
    pub fn new(provider_name: impl Into<String>, model_name: impl Into<String>) -> Self {
        Self {
            provider_name: provider_name.into(),
            model_name: model_name.into(),
            temperature: 0.1,
            max_tokens: 2048,
            provider: None,
        }
    }
}

impl fmt::Debug for AgentConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgentConfig")
            .field("provider_name", &self.provider_name)
            .field("model_name", &self.model_name)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .finish()
    }
}

/// Configuration for one classifier instance.
///
/// Built via [`ClassifierConfig::builder()`].
#[derive(Debug, Clone)]
pub struct ClassifierConfig {
    /// Rendering DPI for page rasterisation. Range 72–600. Default: 300.
    ///
    /// Markings are often small stamps or footer text; 300 DPI keeps them
    /// legible to the vision model at the cost of larger images.
    pub dpi: u32,

    /// Cap on the longest rendered edge in pixels. Default: 4000.
    ///
    /// Guards against oversized pages (posters, engineering drawings)
    /// exhausting memory regardless of DPI.
    pub max_rendered_pixels: u32,

    /// The agent the workflow nodes talk to.
    pub agent: AgentConfig,
}

impl ClassifierConfig {
    pub fn builder(agent: AgentConfig) -> ClassifierConfigBuilder {
        ClassifierConfigBuilder {
            config: ClassifierConfig {
                dpi: 300,
                max_rendered_pixels: 4000,
                agent,
            },
        }
    }
}

/// Builder for [`ClassifierConfig`].
#[derive(Debug)]
pub struct ClassifierConfigBuilder {
    config: ClassifierConfig,
}

impl ClassifierConfigBuilder {
    pub fn dpi(mut self, dpi: u32) -> Self {
        self.config.dpi = dpi.clamp(72, 600);
        self
    }

    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.max_rendered_pixels = px.max(100);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.agent.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.agent.max_tokens = n;
        self
    }

    pub fn build(self) -> Result<ClassifierConfig, HeraldError> {
        let c = &self.config;
        if c.agent.provider.is_none() && c.agent.provider_name.is_empty() {
            return Err(HeraldError::Internal(
                "agent config needs a provider name or a pre-built provider".into(),
            ));
        }
        if c.agent.model_name.is_empty() && c.agent.provider.is_none() {
            return Err(HeraldError::Internal("agent config needs a model name".into()));
        }
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_clamps_dpi() {
        let config = ClassifierConfig::builder(AgentConfig::new("openai", "gpt-4.1-nano"))
            .dpi(1200)
            .build()
            .unwrap();
        assert_eq!(config.dpi, 600);
    }

    #[test]
    fn defaults_favor_faithful_transcription() {
        let config = ClassifierConfig::builder(AgentConfig::new("openai", "gpt-4.1-nano"))
            .build()
            .unwrap();
        assert_eq!(config.dpi, 300);
        assert_eq!(config.agent.temperature, 0.1);
    }

    #[test]
    fn empty_provider_name_is_rejected() {
        let result = ClassifierConfig::builder(AgentConfig::new("", "gpt-4.1-nano")).build();
        assert!(result.is_err());
    }
}
