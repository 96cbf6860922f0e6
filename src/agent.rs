//! LLM agent construction and the two inference capabilities the workflow
//! uses: vision (page image → findings) and chat (state → document verdict).
//!
//! Agents are built per worker task from [`AgentConfig`] rather than shared.
//! Provider construction is a cheap wrapper around an HTTP client, and
//! per-task construction sidesteps any assumption about transport thread
//! safety — each task owns its connection state outright.

use std::sync::Arc;

use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, ImageData, LLMProvider, ProviderFactory};
use tracing::debug;

use crate::config::AgentConfig;
use crate::error::HeraldError;

/// An inference agent: one vision capability, one chat capability.
///
/// Failures are propagated verbatim; the workflow never retries.
#[async_trait]
pub trait Agent: Send + Sync {
    /// Run a vision call: system prompt plus one or more page images.
    async fn vision(
        &self,
        system_prompt: &str,
        images: Vec<ImageData>,
    ) -> Result<String, HeraldError>;

    /// Run a plain chat call with no images.
    async fn chat(&self, prompt: &str) -> Result<String, HeraldError>;
}

/// Constructs a fresh [`Agent`] for the calling task.
pub trait AgentFactory: Send + Sync {
    fn agent(&self) -> Result<Box<dyn Agent>, HeraldError>;
}

impl AgentFactory for AgentConfig {
    fn agent(&self) -> Result<Box<dyn Agent>, HeraldError> {
        let provider = match &self.provider {
            Some(provider) => Arc::clone(provider),
            None => ProviderFactory::create_llm_provider(&self.provider_name, &self.model_name)
                .map_err(|e| HeraldError::ProviderNotConfigured {
                    provider: self.provider_name.clone(),
                    hint: format!("{e}"),
                })?,
        };
        Ok(Box::new(LlmAgent {
            provider,
            options: CompletionOptions {
                temperature: Some(self.temperature),
                max_tokens: Some(self.max_tokens),
                ..Default::default()
            },
        }))
    }
}

/// Agent backed by an edgequake-llm provider.
struct LlmAgent {
    provider: Arc<dyn LLMProvider>,
    options: CompletionOptions,
}

impl LlmAgent {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, HeraldError> {
        let response = self
            .provider
            .chat(messages, Some(&self.options))
            .await
            .map_err(|e| HeraldError::LlmApiError {
                message: format!("{e}"),
            })?;
        debug!(
            input_tokens = response.prompt_tokens,
            output_tokens = response.completion_tokens,
            "inference call complete"
        );
        Ok(response.content)
    }
}

#[async_trait]
impl Agent for LlmAgent {
    async fn vision(
        &self,
        system_prompt: &str,
        images: Vec<ImageData>,
    ) -> Result<String, HeraldError> {
        // The empty user text is intentional: providers require at least one
        // user turn, but the image carries all the content.
        let messages = vec![
            ChatMessage::system(system_prompt),
            ChatMessage::user_with_images("", images),
        ];
        self.complete(&messages).await
    }

    async fn chat(&self, prompt: &str) -> Result<String, HeraldError> {
        let messages = vec![ChatMessage::user(prompt)];
        self.complete(&messages).await
    }
}
