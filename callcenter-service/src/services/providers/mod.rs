//! External collaborator abstractions and implementations.
//!
//! The conversational agent and the speech synthesizer sit behind traits so
//! the registry and handlers can run against Gemini / Cloud TTS in production
//! and against mocks in tests.

pub mod gemini;
pub mod mock;
pub mod speech;

use crate::models::{GenerationSettings, SpeechDefaults, VoiceProfile};
use async_trait::async_trait;
use thiserror::Error;

/// Error type for provider operations.
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("API error: {0}")]
    ApiError(String),

    #[error("Rate limited")]
    RateLimited,

    #[error("Content filtered")]
    ContentFiltered,

    #[error("Network error: {0}")]
    NetworkError(String),
}

impl ProviderError {
    /// Short label for metrics and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            ProviderError::NotConfigured(_) => "not_configured",
            ProviderError::ApiError(_) => "api_error",
            ProviderError::RateLimited => "rate_limited",
            ProviderError::ContentFiltered => "content_filtered",
            ProviderError::NetworkError(_) => "network_error",
        }
    }
}

/// Everything needed to open a conversation with the agent.
#[derive(Debug, Clone)]
pub struct AgentSetup {
    pub instruction: String,
    pub generation: GenerationSettings,
}

/// Opens per-session dialogue contexts.
pub trait ConversationAgent: Send + Sync {
    fn open(&self, setup: &AgentSetup) -> Box<dyn Conversation>;

    /// Provider name for metrics.
    fn provider(&self) -> &'static str;
}

/// A multi-turn dialogue context.
#[async_trait]
pub trait Conversation: Send {
    /// Send one user turn and wait for the agent's reply. A failed turn leaves
    /// the context unchanged.
    async fn send(&mut self, message: &str) -> Result<String, ProviderError>;
}

/// Synthesized audio, base64 encoded as returned by the provider.
#[derive(Debug, Clone)]
pub struct SynthesizedSpeech {
    pub audio_content: String,
    pub audio_encoding: String,
}

#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    async fn synthesize(
        &self,
        text: &str,
        voice: &VoiceProfile,
        defaults: &SpeechDefaults,
    ) -> Result<SynthesizedSpeech, ProviderError>;
}
