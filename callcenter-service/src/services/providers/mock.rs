//! In-process providers for tests and keyless local runs.

use super::{
    AgentSetup, Conversation, ConversationAgent, ProviderError, SpeechSynthesizer,
    SynthesizedSpeech,
};
use crate::models::{SpeechDefaults, VoiceProfile};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

/// Failure a mock provider should produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockFailure {
    RateLimited,
    Unavailable,
}

impl MockFailure {
    fn to_error(self) -> ProviderError {
        match self {
            MockFailure::RateLimited => ProviderError::RateLimited,
            MockFailure::Unavailable => {
                ProviderError::ApiError("Mock provider unavailable".to_string())
            }
        }
    }
}

#[derive(Debug, Default)]
struct MockAgentState {
    failure: Mutex<Option<MockFailure>>,
    delay: Mutex<Option<Duration>>,
    opened: AtomicUsize,
    instructions: Mutex<Vec<String>>,
}

/// Echoing agent. Cloning shares the failure switch, so a test can flip it
/// after handing the agent to a registry.
#[derive(Debug, Clone, Default)]
pub struct MockAgent {
    state: Arc<MockAgentState>,
}

impl MockAgent {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply_for(message: &str) -> String {
        format!("Mock response for: {}", message)
    }

    pub fn fail_with(&self, failure: Option<MockFailure>) {
        *self
            .state
            .failure
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = failure;
    }

    pub fn with_delay(self, delay: Duration) -> Self {
        *self
            .state
            .delay
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(delay);
        self
    }

    /// Number of conversations opened so far.
    pub fn opened(&self) -> usize {
        self.state.opened.load(Ordering::SeqCst)
    }

    /// System instructions the conversations were opened with.
    pub fn instructions(&self) -> Vec<String> {
        self.state
            .instructions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl ConversationAgent for MockAgent {
    fn open(&self, setup: &AgentSetup) -> Box<dyn Conversation> {
        self.state.opened.fetch_add(1, Ordering::SeqCst);
        self.state
            .instructions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(setup.instruction.clone());
        Box::new(MockConversation {
            state: Arc::clone(&self.state),
        })
    }

    fn provider(&self) -> &'static str {
        "mock"
    }
}

struct MockConversation {
    state: Arc<MockAgentState>,
}

#[async_trait]
impl Conversation for MockConversation {
    async fn send(&mut self, message: &str) -> Result<String, ProviderError> {
        let delay = *self
            .state
            .delay
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let failure = *self
            .state
            .failure
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(failure) = failure {
            return Err(failure.to_error());
        }

        Ok(MockAgent::reply_for(message))
    }
}

/// Speech stub returning a fixed payload, or failing on demand.
#[derive(Debug, Clone, Default)]
pub struct MockSpeech {
    failing: bool,
}

impl MockSpeech {
    pub const AUDIO: &'static str = "bW9jay1hdWRpbw==";

    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self { failing: true }
    }
}

#[async_trait]
impl SpeechSynthesizer for MockSpeech {
    async fn synthesize(
        &self,
        _text: &str,
        _voice: &VoiceProfile,
        defaults: &SpeechDefaults,
    ) -> Result<SynthesizedSpeech, ProviderError> {
        if self.failing {
            return Err(ProviderError::NetworkError(
                "Mock speech unavailable".to_string(),
            ));
        }
        Ok(SynthesizedSpeech {
            audio_content: Self::AUDIO.to_string(),
            audio_encoding: defaults.audio_encoding.clone(),
        })
    }
}
