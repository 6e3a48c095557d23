//! Static agent configuration: scripts, generation and voice parameters.

use super::selector::{Language, Product, Tier};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Placeholder replaced by the persona name in greetings and instructions.
pub const AGENT_PLACEHOLDER: &str = "{agent}";

/// One scripted agent, keyed by tier, product and language.
#[derive(Debug, Clone, Deserialize)]
pub struct AgentProfile {
    pub tier: Tier,
    pub product: Product,
    pub language: Language,
    /// System instruction sent with every conversation turn.
    pub instruction: String,
    /// Opening lines; one is chosen per session.
    pub greetings: Vec<String>,
    /// Persona names; one is chosen per session.
    pub agent_names: Vec<String>,
}

impl AgentProfile {
    pub fn pick_agent_name<R: Rng + ?Sized>(&self, rng: &mut R) -> &str {
        self.agent_names
            .choose(rng)
            .map(String::as_str)
            .unwrap_or_default()
    }

    pub fn pick_greeting<R: Rng + ?Sized>(&self, agent_name: &str, rng: &mut R) -> String {
        self.greetings
            .choose(rng)
            .map(|g| g.replace(AGENT_PLACEHOLDER, agent_name))
            .unwrap_or_default()
    }

    pub fn instruction_for(&self, agent_name: &str) -> String {
        self.instruction.replace(AGENT_PLACEHOLDER, agent_name)
    }
}

/// Sampling parameters for the conversational agent.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct GenerationSettings {
    pub temperature: f32,
    pub top_k: u32,
    pub top_p: f32,
    pub max_output_tokens: u32,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            temperature: 0.8,
            top_k: 40,
            top_p: 0.95,
            max_output_tokens: 512,
        }
    }
}

/// Catalog row carrying the generation parameters of one tier.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct TierGeneration {
    pub tier: Tier,
    pub temperature: f32,
    pub top_k: u32,
    pub top_p: f32,
    pub max_output_tokens: u32,
}

impl TierGeneration {
    pub fn settings(&self) -> GenerationSettings {
        GenerationSettings {
            temperature: self.temperature,
            top_k: self.top_k,
            top_p: self.top_p,
            max_output_tokens: self.max_output_tokens,
        }
    }
}

/// SSML break lengths in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct PauseSettings {
    pub short: f32,
    pub medium: f32,
    pub long: f32,
}

impl Default for PauseSettings {
    fn default() -> Self {
        Self {
            short: 0.2,
            medium: 0.4,
            long: 0.6,
        }
    }
}

/// Voice of one persona.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all(serialize = "camelCase"))]
pub struct VoiceProfile {
    #[serde(skip_serializing)]
    pub product: Product,
    #[serde(skip_serializing)]
    pub agent: String,
    pub name: String,
    pub gender: String,
    pub speaking_rate: f32,
    pub pitch: f32,
    pub volume_gain_db: f32,
    #[serde(default)]
    pub pauses: PauseSettings,
}

/// Settings shared by every synthesized voice.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SpeechDefaults {
    pub language_code: String,
    pub audio_encoding: String,
    pub sample_rate_hertz: u32,
}

impl Default for SpeechDefaults {
    fn default() -> Self {
        Self {
            language_code: "de-DE".to_string(),
            audio_encoding: "MP3".to_string(),
            sample_rate_hertz: 24_000,
        }
    }
}
