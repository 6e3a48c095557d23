//! Agent catalog: one flattened table of scripted agents keyed by
//! `(tier, product, language)`, plus per-tier generation parameters and
//! per-persona voices.

use crate::models::profile::TierGeneration;
use crate::models::{
    AgentProfile, GenerationSettings, Language, Product, Selector, SpeechDefaults, Tier,
    VoiceProfile,
};
use crate::services::providers::AgentSetup;
use config::{Config, File, FileFormat};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;

/// Catalog shipped with the binary.
const EMBEDDED_PROFILES: &str = include_str!("../../profiles.toml");

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("Failed to load agent catalog: {0}")]
    Load(#[from] config::ConfigError),

    #[error("Duplicate agent profile {0}")]
    Duplicate(Selector),

    #[error("No fallback profile {0}")]
    MissingFallback(Selector),

    #[error("Agent profile {0} has no {1}")]
    Incomplete(Selector, &'static str),
}

#[derive(Debug, Clone, Copy, Deserialize)]
struct CatalogDefaults {
    product: Product,
    language: Language,
}

#[derive(Debug, Deserialize)]
struct CatalogFile {
    defaults: CatalogDefaults,
    #[serde(default)]
    speech: SpeechDefaults,
    #[serde(default)]
    generation: Vec<TierGeneration>,
    profiles: Vec<AgentProfile>,
    #[serde(default)]
    voices: Vec<VoiceProfile>,
}

#[derive(Debug)]
pub struct AgentCatalog {
    profiles: HashMap<Selector, AgentProfile>,
    generation: HashMap<Tier, GenerationSettings>,
    voices: HashMap<(Product, String), VoiceProfile>,
    speech: SpeechDefaults,
    default_product: Product,
    default_language: Language,
}

impl AgentCatalog {
    /// The catalog compiled into the binary.
    pub fn embedded() -> Result<Self, CatalogError> {
        Self::from_toml(EMBEDDED_PROFILES)
    }

    /// Load a catalog file; the format follows the file extension.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, CatalogError> {
        let raw = Config::builder()
            .add_source(File::from(path.as_ref()))
            .build()?;
        Self::from_file(raw.try_deserialize()?)
    }

    pub fn from_toml(source: &str) -> Result<Self, CatalogError> {
        let raw = Config::builder()
            .add_source(File::from_str(source, FileFormat::Toml))
            .build()?;
        Self::from_file(raw.try_deserialize()?)
    }

    fn from_file(file: CatalogFile) -> Result<Self, CatalogError> {
        let mut profiles = HashMap::with_capacity(file.profiles.len());
        for profile in file.profiles {
            let key = Selector::new(profile.tier, profile.product, profile.language);
            if profile.greetings.is_empty() {
                return Err(CatalogError::Incomplete(key, "greetings"));
            }
            if profile.agent_names.is_empty() {
                return Err(CatalogError::Incomplete(key, "agent names"));
            }
            if profiles.insert(key, profile).is_some() {
                return Err(CatalogError::Duplicate(key));
            }
        }

        let tiers: Vec<Tier> = profiles.keys().map(|k| k.tier).collect();
        for tier in tiers {
            let fallback = Selector::new(tier, file.defaults.product, file.defaults.language);
            if !profiles.contains_key(&fallback) {
                return Err(CatalogError::MissingFallback(fallback));
            }
        }

        let generation = file
            .generation
            .iter()
            .map(|g| (g.tier, g.settings()))
            .collect();

        let voices = file
            .voices
            .into_iter()
            .map(|v| ((v.product, v.agent.clone()), v))
            .collect();

        Ok(Self {
            profiles,
            generation,
            voices,
            speech: file.speech,
            default_product: file.defaults.product,
            default_language: file.defaults.language,
        })
    }

    /// Look up the profile for `selector`, falling back as a whole to the
    /// tier's default entry. Returns the key actually used.
    ///
    /// Returns `None` only for a tier the catalog has no profiles for.
    pub fn resolve(&self, selector: Selector) -> Option<(Selector, &AgentProfile)> {
        if let Some(profile) = self.profiles.get(&selector) {
            return Some((selector, profile));
        }

        let fallback = self.fallback_for(selector.tier);
        tracing::debug!(
            requested = %selector,
            resolved = %fallback,
            "No agent profile for selector, using fallback"
        );
        self.profiles.get(&fallback).map(|p| (fallback, p))
    }

    pub fn fallback_for(&self, tier: Tier) -> Selector {
        Selector::new(tier, self.default_product, self.default_language)
    }

    /// Generation parameters for a tier; library defaults if unconfigured.
    pub fn generation(&self, tier: Tier) -> GenerationSettings {
        self.generation.get(&tier).copied().unwrap_or_default()
    }

    /// Instruction and generation parameters for one persona of a profile.
    pub fn setup_for(&self, profile: &AgentProfile, agent_name: &str) -> AgentSetup {
        AgentSetup {
            instruction: profile.instruction_for(agent_name),
            generation: self.generation(profile.tier),
        }
    }

    pub fn voice(&self, product: Product, agent_name: &str) -> Option<&VoiceProfile> {
        self.voices.get(&(product, agent_name.to_string()))
    }

    pub fn speech_defaults(&self) -> &SpeechDefaults {
        &self.speech
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }
}
