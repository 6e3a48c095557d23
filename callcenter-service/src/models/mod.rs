//! Domain models for the call-center service.

pub mod profile;
pub mod selector;
pub mod session;

pub use profile::{AgentProfile, GenerationSettings, PauseSettings, SpeechDefaults, VoiceProfile};
pub use selector::{Language, Product, Selector, Tier};
pub use session::{RegistryStats, Role, SessionSnapshot, SessionSummary, TranscriptEntry};
