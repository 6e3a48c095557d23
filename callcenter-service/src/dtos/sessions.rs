use crate::models::{
    Language, Product, SessionSnapshot, SessionSummary, Tier, TranscriptEntry, VoiceProfile,
};
use crate::services::registry::{ChatReply, CreatedSession};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

#[derive(Debug, Default, Deserialize)]
pub struct CreateSessionRequest {
    #[serde(default)]
    pub language: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePremiumSessionRequest {
    #[serde(default)]
    pub product_category: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct ChatRequest {
    #[serde(default)]
    #[validate(length(min = 1, message = "Message is required"))]
    pub message: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionResponse {
    pub session_id: String,
    pub greeting: String,
    pub language: Language,
    pub agent_name: String,
    pub created_at: DateTime<Utc>,
}

impl From<CreatedSession> for CreateSessionResponse {
    fn from(created: CreatedSession) -> Self {
        Self {
            session_id: created.session_id,
            greeting: created.greeting,
            language: created.selector.language,
            agent_name: created.agent_name,
            created_at: created.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PremiumSessionResponse {
    pub session_id: String,
    pub greeting: String,
    pub product_category: Product,
    pub language: Language,
    pub agent_name: String,
    pub created_at: DateTime<Utc>,
    pub active_sessions: usize,
}

impl From<CreatedSession> for PremiumSessionResponse {
    fn from(created: CreatedSession) -> Self {
        Self {
            session_id: created.session_id,
            greeting: created.greeting,
            product_category: created.selector.product,
            language: created.selector.language,
            agent_name: created.agent_name,
            created_at: created.created_at,
            active_sessions: created.active_sessions,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatResponse {
    pub session_id: String,
    pub response: String,
    pub timestamp: DateTime<Utc>,
}

impl From<ChatReply> for ChatResponse {
    fn from(reply: ChatReply) -> Self {
        Self {
            session_id: reply.session_id,
            response: reply.reply,
            timestamp: reply.timestamp,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PremiumChatResponse {
    pub session_id: String,
    pub response: String,
    pub agent_name: String,
    pub product_category: Product,
    pub timestamp: DateTime<Utc>,
    /// Base64 audio of the reply.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voice_config: Option<VoiceProfile>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionDetailResponse {
    pub session_id: String,
    pub tier: Tier,
    pub language: Language,
    pub product_category: Product,
    pub agent_name: String,
    pub message_count: usize,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub messages: Vec<TranscriptEntry>,
}

impl From<SessionSnapshot> for SessionDetailResponse {
    fn from(snapshot: SessionSnapshot) -> Self {
        Self {
            session_id: snapshot.session_id,
            tier: snapshot.selector.tier,
            language: snapshot.selector.language,
            product_category: snapshot.selector.product,
            agent_name: snapshot.agent_name,
            message_count: snapshot.transcript.len(),
            created_at: snapshot.created_at,
            last_activity: snapshot.last_activity_at,
            messages: snapshot.transcript,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct DeleteSessionResponse {
    pub success: bool,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct SessionListResponse {
    pub total: usize,
    pub sessions: Vec<SessionSummary>,
}
