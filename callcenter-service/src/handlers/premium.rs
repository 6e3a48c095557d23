use super::JsonBody;
use crate::dtos::{
    ChatRequest, CreatePremiumSessionRequest, PremiumChatResponse, PremiumSessionResponse,
};
use crate::models::{Selector, Tier, VoiceProfile};
use crate::services::metrics;
use crate::startup::AppState;
use axum::{
    extract::{Path, State},
    Json,
};
use service_core::error::AppError;
use validator::Validate;

pub async fn create_premium_session(
    State(state): State<AppState>,
    JsonBody(request): JsonBody<CreatePremiumSessionRequest>,
) -> Result<Json<PremiumSessionResponse>, AppError> {
    let selector = Selector::from_request(
        Tier::Premium,
        request.product_category.as_deref(),
        request.language.as_deref(),
    );
    let created = state.registry.create(selector)?;
    Ok(Json(created.into()))
}

pub async fn premium_chat(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    JsonBody(request): JsonBody<ChatRequest>,
) -> Result<Json<PremiumChatResponse>, AppError> {
    request.validate()?;

    let (selector, _) = state.registry.selector(&session_id)?;
    if selector.tier != Tier::Premium {
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "Not a premium agent session"
        )));
    }

    let reply = state.registry.send(&session_id, &request.message).await?;

    let voice = state
        .catalog
        .voice(reply.selector.product, &reply.agent_name)
        .cloned();
    let audio_content = match &voice {
        Some(voice) => synthesize(&state, &session_id, &reply.reply, voice).await,
        None => {
            tracing::debug!(
                agent = %reply.agent_name,
                product = %reply.selector.product,
                "No voice configured for agent"
            );
            None
        }
    };

    Ok(Json(PremiumChatResponse {
        session_id: reply.session_id,
        response: reply.reply,
        agent_name: reply.agent_name,
        product_category: reply.selector.product,
        timestamp: reply.timestamp,
        audio_content,
        voice_config: voice,
    }))
}

/// Speech for a reply, or `None` if synthesis is disabled or fails.
async fn synthesize(
    state: &AppState,
    session_id: &str,
    text: &str,
    voice: &VoiceProfile,
) -> Option<String> {
    let speech = state.speech.as_ref()?;

    match speech
        .synthesize(text, voice, state.catalog.speech_defaults())
        .await
    {
        Ok(audio) => Some(audio.audio_content),
        Err(e) => {
            metrics::record_speech_failure(e.kind());
            tracing::warn!(
                session_id = %session_id,
                voice = %voice.name,
                error = %e,
                "Speech synthesis failed, replying without audio"
            );
            None
        }
    }
}
