//! Gemini conversational agent.
//!
//! Each session keeps its dialogue history locally and sends the full history
//! with the system instruction on every turn (`generateContent`).

use super::{AgentSetup, Conversation, ConversationAgent, ProviderError};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, Secret};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Gemini API base URL.
const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

const API_KEY_HEADER: &str = "x-goog-api-key";

/// Gemini provider configuration.
#[derive(Debug, Clone)]
pub struct GeminiConfig {
    pub api_key: Secret<String>,
    pub model: String,
}

/// Opens Gemini-backed conversations sharing one HTTP client.
pub struct GeminiAgent {
    config: GeminiConfig,
    client: Client,
}

impl GeminiAgent {
    pub fn new(config: GeminiConfig) -> Result<Self, ProviderError> {
        if config.api_key.expose_secret().is_empty() {
            return Err(ProviderError::NotConfigured(
                "Gemini API key not configured".to_string(),
            ));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(|e| ProviderError::NetworkError(e.to_string()))?;

        Ok(Self { config, client })
    }

    fn api_url(&self) -> String {
        format!(
            "{}/models/{}:generateContent",
            GEMINI_API_BASE, self.config.model
        )
    }
}

impl ConversationAgent for GeminiAgent {
    fn open(&self, setup: &AgentSetup) -> Box<dyn Conversation> {
        Box::new(GeminiConversation {
            client: self.client.clone(),
            url: self.api_url(),
            api_key: self.config.api_key.clone(),
            model: self.config.model.clone(),
            system_instruction: Content {
                role: None,
                parts: vec![Part::text(&setup.instruction)],
            },
            generation_config: GenerationConfig {
                temperature: setup.generation.temperature,
                top_k: setup.generation.top_k,
                top_p: setup.generation.top_p,
                max_output_tokens: setup.generation.max_output_tokens,
            },
            history: Vec::new(),
        })
    }

    fn provider(&self) -> &'static str {
        "gemini"
    }
}

/// One Gemini dialogue.
pub struct GeminiConversation {
    client: Client,
    url: String,
    api_key: Secret<String>,
    model: String,
    system_instruction: Content,
    generation_config: GenerationConfig,
    history: Vec<Content>,
}

#[async_trait]
impl Conversation for GeminiConversation {
    async fn send(&mut self, message: &str) -> Result<String, ProviderError> {
        let user_turn = Content {
            role: Some("user".to_string()),
            parts: vec![Part::text(message)],
        };

        let mut contents = self.history.clone();
        contents.push(user_turn.clone());

        let request = GenerateContentRequest {
            system_instruction: &self.system_instruction,
            contents,
            generation_config: &self.generation_config,
        };

        tracing::debug!(
            model = %self.model,
            turns = self.history.len() / 2,
            message_len = message.len(),
            "Sending turn to Gemini API"
        );

        let response = self
            .client
            .post(&self.url)
            .header(API_KEY_HEADER, self.api_key.expose_secret())
            .json(&request)
            .send()
            .await
            .map_err(|e| ProviderError::NetworkError(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_failure(status, &body));
        }

        let api_response: GenerateContentResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::ApiError(format!("Failed to parse response: {}", e)))?;

        let reply = extract_reply(api_response)?;

        self.history.push(user_turn);
        self.history.push(Content {
            role: Some("model".to_string()),
            parts: vec![Part::text(&reply)],
        });

        Ok(reply)
    }
}

/// Map a non-success Gemini response onto the provider error taxonomy.
fn classify_failure(status: StatusCode, body: &str) -> ProviderError {
    let lowered = body.to_ascii_lowercase();

    if status == StatusCode::TOO_MANY_REQUESTS
        || lowered.contains("quota")
        || lowered.contains("resource_exhausted")
    {
        return ProviderError::RateLimited;
    }

    if lowered.contains("api_key_invalid") || lowered.contains("api key not valid") {
        return ProviderError::NotConfigured("Gemini API key rejected".to_string());
    }

    ProviderError::ApiError(format!("Gemini API error {}: {}", status, body))
}

fn extract_reply(response: GenerateContentResponse) -> Result<String, ProviderError> {
    let candidate = response
        .candidates
        .into_iter()
        .next()
        .ok_or_else(|| match response.prompt_feedback {
            Some(PromptFeedback {
                block_reason: Some(_),
            }) => ProviderError::ContentFiltered,
            _ => ProviderError::ApiError("Gemini returned no candidates".to_string()),
        })?;

    if candidate.finish_reason.as_deref() == Some("SAFETY") {
        return Err(ProviderError::ContentFiltered);
    }

    let text: String = candidate
        .content
        .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
        .unwrap_or_default();

    if text.trim().is_empty() {
        return Err(ProviderError::ApiError(
            "Gemini returned an empty reply".to_string(),
        ));
    }

    Ok(text)
}

// ============================================================================
// Gemini API Request/Response Types
// ============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    system_instruction: &'a Content,
    contents: Vec<Content>,
    generation_config: &'a GenerationConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Content {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Part {
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<String>,
}

impl Part {
    fn text(text: &str) -> Self {
        Self {
            text: Some(text.to_string()),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    top_k: u32,
    top_p: f32,
    max_output_tokens: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> GenerateContentResponse {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn quota_errors_are_rate_limits() {
        assert!(matches!(
            classify_failure(StatusCode::TOO_MANY_REQUESTS, ""),
            ProviderError::RateLimited
        ));
        assert!(matches!(
            classify_failure(
                StatusCode::FORBIDDEN,
                r#"{"error":{"message":"Quota exceeded for metric"}}"#
            ),
            ProviderError::RateLimited
        ));
    }

    #[test]
    fn invalid_key_is_not_configured() {
        let err = classify_failure(
            StatusCode::BAD_REQUEST,
            r#"{"error":{"status":"INVALID_ARGUMENT","details":[{"reason":"API_KEY_INVALID"}]}}"#,
        );
        assert!(matches!(err, ProviderError::NotConfigured(_)));
    }

    #[test]
    fn other_failures_are_api_errors() {
        let err = classify_failure(StatusCode::INTERNAL_SERVER_ERROR, "boom");
        assert!(matches!(err, ProviderError::ApiError(_)));
    }

    #[test]
    fn joins_text_parts_of_first_candidate() {
        let response = parse(
            r#"{"candidates":[{"content":{"role":"model","parts":[{"text":"Hallo "},{"text":"zusammen"}]},"finishReason":"STOP"}]}"#,
        );
        assert_eq!(extract_reply(response).unwrap(), "Hallo zusammen");
    }

    #[test]
    fn safety_stop_is_content_filtered() {
        let response = parse(r#"{"candidates":[{"finishReason":"SAFETY"}]}"#);
        assert!(matches!(
            extract_reply(response),
            Err(ProviderError::ContentFiltered)
        ));

        let response = parse(r#"{"promptFeedback":{"blockReason":"SAFETY"}}"#);
        assert!(matches!(
            extract_reply(response),
            Err(ProviderError::ContentFiltered)
        ));
    }

    #[test]
    fn request_uses_gemini_field_names() {
        let instruction = Content {
            role: None,
            parts: vec![Part::text("Du bist Lisa.")],
        };
        let config = GenerationConfig {
            temperature: 0.9,
            top_k: 40,
            top_p: 0.95,
            max_output_tokens: 200,
        };
        let request = GenerateContentRequest {
            system_instruction: &instruction,
            contents: vec![Content {
                role: Some("user".to_string()),
                parts: vec![Part::text("Hallo")],
            }],
            generation_config: &config,
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["systemInstruction"]["parts"][0]["text"], "Du bist Lisa.");
        assert_eq!(value["contents"][0]["role"], "user");
        assert_eq!(value["generationConfig"]["maxOutputTokens"], 200);
        assert_eq!(value["generationConfig"]["topK"], 40);
    }
}
