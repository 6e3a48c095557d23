//! HTTP handlers for the call-center API.

pub mod health;
pub mod premium;
pub mod sessions;

pub use health::{health_check, metrics_endpoint, stats};
pub use premium::{create_premium_session, premium_chat};
pub use sessions::{chat, create_session, delete_session, get_session, list_sessions};

use crate::services::registry::RegistryError;
use axum::{
    async_trait,
    body::Bytes,
    extract::{FromRequest, Request},
};
use serde::de::DeserializeOwned;
use service_core::error::AppError;

/// Seconds a caller should wait after the agent reports a quota problem.
const AGENT_RETRY_AFTER_SECS: u64 = 60;

/// JSON body where an empty body means `T::default()`. Any body that is not
/// valid JSON for `T` is a 400.
pub struct JsonBody<T>(pub T);

#[async_trait]
impl<T, S> FromRequest<S> for JsonBody<T>
where
    T: DeserializeOwned + Default,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let bytes = Bytes::from_request(req, state).await.map_err(|e| {
            AppError::BadRequest(anyhow::anyhow!("Failed to read request body: {}", e))
        })?;

        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(JsonBody(T::default()));
        }

        serde_json::from_slice(&bytes)
            .map(JsonBody)
            .map_err(|e| AppError::BadRequest(anyhow::anyhow!("Invalid JSON body: {}", e)))
    }
}

impl From<RegistryError> for AppError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::NotFound => AppError::NotFound(anyhow::anyhow!("Session not found")),
            RegistryError::InvalidInput(msg) => AppError::BadRequest(anyhow::anyhow!(msg)),
            RegistryError::ExternalUnavailable(_) => AppError::ServiceUnavailable(
                "Sorry, something went wrong on our side. Could you please repeat that?"
                    .to_string(),
            ),
            RegistryError::RateLimited => AppError::TooManyRequests(
                "Sorry, there are too many requests right now. Please try again in a few minutes."
                    .to_string(),
                Some(AGENT_RETRY_AFTER_SECS),
            ),
            RegistryError::CapacityExceeded { max, .. } => AppError::TooManyRequests(
                format!("Maximum of {} concurrent sessions reached", max),
                None,
            ),
        }
    }
}
