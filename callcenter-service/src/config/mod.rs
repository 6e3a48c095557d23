use crate::services::registry::RegistrySettings;
use secrecy::Secret;
use service_core::config as core_config;
use service_core::error::AppError;
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Upper bound for the inactivity timeout (100 years).
const MAX_INACTIVITY_TIMEOUT_SECS: i64 = 100 * 365 * 24 * 3600;

#[derive(Debug, Clone)]
pub struct CallcenterConfig {
    pub common: core_config::Config,
    pub environment: String,
    pub gemini: GeminiSettings,
    pub speech: SpeechSettings,
    pub rate_limit: RateLimitSettings,
    pub sessions: SessionSettings,
    /// Catalog file replacing the embedded agent profiles.
    pub agent_profiles_path: Option<String>,
    pub allowed_origins: Vec<String>,
    pub log_level: String,
    pub otlp_endpoint: Option<String>,
}

#[derive(Debug, Clone)]
pub struct GeminiSettings {
    pub api_key: Secret<String>,
    pub model: String,
}

#[derive(Debug, Clone)]
pub struct SpeechSettings {
    /// Speech synthesis is disabled without a key.
    pub api_key: Option<Secret<String>>,
}

#[derive(Debug, Clone)]
pub struct RateLimitSettings {
    pub max_requests: u32,
    pub window_seconds: u64,
    /// Key clients by `x-forwarded-for` instead of the socket peer. Only for
    /// deployments behind a proxy that overwrites the header.
    pub trust_forwarded_for: bool,
}

#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub inactivity_timeout_seconds: u64,
    pub sweep_interval_seconds: u64,
    pub premium_max_sessions: usize,
}

impl CallcenterConfig {
    pub fn load() -> Result<Self, AppError> {
        let common_config = core_config::Config::load()?;
        let environment = env::var("ENVIRONMENT").unwrap_or_else(|_| "dev".to_string());
        let is_prod = environment == "prod";

        let api_key = get_env("GEMINI_API_KEY", None, is_prod)?;
        if api_key.trim().is_empty() {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "GEMINI_API_KEY is required but empty"
            )));
        }

        let allowed_origins = get_env("ALLOWED_ORIGINS", Some("*"), is_prod)?
            .split(',')
            .map(|o| o.trim().to_string())
            .filter(|o| !o.is_empty())
            .collect();

        Ok(CallcenterConfig {
            common: common_config,
            environment,
            gemini: GeminiSettings {
                api_key: Secret::new(api_key),
                model: get_env("GEMINI_MODEL", Some("gemini-2.5-flash"), false)?,
            },
            speech: SpeechSettings {
                api_key: get_optional("GOOGLE_TTS_API_KEY").map(Secret::new),
            },
            rate_limit: RateLimitSettings {
                max_requests: get_parsed("RATE_LIMIT_MAX_REQUESTS", 500)?,
                window_seconds: get_parsed("RATE_LIMIT_WINDOW_SECONDS", 60)?,
                trust_forwarded_for: get_parsed("TRUST_FORWARDED_FOR", false)?,
            },
            sessions: SessionSettings {
                inactivity_timeout_seconds: get_parsed("SESSION_INACTIVITY_TIMEOUT_SECONDS", 3600)?,
                sweep_interval_seconds: get_parsed("SESSION_SWEEP_INTERVAL_SECONDS", 300)?,
                premium_max_sessions: get_parsed("PREMIUM_MAX_SESSIONS", 20)?,
            },
            agent_profiles_path: get_optional("AGENT_PROFILES_PATH"),
            allowed_origins,
            log_level: get_env("LOG_LEVEL", Some("info"), false)?,
            otlp_endpoint: get_optional("OTLP_ENDPOINT"),
        })
    }

    pub fn registry_settings(&self) -> RegistrySettings {
        RegistrySettings {
            inactivity_timeout: chrono::Duration::seconds(
                i64::try_from(self.sessions.inactivity_timeout_seconds)
                    .unwrap_or(i64::MAX)
                    .min(MAX_INACTIVITY_TIMEOUT_SECS),
            ),
            premium_capacity: self.sessions.premium_max_sessions,
        }
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sessions.sweep_interval_seconds.max(1))
    }
}

/// Read a variable; in production it must be set even if a default exists.
fn get_env(key: &str, default: Option<&str>, is_prod: bool) -> Result<String, AppError> {
    match env::var(key) {
        Ok(val) => Ok(val),
        Err(_) => {
            if is_prod {
                Err(AppError::ConfigError(anyhow::anyhow!(
                    "{} is required in production but not set",
                    key
                )))
            } else if let Some(def) = default {
                Ok(def.to_string())
            } else {
                Err(AppError::ConfigError(anyhow::anyhow!(
                    "{} is required but not set",
                    key
                )))
            }
        }
    }
}

fn get_optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn get_parsed<T>(key: &str, default: T) -> Result<T, AppError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw.trim().parse().map_err(|e| {
            AppError::ConfigError(anyhow::anyhow!("{} has an invalid value {:?}: {}", key, raw, e))
        }),
        Err(_) => Ok(default),
    }
}
