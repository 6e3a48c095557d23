#![allow(dead_code)]

use axum::{
    body::Body,
    extract::ConnectInfo,
    http::{header, Method, Request, StatusCode},
    response::Response,
    Router,
};
use callcenter_service::config::{
    CallcenterConfig, GeminiSettings, RateLimitSettings, SessionSettings, SpeechSettings,
};
use callcenter_service::services::providers::mock::{MockAgent, MockSpeech};
use callcenter_service::services::providers::SpeechSynthesizer;
use callcenter_service::services::{AgentCatalog, ManualClock};
use callcenter_service::{build_router, AppState, Application};
use chrono::{TimeZone, Utc};
use secrecy::Secret;
use serde_json::Value;
use service_core::config::Config as CoreConfig;
use std::net::SocketAddr;
use std::sync::Arc;
use tower::ServiceExt;

/// Socket peer of every request that does not name its own.
pub fn test_peer() -> SocketAddr {
    SocketAddr::from(([192, 0, 2, 1], 52000))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeechMode {
    Enabled,
    Failing,
    Disabled,
}

#[derive(Debug, Clone)]
pub struct TestOptions {
    pub premium_capacity: usize,
    pub speech: SpeechMode,
    pub rate_limit_max_requests: u32,
    pub trust_forwarded_for: bool,
}

impl Default for TestOptions {
    fn default() -> Self {
        Self {
            premium_capacity: 20,
            speech: SpeechMode::Enabled,
            rate_limit_max_requests: 500,
            trust_forwarded_for: false,
        }
    }
}

pub fn test_config(options: &TestOptions) -> CallcenterConfig {
    CallcenterConfig {
        common: CoreConfig { port: 0 },
        environment: "test".to_string(),
        gemini: GeminiSettings {
            api_key: Secret::new("test-gemini-key".to_string()),
            model: "gemini-2.5-flash".to_string(),
        },
        speech: SpeechSettings {
            api_key: match options.speech {
                SpeechMode::Disabled => None,
                _ => Some(Secret::new("test-tts-key".to_string())),
            },
        },
        rate_limit: RateLimitSettings {
            max_requests: options.rate_limit_max_requests,
            window_seconds: 60,
            trust_forwarded_for: options.trust_forwarded_for,
        },
        sessions: SessionSettings {
            inactivity_timeout_seconds: 3600,
            sweep_interval_seconds: 300,
            premium_max_sessions: options.premium_capacity,
        },
        agent_profiles_path: None,
        allowed_origins: vec!["*".to_string()],
        log_level: "debug".to_string(),
        otlp_endpoint: None,
    }
}

/// Router-level harness backed by mock providers and a manual clock.
pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub agent: MockAgent,
    pub clock: Arc<ManualClock>,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_options(TestOptions::default())
    }

    pub fn with_options(options: TestOptions) -> Self {
        let agent = MockAgent::new();
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2026, 3, 14, 9, 30, 0).unwrap(),
        ));
        let speech: Option<Arc<dyn SpeechSynthesizer>> = match options.speech {
            SpeechMode::Enabled => Some(Arc::new(MockSpeech::new())),
            SpeechMode::Failing => Some(Arc::new(MockSpeech::failing())),
            SpeechMode::Disabled => None,
        };

        let state = AppState::new(
            test_config(&options),
            Arc::new(AgentCatalog::embedded().expect("embedded catalog must load")),
            Arc::new(agent.clone()),
            speech,
            clock.clone(),
        )
        .expect("Failed to build test state");

        Self {
            router: build_router(state.clone()),
            state,
            agent,
            clock,
        }
    }

    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string())),
            None => builder.body(Body::empty()),
        }
        .expect("Failed to build request");

        self.send(request).await
    }

    /// Run a request through the router as if it arrived over a socket.
    pub async fn respond(&self, mut request: Request<Body>) -> Response {
        if request
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .is_none()
        {
            request.extensions_mut().insert(ConnectInfo(test_peer()));
        }

        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to execute request")
    }

    pub async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.respond(request).await;

        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("Failed to read body");
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or_else(|_| {
                Value::String(String::from_utf8_lossy(&bytes).into_owned())
            })
        };
        (status, json)
    }

    pub async fn post(&self, uri: &str, body: Value) -> (StatusCode, Value) {
        self.request(Method::POST, uri, Some(body)).await
    }

    pub async fn get(&self, uri: &str) -> (StatusCode, Value) {
        self.request(Method::GET, uri, None).await
    }

    pub async fn delete(&self, uri: &str) -> (StatusCode, Value) {
        self.request(Method::DELETE, uri, None).await
    }

    /// Create a standard session and return its id.
    pub async fn create_session(&self, language: &str) -> String {
        let (status, body) = self
            .post("/api/v1/sessions", serde_json::json!({ "language": language }))
            .await;
        assert_eq!(status, StatusCode::OK, "{body}");
        body["sessionId"].as_str().expect("sessionId").to_string()
    }

    /// Create a premium session and return its id.
    pub async fn create_premium_session(&self, product: &str) -> String {
        let (status, body) = self
            .post(
                "/api/v1/premium/sessions",
                serde_json::json!({ "productCategory": product }),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "{body}");
        body["sessionId"].as_str().expect("sessionId").to_string()
    }
}

/// A real server on a random port, for probes over the network.
pub struct SpawnedApp {
    pub address: String,
    pub state: AppState,
    shutdown: Option<tokio::sync::oneshot::Sender<()>>,
}

impl SpawnedApp {
    pub async fn spawn() -> Self {
        let harness = TestApp::new();
        let app = Application::with_state(harness.state.clone())
            .await
            .expect("Failed to build test application");
        let address = format!("http://127.0.0.1:{}", app.port());
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();

        tokio::spawn(app.run_until(async move {
            rx.await.ok();
        }));

        // Wait for the server by polling the health endpoint
        let client = reqwest::Client::new();
        for _ in 0..50 {
            if client
                .get(format!("{}/health", address))
                .send()
                .await
                .is_ok()
            {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        }

        Self {
            address,
            state: harness.state,
            shutdown: Some(tx),
        }
    }
}

impl Drop for SpawnedApp {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}
