use crate::config::CallcenterConfig;
use crate::handlers;
use crate::services::catalog::AgentCatalog;
use crate::services::clock::{Clock, SystemClock};
use crate::services::providers::gemini::{GeminiAgent, GeminiConfig};
use crate::services::providers::speech::GoogleSpeechSynthesizer;
use crate::services::providers::{ConversationAgent, SpeechSynthesizer};
use crate::services::registry::SessionRegistry;
use crate::services::sweeper::SessionSweeper;
use axum::{
    http::{header, HeaderValue, Method, Request},
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post},
    Router,
};
use service_core::error::AppError;
use service_core::middleware::{
    create_ip_rate_limiter, ip_rate_limit_middleware, metrics::metrics_middleware,
    request_id_middleware, security_headers_middleware, IpRateLimiter, REQUEST_ID_HEADER,
};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct AppState {
    pub config: CallcenterConfig,
    pub registry: Arc<SessionRegistry>,
    pub catalog: Arc<AgentCatalog>,
    /// `None` when speech synthesis is not configured.
    pub speech: Option<Arc<dyn SpeechSynthesizer>>,
    pub clock: Arc<dyn Clock>,
    pub rate_limiter: IpRateLimiter,
}

impl AppState {
    /// Wire the state from its collaborators.
    pub fn new(
        config: CallcenterConfig,
        catalog: Arc<AgentCatalog>,
        agent: Arc<dyn ConversationAgent>,
        speech: Option<Arc<dyn SpeechSynthesizer>>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, AppError> {
        let rate_limiter = create_ip_rate_limiter(
            config.rate_limit.max_requests,
            config.rate_limit.window_seconds,
        )?
        .trusting_forwarded_for(config.rate_limit.trust_forwarded_for);
        if config.rate_limit.trust_forwarded_for {
            tracing::info!("Rate limiting clients by x-forwarded-for");
        }
        let registry = Arc::new(SessionRegistry::new(
            Arc::clone(&catalog),
            agent,
            Arc::clone(&clock),
            config.registry_settings(),
        ));

        Ok(Self {
            config,
            registry,
            catalog,
            speech,
            clock,
            rate_limiter,
        })
    }

    /// Production wiring: catalog from disk or the embedded default, Gemini,
    /// and Cloud TTS when a key is configured.
    pub fn from_config(config: CallcenterConfig) -> Result<Self, AppError> {
        let catalog = match &config.agent_profiles_path {
            Some(path) => {
                tracing::info!(path = %path, "Loading agent catalog from file");
                AgentCatalog::from_path(path)
            }
            None => AgentCatalog::embedded(),
        }
        .map_err(|e| AppError::ConfigError(anyhow::Error::new(e)))?;
        tracing::info!(profiles = catalog.len(), "Agent catalog loaded");

        let agent = GeminiAgent::new(GeminiConfig {
            api_key: config.gemini.api_key.clone(),
            model: config.gemini.model.clone(),
        })
        .map_err(|e| AppError::ConfigError(anyhow::Error::new(e)))?;

        let speech: Option<Arc<dyn SpeechSynthesizer>> = match &config.speech.api_key {
            Some(key) => {
                let synthesizer = GoogleSpeechSynthesizer::new(key.clone())
                    .map_err(|e| AppError::ConfigError(anyhow::Error::new(e)))?;
                Some(Arc::new(synthesizer))
            }
            None => {
                tracing::warn!("GOOGLE_TTS_API_KEY not set, speech synthesis disabled");
                None
            }
        };

        Self::new(
            config,
            Arc::new(catalog),
            Arc::new(agent),
            speech,
            Arc::new(SystemClock),
        )
    }
}

pub fn build_router(state: AppState) -> Router {
    let api = Router::new()
        .route(
            "/sessions",
            post(handlers::create_session).get(handlers::list_sessions),
        )
        .route(
            "/sessions/:session_id",
            get(handlers::get_session).delete(handlers::delete_session),
        )
        .route("/sessions/:session_id/chat", post(handlers::chat))
        .route(
            "/premium/sessions",
            post(handlers::create_premium_session),
        )
        .route(
            "/premium/sessions/:session_id/chat",
            post(handlers::premium_chat),
        )
        .route("/health", get(handlers::health_check))
        .route("/stats", get(handlers::stats))
        // Per-IP rate limiting on the API only
        .layer(from_fn_with_state(
            state.rate_limiter.clone(),
            ip_rate_limit_middleware,
        ));

    let cors = cors_layer(&state.config.allowed_origins);

    Router::new()
        .nest("/api/v1", api)
        .route("/health", get(handlers::health_check))
        .route("/metrics", get(handlers::metrics_endpoint))
        .with_state(state)
        .layer(from_fn(metrics_middleware))
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &Request<_>| {
                let request_id = request
                    .headers()
                    .get(REQUEST_ID_HEADER)
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or("-");

                tracing::info_span!(
                    "http_request",
                    request_id = %request_id,
                    method = %request.method(),
                    uri = %request.uri(),
                    version = ?request.version(),
                )
            }),
        )
        .layer(from_fn(request_id_middleware))
        .layer(from_fn(security_headers_middleware))
        .layer(cors)
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([
            header::CONTENT_TYPE,
            header::HeaderName::from_static(REQUEST_ID_HEADER),
        ]);

    if allowed_origins.is_empty() || allowed_origins.iter().any(|o| o == "*") {
        return layer.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|o| match o.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::error!("Invalid CORS origin '{}': {}. Skipping.", o, e);
                None
            }
        })
        .collect();
    layer.allow_origin(origins)
}

pub struct Application {
    port: u16,
    listener: TcpListener,
    state: AppState,
}

impl Application {
    pub async fn build(config: CallcenterConfig) -> Result<Self, AppError> {
        let state = AppState::from_config(config)?;
        Self::with_state(state).await
    }

    /// Bind the configured port (0 picks a free one) for a prepared state.
    pub async fn with_state(state: AppState) -> Result<Self, AppError> {
        let addr = SocketAddr::from(([0, 0, 0, 0], state.config.common.port));
        let listener = TcpListener::bind(addr).await.map_err(|e| {
            tracing::error!("Failed to bind TCP listener to {}: {}", addr, e);
            AppError::from(e)
        })?;
        let port = listener.local_addr()?.port();

        tracing::info!("Listening on {}", port);

        Ok(Self {
            port,
            listener,
            state,
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Serve until SIGINT/SIGTERM.
    pub async fn run_until_stopped(self) -> std::io::Result<()> {
        self.run_until(shutdown_signal()).await
    }

    /// Serve until `shutdown` resolves. The session sweeper, which also prunes
    /// rate limiter state, runs for exactly as long as the server.
    pub async fn run_until<F>(self, shutdown: F) -> std::io::Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let sweeper = SessionSweeper::start(
            Arc::clone(&self.state.registry),
            Some(self.state.rate_limiter.clone()),
            self.state.config.sweep_interval(),
        );

        let app = build_router(self.state);
        let result = axum::serve(
            self.listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown)
        .await;

        sweeper.shutdown().await;
        result
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received SIGINT, starting graceful shutdown");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        },
    }
}
