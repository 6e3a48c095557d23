use callcenter_service::config::CallcenterConfig;
use callcenter_service::services::init_metrics;
use callcenter_service::Application;
use service_core::error::AppError;
use service_core::observability::init_tracing;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    // Load configuration - fail fast if invalid
    let config = CallcenterConfig::load()?;

    init_tracing(
        "callcenter-service",
        &config.log_level,
        config.otlp_endpoint.as_deref(),
    )?;

    // Initialize metrics recorder (must be before any metrics are recorded)
    init_metrics();

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        environment = %config.environment,
        model = %config.gemini.model,
        speech_enabled = config.speech.api_key.is_some(),
        "Starting call-center service"
    );

    let app = Application::build(config).await?;
    app.run_until_stopped().await?;

    tracing::info!("Service shutdown complete");
    Ok(())
}
