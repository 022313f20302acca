use field_auth::{
    build_router,
    config::{AuthConfig, Environment},
    services::{
        metrics, AuthError, AuthService, Clock, CodeSweeper, InMemoryUserDirectory, JwtService,
        LoggingNotifier, MemoryCodeStorage, Notifier, SmsGatewayNotifier, SystemClock,
        VerificationCodeStore,
    },
    AppState,
};
use service_core::error::AppError;
use service_core::middleware::rate_limit::create_ip_rate_limiter;
use service_core::observability::logging::init_tracing;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    // Load configuration - fail fast if invalid
    let config = Arc::new(AuthConfig::from_env()?);

    init_tracing(
        &config.service_name,
        &config.log_level,
        config.otlp_endpoint.as_deref(),
    )?;

    metrics::init_metrics()
        .map_err(|e| AppError::InternalError(anyhow::anyhow!("Failed to initialize metrics: {}", e)))?;

    tracing::info!(
        service = %config.service_name,
        version = %config.service_version,
        environment = ?config.environment,
        "Starting field authentication service"
    );

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let codes = VerificationCodeStore::new(
        Arc::new(MemoryCodeStorage::new()),
        clock.clone(),
        &config.verification,
    );

    let jwt = JwtService::new(&config.session, clock.clone())?;

    let notifier: Arc<dyn Notifier> = match (&config.sms, &config.environment) {
        (Some(sms), _) => {
            let gateway = SmsGatewayNotifier::new(sms).map_err(AuthError::from)?;
            tracing::info!(url = %sms.url, sender = %sms.sender_id, "SMS gateway notifier initialized");
            Arc::new(gateway)
        }
        (None, Environment::Dev) => {
            tracing::warn!("No SMS gateway configured, verification codes will only be logged");
            Arc::new(LoggingNotifier)
        }
        (None, Environment::Prod) => {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "SMS gateway is required in production"
            )));
        }
    };

    let auth_service = AuthService::new(
        codes.clone(),
        jwt,
        Arc::new(InMemoryUserDirectory::new()),
        notifier,
        clock,
    );

    let sweeper = CodeSweeper::new(
        codes,
        Duration::from_secs(config.verification.sweep_interval_seconds),
    );
    sweeper.start().await;

    let code_request_rate_limiter = create_ip_rate_limiter(
        config.rate_limit.code_request_attempts,
        config.rate_limit.code_request_window_seconds,
    );
    let ip_rate_limiter = create_ip_rate_limiter(
        config.rate_limit.global_ip_limit,
        config.rate_limit.global_ip_window_seconds,
    );
    tracing::info!("Rate limiters initialized: Code Request and Global IP");

    let state = AppState {
        config: config.clone(),
        auth_service,
        code_request_rate_limiter,
        ip_rate_limiter,
    };
    let app = build_router(state);

    let addr = config.common.socket_addr();
    tracing::info!(address = %addr, "Listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;

    let served = service_core::axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await;

    sweeper.stop().await;
    served?;

    tracing::info!("Service shutdown complete");
    Ok(())
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
