//! Campus Guide Server Entry Point

use anyhow::Context;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer};

use campus_guide_config::{load_settings, Settings};
use campus_guide_llm::LlmFactory;
use campus_guide_rag::RetrievalEngine;
use campus_guide_server::{create_router, init_metrics, AppState};
use campus_guide_speech::{AsrClientConfig, AudioConverter, HttpAsrClient, UploadTranscriber};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Priority: env vars > config/{env}.yaml > config/default.yaml > defaults
    let env = std::env::var("CAMPUS_GUIDE_ENV").ok();
    let config = load_settings(env.as_deref()).context("Failed to load configuration")?;

    init_tracing(&config);

    tracing::info!("Starting Campus Guide Server v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        environment = ?config.environment,
        config_path = env.as_deref().unwrap_or("default"),
        "Configuration loaded"
    );

    let llm = LlmFactory::create(&config.llm).context("Failed to create LLM backend")?;

    let engine = Arc::new(
        RetrievalEngine::from_settings(&config.rag)
            .await
            .with_context(|| format!("Failed to build retrieval index from {}", config.rag.data_path))?,
    );

    let asr = HttpAsrClient::new(AsrClientConfig::from(&config.asr))
        .context("Failed to create ASR client")?;
    let transcriber =
        UploadTranscriber::new(AudioConverter::from_config(&config.asr), Arc::new(asr));

    let mut state = AppState::new(config.clone(), llm, engine.clone(), transcriber)
        .with_record_table(engine.table());

    if config.observability.metrics_enabled {
        let handle = init_metrics().context("Failed to install metrics recorder")?;
        state = state.with_metrics(handle);
        tracing::info!("Initialized Prometheus metrics at /metrics");
    }

    tracing::info!(
        complex_mode = state.complex_mode_available(),
        max_sessions = config.sessions.max_sessions,
        ttl_secs = config.sessions.ttl_secs,
        "Initialized application state"
    );

    let sweep_shutdown = state.sessions.start_sweep_task();
    let app = create_router(state);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .with_context(|| format!("Invalid listen address {}:{}", config.server.host, config.server.port))?;
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    let _ = sweep_shutdown.send(true);
    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown...");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown...");
        }
    }
}

fn init_tracing(config: &Settings) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = &config.observability.log_level;
        format!("campus_guide={},tower_http=debug", level).into()
    });

    let fmt_layer = if config.observability.log_json {
        tracing_subscriber::fmt::layer().json().boxed()
    } else {
        tracing_subscriber::fmt::layer().boxed()
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();
}
