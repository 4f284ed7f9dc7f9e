use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;

mod config;
mod engine;
mod http;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    tracing::info!("facegated starting");

    let config = config::Config::from_env()?;
    let predictor = engine::load_predictor(&config)?;
    let info = http::ServiceInfo {
        subject: config.subject.clone(),
        model_path: config.model_path_str(),
        strategy: predictor.strategy(),
        orientation: predictor.orientation(),
        threshold: predictor.threshold(),
    };
    let engine = engine::spawn_engine(predictor, config.queue_depth)?;

    let app = http::router(http::AppState::new(engine, info), config.max_upload_bytes);
    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;

    tracing::info!(addr = %config.bind_addr, "facegated ready");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    tracing::info!("facegated shutting down");

    Ok(())
}
