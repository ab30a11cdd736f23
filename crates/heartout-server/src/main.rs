use tracing::info;

use heartout_server::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "heartout=debug,tower_http=debug".into()),
        )
        .init();

    let config = Config::from_env()?;
    if config.dev {
        info!("Development mode: placeholder secrets are allowed");
    }

    let state = heartout_server::build_state(&config)?;
    let app = heartout_server::app(state);

    let addr = config.addr()?;
    info!("HeartOut server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("HeartOut server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
