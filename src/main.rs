use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use refcollector::config::Config;
use refcollector::geo::{GeoProvider, IpStackProvider};
use refcollector::server::{create_app, shutdown_signal};
use refcollector::storage;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::from_env()?;
    info!("Loaded configuration");

    info!("Initializing database...");
    let store = storage::connect(&config.database).await?;
    info!("Database initialized successfully");

    let provider: Arc<dyn GeoProvider> = Arc::new(IpStackProvider::from_config(&config.geo)?);

    let app = create_app(&config, store, provider)?;

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Click collector listening on http://{}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    Ok(())
}
