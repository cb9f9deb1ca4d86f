use anyhow::Result;
use axum::Router;
use std::sync::Arc;
use tokio::signal;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::access::ScopeKey;
use crate::config::Config;
use crate::geo::GeoProvider;
use crate::ingest::IngestionPipeline;
use crate::redirect::create_redirect_router;
use crate::storage::EventStore;
use crate::view::{create_view_router, ViewGateway};

/// Wire the click and view routes over one store and geolocation provider.
pub fn create_app(
    config: &Config,
    store: Arc<dyn EventStore>,
    provider: Arc<dyn GeoProvider>,
) -> Result<Router> {
    let pipeline = Arc::new(IngestionPipeline::new(config, Arc::clone(&store), provider)?);
    let gateway = Arc::new(ViewGateway::new(store, ScopeKey::new(&config.access.salt)));

    Ok(Router::new()
        .merge(create_redirect_router(pipeline))
        .merge(create_view_router(gateway))
        .layer(TraceLayer::new_for_http()))
}

pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
        info!("Received Ctrl+C, shutting down");
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
                info!("Received terminate signal, shutting down");
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install terminate handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
