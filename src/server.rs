//! Ambient HTTP layers and the serve loop.

use crate::settings::Settings;
use crate::store::{MemoryStore, PgStore, Store};
use axum::Router;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

/// Wrap composed routes with the body size limit and request tracing.
pub fn app(routes: Router, settings: &Settings) -> Router {
    routes
        .layer(RequestBodyLimitLayer::new(settings.body_limit))
        .layer(TraceLayer::new_for_http())
}

/// PostgreSQL when `DATABASE_URL` is set, otherwise an empty in-memory store.
pub async fn connect_store(settings: &Settings) -> Result<Arc<dyn Store>, sqlx::Error> {
    match &settings.database_url {
        Some(url) => {
            let pool = sqlx::postgres::PgPoolOptions::new()
                .max_connections(settings.max_connections)
                .connect(url)
                .await?;
            tracing::info!(max_connections = settings.max_connections, "connected to postgres");
            Ok(Arc::new(PgStore::new(pool)))
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using in-memory store");
            Ok(Arc::new(MemoryStore::new()))
        }
    }
}

pub async fn serve(app: Router, settings: &Settings) -> std::io::Result<()> {
    let listener = TcpListener::bind(&settings.bind_addr).await?;
    tracing::info!("listening on {}", listener.local_addr()?);
    axum::serve(listener, app).await
}
