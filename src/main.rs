use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use dotenvy::dotenv;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

use eventhub_server::auth::{IdentityProvider, SessionAuth};
use eventhub_server::config::Config;
use eventhub_server::db::{MemoryStore, PgStore, Store};
use eventhub_server::routes::{create_routes, HttpSettings};
use eventhub_server::state::AppState;
use eventhub_server::storage::LocalObjectStore;

const DEFAULT_LOG_FILTER: &str = "eventhub_server=info,tower_http=info";
const SESSION_SWEEP_INTERVAL: Duration = Duration::from_secs(15 * 60);

#[tokio::main]
async fn main() {
    dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .init();

    let config = Config::from_env();

    let store: Arc<dyn Store> = match &config.database_url {
        Some(database_url) => {
            let store = PgStore::connect(database_url, config.max_connections)
                .await
                .expect("Failed to connect to database");
            tracing::info!("Successfully connected to database");

            store.run_migrations().await.expect("Failed to run migrations");
            tracing::info!("Migrations run successfully");
            Arc::new(store)
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using in-memory store (data is not persisted)");
            Arc::new(MemoryStore::new())
        }
    };

    let objects = Arc::new(LocalObjectStore::new(
        config.storage_root.clone(),
        config.public_storage_url.clone(),
    ));
    let identity = Arc::new(SessionAuth::new(store.clone(), config.session_ttl));

    // Auth audit trail; the listener is released when the task ends.
    let mut auth_events = identity.subscribe();
    tokio::spawn(async move {
        while let Some(event) = auth_events.recv().await {
            tracing::info!(?event, "Auth state changed");
        }
    });

    let sweeper = identity.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(SESSION_SWEEP_INTERVAL);
        loop {
            interval.tick().await;
            let purged = sweeper.purge_expired().await;
            if purged > 0 {
                tracing::debug!(purged, "Expired sessions removed");
            }
        }
    });

    let state = AppState::new(store, objects, identity);
    let app: Router = create_routes(state, &HttpSettings::from(&config));

    tracing::info!("🚀 Server running at http://{}", config.bind_addr);

    let listener = TcpListener::bind(config.bind_addr)
        .await
        .expect("Failed to bind address");

    axum::serve(listener, app).await.expect("Server failed");
}
