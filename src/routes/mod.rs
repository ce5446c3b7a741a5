use std::path::PathBuf;
use std::time::Duration;

use axum::routing::{get, post, put};
use axum::Router;
use tower_http::services::ServeDir;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::config::{create_cors_layer, create_security_headers_layer, Config};
use crate::handlers::{auth, events, health_check, organizer, registrations};
use crate::state::AppState;

/// Cross-cutting HTTP settings taken from [`Config`].
#[derive(Debug, Clone)]
pub struct HttpSettings {
    pub cors_allowed_origins: Vec<String>,
    pub production: bool,
    pub request_timeout: Duration,
    /// Served read-only under [`STORAGE_MOUNT`].
    pub storage_root: PathBuf,
}

/// Path prefix that stored objects are served from.
pub const STORAGE_MOUNT: &str = "/storage";

impl From<&Config> for HttpSettings {
    fn from(config: &Config) -> Self {
        Self {
            cors_allowed_origins: config.cors_allowed_origins.clone(),
            production: config.production,
            request_timeout: config.request_timeout,
            storage_root: config.storage_root.clone(),
        }
    }
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            cors_allowed_origins: Vec::new(),
            production: false,
            request_timeout: Duration::from_secs(30),
            storage_root: PathBuf::from("./storage"),
        }
    }
}

pub fn create_routes(state: AppState, settings: &HttpSettings) -> Router {
    let auth_routes = Router::new()
        .route("/sign-up", post(auth::sign_up))
        .route("/sign-in", post(auth::sign_in))
        .route("/sign-out", post(auth::sign_out))
        .route("/me", get(auth::me).patch(auth::update_me));

    let event_routes = Router::new()
        .route("/", get(events::list_events).post(events::create_event))
        .route(
            "/:id",
            get(events::get_event)
                .patch(events::update_event)
                .delete(events::delete_event),
        )
        .route(
            "/:id/image",
            put(events::upload_image).delete(events::delete_image),
        )
        .route(
            "/:id/registrations",
            get(registrations::event_registrations).post(registrations::register),
        )
        .route("/:id/registration", get(registrations::registration_status));

    let registration_routes = Router::new()
        .route("/:id/cancel", post(registrations::cancel))
        .route("/:id/attend", post(registrations::mark_attended));

    let organizer_routes = Router::new()
        .route("/events", get(organizer::my_events))
        .route("/summary", get(organizer::summary))
        .route("/stats", get(organizer::event_stats));

    Router::new()
        .route("/health", get(health_check))
        .route(
            "/categories",
            get(events::list_categories).post(events::create_category),
        )
        .route("/me/registrations", get(registrations::my_registrations))
        .nest("/auth", auth_routes)
        .nest("/events", event_routes)
        .nest("/registrations", registration_routes)
        .nest("/organizer", organizer_routes)
        .nest_service(STORAGE_MOUNT, ServeDir::new(&settings.storage_root))
        .with_state(state)
        .layer(TimeoutLayer::new(settings.request_timeout))
        .layer(TraceLayer::new_for_http())
        .layer(create_security_headers_layer(settings.production))
        .layer(create_cors_layer(&settings.cors_allowed_origins))
}
