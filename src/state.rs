use std::sync::Arc;

use crate::auth::IdentityProvider;
use crate::db::Store;
use crate::services::{DashboardService, EventService, RegistrationService};
use crate::storage::ObjectStore;

/// Everything a handler needs, passed explicitly through axum's `State`.
#[derive(Clone)]
pub struct AppState {
    pub events: EventService,
    pub registrations: RegistrationService,
    pub dashboard: DashboardService,
    pub identity: Arc<dyn IdentityProvider>,
}

impl AppState {
    pub fn new(
        store: Arc<dyn Store>,
        objects: Arc<dyn ObjectStore>,
        identity: Arc<dyn IdentityProvider>,
    ) -> Self {
        Self {
            events: EventService::new(store.clone(), objects),
            registrations: RegistrationService::new(store.clone()),
            dashboard: DashboardService::new(store),
            identity,
        }
    }
}
