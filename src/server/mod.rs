//! HTTP API.

pub mod identity;
mod routes;

pub use identity::ClientIdentity;
pub use routes::HWID_HEADER;

use crate::manager::Keygate;
use crate::store::pending::PendingLinkStore;
use axum::routing::{delete, get, post};
use axum::Router;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

/// Router for the issuance and validation endpoints only.
pub fn build_core_router(keygate: Arc<Keygate>) -> Router {
    let callback_path = keygate.config().callback_path.clone();
    Router::new()
        .route("/api/generate-link", post(routes::generate_link))
        .route(&callback_path, get(routes::provider_callback))
        .route("/api/verify-completion", post(routes::verify_completion))
        .route("/api/verify-key", post(routes::verify_key))
        .with_state(keygate)
}

/// Router for the core endpoints plus the administrative endpoints.
///
/// The admin routes carry no authentication of their own; deploy them
/// behind an authenticating proxy or use [`build_core_router`].
pub fn build_router(keygate: Arc<Keygate>) -> Router {
    let admin = Router::new()
        .route("/api/admin/keys", get(routes::list_keys))
        .route("/api/admin/keys/{key}", delete(routes::delete_key))
        .route("/api/admin/keys/{key}/revoke", post(routes::revoke_key))
        .route("/api/admin/logs", get(routes::usage_logs))
        .route("/api/admin/analytics", get(routes::analytics))
        .route("/api/admin/generate-keys", post(routes::generate_keys))
        .with_state(keygate.clone());

    build_core_router(keygate).merge(admin)
}

/// Sweep expired pending links every `every`, independent of link creation.
pub fn spawn_sweeper(links: PendingLinkStore, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            match links.sweep_expired() {
                Ok(0) => {}
                Ok(removed) => debug!(removed, "background sweep removed pending links"),
                Err(e) => warn!(error = %e, "background sweep failed"),
            }
        }
    })
}
