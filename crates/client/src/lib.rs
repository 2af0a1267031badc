//! Client-side session lifecycle for the admin console.
//!
//! [`AuthCoordinator`] signs users in, keeps the session alive while they
//! are active, switches profiles and answers permission lookups against the
//! active profile. [`connect`] wires the default HTTP, SQLite and navigation
//! collaborators from a [`ClientConfig`].

use std::sync::Arc;

use anyhow::Context;

pub mod activity;
pub mod api;
pub mod clock;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod navigator;
pub mod state;
pub mod store;
pub mod time;
pub mod types;

pub use activity::{ActivityBus, ActivityMonitor, SignalKind};
pub use api::{ApiError, AuthApi, HttpAuthApi};
pub use clock::{ClockConfig, ClockHooks, SessionClock, TickOutcome};
pub use config::{ClientConfig, ConfigError};
pub use coordinator::{AuthCoordinator, Collaborators};
pub use error::AuthError;
pub use navigator::{MemoryNavigator, Navigator};
pub use state::{AuthEvent, AuthState, LogoutReason};
pub use store::{MemoryStore, PersistentStore, SqliteStore, StoreError, StoreScope};
pub use time::{SystemTimeSource, TimeSource, TokioTimeSource};
pub use types::{Credentials, ProfileSnapshot};

/// Build a coordinator backed by the HTTP Auth API, the on-disk store and an
/// in-memory navigator. Also initializes tracing.
pub fn connect(config: ClientConfig, activity: Arc<ActivityBus>) -> anyhow::Result<AuthCoordinator> {
    match config.log_filter.as_deref() {
        Some(filter) => gatehouse_observability::init_with(filter),
        None => gatehouse_observability::init(),
    }

    config.validate().context("invalid client configuration")?;

    let api = HttpAuthApi::new(config.api_url.clone(), config.request_timeout)
        .context("failed to build the Auth API client")?;
    let store = match &config.store_path {
        Some(path) => SqliteStore::at_path(path.clone()),
        None => SqliteStore::new().context("failed to locate the session store")?,
    };
    let navigator = MemoryNavigator::new(config.sign_in_path.clone());

    tracing::info!(api_url = %config.api_url, store = %store.path().display(), "session client configured");

    let parts = Collaborators::new(Arc::new(api), Arc::new(store), Arc::new(navigator), activity);
    AuthCoordinator::new(config, parts).context("failed to build the session coordinator")
}
