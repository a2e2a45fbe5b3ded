use std::sync::Arc;

use widgetcfg_core::manager::VersionManager;

use crate::config::ServerConfig;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// This is cheaply cloneable (inner data is behind `Arc`).
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    /// Versioning operations over the configured store.
    pub versions: Arc<VersionManager>,
}
