pub mod configurations;
pub mod health;

use axum::Router;

use crate::state::AppState;

/// Build the `/api/v1` route tree.
///
/// Route hierarchy:
///
/// ```text
/// /widgets/{widget_id}/configurations                   history, create draft, create + activate
/// /widgets/{widget_id}/configurations/active            active configuration
/// /widgets/{widget_id}/configurations/history           history
/// /widgets/{widget_id}/configurations/compare           field diff (?config1=&config2=)
/// /widgets/{widget_id}/configurations/rollback          rollback (POST)
/// /widgets/{widget_id}/configurations/{version}         get, delete draft
/// /widgets/{widget_id}/configurations/{version}/activate activate (POST)
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new().nest("/widgets", configurations::router())
}
