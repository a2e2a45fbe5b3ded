//! Route definitions for widget configuration versions.

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::configurations as config;
use crate::state::AppState;

/// Routes mounted at `/widgets`.
///
/// ```text
/// GET    /{widget_id}/configurations                    history
/// POST   /{widget_id}/configurations                    create_draft
/// PUT    /{widget_id}/configurations                    create_and_activate
/// GET    /{widget_id}/configurations/active             get_active
/// GET    /{widget_id}/configurations/history            history
/// GET    /{widget_id}/configurations/compare            compare
/// POST   /{widget_id}/configurations/rollback           rollback
/// GET    /{widget_id}/configurations/{version}          get_version
/// DELETE /{widget_id}/configurations/{version}          delete
/// POST   /{widget_id}/configurations/{version}/activate activate
/// ```
pub fn router() -> Router<AppState> {
    let configuration_routes = Router::new()
        .route(
            "/",
            get(config::history)
                .post(config::create_draft)
                .put(config::create_and_activate),
        )
        .route("/active", get(config::get_active))
        .route("/history", get(config::history))
        .route("/compare", get(config::compare))
        .route("/rollback", post(config::rollback))
        .route(
            "/{version}",
            get(config::get_version).delete(config::delete),
        )
        .route("/{version}/activate", post(config::activate));

    Router::new().nest("/{widget_id}/configurations", configuration_routes)
}
