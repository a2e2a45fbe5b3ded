//! Handlers for the `/configurations` resource.
//!
//! Configuration versions are nested under widgets:
//! `/widgets/{widget_id}/configurations[/{version}]`

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use widgetcfg_core::diff::FieldDiff;
use widgetcfg_core::manager::RollbackOptions;
use widgetcfg_core::payload::ConfigPayload;
use widgetcfg_core::types::{DbId, VersionNumber};
use widgetcfg_core::version::{VersionSummary, WidgetConfigVersion};

use crate::error::AppResult;
use crate::query::{CompareParams, HistoryParams};
use crate::response::DataResponse;
use crate::state::AppState;

/// Body for creating a configuration version.
#[derive(Debug, Deserialize)]
pub struct ConfigurationRequest {
    /// Must be a non-empty JSON object; checked in the core.
    pub payload: serde_json::Value,
    pub notes: Option<String>,
}

/// Body for `POST /configurations/rollback`.
#[derive(Debug, Deserialize)]
pub struct RollbackRequest {
    pub version: VersionNumber,
    #[serde(default)]
    pub create_backup: bool,
    pub notes: Option<String>,
}

/// GET /api/v1/widgets/{widget_id}/configurations
/// GET /api/v1/widgets/{widget_id}/configurations/history
///
/// Version summaries in ascending version order, without payloads.
pub async fn history(
    State(state): State<AppState>,
    Path(widget_id): Path<DbId>,
    params: Result<Query<HistoryParams>, QueryRejection>,
) -> AppResult<Json<DataResponse<Vec<VersionSummary>>>> {
    let Query(params) = params?;
    let versions = state.versions.history(widget_id, params.page()).await?;
    Ok(Json(DataResponse { data: versions }))
}

/// GET /api/v1/widgets/{widget_id}/configurations/active
pub async fn get_active(
    State(state): State<AppState>,
    Path(widget_id): Path<DbId>,
) -> AppResult<Json<DataResponse<WidgetConfigVersion>>> {
    let active = state.versions.get_active(widget_id).await?;
    Ok(Json(DataResponse { data: active }))
}

/// GET /api/v1/widgets/{widget_id}/configurations/{version}
pub async fn get_version(
    State(state): State<AppState>,
    Path((widget_id, version)): Path<(DbId, VersionNumber)>,
) -> AppResult<Json<DataResponse<WidgetConfigVersion>>> {
    let found = state.versions.get(widget_id, version).await?;
    Ok(Json(DataResponse { data: found }))
}

/// POST /api/v1/widgets/{widget_id}/configurations
///
/// Stores a new inactive draft.
pub async fn create_draft(
    State(state): State<AppState>,
    Path(widget_id): Path<DbId>,
    body: Result<Json<ConfigurationRequest>, JsonRejection>,
) -> AppResult<(StatusCode, Json<DataResponse<WidgetConfigVersion>>)> {
    let Json(body) = body?;
    let payload = ConfigPayload::from_value(body.payload)?;
    let created = state
        .versions
        .create_draft(widget_id, payload, body.notes)
        .await?;
    Ok((StatusCode::CREATED, Json(DataResponse { data: created })))
}

/// PUT /api/v1/widgets/{widget_id}/configurations
///
/// Stores a new version and activates it in one transaction. Existing
/// versions are never modified.
pub async fn create_and_activate(
    State(state): State<AppState>,
    Path(widget_id): Path<DbId>,
    body: Result<Json<ConfigurationRequest>, JsonRejection>,
) -> AppResult<Json<DataResponse<WidgetConfigVersion>>> {
    let Json(body) = body?;
    let payload = ConfigPayload::from_value(body.payload)?;
    let active = state
        .versions
        .create_and_activate(widget_id, payload, body.notes)
        .await?;
    Ok(Json(DataResponse { data: active }))
}

/// POST /api/v1/widgets/{widget_id}/configurations/{version}/activate
pub async fn activate(
    State(state): State<AppState>,
    Path((widget_id, version)): Path<(DbId, VersionNumber)>,
) -> AppResult<Json<DataResponse<WidgetConfigVersion>>> {
    let active = state.versions.activate(widget_id, version).await?;
    Ok(Json(DataResponse { data: active }))
}

/// POST /api/v1/widgets/{widget_id}/configurations/rollback
///
/// Restores the payload of `version` as a new active version.
pub async fn rollback(
    State(state): State<AppState>,
    Path(widget_id): Path<DbId>,
    body: Result<Json<RollbackRequest>, JsonRejection>,
) -> AppResult<Json<DataResponse<WidgetConfigVersion>>> {
    let Json(body) = body?;
    let options = RollbackOptions {
        create_backup: body.create_backup,
        notes: body.notes,
    };
    let restored = state
        .versions
        .rollback(widget_id, body.version, options)
        .await?;
    Ok(Json(DataResponse { data: restored }))
}

/// GET /api/v1/widgets/{widget_id}/configurations/compare?config1=&config2=
///
/// Field-level changes going from `config1` to `config2`.
pub async fn compare(
    State(state): State<AppState>,
    Path(widget_id): Path<DbId>,
    params: Result<Query<CompareParams>, QueryRejection>,
) -> AppResult<Json<DataResponse<Vec<FieldDiff>>>> {
    let Query(params) = params?;
    let changes = state
        .versions
        .compare(widget_id, params.config1, params.config2)
        .await?;
    Ok(Json(DataResponse { data: changes }))
}

/// DELETE /api/v1/widgets/{widget_id}/configurations/{version}
///
/// Only never-activated drafts can be deleted; returns 409 otherwise.
pub async fn delete(
    State(state): State<AppState>,
    Path((widget_id, version)): Path<(DbId, VersionNumber)>,
) -> AppResult<StatusCode> {
    state.versions.delete(widget_id, version).await?;
    Ok(StatusCode::NO_CONTENT)
}
