//! Widget configuration version row models.

use sqlx::FromRow;
use widgetcfg_core::payload::ConfigPayload;
use widgetcfg_core::store::StoreError;
use widgetcfg_core::types::{DbId, Timestamp, VersionNumber};
use widgetcfg_core::version::{
    VersionSource, VersionStatus, VersionSummary, WidgetConfigVersion,
};

/// A row from the `widget_config_versions` table.
#[derive(Debug, Clone, FromRow)]
pub struct WidgetConfigVersionRow {
    pub id: DbId,
    pub widget_id: DbId,
    pub version: VersionNumber,
    pub payload: serde_json::Value,
    pub is_active: bool,
    pub source: String,
    pub restored_from: Option<VersionNumber>,
    pub notes: Option<String>,
    pub created_at: Timestamp,
    pub activated_at: Option<Timestamp>,
}

/// The same row without its payload, for history listings.
#[derive(Debug, Clone, FromRow)]
pub struct WidgetConfigSummaryRow {
    pub widget_id: DbId,
    pub version: VersionNumber,
    pub is_active: bool,
    pub source: String,
    pub restored_from: Option<VersionNumber>,
    pub notes: Option<String>,
    pub created_at: Timestamp,
    pub activated_at: Option<Timestamp>,
}

fn parse_source(value: &str) -> Result<VersionSource, StoreError> {
    VersionSource::parse(value).map_err(|e| StoreError::Backend(e.to_string()))
}

impl TryFrom<WidgetConfigVersionRow> for WidgetConfigVersion {
    type Error = StoreError;

    fn try_from(row: WidgetConfigVersionRow) -> Result<Self, Self::Error> {
        let payload = ConfigPayload::from_value(row.payload).map_err(|e| {
            StoreError::Backend(format!(
                "stored payload for widget {} version {} is unreadable: {e}",
                row.widget_id, row.version
            ))
        })?;
        Ok(Self {
            widget_id: row.widget_id,
            version: row.version,
            payload,
            is_active: row.is_active,
            source: parse_source(&row.source)?,
            restored_from: row.restored_from,
            notes: row.notes,
            created_at: row.created_at,
            activated_at: row.activated_at,
        })
    }
}

impl TryFrom<WidgetConfigSummaryRow> for VersionSummary {
    type Error = StoreError;

    fn try_from(row: WidgetConfigSummaryRow) -> Result<Self, Self::Error> {
        Ok(Self {
            widget_id: row.widget_id,
            version: row.version,
            is_active: row.is_active,
            status: VersionStatus::derive(row.is_active, row.activated_at.as_ref()),
            source: parse_source(&row.source)?,
            restored_from: row.restored_from,
            notes: row.notes,
            created_at: row.created_at,
            activated_at: row.activated_at,
        })
    }
}
