//! Repository for the `widget_config_versions` table.
//!
//! Reads take the pool. Everything that participates in an activation
//! transaction takes `&mut PgConnection` so callers can pass `&mut *tx`.

use std::time::Duration;

use sqlx::{PgConnection, PgPool};
use widgetcfg_core::types::{DbId, VersionNumber};
use widgetcfg_core::version::{NewVersion, PageRequest};

use crate::models::widget_config_version::{WidgetConfigSummaryRow, WidgetConfigVersionRow};

/// Column list shared across queries to avoid repetition.
const COLUMNS: &str = "id, widget_id, version, payload, is_active, source, \
    restored_from, notes, created_at, activated_at";

/// Columns for history listings; payloads are never loaded there.
const SUMMARY_COLUMNS: &str = "widget_id, version, is_active, source, \
    restored_from, notes, created_at, activated_at";

/// Provides versioning operations for widget configurations.
pub struct WidgetConfigVersionRepo;

impl WidgetConfigVersionRepo {
    // ── Reads ────────────────────────────────────────────────────────

    pub async fn widget_exists(pool: &PgPool, widget_id: DbId) -> Result<bool, sqlx::Error> {
        let row: (bool,) = sqlx::query_as("SELECT EXISTS(SELECT 1 FROM widgets WHERE id = $1)")
            .bind(widget_id)
            .fetch_one(pool)
            .await?;
        Ok(row.0)
    }

    /// Find one version of a widget's configuration.
    pub async fn find(
        conn: &mut PgConnection,
        widget_id: DbId,
        version: VersionNumber,
    ) -> Result<Option<WidgetConfigVersionRow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM widget_config_versions \
             WHERE widget_id = $1 AND version = $2"
        );
        sqlx::query_as::<_, WidgetConfigVersionRow>(&query)
            .bind(widget_id)
            .bind(version)
            .fetch_optional(conn)
            .await
    }

    /// Find the active version for a widget (if any).
    pub async fn find_active(
        conn: &mut PgConnection,
        widget_id: DbId,
    ) -> Result<Option<WidgetConfigVersionRow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM widget_config_versions \
             WHERE widget_id = $1 AND is_active"
        );
        sqlx::query_as::<_, WidgetConfigVersionRow>(&query)
            .bind(widget_id)
            .fetch_optional(conn)
            .await
    }

    /// One page of version summaries in ascending version order, starting
    /// after `page.after`.
    pub async fn list_summaries(
        pool: &PgPool,
        widget_id: DbId,
        page: PageRequest,
    ) -> Result<Vec<WidgetConfigSummaryRow>, sqlx::Error> {
        let query = format!(
            "SELECT {SUMMARY_COLUMNS} FROM widget_config_versions \
             WHERE widget_id = $1 AND version > $2 \
             ORDER BY version ASC \
             LIMIT $3"
        );
        sqlx::query_as::<_, WidgetConfigSummaryRow>(&query)
            .bind(widget_id)
            .bind(page.after.unwrap_or(0))
            .bind(page.limit)
            .fetch_all(pool)
            .await
    }

    // ── Locking ──────────────────────────────────────────────────────

    /// Bound how long the current transaction waits for row locks.
    pub async fn set_lock_timeout(
        conn: &mut PgConnection,
        timeout: Duration,
    ) -> Result<(), sqlx::Error> {
        // SET does not accept bind parameters.
        let query = format!("SET LOCAL lock_timeout = '{}ms'", timeout.as_millis().max(1));
        sqlx::query(&query).execute(conn).await?;
        Ok(())
    }

    /// Take the widget's activation lock. Serializes activations, rollbacks
    /// and deletes for one widget while leaving draft inserts unblocked.
    ///
    /// Returns `false` if the widget does not exist.
    pub async fn lock_widget_row(
        conn: &mut PgConnection,
        widget_id: DbId,
    ) -> Result<bool, sqlx::Error> {
        let row: Option<(DbId,)> =
            sqlx::query_as("SELECT id FROM widgets WHERE id = $1 FOR NO KEY UPDATE")
                .bind(widget_id)
                .fetch_optional(conn)
                .await?;
        Ok(row.is_some())
    }

    /// Keep the widget from being deleted while a draft is appended.
    ///
    /// Returns `false` if the widget does not exist.
    pub async fn share_lock_widget_row(
        conn: &mut PgConnection,
        widget_id: DbId,
    ) -> Result<bool, sqlx::Error> {
        let row: Option<(DbId,)> =
            sqlx::query_as("SELECT id FROM widgets WHERE id = $1 FOR KEY SHARE")
                .bind(widget_id)
                .fetch_optional(conn)
                .await?;
        Ok(row.is_some())
    }

    // ── Writes ───────────────────────────────────────────────────────

    /// Hand out the next version number for a widget. The counter row is
    /// row-locked until the transaction ends and never goes backwards, so
    /// numbers of deleted drafts are not reused.
    pub async fn allocate_version(
        conn: &mut PgConnection,
        widget_id: DbId,
    ) -> Result<VersionNumber, sqlx::Error> {
        let row: (VersionNumber,) = sqlx::query_as(
            "INSERT INTO widget_config_sequences (widget_id, last_version) \
             VALUES ($1, 1) \
             ON CONFLICT (widget_id) DO UPDATE \
                SET last_version = widget_config_sequences.last_version + 1, \
                    updated_at = NOW() \
             RETURNING last_version",
        )
        .bind(widget_id)
        .fetch_one(conn)
        .await?;
        Ok(row.0)
    }

    /// Insert an inactive version under a number from [`Self::allocate_version`].
    pub async fn insert(
        conn: &mut PgConnection,
        widget_id: DbId,
        version: VersionNumber,
        input: &NewVersion,
    ) -> Result<WidgetConfigVersionRow, sqlx::Error> {
        let query = format!(
            "INSERT INTO widget_config_versions \
                (widget_id, version, payload, is_active, source, restored_from, notes) \
             VALUES ($1, $2, $3, false, $4, $5, $6) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, WidgetConfigVersionRow>(&query)
            .bind(widget_id)
            .bind(version)
            .bind(input.payload.to_value())
            .bind(input.source.as_str())
            .bind(input.restored_from)
            .bind(&input.notes)
            .fetch_one(conn)
            .await
    }

    /// Clear the active flag on one version. Returns `true` if it was active.
    pub async fn deactivate(
        conn: &mut PgConnection,
        widget_id: DbId,
        version: VersionNumber,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE widget_config_versions SET is_active = false \
             WHERE widget_id = $1 AND version = $2 AND is_active",
        )
        .bind(widget_id)
        .bind(version)
        .execute(conn)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Mark a version active and stamp its activation time.
    ///
    /// Returns `None` if the version does not exist for this widget.
    pub async fn activate(
        conn: &mut PgConnection,
        widget_id: DbId,
        version: VersionNumber,
    ) -> Result<Option<WidgetConfigVersionRow>, sqlx::Error> {
        let query = format!(
            "UPDATE widget_config_versions SET is_active = true, activated_at = NOW() \
             WHERE widget_id = $1 AND version = $2 \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, WidgetConfigVersionRow>(&query)
            .bind(widget_id)
            .bind(version)
            .fetch_optional(conn)
            .await
    }

    /// Permanently delete a version that was never activated.
    /// Returns `true` if a row was removed.
    pub async fn delete_draft(
        conn: &mut PgConnection,
        widget_id: DbId,
        version: VersionNumber,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "DELETE FROM widget_config_versions \
             WHERE widget_id = $1 AND version = $2 \
               AND NOT is_active AND activated_at IS NULL",
        )
        .bind(widget_id)
        .bind(version)
        .execute(conn)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}
