//! PostgreSQL-backed [`ConfigurationStore`].

use std::time::Duration;

use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Transaction};
use widgetcfg_core::store::{ActivationLock, ConfigurationStore, StoreResult};
use widgetcfg_core::types::{DbId, VersionNumber};
use widgetcfg_core::version::{
    DeleteOutcome, NewVersion, PageRequest, VersionStatus, VersionSummary, WidgetConfigVersion,
};

use crate::error::{commit_error, store_error};
use crate::repositories::WidgetConfigVersionRepo;

/// Default bound on waiting for a widget's row lock.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_millis(5_000);

#[derive(Clone)]
pub struct PgConfigurationStore {
    pool: PgPool,
    lock_timeout: Duration,
}

impl PgConfigurationStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        }
    }

    pub fn with_lock_timeout(mut self, lock_timeout: Duration) -> Self {
        self.lock_timeout = lock_timeout;
        self
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn begin(&self) -> StoreResult<Transaction<'static, Postgres>> {
        let mut tx = self.pool.begin().await.map_err(store_error)?;
        WidgetConfigVersionRepo::set_lock_timeout(&mut tx, self.lock_timeout)
            .await
            .map_err(store_error)?;
        Ok(tx)
    }
}

#[async_trait]
impl ConfigurationStore for PgConfigurationStore {
    async fn ping(&self) -> StoreResult<()> {
        crate::health_check(&self.pool).await.map_err(store_error)
    }

    async fn widget_exists(&self, widget_id: DbId) -> StoreResult<bool> {
        WidgetConfigVersionRepo::widget_exists(&self.pool, widget_id)
            .await
            .map_err(store_error)
    }

    async fn create(
        &self,
        widget_id: DbId,
        input: &NewVersion,
    ) -> StoreResult<Option<WidgetConfigVersion>> {
        let mut tx = self.begin().await?;
        let exists = WidgetConfigVersionRepo::share_lock_widget_row(&mut tx, widget_id)
            .await
            .map_err(store_error)?;
        if !exists {
            return Ok(None);
        }
        let version = WidgetConfigVersionRepo::allocate_version(&mut tx, widget_id)
            .await
            .map_err(store_error)?;
        let row = WidgetConfigVersionRepo::insert(&mut tx, widget_id, version, input)
            .await
            .map_err(store_error)?;
        tx.commit().await.map_err(commit_error)?;
        WidgetConfigVersion::try_from(row).map(Some)
    }

    async fn get(
        &self,
        widget_id: DbId,
        version: VersionNumber,
    ) -> StoreResult<Option<WidgetConfigVersion>> {
        let mut conn = self.pool.acquire().await.map_err(store_error)?;
        WidgetConfigVersionRepo::find(&mut conn, widget_id, version)
            .await
            .map_err(store_error)?
            .map(WidgetConfigVersion::try_from)
            .transpose()
    }

    async fn get_active(&self, widget_id: DbId) -> StoreResult<Option<WidgetConfigVersion>> {
        let mut conn = self.pool.acquire().await.map_err(store_error)?;
        WidgetConfigVersionRepo::find_active(&mut conn, widget_id)
            .await
            .map_err(store_error)?
            .map(WidgetConfigVersion::try_from)
            .transpose()
    }

    async fn list(&self, widget_id: DbId, page: PageRequest) -> StoreResult<Vec<VersionSummary>> {
        WidgetConfigVersionRepo::list_summaries(&self.pool, widget_id, page)
            .await
            .map_err(store_error)?
            .into_iter()
            .map(VersionSummary::try_from)
            .collect()
    }

    async fn lock_widget(&self, widget_id: DbId) -> StoreResult<Option<Box<dyn ActivationLock>>> {
        let mut tx = self.begin().await?;
        let exists = WidgetConfigVersionRepo::lock_widget_row(&mut tx, widget_id)
            .await
            .map_err(store_error)?;
        if !exists {
            return Ok(None);
        }
        tracing::trace!(widget_id, "Widget activation lock acquired");
        Ok(Some(Box::new(PgActivationLock { widget_id, tx })))
    }
}

/// An open transaction holding the widget row lock. Dropping it without
/// [`ActivationLock::commit`] rolls back.
pub struct PgActivationLock {
    widget_id: DbId,
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl ActivationLock for PgActivationLock {
    fn widget_id(&self) -> DbId {
        self.widget_id
    }

    async fn current_active(&mut self) -> StoreResult<Option<WidgetConfigVersion>> {
        WidgetConfigVersionRepo::find_active(&mut self.tx, self.widget_id)
            .await
            .map_err(store_error)?
            .map(WidgetConfigVersion::try_from)
            .transpose()
    }

    async fn find_version(
        &mut self,
        version: VersionNumber,
    ) -> StoreResult<Option<WidgetConfigVersion>> {
        WidgetConfigVersionRepo::find(&mut self.tx, self.widget_id, version)
            .await
            .map_err(store_error)?
            .map(WidgetConfigVersion::try_from)
            .transpose()
    }

    async fn insert_version(&mut self, input: &NewVersion) -> StoreResult<WidgetConfigVersion> {
        let version = WidgetConfigVersionRepo::allocate_version(&mut self.tx, self.widget_id)
            .await
            .map_err(store_error)?;
        WidgetConfigVersionRepo::insert(&mut self.tx, self.widget_id, version, input)
            .await
            .map_err(store_error)
            .and_then(WidgetConfigVersion::try_from)
    }

    async fn swap_active(
        &mut self,
        from: Option<VersionNumber>,
        to: VersionNumber,
    ) -> StoreResult<Option<WidgetConfigVersion>> {
        // Clear first: the partial unique index rejects two active rows.
        if let Some(previous) = from {
            WidgetConfigVersionRepo::deactivate(&mut self.tx, self.widget_id, previous)
                .await
                .map_err(store_error)?;
        }
        WidgetConfigVersionRepo::activate(&mut self.tx, self.widget_id, to)
            .await
            .map_err(store_error)?
            .map(WidgetConfigVersion::try_from)
            .transpose()
    }

    async fn delete_draft(&mut self, version: VersionNumber) -> StoreResult<DeleteOutcome> {
        let deleted = WidgetConfigVersionRepo::delete_draft(&mut self.tx, self.widget_id, version)
            .await
            .map_err(store_error)?;
        if deleted {
            return Ok(DeleteOutcome::Deleted);
        }
        let existing = WidgetConfigVersionRepo::find(&mut self.tx, self.widget_id, version)
            .await
            .map_err(store_error)?;
        Ok(match existing {
            None => DeleteOutcome::NotFound,
            Some(row) => DeleteOutcome::Retained(VersionStatus::derive(
                row.is_active,
                row.activated_at.as_ref(),
            )),
        })
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        self.tx.commit().await.map_err(commit_error)
    }
}
