//! Persistence seam for configuration versions.
//!
//! [`ConfigurationStore`] is the append-only repository. Every write that
//! touches `is_active` goes through an [`ActivationLock`]: an open
//! transaction holding the widget's serialization lock. Dropping a lock
//! without calling [`ActivationLock::commit`] discards everything done
//! through it.

use async_trait::async_trait;

use crate::types::{DbId, VersionNumber};
use crate::version::{DeleteOutcome, NewVersion, PageRequest, VersionSummary, WidgetConfigVersion};

/// Failures reported by a store implementation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// The backend could not be reached (pool exhausted, connection lost).
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    /// Waiting for the widget lock took longer than the lock timeout.
    #[error("lock wait timed out: {0}")]
    LockTimeout(String),

    /// The transaction was aborted by the backend (serialization failure,
    /// deadlock, racing version allocation) and nothing was committed.
    #[error("transaction aborted: {0}")]
    Serialization(String),

    /// The per-operation deadline elapsed; the transaction was rolled back.
    #[error("operation deadline of {0} ms exceeded")]
    DeadlineExceeded(u64),

    /// Any other backend failure.
    #[error("storage failure: {0}")]
    Backend(String),
}

impl StoreError {
    /// Failures that are known not to have committed anything and may be
    /// retried immediately inside the same call.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Unavailable(_) | Self::LockTimeout(_) | Self::Serialization(_)
        )
    }

    /// Failures a client may retry later.
    pub fn is_retryable(&self) -> bool {
        self.is_transient() || matches!(self, Self::DeadlineExceeded(_))
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Append-only persistence for widget configuration versions.
///
/// Reads and plain appends never take the activation lock.
#[async_trait]
pub trait ConfigurationStore: Send + Sync {
    /// Liveness probe for the backing storage.
    async fn ping(&self) -> StoreResult<()>;

    async fn widget_exists(&self, widget_id: DbId) -> StoreResult<bool>;

    /// Append an inactive version with the next number for `widget_id`.
    ///
    /// Returns `None` if the widget does not exist.
    async fn create(
        &self,
        widget_id: DbId,
        input: &NewVersion,
    ) -> StoreResult<Option<WidgetConfigVersion>>;

    async fn get(
        &self,
        widget_id: DbId,
        version: VersionNumber,
    ) -> StoreResult<Option<WidgetConfigVersion>>;

    async fn get_active(&self, widget_id: DbId) -> StoreResult<Option<WidgetConfigVersion>>;

    /// One page of summaries, ascending by version number.
    async fn list(&self, widget_id: DbId, page: PageRequest) -> StoreResult<Vec<VersionSummary>>;

    /// Begin a transaction holding the activation lock for `widget_id`.
    ///
    /// Blocks while another lock for the same widget is held. Returns `None`
    /// if the widget does not exist.
    async fn lock_widget(&self, widget_id: DbId) -> StoreResult<Option<Box<dyn ActivationLock>>>;

    /// Hard-delete a never-activated version, under the widget lock so it
    /// cannot race an activation of the same version.
    async fn delete(&self, widget_id: DbId, version: VersionNumber) -> StoreResult<DeleteOutcome> {
        let Some(mut lock) = self.lock_widget(widget_id).await? else {
            return Ok(DeleteOutcome::NotFound);
        };
        let outcome = lock.delete_draft(version).await?;
        lock.commit().await?;
        Ok(outcome)
    }
}

/// An open transaction holding a widget's activation lock.
#[async_trait]
pub trait ActivationLock: Send {
    fn widget_id(&self) -> DbId;

    /// The widget's active version as seen inside the transaction.
    async fn current_active(&mut self) -> StoreResult<Option<WidgetConfigVersion>>;

    async fn find_version(
        &mut self,
        version: VersionNumber,
    ) -> StoreResult<Option<WidgetConfigVersion>>;

    /// Append an inactive version inside this transaction.
    async fn insert_version(&mut self, input: &NewVersion) -> StoreResult<WidgetConfigVersion>;

    /// Deactivate `from` (if any) and activate `to`, stamping `activated_at`.
    ///
    /// Returns `None` if `to` does not exist for the widget.
    async fn swap_active(
        &mut self,
        from: Option<VersionNumber>,
        to: VersionNumber,
    ) -> StoreResult<Option<WidgetConfigVersion>>;

    async fn delete_draft(&mut self, version: VersionNumber) -> StoreResult<DeleteOutcome>;

    /// Make every change done through this lock visible and release it.
    async fn commit(self: Box<Self>) -> StoreResult<()>;
}
