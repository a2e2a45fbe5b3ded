//! Public versioning operations: create, activate, rollback, compare,
//! history and delete.
//!
//! Every operation runs under a bounded deadline. Transient store failures
//! (lock timeouts, aborted transactions) are retried with backoff inside that
//! deadline; everything else is wrapped with the operation context and
//! returned as a [`CoreError`].

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::diff::{diff_payloads, FieldDiff};
use crate::error::CoreError;
use crate::payload::{validate_notes, ConfigPayload};
use crate::retry::RetryPolicy;
use crate::store::{ActivationLock, ConfigurationStore, StoreError};
use crate::types::{DbId, VersionNumber};
use crate::version::{
    DeleteOutcome, NewVersion, PageRequest, VersionSource, VersionStatus, VersionSummary,
    WidgetConfigVersion,
};

/// Default per-operation deadline.
pub const DEFAULT_OPERATION_TIMEOUT_MS: u64 = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VersioningSettings {
    /// Deadline for one public operation, retries included.
    pub operation_timeout: Duration,
    pub retry: RetryPolicy,
}

impl Default for VersioningSettings {
    fn default() -> Self {
        Self {
            operation_timeout: Duration::from_millis(DEFAULT_OPERATION_TIMEOUT_MS),
            retry: RetryPolicy::default(),
        }
    }
}

/// Options for [`VersionManager::rollback`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RollbackOptions {
    /// Annotate the new version with the version it displaced. The displaced
    /// version is kept as a superseded record either way.
    pub create_backup: bool,
    pub notes: Option<String>,
}

/// Failure inside a single attempt, before context is attached.
#[derive(Debug)]
enum AttemptError {
    Store(StoreError),
    Core(CoreError),
}

impl From<StoreError> for AttemptError {
    fn from(err: StoreError) -> Self {
        Self::Store(err)
    }
}

impl From<CoreError> for AttemptError {
    fn from(err: CoreError) -> Self {
        Self::Core(err)
    }
}

type AttemptResult<T> = Result<T, AttemptError>;

/// Orchestrates version operations on top of a [`ConfigurationStore`].
///
/// Cheap to share behind an `Arc`; holds no per-widget state of its own.
pub struct VersionManager {
    store: Arc<dyn ConfigurationStore>,
    settings: VersioningSettings,
}

impl VersionManager {
    pub fn new(store: Arc<dyn ConfigurationStore>, settings: VersioningSettings) -> Self {
        Self { store, settings }
    }

    pub fn store(&self) -> &Arc<dyn ConfigurationStore> {
        &self.store
    }

    pub fn settings(&self) -> &VersioningSettings {
        &self.settings
    }

    // ── Writes ───────────────────────────────────────────────────────

    /// Store a new configuration as an inactive draft.
    pub async fn create_draft(
        &self,
        widget_id: DbId,
        payload: ConfigPayload,
        notes: Option<String>,
    ) -> Result<WidgetConfigVersion, CoreError> {
        validate_notes(notes.as_deref())?;
        let input = NewVersion::draft(payload).with_notes(notes);
        let input = &input;

        let created = self
            .run("create_draft", widget_id, None, move || {
                self.create_once(widget_id, input)
            })
            .await?;

        tracing::info!(
            widget_id,
            version = created.version,
            "Configuration draft created",
        );
        Ok(created)
    }

    /// Store a new configuration and make it the active one. The insert and
    /// the swap commit together.
    pub async fn create_and_activate(
        &self,
        widget_id: DbId,
        payload: ConfigPayload,
        notes: Option<String>,
    ) -> Result<WidgetConfigVersion, CoreError> {
        validate_notes(notes.as_deref())?;
        let input = NewVersion::draft(payload)
            .with_source(VersionSource::Update)
            .with_notes(notes);
        let input = &input;

        self.run("create_and_activate", widget_id, None, move || {
            self.create_and_activate_once(widget_id, input)
        })
        .await
    }

    /// Make `version` the active configuration. Activating the version that
    /// is already active succeeds without changing anything.
    pub async fn activate(
        &self,
        widget_id: DbId,
        version: VersionNumber,
    ) -> Result<WidgetConfigVersion, CoreError> {
        self.run("activate", widget_id, Some(version), move || {
            self.activate_once(widget_id, version)
        })
        .await
    }

    /// Restore a historical payload as a brand-new active version.
    ///
    /// The target row is never reused or modified; the new version records
    /// `restored_from = target`.
    pub async fn rollback(
        &self,
        widget_id: DbId,
        target: VersionNumber,
        options: RollbackOptions,
    ) -> Result<WidgetConfigVersion, CoreError> {
        validate_notes(options.notes.as_deref())?;
        let options = &options;

        let restored = self
            .run("rollback", widget_id, Some(target), move || {
                self.rollback_once(widget_id, target, options)
            })
            .await?;

        tracing::info!(
            widget_id,
            restored_from = target,
            version = restored.version,
            create_backup = options.create_backup,
            "Configuration rolled back",
        );
        Ok(restored)
    }

    /// Hard-delete a version that has never been active.
    pub async fn delete(&self, widget_id: DbId, version: VersionNumber) -> Result<(), CoreError> {
        let outcome = self
            .run("delete", widget_id, Some(version), move || {
                self.delete_once(widget_id, version)
            })
            .await?;

        match outcome {
            DeleteOutcome::Deleted => {
                tracing::info!(widget_id, version, "Configuration draft deleted");
                Ok(())
            }
            DeleteOutcome::NotFound => Err(CoreError::VersionNotFound { widget_id, version }),
            DeleteOutcome::Retained(VersionStatus::Active) => Err(CoreError::Conflict(format!(
                "Cannot delete version {version} of widget {widget_id}: it is the active \
                 configuration. Activate a different version first."
            ))),
            DeleteOutcome::Retained(status) => Err(CoreError::Conflict(format!(
                "Cannot delete version {version} of widget {widget_id}: {status} versions \
                 are retained for audit"
            ))),
        }
    }

    // ── Reads ────────────────────────────────────────────────────────

    pub async fn get(
        &self,
        widget_id: DbId,
        version: VersionNumber,
    ) -> Result<WidgetConfigVersion, CoreError> {
        self.run("get", widget_id, Some(version), move || {
            self.get_once(widget_id, version)
        })
        .await
    }

    pub async fn get_active(&self, widget_id: DbId) -> Result<WidgetConfigVersion, CoreError> {
        self.run("get_active", widget_id, None, move || {
            self.get_active_once(widget_id)
        })
        .await
    }

    /// Field-level changes going from `old` to `new`.
    pub async fn compare(
        &self,
        widget_id: DbId,
        old: VersionNumber,
        new: VersionNumber,
    ) -> Result<Vec<FieldDiff>, CoreError> {
        let old_version = self.get(widget_id, old).await?;
        let new_version = self.get(widget_id, new).await?;
        Ok(diff_payloads(&old_version.payload, &new_version.payload))
    }

    /// Payload-free version summaries, ascending by version number.
    pub async fn history(
        &self,
        widget_id: DbId,
        page: PageRequest,
    ) -> Result<Vec<VersionSummary>, CoreError> {
        self.run("history", widget_id, None, move || {
            self.history_once(widget_id, page)
        })
        .await
    }

    // ── Single attempts ──────────────────────────────────────────────

    async fn create_once(
        &self,
        widget_id: DbId,
        input: &NewVersion,
    ) -> AttemptResult<WidgetConfigVersion> {
        match self.store.create(widget_id, input).await? {
            Some(created) => Ok(created),
            None => Err(CoreError::widget_not_found(widget_id).into()),
        }
    }

    async fn create_and_activate_once(
        &self,
        widget_id: DbId,
        input: &NewVersion,
    ) -> AttemptResult<WidgetConfigVersion> {
        let mut lock = self.lock(widget_id).await?;
        let draft = lock.insert_version(input).await?;
        let active = activate_locked(lock.as_mut(), draft.version).await?;
        lock.commit().await?;
        Ok(active)
    }

    async fn activate_once(
        &self,
        widget_id: DbId,
        version: VersionNumber,
    ) -> AttemptResult<WidgetConfigVersion> {
        let mut lock = self.lock(widget_id).await?;
        let active = activate_locked(lock.as_mut(), version).await?;
        lock.commit().await?;
        Ok(active)
    }

    async fn rollback_once(
        &self,
        widget_id: DbId,
        target: VersionNumber,
        options: &RollbackOptions,
    ) -> AttemptResult<WidgetConfigVersion> {
        let mut lock = self.lock(widget_id).await?;

        let Some(source) = lock.find_version(target).await? else {
            return Err(CoreError::VersionNotFound {
                widget_id,
                version: target,
            }
            .into());
        };
        let current = lock.current_active().await?.map(|v| v.version);

        let input = NewVersion {
            payload: source.payload.clone(),
            source: VersionSource::Rollback,
            restored_from: Some(target),
            notes: None,
        }
        .with_notes(rollback_notes(target, current, options));

        let draft = lock.insert_version(&input).await?;
        let active = activate_locked(lock.as_mut(), draft.version).await?;
        lock.commit().await?;
        Ok(active)
    }

    async fn delete_once(
        &self,
        widget_id: DbId,
        version: VersionNumber,
    ) -> AttemptResult<DeleteOutcome> {
        Ok(self.store.delete(widget_id, version).await?)
    }

    async fn get_once(
        &self,
        widget_id: DbId,
        version: VersionNumber,
    ) -> AttemptResult<WidgetConfigVersion> {
        match self.store.get(widget_id, version).await? {
            Some(found) => Ok(found),
            None => Err(CoreError::VersionNotFound { widget_id, version }.into()),
        }
    }

    async fn get_active_once(&self, widget_id: DbId) -> AttemptResult<WidgetConfigVersion> {
        match self.store.get_active(widget_id).await? {
            Some(active) => Ok(active),
            None => Err(CoreError::NoActiveVersion { widget_id }.into()),
        }
    }

    async fn history_once(
        &self,
        widget_id: DbId,
        page: PageRequest,
    ) -> AttemptResult<Vec<VersionSummary>> {
        if !self.store.widget_exists(widget_id).await? {
            return Err(CoreError::widget_not_found(widget_id).into());
        }
        Ok(self.store.list(widget_id, page).await?)
    }

    async fn lock(&self, widget_id: DbId) -> AttemptResult<Box<dyn ActivationLock>> {
        match self.store.lock_widget(widget_id).await? {
            Some(lock) => Ok(lock),
            None => Err(CoreError::widget_not_found(widget_id).into()),
        }
    }

    /// Run `attempt` until it succeeds, fails permanently, runs out of
    /// retries, or the operation deadline passes.
    async fn run<T, F, Fut>(
        &self,
        operation: &'static str,
        widget_id: DbId,
        version: Option<VersionNumber>,
        attempt: F,
    ) -> Result<T, CoreError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = AttemptResult<T>>,
    {
        let policy = self.settings.retry;
        let retrying = async {
            let mut n = 1;
            loop {
                match attempt().await {
                    Ok(value) => return Ok(value),
                    Err(AttemptError::Core(err)) => return Err(err),
                    Err(AttemptError::Store(err)) if err.is_transient() && policy.should_retry(n) => {
                        let delay = policy.delay_for(n);
                        tracing::warn!(
                            operation,
                            widget_id,
                            version,
                            attempt = n,
                            delay_ms = delay.as_millis() as u64,
                            error = %err,
                            "Transient store failure, retrying",
                        );
                        tokio::time::sleep(delay).await;
                        n += 1;
                    }
                    Err(AttemptError::Store(err)) => {
                        tracing::error!(
                            operation,
                            widget_id,
                            version,
                            attempt = n,
                            error = %err,
                            "Store operation failed",
                        );
                        return Err(CoreError::persistence(operation, widget_id, version, err));
                    }
                }
            }
        };

        match tokio::time::timeout(self.settings.operation_timeout, retrying).await {
            Ok(result) => result,
            Err(_) => {
                let ms = self.settings.operation_timeout.as_millis() as u64;
                tracing::error!(operation, widget_id, version, timeout_ms = ms, "Operation deadline exceeded");
                Err(CoreError::persistence(
                    operation,
                    widget_id,
                    version,
                    StoreError::DeadlineExceeded(ms),
                ))
            }
        }
    }
}

/// Read-current, compare, swap. Must run inside the widget's lock.
async fn activate_locked(
    lock: &mut dyn ActivationLock,
    target: VersionNumber,
) -> AttemptResult<WidgetConfigVersion> {
    let widget_id = lock.widget_id();

    let current = lock.current_active().await?;
    if let Some(current) = current.as_ref().filter(|c| c.version == target) {
        tracing::debug!(widget_id, version = target, "Version already active, nothing to do");
        return Ok(current.clone());
    }

    if lock.find_version(target).await?.is_none() {
        return Err(CoreError::VersionNotFound {
            widget_id,
            version: target,
        }
        .into());
    }

    let previous = current.map(|c| c.version);
    let active = lock
        .swap_active(previous, target)
        .await?
        .ok_or(CoreError::VersionNotFound {
            widget_id,
            version: target,
        })?;

    tracing::info!(
        widget_id,
        version = target,
        previous_version = previous,
        "Configuration version activated",
    );
    Ok(active)
}

/// Audit note for a rollback-created version.
fn rollback_notes(
    target: VersionNumber,
    current: Option<VersionNumber>,
    options: &RollbackOptions,
) -> Option<String> {
    let user = options
        .notes
        .as_deref()
        .map(str::trim)
        .filter(|n| !n.is_empty());

    let annotation = match (options.create_backup, current) {
        (true, Some(current)) => Some(format!(
            "Rollback to version {target}; version {current} retained as backup"
        )),
        (true, None) => Some(format!("Rollback to version {target}; no active version to back up")),
        (false, _) => None,
    };

    match (annotation, user) {
        (Some(a), Some(u)) => Some(format!("{a}. {u}")),
        (Some(a), None) => Some(a),
        (None, Some(u)) => Some(u.to_string()),
        (None, None) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rollback_notes_with_backup_name_displaced_version() {
        let options = RollbackOptions {
            create_backup: true,
            notes: None,
        };
        assert_eq!(
            rollback_notes(1, Some(2), &options).as_deref(),
            Some("Rollback to version 1; version 2 retained as backup")
        );
    }

    #[test]
    fn rollback_notes_without_backup_keep_user_text_only() {
        let options = RollbackOptions {
            create_backup: false,
            notes: Some("  bad colours  ".into()),
        };
        assert_eq!(rollback_notes(1, Some(2), &options).as_deref(), Some("bad colours"));
        assert_eq!(rollback_notes(1, Some(2), &RollbackOptions::default()), None);
    }

    #[test]
    fn rollback_notes_combine_annotation_and_user_text() {
        let options = RollbackOptions {
            create_backup: true,
            notes: Some("incident 42".into()),
        };
        assert_eq!(
            rollback_notes(3, Some(5), &options).as_deref(),
            Some("Rollback to version 3; version 5 retained as backup. incident 42")
        );
    }
}
