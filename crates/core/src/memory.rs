//! Single-process [`ConfigurationStore`].
//!
//! Mirrors the PostgreSQL store's semantics with a per-widget async mutex
//! standing in for the widget row lock. Every write for a widget (plain
//! appends included) goes through that mutex, so a lock's working copy never
//! goes stale. Only suitable for tests and single-replica deployments.
//!
//! Widgets live outside this service. [`MemoryConfigurationStore::new`] only
//! knows widgets registered explicitly; [`MemoryConfigurationStore::auto_register`]
//! treats every widget id as existing and creates its history on first write.

use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::OwnedMutexGuard;

use crate::store::{ActivationLock, ConfigurationStore, StoreError, StoreResult};
use crate::types::{DbId, VersionNumber};
use crate::version::{
    DeleteOutcome, NewVersion, PageRequest, VersionSummary, WidgetConfigVersion,
};

#[derive(Debug, Clone, Default)]
struct WidgetHistory {
    /// Last version number handed out; never decremented.
    last_version: VersionNumber,
    versions: BTreeMap<VersionNumber, WidgetConfigVersion>,
}

impl WidgetHistory {
    fn active(&self) -> Option<&WidgetConfigVersion> {
        self.versions.values().find(|v| v.is_active)
    }

    fn append(&mut self, widget_id: DbId, input: &NewVersion) -> WidgetConfigVersion {
        self.last_version += 1;
        let record = WidgetConfigVersion {
            widget_id,
            version: self.last_version,
            payload: input.payload.clone(),
            is_active: false,
            source: input.source,
            restored_from: input.restored_from,
            notes: input.notes.clone(),
            created_at: Utc::now(),
            activated_at: None,
        };
        self.versions.insert(record.version, record.clone());
        record
    }
}

type Histories = Arc<Mutex<HashMap<DbId, WidgetHistory>>>;

#[derive(Default)]
pub struct MemoryConfigurationStore {
    widgets: Histories,
    locks: Mutex<HashMap<DbId, Arc<tokio::sync::Mutex<()>>>>,
    /// Treat unknown widget ids as existing.
    auto_register: bool,
}

impl MemoryConfigurationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store for standalone runs with no widget table: any widget id is
    /// accepted and gets an empty history on first use.
    pub fn auto_register() -> Self {
        Self {
            auto_register: true,
            ..Self::default()
        }
    }

    /// A store that already knows the given widgets.
    pub fn with_widgets(widget_ids: impl IntoIterator<Item = DbId>) -> Self {
        let store = Self::new();
        for id in widget_ids {
            store.register_widget(id);
        }
        store
    }

    /// Make a widget known to the store. Widgets are owned elsewhere; this
    /// stands in for the external widget table.
    pub fn register_widget(&self, widget_id: DbId) {
        if let Ok(mut widgets) = self.widgets.lock() {
            widgets.entry(widget_id).or_default();
        }
    }

    fn histories(&self) -> StoreResult<MutexGuard<'_, HashMap<DbId, WidgetHistory>>> {
        lock_histories(&self.widgets)
    }

    async fn acquire(&self, widget_id: DbId) -> StoreResult<Option<MemoryActivationLock>> {
        if self.auto_register {
            self.histories()?.entry(widget_id).or_default();
        } else if !self.histories()?.contains_key(&widget_id) {
            return Ok(None);
        }

        let mutex = {
            let mut locks = self
                .locks
                .lock()
                .map_err(|_| StoreError::Backend("memory store lock table poisoned".into()))?;
            Arc::clone(locks.entry(widget_id).or_default())
        };
        let guard = mutex.lock_owned().await;

        // Read the working copy only once the lock is held.
        let working = self
            .histories()?
            .get(&widget_id)
            .cloned()
            .unwrap_or_default();

        Ok(Some(MemoryActivationLock {
            widget_id,
            working,
            widgets: Arc::clone(&self.widgets),
            _guard: guard,
        }))
    }
}

fn lock_histories(
    widgets: &Histories,
) -> StoreResult<MutexGuard<'_, HashMap<DbId, WidgetHistory>>> {
    widgets
        .lock()
        .map_err(|_| StoreError::Backend("memory store poisoned".into()))
}

#[async_trait]
impl ConfigurationStore for MemoryConfigurationStore {
    async fn ping(&self) -> StoreResult<()> {
        self.histories().map(|_| ())
    }

    async fn widget_exists(&self, widget_id: DbId) -> StoreResult<bool> {
        Ok(self.auto_register || self.histories()?.contains_key(&widget_id))
    }

    async fn create(
        &self,
        widget_id: DbId,
        input: &NewVersion,
    ) -> StoreResult<Option<WidgetConfigVersion>> {
        let Some(mut lock) = self.acquire(widget_id).await? else {
            return Ok(None);
        };
        let created = lock.working.append(widget_id, input);
        Box::new(lock).commit().await?;
        Ok(Some(created))
    }

    async fn get(
        &self,
        widget_id: DbId,
        version: VersionNumber,
    ) -> StoreResult<Option<WidgetConfigVersion>> {
        Ok(self
            .histories()?
            .get(&widget_id)
            .and_then(|h| h.versions.get(&version))
            .cloned())
    }

    async fn get_active(&self, widget_id: DbId) -> StoreResult<Option<WidgetConfigVersion>> {
        Ok(self
            .histories()?
            .get(&widget_id)
            .and_then(|h| h.active())
            .cloned())
    }

    async fn list(&self, widget_id: DbId, page: PageRequest) -> StoreResult<Vec<VersionSummary>> {
        let histories = self.histories()?;
        let Some(history) = histories.get(&widget_id) else {
            return Ok(Vec::new());
        };
        let start = match page.after {
            Some(after) => Bound::Excluded(after),
            None => Bound::Unbounded,
        };
        Ok(history
            .versions
            .range((start, Bound::Unbounded))
            .take(page.limit.max(0) as usize)
            .map(|(_, v)| v.summary())
            .collect())
    }

    async fn lock_widget(&self, widget_id: DbId) -> StoreResult<Option<Box<dyn ActivationLock>>> {
        Ok(self
            .acquire(widget_id)
            .await?
            .map(|lock| Box::new(lock) as Box<dyn ActivationLock>))
    }
}

/// Working copy of one widget's history plus the widget's mutex guard.
/// Changes become visible on [`ActivationLock::commit`].
pub struct MemoryActivationLock {
    widget_id: DbId,
    working: WidgetHistory,
    widgets: Histories,
    _guard: OwnedMutexGuard<()>,
}

#[async_trait]
impl ActivationLock for MemoryActivationLock {
    fn widget_id(&self) -> DbId {
        self.widget_id
    }

    async fn current_active(&mut self) -> StoreResult<Option<WidgetConfigVersion>> {
        Ok(self.working.active().cloned())
    }

    async fn find_version(
        &mut self,
        version: VersionNumber,
    ) -> StoreResult<Option<WidgetConfigVersion>> {
        Ok(self.working.versions.get(&version).cloned())
    }

    async fn insert_version(&mut self, input: &NewVersion) -> StoreResult<WidgetConfigVersion> {
        Ok(self.working.append(self.widget_id, input))
    }

    async fn swap_active(
        &mut self,
        from: Option<VersionNumber>,
        to: VersionNumber,
    ) -> StoreResult<Option<WidgetConfigVersion>> {
        if !self.working.versions.contains_key(&to) {
            return Ok(None);
        }
        if let Some(previous) = from.and_then(|v| self.working.versions.get_mut(&v)) {
            previous.is_active = false;
        }
        let Some(target) = self.working.versions.get_mut(&to) else {
            return Ok(None);
        };
        target.is_active = true;
        target.activated_at = Some(Utc::now());
        Ok(Some(target.clone()))
    }

    async fn delete_draft(&mut self, version: VersionNumber) -> StoreResult<DeleteOutcome> {
        let Some(existing) = self.working.versions.get(&version) else {
            return Ok(DeleteOutcome::NotFound);
        };
        let status = existing.status();
        if !status.is_deletable() {
            return Ok(DeleteOutcome::Retained(status));
        }
        self.working.versions.remove(&version);
        Ok(DeleteOutcome::Deleted)
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        let lock = *self;
        lock_histories(&lock.widgets)?.insert(lock.widget_id, lock.working);
        Ok(())
    }
}
