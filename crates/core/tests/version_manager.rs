//! Behavioural tests for `VersionManager` on top of the in-memory store.
//!
//! Covers the lifecycle scenarios (draft, activate, update, rollback,
//! compare, delete), the single-active invariant under concurrent
//! activations, and the retry / deadline handling for store failures.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use async_trait::async_trait;
use serde_json::{json, Value};
use widgetcfg_core::diff::DiffStatus;
use widgetcfg_core::error::CoreError;
use widgetcfg_core::manager::{RollbackOptions, VersionManager, VersioningSettings};
use widgetcfg_core::memory::MemoryConfigurationStore;
use widgetcfg_core::payload::ConfigPayload;
use widgetcfg_core::retry::RetryPolicy;
use widgetcfg_core::store::{ActivationLock, ConfigurationStore, StoreError, StoreResult};
use widgetcfg_core::types::{DbId, VersionNumber};
use widgetcfg_core::version::{
    NewVersion, PageRequest, VersionSource, VersionStatus, VersionSummary, WidgetConfigVersion,
};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

const WIDGET: DbId = 1;

fn payload(value: Value) -> ConfigPayload {
    ConfigPayload::from_value(value).unwrap()
}

fn fast_settings() -> VersioningSettings {
    VersioningSettings {
        operation_timeout: Duration::from_secs(5),
        retry: RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
        },
    }
}

fn manager_for(store: Arc<dyn ConfigurationStore>) -> VersionManager {
    VersionManager::new(store, fast_settings())
}

fn new_manager() -> VersionManager {
    manager_for(Arc::new(MemoryConfigurationStore::with_widgets([WIDGET, 2])))
}

async fn history(manager: &VersionManager) -> Vec<VersionSummary> {
    manager.history(WIDGET, PageRequest::first()).await.unwrap()
}

fn active_versions(history: &[VersionSummary]) -> Vec<VersionNumber> {
    history
        .iter()
        .filter(|s| s.is_active)
        .map(|s| s.version)
        .collect()
}

// ---------------------------------------------------------------------------
// Lifecycle scenarios
// ---------------------------------------------------------------------------

#[tokio::test]
async fn draft_then_activate() {
    let manager = new_manager();

    let draft = manager
        .create_draft(WIDGET, payload(json!({"theme": "light"})), None)
        .await
        .unwrap();
    assert_eq!(draft.version, 1);
    assert!(!draft.is_active);
    assert_eq!(draft.status(), VersionStatus::Draft);
    assert_eq!(draft.source, VersionSource::Draft);

    let active = manager.activate(WIDGET, 1).await.unwrap();
    assert!(active.is_active);
    assert!(active.activated_at.is_some());
    assert_eq!(manager.get_active(WIDGET).await.unwrap().version, 1);
}

#[tokio::test]
async fn update_supersedes_previous_version() {
    let manager = new_manager();
    manager
        .create_draft(WIDGET, payload(json!({"theme": "light"})), None)
        .await
        .unwrap();
    manager.activate(WIDGET, 1).await.unwrap();

    let updated = manager
        .create_and_activate(WIDGET, payload(json!({"theme": "dark"})), Some("new brand".into()))
        .await
        .unwrap();
    assert_eq!(updated.version, 2);
    assert!(updated.is_active);
    assert_eq!(updated.source, VersionSource::Update);
    assert_eq!(updated.notes.as_deref(), Some("new brand"));

    let first = manager.get(WIDGET, 1).await.unwrap();
    assert!(!first.is_active);
    assert_eq!(first.status(), VersionStatus::Superseded);
}

#[tokio::test]
async fn rollback_creates_new_active_copy() {
    let manager = new_manager();
    manager
        .create_draft(WIDGET, payload(json!({"theme": "light"})), None)
        .await
        .unwrap();
    manager.activate(WIDGET, 1).await.unwrap();
    manager
        .create_and_activate(WIDGET, payload(json!({"theme": "dark"})), None)
        .await
        .unwrap();

    let restored = manager
        .rollback(WIDGET, 1, RollbackOptions::default())
        .await
        .unwrap();
    assert_eq!(restored.version, 3);
    assert!(restored.is_active);
    assert_eq!(restored.source, VersionSource::Rollback);
    assert_eq!(restored.restored_from, Some(1));
    assert_eq!(restored.payload, payload(json!({"theme": "light"})));
    assert_eq!(restored.notes, None);

    let original = manager.get(WIDGET, 1).await.unwrap();
    assert_eq!(original.payload, payload(json!({"theme": "light"})));
    assert_eq!(original.source, VersionSource::Draft);

    let entries = history(&manager).await;
    let summary: Vec<(VersionNumber, bool)> =
        entries.iter().map(|s| (s.version, s.is_active)).collect();
    assert_eq!(summary, vec![(1, false), (2, false), (3, true)]);
}

#[tokio::test]
async fn rollback_with_backup_is_annotated() {
    let manager = new_manager();
    manager
        .create_and_activate(WIDGET, payload(json!({"theme": "light"})), None)
        .await
        .unwrap();
    manager
        .create_and_activate(WIDGET, payload(json!({"theme": "dark"})), None)
        .await
        .unwrap();

    let restored = manager
        .rollback(
            WIDGET,
            1,
            RollbackOptions {
                create_backup: true,
                notes: None,
            },
        )
        .await
        .unwrap();

    assert_eq!(
        restored.notes.as_deref(),
        Some("Rollback to version 1; version 2 retained as backup")
    );
    // The displaced version is kept as-is, no extra copy is made.
    assert_eq!(history(&manager).await.len(), 3);
    assert_eq!(
        manager.get(WIDGET, 2).await.unwrap().status(),
        VersionStatus::Superseded
    );
}

#[tokio::test]
async fn rollback_to_missing_version_is_not_found() {
    let manager = new_manager();
    manager
        .create_and_activate(WIDGET, payload(json!({"theme": "light"})), None)
        .await
        .unwrap();

    let err = manager
        .rollback(WIDGET, 9, RollbackOptions::default())
        .await
        .unwrap_err();
    assert_matches!(err, CoreError::VersionNotFound { widget_id: WIDGET, version: 9 });
    assert_eq!(history(&manager).await.len(), 1);
}

#[tokio::test]
async fn compare_reports_changed_fields() {
    let manager = new_manager();
    manager
        .create_and_activate(WIDGET, payload(json!({"theme": "light"})), None)
        .await
        .unwrap();
    manager
        .create_and_activate(WIDGET, payload(json!({"theme": "dark"})), None)
        .await
        .unwrap();
    manager
        .rollback(WIDGET, 1, RollbackOptions::default())
        .await
        .unwrap();

    let diff = manager.compare(WIDGET, 2, 3).await.unwrap();
    assert_eq!(diff.len(), 1);
    assert_eq!(diff[0].field, "theme");
    assert_eq!(diff[0].status, DiffStatus::Changed);
    assert_eq!(diff[0].old_value, Some(json!("dark")));
    assert_eq!(diff[0].new_value, Some(json!("light")));
}

#[tokio::test]
async fn compare_is_symmetric() {
    let manager = new_manager();
    manager
        .create_draft(
            WIDGET,
            payload(json!({
                "theme": "light",
                "knowledge_base": {"settings": {"autoLearning": true}},
                "url_patterns": ["/a", "/b"]
            })),
            None,
        )
        .await
        .unwrap();
    manager
        .create_draft(
            WIDGET,
            payload(json!({
                "theme": "dark",
                "knowledge_base": {"settings": {"autoLearning": false}},
                "url_patterns": ["/b", "/c"],
                "greeting": "Hi"
            })),
            None,
        )
        .await
        .unwrap();

    let forward = manager.compare(WIDGET, 1, 2).await.unwrap();
    let backward = manager.compare(WIDGET, 2, 1).await.unwrap();
    assert_eq!(forward.len(), backward.len());
    for entry in &forward {
        assert!(
            backward.contains(&entry.inverted()),
            "missing inverse of {entry:?}"
        );
    }
}

#[tokio::test]
async fn compare_with_missing_version_is_not_found() {
    let manager = new_manager();
    manager
        .create_draft(WIDGET, payload(json!({"theme": "light"})), None)
        .await
        .unwrap();
    assert_matches!(
        manager.compare(WIDGET, 1, 2).await,
        Err(CoreError::VersionNotFound { version: 2, .. })
    );
}

// ---------------------------------------------------------------------------
// Delete rules
// ---------------------------------------------------------------------------

#[tokio::test]
async fn deleting_active_version_conflicts() {
    let manager = new_manager();
    manager
        .create_and_activate(WIDGET, payload(json!({"theme": "light"})), None)
        .await
        .unwrap();

    assert_matches!(manager.delete(WIDGET, 1).await, Err(CoreError::Conflict(_)));
    assert_eq!(manager.get_active(WIDGET).await.unwrap().version, 1);
}

#[tokio::test]
async fn deleting_superseded_version_conflicts() {
    let manager = new_manager();
    manager
        .create_and_activate(WIDGET, payload(json!({"theme": "light"})), None)
        .await
        .unwrap();
    manager
        .create_and_activate(WIDGET, payload(json!({"theme": "dark"})), None)
        .await
        .unwrap();

    let err = manager.delete(WIDGET, 1).await.unwrap_err();
    assert_matches!(err, CoreError::Conflict(msg) if msg.contains("superseded"));
}

#[tokio::test]
async fn deleting_draft_succeeds_and_numbers_are_not_reused() {
    let manager = new_manager();
    manager
        .create_and_activate(WIDGET, payload(json!({"theme": "light"})), None)
        .await
        .unwrap();
    manager
        .create_draft(WIDGET, payload(json!({"theme": "dark"})), None)
        .await
        .unwrap();

    manager.delete(WIDGET, 2).await.unwrap();
    assert_matches!(
        manager.get(WIDGET, 2).await,
        Err(CoreError::VersionNotFound { .. })
    );

    let next = manager
        .create_draft(WIDGET, payload(json!({"theme": "blue"})), None)
        .await
        .unwrap();
    assert_eq!(next.version, 3);
}

#[tokio::test]
async fn deleting_unknown_version_is_not_found() {
    let manager = new_manager();
    assert_matches!(
        manager.delete(WIDGET, 4).await,
        Err(CoreError::VersionNotFound { version: 4, .. })
    );
}

// ---------------------------------------------------------------------------
// Activation semantics
// ---------------------------------------------------------------------------

#[tokio::test]
async fn activation_is_idempotent() {
    let manager = new_manager();
    manager
        .create_draft(WIDGET, payload(json!({"theme": "light"})), None)
        .await
        .unwrap();

    let first = manager.activate(WIDGET, 1).await.unwrap();
    let before = history(&manager).await;
    let second = manager.activate(WIDGET, 1).await.unwrap();
    let after = history(&manager).await;

    assert_eq!(first, second);
    assert_eq!(before, after);
}

#[tokio::test]
async fn activating_version_of_other_widget_is_not_found() {
    let manager = new_manager();
    manager
        .create_draft(2, payload(json!({"theme": "light"})), None)
        .await
        .unwrap();

    assert_matches!(
        manager.activate(WIDGET, 1).await,
        Err(CoreError::VersionNotFound { widget_id: WIDGET, version: 1 })
    );
    assert_matches!(
        manager.get_active(WIDGET).await,
        Err(CoreError::NoActiveVersion { widget_id: WIDGET })
    );
}

#[tokio::test]
async fn failed_activation_keeps_previous_active() {
    let manager = new_manager();
    manager
        .create_and_activate(WIDGET, payload(json!({"theme": "light"})), None)
        .await
        .unwrap();

    assert!(manager.activate(WIDGET, 42).await.is_err());
    assert_eq!(active_versions(&history(&manager).await), vec![1]);
}

#[tokio::test]
async fn unknown_widget_is_not_found() {
    let manager = new_manager();
    assert_matches!(
        manager
            .create_draft(99, payload(json!({"theme": "light"})), None)
            .await,
        Err(CoreError::NotFound { entity: "Widget", id: 99 })
    );
    assert_matches!(
        manager.history(99, PageRequest::first()).await,
        Err(CoreError::NotFound { id: 99, .. })
    );
    assert_matches!(
        manager.activate(99, 1).await,
        Err(CoreError::NotFound { id: 99, .. })
    );
}

#[tokio::test]
async fn versions_are_numbered_sequentially() {
    let manager = new_manager();
    for n in 1..=5 {
        let created = manager
            .create_draft(WIDGET, payload(json!({"step": n})), None)
            .await
            .unwrap();
        assert_eq!(created.version, n);
    }
    // Numbering is per widget.
    let other = manager
        .create_draft(2, payload(json!({"step": 1})), None)
        .await
        .unwrap();
    assert_eq!(other.version, 1);
}

#[tokio::test]
async fn history_is_paged_without_payloads() {
    let manager = new_manager();
    for n in 1..=5 {
        manager
            .create_draft(WIDGET, payload(json!({"step": n})), None)
            .await
            .unwrap();
    }
    let page = manager
        .history(WIDGET, PageRequest::new(Some(2), Some(2)))
        .await
        .unwrap();
    let versions: Vec<_> = page.iter().map(|s| s.version).collect();
    assert_eq!(versions, vec![3, 4]);

    let json = serde_json::to_value(&page[0]).unwrap();
    assert!(json.get("payload").is_none());
    assert_eq!(json["status"], "draft");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_activations_leave_exactly_one_active() {
    let manager = Arc::new(new_manager());
    for n in 1..=4 {
        manager
            .create_draft(WIDGET, payload(json!({"step": n})), None)
            .await
            .unwrap();
    }

    for _ in 0..10 {
        let tasks: Vec<_> = (1..=4)
            .map(|v| {
                let manager = Arc::clone(&manager);
                tokio::spawn(async move { manager.activate(WIDGET, v).await })
            })
            .collect();
        for result in futures::future::join_all(tasks).await {
            result.unwrap().unwrap();
        }

        let active = active_versions(&history(&manager).await);
        assert_eq!(active.len(), 1, "exactly one active version, got {active:?}");
        assert_eq!(manager.get_active(WIDGET).await.unwrap().version, active[0]);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_updates_allocate_distinct_versions() {
    let manager = Arc::new(new_manager());
    let tasks: Vec<_> = (0..8)
        .map(|n| {
            let manager = Arc::clone(&manager);
            tokio::spawn(async move {
                manager
                    .create_and_activate(WIDGET, payload(json!({"step": n})), None)
                    .await
            })
        })
        .collect();
    let mut versions: Vec<VersionNumber> = futures::future::join_all(tasks)
        .await
        .into_iter()
        .map(|r| r.unwrap().unwrap().version)
        .collect();
    versions.sort_unstable();
    assert_eq!(versions, (1..=8).collect::<Vec<_>>());
    assert_eq!(active_versions(&history(&manager).await).len(), 1);
}

// ---------------------------------------------------------------------------
// Store failures
// ---------------------------------------------------------------------------

/// Delegates to the in-memory store but fails `lock_widget` a configurable
/// number of times, or stalls it forever.
struct FlakyStore {
    inner: MemoryConfigurationStore,
    lock_failures: AtomicU32,
    stall_locks: bool,
    error: StoreError,
}

impl FlakyStore {
    fn failing(times: u32, error: StoreError) -> Self {
        Self {
            inner: MemoryConfigurationStore::with_widgets([WIDGET]),
            lock_failures: AtomicU32::new(times),
            stall_locks: false,
            error,
        }
    }

    fn stalling() -> Self {
        Self {
            stall_locks: true,
            ..Self::failing(0, StoreError::Backend("unused".into()))
        }
    }
}

#[async_trait]
impl ConfigurationStore for FlakyStore {
    async fn ping(&self) -> StoreResult<()> {
        self.inner.ping().await
    }

    async fn widget_exists(&self, widget_id: DbId) -> StoreResult<bool> {
        self.inner.widget_exists(widget_id).await
    }

    async fn create(
        &self,
        widget_id: DbId,
        input: &NewVersion,
    ) -> StoreResult<Option<WidgetConfigVersion>> {
        self.inner.create(widget_id, input).await
    }

    async fn get(
        &self,
        widget_id: DbId,
        version: VersionNumber,
    ) -> StoreResult<Option<WidgetConfigVersion>> {
        self.inner.get(widget_id, version).await
    }

    async fn get_active(&self, widget_id: DbId) -> StoreResult<Option<WidgetConfigVersion>> {
        self.inner.get_active(widget_id).await
    }

    async fn list(&self, widget_id: DbId, page: PageRequest) -> StoreResult<Vec<VersionSummary>> {
        self.inner.list(widget_id, page).await
    }

    async fn lock_widget(&self, widget_id: DbId) -> StoreResult<Option<Box<dyn ActivationLock>>> {
        if self.stall_locks {
            std::future::pending::<()>().await;
        }
        let remaining = self.lock_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.lock_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(self.error.clone());
        }
        self.inner.lock_widget(widget_id).await
    }
}

#[tokio::test]
async fn transient_lock_failures_are_retried() {
    let store = Arc::new(FlakyStore::failing(
        2,
        StoreError::LockTimeout("lock_timeout".into()),
    ));
    let manager = manager_for(store.clone());
    manager
        .create_draft(WIDGET, payload(json!({"theme": "light"})), None)
        .await
        .unwrap();

    let active = manager.activate(WIDGET, 1).await.unwrap();
    assert!(active.is_active);
    assert_eq!(store.lock_failures.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn exhausted_retries_surface_as_retryable_persistence_error() {
    let store = Arc::new(FlakyStore::failing(
        10,
        StoreError::Serialization("deadlock detected".into()),
    ));
    let manager = manager_for(store);
    manager
        .create_draft(WIDGET, payload(json!({"theme": "light"})), None)
        .await
        .unwrap();

    let err = manager.activate(WIDGET, 1).await.unwrap_err();
    assert!(err.is_retryable());
    assert_matches!(
        err,
        CoreError::Persistence {
            operation: "activate",
            widget_id: WIDGET,
            version: Some(1),
            source: StoreError::Serialization(_),
        }
    );
    assert_matches!(
        manager.get_active(WIDGET).await,
        Err(CoreError::NoActiveVersion { .. })
    );
}

#[tokio::test]
async fn permanent_failures_are_not_retried() {
    let store = Arc::new(FlakyStore::failing(2, StoreError::Backend("disk full".into())));
    let manager = manager_for(store.clone());

    let err = manager.activate(WIDGET, 1).await.unwrap_err();
    assert!(!err.is_retryable());
    assert_eq!(store.lock_failures.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn operations_are_bounded_by_deadline() {
    let store = Arc::new(FlakyStore::stalling());
    let manager = VersionManager::new(
        store,
        VersioningSettings {
            operation_timeout: Duration::from_millis(50),
            retry: RetryPolicy::none(),
        },
    );

    let err = manager.activate(WIDGET, 1).await.unwrap_err();
    assert!(err.is_retryable());
    assert_matches!(
        err,
        CoreError::Persistence {
            source: StoreError::DeadlineExceeded(50),
            ..
        }
    );
}

#[tokio::test]
async fn invalid_payload_is_rejected_before_storage() {
    assert_matches!(
        ConfigPayload::from_value(json!("dark")),
        Err(CoreError::Validation(_))
    );

    let manager = new_manager();
    let long_notes = "x".repeat(2000);
    assert_matches!(
        manager
            .create_draft(WIDGET, payload(json!({"theme": "light"})), Some(long_notes))
            .await,
        Err(CoreError::Validation(_))
    );
    assert!(history(&manager).await.is_empty());
}
