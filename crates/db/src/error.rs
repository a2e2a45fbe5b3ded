//! Classification of sqlx errors into [`StoreError`].

use widgetcfg_core::store::StoreError;

/// Partial unique index guaranteeing one active version per widget.
pub const ACTIVE_VERSION_INDEX: &str = "uq_widget_config_versions_active";

/// Classify a sqlx error.
///
/// - Lock wait timeout (`55P03`) maps to `LockTimeout`.
/// - Serialization failure / deadlock (`40001`, `40P01`) and unique
///   violations from racing inserts (`23505`) map to `Serialization`.
/// - A unique violation on [`ACTIVE_VERSION_INDEX`] is a broken invariant,
///   not a race, and maps to `Backend`.
/// - Pool and connection failures map to `Unavailable`.
pub fn store_error(err: sqlx::Error) -> StoreError {
    match &err {
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
            StoreError::Unavailable(err.to_string())
        }
        sqlx::Error::Database(db_err) => match db_err.code().as_deref() {
            Some("55P03") => StoreError::LockTimeout(db_err.message().to_string()),
            Some("40001") | Some("40P01") => StoreError::Serialization(db_err.message().to_string()),
            Some("23505") if db_err.constraint() == Some(ACTIVE_VERSION_INDEX) => {
                StoreError::Backend(format!("single-active invariant violated: {}", db_err.message()))
            }
            Some("23505") => StoreError::Serialization(db_err.message().to_string()),
            // admin_shutdown, crash_shutdown, cannot_connect_now
            Some("57P01") | Some("57P02") | Some("57P03") => {
                StoreError::Unavailable(db_err.message().to_string())
            }
            _ => StoreError::Backend(db_err.to_string()),
        },
        _ => StoreError::Backend(err.to_string()),
    }
}

/// Classify a failure of `COMMIT` itself.
///
/// A connection lost mid-commit leaves the outcome unknown, so it must not be
/// retried as if nothing had been written.
pub fn commit_error(err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Io(io) => StoreError::Backend(format!("commit outcome unknown: {io}")),
        other => store_error(other),
    }
}
