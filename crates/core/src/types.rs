/// All database primary keys are PostgreSQL BIGSERIAL.
pub type DbId = i64;

/// Per-widget configuration version number (1-based, never reused).
pub type VersionNumber = i32;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;
