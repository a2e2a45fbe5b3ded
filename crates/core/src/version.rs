//! Version records, summaries and lifecycle status.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::payload::ConfigPayload;
use crate::types::{DbId, Timestamp, VersionNumber};

// ---------------------------------------------------------------------------
// Paging
// ---------------------------------------------------------------------------

/// Default number of history entries per page.
pub const DEFAULT_HISTORY_LIMIT: i64 = 100;

/// Maximum number of history entries per page.
pub const MAX_HISTORY_LIMIT: i64 = 500;

/// Clamp a user-provided limit to `[1, max]`, falling back to `default`.
pub fn clamp_limit(limit: Option<i64>, default: i64, max: i64) -> i64 {
    limit.unwrap_or(default).max(1).min(max)
}

/// Keyset page over a widget's versions, ascending by version number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    /// Only return versions strictly greater than this one.
    pub after: Option<VersionNumber>,
    pub limit: i64,
}

impl PageRequest {
    pub fn new(after: Option<VersionNumber>, limit: Option<i64>) -> Self {
        Self {
            after,
            limit: clamp_limit(limit, DEFAULT_HISTORY_LIMIT, MAX_HISTORY_LIMIT),
        }
    }

    /// The first page, with the default limit.
    pub fn first() -> Self {
        Self::new(None, None)
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::first()
    }
}

// ---------------------------------------------------------------------------
// Status / source
// ---------------------------------------------------------------------------

/// Lifecycle position of a version, derived from `is_active` and
/// `activated_at`.
///
/// - `Draft`      -- never been active.
/// - `Active`     -- the version currently served for the widget.
/// - `Superseded` -- was active once, replaced since.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VersionStatus {
    Draft,
    Active,
    Superseded,
}

impl VersionStatus {
    pub fn derive(is_active: bool, activated_at: Option<&Timestamp>) -> Self {
        match (is_active, activated_at) {
            (true, _) => Self::Active,
            (false, Some(_)) => Self::Superseded,
            (false, None) => Self::Draft,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Active => "active",
            Self::Superseded => "superseded",
        }
    }

    /// Only never-activated drafts may be hard-deleted.
    pub fn is_deletable(&self) -> bool {
        matches!(self, Self::Draft)
    }
}

impl std::fmt::Display for VersionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The operation that produced a version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VersionSource {
    /// "Store new configuration": created without activating.
    Draft,
    /// "Update configuration": created and activated in one step.
    Update,
    /// Copy of a historical payload made by a rollback.
    Rollback,
}

impl VersionSource {
    /// String representation for display, logging, and database storage.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Update => "update",
            Self::Rollback => "rollback",
        }
    }

    pub fn parse(value: &str) -> Result<Self, CoreError> {
        match value {
            "draft" => Ok(Self::Draft),
            "update" => Ok(Self::Update),
            "rollback" => Ok(Self::Rollback),
            other => Err(CoreError::Internal(format!(
                "Unknown configuration version source '{other}'"
            ))),
        }
    }
}

impl std::fmt::Display for VersionSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// A stored configuration version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WidgetConfigVersion {
    pub widget_id: DbId,
    pub version: VersionNumber,
    pub payload: ConfigPayload,
    pub is_active: bool,
    pub source: VersionSource,
    pub restored_from: Option<VersionNumber>,
    pub notes: Option<String>,
    pub created_at: Timestamp,
    pub activated_at: Option<Timestamp>,
}

impl WidgetConfigVersion {
    pub fn status(&self) -> VersionStatus {
        VersionStatus::derive(self.is_active, self.activated_at.as_ref())
    }

    /// The payload-free view used by history listings.
    pub fn summary(&self) -> VersionSummary {
        VersionSummary {
            widget_id: self.widget_id,
            version: self.version,
            is_active: self.is_active,
            status: self.status(),
            source: self.source,
            restored_from: self.restored_from,
            notes: self.notes.clone(),
            created_at: self.created_at,
            activated_at: self.activated_at,
        }
    }
}

/// History entry: everything about a version except its payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionSummary {
    pub widget_id: DbId,
    pub version: VersionNumber,
    pub is_active: bool,
    pub status: VersionStatus,
    pub source: VersionSource,
    pub restored_from: Option<VersionNumber>,
    pub notes: Option<String>,
    pub created_at: Timestamp,
    pub activated_at: Option<Timestamp>,
}

/// Input for appending a version. The store assigns number and timestamps.
#[derive(Debug, Clone, PartialEq)]
pub struct NewVersion {
    pub payload: ConfigPayload,
    pub source: VersionSource,
    pub restored_from: Option<VersionNumber>,
    pub notes: Option<String>,
}

impl NewVersion {
    pub fn draft(payload: ConfigPayload) -> Self {
        Self {
            payload,
            source: VersionSource::Draft,
            restored_from: None,
            notes: None,
        }
    }

    pub fn with_source(mut self, source: VersionSource) -> Self {
        self.source = source;
        self
    }

    pub fn with_notes(mut self, notes: Option<String>) -> Self {
        self.notes = notes
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty());
        self
    }
}

/// Result of a guarded hard delete.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    NotFound,
    /// Refused: the version is (or has been) active.
    Retained(VersionStatus),
}
