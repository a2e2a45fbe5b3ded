use crate::store::StoreError;
use crate::types::{DbId, VersionNumber};

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: &'static str, id: DbId },

    #[error("Configuration version {version} not found for widget {widget_id}")]
    VersionNotFound {
        widget_id: DbId,
        version: VersionNumber,
    },

    #[error("Widget {widget_id} has no active configuration")]
    NoActiveVersion { widget_id: DbId },

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    /// A storage or lock failure, wrapped with the operation that hit it.
    #[error("Persistence failure during {operation} for widget {widget_id}: {source}")]
    Persistence {
        operation: &'static str,
        widget_id: DbId,
        version: Option<VersionNumber>,
        #[source]
        source: StoreError,
    },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Shorthand for the widget-level not-found case.
    pub fn widget_not_found(widget_id: DbId) -> Self {
        Self::NotFound {
            entity: "Widget",
            id: widget_id,
        }
    }

    pub fn persistence(
        operation: &'static str,
        widget_id: DbId,
        version: Option<VersionNumber>,
        source: StoreError,
    ) -> Self {
        Self::Persistence {
            operation,
            widget_id,
            version,
            source,
        }
    }

    /// Whether a caller may safely retry the whole operation later.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Persistence { source, .. } => source.is_retryable(),
            _ => false,
        }
    }
}
