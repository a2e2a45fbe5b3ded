//! Query parameter types for API handlers.

use serde::Deserialize;
use widgetcfg_core::types::VersionNumber;
use widgetcfg_core::version::PageRequest;

/// Keyset pagination (`?limit=&after=`). The limit is clamped in
/// [`PageRequest::new`].
#[derive(Debug, Default, Deserialize)]
pub struct HistoryParams {
    pub limit: Option<i64>,
    /// Return versions strictly greater than this one.
    pub after: Option<VersionNumber>,
}

impl HistoryParams {
    pub fn page(&self) -> PageRequest {
        PageRequest::new(self.after, self.limit)
    }
}

/// `?config1=&config2=` for the compare endpoint; `config1` is the old side.
#[derive(Debug, Deserialize)]
pub struct CompareParams {
    pub config1: VersionNumber,
    pub config2: VersionNumber,
}
