//! In-memory project catalog.
//!
//! Group names are resolved to upstream ids once at startup
//! ([`resolver`]), the [`sync::CatalogSynchronizer`] rebuilds the whole
//! group → projects mapping on a timer and swaps it into the
//! [`store::SnapshotStore`], and [`query::CatalogQuery`] serves reads to the
//! HTTP layer.

pub mod query;
pub mod resolver;
pub mod store;
pub mod sync;

pub use query::CatalogQuery;
pub use resolver::{resolve_groups, GroupIdMap, ResolveError};
pub use store::SnapshotStore;
pub use sync::{CatalogSynchronizer, RefreshOutcome};

use crate::gitlab::{PartialListing, UpstreamError};

/// Errors returned by catalog queries.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("group not found: {0}")]
    GroupNotFound(String),

    #[error(transparent)]
    Upstream(#[from] UpstreamError),
}

impl<T> From<PartialListing<T>> for CatalogError {
    fn from(partial: PartialListing<T>) -> Self {
        CatalogError::Upstream(partial.error)
    }
}
