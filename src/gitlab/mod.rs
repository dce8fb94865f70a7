//! Remote catalog client for the upstream GitLab API.
//!
//! The [`RemoteCatalog`] trait is the seam between the catalog core and the
//! network: the synchronizer, the group resolver and the query façade only
//! ever talk to a `dyn RemoteCatalog`, so they can be exercised against
//! in-memory fakes.

mod client;
#[cfg(test)]
pub mod testing;

pub use client::GitLabClient;

use std::collections::BTreeMap;

use axum::http::HeaderMap;
use chrono::{DateTime, Utc};

use crate::models::{Commit, Project, Subgroup, Tag};

/// Hard ceiling on the number of pages followed by any listing.
pub const MAX_PAGES: u32 = 100;

/// Page size requested from the upstream (the GitLab maximum).
pub const PER_PAGE: u32 = 100;

/// Errors raised while talking to the upstream API.
#[derive(Debug, thiserror::Error)]
pub enum UpstreamError {
    #[error("upstream request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("upstream returned {status} for {path}: {message}")]
    Status {
        status: u16,
        path: String,
        message: String,
    },

    #[error("pipeline {0} has no jobs")]
    NoJobs(u64),

    #[error("invalid GitLab API URL: {0}")]
    InvalidBaseUrl(String),
}

/// A listing that was aborted part-way through.
///
/// Carries the items gathered before the failing page so callers can decide
/// what to do with them. The catalog never publishes partial listings.
#[derive(Debug)]
pub struct PartialListing<T> {
    pub items: Vec<T>,
    pub error: UpstreamError,
}

/// Result of a paginated listing.
pub type Listing<T> = Result<Vec<T>, PartialListing<T>>;

/// Parameters of a pipeline trigger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineTrigger {
    pub git_ref: String,
    pub variables: BTreeMap<String, String>,
}

/// Read-only catalog operations plus the pipeline passthrough.
#[async_trait::async_trait]
pub trait RemoteCatalog: Send + Sync {
    /// List the direct subgroups of a group.
    async fn list_subgroups(&self, group_id: u64) -> Listing<Subgroup>;

    /// List the projects of a group.
    async fn list_group_projects(&self, group_id: u64) -> Listing<Project>;

    /// Look up a single project by its full namespace path.
    async fn get_project(&self, path: &str) -> Result<Project, UpstreamError>;

    /// List the commits of a project, optionally only those after `since`.
    async fn list_commits(&self, project_id: u64, since: Option<DateTime<Utc>>)
        -> Listing<Commit>;

    /// List the tags of a project in upstream response order.
    async fn list_tags(&self, project_id: u64) -> Listing<Tag>;

    /// Fetch the first job of a pipeline as an opaque JSON object.
    async fn first_pipeline_job(
        &self,
        project_id: u64,
        pipeline_id: u64,
    ) -> Result<serde_json::Value, UpstreamError>;

    /// Trigger a pipeline and return the new pipeline id.
    async fn trigger_pipeline(
        &self,
        project_id: u64,
        trigger: &PipelineTrigger,
    ) -> Result<u64, UpstreamError>;
}

/// Work out which page to fetch after `current`, if any.
///
/// `X-Next-Page` is authoritative when present (empty on the last page).
/// Otherwise `X-Total-Pages` is used. Without either header the listing ends.
pub fn next_page(headers: &HeaderMap, current: u32) -> Option<u32> {
    if let Some(next) = headers.get("x-next-page") {
        let next = next.to_str().ok()?.trim();
        if next.is_empty() {
            return None;
        }
        return next.parse().ok().filter(|n| *n > current);
    }

    let total: u32 = headers
        .get("x-total-pages")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())?;

    (current < total).then_some(current + 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (k, v) in pairs {
            map.insert(*k, HeaderValue::from_static(v));
        }
        map
    }

    #[test]
    fn test_next_page_header_wins() {
        let h = headers(&[("x-next-page", "3"), ("x-total-pages", "2")]);
        assert_eq!(next_page(&h, 2), Some(3));
    }

    #[test]
    fn test_empty_next_page_means_last() {
        let h = headers(&[("x-next-page", ""), ("x-total-pages", "9")]);
        assert_eq!(next_page(&h, 4), None);
    }

    #[test]
    fn test_total_pages_fallback() {
        let h = headers(&[("x-total-pages", "3")]);
        assert_eq!(next_page(&h, 1), Some(2));
        assert_eq!(next_page(&h, 2), Some(3));
        assert_eq!(next_page(&h, 3), None);
    }

    #[test]
    fn test_no_headers_stops() {
        assert_eq!(next_page(&HeaderMap::new(), 1), None);
    }

    #[test]
    fn test_backwards_next_page_is_ignored() {
        let h = headers(&[("x-next-page", "1")]);
        assert_eq!(next_page(&h, 1), None);
    }
}
