//! Startup resolution of logical group names to upstream group ids.

use std::collections::BTreeMap;

use tracing::info;

use crate::gitlab::{RemoteCatalog, UpstreamError};
use crate::models::Subgroup;

/// Logical group name → upstream numeric group id.
pub type GroupIdMap = BTreeMap<String, u64>;

#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("failed to list subgroups of group {group_id}: {source}")]
    Upstream {
        group_id: u64,
        source: UpstreamError,
    },

    #[error("subgroup name(s) not found: {}", .missing.join(", "))]
    Unresolved { missing: Vec<String> },
}

/// Resolve every configured group name against the subgroups of `parent_id`.
///
/// Fails if the listing fails or if any name has no exact match.
pub async fn resolve_groups(
    remote: &dyn RemoteCatalog,
    parent_id: u64,
    names: &[String],
) -> Result<GroupIdMap, ResolveError> {
    let subgroups = remote
        .list_subgroups(parent_id)
        .await
        .map_err(|partial| ResolveError::Upstream {
            group_id: parent_id,
            source: partial.error,
        })?;

    let map = match_subgroups(&subgroups, names)?;
    info!(parent_id, groups = ?map, "resolved group ids");
    Ok(map)
}

/// Match configured names against a subgroup listing by exact name.
pub fn match_subgroups(subgroups: &[Subgroup], names: &[String]) -> Result<GroupIdMap, ResolveError> {
    let mut map = GroupIdMap::new();
    let mut missing = Vec::new();

    for name in names {
        match subgroups.iter().find(|g| &g.name == name) {
            Some(group) => {
                map.insert(name.clone(), group.id);
            }
            None => missing.push(name.clone()),
        }
    }

    if missing.is_empty() {
        Ok(map)
    } else {
        Err(ResolveError::Unresolved { missing })
    }
}
