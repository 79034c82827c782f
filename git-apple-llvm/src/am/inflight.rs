//! The in-flight merge registry.
//!
//! The automerger records every merge it is currently processing as a ref
//! named `refs/am/changes/<commit>_<destination-branch>` on the remote. This
//! module mirrors those refs locally and parses them into a per-destination
//! map.

use std::collections::HashMap;

use log::{debug, warn};
use thiserror::Error;

use crate::git::{self, CommitId, GitContext, GitError};

/// The remote ref namespace the automerger publishes in-flight merges under.
const AM_PREFIX: &str = "refs/am/changes/";
/// The local namespace the in-flight refs are mirrored into.
const AM_STATUS_PREFIX: &str = "refs/am-status/changes/";

/// Errors which may occur when gathering in-flight merges.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum InflightError {
    /// Failure to fetch the in-flight refs from the remote.
    #[error("failed to fetch in-flight merges from {}: {}", remote, source)]
    Fetch {
        /// The remote that was fetched.
        remote: String,
        /// The source of the error.
        #[source]
        source: GitError,
    },
    /// Failure to execute a `git` command.
    #[error("git error: {}", source)]
    Git {
        /// The source of the error.
        #[from]
        source: GitError,
    },
}

impl InflightError {
    fn fetch(remote: String, source: GitError) -> Self {
        InflightError::Fetch {
            remote,
            source,
        }
    }
}

/// In-flight merges, grouped by destination branch.
pub type InflightMerges = HashMap<String, Vec<CommitId>>;

/// Fetch the refs created by the automerger and group the in-flight merges
/// they describe by destination branch.
///
/// The local mirror refs are deleted and re-fetched on every call so that
/// force-pushed upstream refs cannot leave stale state behind. Refs that do
/// not parse as `<40-hex-commit>_<destination>` are skipped with a warning.
pub fn find_inflight_merges(ctx: &GitContext, remote: &str) -> Result<InflightMerges, InflightError> {
    git::delete_refs_under(ctx, AM_STATUS_PREFIX)?;

    git::fetch(
        ctx,
        remote,
        [format!("{}*:{}*", AM_PREFIX, AM_STATUS_PREFIX)],
    )
    .map_err(|err| InflightError::fetch(remote.into(), err))?;

    let mut inflight_merges = InflightMerges::new();
    for refname in git::for_each_ref(ctx, AM_STATUS_PREFIX)? {
        let merge_name = match refname.strip_prefix(AM_STATUS_PREFIX) {
            Some(name) => name,
            None => continue,
        };

        // The commit hash ends at the first underscore; destination branches
        // may contain further underscores or slashes.
        let (commit, dest_branch) = match merge_name.split_once('_') {
            Some(parts) => parts,
            None => {
                warn!(
                    target: "apple-llvm/am",
                    "ignoring malformed in-flight ref {}",
                    refname,
                );
                continue;
            },
        };

        let commit = CommitId::new(commit);
        if !commit.is_full_hash() {
            warn!(
                target: "apple-llvm/am",
                "ignoring in-flight ref {} with a malformed commit hash",
                refname,
            );
            continue;
        }

        inflight_merges
            .entry(dest_branch.to_string())
            .or_insert_with(Vec::new)
            .push(commit);
    }

    for (dest, commits) in &inflight_merges {
        debug!(target: "apple-llvm/am", "in-flight {}: {:?}", dest, commits);
    }

    Ok(inflight_merges)
}
