//! Core automerger operations.

use std::fmt::{self, Display};

use crate::git::{CommitId, GitContext, GitResult, ScopedWorktree};

/// The path of the worktree used for merge-conflict probes.
const TEMP_WORKTREE_PATH: &str = ".git/temp-worktree";

/// The CI state of a commit being merged into a target branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitState {
    /// The merge has not been picked up yet.
    New,
    /// The merge conflicts with the target branch.
    Conflict,
    /// The merge is waiting on CI.
    Pending,
    /// CI has started building the merge.
    Started,
    /// CI has passed.
    Passed,
    /// CI has failed.
    Failed,
    /// CI has failed, and the failure was already reported.
    KnownFailed,
}

impl CommitState {
    /// All commit states, in their canonical order.
    pub fn all() -> &'static [CommitState] {
        &[
            CommitState::New,
            CommitState::Conflict,
            CommitState::Pending,
            CommitState::Started,
            CommitState::Passed,
            CommitState::Failed,
            CommitState::KnownFailed,
        ]
    }

    /// The state's wire representation.
    pub fn as_str(self) -> &'static str {
        match self {
            CommitState::New => "NEW",
            CommitState::Conflict => "CONFLICT",
            CommitState::Pending => "PENDING",
            CommitState::Started => "STARTED",
            CommitState::Passed => "PASSED",
            CommitState::Failed => "FAILED",
            CommitState::KnownFailed => "KNOWN_FAILED",
        }
    }

    /// Parse a state from its wire representation.
    pub fn parse(value: &str) -> Option<Self> {
        CommitState::all()
            .iter()
            .copied()
            .find(|state| state.as_str() == value)
    }
}

impl Display for CommitState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Compute the backlog of commits on an upstream branch that have not been
/// merged into a target branch.
///
/// Commits are returned in `git log` order (the head of the upstream first),
/// following first parents only. Returns `None` when the target is up to
/// date.
pub fn compute_unmerged_commits(
    ctx: &GitContext,
    remote: &str,
    target_branch: &str,
    upstream_branch: &str,
) -> GitResult<Option<Vec<CommitId>>> {
    let output = ctx
        .git()
        .args(["log", "--first-parent", "--pretty=format:%H", "--no-patch"])
        .arg(format!(
            "{remote}/{target}..{remote}/{upstream}",
            remote = remote,
            target = target_branch,
            upstream = upstream_branch,
        ))
        .output()?;

    if output.is_empty() {
        return Ok(None);
    }

    Ok(Some(output.lines().map(CommitId::new).collect()))
}

/// Whether merging a commit into the target branch would conflict.
///
/// The probe happens in a disposable worktree detached at the target branch;
/// the worktree is removed again whether the merge succeeds or not, and no
/// refs are created.
pub fn has_merge_conflict(
    ctx: &GitContext,
    commit: &CommitId,
    target_branch: &str,
    remote: &str,
) -> GitResult<bool> {
    let worktree = ScopedWorktree::add_detached(
        ctx,
        TEMP_WORKTREE_PATH,
        &format!("{}/{}", remote, target_branch),
    )?;

    let merge = worktree
        .ctx()
        .git()
        .args(["merge", "--no-commit"])
        .arg(commit.as_str())
        .try_output();

    Ok(merge.is_none())
}

/// Whether a commit from the secondary upstream edge is still blocked by the
/// primary edge.
///
/// The commit may only be merged once its merge base with the common ancestor
/// has already arrived in the target through the primary upstream edge.
pub fn is_secondary_edge_commit_blocked_by_primary_edge(
    ctx: &GitContext,
    upstream_commit: &CommitId,
    common_ancestor_ref: &str,
    target_ref: &str,
) -> GitResult<bool> {
    let merge_base = ctx
        .git()
        .arg("merge-base")
        .arg(upstream_commit.as_str())
        .arg(common_ancestor_ref)
        .output()?;

    // Check to see if the merge base is already in the target branch.
    let branches = ctx
        .git()
        .args(["branch", "-r", target_ref, "--contains"])
        .arg(&merge_base)
        .arg("--format=%(refname)")
        .output()?;
    if branches.is_empty() {
        return Ok(true);
    }

    Ok(branches != format!("refs/remotes/{}", target_ref))
}

#[cfg(test)]
mod test {
    use crate::am::{self, CommitState};
    use crate::tests::harness::TestRepo;

    #[test]
    fn test_commit_state_round_trip() {
        for &state in CommitState::all() {
            assert_eq!(CommitState::parse(state.as_str()), Some(state));
        }
        assert_eq!(CommitState::parse("UNHEARD_OF"), None);
    }

    #[test]
    fn test_compute_unmerged_commits() {
        let upstream = TestRepo::new_with_branch("master");
        upstream.commit_file("some-file", "contents\n", "base");
        upstream.branch("upstream", "HEAD");
        upstream.checkout("upstream");
        let ahead = upstream.commit_empty("ahead of master");

        let clone = TestRepo::clone_of(&upstream);
        let unmerged =
            am::compute_unmerged_commits(clone.ctx(), "origin", "master", "upstream").unwrap();
        assert_eq!(unmerged, Some(vec![ahead]));

        assert_eq!(
            am::compute_unmerged_commits(clone.ctx(), "origin", "upstream", "master").unwrap(),
            None,
        );
    }

    #[test]
    fn test_merge_conflict_probe_cleans_up() {
        let upstream = TestRepo::new_with_branch("master");
        upstream.commit_file("foo", "foo", "base");
        upstream.branch("upstream", "HEAD");
        upstream.checkout("upstream");
        let conflicting = upstream.commit_file("foo", "bar", "rewrite foo");

        let clone = TestRepo::clone_of(&upstream);
        clone
            .ctx()
            .git()
            .args(["checkout", "master"])
            .run()
            .unwrap();

        let worktree_path = clone.path().join(".git/temp-worktree");
        assert!(am::has_merge_conflict(clone.ctx(), &conflicting, "master", "origin").unwrap());
        assert!(!worktree_path.exists());

        // A trivial merge reports no conflict, and also cleans up.
        let clean = clone.commit_file_on_branch("other-file", "ok\n", "clean", "origin/master");
        assert!(!am::has_merge_conflict(clone.ctx(), &clean, "master", "origin").unwrap());
        assert!(!worktree_path.exists());
    }
}
