//! Resolving branches to their remote tracking information.

use crate::git::{CommitId, GitContext};

/// A reference to a git branch that is tracked remotely.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackedBranchRef {
    /// The name of the remote the branch is tracked on.
    pub remote_name: String,
    /// The URL of the remote.
    pub remote_url: String,
    /// The branch name on the remote.
    pub branch_name: String,
    /// The hash at the head of the remote branch.
    pub head_hash: CommitId,
}

/// Resolve a branch name to its tracked remote branch.
///
/// Branches without an upstream are accepted when the name itself already
/// carries a `remote/branch` shape. The remote is consulted with `ls-remote`
/// so the returned head is current, not the local tracking ref.
pub fn tracked_branch_ref(ctx: &GitContext, branch_name: &str) -> Option<TrackedBranchRef> {
    let tracking_branch_name = ctx
        .git()
        .args(["rev-parse", "--abbrev-ref", "--symbolic-full-name"])
        .arg(format!("{}@{{u}}", branch_name))
        .try_output()
        .filter(|name| !name.is_empty());

    let tracking_branch_name = match tracking_branch_name {
        Some(name) => name,
        None => {
            if branch_name.contains('/') {
                branch_name.into()
            } else {
                return None;
            }
        },
    };

    let (remote_name, remote_branch) = tracking_branch_name.split_once('/')?;
    let output = ctx
        .git()
        .args(["ls-remote", "--exit-code", remote_name, remote_branch])
        .try_output()?;

    let mut hash_refname = output.split_whitespace();
    let hash = hash_refname.next()?;
    let refname = hash_refname.next()?;
    if refname != format!("refs/heads/{}", remote_branch) {
        return None;
    }

    let remote_url = ctx
        .git()
        .args(["remote", "get-url", remote_name])
        .try_output()?;

    Some(TrackedBranchRef {
        remote_name: remote_name.into(),
        remote_url,
        branch_name: remote_branch.into(),
        head_hash: CommitId::new(hash),
    })
}

#[cfg(test)]
mod test {
    use crate::git;
    use crate::tests::harness::TestRepo;

    #[test]
    fn test_tracked_branch_resolution() {
        let upstream = TestRepo::new();
        upstream.commit_file("some-file", "contents\n", "add a file");
        let head = upstream.rev_parse("HEAD");
        upstream.branch("main-branch", "HEAD");

        let clone = TestRepo::clone_of(&upstream);
        clone
            .ctx()
            .git()
            .args(["checkout", "main-branch"])
            .run()
            .unwrap();

        let tracked = git::tracked_branch_ref(clone.ctx(), "origin/main-branch").unwrap();
        assert_eq!(tracked.remote_name, "origin");
        assert_eq!(tracked.branch_name, "main-branch");
        assert_eq!(tracked.head_hash, head);

        assert_eq!(git::tracked_branch_ref(clone.ctx(), "untracked"), None);
    }
}
