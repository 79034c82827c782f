//! Ref and remote bookkeeping.

use log::debug;

use crate::git::{CommitId, GitContext, GitResult};

/// The path to the current git checkout, or `None` when the context is not
/// inside a work tree.
pub fn current_checkout_directory(ctx: &GitContext) -> Option<String> {
    ctx.git()
        .args(["rev-parse", "--show-toplevel"])
        .try_output()
        .filter(|path| !path.is_empty())
}

/// Whether the given commit exists in the local object database.
pub fn commit_exists(ctx: &GitContext, commit: &CommitId) -> bool {
    ctx.git()
        .args(["rev-parse", "--verify", "--quiet"])
        .arg(format!("{}^{{commit}}", commit))
        .try_output()
        .is_some()
}

/// List the refs under a prefix.
pub fn for_each_ref(ctx: &GitContext, prefix: &str) -> GitResult<Vec<String>> {
    let output = ctx
        .git()
        .args(["for-each-ref", prefix, "--format=%(refname)"])
        .output()?;

    Ok(output
        .lines()
        .filter(|line| !line.is_empty())
        .map(Into::into)
        .collect())
}

/// Delete every local ref under a prefix.
pub fn delete_refs_under(ctx: &GitContext, prefix: &str) -> GitResult<()> {
    for refname in for_each_ref(ctx, prefix)? {
        debug!(target: "apple-llvm/git", "deleting stale ref {}", refname);
        ctx.git().args(["update-ref", "-d"]).arg(&refname).run()?;
    }

    Ok(())
}

/// Fetch a set of refspecs from a remote.
pub fn fetch<I, S>(ctx: &GitContext, remote: &str, refspecs: I) -> GitResult<()>
where
    I: IntoIterator<Item = S>,
    S: AsRef<std::ffi::OsStr>,
{
    ctx.git().arg("fetch").arg(remote).args(refspecs).run()
}

/// List the remote-tracking branches of the repository.
pub fn remote_branches(ctx: &GitContext) -> GitResult<Vec<String>> {
    let output = ctx
        .git()
        .args(["for-each-ref", "refs/remotes", "--format=%(refname:short)"])
        .output()?;

    Ok(output
        .lines()
        .filter(|line| !line.is_empty())
        .map(Into::into)
        .collect())
}

/// Force a local branch to point at a commit.
pub fn update_branch(ctx: &GitContext, branch: &str, commit: &CommitId) -> GitResult<()> {
    ctx.git()
        .args(["branch", "-f", branch])
        .arg(commit.as_str())
        .run()
}

/// Read a file from a committish, or `None` when the ref or the path does
/// not exist.
pub fn read_file_or_none(ctx: &GitContext, committish: &str, path: &str) -> Option<String> {
    ctx.git()
        .arg("show")
        .arg(format!("{}:{}", committish, path))
        .try_output()
}

#[cfg(test)]
mod test {
    use tempfile::TempDir;

    use crate::git::{self, CommitId, GitContext};
    use crate::tests::harness::TestRepo;

    #[test]
    fn test_current_checkout_directory() {
        let repo = TestRepo::new();
        assert!(git::current_checkout_directory(repo.ctx()).is_some());

        let tmp = TempDir::new().unwrap();
        let outside = GitContext::new(tmp.path());
        assert_eq!(git::current_checkout_directory(&outside), None);
    }

    #[test]
    fn test_commit_exists() {
        let repo = TestRepo::new();
        let head = repo.commit_empty("initial");

        assert!(git::commit_exists(repo.ctx(), &head));
        assert!(!git::commit_exists(
            repo.ctx(),
            &CommitId::new("f0931a1b36c88157ffc25a9ed1295f3addff85b9"),
        ));
    }

    #[test]
    fn test_delete_refs_under_prefix() {
        let repo = TestRepo::new();
        let head = repo.commit_empty("initial");

        repo.ctx()
            .git()
            .args(["update-ref", "refs/am-status/changes/abc_master"])
            .arg(head.as_str())
            .run()
            .unwrap();
        assert_eq!(
            git::for_each_ref(repo.ctx(), "refs/am-status/changes/").unwrap(),
            vec!["refs/am-status/changes/abc_master".to_string()],
        );

        git::delete_refs_under(repo.ctx(), "refs/am-status/changes/").unwrap();
        assert!(git::for_each_ref(repo.ctx(), "refs/am-status/changes/")
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_read_file_or_none() {
        let repo = TestRepo::new();
        repo.commit_file("some-file", "contents\n", "add a file");

        assert_eq!(
            git::read_file_or_none(repo.ctx(), "HEAD", "some-file").as_deref(),
            Some("contents"),
        );
        assert_eq!(
            git::read_file_or_none(repo.ctx(), "HEAD", "no-such-file"),
            None,
        );
    }
}
