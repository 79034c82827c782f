//! Disposable worktrees.

use std::path::{Path, PathBuf};

use crate::git::{GitContext, GitResult};

/// A worktree which lives only for the duration of an operation.
///
/// Any stale worktree at the requested path is force-removed before the new
/// one is added, and the worktree is removed again when the value is dropped,
/// whether the operation using it succeeded or not.
#[derive(Debug)]
pub struct ScopedWorktree {
    ctx: GitContext,
    path: PathBuf,
    worktree: GitContext,
}

impl ScopedWorktree {
    /// Add a detached worktree at the given committish.
    pub fn add_detached<P>(ctx: &GitContext, path: P, committish: &str) -> GitResult<Self>
    where
        P: Into<PathBuf>,
    {
        let path = path.into();
        Self::remove_stale(ctx, &path);

        ctx.git()
            .args(["worktree", "add", "--detach"])
            .arg(&path)
            .arg(committish)
            .run()?;

        Ok(Self::tracked(ctx, path))
    }

    /// Add a worktree on a newly created branch.
    ///
    /// Any prior branch of the same name is deleted first.
    pub fn add_with_branch<P>(
        ctx: &GitContext,
        path: P,
        branch: &str,
        start: &str,
    ) -> GitResult<Self>
    where
        P: Into<PathBuf>,
    {
        let path = path.into();
        Self::remove_stale(ctx, &path);
        ctx.git().args(["branch", "-f", "-D", branch]).try_run();

        ctx.git()
            .args(["worktree", "add", "-f", "-b", branch])
            .arg(&path)
            .arg(start)
            .run()?;

        Ok(Self::tracked(ctx, path))
    }

    fn tracked(ctx: &GitContext, path: PathBuf) -> Self {
        let worktree = GitContext::new(ctx.workdir().join(&path));
        ScopedWorktree {
            ctx: ctx.clone(),
            path,
            worktree,
        }
    }

    fn remove_stale(ctx: &GitContext, path: &Path) {
        ctx.git()
            .args(["worktree", "remove", "--force"])
            .arg(path)
            .try_run();
    }

    /// A context for commands running inside the worktree.
    pub fn ctx(&self) -> &GitContext {
        &self.worktree
    }

    /// The path of the worktree, relative to the owning context.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ScopedWorktree {
    fn drop(&mut self) {
        self.ctx
            .git()
            .args(["worktree", "remove", "--force"])
            .arg(&self.path)
            .try_run();
    }
}

#[cfg(test)]
mod test {
    use crate::git::ScopedWorktree;
    use crate::tests::harness::TestRepo;

    #[test]
    fn test_worktree_removed_on_drop() {
        let repo = TestRepo::new();
        repo.commit_file("some-file", "contents\n", "add a file");

        let path = repo.path().join(".git/temp-worktree");
        {
            let worktree =
                ScopedWorktree::add_detached(repo.ctx(), ".git/temp-worktree", "HEAD").unwrap();
            assert!(path.is_dir());
            assert!(worktree.ctx().workdir().is_dir());
        }
        assert!(!path.exists());
    }

    #[test]
    fn test_stale_worktree_is_replaced() {
        let repo = TestRepo::new();
        repo.commit_file("some-file", "contents\n", "add a file");

        let first =
            ScopedWorktree::add_detached(repo.ctx(), ".git/temp-worktree", "HEAD").unwrap();
        // Leak the guard so the worktree stays behind, as after a crash.
        std::mem::forget(first);

        let second =
            ScopedWorktree::add_detached(repo.ctx(), ".git/temp-worktree", "HEAD").unwrap();
        assert!(second.ctx().workdir().is_dir());
    }
}
