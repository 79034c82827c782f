//! The per-component split remotes.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use log::debug;
use termcolor::WriteColor;
use thiserror::Error;

use crate::git::{CommitId, GitContext, GitError, GitResult};
use crate::push::{SplitDir, MONOREPO_SRC_REF_NAME};

/// Errors which may occur when setting up a split remote.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SplitRemoteError {
    /// The bare clone directory could not be created.
    #[error("failed to create the split clone for {}: {}", split_dir, source)]
    CreateCloneDir {
        /// The component the clone is for.
        split_dir: SplitDir,
        /// The source of the error.
        #[source]
        source: io::Error,
    },
    /// Failure to execute a `git` command.
    #[error("git error: {}", source)]
    Git {
        /// The source of the error.
        #[from]
        source: GitError,
    },
}

impl SplitRemoteError {
    fn create_clone_dir(split_dir: SplitDir, source: io::Error) -> Self {
        SplitRemoteError::CreateCloneDir {
            split_dir,
            source,
        }
    }
}

/// Whether the repository already has a remote with the wanted URL.
///
/// A remote of the same name recorded with a different URL is removed so it
/// can be re-added.
fn has_existing_remote(ctx: &GitContext, remote_name: &str, remote_url: &str) -> GitResult<bool> {
    let url = ctx
        .git()
        .args(["remote", "get-url", remote_name])
        .try_output();
    match url {
        Some(url) if url == remote_url => Ok(true),
        Some(_) => {
            ctx.git().args(["remote", "remove", remote_name]).run()?;
            Ok(false)
        },
        None => Ok(false),
    }
}

/// A split repository clone and the remotes it pulls from and pushes to.
///
/// The split remote is cloned into a bare repository inside the monorepo's
/// `.git` directory, and a local file-path remote back at the monorepo lets
/// it fetch the commits that are about to be projected. The separation keeps
/// the monorepo from ever fetching a split remote itself.
#[derive(Debug)]
pub struct SplitRemote {
    /// The component this remote serves.
    pub split_dir: SplitDir,
    /// The URL of the split repository.
    pub remote_url: String,
    /// The destination branch in the split repository.
    pub destination_branch: String,
    clone_ctx: GitContext,
    monorepo_remote_url: PathBuf,
}

impl SplitRemote {
    /// Set up the bare clone for a component.
    pub fn new(
        monorepo_root: &Path,
        split_dir: &SplitDir,
        remote_url: &str,
        destination_branch: &str,
    ) -> Result<Self, SplitRemoteError> {
        let clone_dir = monorepo_root
            .join(".git")
            .join(format!("apple-llvm-split-{}.git", split_dir.config_key()));
        if !clone_dir.is_dir() {
            fs::create_dir_all(&clone_dir)
                .map_err(|err| SplitRemoteError::create_clone_dir(split_dir.clone(), err))?;
            let clone_ctx = GitContext::new(&clone_dir);
            clone_ctx.git().args(["init", "--bare"]).output()?;
        }

        Ok(SplitRemote {
            split_dir: split_dir.clone(),
            remote_url: remote_url.into(),
            destination_branch: destination_branch.into(),
            clone_ctx: GitContext::new(&clone_dir),
            monorepo_remote_url: monorepo_root.into(),
        })
    }

    /// A context for commands running inside the bare clone.
    pub fn ctx(&self) -> &GitContext {
        &self.clone_ctx
    }

    /// Fetch the destination branch from the split repository.
    pub fn update_remote(&self) -> GitResult<()> {
        if !has_existing_remote(&self.clone_ctx, "origin", &self.remote_url)? {
            self.clone_ctx
                .git()
                .args(["remote", "add", "origin"])
                .arg(&self.remote_url)
                .run()?;
        }
        debug!(
            target: "apple-llvm/push",
            "fetching the remote for {}",
            self.split_dir,
        );
        self.clone_ctx
            .git()
            .args(["fetch", "--no-tags", "origin"])
            .arg(&self.destination_branch)
            .show_stderr()
            .run()
    }

    /// Fetch the pinned source commit from the monorepo.
    pub fn update_mono_remote(&self) -> GitResult<()> {
        let mono_url = self.monorepo_remote_url.display().to_string();
        if !has_existing_remote(&self.clone_ctx, "mono", &mono_url)? {
            self.clone_ctx
                .git()
                .args(["remote", "add", "mono"])
                .arg(&mono_url)
                .run()?;
        }
        self.clone_ctx
            .git()
            .args(["fetch", "mono", MONOREPO_SRC_REF_NAME])
            .run()
    }

    /// Push a commit to the destination branch of the split repository.
    pub fn push(
        &self,
        commit: &CommitId,
        dry_run: bool,
        out: &mut dyn WriteColor,
    ) -> GitResult<()> {
        crate::utils::echo_bold(
            out,
            &format!("\nPushing to {}:", self.split_dir.user_name()),
        );
        if dry_run {
            let _ = writeln!(out, "🛑 dry run, stopping before pushing.");
            return Ok(());
        }
        self.clone_ctx
            .git()
            .args(["push", "origin"])
            .arg(format!("{}:{}", commit, self.destination_branch))
            .show_stderr()
            .run()
    }
}

/// Whether a remote branch is one of the monorepo's known tracking branches.
///
/// These branches bound the commit graph that gets pushed.
pub fn is_known_tracking_branch(remote: &str, branch: &str) -> bool {
    let remote_prefix = format!("{}/", remote);
    let rest = match branch.strip_prefix(&remote_prefix) {
        Some(rest) => rest,
        None => return false,
    };
    let first = rest.split('/').next().unwrap_or(rest);
    matches!(first, "llvm" | "apple" | "internal" | "swift")
}

#[cfg(test)]
mod test {
    use crate::push::remote::is_known_tracking_branch;

    #[test]
    fn test_known_tracking_branches() {
        assert!(is_known_tracking_branch("origin", "origin/llvm/master"));
        assert!(is_known_tracking_branch("origin", "origin/internal/master"));
        assert!(is_known_tracking_branch("origin", "origin/swift/master-next"));
        assert!(is_known_tracking_branch("origin", "origin/apple/main"));

        assert!(!is_known_tracking_branch("origin", "origin/feature/thing"));
        assert!(!is_known_tracking_branch("origin", "other/llvm/master"));
        assert!(!is_known_tracking_branch("origin", "llvm/master"));
    }
}
