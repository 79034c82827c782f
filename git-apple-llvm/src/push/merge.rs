//! Forwarding a regrafted commit graph onto the destination split branch.

use thiserror::Error;

use crate::git::{CommitId, GitContext, GitError, ScopedWorktree};
use crate::push::{CommitGraph, SplitDir};

/// The strategy used to land the regrafted commits on the destination
/// branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeStrategy {
    /// Only fast-forward the destination.
    FastForwardOnly,
    /// Rebase the commits onto the destination; refuse graphs with merges.
    Rebase,
    /// Rebase linear graphs; create a merge commit otherwise.
    RebaseOrMerge,
}

impl MergeStrategy {
    /// Parse a strategy from its command-line spelling.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "ff-only" => Some(MergeStrategy::FastForwardOnly),
            "rebase" => Some(MergeStrategy::Rebase),
            "rebase-or-merge" => Some(MergeStrategy::RebaseOrMerge),
            _ => None,
        }
    }
}

/// The destination branch cannot take the regrafted commits under the
/// requested strategy.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ImpossibleMergeError {
    /// The destination could not be fast-forwarded.
    #[error("unable to fast forward: {}", source)]
    FastForward {
        /// The source of the error.
        #[source]
        source: GitError,
    },
    /// A graph containing merge commits cannot be rebased.
    #[error("unable to rebase history with merges")]
    RebaseWithMerges {},
    /// The merge commit could not be created.
    #[error("unable to merge: {}", source)]
    Merge {
        /// The source of the error.
        #[source]
        source: GitError,
    },
}

impl ImpossibleMergeError {
    fn fast_forward(source: GitError) -> Self {
        ImpossibleMergeError::FastForward {
            source,
        }
    }

    fn rebase_with_merges() -> Self {
        ImpossibleMergeError::RebaseWithMerges {}
    }

    fn merge(source: GitError) -> Self {
        ImpossibleMergeError::Merge {
            source,
        }
    }
}

/// Errors which may occur when forwarding a commit graph.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum MergeError {
    /// The strategy cannot land the graph on the destination.
    #[error("{}", source)]
    Impossible {
        /// The source of the error.
        #[from]
        source: ImpossibleMergeError,
    },
    /// Failure to execute a `git` command.
    #[error("git error: {}", source)]
    Git {
        /// The source of the error.
        #[from]
        source: GitError,
    },
}

/// Merge or rebase a regrafted split commit graph on top of the destination
/// split branch.
///
/// The work happens on a temporary branch in a disposable worktree which is
/// removed again on every exit path. Returns the commit the destination
/// branch should be pushed to.
pub fn merge_commit_graph_with_top_of_branch(
    ctx: &GitContext,
    commit_graph: &CommitGraph,
    split_dir: &SplitDir,
    destination_branch: &str,
    strategy: MergeStrategy,
) -> Result<CommitId, MergeError> {
    let split_worktree_path = format!(
        ".git/apple-llvm-push-checkout-{}",
        split_dir.config_key(),
    );
    let branch_name = format!(
        "temp-apple-llvm-push-merged-{}",
        split_dir.config_key(),
    );

    let worktree = ScopedWorktree::add_with_branch(
        ctx,
        &split_worktree_path,
        &branch_name,
        destination_branch,
    )?;
    let source = commit_graph.source_commit();

    // Try the fast-forward only first.
    let fast_forward = worktree
        .ctx()
        .git()
        .args(["merge", "--ff-only"])
        .arg(source.as_str())
        .run();
    if let Err(err) = fast_forward {
        if strategy == MergeStrategy::FastForwardOnly {
            return Err(ImpossibleMergeError::fast_forward(err).into());
        }
    }
    if strategy != MergeStrategy::FastForwardOnly {
        if !commit_graph.has_merges(ctx)? {
            worktree
                .ctx()
                .git()
                .args(["rebase", "--onto"])
                .arg(&branch_name)
                .arg(&branch_name)
                .arg(source.as_str())
                .run()?;
        } else if strategy == MergeStrategy::Rebase {
            return Err(ImpossibleMergeError::rebase_with_merges().into());
        } else {
            // Fall back to a merge commit.
            worktree
                .ctx()
                .git()
                .arg("merge")
                .arg(source.as_str())
                .run()
                .map_err(ImpossibleMergeError::merge)?;
        }
    }

    let head = worktree
        .ctx()
        .git()
        .args(["rev-parse", "HEAD"])
        .output()?;
    Ok(CommitId::new(head))
}
