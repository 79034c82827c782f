//! Regrafting a monorepo commit graph onto a split repository.

use itertools::Itertools;
use log::debug;
use thiserror::Error;

use crate::git::{self, CommitId, GitContext, GitError};
use crate::push::{compute_commit_graph, CommitGraph, SplitDir, MONOREPO_SPLIT_DIRS};
use crate::utils::TrailerRef;

/// Errors which may occur when regrafting a commit graph.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RegraftError {
    /// A root of the commit graph has no corresponding split root.
    #[error("monorepo root {} has no matching split root", root)]
    NoSplitRoot {
        /// The monorepo root commit that could not be remapped.
        root: CommitId,
    },
    /// The recorded split root is not a commit in the local object database.
    #[error("the split root recorded for monorepo root {} is missing", root)]
    MissingSplitRoot {
        /// The monorepo root commit whose split root is missing.
        root: CommitId,
    },
    /// The rewritten graph does not touch the same paths as the input.
    ///
    /// This should not happen. Please report an issue if this is returned.
    #[error(
        "INTERNAL ERROR: the regrafted graph for {} changes {} paths, the source changes {}",
        split_dir,
        regrafted,
        original
    )]
    Verification {
        /// The split repository being regrafted onto.
        split_dir: SplitDir,
        /// The number of changed paths in the regrafted graph.
        regrafted: usize,
        /// The number of changed paths in the source graph.
        original: usize,
    },
    /// Failure to execute a `git` command.
    #[error("git error: {}", source)]
    Git {
        /// The source of the error.
        #[from]
        source: GitError,
    },
}

impl RegraftError {
    fn no_split_root(root: CommitId) -> Self {
        RegraftError::NoSplitRoot {
            root,
        }
    }

    fn missing_split_root(root: CommitId) -> Self {
        RegraftError::MissingSplitRoot {
            root,
        }
    }

    fn verification(split_dir: SplitDir, regrafted: usize, original: usize) -> Self {
        RegraftError::Verification {
            split_dir,
            regrafted,
            original,
        }
    }
}

type RegraftResult<T> = Result<T, RegraftError>;

/// The base commit in the split repository that a monorepo base commit
/// derives from.
///
/// The monorepo commit's first-parent history is scanned for the most recent
/// commit projected from the split repository; its recorded split commit is
/// the base.
pub fn find_base_split_commit(
    ctx: &GitContext,
    split_dir: &SplitDir,
    base_commit: &CommitId,
) -> Option<CommitId> {
    let mono_base_commit = ctx
        .git()
        .args(["rev-list", "--first-parent", "-n", "1", "--grep"])
        .arg(format!(
            "^apple-llvm-split-dir: {}/*$",
            split_dir.config_key(),
        ))
        .arg(base_commit.as_str())
        .try_output()
        .filter(|found| !found.is_empty())?;

    let trailers = ctx
        .git()
        .args(["rev-list", "-n", "1", "--format=%(trailers:only)"])
        .arg(&mono_base_commit)
        .try_output()?;
    TrailerRef::extract(&trailers)
        .iter()
        .find(|trailer| trailer.token == crate::utils::SPLIT_COMMIT_TRAILER)
        .map(|trailer| CommitId::new(trailer.value))
}

/// Rewrite a monorepo commit graph into the split repository's history.
///
/// Every commit's tree is restricted to the split directory (or, for the
/// monorepo root, stripped of all component directories), and every monorepo
/// root is replaced with its recorded split base commit. Commits that become
/// empty are pruned; `None` is returned when nothing is left to push.
pub fn regraft_commit_graph_onto_split_repo(
    ctx: &GitContext,
    commit_graph: &CommitGraph,
    split_dir: &SplitDir,
) -> RegraftResult<Option<CommitGraph>> {
    let mut base_split_commits: Vec<(CommitId, CommitId)> = Vec::new();
    for root in &commit_graph.roots {
        let base_split_commit = find_base_split_commit(ctx, split_dir, root)
            .ok_or_else(|| RegraftError::no_split_root(root.clone()))?;
        if !git::commit_exists(ctx, &base_split_commit) {
            return Err(RegraftError::missing_split_root(root.clone()));
        }
        base_split_commits.push((root.clone(), base_split_commit));
    }

    // The index filter rewrites every tree to the split directory's view.
    let index_filter = match split_dir {
        SplitDir::Root => {
            format!(
                "git rm -r --cached --ignore-unmatch {}",
                MONOREPO_SPLIT_DIRS.iter().format(" "),
            )
        },
        SplitDir::Dir(dir) => {
            format!("git read-tree $(git rev-parse $GIT_COMMIT:{})", dir)
        },
    };
    // The parent filter replaces monorepo roots with their split bases.
    let parent_filter = format!(
        "cat | sed {}",
        base_split_commits
            .iter()
            .map(|(mono, split)| format!("-e s,{},{},", mono, split))
            .format(" "),
    );

    // Set up a work branch that should be rewritten.
    let branch_name = format!("temp-apple-llvm-push-{}", split_dir.config_key());
    git::update_branch(ctx, &branch_name, commit_graph.source_commit())?;

    // Rewrite the branch. `-f` overwrites the backup ref a previous run left
    // behind.
    let rewrite = ctx
        .git()
        .args(["filter-branch", "-f", "--prune-empty", "--parent-filter"])
        .arg(&parent_filter)
        .arg("--index-filter")
        .arg(&index_filter)
        .arg(&branch_name)
        .arg("--not")
        .args(commit_graph.roots.iter().map(CommitId::as_str))
        .env("FILTER_BRANCH_SQUELCH_WARNING", "1")
        .output();
    if let Err(err) = rewrite {
        // Nothing was rewritten!
        if let GitError::Command {
            ref stderr,
            ..
        } = err
        {
            if stderr.contains("nothing to rewrite") {
                debug!(target: "apple-llvm/push", "nothing to rewrite for {}", split_dir);
                return Ok(None);
            }
        }
        return Err(err.into());
    }

    // Compute the updated commit graph.
    let rev_list = ctx
        .git()
        .args(["rev-list", "--boundary"])
        .arg(&branch_name)
        .arg("--not")
        .args(base_split_commits.iter().map(|(_, split)| split.as_str()))
        .output()?;
    let result = match compute_commit_graph(&rev_list) {
        Some(graph) => graph,
        None => return Ok(None),
    };

    // Verify the integrity of the regraft by checking changed files.
    let original_changed_files = commit_graph.compute_changed_files(ctx, Some(split_dir))?;
    let regrafted_changed_files = result.compute_changed_files(ctx, None)?;
    if original_changed_files != regrafted_changed_files {
        return Err(RegraftError::verification(
            split_dir.clone(),
            regrafted_changed_files.len(),
            original_changed_files.len(),
        ));
    }

    Ok(Some(result))
}
