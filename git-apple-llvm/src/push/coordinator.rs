//! Orchestrating a push to the split repositories.

use std::collections::BTreeMap;
use std::path::PathBuf;

use itertools::Itertools;
use log::{info, warn};
use termcolor::WriteColor;
use thiserror::Error;

use crate::git::{self, CommitId, GitContext, GitError};
use crate::push::remote::{is_known_tracking_branch, SplitRemoteError};
use crate::push::{
    self, compute_commit_graph, CommitGraph, ImpossibleMergeError, MergeError, MergeStrategy,
    PushConfig, PushConfigError, RegraftError, SplitDir, SplitRemote,
};
use crate::utils::{echo, echo_bold};

/// The default bound on how many commits one push may carry.
const DEFAULT_PUSH_LIMIT: usize = 50;

/// Errors which may occur when pushing to the split repositories.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum PushError {
    /// The current directory is not inside a git repository.
    #[error("not a git repository")]
    NotARepository {},
    /// The refspec is not of the form `<source>:<destination>`.
    #[error(
        "Git refspec \"{}\" is invalid (expected <source>:<destination>)",
        refspec
    )]
    InvalidRefspec {
        /// The refspec as given.
        refspec: String,
    },
    /// The source side of the refspec does not resolve.
    #[error("source Git refspec \"{}\" is invalid", source_ref)]
    InvalidSourceRef {
        /// The source ref as given.
        source_ref: String,
    },
    /// The destination side of the refspec does not resolve.
    #[error("destination Git refspec \"{}\" is invalid", dest_ref)]
    InvalidDestRef {
        /// The destination ref as given.
        dest_ref: String,
    },
    /// The destination has no push configuration.
    #[error("destination Git refspec \"{}\" cannot be pushed to.", dest_ref)]
    CannotPushTo {
        /// The destination ref as given.
        dest_ref: String,
    },
    /// The commit graph to push could not be determined.
    #[error("unable to determine the commit graph to push")]
    NoCommitGraph {},
    /// The push would carry more commits than the configured limit.
    #[error(
        "pushing {} commits, are you really sure?\nPass --push-limit={} if yes.",
        count,
        count + 1
    )]
    TooManyCommits {
        /// The number of commits in the graph.
        count: usize,
    },
    /// A commit in the graph was already projected to a split repository.
    #[error("one or more commits is already present in the split repo.")]
    AlreadyMapped {},
    /// The push configuration does not allow pushing to a component.
    #[error(
        "push configuration \"{}\" prohibits pushing to \"{}\"",
        config,
        split_dir
    )]
    ProhibitedSplitDir {
        /// The name of the push configuration.
        config: String,
        /// The prohibited component.
        split_dir: SplitDir,
    },
    /// The push configuration names no destination branch for a component.
    #[error(
        "push configuration \"{}\" has no destination branch for \"{}\"",
        config,
        split_dir
    )]
    MissingDestBranch {
        /// The name of the push configuration.
        config: String,
        /// The component without a destination branch.
        split_dir: SplitDir,
    },
    /// The split remote could not be fetched.
    #[error("failed to fetch from the remote for {}.", split_dir.user_name())]
    FetchFailed {
        /// The component whose remote failed.
        split_dir: SplitDir,
        /// The source of the error.
        #[source]
        source: GitError,
    },
    /// The regrafted commits cannot land on the destination branch.
    #[error(
        "unable to {} commits in {}. Please rebase your monorepo commits first.",
        kind,
        split_dir
    )]
    UnableToMerge {
        /// The merge kind that failed.
        kind: &'static str,
        /// The component that could not be merged.
        split_dir: SplitDir,
        /// The source of the error.
        #[source]
        source: ImpossibleMergeError,
    },
    /// Failure to load the push configuration.
    #[error("push config error: {}", source)]
    Config {
        /// The source of the error.
        #[from]
        source: PushConfigError,
    },
    /// Failure to set up a split remote.
    #[error("split remote error: {}", source)]
    Remote {
        /// The source of the error.
        #[from]
        source: SplitRemoteError,
    },
    /// Failure to regraft the commit graph.
    #[error("regraft error: {}", source)]
    Regraft {
        /// The source of the error.
        #[from]
        source: RegraftError,
    },
    /// Failure to execute a `git` command.
    #[error("git error: {}", source)]
    Git {
        /// The source of the error.
        #[from]
        source: GitError,
    },
}

impl PushError {
    fn fetch_failed(split_dir: SplitDir, source: GitError) -> Self {
        PushError::FetchFailed {
            split_dir,
            source,
        }
    }

    fn unable_to_merge(
        kind: &'static str,
        split_dir: SplitDir,
        source: ImpossibleMergeError,
    ) -> Self {
        PushError::UnableToMerge {
            kind,
            split_dir,
            source,
        }
    }
}

type PushResult<T> = Result<T, PushError>;

/// How a push should behave.
#[derive(Debug, Clone, Copy)]
pub struct PushOptions {
    /// Prepare everything but do not push to the remotes.
    pub dry_run: bool,
    /// The strategy used to land commits on the destination branches.
    pub merge_strategy: MergeStrategy,
    /// The bound on how many commits one push may carry; `0` disables it.
    pub push_limit: usize,
}

impl Default for PushOptions {
    fn default() -> Self {
        PushOptions {
            dry_run: false,
            merge_strategy: MergeStrategy::RebaseOrMerge,
            push_limit: DEFAULT_PUSH_LIMIT,
        }
    }
}

/// Push the changes named by a `<source>:<destination>` refspec back to the
/// split repositories.
///
/// All components are fetched, regrafted, and merged before any of them is
/// pushed; the first error in any stage aborts the push.
pub fn push_refspec(
    ctx: &GitContext,
    refspec: &str,
    options: &PushOptions,
    out: &mut dyn WriteColor,
) -> PushResult<()> {
    // Verify that we're in a git checkout.
    let toplevel =
        git::current_checkout_directory(ctx).ok_or(PushError::NotARepository {})?;
    let toplevel = PathBuf::from(toplevel);
    let ctx = GitContext::new(&toplevel);

    // Figure out the set of remote branches we care about.
    let remote = "origin";
    let remote_monorepo_branches: Vec<String> = git::remote_branches(&ctx)?
        .into_iter()
        .filter(|branch| is_known_tracking_branch(remote, branch))
        .collect();
    info!(
        target: "apple-llvm/push",
        "Branches we care about {:?}",
        remote_monorepo_branches,
    );

    let (source_ref, dest_ref) =
        refspec
            .split_once(':')
            .ok_or_else(|| PushError::InvalidRefspec {
                refspec: refspec.into(),
            })?;

    // Verify that the source ref is valid and get its commit hash.
    let source_commit = ctx
        .git()
        .args(["rev-parse", source_ref])
        .try_output()
        .map(CommitId::new)
        .ok_or_else(|| PushError::InvalidSourceRef {
            source_ref: source_ref.into(),
        })?;
    // Ensure that the source commit is associated with a ref that the split
    // clones can fetch.
    git::update_branch(&ctx, push::MONOREPO_SRC_REF_NAME, &source_commit)?;

    // Verify that the destination ref is valid and load its push config.
    let remote_dest_ref = format!("{}/{}", remote, dest_ref);
    ctx.git()
        .arg("rev-parse")
        .arg(&remote_dest_ref)
        .try_output()
        .ok_or_else(|| PushError::InvalidDestRef {
            dest_ref: dest_ref.into(),
        })?;
    let push_config = push::load_push_config(&ctx, source_commit.as_str(), dest_ref)?
        .ok_or_else(|| PushError::CannotPushTo {
            dest_ref: dest_ref.into(),
        })?;

    // Compute the graph we would like to push.
    let rev_list = ctx
        .git()
        .args(["rev-list", "--boundary"])
        .arg(source_commit.as_str())
        .arg("--not")
        .args(&remote_monorepo_branches)
        .try_output()
        .ok_or(PushError::NoCommitGraph {})?;
    let commit_graph = match compute_commit_graph(&rev_list) {
        Some(graph) => graph,
        None => {
            echo(out, "No commits to commit: everything up-to-date.");
            return Ok(());
        },
    };
    // Prohibit pushing a large number of commits by default in a bid to
    // avoid inadvertent mistakes.
    if options.push_limit != 0 && commit_graph.commits.len() >= options.push_limit {
        return Err(PushError::TooManyCommits {
            count: commit_graph.commits.len(),
        });
    }

    echo_bold(
        out,
        &format!(
            "Preparing to push to {} commits:",
            commit_graph.commits.len(),
        ),
    );
    ctx.git()
        .args(["log", "--format=%h %s", "--graph"])
        .arg(commit_graph.source_commit().as_str())
        .arg("--not")
        .args(commit_graph.roots.iter().map(CommitId::as_str))
        .run()?;

    // Prepare the split remotes.
    let split_repos_of_interest = commit_graph.compute_changed_split_repos(&ctx)?;
    echo(
        out,
        &format!(
            "Split repos that should be updates: {}\n",
            split_repos_of_interest
                .iter()
                .map(SplitDir::user_name)
                .format(", "),
        ),
    );

    let mut split_remotes: BTreeMap<SplitDir, SplitRemote> = BTreeMap::new();
    for split_dir in &split_repos_of_interest {
        let remote = create_split_remote(&toplevel, &push_config, split_dir, dest_ref)?;
        echo_bold(
            out,
            &format!(
                "Fetching \"{}\" for {}...",
                remote.destination_branch,
                split_dir.user_name(),
            ),
        );
        remote
            .update_remote()
            .map_err(|err| PushError::fetch_failed(split_dir.clone(), err))?;
        echo(
            out,
            "Fetching monorepo commits from monorepo to the split clone \
             (takes time on first push)...\n",
        );
        remote.update_mono_remote()?;
        split_remotes.insert(split_dir.clone(), remote);
    }

    reject_already_mapped_commits(
        &ctx,
        &toplevel,
        &commit_graph,
        &push_config,
        dest_ref,
        &mut split_remotes,
    )?;

    // Regraft the commit history.
    let mut regrafted: BTreeMap<SplitDir, CommitGraph> = BTreeMap::new();
    for split_dir in &split_repos_of_interest {
        echo_bold(
            out,
            &format!(
                "Regrafting the commits from monorepo to {}...",
                split_dir.user_name(),
            ),
        );
        let remote = &split_remotes[split_dir];
        match push::regraft_commit_graph_onto_split_repo(remote.ctx(), &commit_graph, split_dir)?
        {
            Some(graph) => {
                regrafted.insert(split_dir.clone(), graph);
            },
            None => {
                warn!(
                    target: "apple-llvm/push",
                    "the rewrite for {} produced no commits; skipping it",
                    split_dir,
                );
            },
        }
    }

    // Merge/rebase the commit history.
    let mut push_heads: BTreeMap<SplitDir, CommitId> = BTreeMap::new();
    for split_dir in &split_repos_of_interest {
        let graph = match regrafted.get(split_dir) {
            Some(graph) => graph,
            None => continue,
        };
        echo_bold(
            out,
            &format!(
                "\nRebasing/merging the {} commits...",
                split_dir.user_name(),
            ),
        );
        let remote = &split_remotes[split_dir];
        let destination = format!("origin/{}", remote.destination_branch);
        let head = push::merge_commit_graph_with_top_of_branch(
            remote.ctx(),
            graph,
            split_dir,
            &destination,
            options.merge_strategy,
        );
        match head {
            Ok(head) => {
                push_heads.insert(split_dir.clone(), head);
            },
            Err(MergeError::Impossible {
                source,
            }) => {
                let kind = if options.merge_strategy == MergeStrategy::FastForwardOnly {
                    "fast forward"
                } else {
                    "merge"
                };
                return Err(PushError::unable_to_merge(kind, split_dir.clone(), source));
            },
            Err(MergeError::Git {
                source,
            }) => return Err(source.into()),
        }
    }

    // Once everything is ready, push!
    for split_dir in &split_repos_of_interest {
        let head = match push_heads.get(split_dir) {
            Some(head) => head,
            None => continue,
        };
        split_remotes[split_dir].push(head, options.dry_run, out)?;
    }

    Ok(())
}

/// Set up the split remote for a component, checking the push configuration
/// first.
fn create_split_remote(
    toplevel: &std::path::Path,
    push_config: &PushConfig,
    split_dir: &SplitDir,
    dest_ref: &str,
) -> PushResult<SplitRemote> {
    if !push_config.can_push_to_split_dir(split_dir) {
        return Err(PushError::ProhibitedSplitDir {
            config: push_config.name.clone(),
            split_dir: split_dir.clone(),
        });
    }
    let remote_url = push_config
        .repo_url(split_dir)
        .expect("a pushable split dir has a repo URL");
    let destination_branch = push_config
        .split_repo_branch(split_dir, dest_ref)
        .ok_or_else(|| PushError::MissingDestBranch {
            config: push_config.name.clone(),
            split_dir: split_dir.clone(),
        })?;

    Ok(SplitRemote::new(
        toplevel,
        split_dir,
        remote_url,
        destination_branch,
    )?)
}

/// Reject commits whose messages record a split projection that the split
/// remote already has.
///
/// Each commit's own `apple-llvm-split-dir` trailer names the split remote
/// to consult; remotes outside the affected set are cloned on demand when
/// the push configuration maps them. Components the configuration does not
/// map cannot be consulted and are skipped.
fn reject_already_mapped_commits(
    ctx: &GitContext,
    toplevel: &std::path::Path,
    commit_graph: &CommitGraph,
    push_config: &PushConfig,
    dest_ref: &str,
    split_remotes: &mut BTreeMap<SplitDir, SplitRemote>,
) -> PushResult<()> {
    for commit in &commit_graph.commits {
        let message = ctx
            .git()
            .args(["log", "-n", "1", "--format=%B"])
            .arg(commit.as_str())
            .output()?;
        let link = match split_link_in_message(&message) {
            Some(link) => link,
            None => continue,
        };
        let split_dir = match SplitDir::from_config_key(&link.1) {
            Some(split_dir) => split_dir,
            None => continue,
        };

        if !split_remotes.contains_key(&split_dir) {
            if !push_config.can_push_to_split_dir(&split_dir) {
                continue;
            }
            let remote = create_split_remote(toplevel, push_config, &split_dir, dest_ref)?;
            remote
                .update_remote()
                .map_err(|err| PushError::fetch_failed(split_dir.clone(), err))?;
            split_remotes.insert(split_dir.clone(), remote);
        }

        let remote = &split_remotes[&split_dir];
        if git::commit_exists(remote.ctx(), &link.0) {
            info!(
                target: "apple-llvm/push",
                "{} was already projected to {} as {}",
                commit,
                split_dir,
                link.0,
            );
            return Err(PushError::AlreadyMapped {});
        }
    }

    Ok(())
}

/// The split-commit and split-dir values recorded anywhere in a commit
/// message.
///
/// Projected commits place the two trailers in separate paragraphs at times,
/// so the whole message is scanned rather than just the trailer block.
fn split_link_in_message(message: &str) -> Option<(CommitId, String)> {
    let mut commit = None;
    let mut dir = None;
    for line in message.lines() {
        if let Some(value) = line.strip_prefix("apple-llvm-split-commit:") {
            commit.get_or_insert_with(|| CommitId::new(value.trim()));
        } else if let Some(value) = line.strip_prefix("apple-llvm-split-dir:") {
            dir.get_or_insert_with(|| value.trim().trim_end_matches('/').to_string());
        }
    }
    Some((commit?, dir?))
}

#[cfg(test)]
mod test {
    use crate::push::coordinator::split_link_in_message;

    #[test]
    fn test_split_link_in_message() {
        let message = "This commit is already mapped!\n\
                       \n\
                       apple-llvm-split-commit: f0931a1b36c88157ffc25a9ed1295f3addff85b9\n\
                       \n\
                       apple-llvm-split-dir: llvm/\n";
        let (commit, dir) = split_link_in_message(message).unwrap();
        assert_eq!(
            commit.as_str(),
            "f0931a1b36c88157ffc25a9ed1295f3addff85b9",
        );
        assert_eq!(dir, "llvm");

        assert_eq!(split_link_in_message("just a commit"), None);
        assert_eq!(
            split_link_in_message(
                "partial\n\napple-llvm-split-commit: f0931a1b36c88157ffc25a9ed1295f3addff85b9",
            ),
            None,
        );
    }
}
