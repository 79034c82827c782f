//! Computing and reporting the automerger status.

use std::collections::HashSet;
use std::io::{self, Write};

use termcolor::{ColorSpec, WriteColor};
use thiserror::Error;

use crate::am::{
    self, AmConfigError, GraphError, InflightError, OracleError, StateStore, TargetConfig,
};
use crate::git::{CommitId, GitContext, GitError};

/// Errors which may occur when reporting the automerger status.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StatusError {
    /// Failure to load the automerger configuration.
    #[error("config error: {}", source)]
    Config {
        /// The source of the error.
        #[from]
        source: AmConfigError,
    },
    /// Failure to gather the in-flight merges.
    #[error("in-flight registry error: {}", source)]
    Inflight {
        /// The source of the error.
        #[from]
        source: InflightError,
    },
    /// Failure to consult the CI oracle.
    #[error("oracle error: {}", source)]
    Oracle {
        /// The source of the error.
        #[from]
        source: OracleError,
    },
    /// Failure to execute a `git` command.
    #[error("git error: {}", source)]
    Git {
        /// The source of the error.
        #[from]
        source: GitError,
    },
    /// Failure to render the graph.
    #[error("graph error: {}", source)]
    Graph {
        /// The source of the error.
        #[from]
        source: GraphError,
    },
    /// Failure to write the report.
    #[error("failed to write the status report: {}", source)]
    Write {
        /// The source of the error.
        #[from]
        source: io::Error,
    },
}

type StatusResult<T> = Result<T, StatusError>;

/// What to report and how.
#[derive(Debug, Clone, Copy, Default)]
pub struct StatusOptions<'a> {
    /// Report only the edges targeting this branch.
    pub target_branch: Option<&'a str>,
    /// List the whole backlog instead of abbreviating it.
    pub list_commits: bool,
    /// Consult the CI oracle for per-commit verdicts.
    pub query_ci_status: bool,
}

/// How many of a backlog's commits are already being processed.
///
/// The automerger works on the oldest commits first; everything from the
/// first in-flight commit onwards counts as being worked on.
fn compute_inflight_commit_count(commits: &[CommitId], commits_inflight: &HashSet<&CommitId>) -> usize {
    let mut not_seen = 0;
    for commit in commits {
        if commits_inflight.contains(commit) {
            return commits.len() - not_seen;
        }
        not_seen += 1;
    }
    0
}

fn write_bold(out: &mut dyn WriteColor, line: &str) -> io::Result<()> {
    out.set_color(ColorSpec::new().set_bold(true))?;
    writeln!(out, "{}", line)?;
    out.reset()
}

/// The annotation to show next to one unmerged commit.
fn commit_annotation(
    ctx: &GitContext,
    remote: &str,
    commit: &CommitId,
    target_branch: &str,
    commits_inflight: &HashSet<&CommitId>,
    probe_for_conflict: bool,
    ci_store: Option<&dyn StateStore>,
) -> StatusResult<Option<String>> {
    if let Some(store) = ci_store {
        if let Some(state) = am::get_ci_status(store, commit.as_str(), target_branch)? {
            if state != am::CommitState::New {
                return Ok(Some(state.as_str().into()));
            }
        }
    }
    if probe_for_conflict && am::has_merge_conflict(ctx, commit, target_branch, remote)? {
        return Ok(Some("Conflict".into()));
    }
    if commits_inflight.contains(commit) {
        return Ok(Some("Auto merge in progress".into()));
    }
    Ok(None)
}

/// Report the status of a single plain edge.
#[allow(clippy::too_many_arguments)]
fn print_edge_status(
    ctx: &GitContext,
    remote: &str,
    upstream_branch: &str,
    target_branch: &str,
    inflight: &[CommitId],
    options: &StatusOptions,
    ci_store: Option<&dyn StateStore>,
    out: &mut dyn WriteColor,
) -> StatusResult<()> {
    let commits_inflight: HashSet<&CommitId> = inflight.iter().collect();

    let commit_log_output = ctx
        .git()
        .args([
            "log",
            "--first-parent",
            "--pretty=format:%H %cd",
            "--no-patch",
        ])
        .arg(format!(
            "{remote}/{target}..{remote}/{upstream}",
            remote = remote,
            target = target_branch,
            upstream = upstream_branch,
        ))
        .output()?;

    write_bold(out, &format!("[{} -> {}]", upstream_branch, target_branch))?;
    if commit_log_output.is_empty() {
        writeln!(
            out,
            "- 0 unmerged commits. {} is up to date.",
            target_branch,
        )?;
        return Ok(());
    }

    let commits: Vec<(CommitId, &str)> = commit_log_output
        .lines()
        .map(|line| {
            let hash = line.split_whitespace().next().unwrap_or(line);
            (CommitId::new(hash), line)
        })
        .collect();
    let hashes: Vec<CommitId> = commits.iter().map(|(hash, _)| hash.clone()).collect();
    let inflight_count = compute_inflight_commit_count(&hashes, &commits_inflight);
    writeln!(
        out,
        "- {} unmerged commits. {} commits are currently being merged/build/tested.",
        commits.len(),
        inflight_count,
    )?;
    writeln!(out, "- Unmerged commits:")?;

    let print_commit = |commit: &(CommitId, &str),
                        probe_for_conflict: bool,
                        out: &mut dyn WriteColor|
     -> StatusResult<()> {
        let annotation = commit_annotation(
            ctx,
            remote,
            &commit.0,
            target_branch,
            &commits_inflight,
            probe_for_conflict,
            ci_store,
        )?;
        match annotation {
            Some(annotation) => writeln!(out, "  * {}: {}", commit.1, annotation)?,
            None => writeln!(out, "  * {}", commit.1)?,
        }
        Ok(())
    };

    // The conflict probe costs a worktree; it only runs at the head of the
    // backlog.
    print_commit(&commits[0], true, out)?;
    if options.list_commits {
        for commit in &commits[1..] {
            print_commit(commit, false, out)?;
        }
        return Ok(());
    }
    // Show an abbreviated list of commits.
    if commits.len() > 2 {
        writeln!(out, "    ... {} commits in-between ...", commits.len() - 2)?;
    }
    if commits.len() > 1 {
        print_commit(&commits[commits.len() - 1], false, out)?;
    }

    Ok(())
}

/// Report the status of a zippered target.
fn print_zippered_status(
    ctx: &GitContext,
    remote: &str,
    config: &TargetConfig,
    out: &mut dyn WriteColor,
) -> StatusResult<()> {
    let secondary = config
        .secondary_upstream
        .as_deref()
        .expect("zippered status requires a secondary upstream");
    let common_ancestor = config
        .common_ancestor
        .as_deref()
        .expect("a secondary upstream implies a common ancestor");

    write_bold(
        out,
        &format!(
            "[{} -> {} <- {}]",
            config.upstream, config.target, secondary,
        ),
    )?;
    writeln!(out, "- This is a zippered merge branch!")?;

    let merges = am::compute_zippered_merges(
        ctx,
        remote,
        &config.target,
        &config.upstream,
        secondary,
        common_ancestor,
        None,
    )?;
    match merges {
        None => {
            writeln!(
                out,
                "- 0 unmerged commits. {} is up to date.",
                config.target,
            )?;
        },
        Some(merges) if !merges.is_empty() => {
            writeln!(out, "- There is at least one merge that can be performed.")?;
        },
        Some(_) => {
            writeln!(
                out,
                "- The automerger is waiting for unmerged commits to share \
                 a merge-base from {}.",
                common_ancestor,
            )?;
        },
    }

    Ok(())
}

/// Report the status of every configured automerger edge.
pub fn print_status(
    ctx: &GitContext,
    remote: &str,
    options: &StatusOptions,
    ci_store: Option<&dyn StateStore>,
    out: &mut dyn WriteColor,
) -> StatusResult<()> {
    let mut configs = am::find_am_configs(ctx, remote)?;
    if let Some(target_branch) = options.target_branch {
        configs.retain(|config| config.target == target_branch);
    }
    if configs.is_empty() {
        let scope = match options.target_branch {
            Some(target_branch) => format!("branch \"{}\" from ", target_branch),
            None => String::new(),
        };
        writeln!(
            out,
            "No automerger configured for {}remote \"{}\"",
            scope, remote,
        )?;
        return Ok(());
    }

    let inflight_merges = am::find_inflight_merges(ctx, remote)?;
    let no_inflight = Vec::new();

    let mut printed = false;
    for config in &configs {
        if printed {
            writeln!(out)?;
        }

        if config.secondary_upstream.is_some() {
            print_zippered_status(ctx, remote, config, out)?;
        } else {
            let inflight = inflight_merges
                .get(&config.target)
                .unwrap_or(&no_inflight);
            print_edge_status(
                ctx,
                remote,
                &config.upstream,
                &config.target,
                inflight,
                options,
                ci_store,
                out,
            )?;
        }
        printed = true;
    }

    Ok(())
}
