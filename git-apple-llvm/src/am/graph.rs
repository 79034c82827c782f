//! The automerger edge graph.
//!
//! Every configured edge is evaluated against the repository, the in-flight
//! registry, and optionally the CI oracle, reducing per-commit states to one
//! of four edge states. The edges can also be rendered as a Graphviz graph
//! of the merge topology.

use std::fmt::Write as _;
use std::io::Write;
use std::process::{Command, Stdio};

use log::{debug, info};
use thiserror::Error;

use crate::am::{self, CommitState, InflightError, OracleError, StateStore, TargetConfig};
use crate::git::{CommitId, GitContext, GitError};

// Graphviz node, edge and graph attributes.
// https://www.graphviz.org/doc/info/attrs.html
const NODESEP: &str = "1";
const PENWIDTH: &str = "2";
const RANKDIR: &str = "LR";
const RANKSEP: &str = "1";
const SPLINES: &str = "ortho";

// Graphviz colors.
// https://www.graphviz.org/doc/info/colors.html
const GREEN: &str = "green3";
const BLUE: &str = "blue3";
const YELLOW: &str = "gold3";
const RED: &str = "red3";

/// Errors which may occur when computing or rendering the edge graph.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum GraphError {
    /// Failure to load the automerger configuration.
    #[error("config error: {}", source)]
    Config {
        /// The source of the error.
        #[from]
        source: am::AmConfigError,
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
    /// Failure to write the rendered graph.
    #[error("failed to write the graph: {}", source)]
    Write {
        /// The source of the error.
        #[from]
        source: std::io::Error,
    },
}

/// The aggregate health of an automerger edge.
///
/// The states are ordered by severity: a single blocked commit makes the
/// whole edge blocked, no matter how the rest of the backlog is doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum EdgeState {
    /// No outstanding work.
    Clear,
    /// Waiting for the other side of a zippered pair.
    Waiting,
    /// Merges are in progress.
    Working,
    /// A conflict or a CI failure stops the edge.
    Blocked,
}

impl EdgeState {
    /// The Graphviz color used to render an edge in this state.
    pub fn color(self) -> &'static str {
        match self {
            EdgeState::Clear => GREEN,
            EdgeState::Waiting => BLUE,
            EdgeState::Working => YELLOW,
            EdgeState::Blocked => RED,
        }
    }

    /// The edge state a commit's CI state maps to.
    ///
    /// `NEW` carries no verdict and maps to nothing; callers fall through to
    /// their other checks.
    pub fn from_commit_state(state: CommitState) -> Option<Self> {
        match state {
            CommitState::Passed => Some(EdgeState::Clear),
            CommitState::Pending | CommitState::Started => Some(EdgeState::Working),
            CommitState::Conflict | CommitState::Failed | CommitState::KnownFailed => {
                Some(EdgeState::Blocked)
            },
            CommitState::New => None,
        }
    }
}

/// An automerger edge with its computed state.
#[derive(Debug, Clone)]
pub struct Edge {
    /// The upstream branch.
    pub upstream: String,
    /// The target branch.
    pub target: String,
    /// The computed state of the edge.
    pub state: EdgeState,
    /// The build URL associated with the edge's head merge, if known.
    pub url: Option<String>,
    /// Whether the edge constrains graph layout.
    ///
    /// The secondary edge of a zippered pair is rendered without a layout
    /// constraint so the pair reads as one rank.
    pub constraint: bool,
}

impl Edge {
    fn new(upstream: &str, target: &str) -> Self {
        Edge {
            upstream: upstream.into(),
            target: target.into(),
            state: EdgeState::Clear,
            url: None,
            constraint: true,
        }
    }
}

/// Compute the state of a plain automerger edge.
///
/// Every unmerged commit is inspected from the head of the backlog down: a
/// recorded CI verdict wins, a merge conflict (probed only at the head, to
/// avoid a worktree per commit) blocks the edge, an in-flight merge marks it
/// working. The reduction short-circuits at the first blocked commit.
pub fn compute_edge(
    ctx: &GitContext,
    remote: &str,
    upstream_branch: &str,
    target_branch: &str,
    commits_inflight: &[CommitId],
    commits_unmerged: Option<&[CommitId]>,
    ci_store: Option<&dyn StateStore>,
) -> Result<Edge, GraphError> {
    info!(
        target: "apple-llvm/am",
        "Computing edge for [{} -> {}]",
        upstream_branch,
        target_branch,
    );
    let mut edge = Edge::new(upstream_branch, target_branch);
    let commits_unmerged = match commits_unmerged {
        Some(commits) if !commits.is_empty() => commits,
        _ => return Ok(edge),
    };

    // The edge is blocked if there is at least one blocked commit. If there
    // are no blocked commits, the edge is working if there's at least one
    // working commit. Otherwise the edge is clear.
    let mut working = false;
    let mut check_for_merge_conflict = true;
    for commit in commits_unmerged {
        let commit_state = commit_state(
            ctx,
            remote,
            commit,
            target_branch,
            commits_inflight,
            check_for_merge_conflict,
            ci_store,
        )?;
        if commit_state == EdgeState::Blocked {
            edge.state = EdgeState::Blocked;
            return Ok(edge);
        }
        if commit_state == EdgeState::Working {
            working = true;
        }
        // Only check for a merge conflict on the first commit.
        check_for_merge_conflict = false;
    }
    if working {
        edge.state = EdgeState::Working;
    }

    Ok(edge)
}

fn commit_state(
    ctx: &GitContext,
    remote: &str,
    commit: &CommitId,
    target_branch: &str,
    commits_inflight: &[CommitId],
    check_for_merge_conflict: bool,
    ci_store: Option<&dyn StateStore>,
) -> Result<EdgeState, GraphError> {
    if let Some(store) = ci_store {
        let ci_state = am::get_ci_status(store, commit.as_str(), target_branch)?;
        if let Some(state) = ci_state.and_then(EdgeState::from_commit_state) {
            return Ok(state);
        }
    }
    if check_for_merge_conflict && am::has_merge_conflict(ctx, commit, target_branch, remote)? {
        return Ok(EdgeState::Blocked);
    }
    if commits_inflight.contains(commit) {
        return Ok(EdgeState::Working);
    }
    Ok(EdgeState::Clear)
}

/// Compute the pair of edges for a zippered configuration.
///
/// When the planner found merges to perform, both edges are working. When it
/// found none, each side waits on its own backlog.
pub fn compute_zippered_edges(
    ctx: &GitContext,
    remote: &str,
    config: &TargetConfig,
    merges: Option<&[Vec<CommitId>]>,
) -> Result<(Edge, Edge), GraphError> {
    let secondary = config
        .secondary_upstream
        .as_deref()
        .expect("zippered edges require a secondary upstream");
    info!(
        target: "apple-llvm/am",
        "Computing edges for [{} -> {} <- {}]",
        config.upstream,
        config.target,
        secondary,
    );

    let mut left_edge = Edge::new(&config.upstream, &config.target);
    let mut right_edge = Edge::new(secondary, &config.target);
    right_edge.constraint = false;
    if merges.map_or(false, |merges| !merges.is_empty()) {
        left_edge.state = EdgeState::Working;
        right_edge.state = EdgeState::Working;
        return Ok((left_edge, right_edge));
    }

    let left_commits =
        am::compute_unmerged_commits(ctx, remote, &config.target, &config.upstream)?;
    left_edge.state = if left_commits.is_some() {
        EdgeState::Waiting
    } else {
        EdgeState::Clear
    };
    let right_commits = am::compute_unmerged_commits(ctx, remote, &config.target, secondary)?;
    right_edge.state = if right_commits.is_some() {
        EdgeState::Waiting
    } else {
        EdgeState::Clear
    };

    Ok((left_edge, right_edge))
}

/// A cluster of branch nodes in the rendered graph.
///
/// Subgraphs form an arena-backed tree; [`Digraph::subgraph`] hands out
/// identifiers and [`Digraph::render`] materializes the tree with a
/// recursive walk.
#[derive(Debug)]
struct Subgraph {
    name: String,
    nodes: Vec<String>,
    children: Vec<SubgraphId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct SubgraphId(usize);

/// A DOT digraph under construction.
#[derive(Debug, Default)]
pub struct Digraph {
    subgraphs: Vec<Subgraph>,
    top_level: Vec<SubgraphId>,
    edges: Vec<Edge>,
}

impl Digraph {
    fn subgraph(&mut self, parent: Option<SubgraphId>, name: &str) -> SubgraphId {
        let id = SubgraphId(self.subgraphs.len());
        self.subgraphs.push(Subgraph {
            name: name.into(),
            nodes: Vec::new(),
            children: Vec::new(),
        });
        match parent {
            Some(parent) => self.subgraphs[parent.0].children.push(id),
            None => self.top_level.push(id),
        }
        id
    }

    fn add_node(&mut self, subgraph: SubgraphId, node: &str) {
        self.subgraphs[subgraph.0].nodes.push(node.into());
    }

    fn add_edge(&mut self, edge: Edge) {
        self.edges.push(edge);
    }

    fn render_subgraph(&self, out: &mut String, id: SubgraphId, indent: usize) {
        let subgraph = &self.subgraphs[id.0];
        info!(
            target: "apple-llvm/am",
            "Creating {} subgraph with {} node(s) and {} nested subgraph(s).",
            subgraph.name,
            subgraph.nodes.len(),
            subgraph.children.len(),
        );
        let pad = "    ".repeat(indent);
        let _ = writeln!(out, "{}subgraph cluster_{} {{", pad, dot_id(&subgraph.name));
        let _ = writeln!(out, "{}    label={}", pad, dot_id(&subgraph.name));
        for node in &subgraph.nodes {
            let _ = writeln!(out, "{}    {}", pad, dot_id(node));
        }
        for &child in &subgraph.children {
            self.render_subgraph(out, child, indent + 1);
        }
        let _ = writeln!(out, "{}}}", pad);
    }

    /// Render the graph as DOT text.
    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "digraph {{");
        let _ = writeln!(out, "    label=Automergers");
        let _ = writeln!(
            out,
            "    graph [rankdir={}, nodesep={}, ranksep={}, splines={}]",
            RANKDIR, NODESEP, RANKSEP, SPLINES,
        );
        let _ = writeln!(
            out,
            "    node [shape=record, style=filled, color=lightgray, \
             fontname=helvetica, fixedsize=true, width=4, height=0.8]",
        );
        for &id in &self.top_level {
            self.render_subgraph(&mut out, id, 1);
        }
        for edge in &self.edges {
            let mut attrs = format!(
                "color={}, penwidth={}, constraint={}",
                edge.state.color(),
                PENWIDTH,
                edge.constraint,
            );
            if let Some(url) = edge.url.as_deref() {
                let _ = write!(attrs, ", URL={}", dot_id(url));
            }
            let _ = writeln!(
                out,
                "    {} -> {} [{}]",
                dot_id(&edge.upstream),
                dot_id(&edge.target),
                attrs,
            );
        }
        let _ = writeln!(out, "}}");
        out
    }
}

/// Quote a string for DOT output, unless it is already a plain identifier.
fn dot_id(value: &str) -> String {
    let plain = !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
        && !value.starts_with(|c: char| c.is_ascii_digit());
    if plain {
        value.into()
    } else {
        format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
    }
}

/// Group the branches of the merge topology into hosting clusters.
fn add_branches(graph: &mut Digraph, branches: &[String]) {
    let llvm = graph.subgraph(None, "LLVM");
    let github = graph.subgraph(None, "Github");
    let internal = graph.subgraph(None, "Internal");

    let mut branches: Vec<&String> = branches.iter().collect();
    branches.sort();
    branches.dedup();
    for branch in branches {
        if branch.starts_with("llvm") {
            graph.add_node(llvm, branch);
        } else if branch.starts_with("internal") || branch.starts_with("swift/internal") {
            // Check `internal` before the github group; swift-internal
            // branches live on the internal host.
            graph.add_node(internal, branch);
        } else {
            graph.add_node(github, branch);
        }
    }
}

/// Compute every configured edge and render the automerger graph.
///
/// The DOT source is written to `out` when `fmt` is `dot`; any other format
/// is produced by running Graphviz's `dot`, degrading to a hint when the
/// binary is unavailable.
pub fn print_graph(
    ctx: &GitContext,
    remote: &str,
    fmt: &str,
    ci_store: Option<&dyn StateStore>,
    out: &mut dyn Write,
) -> Result<(), GraphError> {
    let configs = am::find_am_configs(ctx, remote)?;
    if configs.is_empty() {
        writeln!(out, "No automerger configured for remote \"{}\"", remote)?;
        return Ok(());
    }

    let inflight_merges = am::find_inflight_merges(ctx, remote)?;
    let mut graph = Digraph::default();
    let mut branches = Vec::new();

    for config in &configs {
        branches.push(config.upstream.clone());
        branches.push(config.target.clone());

        if let Some(secondary) = config.secondary_upstream.as_deref() {
            branches.push(secondary.into());
            let common_ancestor = config
                .common_ancestor
                .as_deref()
                .expect("a secondary upstream implies a common ancestor");
            let merges = am::compute_zippered_merges(
                ctx,
                remote,
                &config.target,
                &config.upstream,
                secondary,
                common_ancestor,
                None,
            )?;
            let (left, right) =
                compute_zippered_edges(ctx, remote, config, merges.as_deref())?;
            graph.add_edge(left);
            graph.add_edge(right);
            continue;
        }

        let unmerged =
            am::compute_unmerged_commits(ctx, remote, &config.target, &config.upstream)?;
        let no_inflight = Vec::new();
        let inflight = inflight_merges
            .get(&config.target)
            .unwrap_or(&no_inflight);
        let mut edge = compute_edge(
            ctx,
            remote,
            &config.upstream,
            &config.target,
            inflight,
            unmerged.as_deref(),
            ci_store,
        )?;
        if let (Some(store), Some(head)) = (ci_store, unmerged.as_ref().and_then(|c| c.first()))
        {
            edge.url =
                am::get_build_url(store, &format!("{}_{}", head, config.target))?;
        }
        graph.add_edge(edge);
    }

    add_branches(&mut graph, &branches);
    let dot = graph.render();

    if fmt == "dot" {
        out.write_all(dot.as_bytes())?;
        return Ok(());
    }

    render_with_graphviz(&dot, fmt, out)
}

/// Run Graphviz to convert DOT text into the requested format.
fn render_with_graphviz(dot: &str, fmt: &str, out: &mut dyn Write) -> Result<(), GraphError> {
    let output_file = format!("automergers.{}", fmt);
    let child = Command::new("dot")
        .arg(format!("-T{}", fmt))
        .arg("-o")
        .arg(&output_file)
        .stdin(Stdio::piped())
        .spawn();

    let mut child = match child {
        Ok(child) => child,
        Err(err) => {
            debug!(target: "apple-llvm/am", "failed to run dot: {}", err);
            writeln!(
                out,
                "Generating the automerger graph requires the Graphviz \"dot\" tool.",
            )?;
            return Ok(());
        },
    };

    child
        .stdin
        .take()
        .expect("a piped stdin should have a handle")
        .write_all(dot.as_bytes())?;
    let status = child.wait()?;
    if status.success() {
        writeln!(out, "Rendered the automerger graph to {}", output_file)?;
    } else {
        writeln!(
            out,
            "Graphviz failed to render the automerger graph; is \"{}\" a supported format?",
            fmt,
        )?;
    }

    Ok(())
}

#[cfg(test)]
mod test {
    use proptest::prelude::*;
    use tempfile::TempDir;

    use crate::am::graph::{add_branches, compute_edge, dot_id, Digraph};
    use crate::am::{CommitState, Edge, EdgeState, FsStateStore, StateStore};
    use crate::git::{CommitId, GitContext};

    #[test]
    fn test_commit_state_mapping() {
        assert_eq!(
            EdgeState::from_commit_state(CommitState::Passed),
            Some(EdgeState::Clear),
        );
        assert_eq!(
            EdgeState::from_commit_state(CommitState::Pending),
            Some(EdgeState::Working),
        );
        assert_eq!(
            EdgeState::from_commit_state(CommitState::Started),
            Some(EdgeState::Working),
        );
        for failed in [CommitState::Conflict, CommitState::Failed, CommitState::KnownFailed] {
            assert_eq!(
                EdgeState::from_commit_state(failed),
                Some(EdgeState::Blocked),
            );
        }
        assert_eq!(EdgeState::from_commit_state(CommitState::New), None);
    }

    #[test]
    fn test_edge_state_severity_order() {
        assert!(EdgeState::Blocked > EdgeState::Working);
        assert!(EdgeState::Working > EdgeState::Waiting);
        assert!(EdgeState::Waiting > EdgeState::Clear);
    }

    /// Evaluate an edge whose commits all carry recorded CI verdicts.
    ///
    /// With a verdict on every commit the evaluator consults neither the
    /// repository nor the in-flight registry, so a dummy context suffices.
    fn edge_state_for(verdicts: &[CommitState]) -> EdgeState {
        let tmp = TempDir::new().unwrap();
        let store = FsStateStore::at(tmp.path());
        let commits: Vec<CommitId> = verdicts
            .iter()
            .enumerate()
            .map(|(i, verdict)| {
                let commit = CommitId::new(format!("commit{}", i));
                store
                    .set(&format!("{}_master", commit), verdict.as_str())
                    .unwrap();
                commit
            })
            .collect();

        compute_edge(
            &GitContext::current_dir(),
            "origin",
            "upstream",
            "master",
            &[],
            Some(&commits),
            Some(&store),
        )
        .unwrap()
        .state
    }

    proptest! {
        #[test]
        fn test_edge_reduction_monotonicity(
            verdicts in proptest::collection::vec(
                proptest::sample::select(vec![
                    CommitState::Passed,
                    CommitState::Pending,
                    CommitState::Started,
                    CommitState::Failed,
                ]),
                1..8,
            ),
        ) {
            let state = edge_state_for(&verdicts);

            // One blocked commit blocks the edge; otherwise the order of
            // working and clear commits does not matter.
            if verdicts.iter().any(|v| *v == CommitState::Failed) {
                prop_assert_eq!(state, EdgeState::Blocked);
            } else if verdicts
                .iter()
                .any(|v| matches!(v, CommitState::Pending | CommitState::Started))
            {
                prop_assert_eq!(state, EdgeState::Working);
            } else {
                prop_assert_eq!(state, EdgeState::Clear);
            }

            let mut reversed = verdicts.clone();
            reversed.reverse();
            prop_assert_eq!(state, edge_state_for(&reversed));
        }
    }

    #[test]
    fn test_dot_identifier_quoting() {
        assert_eq!(dot_id("master"), "master");
        assert_eq!(dot_id("swift/master"), "\"swift/master\"");
        assert_eq!(dot_id("master-next"), "\"master-next\"");
    }

    #[test]
    fn test_render_clusters_and_edges() {
        let mut graph = Digraph::default();
        let mut edge = Edge {
            upstream: "upstream".into(),
            target: "master".into(),
            state: EdgeState::Clear,
            url: None,
            constraint: true,
        };
        graph.add_edge(edge.clone());
        edge.upstream = "swift/master".into();
        edge.state = EdgeState::Working;
        edge.constraint = false;
        graph.add_edge(edge);
        add_branches(
            &mut graph,
            &[
                "upstream".into(),
                "master".into(),
                "swift/master".into(),
                "llvm/master".into(),
                "internal/master".into(),
            ],
        );

        let dot = graph.render();
        assert!(dot.contains("subgraph cluster_LLVM"));
        assert!(dot.contains("subgraph cluster_Github"));
        assert!(dot.contains("subgraph cluster_Internal"));
        assert!(dot.contains("upstream -> master [color=green3, penwidth=2, constraint=true]"));
        assert!(dot.contains(
            "\"swift/master\" -> master [color=gold3, penwidth=2, constraint=false]",
        ));
    }
}
