//! The automerger control plane.
//!
//! The automerger continuously merges a set of configured upstream branches
//! into their target branches. This module does not perform those merges; it
//! loads the edge configuration, inspects the repository and the automerger's
//! in-flight state, and reports how every edge is doing.

mod config;
mod core;
mod graph;
mod inflight;
mod oracle;
mod status;
mod zippered;

pub use self::config::find_am_config_dict;
pub use self::config::find_am_configs;
pub use self::config::read_config_for_branch;
pub use self::config::AmConfigError;
pub use self::config::TargetConfig;

pub use self::core::compute_unmerged_commits;
pub use self::core::has_merge_conflict;
pub use self::core::is_secondary_edge_commit_blocked_by_primary_edge;
pub use self::core::CommitState;

pub use self::graph::compute_edge;
pub use self::graph::compute_zippered_edges;
pub use self::graph::print_graph;
pub use self::graph::Edge;
pub use self::graph::EdgeState;
pub use self::graph::GraphError;

pub use self::inflight::find_inflight_merges;
pub use self::inflight::InflightError;
pub use self::inflight::InflightMerges;

pub use self::oracle::get_build_url;
pub use self::oracle::get_ci_status;
pub use self::oracle::set_build_url;
pub use self::oracle::FsStateStore;
pub use self::oracle::OracleError;
pub use self::oracle::StateStore;
pub use self::oracle::StoreError;

pub use self::status::print_status;
pub use self::status::StatusError;
pub use self::status::StatusOptions;

pub use self::zippered::compute_zippered_merge_commits;
pub use self::zippered::compute_zippered_merges;
pub use self::zippered::BranchIterator;
