//! Pushing monorepo commits back to the split repositories.
//!
//! A monorepo commit graph is projected onto each affected component by
//! re-rooting it on the recorded split commits and restricting every tree to
//! the component's directory, then fast-forwarded, rebased, or merged onto
//! the destination split branch and pushed to the component's remote.

mod config;
mod coordinator;
mod graph;
mod merge;
mod regraft;
mod remote;
mod split_dir;

pub use self::config::load_push_config;
pub use self::config::PushConfig;
pub use self::config::PushConfigError;

pub use self::coordinator::push_refspec;
pub use self::coordinator::PushError;
pub use self::coordinator::PushOptions;

pub use self::graph::compute_commit_graph;
pub use self::graph::CommitGraph;

pub use self::merge::merge_commit_graph_with_top_of_branch;
pub use self::merge::ImpossibleMergeError;
pub use self::merge::MergeError;
pub use self::merge::MergeStrategy;

pub use self::regraft::regraft_commit_graph_onto_split_repo;
pub use self::regraft::RegraftError;

pub use self::remote::SplitRemote;
pub use self::remote::SplitRemoteError;

pub use self::split_dir::SplitDir;
pub use self::split_dir::MONOREPO_SPLIT_DIRS;

/// The name of the ref associated with the source commit in the monorepo.
///
/// The split clones fetch this ref over a local file-path remote to import
/// the monorepo commits that are about to be projected.
pub const MONOREPO_SRC_REF_NAME: &str = "this-branch-shall-be-git-apple-llvm-pushed";
