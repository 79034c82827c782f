//! Working with pull requests.
//!
//! The operations a git hosting service has to offer for pull requests are
//! captured by the [`PrTool`] trait; concrete services implement it in their
//! own crates. Test dispatch is keyed by a CI type recorded in the
//! repository's pull-request configuration.

mod config;
mod tool;

pub use self::config::load_pr_config;
pub use self::config::PrConfigError;
pub use self::config::PrToolConfig;
pub use self::config::PrToolType;

pub use self::tool::trigger_test;
pub use self::tool::CiTestType;
pub use self::tool::PrTestError;
pub use self::tool::PrTool;
pub use self::tool::PrToolError;
pub use self::tool::PullRequestInfo;
pub use self::tool::PullRequestState;
