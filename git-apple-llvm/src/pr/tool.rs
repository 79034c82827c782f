//! The pull-request tool abstraction.

use std::error::Error;

use thiserror::Error;

use crate::ci::{TestPlanDispatcher, TestPlanError};
use crate::git::GitContext;

/// Errors which may occur when talking to a pull-request service.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum PrToolError {
    /// Failure to perform some local operation.
    #[error("service error: {}", source)]
    Service {
        /// The source of the error.
        #[source]
        source: Box<dyn Error + Send + Sync>,
    },
    /// Failure on the remote hosting service.
    #[error("host error: {}", source)]
    Host {
        /// The source of the error.
        #[source]
        source: Box<dyn Error + Send + Sync>,
    },
}

impl PrToolError {
    /// A convenience method for constructing a local error.
    pub fn service<E>(err: E) -> Self
    where
        E: Error + Send + Sync + 'static,
    {
        PrToolError::Service {
            source: Box::new(err),
        }
    }

    /// A convenience method for constructing a remote error.
    pub fn host<E>(err: E) -> Self
    where
        E: Error + Send + Sync + 'static,
    {
        PrToolError::Host {
            source: Box::new(err),
        }
    }
}

/// The lifecycle state of a pull request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PullRequestState {
    /// The pull request is open.
    Open,
    /// The pull request was merged.
    Merged,
    /// The pull request was closed without merging.
    Closed,
}

/// The information about a pull request.
#[derive(Debug, Clone)]
pub struct PullRequestInfo {
    /// The pull request's numerical id.
    pub number: u64,
    /// The pull request's lifecycle state.
    pub state: PullRequestState,
    /// The title of the pull request.
    pub title: String,
    /// The body text of the pull request.
    pub body_text: String,
    /// The username of the author.
    pub author_username: String,
    /// The branch the pull request targets.
    pub base_branch: String,
    /// The branch the pull request comes from.
    pub head_branch: String,
    /// A browsable URL for the pull request.
    pub url: String,
}

/// The operations that can be performed on pull requests.
pub trait PrTool {
    /// The open pull requests of the repository.
    fn list(&self) -> Result<Vec<PullRequestInfo>, PrToolError>;

    /// The pull request with the given number, or `None` if it does not
    /// exist.
    fn pr_from_number(&self, number: u64) -> Result<Option<PullRequestInfo>, PrToolError>;

    /// Create a new pull request.
    ///
    /// `head_repo_url` names the repository the head branch lives in when it
    /// is not the target repository itself.
    fn create_pr(
        &self,
        title: &str,
        base_branch: &str,
        head_repo_url: Option<&str>,
        head_branch: &str,
    ) -> Result<PullRequestInfo, PrToolError>;

    /// Add a comment to a pull request.
    fn add_comment(&self, number: u64, content: &str) -> Result<(), PrToolError>;
}

/// The CI systems a pull request can be tested with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CiTestType {
    /// Testing is requested with a `@swift-ci` comment.
    SwiftCi,
    /// Testing is dispatched to Jenkins through named test plans.
    JenkinsTestPlans,
}

impl CiTestType {
    /// Parse a CI type from its configuration spelling.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "swift-ci" => Some(CiTestType::SwiftCi),
            "jenkins-test-plans" => Some(CiTestType::JenkinsTestPlans),
            _ => None,
        }
    }
}

/// Errors which may occur when triggering pull-request testing.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum PrTestError {
    /// Jenkins test plans need a plan name.
    #[error("a test plan is required; pass one with --test")]
    MissingTestPlan {},
    /// The pull-request service failed.
    #[error("pr tool error: {}", source)]
    Tool {
        /// The source of the error.
        #[from]
        source: PrToolError,
    },
    /// The test plan could not be dispatched.
    #[error("test plan error: {}", source)]
    TestPlan {
        /// The source of the error.
        #[from]
        source: TestPlanError,
    },
}

/// Trigger testing for a pull request.
pub fn trigger_test(
    ctx: &GitContext,
    tool: &dyn PrTool,
    test_type: CiTestType,
    pr_number: u64,
    test_plan: Option<&str>,
) -> Result<(), PrTestError> {
    match test_type {
        CiTestType::SwiftCi => {
            tool.add_comment(pr_number, "@swift-ci please test")?;
        },
        CiTestType::JenkinsTestPlans => {
            let plan = test_plan.ok_or(PrTestError::MissingTestPlan {})?;
            TestPlanDispatcher::new(ctx.clone())
                .dispatch_test_plan_for_pull_request(plan, pr_number)?;
        },
    }

    Ok(())
}

#[cfg(test)]
mod test {
    use crate::pr::CiTestType;

    #[test]
    fn test_ci_type_parsing() {
        assert_eq!(CiTestType::parse("swift-ci"), Some(CiTestType::SwiftCi));
        assert_eq!(
            CiTestType::parse("jenkins-test-plans"),
            Some(CiTestType::JenkinsTestPlans),
        );
        assert_eq!(CiTestType::parse("buildbot"), None);
    }
}
