//! The pull-request tool configuration.

use serde::Deserialize;
use thiserror::Error;

use crate::git::{self, GitContext};
use crate::pr::CiTestType;

/// The path of the pull-request configuration within the repository.
const PR_CONFIG_PATH: &str = "apple-llvm-config/pr.json";

/// Errors which may occur when loading the pull-request configuration.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum PrConfigError {
    /// The configuration blob is not valid JSON.
    #[error("invalid pr config: {}", source)]
    Parse {
        /// The source of the error.
        #[from]
        source: serde_json::Error,
    },
}

/// The git hosting services that pull requests can be worked with on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrToolType {
    /// GitHub.
    GitHub,
}

impl PrToolType {
    fn parse(value: &str) -> Option<Self> {
        match value {
            "github" => Some(PrToolType::GitHub),
            _ => None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct Read {
    #[serde(rename = "type")]
    tool_type: String,
    domain: String,
    user: String,
    repo: String,
    #[serde(rename = "test-type", default)]
    test_type: Option<String>,
}

/// Which repository is operated on for pull requests, and how its testing is
/// dispatched.
#[derive(Debug, Clone)]
pub struct PrToolConfig {
    /// The type of git hosting service.
    pub tool_type: PrToolType,
    /// The domain of the git hosting service (e.g. `github.com`).
    pub domain: String,
    /// The username that owns the repository.
    pub user: String,
    /// The name of the repository.
    pub repo: String,
    /// The CI system used for pull-request testing.
    pub test_type: CiTestType,
}

/// Load the pull-request configuration from the current checkout.
///
/// Returns `None` when the repository has no configuration, or when the
/// configured service or CI type is not recognized.
pub fn load_pr_config(ctx: &GitContext) -> Result<Option<PrToolConfig>, PrConfigError> {
    let contents = match git::read_file_or_none(ctx, "HEAD", PR_CONFIG_PATH) {
        Some(contents) => contents,
        None => return Ok(None),
    };
    let read: Read = serde_json::from_str(&contents)?;

    let tool_type = match PrToolType::parse(&read.tool_type) {
        Some(tool_type) => tool_type,
        None => return Ok(None),
    };
    let test_type = match read.test_type.as_deref() {
        Some(value) => {
            match CiTestType::parse(value) {
                Some(test_type) => test_type,
                None => return Ok(None),
            }
        },
        None => CiTestType::SwiftCi,
    };

    Ok(Some(PrToolConfig {
        tool_type,
        domain: read.domain,
        user: read.user,
        repo: read.repo,
        test_type,
    }))
}

#[cfg(test)]
mod test {
    use crate::pr::{load_pr_config, CiTestType, PrToolType};
    use crate::tests::harness::TestRepo;

    #[test]
    fn test_load_pr_config() {
        let repo = TestRepo::new();
        repo.commit_file(
            "apple-llvm-config/pr.json",
            r#"{
                "type": "github",
                "domain": "github.com",
                "user": "apple",
                "repo": "apple-llvm-infrastructure-tools",
                "test-type": "jenkins-test-plans"
            }"#,
            "add pr config",
        );

        let config = load_pr_config(repo.ctx()).unwrap().unwrap();
        assert_eq!(config.tool_type, PrToolType::GitHub);
        assert_eq!(config.domain, "github.com");
        assert_eq!(config.user, "apple");
        assert_eq!(config.repo, "apple-llvm-infrastructure-tools");
        assert_eq!(config.test_type, CiTestType::JenkinsTestPlans);
    }

    #[test]
    fn test_load_pr_config_defaults_and_absence() {
        let repo = TestRepo::new();
        repo.commit_file("unrelated", "contents\n", "no pr config");
        assert!(load_pr_config(repo.ctx()).unwrap().is_none());

        repo.commit_file(
            "apple-llvm-config/pr.json",
            r#"{
                "type": "github",
                "domain": "github.com",
                "user": "apple",
                "repo": "llvm-project"
            }"#,
            "add pr config",
        );
        let config = load_pr_config(repo.ctx()).unwrap().unwrap();
        assert_eq!(config.test_type, CiTestType::SwiftCi);

        repo.commit_file(
            "apple-llvm-config/pr.json",
            r#"{
                "type": "sourcehut",
                "domain": "sr.ht",
                "user": "apple",
                "repo": "llvm-project"
            }"#,
            "unsupported service",
        );
        assert!(load_pr_config(repo.ctx()).unwrap().is_none());
    }
}
