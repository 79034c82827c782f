//! Test plans for pull requests.
//!
//! A test plan names a set of CI jobs to run on a pull request, plus the
//! parameters they take. Plans and their job configurations live on the
//! remote's pull-request configuration branch.

use std::collections::HashMap;

use log::debug;
use serde::Deserialize;
use thiserror::Error;

use crate::ci::{CiDispatchError, JenkinsCiConfig};
use crate::git::{self, GitContext};

/// The ref the test plans and job configurations are read from.
const PR_CONFIG_REF: &str = "origin/repo/apple-llvm-config/pr";
/// The path of the test-plan catalog.
const TEST_PLANS_PATH: &str = "apple-llvm-config/ci-test-plans.json";

/// Errors which may occur when dispatching test plans.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum TestPlanError {
    /// The requested test plan is not defined.
    #[error("test plan \"{}\" is not defined", name)]
    NotFound {
        /// The name of the missing plan.
        name: String,
    },
    /// The plan's CI job configuration is missing.
    #[error("ci config {} not found", filename)]
    MissingCiConfig {
        /// The path of the missing configuration.
        filename: String,
    },
    /// The test-plan catalog is not valid JSON.
    #[error("failed to parse the test plans: {}", source)]
    Parse {
        /// The source of the error.
        #[from]
        source: serde_json::Error,
    },
    /// The CI dispatch failed.
    #[error("ci dispatch error: {}", source)]
    Dispatch {
        /// The source of the error.
        #[from]
        source: CiDispatchError,
    },
}

impl TestPlanError {
    fn not_found(name: String) -> Self {
        TestPlanError::NotFound {
            name,
        }
    }

    fn missing_ci_config(filename: String) -> Self {
        TestPlanError::MissingCiConfig {
            filename,
        }
    }
}

type TestPlanResult<T> = Result<T, TestPlanError>;

#[derive(Debug, Deserialize)]
struct TestPlanRead {
    description: String,
    #[serde(rename = "ci-jobs")]
    ci_jobs: String,
    params: HashMap<String, String>,
    #[serde(rename = "infer-from-changes", default)]
    infer_from_changes: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct CatalogRead {
    #[serde(rename = "test-plans")]
    test_plans: HashMap<String, TestPlanRead>,
}

/// A test plan that can be used for a pull request.
#[derive(Debug)]
pub struct TestPlan {
    /// The name of the plan.
    pub name: String,
    /// A human-readable description of what the plan runs.
    pub description: String,
    /// The name of the CI job configuration the plan dispatches.
    pub ci_jobs: String,
    /// The parameters to pass to the CI jobs.
    pub params: HashMap<String, String>,
    /// The directories from which this plan can be inferred to run.
    pub infer_from_dirs: Vec<String>,
}

impl TestPlan {
    fn new(name: &str, read: TestPlanRead) -> Self {
        TestPlan {
            name: name.into(),
            description: read.description,
            ci_jobs: read.ci_jobs,
            params: read.params,
            infer_from_dirs: read.infer_from_changes,
        }
    }

    /// Dispatch the plan's CI jobs.
    fn dispatch(&self, ctx: &GitContext, mut params: HashMap<String, String>) -> TestPlanResult<()> {
        let ci_job_config_filename = format!("apple-llvm-config/ci-jobs/{}.json", self.ci_jobs);
        debug!(
            target: "apple-llvm/ci",
            "Test plan {}: loading ci config {}",
            self.name,
            ci_job_config_filename,
        );
        let file_contents = git::read_file_or_none(ctx, PR_CONFIG_REF, &ci_job_config_filename)
            .ok_or_else(|| TestPlanError::missing_ci_config(ci_job_config_filename))?;
        let ci_job_config = JenkinsCiConfig::from_json(&file_contents)?;

        params.extend(
            self.params
                .iter()
                .map(|(key, value)| (key.clone(), value.clone())),
        );
        debug!(
            target: "apple-llvm/ci",
            "Test plan {}: dispatching ci job requests for params: {:?}",
            self.name,
            params,
        );
        Ok(ci_job_config.dispatch(&params, &self.name)?)
    }
}

/// Dispatches test plans for pull requests with the underlying CI jobs.
#[derive(Debug)]
pub struct TestPlanDispatcher {
    ctx: GitContext,
}

impl TestPlanDispatcher {
    /// Create a dispatcher operating on the given repository.
    pub fn new(ctx: GitContext) -> Self {
        TestPlanDispatcher {
            ctx,
        }
    }

    /// The test plans defined for the repository.
    pub fn test_plans(&self) -> TestPlanResult<HashMap<String, TestPlan>> {
        let file_contents = git::read_file_or_none(&self.ctx, PR_CONFIG_REF, TEST_PLANS_PATH)
            .unwrap_or_default();
        if file_contents.is_empty() {
            return Ok(HashMap::new());
        }

        let catalog: CatalogRead = serde_json::from_str(&file_contents)?;
        Ok(catalog
            .test_plans
            .into_iter()
            .map(|(name, read)| {
                let plan = TestPlan::new(&name, read);
                (name, plan)
            })
            .collect())
    }

    /// Load a test plan and dispatch it for a given pull request.
    pub fn dispatch_test_plan_for_pull_request(
        &self,
        name: &str,
        pr_number: u64,
    ) -> TestPlanResult<()> {
        debug!(
            target: "apple-llvm/ci",
            "Test plan dispatcher: loading test plans {}",
            TEST_PLANS_PATH,
        );
        let mut test_plans = self.test_plans()?;
        let plan = test_plans
            .remove(name)
            .ok_or_else(|| TestPlanError::not_found(name.into()))?;

        debug!(
            target: "apple-llvm/ci",
            "Test plan dispatcher: invoking {} for pull request #{}",
            name,
            pr_number,
        );
        let params = HashMap::from([("pullRequestID".to_string(), pr_number.to_string())]);
        plan.dispatch(&self.ctx, params)
    }
}

#[cfg(test)]
mod test {
    use crate::ci::test_plans::CatalogRead;

    #[test]
    fn test_catalog_parsing() {
        let catalog: CatalogRead = serde_json::from_str(
            r#"{
                "test-plans": {
                    "check-llvm": {
                        "description": "Runs lit and unit tests for LLVM",
                        "infer-from-changes": ["llvm"],
                        "ci-jobs": "pull-request-RA",
                        "params": {
                            "monorepo_projects": "",
                            "test_targets": "check-llvm"
                        }
                    }
                }
            }"#,
        )
        .unwrap();

        let plan = &catalog.test_plans["check-llvm"];
        assert_eq!(plan.ci_jobs, "pull-request-RA");
        assert_eq!(plan.infer_from_changes, vec!["llvm"]);
        assert_eq!(plan.params["test_targets"], "check-llvm");
    }
}
