//! The push configuration.

use std::collections::HashMap;

use serde::Deserialize;
use thiserror::Error;

use crate::git::{self, GitContext};
use crate::push::SplitDir;

/// Errors which may occur when loading a push configuration.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum PushConfigError {
    /// The configuration blob is not valid JSON.
    #[error("invalid push config \"{}\": {}", name, source)]
    Parse {
        /// The name of the configuration.
        name: String,
        /// The source of the error.
        #[source]
        source: serde_json::Error,
    },
}

impl PushConfigError {
    fn parse(name: String, source: serde_json::Error) -> Self {
        PushConfigError::Parse {
            name,
            source,
        }
    }
}

/// The repository mapping needed to push monorepo commits to the split
/// repositories.
#[derive(Debug, Clone, Deserialize)]
pub struct PushConfig {
    /// The name of the configuration (derived from the destination branch).
    #[serde(skip)]
    pub name: String,
    /// The mapping from `monorepo-branch:component` to the destination
    /// branch in the split repo. The component `*` provides a default.
    pub branch_to_dest_branch_mapping: HashMap<String, String>,
    /// The mapping from a component to the URL of its split repository.
    pub repo_mapping: HashMap<String, String>,
}

impl PushConfig {
    /// The destination branch in the split repo for the given component and
    /// monorepo branch.
    pub fn split_repo_branch(&self, dir: &SplitDir, monorepo_branch: &str) -> Option<&str> {
        let combined_key = format!("{}:{}", monorepo_branch, dir.config_key());
        self.branch_to_dest_branch_mapping
            .get(&combined_key)
            .or_else(|| {
                self.branch_to_dest_branch_mapping
                    .get(&format!("{}:*", monorepo_branch))
            })
            .map(String::as_str)
    }

    /// Whether pushes to the given component are allowed.
    pub fn can_push_to_split_dir(&self, dir: &SplitDir) -> bool {
        self.repo_mapping.contains_key(dir.config_key())
    }

    /// The URL of the split repository for a component.
    pub fn repo_url(&self, dir: &SplitDir) -> Option<&str> {
        self.repo_mapping.get(dir.config_key()).map(String::as_str)
    }
}

/// Load the push configuration recorded for a destination branch on the
/// pushed source commit.
///
/// Returns `None` when the source carries no configuration for the branch,
/// which means the destination cannot be pushed to.
pub fn load_push_config(
    ctx: &GitContext,
    source_ref: &str,
    dest_branch: &str,
) -> Result<Option<PushConfig>, PushConfigError> {
    let config_name = dest_branch.replace('/', "-");
    let path = format!("apple-llvm-config/push/{}.json", config_name);
    let contents = match git::read_file_or_none(ctx, source_ref, &path) {
        Some(contents) => contents,
        None => return Ok(None),
    };

    let mut config: PushConfig = serde_json::from_str(&contents)
        .map_err(|err| PushConfigError::parse(config_name.clone(), err))?;
    config.name = config_name;
    Ok(Some(config))
}
