//! The automerger edge configuration.

use std::collections::HashMap;

use serde::Deserialize;
use thiserror::Error;

use crate::git::{self, GitContext};

/// The path of the configuration blob within the configuration branch.
const AM_CONFIG_PATH: &str = "apple-llvm-config/am/am-config.json";

/// Errors which may occur when loading the automerger configuration.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AmConfigError {
    /// The configuration blob is not valid JSON.
    #[error("invalid AM config: {}", source)]
    Parse {
        /// The source of the error.
        #[from]
        source: serde_json::Error,
    },
    /// A secondary upstream was configured without a common ancestor.
    #[error(
        "invalid AM config: missing common ancestor for the secondary upstream of {}",
        target
    )]
    MissingCommonAncestor {
        /// The target branch with the incomplete configuration.
        target: String,
    },
    /// Two configurations name the same target branch.
    #[error("invalid AM config, multiple {} branches", target)]
    DuplicateTarget {
        /// The duplicated target branch.
        target: String,
    },
}

impl AmConfigError {
    fn missing_common_ancestor(target: String) -> Self {
        AmConfigError::MissingCommonAncestor {
            target,
        }
    }

    fn duplicate_target(target: String) -> Self {
        AmConfigError::DuplicateTarget {
            target,
        }
    }
}

type AmConfigResult<T> = Result<T, AmConfigError>;

/// The configuration of an automerger target branch.
///
/// A plain edge merges `upstream` into `target`. A zippered edge additionally
/// names a `secondary_upstream` which may only be merged once its merge base
/// with `common_ancestor` has arrived through the primary upstream.
#[derive(Debug, Clone, Deserialize)]
pub struct TargetConfig {
    /// The branch that is the automerger target.
    pub target: String,
    /// The upstream branch that merges into the target.
    pub upstream: String,
    /// The optional secondary upstream for a zippered merge.
    #[serde(rename = "secondary-upstream", default)]
    pub secondary_upstream: Option<String>,
    /// The common ancestor branch gating the secondary upstream.
    #[serde(rename = "common-ancestor", default)]
    pub common_ancestor: Option<String>,
    /// The command to run for testing a merge.
    #[serde(rename = "test-command", default)]
    pub test_command: Option<String>,
    /// Whether outstanding commits are tested as one bundle.
    #[serde(default)]
    pub test_commits_in_bundle: Option<bool>,
}

impl TargetConfig {
    fn validate(self) -> AmConfigResult<Self> {
        if self.secondary_upstream.is_some() && self.common_ancestor.is_none() {
            return Err(AmConfigError::missing_common_ancestor(self.target));
        }

        Ok(self)
    }

    /// Parse a list of target configurations from a JSON document.
    pub fn parse_list(contents: &str) -> AmConfigResult<Vec<Self>> {
        let configs: Vec<TargetConfig> = serde_json::from_str(contents)?;
        configs
            .into_iter()
            .map(TargetConfig::validate)
            .collect()
    }
}

/// Load the automerger configurations recorded on the remote's configuration
/// branch.
///
/// Returns an empty list when the configuration blob is absent or empty.
pub fn find_am_configs(ctx: &GitContext, remote: &str) -> AmConfigResult<Vec<TargetConfig>> {
    let committish = format!("{}/repo/apple-llvm-config/am", remote);
    let contents = match git::read_file_or_none(ctx, &committish, AM_CONFIG_PATH) {
        Some(contents) if !contents.is_empty() && contents.trim() != "null" => contents,
        _ => return Ok(Vec::new()),
    };

    TargetConfig::parse_list(&contents)
}

/// Index the automerger configurations by target branch.
pub fn find_am_config_dict(
    ctx: &GitContext,
    remote: &str,
) -> AmConfigResult<HashMap<String, TargetConfig>> {
    let mut configs = HashMap::new();
    for config in find_am_configs(ctx, remote)? {
        let target = config.target.clone();
        if configs.insert(target.clone(), config).is_some() {
            return Err(AmConfigError::duplicate_target(target));
        }
    }

    Ok(configs)
}

/// The configuration for a single target branch, if it has one.
pub fn read_config_for_branch(
    ctx: &GitContext,
    remote: &str,
    branch: &str,
) -> AmConfigResult<Option<TargetConfig>> {
    Ok(find_am_config_dict(ctx, remote)?.remove(branch))
}
