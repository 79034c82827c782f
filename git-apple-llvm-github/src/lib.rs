#![warn(missing_docs)]

//! A GitHub backend for the git-apple-llvm pull-request tool.
//!
//! This is a thin wrapper over GitHub's REST API; the workflow logic lives
//! behind the [`PrTool`] trait in the core crate.

use log::debug;
use serde::Deserialize;
use thiserror::Error;

use git_apple_llvm::config;
use git_apple_llvm::pr::{PrTool, PrToolError, PullRequestInfo, PullRequestState};

/// Errors which may occur when talking to GitHub.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum GithubError {
    /// No access token is available for the domain.
    #[error(
        "no GitHub access token for {}; store one in the `pr-{}` config file \
         or set GITHUB_TOKEN",
        domain,
        domain
    )]
    MissingToken {
        /// The GitHub domain needing a token.
        domain: String,
    },
    /// The API endpoint could not be reached.
    #[error("failed to reach {}: {}", url, source)]
    Request {
        /// The URL of the request.
        url: String,
        /// The source of the error.
        #[source]
        source: reqwest::Error,
    },
    /// The API rejected the request.
    #[error("GitHub request to {} failed with status {}: {}", url, status, error)]
    Api {
        /// The URL of the request.
        url: String,
        /// The HTTP status of the response.
        status: u16,
        /// The textual error returned by the API.
        error: String,
    },
    /// The API response could not be decoded.
    #[error("failed to decode the response from {}: {}", url, source)]
    Decode {
        /// The URL of the request.
        url: String,
        /// The source of the error.
        #[source]
        source: reqwest::Error,
    },
    /// The head repository is neither the target repository nor one of its
    /// forks.
    #[error("no fork of {}/{} matches the repository at {}", user, repo, url)]
    UnknownHeadRepo {
        /// The owner of the target repository.
        user: String,
        /// The target repository.
        repo: String,
        /// The URL that could not be matched.
        url: String,
    },
    /// A stored token file could not be parsed.
    #[error("invalid token file for {}: {}", domain, source)]
    TokenFile {
        /// The GitHub domain the token is for.
        domain: String,
        /// The source of the error.
        #[source]
        source: serde_json::Error,
    },
}

impl GithubError {
    fn missing_token(domain: &str) -> Self {
        GithubError::MissingToken {
            domain: domain.into(),
        }
    }

    fn request(url: String, source: reqwest::Error) -> Self {
        GithubError::Request {
            url,
            source,
        }
    }

    fn api(url: String, status: u16, error: String) -> Self {
        GithubError::Api {
            url,
            status,
            error,
        }
    }

    fn decode(url: String, source: reqwest::Error) -> Self {
        GithubError::Decode {
            url,
            source,
        }
    }

    fn unknown_head_repo(user: &str, repo: &str, url: &str) -> Self {
        GithubError::UnknownHeadRepo {
            user: user.into(),
            repo: repo.into(),
            url: url.into(),
        }
    }
}

type GithubResult<T> = Result<T, GithubError>;

#[derive(Debug, Deserialize)]
struct TokenFile {
    token: String,
}

#[derive(Debug, Deserialize)]
struct UserData {
    login: String,
}

#[derive(Debug, Deserialize)]
struct RefData {
    #[serde(rename = "ref")]
    refname: String,
}

#[derive(Debug, Deserialize)]
struct PullData {
    number: u64,
    state: String,
    title: String,
    #[serde(default)]
    body: Option<String>,
    user: UserData,
    base: RefData,
    head: RefData,
    html_url: String,
    #[serde(default)]
    merged_at: Option<String>,
}

impl PullData {
    fn into_info(self) -> PullRequestInfo {
        let state = if self.merged_at.is_some() {
            PullRequestState::Merged
        } else if self.state == "open" {
            PullRequestState::Open
        } else {
            PullRequestState::Closed
        };

        PullRequestInfo {
            number: self.number,
            state,
            title: self.title,
            body_text: self.body.unwrap_or_default(),
            author_username: self.user.login,
            base_branch: self.base.refname,
            head_branch: self.head.refname,
            url: self.html_url,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RepoData {
    clone_url: String,
    git_url: String,
    ssh_url: String,
    owner: UserData,
}

impl RepoData {
    fn matches_url(&self, url: &str) -> bool {
        self.clone_url == url || self.git_url == url || self.ssh_url == url
    }
}

/// A pull-request tool working against a GitHub repository.
pub struct GithubPrTool {
    client: reqwest::blocking::Client,
    api_base: String,
    token: String,
    user: String,
    repo: String,
}

impl GithubPrTool {
    /// Create a tool for a repository on a GitHub domain.
    ///
    /// The access token comes from the `pr-<domain>` configuration file, or
    /// from `GITHUB_TOKEN`.
    pub fn new(domain: &str, user: &str, repo: &str) -> GithubResult<Self> {
        let token = match load_access_token(domain)? {
            Some(token) => token,
            None => return Err(GithubError::missing_token(domain)),
        };
        let api_base = if domain == "github.com" {
            "https://api.github.com".into()
        } else {
            format!("https://{}/api/v3", domain)
        };

        Ok(GithubPrTool {
            client: reqwest::blocking::Client::new(),
            api_base,
            token,
            user: user.into(),
            repo: repo.into(),
        })
    }

    fn get(&self, path: &str) -> GithubResult<reqwest::blocking::Response> {
        let url = format!("{}{}", self.api_base, path);
        debug!(target: "apple-llvm/github", "GET {}", url);
        self.client
            .get(&url)
            .header("User-Agent", "git-apple-llvm")
            .header("Accept", "application/vnd.github.v3+json")
            .header("Authorization", format!("token {}", self.token))
            .send()
            .map_err(|err| GithubError::request(url, err))
    }

    fn post(&self, path: &str, body: serde_json::Value) -> GithubResult<reqwest::blocking::Response> {
        let url = format!("{}{}", self.api_base, path);
        debug!(target: "apple-llvm/github", "POST {}", url);
        self.client
            .post(&url)
            .header("User-Agent", "git-apple-llvm")
            .header("Accept", "application/vnd.github.v3+json")
            .header("Authorization", format!("token {}", self.token))
            .json(&body)
            .send()
            .map_err(|err| GithubError::request(url, err))
    }

    fn expect_success(response: reqwest::blocking::Response) -> GithubResult<reqwest::blocking::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let url = response.url().to_string();
        let error = response.text().unwrap_or_default();
        Err(GithubError::api(url, status.as_u16(), error))
    }

    fn repo_path(&self) -> String {
        format!("/repos/{}/{}", self.user, self.repo)
    }

    /// The owner of the fork at the given URL, or `None` when the URL is the
    /// target repository itself.
    fn find_head_repo_owner(&self, url: &str) -> GithubResult<Option<String>> {
        let response = Self::expect_success(self.get(&self.repo_path())?)?;
        let request_url = response.url().to_string();
        let repo: RepoData = response
            .json()
            .map_err(|err| GithubError::decode(request_url, err))?;
        if repo.matches_url(url) {
            return Ok(None);
        }

        let response =
            Self::expect_success(self.get(&format!("{}/forks", self.repo_path()))?)?;
        let request_url = response.url().to_string();
        let forks: Vec<RepoData> = response
            .json()
            .map_err(|err| GithubError::decode(request_url, err))?;
        for fork in forks {
            if fork.matches_url(url) {
                debug!(
                    target: "apple-llvm/github",
                    "Found github repo fork {} for {}",
                    fork.owner.login,
                    url,
                );
                return Ok(Some(fork.owner.login));
            }
        }

        Err(GithubError::unknown_head_repo(&self.user, &self.repo, url))
    }
}

impl PrTool for GithubPrTool {
    fn list(&self) -> Result<Vec<PullRequestInfo>, PrToolError> {
        let response = Self::expect_success(
            self.get(&format!("{}/pulls?state=open&per_page=100", self.repo_path()))
                .map_err(PrToolError::host)?,
        )
        .map_err(PrToolError::host)?;
        let url = response.url().to_string();
        let pulls: Vec<PullData> = response
            .json()
            .map_err(|err| PrToolError::host(GithubError::decode(url, err)))?;
        Ok(pulls.into_iter().map(PullData::into_info).collect())
    }

    fn pr_from_number(&self, number: u64) -> Result<Option<PullRequestInfo>, PrToolError> {
        let response = self
            .get(&format!("{}/pulls/{}", self.repo_path(), number))
            .map_err(PrToolError::host)?;
        if response.status().as_u16() == 404 {
            return Ok(None);
        }
        let response = Self::expect_success(response).map_err(PrToolError::host)?;
        let url = response.url().to_string();
        let pull: PullData = response
            .json()
            .map_err(|err| PrToolError::host(GithubError::decode(url, err)))?;
        Ok(Some(pull.into_info()))
    }

    fn create_pr(
        &self,
        title: &str,
        base_branch: &str,
        head_repo_url: Option<&str>,
        head_branch: &str,
    ) -> Result<PullRequestInfo, PrToolError> {
        let head = match head_repo_url {
            Some(url) => {
                match self.find_head_repo_owner(url).map_err(PrToolError::host)? {
                    Some(owner) => format!("{}:{}", owner, head_branch),
                    None => head_branch.into(),
                }
            },
            // The head is on origin, in the same repo.
            None => head_branch.into(),
        };

        let body = serde_json::json!({
            "title": title,
            "base": base_branch,
            "head": head,
        });
        let response = Self::expect_success(
            self.post(&format!("{}/pulls", self.repo_path()), body)
                .map_err(PrToolError::host)?,
        )
        .map_err(PrToolError::host)?;
        let url = response.url().to_string();
        let pull: PullData = response
            .json()
            .map_err(|err| PrToolError::host(GithubError::decode(url, err)))?;
        Ok(pull.into_info())
    }

    fn add_comment(&self, number: u64, content: &str) -> Result<(), PrToolError> {
        let body = serde_json::json!({
            "body": content,
        });
        Self::expect_success(
            self.post(
                &format!("{}/issues/{}/comments", self.repo_path(), number),
                body,
            )
            .map_err(PrToolError::host)?,
        )
        .map_err(PrToolError::host)?;
        Ok(())
    }
}

/// The stored access token for a GitHub domain, if any.
fn load_access_token(domain: &str) -> GithubResult<Option<String>> {
    if let Some(value) = config::read_config(&format!("pr-{}", domain)) {
        let file: TokenFile = serde_json::from_str(&value).map_err(|err| {
            GithubError::TokenFile {
                domain: domain.into(),
                source: err,
            }
        })?;
        return Ok(Some(file.token));
    }
    Ok(std::env::var("GITHUB_TOKEN").ok())
}

#[cfg(test)]
mod test {
    use crate::PullData;
    use git_apple_llvm::pr::PullRequestState;

    #[test]
    fn test_pull_data_state_mapping() {
        let open: PullData = serde_json::from_str(
            r#"{
                "number": 7,
                "state": "open",
                "title": "A change",
                "body": "Body text",
                "user": {"login": "contributor"},
                "base": {"ref": "master"},
                "head": {"ref": "my-feature"},
                "html_url": "https://github.com/apple/llvm-project/pull/7"
            }"#,
        )
        .unwrap();
        let info = open.into_info();
        assert_eq!(info.state, PullRequestState::Open);
        assert_eq!(info.number, 7);
        assert_eq!(info.base_branch, "master");
        assert_eq!(info.head_branch, "my-feature");

        let merged: PullData = serde_json::from_str(
            r#"{
                "number": 8,
                "state": "closed",
                "title": "A merged change",
                "body": null,
                "user": {"login": "contributor"},
                "base": {"ref": "master"},
                "head": {"ref": "other-feature"},
                "html_url": "https://github.com/apple/llvm-project/pull/8",
                "merged_at": "2020-01-01T00:00:00Z"
            }"#,
        )
        .unwrap();
        let info = merged.into_info();
        assert_eq!(info.state, PullRequestState::Merged);
        assert_eq!(info.body_text, "");
    }
}
