//! Dispatching build requests to Jenkins.

use std::collections::HashMap;
use std::env;

use log::{debug, info};
use serde::Deserialize;
use thiserror::Error;
use url::form_urlencoded;

use crate::config;

/// Errors which may occur when dispatching CI jobs.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CiDispatchError {
    /// The CI endpoint rejected the request.
    #[error("CI dispatch to {} failed with status {}: {}", url, status_code, error)]
    Dispatch {
        /// The URL that was dispatched to.
        url: String,
        /// The HTTP status code of the response.
        status_code: u16,
        /// The textual error returned by the endpoint.
        error: String,
    },
    /// The CI endpoint could not be reached at all.
    #[error("failed to reach {}: {}", url, source)]
    Request {
        /// The URL that was dispatched to.
        url: String,
        /// The source of the error.
        #[source]
        source: reqwest::Error,
    },
    /// No credentials are available for the CI endpoint.
    #[error(
        "no Jenkins credentials for {}; store them in the `jenkins-{}` config file \
         or set JENKINS_USERNAME and JENKINS_TOKEN",
        url,
        domain_key
    )]
    MissingCredentials {
        /// The Jenkins URL needing credentials.
        url: String,
        /// The domain key the credentials are stored under.
        domain_key: String,
    },
    /// The job configuration is not usable.
    #[error("invalid CI config: {}", reason)]
    InvalidConfig {
        /// Why the configuration was rejected.
        reason: &'static str,
    },
    /// The job configuration is not valid JSON.
    #[error("failed to parse CI config: {}", source)]
    Parse {
        /// The source of the error.
        #[from]
        source: serde_json::Error,
    },
}

impl CiDispatchError {
    fn dispatch(url: String, status_code: u16, error: String) -> Self {
        CiDispatchError::Dispatch {
            url,
            status_code,
            error,
        }
    }

    fn request(url: String, source: reqwest::Error) -> Self {
        CiDispatchError::Request {
            url,
            source,
        }
    }

    fn missing_credentials(url: String, domain_key: String) -> Self {
        CiDispatchError::MissingCredentials {
            url,
            domain_key,
        }
    }

    fn invalid_config(reason: &'static str) -> Self {
        CiDispatchError::InvalidConfig {
            reason,
        }
    }
}

type CiResult<T> = Result<T, CiDispatchError>;

/// Jenkins credentials.
#[derive(Debug, Clone, Deserialize)]
struct JenkinsAuth {
    username: String,
    token: String,
}

/// A job that can be dispatched on a Jenkins instance.
#[derive(Debug, Clone, Deserialize)]
pub struct JenkinsCiJob {
    /// The name of the CI job.
    pub name: String,
    /// The URL of the Jenkins job.
    pub url: String,
    /// The parameters to pass to the job.
    pub params: HashMap<String, String>,
}

impl JenkinsCiJob {
    /// Dispatch a build request to the job.
    fn dispatch(
        &self,
        params: &HashMap<String, String>,
        auth: &JenkinsAuth,
        test_plan_name: &str,
    ) -> CiResult<()> {
        let cause: String = form_urlencoded::byte_serialize(
            format!("started by {} using git apple-llvm", auth.username).as_bytes(),
        )
        .collect();
        let mut url = format!(
            "{}/buildWithParameters?token=GIT_APPLE_LLVM&cause={}",
            self.url, cause,
        );
        let mut all_params = params.clone();
        all_params.extend(
            self.params
                .iter()
                .map(|(key, value)| (key.clone(), value.clone())),
        );
        for (key, value) in &all_params {
            url.push_str(&format!("&{}={}", key, value));
        }

        info!(target: "apple-llvm/ci", "Performing jenkins request \"{}\"", url);
        let client = reqwest::blocking::Client::new();
        let response = client
            .post(&url)
            .basic_auth(&auth.username, Some(&auth.token))
            .send()
            .map_err(|err| CiDispatchError::request(url.clone(), err))?;
        if response.status().as_u16() != 201 {
            let status = response.status().as_u16();
            let text = response.text().unwrap_or_default();
            return Err(CiDispatchError::dispatch(url, status, text));
        }

        let description = all_params
            .get("pullRequestID")
            .map(|id| format!("PR #{}", id))
            .unwrap_or_default();
        println!(
            "✅ requested {} [{}] ci job for {}",
            test_plan_name, self.name, description,
        );
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct Read {
    #[serde(rename = "type")]
    ci_type: String,
    url: String,
    jobs: Vec<JenkinsCiJob>,
}

/// A configuration for a Jenkins CI instance: the set of jobs a test plan
/// fans out to.
#[derive(Debug, Clone)]
pub struct JenkinsCiConfig {
    /// The base URL of the Jenkins instance.
    pub url: String,
    /// The jobs that should be dispatched.
    pub jobs: Vec<JenkinsCiJob>,
}

impl JenkinsCiConfig {
    /// Parse a Jenkins configuration from its JSON representation.
    pub fn from_json(contents: &str) -> CiResult<Self> {
        let read: Read = serde_json::from_str(contents)?;
        if read.ci_type != "jenkins" {
            return Err(CiDispatchError::invalid_config("not a jenkins CI config"));
        }
        if read.jobs.is_empty() {
            return Err(CiDispatchError::invalid_config("missing jobs in CI config"));
        }

        Ok(JenkinsCiConfig {
            url: read.url,
            jobs: read.jobs,
        })
    }

    /// Dispatch every job with explicit credentials.
    fn dispatch_with_auth(
        &self,
        params: &HashMap<String, String>,
        auth: &JenkinsAuth,
        test_plan_name: &str,
    ) -> CiResult<()> {
        for job in &self.jobs {
            job.dispatch(params, auth, test_plan_name)?;
        }
        Ok(())
    }

    /// Look up stored credentials and dispatch every job.
    pub fn dispatch(
        &self,
        params: &HashMap<String, String>,
        test_plan_name: &str,
    ) -> CiResult<()> {
        let auth = jenkins_auth(&self.url)?;
        self.dispatch_with_auth(params, &auth, test_plan_name)
    }
}

/// The credentials for a Jenkins instance.
///
/// Tokens are minted out of band and stored under the local configuration
/// directory (or provided through the environment).
fn jenkins_auth(url: &str) -> CiResult<JenkinsAuth> {
    let domain_key = domain_key(url);

    if let Some(value) = config::read_config(&format!("jenkins-{}", domain_key)) {
        let auth: JenkinsAuth = serde_json::from_str(&value)?;
        return Ok(auth);
    }
    if let (Ok(username), Ok(token)) = (env::var("JENKINS_USERNAME"), env::var("JENKINS_TOKEN")) {
        return Ok(JenkinsAuth {
            username,
            token,
        });
    }

    debug!(target: "apple-llvm/ci", "no jenkins credentials found for {}", domain_key);
    Err(CiDispatchError::missing_credentials(url.into(), domain_key))
}

/// The key a Jenkins instance's credentials are stored under.
fn domain_key(url: &str) -> String {
    match url::Url::parse(url) {
        Ok(parsed) => {
            format!(
                "{}{}",
                parsed.host_str().unwrap_or_default(),
                parsed.path().replace('/', "-"),
            )
        },
        Err(_) => url.replace('/', "-"),
    }
}

#[cfg(test)]
mod test {
    use crate::ci::jenkins::domain_key;
    use crate::ci::{CiDispatchError, JenkinsCiConfig};

    #[test]
    fn test_config_parsing() {
        let config = JenkinsCiConfig::from_json(
            r#"{
                "type": "jenkins",
                "url": "https://ci.example.com",
                "jobs": [
                    {"name": "a-RA", "url": "https://ci.example.com/job/a",
                     "params": {"build_variant": "a"}}
                ]
            }"#,
        )
        .unwrap();
        assert_eq!(config.jobs.len(), 1);
        assert_eq!(config.jobs[0].name, "a-RA");
        assert_eq!(config.jobs[0].params["build_variant"], "a");
    }

    #[test]
    fn test_config_validation() {
        let err = JenkinsCiConfig::from_json(
            r#"{"type": "circle", "url": "https://x", "jobs": [
                {"name": "a", "url": "https://x/a", "params": {}}
            ]}"#,
        )
        .unwrap_err();
        assert!(matches!(err, CiDispatchError::InvalidConfig { .. }));

        let err = JenkinsCiConfig::from_json(
            r#"{"type": "jenkins", "url": "https://x", "jobs": []}"#,
        )
        .unwrap_err();
        assert!(matches!(err, CiDispatchError::InvalidConfig { .. }));
    }

    #[test]
    fn test_domain_key() {
        assert_eq!(
            domain_key("https://ci.example.com/jenkins/main"),
            "ci.example.com-jenkins-main",
        );
    }
}
