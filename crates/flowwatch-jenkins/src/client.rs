//! Jenkins JSON API client.

use crate::error::JenkinsError;
use async_trait::async_trait;
use flowwatch_core::Result;
use flowwatch_core::ports::{BuildCause, CiClient};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// `_class` of a Build Flow plugin job.
pub const FLOW_CLASS: &str = "com.cloudbees.plugins.flow.BuildFlow";
/// `_class` of a freestyle job.
pub const JOB_CLASS: &str = "hudson.model.FreeStyleProject";

/// Connection settings for one Jenkins server.
#[derive(Debug, Clone)]
pub struct JenkinsConfig {
    pub url: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub timeout: Duration,
}

impl JenkinsConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            username: None,
            password: None,
            timeout: Duration::from_secs(30),
        }
    }

    pub fn with_credentials(mut self, username: impl Into<String>, password: Option<String>) -> Self {
        self.username = Some(username.into());
        self.password = password;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[derive(Debug, Deserialize)]
struct JobInfo {
    #[serde(rename = "_class", default)]
    class: String,
}

#[derive(Debug, Deserialize)]
struct BuildInfo {
    #[serde(default)]
    actions: Vec<BuildAction>,
}

#[derive(Debug, Default, Deserialize)]
struct BuildAction {
    #[serde(default)]
    causes: Vec<BuildCause>,
}

pub struct JenkinsClient {
    client: Client,
    base_url: Url,
    username: Option<String>,
    password: Option<String>,
}

impl JenkinsClient {
    pub fn new(config: JenkinsConfig) -> std::result::Result<Self, JenkinsError> {
        let base = config.url.trim_end_matches('/');
        let base_url =
            Url::parse(base).map_err(|e| JenkinsError::InvalidUrl(format!("{}: {}", base, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(JenkinsError::InvalidUrl(base.to_string()));
        }

        let client = Client::builder().timeout(config.timeout).build()?;

        Ok(Self {
            client,
            base_url,
            username: config.username,
            password: config.password,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// URL of a job (folders given as `a/b`) or of a path below it.
    fn job_url(&self, job: &str, rest: &[&str]) -> std::result::Result<Url, JenkinsError> {
        let mut url = self.base_url.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| JenkinsError::InvalidUrl(self.base_url.to_string()))?;
            segments.pop_if_empty();
            for part in job.split('/').filter(|p| !p.is_empty()) {
                segments.push("job").push(part);
            }
            segments.extend(rest);
        }
        Ok(url)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        url: Url,
        tree: &str,
    ) -> std::result::Result<T, JenkinsError> {
        debug!(url = %url, "Querying Jenkins");
        let mut request = self.client.get(url.clone()).query(&[("tree", tree)]);
        if let Some(username) = &self.username {
            request = request.basic_auth(username, self.password.as_deref());
        }

        let response = request.send().await?;
        match response.status() {
            StatusCode::OK => Ok(response.json().await?),
            StatusCode::NOT_FOUND => Err(JenkinsError::NotFound(url.to_string())),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                Err(JenkinsError::Unauthorized(url.to_string()))
            }
            status => Err(JenkinsError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            }),
        }
    }

    /// The `_class` of a job.
    pub async fn job_class(&self, name: &str) -> std::result::Result<String, JenkinsError> {
        let url = self.job_url(name, &["api", "json"])?;
        let info: JobInfo = self.get_json(url, "_class").await?;
        Ok(info.class)
    }

    /// Every trigger cause recorded on a build, across all its actions.
    pub async fn build_causes(
        &self,
        job: &str,
        build: u64,
    ) -> std::result::Result<Vec<BuildCause>, JenkinsError> {
        let number = build.to_string();
        let url = self.job_url(job, &[&number, "api", "json"])?;
        let info: BuildInfo = self
            .get_json(url, "actions[causes[upstreamProject,upstreamBuild]]")
            .await?;
        Ok(info
            .actions
            .into_iter()
            .flat_map(|action| action.causes)
            .collect())
    }
}

#[async_trait]
impl CiClient for JenkinsClient {
    async fn is_job_type(&self, name: &str) -> Result<bool> {
        Ok(self.job_class(name).await? == JOB_CLASS)
    }

    async fn is_flow_type(&self, name: &str) -> Result<bool> {
        Ok(self.job_class(name).await? == FLOW_CLASS)
    }

    async fn immediate_causes(&self, job: &str, build: u64) -> Result<Vec<BuildCause>> {
        Ok(self.build_causes(job, build).await?)
    }
}
