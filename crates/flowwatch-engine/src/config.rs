//! Watcher configuration.

use crate::dispatcher::DEFAULT_MAX_CONCURRENT_EVENTS;
use flowwatch_core::{Error, Result};
use flowwatch_topology::Topology;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use url::Url;

/// Process configuration: the API bind address and the CI servers to watch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchConfig {
    /// Bind address of the status API.
    #[serde(default = "default_listen")]
    pub listen: String,
    /// Maximum concurrent event tasks per server.
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_events: usize,
    #[serde(default)]
    pub servers: Vec<ServerConfig>,
}

/// One CI server with its transport and flow definitions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    /// CI server base URL.
    pub url: String,
    #[serde(default)]
    pub username: Option<String>,
    /// Environment variable holding the password or API token.
    #[serde(default)]
    pub password_env: Option<String>,
    /// Event transport URL.
    pub transport: String,
    /// Transport subject to subscribe to.
    #[serde(default = "default_subject")]
    pub subject: String,
    /// Flow definition files, merged in order.
    #[serde(default)]
    pub flows: Vec<PathBuf>,
}

fn default_listen() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_max_concurrent() -> usize {
    DEFAULT_MAX_CONCURRENT_EVENTS
}

fn default_subject() -> String {
    ">".to_string()
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            max_concurrent_events: default_max_concurrent(),
            servers: Vec::new(),
        }
    }
}

impl WatchConfig {
    /// Load from a YAML file. Relative flow paths are resolved against the
    /// file's directory.
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        let mut config = Self::from_yaml(&contents)?;

        if let Some(base) = path.parent() {
            for server in &mut config.servers {
                for flow in &mut server.flows {
                    if flow.is_relative() {
                        *flow = base.join(&*flow);
                    }
                }
            }
        }
        Ok(config)
    }

    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Self =
            serde_yaml::from_str(yaml).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.servers.is_empty() {
            return Err(Error::Config("no CI server configured".to_string()));
        }
        if self.max_concurrent_events == 0 {
            return Err(Error::Config(
                "max_concurrent_events must be at least 1".to_string(),
            ));
        }

        let mut names = BTreeSet::new();
        for server in &self.servers {
            server.validate()?;
            if !names.insert(server.name.as_str()) {
                return Err(Error::Config(format!(
                    "server {} is configured more than once",
                    server.name
                )));
            }
        }
        Ok(())
    }

    pub fn server(&self, name: &str) -> Option<&ServerConfig> {
        self.servers.iter().find(|s| s.name == name)
    }
}

impl ServerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::Config("server name is empty".to_string()));
        }
        validate_url(&self.url)
            .map_err(|e| Error::Config(format!("server {}: {}", self.name, e)))?;
        if self.transport.trim().is_empty() {
            return Err(Error::Config(format!(
                "server {}: transport is empty",
                self.name
            )));
        }
        if self.flows.is_empty() {
            return Err(Error::Config(format!(
                "server {}: no flow definition file",
                self.name
            )));
        }
        Ok(())
    }

    /// Read the credential from the configured environment variable.
    pub fn password(&self) -> Option<String> {
        self.password_env
            .as_deref()
            .and_then(|var| std::env::var(var).ok())
    }

    pub fn info(&self) -> Result<ServerInfo> {
        Ok(ServerInfo {
            name: self.name.clone(),
            url: validate_url(&self.url)?,
            description: self
                .description
                .clone()
                .unwrap_or_else(|| format!("No Description for {}", self.name)),
        })
    }

    /// Load and merge this server's flow definitions.
    pub fn load_topology(&self) -> Result<Topology> {
        Ok(Topology::load_files(self.flows.as_slice())?)
    }
}

/// Public identity of a watched CI server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServerInfo {
    pub name: String,
    pub url: String,
    pub description: String,
}

/// Check that `url` is an absolute http(s) URL and strip trailing slashes.
pub fn validate_url(url: &str) -> Result<String> {
    let trimmed = url.trim().trim_end_matches('/');
    let parsed = Url::parse(trimmed).map_err(|e| Error::Config(format!("invalid url {url}: {e}")))?;
    match parsed.scheme() {
        "http" | "https" => Ok(trimmed.to_string()),
        scheme => Err(Error::Config(format!(
            "unsupported url scheme {scheme} in {url}"
        ))),
    }
}
