//! Robot configuration, read from a TOML file.
//!
//! # Configuration File Format
//!
//! ```toml
//! repository = "git@github.com:example/site.git"
//! clone_dir = "./repo"
//! state_dir = "./state"
//! tracking = { mode = "single", branch = "master" }
//!
//! [webhooks]
//! port = 3637
//! path = "webhooks"
//! secret = "change-me"   # or ROBOT_WEBHOOK_SECRET
//!
//! [pipeline]
//! branches = ["master"]  # empty or absent: build every tracked branch
//!
//! [[pipeline.steps]]
//! name = "install"
//! command = "npm install"
//!
//! [[pipeline.steps]]
//! name = "deploy"
//! command = "./deploy.sh {branch} {short_hash}"
//! cwd = "scripts"
//! ```

use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::orchestrator::TrackingMode;
use crate::persistence::HISTORY_FILE;
use crate::pipeline::PipelineConfig;

/// Errors from loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("`repository` must not be empty")]
    MissingRepository,

    #[error("no webhook secret configured (set `webhooks.secret` or ROBOT_WEBHOOK_SECRET)")]
    MissingSecret,

    #[error("webhook path {0:?} must be a single non-empty path segment")]
    InvalidWebhookPath(String),

    #[error("`tracking.branch` must not be empty")]
    EmptyTrackedBranch,

    #[error("the pipeline has no steps")]
    NoSteps,

    #[error("pipeline step {0:?} has an empty command")]
    EmptyCommand(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RobotConfig {
    /// Clone URL of the tracked repository.
    pub repository: String,

    /// Where the working copy lives (default: `./repo`).
    #[serde(default = "default_clone_dir")]
    pub clone_dir: PathBuf,

    /// Where the build history lives (default: `./state`).
    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,

    #[serde(default)]
    pub tracking: TrackingMode,

    #[serde(default)]
    pub webhooks: WebhookConfig,

    pub pipeline: PipelineConfig,
}

/// The `[webhooks]` table.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WebhookConfig {
    #[serde(default = "default_port")]
    pub port: u16,

    /// Path segment the webhook endpoint listens on.
    #[serde(default = "default_webhook_path")]
    pub path: String,

    #[serde(default)]
    pub secret: Option<String>,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        WebhookConfig {
            port: default_port(),
            path: default_webhook_path(),
            secret: None,
        }
    }
}

fn default_clone_dir() -> PathBuf {
    PathBuf::from("./repo")
}

fn default_state_dir() -> PathBuf {
    PathBuf::from("./state")
}

fn default_port() -> u16 {
    3637
}

fn default_webhook_path() -> String {
    "webhooks".to_string()
}

impl RobotConfig {
    /// Reads and parses a configuration file. Call [`validate`](Self::validate)
    /// after applying overrides.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&text)
    }

    pub fn parse(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Replaces the file's webhook secret, e.g. with one from the environment.
    pub fn override_secret(&mut self, secret: Option<String>) {
        if let Some(secret) = secret {
            self.webhooks.secret = Some(secret);
        }
    }

    /// Checks everything the robot needs before it starts.
    pub fn validate(&self) -> Result<()> {
        if self.repository.trim().is_empty() {
            return Err(ConfigError::MissingRepository);
        }
        if self.webhook_secret().is_none() {
            return Err(ConfigError::MissingSecret);
        }

        let path = &self.webhooks.path;
        if path.is_empty() || path.contains('/') {
            return Err(ConfigError::InvalidWebhookPath(path.clone()));
        }

        if let TrackingMode::Single { branch } = &self.tracking
            && branch.trim().is_empty()
        {
            return Err(ConfigError::EmptyTrackedBranch);
        }

        if self.pipeline.steps.is_empty() {
            return Err(ConfigError::NoSteps);
        }
        if let Some(step) = self
            .pipeline
            .steps
            .iter()
            .find(|s| s.command.trim().is_empty())
        {
            return Err(ConfigError::EmptyCommand(step.name.clone()));
        }
        Ok(())
    }

    /// The configured secret, if it is non-empty.
    pub fn webhook_secret(&self) -> Option<&str> {
        self.webhooks.secret.as_deref().filter(|s| !s.is_empty())
    }

    pub fn history_path(&self) -> PathBuf {
        self.state_dir.join(HISTORY_FILE)
    }
}
