use std::{io::ErrorKind, path::Path, time::Duration};

use base64::{Engine, engine::general_purpose::STANDARD};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read { path: String, source: std::io::Error },
    #[error("failed to parse {path}: {source}")]
    Parse { path: String, source: serde_yaml::Error },
    #[error("missing required setting {0}")]
    Missing(&'static str),
    #[error("invalid value for {key}: {message}")]
    Invalid { key: &'static str, message: String },
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub github: GitHubConfig,
    pub slack: SlackConfig,
    pub worker: WorkerConfig,
    /// Run in order against every commit.
    pub checkers: Vec<CheckerConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            github: GitHubConfig::default(),
            slack: SlackConfig::default(),
            worker: WorkerConfig::default(),
            checkers: default_checkers(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self { Self { port: 5000 } }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct GitHubConfig {
    pub app: GitHubAppConfig,
    pub welcome_issue: WelcomeIssueConfig,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct GitHubAppConfig {
    pub id: u64,
    pub webhook_secret: String,
    /// PEM document, or the same document base64-encoded.
    pub private_key: String,
}

impl GitHubAppConfig {
    /// Returns the private key as PEM, decoding it first if it was given as base64.
    pub fn private_key_pem(&self) -> Result<String, ConfigError> {
        let key = self.private_key.trim();
        if key.starts_with("-----BEGIN") {
            return Ok(key.to_string());
        }
        let invalid =
            |message: String| ConfigError::Invalid { key: "github.app.private_key", message };
        let decoded = STANDARD.decode(key).map_err(|e| invalid(e.to_string()))?;
        String::from_utf8(decoded).map_err(|e| invalid(e.to_string()))
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct WelcomeIssueConfig {
    pub title: String,
    pub body: String,
}

impl Default for WelcomeIssueConfig {
    fn default() -> Self {
        Self { title: "Thanks for installing my bot".to_string(), body: "Thanks!".to_string() }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct SlackConfig {
    pub webhook_url: Option<Url>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct WorkerConfig {
    pub queue_capacity: usize,
    pub clone_timeout_secs: u64,
    pub checkout_timeout_secs: u64,
    pub checker_timeout_secs: u64,
    pub notify_timeout_secs: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 100,
            clone_timeout_secs: 300,
            checkout_timeout_secs: 60,
            checker_timeout_secs: 300,
            notify_timeout_secs: 30,
        }
    }
}

impl WorkerConfig {
    pub fn clone_timeout(&self) -> Duration { Duration::from_secs(self.clone_timeout_secs) }

    pub fn checkout_timeout(&self) -> Duration { Duration::from_secs(self.checkout_timeout_secs) }

    pub fn checker_timeout(&self) -> Duration { Duration::from_secs(self.checker_timeout_secs) }

    pub fn notify_timeout(&self) -> Duration { Duration::from_secs(self.notify_timeout_secs) }
}

/// An external checker executable. The changed file paths are appended to `command`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct CheckerConfig {
    pub name: String,
    pub command: Vec<String>,
}

impl CheckerConfig {
    pub fn new(name: &str, command: &[&str]) -> Self {
        Self { name: name.to_string(), command: command.iter().map(|s| s.to_string()).collect() }
    }
}

pub fn default_checkers() -> Vec<CheckerConfig> {
    vec![
        CheckerConfig::new("filename", &["pii_secret_filename"]),
        CheckerConfig::new("file-content", &["pii_secret_file_content"]),
        CheckerConfig::new("file-content-ner", &["pii_secret_file_content_ner"]),
    ]
}

impl Config {
    /// Load the config file (if present), overlay the process environment and validate.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::from_file(path)?;
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// A missing file yields the defaults so that the environment alone can configure the service.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let shown = path.display().to_string();
        match std::fs::read_to_string(path) {
            Ok(contents) => Self::from_yaml(&contents)
                .map_err(|source| ConfigError::Parse { path: shown, source }),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::info!("No config file at {shown}, using environment only");
                Ok(Self::default())
            }
            Err(source) => Err(ConfigError::Read { path: shown, source }),
        }
    }

    pub fn from_yaml(contents: &str) -> Result<Self, serde_yaml::Error> {
        // An empty document deserializes to unit, not to an empty mapping.
        if contents.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(contents)
    }

    pub fn apply_env(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(port) = lookup("PORT") {
            self.server.port = port.parse().map_err(|_| ConfigError::Invalid {
                key: "PORT",
                message: format!("{port:?} is not a port number"),
            })?;
        }
        if let Some(secret) = lookup("GITHUB_WEBHOOK_SECRET") {
            self.github.app.webhook_secret = secret;
        }
        if let Some(id) = lookup("GITHUB_APP_ID") {
            self.github.app.id = id.parse().map_err(|_| ConfigError::Invalid {
                key: "GITHUB_APP_ID",
                message: format!("{id:?} is not a numeric app ID"),
            })?;
        }
        if let Some(key) = lookup("GITHUB_PRIVATE_KEY") {
            self.github.app.private_key = key;
        }
        if let Some(url) = lookup("SLACK_NOTIFY_URL") {
            let url = Url::parse(&url).map_err(|e| ConfigError::Invalid {
                key: "SLACK_NOTIFY_URL",
                message: e.to_string(),
            })?;
            self.slack.webhook_url = Some(url);
        }
        Ok(())
    }

    /// Rejects incomplete configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.github.app.webhook_secret.is_empty() {
            return Err(ConfigError::Missing("github.app.webhook_secret (GITHUB_WEBHOOK_SECRET)"));
        }
        if self.github.app.id == 0 {
            return Err(ConfigError::Missing("github.app.id (GITHUB_APP_ID)"));
        }
        if self.github.app.private_key.trim().is_empty() {
            return Err(ConfigError::Missing("github.app.private_key (GITHUB_PRIVATE_KEY)"));
        }
        self.github.app.private_key_pem()?;
        if self.slack.webhook_url.is_none() {
            return Err(ConfigError::Missing("slack.webhook_url (SLACK_NOTIFY_URL)"));
        }
        if self.worker.queue_capacity == 0 {
            return Err(ConfigError::Invalid {
                key: "worker.queue_capacity",
                message: "must be at least 1".to_string(),
            });
        }
        if self.checkers.is_empty() {
            return Err(ConfigError::Invalid {
                key: "checkers",
                message: "at least one checker is required".to_string(),
            });
        }
        if let Some(checker) = self.checkers.iter().find(|c| c.command.is_empty()) {
            return Err(ConfigError::Invalid {
                key: "checkers",
                message: format!("checker {:?} has an empty command", checker.name),
            });
        }
        Ok(())
    }
}
