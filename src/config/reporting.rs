use serde::{Deserialize, Serialize};

use super::ConfigError;

/// Report delivery configuration.
///
/// Each sink is optional. An unconfigured sink is recorded in the report as
/// skipped.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReportingConfig {
    /// Open a GitHub issue per run.
    #[serde(default)]
    pub github: Option<GithubSinkConfig>,

    /// Email the report over SMTP.
    #[serde(default)]
    pub email: Option<EmailSinkConfig>,

    /// Timeout for each delivery, in seconds.
    #[serde(default = "default_delivery_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ReportingConfig {
    fn default() -> Self {
        Self {
            github: None,
            email: None,
            timeout_secs: default_delivery_timeout_secs(),
        }
    }
}

impl ReportingConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(github) = &self.github {
            github.validate()?;
        }
        if let Some(email) = &self.email {
            email.validate()?;
        }
        if self.timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "reporting.timeout_secs must be greater than 0".into(),
            ));
        }
        Ok(())
    }
}

fn default_delivery_timeout_secs() -> u64 {
    30
}

/// GitHub issue sink.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GithubSinkConfig {
    /// Token with permission to create issues.
    pub token: String,

    /// Repository in `owner/name` form.
    pub repo: String,

    /// Labels attached to each issue.
    #[serde(default = "default_labels")]
    pub labels: Vec<String>,

    /// API base URL. Override for GitHub Enterprise.
    #[serde(default = "default_api_url")]
    pub api_url: String,
}

impl GithubSinkConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.token.is_empty() {
            return Err(ConfigError::Validation(
                "reporting.github.token cannot be empty".into(),
            ));
        }
        match self.repo.split_once('/') {
            Some((owner, name)) if !owner.is_empty() && !name.is_empty() && !name.contains('/') => {
                Ok(())
            }
            _ => Err(ConfigError::Validation(format!(
                "reporting.github.repo must be 'owner/name', got '{}'",
                self.repo
            ))),
        }
    }
}

fn default_labels() -> Vec<String> {
    vec!["maintenance".into(), "daily-report".into()]
}

fn default_api_url() -> String {
    "https://api.github.com".into()
}

/// Email sink, delivered over SMTP with STARTTLS and login.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EmailSinkConfig {
    /// SMTP relay host.
    #[serde(default = "default_smtp_server")]
    pub server: String,

    /// SMTP submission port.
    #[serde(default = "default_smtp_port")]
    pub port: u16,

    /// Login user. Also the sender address unless `from` is set.
    pub username: String,

    /// Login password.
    pub password: String,

    /// Sender address. Defaults to `username`.
    #[serde(default)]
    pub from: Option<String>,

    /// Recipient address.
    pub to: String,
}

impl EmailSinkConfig {
    /// The sender address in effect.
    pub fn sender(&self) -> &str {
        self.from.as_deref().unwrap_or(&self.username)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.server.trim().is_empty() {
            return Err(ConfigError::Validation(
                "reporting.email.server cannot be empty".into(),
            ));
        }
        if self.port == 0 {
            return Err(ConfigError::Validation(
                "reporting.email.port must be greater than 0".into(),
            ));
        }
        if self.username.is_empty() || self.password.is_empty() {
            return Err(ConfigError::Validation(
                "reporting.email.username and reporting.email.password are required".into(),
            ));
        }
        for (field, addr) in [("from", self.sender()), ("to", self.to.as_str())] {
            if !addr.contains('@') {
                return Err(ConfigError::Validation(format!(
                    "reporting.email.{field} is not an email address: '{addr}'"
                )));
            }
        }
        Ok(())
    }
}

fn default_smtp_server() -> String {
    "smtp.gmail.com".into()
}

fn default_smtp_port() -> u16 {
    587
}
