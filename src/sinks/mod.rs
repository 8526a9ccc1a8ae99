//! Report delivery.
//!
//! Each sink receives the structured report and its rendering and reports
//! back its own outcome. Sinks are independent: one failing never affects
//! another.

mod email;
mod github;

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
pub use email::EmailSink;
pub use github::GithubSink;
use thiserror::Error;

use crate::{
    config::ReportingConfig,
    report::{DeliveryStatus, RenderedReport, RunReport},
};

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("Sink not configured: {0}")]
    NotConfigured(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("SMTP error: {0}")]
    Smtp(#[from] lettre::transport::smtp::Error),

    #[error("Invalid email address: {0}")]
    Address(#[from] lettre::address::AddressError),

    #[error("Failed to build email: {0}")]
    Message(#[from] lettre::error::Error),

    #[error("Unexpected response status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Delivery timed out after {0:?}")]
    Timeout(Duration),
}

pub type SinkResult<T> = Result<T, SinkError>;

impl SinkError {
    /// Map a delivery result to the status recorded in the report.
    pub fn into_status(result: SinkResult<String>) -> DeliveryStatus {
        match result {
            Ok(detail) => DeliveryStatus::Delivered { detail },
            Err(SinkError::NotConfigured(reason)) => DeliveryStatus::Skipped { reason },
            Err(e) => DeliveryStatus::Failed {
                error: e.to_string(),
            },
        }
    }
}

/// Destination for run reports.
#[async_trait]
pub trait ReportSink: Send + Sync {
    /// Stable name used as the key in the report's delivery map.
    fn name(&self) -> &'static str;

    /// Deliver the report. Returns a short description of what was created.
    async fn deliver(&self, report: &RunReport, rendered: &RenderedReport) -> SinkResult<String>;
}

/// Placeholder for a sink without configuration; always skipped.
pub struct DisabledSink {
    name: &'static str,
}

impl DisabledSink {
    pub fn new(name: &'static str) -> Self {
        Self { name }
    }
}

#[async_trait]
impl ReportSink for DisabledSink {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn deliver(&self, _report: &RunReport, _rendered: &RenderedReport) -> SinkResult<String> {
        Err(SinkError::NotConfigured(format!(
            "no [reporting.{}] section",
            self.name
        )))
    }
}

/// Build both sinks from configuration.
pub fn create_sinks(config: &ReportingConfig) -> SinkResult<Vec<Arc<dyn ReportSink>>> {
    let timeout = Duration::from_secs(config.timeout_secs);

    let github: Arc<dyn ReportSink> = match &config.github {
        Some(github) => Arc::new(GithubSink::new(github, timeout)?),
        None => Arc::new(DisabledSink::new(GithubSink::NAME)),
    };
    let email: Arc<dyn ReportSink> = match &config.email {
        Some(email) => Arc::new(EmailSink::new(email, timeout)?),
        None => Arc::new(DisabledSink::new(EmailSink::NAME)),
    };

    Ok(vec![github, email])
}

fn http_client(timeout: Duration) -> SinkResult<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(concat!("janitor/", env!("CARGO_PKG_VERSION")))
        .build()?)
}

/// Turn a non-2xx response into [`SinkError::Status`].
async fn check_status(response: reqwest::Response) -> SinkResult<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(SinkError::Status {
        status: status.as_u16(),
        body: body.chars().take(500).collect(),
    })
}
