use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{ReportSink, SinkResult, check_status, http_client};
use crate::{
    config::GithubSinkConfig,
    report::{RenderedReport, RunReport},
};

#[derive(Serialize)]
struct CreateIssue<'a> {
    title: &'a str,
    body: &'a str,
    labels: &'a [String],
}

#[derive(Deserialize)]
struct CreatedIssue {
    number: u64,
    html_url: String,
}

/// Opens one GitHub issue per run.
pub struct GithubSink {
    client: reqwest::Client,
    issues_url: String,
    token: String,
    labels: Vec<String>,
}

impl GithubSink {
    pub const NAME: &'static str = "github";

    pub fn new(config: &GithubSinkConfig, timeout: Duration) -> SinkResult<Self> {
        Ok(Self {
            client: http_client(timeout)?,
            issues_url: format!(
                "{}/repos/{}/issues",
                config.api_url.trim_end_matches('/'),
                config.repo
            ),
            token: config.token.clone(),
            labels: config.labels.clone(),
        })
    }
}

#[async_trait]
impl ReportSink for GithubSink {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    async fn deliver(&self, _report: &RunReport, rendered: &RenderedReport) -> SinkResult<String> {
        let response = self
            .client
            .post(&self.issues_url)
            .bearer_auth(&self.token)
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", "2022-11-28")
            .json(&CreateIssue {
                title: &rendered.title,
                body: &rendered.body,
                labels: &self.labels,
            })
            .send()
            .await?;

        let issue: CreatedIssue = check_status(response).await?.json().await?;
        tracing::info!(number = issue.number, url = %issue.html_url, "Created GitHub issue");

        Ok(format!("issue #{} {}", issue.number, issue.html_url))
    }
}
