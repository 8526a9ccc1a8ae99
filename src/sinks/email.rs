use std::time::Duration;

use async_trait::async_trait;
use lettre::{
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
    message::{Mailbox, header::ContentType},
    transport::smtp::authentication::Credentials,
};

use super::{ReportSink, SinkResult};
use crate::{
    config::EmailSinkConfig,
    report::{RenderedReport, RunReport},
};

/// Mails the report as plain text over SMTP (STARTTLS, then login).
pub struct EmailSink {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    to: Mailbox,
}

impl EmailSink {
    pub const NAME: &'static str = "email";

    /// Connections are opened per delivery; nothing is dialed here.
    pub fn new(config: &EmailSinkConfig, timeout: Duration) -> SinkResult<Self> {
        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.server)?
            .port(config.port)
            .credentials(Credentials::new(
                config.username.clone(),
                config.password.clone(),
            ))
            .timeout(Some(timeout))
            .build();

        Ok(Self {
            transport,
            from: config.sender().parse()?,
            to: config.to.parse()?,
        })
    }

    fn message(&self, report: &RunReport, rendered: &RenderedReport) -> SinkResult<Message> {
        let subject = format!(
            "TalkFlow Daily Maintenance - {}",
            report.started_at.format("%Y-%m-%d")
        );

        Ok(Message::builder()
            .from(self.from.clone())
            .to(self.to.clone())
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(rendered.body.clone())?)
    }
}

#[async_trait]
impl ReportSink for EmailSink {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    async fn deliver(&self, report: &RunReport, rendered: &RenderedReport) -> SinkResult<String> {
        let message = self.message(report, rendered)?;
        self.transport.send(message).await?;

        tracing::info!(recipient = %self.to, "Sent email report");
        Ok(format!("sent to {}", self.to.email))
    }
}
