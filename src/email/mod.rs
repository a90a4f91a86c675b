use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use std::sync::Arc;

use crate::config::{AppConfig, SmtpConfig};

pub mod templates;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    pub html: String,
}

#[derive(Debug, thiserror::Error)]
pub enum MailError {
    #[error("Email not configured")]
    NotConfigured,
    #[error("invalid address {0}")]
    Address(String),
    #[error("failed to build message: {0}")]
    Build(#[from] lettre::error::Error),
    #[error("SMTP error: {0}")]
    Transport(#[from] lettre::transport::smtp::Error),
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, message: EmailMessage) -> Result<(), MailError>;
}

pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpMailer {
    pub fn new(smtp: &SmtpConfig, sender_name: &str) -> Result<Self, MailError> {
        // Port 465 speaks TLS from the first byte; everything else upgrades via STARTTLS.
        let builder = if smtp.port == 465 {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&smtp.host)?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&smtp.host)?
        };
        let transport = builder
            .port(smtp.port)
            .credentials(Credentials::new(smtp.username.clone(), smtp.password.clone()))
            .build();

        let address = smtp
            .username
            .parse()
            .map_err(|_| MailError::Address(smtp.username.clone()))?;
        let from = Mailbox::new(Some(sender_name.to_string()), address);

        tracing::info!(host = %smtp.host, port = smtp.port, "Email transport initialized");
        Ok(Self { transport, from })
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, message: EmailMessage) -> Result<(), MailError> {
        let to: Mailbox = message
            .to
            .parse()
            .map_err(|_| MailError::Address(message.to.clone()))?;
        let email = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(message.subject)
            .header(ContentType::TEXT_HTML)
            .body(message.html)?;
        self.transport.send(email).await?;
        Ok(())
    }
}

/// Stand-in used when no SMTP credentials are configured; every send fails.
pub struct DisabledMailer;

#[async_trait]
impl Mailer for DisabledMailer {
    async fn send(&self, _message: EmailMessage) -> Result<(), MailError> {
        Err(MailError::NotConfigured)
    }
}

pub fn mailer_from_config(config: &AppConfig) -> Result<Arc<dyn Mailer>, MailError> {
    match &config.smtp {
        Some(smtp) => Ok(Arc::new(SmtpMailer::new(smtp, &config.foundation.name)?)),
        None => {
            tracing::warn!("Email credentials not configured. Email functionality will be disabled.");
            Ok(Arc::new(DisabledMailer))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn disabled_mailer_reports_not_configured() {
        let err = DisabledMailer
            .send(EmailMessage {
                to: "donor@example.org".into(),
                subject: "s".into(),
                html: "<p>x</p>".into(),
            })
            .await
            .expect_err("disabled");
        assert_eq!(err.to_string(), "Email not configured");
    }
}
