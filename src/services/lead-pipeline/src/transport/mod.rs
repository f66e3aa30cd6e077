//! Email transports
//!
//! A transport hands one rendered email to a relay and reports whether the
//! relay accepted it. There is no retry, queueing or rate limiting here: a
//! failed send is an error for the caller to log.
//! - [`SmtpTransport`]: any SMTP relay, via lettre
//! - [`MailgunTransport`]: the Mailgun HTTP API, via reqwest
//! - [`UnconfiguredTransport`]: stands in when the relay cannot be built
//! - [`RecordingTransport`]: keeps messages in memory instead of sending

use crate::config::{EmailConfig, EmailProvider};
use crate::error::{PipelineError, Result};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{error, info};

pub mod mailgun;
pub mod recording;
pub mod smtp;

pub use mailgun::MailgunTransport;
pub use recording::RecordingTransport;
pub use smtp::SmtpTransport;

/// One email ready to send. Unset `from` and `reply_to` take the
/// transport's configured defaults.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundEmail {
    pub to: String,
    pub subject: String,
    pub html: String,
    pub from: Option<String>,
    pub reply_to: Option<String>,
}

impl OutboundEmail {
    pub fn new(to: impl Into<String>, subject: impl Into<String>, html: impl Into<String>) -> Self {
        Self {
            to: to.into(),
            subject: subject.into(),
            html: html.into(),
            from: None,
            reply_to: None,
        }
    }

    pub fn with_reply_to(mut self, reply_to: impl Into<String>) -> Self {
        self.reply_to = Some(reply_to.into());
        self
    }

    pub fn with_from(mut self, from: impl Into<String>) -> Self {
        self.from = Some(from.into());
        self
    }
}

/// Trait every email relay implements
#[async_trait]
pub trait EmailTransport: Send + Sync {
    /// Hand the email to the relay. `Ok(true)` means it was accepted.
    async fn send(&self, email: &OutboundEmail) -> Result<bool>;

    /// Check the relay is reachable with the configured credentials
    async fn health_check(&self) -> Result<bool>;

    fn info(&self) -> TransportInfo;
}

/// Descriptive information about a transport
#[derive(Debug, Clone, serde::Serialize)]
pub struct TransportInfo {
    pub name: String,
    pub description: String,
    pub configured: bool,
}

/// Build the transport for the configured provider
///
/// Missing credentials are an error: without them no email can leave.
pub fn build_transport(config: &EmailConfig) -> Result<Arc<dyn EmailTransport>> {
    if !config.has_credentials() {
        return Err(PipelineError::config(format!(
            "{:?} provider selected but its credentials are not set",
            config.provider
        )));
    }

    let transport: Arc<dyn EmailTransport> = match config.provider {
        EmailProvider::Smtp => Arc::new(SmtpTransport::new(config)?),
        EmailProvider::Mailgun => Arc::new(MailgunTransport::new(config)?),
    };

    info!("Email transport ready: {}", transport.info().description);
    Ok(transport)
}

/// Like [`build_transport`], but a failure installs an
/// [`UnconfiguredTransport`] so the rest of the service keeps running
pub fn build_transport_or_unconfigured(config: &EmailConfig) -> Arc<dyn EmailTransport> {
    match build_transport(config) {
        Ok(transport) => transport,
        Err(e) => {
            error!(
                "Email transport unavailable, every send will fail until fixed: {}",
                e
            );
            Arc::new(UnconfiguredTransport::new(e.to_string()))
        }
    }
}

/// Transport that fails every send with the reason it could not be built
#[derive(Debug, Clone)]
pub struct UnconfiguredTransport {
    reason: String,
}

impl UnconfiguredTransport {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl EmailTransport for UnconfiguredTransport {
    async fn send(&self, email: &OutboundEmail) -> Result<bool> {
        error!("Cannot send email to {}: {}", email.to, self.reason);
        Err(PipelineError::config(self.reason.clone()))
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(false)
    }

    fn info(&self) -> TransportInfo {
        TransportInfo {
            name: "unconfigured".to_string(),
            description: self.reason.clone(),
            configured: false,
        }
    }
}
