//! SMTP relay transport using lettre

use super::{EmailTransport, OutboundEmail, TransportInfo};
use crate::config::EmailConfig;
use crate::error::{PipelineError, Result};
use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, Mailbox},
    transport::smtp::{authentication::Credentials, PoolConfig},
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use tracing::{error, info, warn};

/// Sends email through an SMTP relay
#[derive(Clone)]
pub struct SmtpTransport {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from_mailbox: Mailbox,
    reply_to_mailbox: Option<Mailbox>,
    description: String,
}

impl SmtpTransport {
    pub fn new(config: &EmailConfig) -> Result<Self> {
        info!(
            "Initializing SMTP transport to {}:{}",
            config.smtp_host, config.smtp_port
        );

        let from_mailbox = parse_mailbox(&config.from_header(), "from")
            .map_err(|e| PipelineError::config(e.to_string()))?;

        let reply_to_mailbox = if config.reply_to.is_empty() {
            None
        } else {
            Some(
                parse_mailbox(&config.reply_to, "reply-to")
                    .map_err(|e| PipelineError::config(e.to_string()))?,
            )
        };

        // Implicit TLS, then STARTTLS, then plaintext for local relays
        let mut transport_builder = if config.smtp_use_tls {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&config.smtp_host).map_err(|e| {
                PipelineError::config(format!("Failed to create SMTP relay: {}", e))
            })?
        } else if config.smtp_use_starttls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host).map_err(
                |e| PipelineError::config(format!("Failed to create STARTTLS relay: {}", e)),
            )?
        } else {
            warn!("SMTP transport is not encrypted");
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.smtp_host)
        };

        transport_builder = transport_builder.port(config.smtp_port);

        if !config.smtp_username.is_empty() && !config.smtp_password.is_empty() {
            let creds =
                Credentials::new(config.smtp_username.clone(), config.smtp_password.clone());
            transport_builder = transport_builder.credentials(creds);
        }

        transport_builder =
            transport_builder.pool_config(PoolConfig::new().max_size(10).min_idle(1));
        transport_builder = transport_builder.timeout(Some(config.timeout()));

        Ok(Self {
            transport: transport_builder.build(),
            from_mailbox,
            reply_to_mailbox,
            description: format!("SMTP relay {}:{}", config.smtp_host, config.smtp_port),
        })
    }

    fn build_message(&self, email: &OutboundEmail) -> Result<Message> {
        let from = match &email.from {
            Some(from) => parse_mailbox(from, "from")?,
            None => self.from_mailbox.clone(),
        };

        let mut message_builder = Message::builder()
            .from(from)
            .to(parse_mailbox(&email.to, "recipient")?)
            .subject(&email.subject);

        let reply_to = match &email.reply_to {
            Some(reply_to) => Some(parse_mailbox(reply_to, "reply-to")?),
            None => self.reply_to_mailbox.clone(),
        };
        if let Some(reply_to) = reply_to {
            message_builder = message_builder.reply_to(reply_to);
        }

        message_builder
            .header(ContentType::TEXT_HTML)
            .body(email.html.clone())
            .map_err(|e| PipelineError::email(format!("Failed to build email message: {}", e)))
    }
}

fn parse_mailbox(address: &str, role: &str) -> Result<Mailbox> {
    address
        .parse::<Mailbox>()
        .map_err(|e| PipelineError::email(format!("Invalid {} address '{}': {}", role, address, e)))
}

#[async_trait]
impl EmailTransport for SmtpTransport {
    async fn send(&self, email: &OutboundEmail) -> Result<bool> {
        let message = self.build_message(email)?;

        match self.transport.send(message).await {
            Ok(response) => {
                info!("Email accepted by SMTP relay for {}", email.to);
                Ok(response.is_positive())
            }
            Err(e) => {
                error!("SMTP relay refused email to {}: {}", email.to, e);
                Err(PipelineError::email(format!("SMTP error: {}", e)))
            }
        }
    }

    async fn health_check(&self) -> Result<bool> {
        match self.transport.test_connection().await {
            Ok(connected) => Ok(connected),
            Err(e) => {
                warn!("SMTP health check failed: {}", e);
                Ok(false)
            }
        }
    }

    fn info(&self) -> TransportInfo {
        TransportInfo {
            name: "smtp".to_string(),
            description: self.description.clone(),
            configured: true,
        }
    }
}
