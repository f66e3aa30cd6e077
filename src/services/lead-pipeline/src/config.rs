//! Configuration module for the lead pipeline
//!
//! This module provides configuration structures and defaults for the HTTP
//! server, the document store, the email relay, the studio's business details
//! and the trigger listener.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Environment prefix for overrides, e.g. `LEAD_PIPELINE__EMAIL__SMTP_HOST`
pub const ENV_PREFIX: &str = "LEAD_PIPELINE";

/// Optional config file consulted by [`PipelineConfig::from_env`]
pub const CONFIG_FILE_VAR: &str = "LEAD_PIPELINE_CONFIG_FILE";

/// Main configuration structure for the lead pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Server configuration
    pub server: ServerConfig,

    /// Document store configuration
    pub database: DatabaseConfig,

    /// Email relay configuration
    pub email: EmailConfig,

    /// Business details rendered into emails
    pub business: BusinessConfig,

    /// Trigger listener configuration
    pub trigger: TriggerConfig,

    /// Metrics configuration
    pub metrics: MetricsConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub timeout_seconds: u64,
}

/// Document store configuration. An empty `mongo_url` selects the in-memory
/// store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub mongo_url: String,
    pub database_name: String,
    pub leads_collection: String,
    pub audit_collection: String,
    pub bookings_collection: String,
    pub connection_timeout_seconds: u64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EmailProvider {
    Smtp,
    Mailgun,
}

/// Email configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailConfig {
    pub provider: EmailProvider,
    pub smtp_host: String,
    pub smtp_port: u16,
    pub smtp_username: String,
    pub smtp_password: String,
    pub smtp_use_tls: bool,
    pub smtp_use_starttls: bool,
    pub mailgun: MailgunConfig,
    pub from_email: String,
    pub from_name: String,
    pub reply_to: String,
    /// Where internal lead notifications go
    pub admin_email: String,
    pub timeout_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MailgunConfig {
    pub api_key: String,
    pub domain: String,
    pub base_url: String,
}

/// Studio details shown in the client email signature and footer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusinessConfig {
    pub name: String,
    pub photographer_name: String,
    pub phone: String,
    pub website: String,
    pub instagram: Option<String>,
}

/// Trigger listener configuration
///
/// Redelivery re-runs a whole dispatcher invocation; the dispatcher itself
/// never retries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerConfig {
    pub enabled: bool,
    pub max_redeliveries: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_multiplier: f64,
}

/// Metrics configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub namespace: String,
    pub histogram_buckets: Vec<f64>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            database: DatabaseConfig::default(),
            email: EmailConfig::default(),
            business: BusinessConfig::default(),
            trigger: TriggerConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8090,
            timeout_seconds: 30,
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            mongo_url: String::new(),
            database_name: "studio".to_string(),
            leads_collection: "leads".to_string(),
            audit_collection: "leads_emails".to_string(),
            bookings_collection: "bookings".to_string(),
            connection_timeout_seconds: 10,
        }
    }
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            provider: EmailProvider::Smtp,
            smtp_host: "localhost".to_string(),
            smtp_port: 587,
            smtp_username: String::new(),
            smtp_password: String::new(),
            smtp_use_tls: false,
            smtp_use_starttls: true,
            mailgun: MailgunConfig::default(),
            from_email: "hello@studio.example".to_string(),
            from_name: "Studio Bookings".to_string(),
            reply_to: "support@studio.example".to_string(),
            admin_email: "owner@studio.example".to_string(),
            timeout_seconds: 30,
        }
    }
}

impl Default for MailgunConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            domain: String::new(),
            base_url: "https://api.mailgun.net".to_string(),
        }
    }
}

impl Default for BusinessConfig {
    fn default() -> Self {
        Self {
            name: "Studio Photography".to_string(),
            photographer_name: "The Studio Team".to_string(),
            phone: "(555) 010-0199".to_string(),
            website: "https://studio.example".to_string(),
            instagram: None,
        }
    }
}

impl Default for TriggerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_redeliveries: 3,
            initial_delay_ms: 1_000,
            max_delay_ms: 60_000,
            backoff_multiplier: 2.0,
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            namespace: "lead_pipeline".to_string(),
            histogram_buckets: vec![0.005, 0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0],
        }
    }
}

impl EmailConfig {
    /// `Name <address>` form of the default sender
    pub fn from_header(&self) -> String {
        format!("{} <{}>", self.from_name, self.from_email)
    }

    /// Whether the selected provider has the secrets it needs to send
    pub fn has_credentials(&self) -> bool {
        match self.provider {
            EmailProvider::Smtp => {
                !self.smtp_username.is_empty() && !self.smtp_password.is_empty()
            }
            EmailProvider::Mailgun => !self.mailgun.api_key.is_empty(),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

impl TriggerConfig {
    /// Backoff before redelivery number `attempt` (1-based)
    pub fn redelivery_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1) as i32;
        let delay = self.initial_delay_ms as f64 * self.backoff_multiplier.powi(exponent);
        Duration::from_millis(delay.min(self.max_delay_ms as f64) as u64)
    }
}

impl PipelineConfig {
    /// Load configuration from defaults, an optional file and the environment
    pub fn from_env() -> Result<Self, config::ConfigError> {
        Self::load(None)
    }

    /// Like [`PipelineConfig::from_env`], with an explicit file that must
    /// exist. Without one, the file named by `LEAD_PIPELINE_CONFIG_FILE` is
    /// read when present.
    pub fn load(config_file: Option<&str>) -> Result<Self, config::ConfigError> {
        let mut cfg = config::Config::builder();

        // Start with default configuration
        cfg = cfg.add_source(config::Config::try_from(&PipelineConfig::default())?);

        match config_file {
            Some(path) => {
                cfg = cfg.add_source(config::File::with_name(path).required(true));
            }
            None => {
                if let Ok(path) = std::env::var(CONFIG_FILE_VAR) {
                    cfg = cfg.add_source(config::File::with_name(&path).required(false));
                }
            }
        }

        // Environment wins over the file
        cfg = cfg.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        cfg.build()?.try_deserialize()
    }

    /// Validate the configuration
    ///
    /// Missing relay credentials are deliberately not checked here: the
    /// service still accepts leads and reports the broken relay per send.
    pub fn validate(&self) -> Result<(), String> {
        if self.server.port == 0 {
            return Err("Server port must be greater than 0".to_string());
        }

        if self.email.from_email.is_empty() {
            return Err("From email is required".to_string());
        }

        if self.email.admin_email.is_empty() {
            return Err("Admin notification email is required".to_string());
        }

        match self.email.provider {
            EmailProvider::Smtp => {
                if self.email.smtp_host.is_empty() {
                    return Err("SMTP host is required when the SMTP provider is selected".to_string());
                }
            }
            EmailProvider::Mailgun => {
                if self.email.mailgun.domain.is_empty() {
                    return Err(
                        "Mailgun domain is required when the Mailgun provider is selected"
                            .to_string(),
                    );
                }
            }
        }

        if self.trigger.backoff_multiplier < 1.0 {
            return Err("Backoff multiplier must be at least 1.0".to_string());
        }

        Ok(())
    }

    /// Whether a MongoDB backend is configured
    pub fn uses_mongo(&self) -> bool {
        !self.database.mongo_url.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = PipelineConfig::default();
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 8090);
        assert_eq!(config.email.provider, EmailProvider::Smtp);
        assert_eq!(config.database.audit_collection, "leads_emails");
        assert!(!config.uses_mongo());
        assert!(config.trigger.enabled);
    }

    #[test]
    fn test_config_validation() {
        let config = PipelineConfig::default();
        assert!(config.validate().is_ok());

        let mut invalid = config.clone();
        invalid.server.port = 0;
        assert!(invalid.validate().is_err());

        let mut invalid = config.clone();
        invalid.email.provider = EmailProvider::Mailgun;
        assert!(invalid.validate().is_err());

        let mut invalid = config;
        invalid.email.admin_email.clear();
        assert!(invalid.validate().is_err());
    }

    #[test]
    fn test_missing_credentials_do_not_fail_validation() {
        let config = PipelineConfig::default();
        assert!(!config.email.has_credentials());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_redelivery_backoff_is_capped() {
        let trigger = TriggerConfig {
            initial_delay_ms: 100,
            max_delay_ms: 350,
            backoff_multiplier: 2.0,
            ..TriggerConfig::default()
        };
        assert_eq!(trigger.redelivery_delay(1), Duration::from_millis(100));
        assert_eq!(trigger.redelivery_delay(2), Duration::from_millis(200));
        assert_eq!(trigger.redelivery_delay(3), Duration::from_millis(350));
    }

    #[test]
    #[serial]
    fn test_environment_overrides() {
        std::env::set_var("LEAD_PIPELINE__SERVER__PORT", "9191");
        std::env::set_var("LEAD_PIPELINE__EMAIL__ADMIN_EMAIL", "bookings@studio.example");
        let config = PipelineConfig::from_env();
        std::env::remove_var("LEAD_PIPELINE__SERVER__PORT");
        std::env::remove_var("LEAD_PIPELINE__EMAIL__ADMIN_EMAIL");

        let config = config.unwrap();
        assert_eq!(config.server.port, 9191);
        assert_eq!(config.email.admin_email, "bookings@studio.example");
    }

    #[test]
    #[serial]
    fn test_config_file_source() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[business]\nname = \"Golden Hour Studio\"").unwrap();

        std::env::set_var(CONFIG_FILE_VAR, file.path());
        let config = PipelineConfig::from_env();
        std::env::remove_var(CONFIG_FILE_VAR);

        assert_eq!(config.unwrap().business.name, "Golden Hour Studio");
    }

    #[test]
    #[serial]
    fn test_explicit_config_file_must_exist() {
        let result = PipelineConfig::load(Some("/nonexistent/lead-pipeline.toml"));
        assert!(result.is_err());
    }

    #[test]
    #[serial]
    fn test_explicit_config_file_is_read() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[server]\nport = 8181").unwrap();

        let path = file.path().to_string_lossy().to_string();
        let config = PipelineConfig::load(Some(&path)).unwrap();
        assert_eq!(config.server.port, 8181);
    }
}
