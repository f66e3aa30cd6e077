//! Error handling for the lead pipeline
//!
//! This module defines the error types that can occur while accepting leads,
//! dispatching emails and reading the audit log, and maps them onto HTTP
//! responses.

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use studio_shared::FieldViolation;
use thiserror::Error;

/// Result type alias for lead pipeline operations
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Main error type for the lead pipeline
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Submitted lead failed validation; nothing was persisted
    #[error("Validation error: {}", summarize(.fields))]
    Validation { fields: Vec<FieldViolation> },

    /// Document store errors
    #[error("Database error: {message}")]
    Database { message: String },

    /// Email transport errors (auth failure, network error, rejected recipient)
    #[error("Email error: {message}")]
    Email { message: String },

    /// Template compilation or rendering errors
    #[error("Template error: {message}")]
    Template { message: String },

    /// Configuration errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Not found errors
    #[error("Resource not found: {resource}")]
    NotFound { resource: String },

    /// Conflict errors (e.g., duplicate audit entries)
    #[error("Conflict: {message}")]
    Conflict { message: String },

    /// Timeout errors
    #[error("Operation timed out: {operation}")]
    Timeout { operation: String },

    /// Network/connection errors
    #[error("Network error: {message}")]
    Network { message: String },

    /// Serialization/deserialization errors
    #[error("Serialization error: {message}")]
    Serialization { message: String },

    /// External service errors
    #[error("External service error: {service}: {message}")]
    ExternalService { service: String, message: String },

    /// Internal service errors
    #[error("Internal error: {message}")]
    Internal { message: String },
}

fn summarize(fields: &[FieldViolation]) -> String {
    fields
        .iter()
        .map(|f| format!("{}: {}", f.field, f.message))
        .collect::<Vec<_>>()
        .join("; ")
}

impl PipelineError {
    /// Get the HTTP status code that should be returned for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            PipelineError::Validation { .. } => StatusCode::BAD_REQUEST,
            PipelineError::Database { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            PipelineError::Email { .. } => StatusCode::BAD_GATEWAY,
            PipelineError::Template { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            PipelineError::Config { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            PipelineError::NotFound { .. } => StatusCode::NOT_FOUND,
            PipelineError::Conflict { .. } => StatusCode::CONFLICT,
            PipelineError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            PipelineError::Network { .. } => StatusCode::BAD_GATEWAY,
            PipelineError::Serialization { .. } => StatusCode::BAD_REQUEST,
            PipelineError::ExternalService { .. } => StatusCode::BAD_GATEWAY,
            PipelineError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get the error code for API responses
    pub fn error_code(&self) -> &'static str {
        match self {
            PipelineError::Validation { .. } => "VALIDATION_ERROR",
            PipelineError::Database { .. } => "DATABASE_ERROR",
            PipelineError::Email { .. } => "EMAIL_ERROR",
            PipelineError::Template { .. } => "TEMPLATE_ERROR",
            PipelineError::Config { .. } => "CONFIG_ERROR",
            PipelineError::NotFound { .. } => "NOT_FOUND",
            PipelineError::Conflict { .. } => "CONFLICT",
            PipelineError::Timeout { .. } => "TIMEOUT",
            PipelineError::Network { .. } => "NETWORK_ERROR",
            PipelineError::Serialization { .. } => "SERIALIZATION_ERROR",
            PipelineError::ExternalService { .. } => "EXTERNAL_SERVICE_ERROR",
            PipelineError::Internal { .. } => "INTERNAL_ERROR",
        }
    }

    /// Whether re-running the whole trigger invocation could succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            PipelineError::Validation { .. } => false,
            PipelineError::Database { .. } => true,
            PipelineError::Email { .. } => true,
            PipelineError::Template { .. } => false,
            PipelineError::Config { .. } => false,
            PipelineError::NotFound { .. } => false,
            PipelineError::Conflict { .. } => false,
            PipelineError::Timeout { .. } => true,
            PipelineError::Network { .. } => true,
            PipelineError::Serialization { .. } => false,
            PipelineError::ExternalService { .. } => true,
            PipelineError::Internal { .. } => true,
        }
    }
}

impl IntoResponse for PipelineError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let error_code = self.error_code();

        // Persistence failures surface as a generic message to form submitters
        let message = match &self {
            PipelineError::Database { .. } | PipelineError::Internal { .. } => {
                "Submission failed, please try again later".to_string()
            }
            other => other.to_string(),
        };

        let mut error = json!({
            "code": error_code,
            "message": message,
            "status": status.as_u16()
        });

        if let PipelineError::Validation { fields } = &self {
            error["fields"] = json!(fields);
        }

        (status, Json(json!({ "error": error }))).into_response()
    }
}

// Conversion implementations for external error types

impl From<mongodb::error::Error> for PipelineError {
    fn from(err: mongodb::error::Error) -> Self {
        PipelineError::Database {
            message: err.to_string(),
        }
    }
}

impl From<mongodb::bson::ser::Error> for PipelineError {
    fn from(err: mongodb::bson::ser::Error) -> Self {
        PipelineError::Serialization {
            message: err.to_string(),
        }
    }
}

impl From<lettre::error::Error> for PipelineError {
    fn from(err: lettre::error::Error) -> Self {
        PipelineError::Email {
            message: err.to_string(),
        }
    }
}

impl From<lettre::transport::smtp::Error> for PipelineError {
    fn from(err: lettre::transport::smtp::Error) -> Self {
        PipelineError::Email {
            message: err.to_string(),
        }
    }
}

impl From<reqwest::Error> for PipelineError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            PipelineError::Timeout {
                operation: "HTTP request".to_string(),
            }
        } else if err.is_connect() {
            PipelineError::Network {
                message: err.to_string(),
            }
        } else {
            PipelineError::ExternalService {
                service: "HTTP".to_string(),
                message: err.to_string(),
            }
        }
    }
}

impl From<serde_json::Error> for PipelineError {
    fn from(err: serde_json::Error) -> Self {
        PipelineError::Serialization {
            message: err.to_string(),
        }
    }
}

impl From<handlebars::RenderError> for PipelineError {
    fn from(err: handlebars::RenderError) -> Self {
        PipelineError::Template {
            message: err.to_string(),
        }
    }
}

impl From<handlebars::TemplateError> for PipelineError {
    fn from(err: handlebars::TemplateError) -> Self {
        PipelineError::Template {
            message: err.to_string(),
        }
    }
}

impl From<config::ConfigError> for PipelineError {
    fn from(err: config::ConfigError) -> Self {
        PipelineError::Config {
            message: err.to_string(),
        }
    }
}

impl From<tokio::time::error::Elapsed> for PipelineError {
    fn from(err: tokio::time::error::Elapsed) -> Self {
        PipelineError::Timeout {
            operation: err.to_string(),
        }
    }
}

impl From<validator::ValidationErrors> for PipelineError {
    fn from(err: validator::ValidationErrors) -> Self {
        let mut fields: Vec<FieldViolation> = err
            .field_errors()
            .iter()
            .flat_map(|(field, errors)| {
                errors.iter().map(move |e| {
                    let message = e
                        .message
                        .as_ref()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| "Invalid value".to_string());
                    FieldViolation::new(camel_case(field), message)
                })
            })
            .collect();

        // field_errors() is a HashMap; keep the report stable for clients
        fields.sort_by(|a, b| a.field.cmp(&b.field));

        PipelineError::Validation { fields }
    }
}

/// A body that is not the expected JSON shape is a validation failure on the
/// field serde tripped over, or on `body` when there is no field path
impl From<JsonRejection> for PipelineError {
    fn from(rejection: JsonRejection) -> Self {
        let (field, message) = match &rejection {
            JsonRejection::JsonDataError(e) => rejected_field(&e.body_text()),
            other => ("body".to_string(), other.body_text()),
        };
        PipelineError::validation(field, message)
    }
}

/// Split axum's "<context>: <path>: <serde message>" text into path and message
fn rejected_field(text: &str) -> (String, String) {
    let detail = text
        .split_once("target type: ")
        .map(|(_, detail)| detail)
        .unwrap_or(text);

    match detail.split_once(": ") {
        Some((path, message)) if !path.is_empty() && !path.contains(char::is_whitespace) => {
            (path.to_string(), message.to_string())
        }
        _ => ("body".to_string(), detail.to_string()),
    }
}

/// Struct fields are snake_case, the form speaks camelCase
fn camel_case(field: &str) -> String {
    let mut out = String::with_capacity(field.len());
    let mut upper = false;
    for c in field.chars() {
        if c == '_' {
            upper = true;
        } else if upper {
            out.extend(c.to_uppercase());
            upper = false;
        } else {
            out.push(c);
        }
    }
    out
}

// Utility functions for creating specific error types

impl PipelineError {
    /// Create a validation error for a single field
    pub fn validation<S1: Into<String>, S2: Into<String>>(field: S1, message: S2) -> Self {
        Self::Validation {
            fields: vec![FieldViolation::new(field, message)],
        }
    }

    /// Create a database error
    pub fn database<S: Into<String>>(message: S) -> Self {
        Self::Database {
            message: message.into(),
        }
    }

    /// Create an email error
    pub fn email<S: Into<String>>(message: S) -> Self {
        Self::Email {
            message: message.into(),
        }
    }

    /// Create a template error
    pub fn template<S: Into<String>>(message: S) -> Self {
        Self::Template {
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a not found error
    pub fn not_found<S: Into<String>>(resource: S) -> Self {
        Self::NotFound {
            resource: resource.into(),
        }
    }

    /// Create a conflict error
    pub fn conflict<S: Into<String>>(message: S) -> Self {
        Self::Conflict {
            message: message.into(),
        }
    }

    /// Create a timeout error
    pub fn timeout<S: Into<String>>(operation: S) -> Self {
        Self::Timeout {
            operation: operation.into(),
        }
    }

    /// Create a network error
    pub fn network<S: Into<String>>(message: S) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    /// Create an external service error
    pub fn external_service<S1: Into<String>, S2: Into<String>>(service: S1, message: S2) -> Self {
        Self::ExternalService {
            service: service.into(),
            message: message.into(),
        }
    }

    /// Create an internal error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use studio_shared::LeadSubmission;
    use validator::Validate;

    #[test]
    fn test_error_status_codes() {
        assert_eq!(
            PipelineError::database("test").status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            PipelineError::validation("email", "bad").status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            PipelineError::not_found("lead").status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            PipelineError::email("relay refused").status_code(),
            StatusCode::BAD_GATEWAY
        );
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(PipelineError::database("test").error_code(), "DATABASE_ERROR");
        assert_eq!(
            PipelineError::validation("field", "message").error_code(),
            "VALIDATION_ERROR"
        );
        assert_eq!(PipelineError::conflict("dup").error_code(), "CONFLICT");
    }

    #[test]
    fn test_retryable_errors() {
        assert!(PipelineError::database("test").is_retryable());
        assert!(PipelineError::email("smtp down").is_retryable());
        assert!(!PipelineError::validation("field", "message").is_retryable());
        assert!(!PipelineError::config("no credentials").is_retryable());
    }

    #[test]
    fn test_error_display() {
        let error = PipelineError::database("Connection failed");
        assert_eq!(error.to_string(), "Database error: Connection failed");

        let error = PipelineError::validation("email", "A valid email address is required");
        assert_eq!(
            error.to_string(),
            "Validation error: email: A valid email address is required"
        );
    }

    #[test]
    fn test_validation_errors_stay_structured() {
        let submission = LeadSubmission {
            first_name: "Sarah".to_string(),
            ..Default::default()
        };
        let error: PipelineError = submission.validate().unwrap_err().into();

        match error {
            PipelineError::Validation { fields } => {
                let names: Vec<&str> = fields.iter().map(|f| f.field.as_str()).collect();
                assert_eq!(names, vec!["email", "lastName"]);
                assert_eq!(fields[1].message, "Last name is required");
            }
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn test_rejected_field_names_the_json_path() {
        let (field, message) = rejected_field(
            "Failed to deserialize the JSON body into the target type: preferredStyle: invalid type: string \"candid\", expected a sequence at line 1 column 30",
        );
        assert_eq!(field, "preferredStyle");
        assert!(message.starts_with("invalid type: string"));

        let (field, _) = rejected_field(
            "Failed to deserialize the JSON body into the target type: invalid type: integer `7`, expected a map",
        );
        assert_eq!(field, "body");
    }

    #[test]
    fn test_camel_case() {
        assert_eq!(camel_case("first_name"), "firstName");
        assert_eq!(camel_case("email"), "email");
        assert_eq!(camel_case("how_heard_about_us"), "howHeardAboutUs");
    }

    #[test]
    fn test_from_conversions() {
        let json_error = serde_json::from_str::<serde_json::Value>("invalid json");
        assert!(json_error.is_err());
        let error: PipelineError = json_error.unwrap_err().into();
        assert!(matches!(error, PipelineError::Serialization { .. }));
    }
}
