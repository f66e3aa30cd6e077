//! # Lead Pipeline
//!
//! Lead intake and notification service for a photography studio:
//! - Contact form intake with field-level validation
//! - Lead documents in MongoDB, or in memory for local runs and tests
//! - A lead-created trigger that emails the prospective client and the
//!   studio owner
//! - An email audit log that makes redelivered triggers harmless
//!
//! ## Flow
//!
//! `submit_contact_form` validates and writes a lead. The store's change
//! feed (a MongoDB change stream, or a broadcast channel in memory) emits a
//! [`LeadCreated`], and the [`trigger::TriggerListener`] hands it to the
//! [`dispatcher::TriggerDispatcher`]. The dispatcher checks the booking
//! calendar, renders both emails, sends each through the configured
//! [`transport::EmailTransport`] and records every successful send.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use lead_pipeline::{
//!     store::{InMemoryStore, StoreHandles},
//!     transport::RecordingTransport,
//!     LeadPipeline, LeadSubmission, PipelineConfig,
//! };
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let pipeline = LeadPipeline::new(
//!         PipelineConfig::default(),
//!         StoreHandles::in_memory(Arc::new(InMemoryStore::new())),
//!         Arc::new(RecordingTransport::new()),
//!     )?;
//!
//!     let id = pipeline
//!         .submit_contact_form(LeadSubmission {
//!             first_name: "Sarah".to_string(),
//!             last_name: "Johnson".to_string(),
//!             email: "sarah@example.com".to_string(),
//!             ..Default::default()
//!         })
//!         .await?;
//!     println!("Lead stored: {}", id);
//!
//!     Ok(())
//! }
//! ```

pub mod audit;
pub mod availability;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod handlers;
pub mod intake;
pub mod metrics;
pub mod pipeline;
pub mod routes;
pub mod store;
pub mod templates;
pub mod transport;
pub mod trigger;

pub use config::PipelineConfig;
pub use error::{PipelineError, Result};
pub use pipeline::LeadPipeline;

// Re-export shared types for convenience
pub use studio_shared::{
    AuditQuery, DeliveryOutcome, DispatchReport, EmailAuditRecord, EmailDispatchResult, EmailType,
    EventType, FieldViolation, Lead, LeadCreated, LeadStatus, LeadSubmission, ListLeadsQuery,
    SubmitLeadResponse, UpdateLeadStatusRequest,
};
