//! Shared type definitions for the studio lead pipeline

pub mod api;
pub mod core;
pub mod events;

pub use api::{
    AuditQuery, DeliveryOutcome, DispatchReport, EmailDispatchResult, FieldViolation,
    ListLeadsQuery, SubmitLeadResponse, UpdateLeadStatusRequest,
};
pub use core::{
    EmailAuditRecord, EmailType, EventType, Lead, LeadStatus, LeadSubmission, UnknownVariant,
    DEFAULT_LEAD_SOURCE,
};
pub use events::LeadCreated;
