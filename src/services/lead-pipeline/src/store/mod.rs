//! Document store access
//!
//! The pipeline talks to its backing store only through the traits in this
//! module. Two backends exist:
//! - [`MongoStore`]: MongoDB collections plus a change stream on `leads`
//! - [`InMemoryStore`]: process-local maps plus a broadcast change feed
//!
//! Both publish a [`LeadCreated`] for every inserted lead; that feed is what
//! decouples the intake side from the dispatcher.

use crate::error::Result;
use async_trait::async_trait;
use chrono::NaiveDate;
use futures::stream::BoxStream;
use std::sync::Arc;
use studio_shared::{AuditQuery, EmailAuditRecord, EmailType, Lead, LeadCreated, LeadStatus};

pub mod memory;
pub mod mongo;

pub use memory::InMemoryStore;
pub use mongo::MongoStore;

/// Stream of lead-creation events from a store's change feed
pub type LeadEventStream = BoxStream<'static, Result<LeadCreated>>;

/// Default page size when a listing gives no limit
pub const DEFAULT_LIST_LIMIT: u32 = 100;
pub const MAX_LIST_LIMIT: u32 = 1000;

/// Lead documents
#[async_trait]
pub trait LeadRepository: Send + Sync {
    /// Write a new lead. The write is atomic: on error nothing was stored.
    async fn insert_lead(&self, lead: &Lead) -> Result<()>;

    async fn get_lead(&self, id: &str) -> Result<Option<Lead>>;

    /// Newest first
    async fn list_leads(&self, status: Option<LeadStatus>, limit: u32) -> Result<Vec<Lead>>;

    /// Move a lead to `status`, stamping `updatedAt`. `None` if no such lead.
    async fn update_lead_status(&self, id: &str, status: LeadStatus) -> Result<Option<Lead>>;

    /// Round-trip to the backend
    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

/// Append-only email audit log
#[async_trait]
pub trait AuditRepository: Send + Sync {
    /// Append one record. A second record for the same lead and type is a
    /// `Conflict` on backends that enforce uniqueness.
    async fn record(&self, entry: &EmailAuditRecord) -> Result<()>;

    async fn has_sent(&self, lead_id: &str, email_type: EmailType) -> Result<bool>;

    /// Newest first
    async fn query(&self, query: &AuditQuery) -> Result<Vec<EmailAuditRecord>>;
}

/// Booking calendar used for the availability sentence
#[async_trait]
pub trait BookingCalendar: Send + Sync {
    /// A date is free unless a booking that is not cancelled sits on it
    async fn is_date_available(&self, date: NaiveDate) -> Result<bool>;
}

/// Source of lead-created notifications
pub trait LeadChangeFeed: Send + Sync {
    fn subscribe(&self) -> Result<LeadEventStream>;
}

/// A booking document; only date and status matter to the pipeline
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Booking {
    pub date: String,
    #[serde(default = "Booking::default_status")]
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_name: Option<String>,
}

impl Booking {
    pub const CANCELLED: &'static str = "cancelled";

    pub fn confirmed(date: NaiveDate) -> Self {
        Self {
            date: date.format("%Y-%m-%d").to_string(),
            status: Self::default_status(),
            client_name: None,
        }
    }

    fn default_status() -> String {
        "confirmed".to_string()
    }

    pub fn blocks(&self, date: NaiveDate) -> bool {
        self.status != Self::CANCELLED && self.date == date.format("%Y-%m-%d").to_string()
    }
}

/// Everything the pipeline needs from a backend, behind one handle
pub trait DocumentStore:
    LeadRepository + AuditRepository + BookingCalendar + LeadChangeFeed
{
}

impl<T> DocumentStore for T where
    T: LeadRepository + AuditRepository + BookingCalendar + LeadChangeFeed
{
}

/// One backend seen through each of its roles
#[derive(Clone)]
pub struct StoreHandles {
    pub backend: &'static str,
    pub leads: Arc<dyn LeadRepository>,
    pub audit: Arc<dyn AuditRepository>,
    pub calendar: Arc<dyn BookingCalendar>,
    pub feed: Arc<dyn LeadChangeFeed>,
}

impl StoreHandles {
    pub fn new<S>(backend: &'static str, store: Arc<S>) -> Self
    where
        S: DocumentStore + 'static,
    {
        Self {
            backend,
            leads: store.clone(),
            audit: store.clone(),
            calendar: store.clone(),
            feed: store,
        }
    }

    pub fn in_memory(store: Arc<InMemoryStore>) -> Self {
        Self::new("memory", store)
    }

    pub fn mongo(store: Arc<MongoStore>) -> Self {
        Self::new("mongodb", store)
    }
}

pub(crate) fn clamp_limit(limit: Option<u32>) -> u32 {
    limit.unwrap_or(DEFAULT_LIST_LIMIT).clamp(1, MAX_LIST_LIMIT)
}
