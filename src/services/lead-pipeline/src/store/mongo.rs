//! MongoDB document store
//!
//! Leads, audit entries and bookings each live in their own collection.
//! New leads are observed through a change stream on the leads collection,
//! which requires the server to run as a replica set.
//!
//! Documents are written through storage structs that keep timestamps as
//! BSON dates, so `createdAt` and `sentAt` sort and compare as dates.

use super::{
    clamp_limit, AuditRepository, Booking, BookingCalendar, LeadChangeFeed, LeadEventStream,
    LeadRepository,
};
use crate::config::DatabaseConfig;
use crate::error::{PipelineError, Result};
use async_trait::async_trait;
use bson::serde_helpers::chrono_datetime_as_bson_datetime;
use chrono::{DateTime, NaiveDate, Utc};
use futures::stream::{self, StreamExt, TryStreamExt};
use mongodb::{
    bson::{doc, Document},
    change_stream::event::ResumeToken,
    error::{ErrorKind, WriteFailure},
    options::{
        ChangeStreamOptions, ClientOptions, FindOneAndUpdateOptions, FindOptions, IndexOptions,
        ReturnDocument,
    },
    Client, Collection, Database, IndexModel,
};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use studio_shared::{
    AuditQuery, EmailAuditRecord, EmailType, EventType, Lead, LeadCreated, LeadStatus,
};
use tracing::{debug, info};

const DUPLICATE_KEY: i32 = 11000;

/// MongoDB-backed implementation of every store trait
#[derive(Clone)]
pub struct MongoStore {
    database: Database,
    leads: Collection<LeadDocument>,
    audit: Collection<AuditDocument>,
    bookings: Collection<Booking>,
    /// Last change seen, so a resubscription continues where the old
    /// stream stopped
    resume_token: Arc<Mutex<Option<ResumeToken>>>,
}

impl MongoStore {
    /// Connect, verify the server answers a ping and make sure indexes exist
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        info!("Initializing MongoDB connection to database {}", config.database_name);

        let mut client_options = ClientOptions::parse(&config.mongo_url).await.map_err(|e| {
            PipelineError::config(format!("Invalid MongoDB connection string: {}", e))
        })?;
        let timeout = Duration::from_secs(config.connection_timeout_seconds);
        client_options.connect_timeout = Some(timeout);
        client_options.server_selection_timeout = Some(timeout);
        client_options.app_name = Some("lead-pipeline".to_string());

        let client = Client::with_options(client_options)?;
        let database = client.database(&config.database_name);

        let start_time = Instant::now();
        database.run_command(doc! { "ping": 1 }, None).await?;
        info!(
            "MongoDB connection established in {}ms",
            start_time.elapsed().as_millis()
        );

        let store = Self {
            leads: database.collection(&config.leads_collection),
            audit: database.collection(&config.audit_collection),
            bookings: database.collection(&config.bookings_collection),
            resume_token: Arc::new(Mutex::new(None)),
            database,
        };
        store.ensure_indexes().await?;
        Ok(store)
    }

    async fn ensure_indexes(&self) -> Result<()> {
        let unique = IndexOptions::builder().unique(true).build();

        self.leads
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "id": 1 })
                    .options(unique.clone())
                    .build(),
                None,
            )
            .await?;

        // One audit entry per (lead, email type) backs the idempotency check
        self.audit
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "leadId": 1, "type": 1 })
                    .options(unique)
                    .build(),
                None,
            )
            .await?;

        self.bookings
            .create_index(IndexModel::builder().keys(doc! { "date": 1 }).build(), None)
            .await?;

        debug!("MongoDB indexes ensured");
        Ok(())
    }
}

fn is_duplicate_key(err: &mongodb::error::Error) -> bool {
    matches!(
        err.kind.as_ref(),
        ErrorKind::Write(WriteFailure::WriteError(write_error)) if write_error.code == DUPLICATE_KEY
    )
}

fn audit_filter(query: &AuditQuery) -> Document {
    let mut filter = Document::new();
    if let Some(lead_id) = &query.lead_id {
        filter.insert("leadId", lead_id.as_str());
    }
    if let Some(recipient) = &query.recipient {
        filter.insert("recipient", recipient.as_str());
    }
    if let Some(email_type) = query.email_type {
        filter.insert("type", email_type.as_str());
    }
    filter
}

fn lead_filter(status: Option<LeadStatus>) -> Document {
    match status {
        Some(status) => doc! { "status": status.as_str() },
        None => Document::new(),
    }
}

#[async_trait]
impl LeadRepository for MongoStore {
    async fn insert_lead(&self, lead: &Lead) -> Result<()> {
        match self.leads.insert_one(LeadDocument::from(lead), None).await {
            Ok(_) => Ok(()),
            Err(e) if is_duplicate_key(&e) => Err(PipelineError::conflict(format!(
                "lead {} already exists",
                lead.id
            ))),
            Err(e) => Err(e.into()),
        }
    }

    async fn get_lead(&self, id: &str) -> Result<Option<Lead>> {
        let document = self.leads.find_one(doc! { "id": id }, None).await?;
        Ok(document.map(Lead::from))
    }

    async fn list_leads(&self, status: Option<LeadStatus>, limit: u32) -> Result<Vec<Lead>> {
        let options = FindOptions::builder()
            .sort(doc! { "createdAt": -1 })
            .limit(clamp_limit(Some(limit)) as i64)
            .build();

        let cursor = self.leads.find(lead_filter(status), options).await?;
        let documents: Vec<LeadDocument> = cursor.try_collect().await?;
        Ok(documents.into_iter().map(Lead::from).collect())
    }

    async fn update_lead_status(&self, id: &str, status: LeadStatus) -> Result<Option<Lead>> {
        let update = doc! {
            "$set": {
                "status": status.as_str(),
                "updatedAt": bson::DateTime::from_chrono(Utc::now()),
            }
        };
        let options = FindOneAndUpdateOptions::builder()
            .return_document(ReturnDocument::After)
            .build();

        let document = self
            .leads
            .find_one_and_update(doc! { "id": id }, update, options)
            .await?;
        Ok(document.map(Lead::from))
    }

    async fn ping(&self) -> Result<()> {
        self.database.run_command(doc! { "ping": 1 }, None).await?;
        Ok(())
    }
}

#[async_trait]
impl AuditRepository for MongoStore {
    async fn record(&self, entry: &EmailAuditRecord) -> Result<()> {
        match self.audit.insert_one(AuditDocument::from(entry), None).await {
            Ok(_) => Ok(()),
            Err(e) if is_duplicate_key(&e) => Err(PipelineError::conflict(format!(
                "{} already recorded for lead {}",
                entry.email_type, entry.lead_id
            ))),
            Err(e) => Err(e.into()),
        }
    }

    async fn has_sent(&self, lead_id: &str, email_type: EmailType) -> Result<bool> {
        let filter = doc! { "leadId": lead_id, "type": email_type.as_str() };
        Ok(self.audit.count_documents(filter, None).await? > 0)
    }

    async fn query(&self, query: &AuditQuery) -> Result<Vec<EmailAuditRecord>> {
        let options = FindOptions::builder()
            .sort(doc! { "sentAt": -1 })
            .limit(clamp_limit(query.limit) as i64)
            .build();

        let cursor = self.audit.find(audit_filter(query), options).await?;
        let documents: Vec<AuditDocument> = cursor.try_collect().await?;
        Ok(documents.into_iter().map(EmailAuditRecord::from).collect())
    }
}

#[async_trait]
impl BookingCalendar for MongoStore {
    async fn is_date_available(&self, date: NaiveDate) -> Result<bool> {
        let filter = doc! {
            "date": date.format("%Y-%m-%d").to_string(),
            "status": { "$ne": Booking::CANCELLED },
        };
        Ok(self.bookings.count_documents(filter, None).await? == 0)
    }
}

impl LeadChangeFeed for MongoStore {
    fn subscribe(&self) -> Result<LeadEventStream> {
        let leads = self.leads.clone();
        let resume_token = self.resume_token.clone();
        let start_after = lock(&resume_token).clone();
        if start_after.is_some() {
            debug!("Resuming lead change stream after the last seen change");
        }

        let opened = stream::once(async move {
            let options = ChangeStreamOptions::builder()
                .start_after(start_after)
                .build();
            leads
                .watch(vec![doc! { "$match": { "operationType": "insert" } }], options)
                .await
        });

        let events = opened.flat_map(move |change_stream| match change_stream {
            Ok(change_stream) => {
                let resume_token = resume_token.clone();
                change_stream
                    .map(move |event| {
                        let event = event?;
                        *lock(&resume_token) = Some(event.id.clone());
                        event
                            .full_document
                            .map(|document| LeadCreated::new(Lead::from(document)))
                            .ok_or_else(|| {
                                PipelineError::database("insert event without a document")
                            })
                    })
                    .boxed()
            }
            Err(e) => stream::iter(vec![Err(PipelineError::from(e))]).boxed(),
        });

        Ok(events.boxed())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Stored form of [`Lead`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LeadDocument {
    id: String,
    first_name: String,
    last_name: String,
    email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    phone: Option<String>,
    #[serde(default)]
    event_type: EventType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    event_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    event_location: Option<String>,
    #[serde(default)]
    preferred_style: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    budget_range: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    how_heard_about_us: Option<String>,
    #[serde(default)]
    message: String,
    status: LeadStatus,
    source: String,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    created_at: DateTime<Utc>,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    updated_at: DateTime<Utc>,
}

impl From<&Lead> for LeadDocument {
    fn from(lead: &Lead) -> Self {
        let lead = lead.clone();
        Self {
            id: lead.id,
            first_name: lead.first_name,
            last_name: lead.last_name,
            email: lead.email,
            phone: lead.phone,
            event_type: lead.event_type,
            event_date: lead.event_date,
            event_location: lead.event_location,
            preferred_style: lead.preferred_style,
            budget_range: lead.budget_range,
            how_heard_about_us: lead.how_heard_about_us,
            message: lead.message,
            status: lead.status,
            source: lead.source,
            created_at: lead.created_at,
            updated_at: lead.updated_at,
        }
    }
}

impl From<LeadDocument> for Lead {
    fn from(document: LeadDocument) -> Self {
        Self {
            id: document.id,
            first_name: document.first_name,
            last_name: document.last_name,
            email: document.email,
            phone: document.phone,
            event_type: document.event_type,
            event_date: document.event_date,
            event_location: document.event_location,
            preferred_style: document.preferred_style,
            budget_range: document.budget_range,
            how_heard_about_us: document.how_heard_about_us,
            message: document.message,
            status: document.status,
            source: document.source,
            created_at: document.created_at,
            updated_at: document.updated_at,
        }
    }
}

/// Stored form of [`EmailAuditRecord`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AuditDocument {
    id: String,
    lead_id: String,
    recipient: String,
    subject: String,
    #[serde(rename = "type")]
    email_type: EmailType,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    sent_at: DateTime<Utc>,
    lead_name: String,
    event_type: EventType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    event_date: Option<String>,
}

impl From<&EmailAuditRecord> for AuditDocument {
    fn from(record: &EmailAuditRecord) -> Self {
        let record = record.clone();
        Self {
            id: record.id,
            lead_id: record.lead_id,
            recipient: record.recipient,
            subject: record.subject,
            email_type: record.email_type,
            sent_at: record.sent_at,
            lead_name: record.lead_name,
            event_type: record.event_type,
            event_date: record.event_date,
        }
    }
}

impl From<AuditDocument> for EmailAuditRecord {
    fn from(document: AuditDocument) -> Self {
        Self {
            id: document.id,
            lead_id: document.lead_id,
            recipient: document.recipient,
            subject: document.subject,
            email_type: document.email_type,
            sent_at: document.sent_at,
            lead_name: document.lead_name,
            event_type: document.event_type,
            event_date: document.event_date,
        }
    }
}
