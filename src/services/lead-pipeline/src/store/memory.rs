//! Process-local document store
//!
//! Used when no MongoDB URL is configured and throughout the tests. Each
//! insert publishes a [`LeadCreated`] on a broadcast channel, the way a
//! hosted document store fires its on-create trigger.

use super::{
    clamp_limit, AuditRepository, Booking, BookingCalendar, LeadChangeFeed, LeadEventStream,
    LeadRepository,
};
use crate::error::{PipelineError, Result};
use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use dashmap::DashMap;
use futures::stream::{self, StreamExt};
use audit_log::AuditLog;
use std::sync::Arc;
use studio_shared::{AuditQuery, EmailAuditRecord, EmailType, Lead, LeadCreated, LeadStatus};
use tokio::sync::broadcast;

const FEED_CAPACITY: usize = 1024;

/// In-memory implementation of every store trait
#[derive(Clone)]
pub struct InMemoryStore {
    leads: Arc<DashMap<String, Lead>>,
    audit: Arc<AuditLog>,
    bookings: Arc<DashMap<String, Booking>>,
    feed: broadcast::Sender<LeadCreated>,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        let (feed, _) = broadcast::channel(FEED_CAPACITY);
        Self {
            leads: Arc::new(DashMap::new()),
            audit: Arc::new(AuditLog::default()),
            bookings: Arc::new(DashMap::new()),
            feed,
        }
    }

    /// Put a booking on the calendar, keyed by an arbitrary id
    pub fn add_booking(&self, id: impl Into<String>, booking: Booking) {
        self.bookings.insert(id.into(), booking);
    }

    pub fn lead_count(&self) -> usize {
        self.leads.len()
    }

    pub fn audit_count(&self) -> usize {
        self.audit.len()
    }
}

#[async_trait]
impl LeadRepository for InMemoryStore {
    async fn insert_lead(&self, lead: &Lead) -> Result<()> {
        if self.leads.contains_key(&lead.id) {
            return Err(PipelineError::conflict(format!(
                "lead {} already exists",
                lead.id
            )));
        }
        self.leads.insert(lead.id.clone(), lead.clone());

        // No subscribers is fine: the trigger may be disabled
        let _ = self.feed.send(LeadCreated::new(lead.clone()));
        Ok(())
    }

    async fn get_lead(&self, id: &str) -> Result<Option<Lead>> {
        Ok(self.leads.get(id).map(|entry| entry.value().clone()))
    }

    async fn list_leads(&self, status: Option<LeadStatus>, limit: u32) -> Result<Vec<Lead>> {
        let mut leads: Vec<Lead> = self
            .leads
            .iter()
            .filter(|entry| status.map_or(true, |s| entry.value().status == s))
            .map(|entry| entry.value().clone())
            .collect();

        leads.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        leads.truncate(clamp_limit(Some(limit)) as usize);
        Ok(leads)
    }

    async fn update_lead_status(&self, id: &str, status: LeadStatus) -> Result<Option<Lead>> {
        Ok(self.leads.get_mut(id).map(|mut entry| {
            let lead = entry.value_mut();
            lead.status = status;
            lead.updated_at = Utc::now();
            lead.clone()
        }))
    }
}

#[async_trait]
impl AuditRepository for InMemoryStore {
    async fn record(&self, entry: &EmailAuditRecord) -> Result<()> {
        self.audit.append(entry.clone())
    }

    async fn has_sent(&self, lead_id: &str, email_type: EmailType) -> Result<bool> {
        Ok(self.audit.contains(lead_id, email_type))
    }

    async fn query(&self, query: &AuditQuery) -> Result<Vec<EmailAuditRecord>> {
        Ok(self.audit.query(query))
    }
}

#[async_trait]
impl BookingCalendar for InMemoryStore {
    async fn is_date_available(&self, date: NaiveDate) -> Result<bool> {
        Ok(!self.bookings.iter().any(|entry| entry.value().blocks(date)))
    }
}

impl LeadChangeFeed for InMemoryStore {
    fn subscribe(&self) -> Result<LeadEventStream> {
        let receiver = self.feed.subscribe();

        let events = stream::unfold(receiver, |mut receiver| async move {
            loop {
                match receiver.recv().await {
                    Ok(event) => return Some((Ok(event), receiver)),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        // Dropped events are only recoverable by a sweep
                        let error = PipelineError::internal(format!(
                            "lead change feed lagged, {} events dropped",
                            skipped
                        ));
                        return Some((Err(error), receiver));
                    }
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            }
        });

        Ok(events.boxed())
    }
}

mod audit_log {
    //! Audit entries keyed by (lead, type), with the append order kept for
    //! queries.

    use crate::error::{PipelineError, Result};
    use dashmap::DashMap;
    use std::sync::Mutex;
    use studio_shared::{AuditQuery, EmailAuditRecord, EmailType};

    #[derive(Default)]
    pub struct AuditLog {
        index: DashMap<(String, EmailType), String>,
        entries: Mutex<Vec<EmailAuditRecord>>,
    }

    impl AuditLog {
        pub fn append(&self, entry: EmailAuditRecord) -> Result<()> {
            let key = (entry.lead_id.clone(), entry.email_type);
            match self.index.entry(key) {
                dashmap::mapref::entry::Entry::Occupied(_) => Err(PipelineError::conflict(
                    format!("{} already recorded for lead {}", entry.email_type, entry.lead_id),
                )),
                dashmap::mapref::entry::Entry::Vacant(slot) => {
                    slot.insert(entry.id.clone());
                    self.lock().push(entry);
                    Ok(())
                }
            }
        }

        pub fn contains(&self, lead_id: &str, email_type: EmailType) -> bool {
            self.index.contains_key(&(lead_id.to_string(), email_type))
        }

        pub fn len(&self) -> usize {
            self.lock().len()
        }

        pub fn query(&self, query: &AuditQuery) -> Vec<EmailAuditRecord> {
            let limit = super::clamp_limit(query.limit) as usize;
            self.lock()
                .iter()
                .rev()
                .filter(|e| query.lead_id.as_deref().map_or(true, |id| e.lead_id == id))
                .filter(|e| query.recipient.as_deref().map_or(true, |r| e.recipient == r))
                .filter(|e| query.email_type.map_or(true, |t| e.email_type == t))
                .take(limit)
                .cloned()
                .collect()
        }

        fn lock(&self) -> std::sync::MutexGuard<'_, Vec<EmailAuditRecord>> {
            // A panic while holding the lock leaves the Vec intact
            self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use studio_shared::{EventType, LeadSubmission};

    fn lead(id: &str) -> Lead {
        LeadSubmission {
            first_name: "Sarah".to_string(),
            last_name: "Johnson".to_string(),
            email: "sarah@example.com".to_string(),
            event_type: EventType::Wedding,
            ..Default::default()
        }
        .into_lead(id.to_string(), Utc::now())
    }

    #[tokio::test]
    async fn test_insert_publishes_change_event() {
        let store = InMemoryStore::new();
        let mut feed = store.subscribe().unwrap();

        store.insert_lead(&lead("lead-1")).await.unwrap();

        let event = feed.next().await.unwrap().unwrap();
        assert_eq!(event.id, "lead-1");
        assert_eq!(event.data.first_name, "Sarah");
    }

    #[tokio::test]
    async fn test_duplicate_lead_id_is_rejected() {
        let store = InMemoryStore::new();
        store.insert_lead(&lead("lead-1")).await.unwrap();
        let second = store.insert_lead(&lead("lead-1")).await;
        assert!(matches!(second, Err(PipelineError::Conflict { .. })));
        assert_eq!(store.lead_count(), 1);
    }

    #[tokio::test]
    async fn test_status_update_stamps_updated_at() {
        let store = InMemoryStore::new();
        let original = lead("lead-1");
        store.insert_lead(&original).await.unwrap();

        let updated = store
            .update_lead_status("lead-1", LeadStatus::Contacted)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.status, LeadStatus::Contacted);
        assert!(updated.updated_at >= original.updated_at);
        assert_eq!(updated.created_at, original.created_at);

        let missing = store
            .update_lead_status("nope", LeadStatus::Lost)
            .await
            .unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn test_list_filters_by_status() {
        let store = InMemoryStore::new();
        store.insert_lead(&lead("a")).await.unwrap();
        store.insert_lead(&lead("b")).await.unwrap();
        store
            .update_lead_status("b", LeadStatus::Qualified)
            .await
            .unwrap();

        let qualified = store
            .list_leads(Some(LeadStatus::Qualified), 10)
            .await
            .unwrap();
        assert_eq!(qualified.len(), 1);
        assert_eq!(qualified[0].id, "b");
        assert_eq!(store.list_leads(None, 10).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_audit_membership_and_uniqueness() {
        let store = InMemoryStore::new();
        let lead = lead("lead-1");
        let entry = EmailAuditRecord::new(
            &lead,
            EmailType::LeadThankYou,
            "sarah@example.com",
            "Thanks",
            Utc::now(),
        );

        assert!(!store.has_sent("lead-1", EmailType::LeadThankYou).await.unwrap());
        store.record(&entry).await.unwrap();
        assert!(store.has_sent("lead-1", EmailType::LeadThankYou).await.unwrap());
        assert!(!store
            .has_sent("lead-1", EmailType::AdminNotification)
            .await
            .unwrap());

        let duplicate = EmailAuditRecord::new(
            &lead,
            EmailType::LeadThankYou,
            "sarah@example.com",
            "Thanks again",
            Utc::now(),
        );
        assert!(matches!(
            store.record(&duplicate).await,
            Err(PipelineError::Conflict { .. })
        ));
        assert_eq!(store.audit_count(), 1);
    }

    #[tokio::test]
    async fn test_audit_query_filters() {
        let store = InMemoryStore::new();
        let lead = lead("lead-1");
        for (email_type, recipient) in [
            (EmailType::LeadThankYou, "sarah@example.com"),
            (EmailType::AdminNotification, "owner@studio.example"),
        ] {
            store
                .record(&EmailAuditRecord::new(
                    &lead,
                    email_type,
                    recipient,
                    "subject",
                    Utc::now(),
                ))
                .await
                .unwrap();
        }

        let by_recipient = store
            .query(&AuditQuery {
                recipient: Some("sarah@example.com".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(by_recipient.len(), 1);
        assert_eq!(by_recipient[0].email_type, EmailType::LeadThankYou);

        let by_type = store
            .query(&AuditQuery {
                email_type: Some(EmailType::AdminNotification),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(by_type.len(), 1);

        let all = store
            .query(&AuditQuery {
                lead_id: Some("lead-1".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].email_type, EmailType::AdminNotification);
    }

    #[tokio::test]
    async fn test_calendar_ignores_cancelled_bookings() {
        let store = InMemoryStore::new();
        let booked = NaiveDate::from_ymd_opt(2025, 9, 15).unwrap();
        let cancelled = NaiveDate::from_ymd_opt(2025, 10, 4).unwrap();

        store.add_booking("b1", Booking::confirmed(booked));
        store.add_booking(
            "b2",
            Booking {
                status: Booking::CANCELLED.to_string(),
                ..Booking::confirmed(cancelled)
            },
        );

        assert!(!store.is_date_available(booked).await.unwrap());
        assert!(store.is_date_available(cancelled).await.unwrap());
        assert!(store
            .is_date_available(NaiveDate::from_ymd_opt(2025, 12, 1).unwrap())
            .await
            .unwrap());
    }
}
