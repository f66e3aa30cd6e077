//! Email audit log
//!
//! One immutable entry per email that left the building. The dispatcher
//! consults it before every send, which is what keeps redelivered triggers
//! from emailing a lead twice.

use crate::error::{PipelineError, Result};
use crate::store::AuditRepository;
use std::sync::Arc;
use studio_shared::{AuditQuery, EmailAuditRecord, EmailType};
use tracing::{debug, info};

/// Result of appending to the log
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    Recorded,
    /// A concurrent invocation got there first
    AlreadyRecorded,
}

#[derive(Clone)]
pub struct EmailAuditLog {
    repository: Arc<dyn AuditRepository>,
}

impl EmailAuditLog {
    pub fn new(repository: Arc<dyn AuditRepository>) -> Self {
        Self { repository }
    }

    /// Append one entry. A uniqueness conflict is not an error here: the
    /// entry it collided with proves the same send.
    pub async fn record(&self, entry: &EmailAuditRecord) -> Result<RecordOutcome> {
        match self.repository.record(entry).await {
            Ok(()) => {
                debug!(
                    "Audit entry {} recorded: {} to {}",
                    entry.id, entry.email_type, entry.recipient
                );
                Ok(RecordOutcome::Recorded)
            }
            Err(PipelineError::Conflict { message }) => {
                info!("Audit entry already present: {}", message);
                Ok(RecordOutcome::AlreadyRecorded)
            }
            Err(e) => Err(e),
        }
    }

    pub async fn has_sent(&self, lead_id: &str, email_type: EmailType) -> Result<bool> {
        self.repository.has_sent(lead_id, email_type).await
    }

    pub async fn query(&self, query: &AuditQuery) -> Result<Vec<EmailAuditRecord>> {
        self.repository.query(query).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;
    use chrono::Utc;
    use studio_shared::{Lead, LeadSubmission};

    fn lead() -> Lead {
        LeadSubmission {
            first_name: "Sarah".to_string(),
            last_name: "Johnson".to_string(),
            email: "sarah@example.com".to_string(),
            event_date: Some("2025-09-15".to_string()),
            ..Default::default()
        }
        .into_lead("lead-1".to_string(), Utc::now())
    }

    #[tokio::test]
    async fn test_second_record_is_already_recorded() {
        let log = EmailAuditLog::new(Arc::new(InMemoryStore::new()));
        let lead = lead();
        let entry = |subject: &str| {
            EmailAuditRecord::new(
                &lead,
                EmailType::LeadThankYou,
                "sarah@example.com",
                subject,
                Utc::now(),
            )
        };

        assert_eq!(log.record(&entry("first")).await.unwrap(), RecordOutcome::Recorded);
        assert_eq!(
            log.record(&entry("second")).await.unwrap(),
            RecordOutcome::AlreadyRecorded
        );
        assert!(log.has_sent("lead-1", EmailType::LeadThankYou).await.unwrap());
    }

    #[tokio::test]
    async fn test_entries_carry_lead_context() {
        let log = EmailAuditLog::new(Arc::new(InMemoryStore::new()));
        let lead = lead();
        log.record(&EmailAuditRecord::new(
            &lead,
            EmailType::AdminNotification,
            "owner@studio.example",
            "New Lead: Sarah Johnson (Other)",
            Utc::now(),
        ))
        .await
        .unwrap();

        let entries = log.query(&AuditQuery::default()).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].lead_name, "Sarah Johnson");
        assert_eq!(entries[0].event_date.as_deref(), Some("2025-09-15"));
    }
}
