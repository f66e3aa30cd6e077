//! Lead persistence service
//!
//! `submit_contact_form` is the only way a lead enters the system. It
//! normalizes and validates the form, writes one document and returns its
//! id. No email is sent from here; the store's change feed takes it from
//! there.

use crate::error::{PipelineError, Result};
use crate::metrics::PipelineMetrics;
use crate::store::LeadRepository;
use chrono::Utc;
use std::sync::Arc;
use studio_shared::LeadSubmission;
use tracing::{error, info, warn};
use uuid::Uuid;
use validator::Validate;

#[derive(Clone)]
pub struct LeadIntakeService {
    leads: Arc<dyn LeadRepository>,
    metrics: PipelineMetrics,
}

impl LeadIntakeService {
    pub fn new(leads: Arc<dyn LeadRepository>, metrics: PipelineMetrics) -> Self {
        Self { leads, metrics }
    }

    /// Validate and persist a contact form submission, returning the new
    /// lead's id
    ///
    /// On a validation error nothing is written. On a store error the write
    /// did not happen either; the caller shows a generic failure.
    pub async fn submit_contact_form(&self, submission: LeadSubmission) -> Result<String> {
        let submission = submission.normalized();

        if let Err(errors) = submission.validate() {
            self.metrics.record_validation_failure();
            let err = PipelineError::from(errors);
            warn!("Rejected lead submission: {}", err);
            return Err(err);
        }

        let lead = submission.into_lead(Uuid::new_v4().to_string(), Utc::now());

        if let Err(e) = self.leads.insert_lead(&lead).await {
            error!("Failed to persist lead {}: {}", lead.id, e);
            return Err(e);
        }

        self.metrics.record_lead_submitted();
        info!(
            "Lead {} submitted: {} inquiry from {} via {}",
            lead.id, lead.event_type, lead.email, lead.source
        );
        Ok(lead.id)
    }
}
