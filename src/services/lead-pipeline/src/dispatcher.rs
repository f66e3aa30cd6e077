//! Trigger dispatcher
//!
//! Handles one [`LeadCreated`] event: looks the lead up, works out date
//! availability, then renders, sends and records the client email followed
//! by the admin email. Each email is checked against the audit log first, so
//! handling the same event twice sends nothing new.
//!
//! The two sends are independent. A failure in one is logged, reported and
//! does not stop the other. Nothing is retried here; redelivery belongs to
//! whoever invoked the handler.

use crate::audit::{EmailAuditLog, RecordOutcome};
use crate::availability::AvailabilityChecker;
use crate::config::{BusinessConfig, EmailConfig, PipelineConfig};
use crate::error::{PipelineError, Result};
use crate::metrics::PipelineMetrics;
use crate::store::{LeadRepository, StoreHandles};
use crate::templates::{EmailContext, TemplateKind, TemplateRenderer};
use crate::transport::{EmailTransport, OutboundEmail};
use chrono::{Datelike, Utc};
use std::sync::Arc;
use studio_shared::{
    DeliveryOutcome, DispatchReport, EmailAuditRecord, EmailDispatchResult, EmailType, Lead,
    LeadCreated, LeadStatus,
};
use tracing::{error, info, warn};

pub struct TriggerDispatcher {
    leads: Arc<dyn LeadRepository>,
    audit: EmailAuditLog,
    availability: AvailabilityChecker,
    renderer: Arc<TemplateRenderer>,
    transport: Arc<dyn EmailTransport>,
    email: EmailConfig,
    business: BusinessConfig,
    metrics: PipelineMetrics,
}

impl TriggerDispatcher {
    pub fn new(
        stores: &StoreHandles,
        renderer: Arc<TemplateRenderer>,
        transport: Arc<dyn EmailTransport>,
        config: &PipelineConfig,
        metrics: PipelineMetrics,
    ) -> Self {
        Self {
            leads: stores.leads.clone(),
            audit: EmailAuditLog::new(stores.audit.clone()),
            availability: AvailabilityChecker::new(stores.calendar.clone()),
            renderer,
            transport,
            email: config.email.clone(),
            business: config.business.clone(),
            metrics,
        }
    }

    /// Run one invocation for `event`
    ///
    /// Errors are reserved for failures before any email is attempted (the
    /// lead lookup). Per-email failures are in the report instead.
    ///
    /// Only the stored document is trusted. An event for a lead the store
    /// does not hold is rejected with `NotFound` and sends nothing.
    pub async fn handle(&self, event: LeadCreated) -> Result<DispatchReport> {
        info!("Dispatching emails for lead {}", event.id);

        let stored = self.leads.get_lead(&event.id).await?;
        let lead = match stored {
            Some(lead) => lead,
            None => {
                warn!("Ignoring lead created event for unknown lead {}", event.id);
                return Err(PipelineError::not_found(format!("lead {}", event.id)));
            }
        };
        let timer = self.metrics.start_dispatch_timer();

        let available = self.availability.check(&lead).await;
        let context =
            EmailContext::from_lead(&lead, available, &self.business, Utc::now().year());

        let mut report = DispatchReport::new(lead.id.clone());
        for email_type in EmailType::ALL {
            let result = self.dispatch_one(&lead, &context, email_type).await;
            self.metrics.record_email(email_type, result.outcome);
            report.results.push(result);
        }

        let complete = report.is_complete();
        let elapsed = timer.finish(complete);
        if complete {
            info!(
                "Lead {} dispatched in {:.3}s: {} sent, {} already sent",
                report.lead_id,
                elapsed,
                report.count(DeliveryOutcome::Sent),
                report.count(DeliveryOutcome::AlreadySent)
            );
        } else {
            error!(
                "Lead {} dispatch incomplete, {} email(s) need follow-up",
                report.lead_id,
                report.count(DeliveryOutcome::Failed)
            );
        }

        Ok(report)
    }

    /// Leads still at `new` with at least one email missing from the audit
    /// log, oldest first
    pub async fn undelivered_leads(&self, limit: u32) -> Result<Vec<Lead>> {
        let mut leads = self.leads.list_leads(Some(LeadStatus::New), limit).await?;
        leads.reverse();

        let mut pending = Vec::new();
        for lead in leads {
            for email_type in EmailType::ALL {
                if !self.audit.has_sent(&lead.id, email_type).await? {
                    pending.push(lead);
                    break;
                }
            }
        }
        Ok(pending)
    }

    fn outbound(&self, lead: &Lead, email_type: EmailType) -> (String, Option<String>) {
        match email_type {
            EmailType::LeadThankYou => (lead.email.clone(), non_empty(&self.email.reply_to)),
            EmailType::AdminNotification => {
                (self.email.admin_email.clone(), Some(lead.email.clone()))
            }
        }
    }

    async fn dispatch_one(
        &self,
        lead: &Lead,
        context: &EmailContext,
        email_type: EmailType,
    ) -> EmailDispatchResult {
        let (recipient, reply_to) = self.outbound(lead, email_type);
        let result = |outcome, error: Option<String>| EmailDispatchResult {
            email_type,
            recipient: recipient.clone(),
            outcome,
            error,
        };

        match self.audit.has_sent(&lead.id, email_type).await {
            Ok(true) => {
                warn!(
                    "Skipping {} for lead {}: already in the audit log",
                    email_type, lead.id
                );
                return result(DeliveryOutcome::AlreadySent, None);
            }
            Ok(false) => {}
            Err(e) => {
                // Sending blind could duplicate an earlier send
                error!(
                    "Audit lookup failed for {} on lead {}, not sending: {}",
                    email_type, lead.id, e
                );
                return result(DeliveryOutcome::Failed, Some(e.to_string()));
            }
        }

        let subject = match self.send(context, email_type, &recipient, reply_to).await {
            Ok(subject) => subject,
            Err(e) => {
                error!(
                    "Failed to send {} for lead {} to {}: {}",
                    email_type, lead.id, recipient, e
                );
                return result(DeliveryOutcome::Failed, Some(e.to_string()));
            }
        };
        info!("Sent {} for lead {} to {}", email_type, lead.id, recipient);

        let entry = EmailAuditRecord::new(lead, email_type, &recipient, subject, Utc::now());
        match self.audit.record(&entry).await {
            Ok(RecordOutcome::Recorded) | Ok(RecordOutcome::AlreadyRecorded) => {
                result(DeliveryOutcome::Sent, None)
            }
            Err(e) => {
                // The email is out; marking it failed would resend it on redelivery
                error!(
                    "Sent {} for lead {} but could not record it: {}",
                    email_type, lead.id, e
                );
                result(
                    DeliveryOutcome::Sent,
                    Some(format!("audit record not written: {}", e)),
                )
            }
        }
    }

    /// Render and hand to the transport; returns the subject that went out
    async fn send(
        &self,
        context: &EmailContext,
        email_type: EmailType,
        recipient: &str,
        reply_to: Option<String>,
    ) -> Result<String> {
        let rendered = self.renderer.render(TemplateKind::from(email_type), context)?;

        let mut email = OutboundEmail::new(recipient, rendered.subject.clone(), rendered.html);
        email.reply_to = reply_to;

        if self.transport.send(&email).await? {
            Ok(rendered.subject)
        } else {
            Err(PipelineError::email("relay did not accept the message"))
        }
    }
}

fn non_empty(value: &str) -> Option<String> {
    (!value.is_empty()).then(|| value.to_string())
}
