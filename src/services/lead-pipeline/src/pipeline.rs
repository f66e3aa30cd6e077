//! Lead pipeline
//!
//! Owns every component and wires them to one store backend and one email
//! transport. The HTTP layer and the binary talk to this type only.

use crate::audit::EmailAuditLog;
use crate::config::PipelineConfig;
use crate::dispatcher::TriggerDispatcher;
use crate::error::{PipelineError, Result};
use crate::intake::LeadIntakeService;
use crate::metrics::PipelineMetrics;
use crate::store::{clamp_limit, StoreHandles};
use crate::templates::TemplateRenderer;
use crate::transport::EmailTransport;
use crate::trigger::TriggerListener;
use chrono::Utc;
use serde_json::json;
use std::sync::Arc;
use studio_shared::{
    AuditQuery, DispatchReport, EmailAuditRecord, Lead, LeadCreated, LeadStatus, LeadSubmission,
    ListLeadsQuery,
};
use tracing::info;

pub struct LeadPipeline {
    config: PipelineConfig,
    stores: StoreHandles,
    intake: LeadIntakeService,
    dispatcher: Arc<TriggerDispatcher>,
    audit: EmailAuditLog,
    transport: Arc<dyn EmailTransport>,
    metrics: PipelineMetrics,
}

impl LeadPipeline {
    pub fn new(
        config: PipelineConfig,
        stores: StoreHandles,
        transport: Arc<dyn EmailTransport>,
    ) -> Result<Self> {
        info!("Initializing lead pipeline on {} store", stores.backend);

        config.validate().map_err(PipelineError::config)?;

        let metrics = PipelineMetrics::new(&config.metrics)?;
        let renderer = Arc::new(TemplateRenderer::new()?);

        let intake = LeadIntakeService::new(stores.leads.clone(), metrics.clone());
        let dispatcher = Arc::new(TriggerDispatcher::new(
            &stores,
            renderer,
            transport.clone(),
            &config,
            metrics.clone(),
        ));
        let audit = EmailAuditLog::new(stores.audit.clone());

        info!("Lead pipeline initialized successfully");
        Ok(Self {
            config,
            stores,
            intake,
            dispatcher,
            audit,
            transport,
            metrics,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn metrics(&self) -> &PipelineMetrics {
        &self.metrics
    }

    pub async fn submit_contact_form(&self, submission: LeadSubmission) -> Result<String> {
        self.intake.submit_contact_form(submission).await
    }

    pub async fn get_lead(&self, id: &str) -> Result<Lead> {
        self.stores
            .leads
            .get_lead(id)
            .await?
            .ok_or_else(|| PipelineError::not_found(format!("lead {}", id)))
    }

    pub async fn list_leads(&self, query: &ListLeadsQuery) -> Result<Vec<Lead>> {
        self.stores
            .leads
            .list_leads(query.status, clamp_limit(query.limit))
            .await
    }

    pub async fn update_lead_status(&self, id: &str, status: LeadStatus) -> Result<Lead> {
        let lead = self
            .stores
            .leads
            .update_lead_status(id, status)
            .await?
            .ok_or_else(|| PipelineError::not_found(format!("lead {}", id)))?;
        info!("Lead {} moved to {}", id, status);
        Ok(lead)
    }

    pub async fn query_audit(&self, query: &AuditQuery) -> Result<Vec<EmailAuditRecord>> {
        self.audit.query(query).await
    }

    /// One dispatcher invocation, as the webhook trigger runs it
    pub async fn dispatch(&self, event: LeadCreated) -> Result<DispatchReport> {
        self.dispatcher.handle(event).await
    }

    /// Listener driving the dispatcher from the store's change feed
    pub fn trigger_listener(&self) -> TriggerListener {
        TriggerListener::new(
            self.stores.feed.clone(),
            self.dispatcher.clone(),
            self.config.trigger.clone(),
            self.metrics.clone(),
        )
    }

    pub async fn health_check(&self) -> serde_json::Value {
        let store_healthy = self.stores.leads.ping().await.is_ok();
        let transport_info = self.transport.info();

        let status = if !store_healthy {
            "unhealthy"
        } else if !transport_info.configured {
            "degraded"
        } else {
            "healthy"
        };

        json!({
            "service": "lead-pipeline",
            "status": status,
            "timestamp": Utc::now(),
            "components": {
                "store": {
                    "backend": self.stores.backend,
                    "status": if store_healthy { "healthy" } else { "unhealthy" },
                },
                "transport": transport_info,
                "trigger": {
                    "enabled": self.config.trigger.enabled,
                    "max_redeliveries": self.config.trigger.max_redeliveries,
                },
            },
            "metrics": self.metrics.summary(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;
    use crate::transport::{RecordingTransport, UnconfiguredTransport};

    fn pipeline(transport: Arc<dyn EmailTransport>) -> LeadPipeline {
        LeadPipeline::new(
            PipelineConfig::default(),
            StoreHandles::in_memory(Arc::new(InMemoryStore::new())),
            transport,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_invalid_config_is_rejected() {
        let mut config = PipelineConfig::default();
        config.server.port = 0;
        let result = LeadPipeline::new(
            config,
            StoreHandles::in_memory(Arc::new(InMemoryStore::new())),
            Arc::new(RecordingTransport::new()),
        );
        assert!(matches!(result, Err(PipelineError::Config { .. })));
    }

    #[tokio::test]
    async fn test_status_update_and_not_found() {
        let pipeline = pipeline(Arc::new(RecordingTransport::new()));
        let id = pipeline
            .submit_contact_form(LeadSubmission {
                first_name: "Sarah".to_string(),
                last_name: "Johnson".to_string(),
                email: "sarah@example.com".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();

        let lead = pipeline
            .update_lead_status(&id, LeadStatus::Qualified)
            .await
            .unwrap();
        assert_eq!(lead.status, LeadStatus::Qualified);

        let missing = pipeline.update_lead_status("nope", LeadStatus::Lost).await;
        assert!(matches!(missing, Err(PipelineError::NotFound { .. })));
        assert!(matches!(
            pipeline.get_lead("nope").await,
            Err(PipelineError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_health_reports_unconfigured_transport_as_degraded() {
        let healthy = pipeline(Arc::new(RecordingTransport::new()));
        assert_eq!(healthy.health_check().await["status"], "healthy");

        let degraded = pipeline(Arc::new(UnconfiguredTransport::new("no credentials")));
        let health = degraded.health_check().await;
        assert_eq!(health["status"], "degraded");
        assert_eq!(health["components"]["store"]["backend"], "memory");
        assert_eq!(health["components"]["transport"]["configured"], false);
    }
}
