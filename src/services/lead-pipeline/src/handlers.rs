//! Request handlers for the lead pipeline
//!
//! - Lead handlers: contact form submission and admin lead management
//! - Audit handlers: email audit log queries
//! - Event handlers: the webhook form of the lead-created trigger
//! - Health and metrics handlers

use crate::error::{PipelineError, Result};
use crate::pipeline::LeadPipeline;
use studio_shared::*;

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use std::sync::Arc;
use tracing::{error, info, warn};

pub mod leads_handler {
    use super::*;

    /// Contact form submission
    ///
    /// A body of the wrong shape is reported through the same validation
    /// envelope as a failed field check.
    pub async fn submit_lead(
        State(pipeline): State<Arc<LeadPipeline>>,
        payload: std::result::Result<Json<LeadSubmission>, JsonRejection>,
    ) -> Result<impl IntoResponse> {
        let Json(submission) = payload.map_err(|rejection| {
            pipeline.metrics().record_validation_failure();
            let error = PipelineError::from(rejection);
            warn!("Rejected contact form body: {}", error);
            error
        })?;
        let id = pipeline.submit_contact_form(submission).await?;
        Ok((StatusCode::CREATED, Json(SubmitLeadResponse { id })))
    }

    pub async fn list_leads(
        State(pipeline): State<Arc<LeadPipeline>>,
        Query(query): Query<ListLeadsQuery>,
    ) -> Result<impl IntoResponse> {
        let leads = pipeline.list_leads(&query).await?;
        Ok(Json(leads))
    }

    pub async fn get_lead(
        State(pipeline): State<Arc<LeadPipeline>>,
        Path(id): Path<String>,
    ) -> Result<impl IntoResponse> {
        Ok(Json(pipeline.get_lead(&id).await?))
    }

    /// Admin status transition
    pub async fn update_lead_status(
        State(pipeline): State<Arc<LeadPipeline>>,
        Path(id): Path<String>,
        Json(request): Json<UpdateLeadStatusRequest>,
    ) -> Result<impl IntoResponse> {
        info!("Updating lead {} status to {}", id, request.status);
        Ok(Json(pipeline.update_lead_status(&id, request.status).await?))
    }
}

pub mod audit_handler {
    use super::*;

    pub async fn query_email_audit(
        State(pipeline): State<Arc<LeadPipeline>>,
        Query(query): Query<AuditQuery>,
    ) -> Result<impl IntoResponse> {
        Ok(Json(pipeline.query_audit(&query).await?))
    }
}

pub mod events_handler {
    use super::*;

    /// Run the dispatcher once for a delivered `LeadCreated`
    pub async fn lead_created(
        State(pipeline): State<Arc<LeadPipeline>>,
        Json(event): Json<LeadCreated>,
    ) -> Result<impl IntoResponse> {
        info!("Lead created webhook received for {}", event.id);

        match pipeline.dispatch(event).await {
            Ok(report) => Ok(Json(report)),
            Err(e) => {
                error!("Webhook dispatch failed: {}", e);
                Err(e)
            }
        }
    }
}

/// Health check handler
pub async fn health_handler(State(pipeline): State<Arc<LeadPipeline>>) -> impl IntoResponse {
    let health = pipeline.health_check().await;
    let status = if health["status"] == "unhealthy" {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };
    (status, Json(health))
}

/// Prometheus metrics handler
pub async fn metrics_handler(
    State(pipeline): State<Arc<LeadPipeline>>,
) -> Result<impl IntoResponse> {
    let body = pipeline.metrics().export_metrics()?;
    Ok((
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        body,
    ))
}
