//! Routes module for the lead pipeline
//!
//! - Lead submission and admin lead management
//! - Email audit queries
//! - Lead-created webhook trigger
//! - Health and metrics endpoints

use crate::handlers::{
    audit_handler, events_handler, health_handler, leads_handler, metrics_handler,
};
use crate::pipeline::LeadPipeline;

use axum::{
    routing::{get, patch, post},
    Router,
};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, timeout::TimeoutLayer, trace::TraceLayer};

/// Build the main router for the lead pipeline
pub fn create_router(pipeline: Arc<LeadPipeline>) -> Router {
    let timeout = Duration::from_secs(pipeline.config().server.timeout_seconds);

    let api_router = create_api_router(Arc::clone(&pipeline));
    let health_router = create_health_router(pipeline);

    Router::new()
        .merge(api_router)
        .merge(health_router)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive())
                .layer(TimeoutLayer::new(timeout))
                .into_inner(),
        )
}

/// Create API routes for REST endpoints
fn create_api_router(pipeline: Arc<LeadPipeline>) -> Router {
    Router::new()
        // Lead endpoints
        .route(
            "/api/v1/leads",
            post(leads_handler::submit_lead).get(leads_handler::list_leads),
        )
        .route("/api/v1/leads/:id", get(leads_handler::get_lead))
        .route(
            "/api/v1/leads/:id/status",
            patch(leads_handler::update_lead_status),
        )
        // Audit endpoints
        .route(
            "/api/v1/email-audit",
            get(audit_handler::query_email_audit),
        )
        // Trigger endpoints
        .route(
            "/api/v1/events/lead-created",
            post(events_handler::lead_created),
        )
        .with_state(pipeline)
}

/// Create health and metrics routes; `/metrics` only when metrics are enabled
fn create_health_router(pipeline: Arc<LeadPipeline>) -> Router {
    let mut router = Router::new().route("/health", get(health_handler));
    if pipeline.config().metrics.enabled {
        router = router.route("/metrics", get(metrics_handler));
    }
    router.with_state(pipeline)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PipelineConfig;
    use crate::store::{InMemoryStore, StoreHandles};
    use crate::transport::RecordingTransport;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    fn app() -> Router {
        let pipeline = LeadPipeline::new(
            PipelineConfig::default(),
            StoreHandles::in_memory(Arc::new(InMemoryStore::new())),
            Arc::new(RecordingTransport::new()),
        )
        .unwrap();
        create_router(Arc::new(pipeline))
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let response = app()
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_metrics_endpoint_is_prometheus_text() {
        let response = app()
            .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let content_type = response.headers()["content-type"].to_str().unwrap();
        assert!(content_type.starts_with("text/plain"));
    }

    #[tokio::test]
    async fn test_metrics_route_absent_when_disabled() {
        let mut config = PipelineConfig::default();
        config.metrics.enabled = false;
        let pipeline = LeadPipeline::new(
            config,
            StoreHandles::in_memory(Arc::new(InMemoryStore::new())),
            Arc::new(RecordingTransport::new()),
        )
        .unwrap();

        let response = create_router(Arc::new(pipeline))
            .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_unknown_lead_is_404() {
        let response = app()
            .oneshot(
                Request::get("/api/v1/leads/does-not-exist")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
