//! HTTP surface tests driven through the router with `oneshot`

use axum::body::{to_bytes, Body};
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use lead_pipeline::{
    routes::create_router,
    store::{InMemoryStore, StoreHandles},
    transport::RecordingTransport,
    LeadPipeline, PipelineConfig,
};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

fn app() -> (Router, Arc<InMemoryStore>) {
    let (app, store, _) = app_with_transport();
    (app, store)
}

fn app_with_transport() -> (Router, Arc<InMemoryStore>, RecordingTransport) {
    let store = Arc::new(InMemoryStore::new());
    let transport = RecordingTransport::new();
    let pipeline = LeadPipeline::new(
        PipelineConfig::default(),
        StoreHandles::in_memory(store.clone()),
        Arc::new(transport.clone()),
    )
    .unwrap();
    (create_router(Arc::new(pipeline)), store, transport)
}

async fn call(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let request = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => request
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => request.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

fn sarah() -> Value {
    json!({
        "firstName": "Sarah",
        "lastName": "Johnson",
        "email": "sarah@example.com",
        "eventType": "wedding",
        "eventDate": "2025-09-15",
        "preferredStyle": ["documentary", "candid"]
    })
}

#[tokio::test]
async fn test_submit_lead_returns_created_id() {
    let (app, store) = app();

    let (status, body) = call(&app, Method::POST, "/api/v1/leads", Some(sarah())).await;
    assert_eq!(status, StatusCode::CREATED);

    let id = body["id"].as_str().unwrap().to_string();
    assert!(!id.is_empty());
    assert_eq!(store.lead_count(), 1);

    let (status, lead) = call(&app, Method::GET, &format!("/api/v1/leads/{}", id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(lead["status"], "new");
    assert_eq!(lead["eventType"], "wedding");
    assert_eq!(lead["source"], "website_form");
}

#[tokio::test]
async fn test_invalid_submission_reports_fields() {
    let (app, store) = app();

    let (status, body) = call(
        &app,
        Method::POST,
        "/api/v1/leads",
        Some(json!({ "lastName": "Johnson", "email": "nope" })),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
    let fields: Vec<&str> = body["error"]["fields"]
        .as_array()
        .unwrap()
        .iter()
        .map(|f| f["field"].as_str().unwrap())
        .collect();
    assert_eq!(fields, vec!["email", "firstName"]);
    assert_eq!(store.lead_count(), 0);
}

#[tokio::test]
async fn test_status_update_and_filtered_listing() {
    let (app, _store) = app();

    let (_, created) = call(&app, Method::POST, "/api/v1/leads", Some(sarah())).await;
    let id = created["id"].as_str().unwrap().to_string();
    call(&app, Method::POST, "/api/v1/leads", Some(sarah())).await;

    let (status, updated) = call(
        &app,
        Method::PATCH,
        &format!("/api/v1/leads/{}/status", id),
        Some(json!({ "status": "contacted" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["status"], "contacted");

    let (status, contacted) =
        call(&app, Method::GET, "/api/v1/leads?status=contacted", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(contacted.as_array().unwrap().len(), 1);

    let (_, all) = call(&app, Method::GET, "/api/v1/leads", None).await;
    assert_eq!(all.as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_webhook_dispatch_and_audit_query() {
    let (app, store) = app();

    let (_, created) = call(&app, Method::POST, "/api/v1/leads", Some(sarah())).await;
    let id = created["id"].as_str().unwrap().to_string();
    let (_, lead) = call(&app, Method::GET, &format!("/api/v1/leads/{}", id), None).await;

    let event = json!({ "id": id, "data": lead });
    let (status, report) = call(
        &app,
        Method::POST,
        "/api/v1/events/lead-created",
        Some(event.clone()),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["leadId"], id.as_str());
    let outcomes: Vec<&str> = report["results"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["outcome"].as_str().unwrap())
        .collect();
    assert_eq!(outcomes, vec!["sent", "sent"]);
    assert_eq!(store.audit_count(), 2);

    let (_, again) = call(&app, Method::POST, "/api/v1/events/lead-created", Some(event)).await;
    assert_eq!(again["results"][0]["outcome"], "already_sent");
    assert_eq!(store.audit_count(), 2);

    let (status, audit) = call(
        &app,
        Method::GET,
        "/api/v1/email-audit?recipient=sarah@example.com",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let audit = audit.as_array().unwrap();
    assert_eq!(audit.len(), 1);
    assert_eq!(audit[0]["type"], "lead_thank_you");
    assert_eq!(audit[0]["leadId"], id.as_str());
}

#[tokio::test]
async fn test_wrongly_typed_field_uses_validation_envelope() {
    let (app, store) = app();
    let mut body = sarah();
    body["preferredStyle"] = json!("candid");

    let (status, body) = call(&app, Method::POST, "/api/v1/leads", Some(body)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
    assert_eq!(body["error"]["fields"][0]["field"], "preferredStyle");
    assert_eq!(store.lead_count(), 0);
}

#[tokio::test]
async fn test_webhook_for_unknown_lead_sends_nothing() {
    let (app, store, transport) = app_with_transport();
    let event = json!({
        "id": "forged",
        "data": {
            "id": "forged",
            "firstName": "Visit evil.example now",
            "lastName": "Lee",
            "email": "victim@example.org",
            "status": "new",
            "source": "website_form",
            "createdAt": "2025-03-02T14:30:00Z",
            "updatedAt": "2025-03-02T14:30:00Z"
        }
    });

    let (status, body) = call(&app, Method::POST, "/api/v1/events/lead-created", Some(event)).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "NOT_FOUND");
    assert!(transport.sent().is_empty());
    assert_eq!(store.audit_count(), 0);
    assert_eq!(store.lead_count(), 0);
}
