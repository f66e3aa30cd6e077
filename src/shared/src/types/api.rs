//! Request and response shapes for the lead pipeline HTTP API

use serde::{Deserialize, Serialize};

use super::core::{EmailType, LeadStatus};

/// Returned by a successful form submission
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SubmitLeadResponse {
    pub id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateLeadStatusRequest {
    pub status: LeadStatus,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListLeadsQuery {
    pub status: Option<LeadStatus>,
    pub limit: Option<u32>,
}

/// Filter for the email audit log; every field narrows the result
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditQuery {
    pub lead_id: Option<String>,
    pub recipient: Option<String>,
    #[serde(rename = "type")]
    pub email_type: Option<EmailType>,
    pub limit: Option<u32>,
}

/// One rejected form field
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FieldViolation {
    pub field: String,
    pub message: String,
}

impl FieldViolation {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

// =============================================================================
// Dispatch reporting
// =============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryOutcome {
    Sent,
    /// An audit record for this lead and type already existed
    AlreadySent,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EmailDispatchResult {
    #[serde(rename = "type")]
    pub email_type: EmailType,
    pub recipient: String,
    pub outcome: DeliveryOutcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// What one dispatcher invocation did for one lead
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DispatchReport {
    pub lead_id: String,
    pub results: Vec<EmailDispatchResult>,
}

impl DispatchReport {
    pub fn new(lead_id: impl Into<String>) -> Self {
        Self {
            lead_id: lead_id.into(),
            results: Vec::new(),
        }
    }

    /// No email ended in failure
    pub fn is_complete(&self) -> bool {
        self.results
            .iter()
            .all(|r| r.outcome != DeliveryOutcome::Failed)
    }

    pub fn count(&self, outcome: DeliveryOutcome) -> usize {
        self.results.iter().filter(|r| r.outcome == outcome).count()
    }

    pub fn outcome_for(&self, email_type: EmailType) -> Option<DeliveryOutcome> {
        self.results
            .iter()
            .find(|r| r.email_type == email_type)
            .map(|r| r.outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_completeness() {
        let mut report = DispatchReport::new("lead-1");
        report.results.push(EmailDispatchResult {
            email_type: EmailType::LeadThankYou,
            recipient: "sarah@example.com".to_string(),
            outcome: DeliveryOutcome::Sent,
            error: None,
        });
        assert!(report.is_complete());

        report.results.push(EmailDispatchResult {
            email_type: EmailType::AdminNotification,
            recipient: "owner@studio.example".to_string(),
            outcome: DeliveryOutcome::Failed,
            error: Some("relay refused".to_string()),
        });
        assert!(!report.is_complete());
        assert_eq!(report.count(DeliveryOutcome::Sent), 1);
        assert_eq!(
            report.outcome_for(EmailType::AdminNotification),
            Some(DeliveryOutcome::Failed)
        );
    }

    #[test]
    fn test_audit_query_wire_names() {
        let query: AuditQuery =
            serde_json::from_str(r#"{"leadId":"l1","type":"admin_notification"}"#).unwrap();
        assert_eq!(query.lead_id.as_deref(), Some("l1"));
        assert_eq!(query.email_type, Some(EmailType::AdminNotification));
    }
}
