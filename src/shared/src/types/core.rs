//! Core domain types for the studio lead pipeline
//!
//! A [`Lead`] is one inbound inquiry from the website contact form. An
//! [`EmailAuditRecord`] is the immutable proof that one email about a lead
//! was handed to the mail relay.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use validator::Validate;

/// Source tag stamped on leads that arrive without one
pub const DEFAULT_LEAD_SOURCE: &str = "website_form";

/// Returned when a status or type tag does not name a known variant
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown {kind}: {value}")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

// =============================================================================
// Event type
// =============================================================================

/// Kind of shoot the visitor is asking about
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Wedding,
    Portrait,
    Engagement,
    #[default]
    Other,
}

impl EventType {
    /// Parse a form value; anything unrecognized is `Other`
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "wedding" => EventType::Wedding,
            "portrait" => EventType::Portrait,
            "engagement" => EventType::Engagement,
            _ => EventType::Other,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Wedding => "wedding",
            EventType::Portrait => "portrait",
            EventType::Engagement => "engagement",
            EventType::Other => "other",
        }
    }

    /// Capitalized label, e.g. "Wedding"
    pub fn display_name(&self) -> &'static str {
        match self {
            EventType::Wedding => "Wedding",
            EventType::Portrait => "Portrait",
            EventType::Engagement => "Engagement",
            EventType::Other => "Other",
        }
    }

    /// Service name used in client-facing copy. `Other` has no prefix.
    pub fn service_name(&self) -> String {
        match self {
            EventType::Other => "Photography".to_string(),
            other => format!("{} Photography", other.display_name()),
        }
    }
}

impl<'de> Deserialize<'de> for EventType {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let label = String::deserialize(deserializer)?;
        Ok(EventType::from_label(&label))
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Lead status
// =============================================================================

/// Pipeline stage of a lead, moved forward by studio staff
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum LeadStatus {
    #[default]
    New,
    Contacted,
    Qualified,
    Converted,
    Lost,
}

impl LeadStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LeadStatus::New => "new",
            LeadStatus::Contacted => "contacted",
            LeadStatus::Qualified => "qualified",
            LeadStatus::Converted => "converted",
            LeadStatus::Lost => "lost",
        }
    }
}

impl fmt::Display for LeadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LeadStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "new" => Ok(LeadStatus::New),
            "contacted" => Ok(LeadStatus::Contacted),
            "qualified" => Ok(LeadStatus::Qualified),
            "converted" => Ok(LeadStatus::Converted),
            "lost" => Ok(LeadStatus::Lost),
            other => Err(UnknownVariant {
                kind: "lead status",
                value: other.to_string(),
            }),
        }
    }
}

// =============================================================================
// Lead
// =============================================================================

/// A stored inquiry
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Lead {
    pub id: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default)]
    pub event_type: EventType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_location: Option<String>,
    #[serde(default)]
    pub preferred_style: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub budget_range: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub how_heard_about_us: Option<String>,
    #[serde(default)]
    pub message: String,
    pub status: LeadStatus,
    pub source: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Lead {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }

    /// Event date as a calendar day, when it is given in `YYYY-MM-DD` form
    pub fn event_day(&self) -> Option<NaiveDate> {
        self.event_date
            .as_deref()
            .and_then(|d| NaiveDate::parse_from_str(d.trim(), "%Y-%m-%d").ok())
    }
}

// =============================================================================
// Lead submission
// =============================================================================

/// Raw contact-form payload, before it becomes a [`Lead`]
///
/// Required fields default to empty so that a missing field is reported as a
/// field-level validation failure instead of a JSON parse error.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct LeadSubmission {
    #[serde(default)]
    #[validate(length(min = 1, message = "First name is required"))]
    pub first_name: String,

    #[serde(default)]
    #[validate(length(min = 1, message = "Last name is required"))]
    pub last_name: String,

    #[serde(default)]
    #[validate(email(message = "A valid email address is required"))]
    pub email: String,

    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub event_type: EventType,
    #[serde(default)]
    pub event_date: Option<String>,
    #[serde(default)]
    pub event_location: Option<String>,
    #[serde(default)]
    pub preferred_style: Vec<String>,
    #[serde(default)]
    pub budget_range: Option<String>,
    #[serde(default)]
    pub how_heard_about_us: Option<String>,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub source: Option<String>,
}

impl LeadSubmission {
    /// Trim every field, drop blank optionals and repeated styles.
    ///
    /// Validation runs on the normalized form, so a name of only spaces is
    /// rejected as missing.
    pub fn normalized(self) -> Self {
        let mut styles: Vec<String> = Vec::with_capacity(self.preferred_style.len());
        for style in self.preferred_style {
            let style = style.trim();
            if !style.is_empty() && !styles.iter().any(|s| s == style) {
                styles.push(style.to_string());
            }
        }

        Self {
            first_name: self.first_name.trim().to_string(),
            last_name: self.last_name.trim().to_string(),
            email: self.email.trim().to_string(),
            phone: non_blank(self.phone),
            event_type: self.event_type,
            event_date: non_blank(self.event_date),
            event_location: non_blank(self.event_location),
            preferred_style: styles,
            budget_range: non_blank(self.budget_range),
            how_heard_about_us: non_blank(self.how_heard_about_us),
            message: self.message.trim().to_string(),
            source: non_blank(self.source),
        }
    }

    /// Build the stored record. Status starts at `new` and both timestamps
    /// carry the same instant.
    pub fn into_lead(self, id: String, now: DateTime<Utc>) -> Lead {
        Lead {
            id,
            first_name: self.first_name,
            last_name: self.last_name,
            email: self.email,
            phone: self.phone,
            event_type: self.event_type,
            event_date: self.event_date,
            event_location: self.event_location,
            preferred_style: self.preferred_style,
            budget_range: self.budget_range,
            how_heard_about_us: self.how_heard_about_us,
            message: self.message,
            status: LeadStatus::New,
            source: self
                .source
                .unwrap_or_else(|| DEFAULT_LEAD_SOURCE.to_string()),
            created_at: now,
            updated_at: now,
        }
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

// =============================================================================
// Email audit
// =============================================================================

/// Which of the two lead emails a send was
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EmailType {
    /// Autoresponse to the prospective client
    LeadThankYou,
    /// Internal notification to the studio owner
    AdminNotification,
}

impl EmailType {
    /// Dispatch order: client first, then admin
    pub const ALL: [EmailType; 2] = [EmailType::LeadThankYou, EmailType::AdminNotification];

    pub fn as_str(&self) -> &'static str {
        match self {
            EmailType::LeadThankYou => "lead_thank_you",
            EmailType::AdminNotification => "admin_notification",
        }
    }
}

impl fmt::Display for EmailType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EmailType {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "lead_thank_you" => Ok(EmailType::LeadThankYou),
            "admin_notification" => Ok(EmailType::AdminNotification),
            other => Err(UnknownVariant {
                kind: "email type",
                value: other.to_string(),
            }),
        }
    }
}

/// One successful send, with enough lead context to review it without a join
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EmailAuditRecord {
    pub id: String,
    pub lead_id: String,
    pub recipient: String,
    pub subject: String,
    #[serde(rename = "type")]
    pub email_type: EmailType,
    pub sent_at: DateTime<Utc>,
    pub lead_name: String,
    pub event_type: EventType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_date: Option<String>,
}

impl EmailAuditRecord {
    pub fn new(
        lead: &Lead,
        email_type: EmailType,
        recipient: impl Into<String>,
        subject: impl Into<String>,
        sent_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            lead_id: lead.id.clone(),
            recipient: recipient.into(),
            subject: subject.into(),
            email_type,
            sent_at,
            lead_name: lead.full_name(),
            event_type: lead.event_type,
            event_date: lead.event_date.clone(),
        }
    }
}
