//! Email template rendering
//!
//! Two templates, compiled once when the renderer is built:
//! - the client thank-you, greeting the lead and answering the availability
//!   question for their date
//! - the admin notification, laying out every lead field for triage
//!
//! Rendering is pure. Everything a template shows, including the copyright
//! year, arrives in the [`EmailContext`].

use crate::config::BusinessConfig;
use crate::error::Result;
use chrono::NaiveDate;
use handlebars::Handlebars;
use serde::Serialize;
use studio_shared::{EmailType, Lead};
use tracing::info;

const CLIENT_BODY: &str = include_str!("../templates/client_thank_you.html.hbs");
const ADMIN_BODY: &str = include_str!("../templates/admin_notification.html.hbs");

const CLIENT_SUBJECT: &str = "Your {{service_name}} Inquiry | {{business.name}}";
const ADMIN_SUBJECT: &str = "New Lead: {{first_name}} {{last_name}} ({{event_label}})";

/// Which audience an email is rendered for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplateKind {
    Client,
    Admin,
}

impl TemplateKind {
    fn body_name(&self) -> &'static str {
        match self {
            TemplateKind::Client => "client_body",
            TemplateKind::Admin => "admin_body",
        }
    }

    fn subject_name(&self) -> &'static str {
        match self {
            TemplateKind::Client => "client_subject",
            TemplateKind::Admin => "admin_subject",
        }
    }

    pub fn email_type(&self) -> EmailType {
        match self {
            TemplateKind::Client => EmailType::LeadThankYou,
            TemplateKind::Admin => EmailType::AdminNotification,
        }
    }
}

impl From<EmailType> for TemplateKind {
    fn from(email_type: EmailType) -> Self {
        match email_type {
            EmailType::LeadThankYou => TemplateKind::Client,
            EmailType::AdminNotification => TemplateKind::Admin,
        }
    }
}

/// Which availability sentence the client email carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AvailabilityMessage {
    Available,
    Booked,
    Generic,
}

impl AvailabilityMessage {
    /// A date with a known answer gets a specific sentence; no date, or a
    /// date nobody could check, gets the generic one.
    pub fn select(has_event_date: bool, available: Option<bool>) -> Self {
        match (has_event_date, available) {
            (true, Some(true)) => AvailabilityMessage::Available,
            (true, Some(false)) => AvailabilityMessage::Booked,
            _ => AvailabilityMessage::Generic,
        }
    }

    fn admin_label(&self) -> &'static str {
        match self {
            AvailabilityMessage::Available => "Open",
            AvailabilityMessage::Booked => "Already booked",
            AvailabilityMessage::Generic => "Not checked",
        }
    }
}

/// Business details as the templates see them
#[derive(Debug, Clone, Serialize)]
pub struct BusinessContext {
    pub name: String,
    pub photographer_name: String,
    pub phone: String,
    pub website: String,
    pub instagram: Option<String>,
}

impl From<&BusinessConfig> for BusinessContext {
    fn from(config: &BusinessConfig) -> Self {
        Self {
            name: config.name.clone(),
            photographer_name: config.photographer_name.clone(),
            phone: config.phone.clone(),
            website: config.website.clone(),
            instagram: config.instagram.clone(),
        }
    }
}

/// Every value either template may show
#[derive(Debug, Clone, Serialize)]
pub struct EmailContext {
    pub lead_id: String,
    pub first_name: String,
    pub last_name: String,
    pub full_name: String,
    pub email: String,
    pub phone: Option<String>,
    pub event_label: String,
    pub service_name: String,
    pub event_date_display: Option<String>,
    pub event_location: Option<String>,
    pub preferred_style: Vec<String>,
    pub budget_range: Option<String>,
    pub how_heard_about_us: Option<String>,
    pub message: String,
    pub source: String,
    pub status: String,
    pub submitted_at: String,
    pub availability: AvailabilityMessage,
    pub availability_label: String,
    pub show_available: bool,
    pub show_booked: bool,
    pub business: BusinessContext,
    pub year: i32,
}

impl EmailContext {
    pub fn from_lead(
        lead: &Lead,
        available: Option<bool>,
        business: &BusinessConfig,
        year: i32,
    ) -> Self {
        let availability = AvailabilityMessage::select(lead.event_date.is_some(), available);

        Self {
            lead_id: lead.id.clone(),
            first_name: lead.first_name.clone(),
            last_name: lead.last_name.clone(),
            full_name: lead.full_name(),
            email: lead.email.clone(),
            phone: lead.phone.clone(),
            event_label: lead.event_type.display_name().to_string(),
            service_name: lead.event_type.service_name(),
            event_date_display: lead.event_date.as_deref().map(display_date),
            event_location: lead.event_location.clone(),
            preferred_style: lead.preferred_style.clone(),
            budget_range: lead.budget_range.clone(),
            how_heard_about_us: lead.how_heard_about_us.clone(),
            message: lead.message.clone(),
            source: lead.source.clone(),
            status: lead.status.to_string(),
            submitted_at: lead.created_at.format("%B %-d, %Y at %H:%M UTC").to_string(),
            availability,
            availability_label: availability.admin_label().to_string(),
            show_available: availability == AvailabilityMessage::Available,
            show_booked: availability == AvailabilityMessage::Booked,
            business: BusinessContext::from(business),
            year,
        }
    }
}

/// `2025-09-15` becomes `September 15, 2025`; anything else is shown as typed
fn display_date(raw: &str) -> String {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map(|date| date.format("%B %-d, %Y").to_string())
        .unwrap_or_else(|_| raw.to_string())
}

/// A rendered email, ready for a transport
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedEmail {
    pub subject: String,
    pub html: String,
}

/// Renders both email kinds from compiled handlebars templates
pub struct TemplateRenderer {
    bodies: Handlebars<'static>,
    subjects: Handlebars<'static>,
}

impl TemplateRenderer {
    pub fn new() -> Result<Self> {
        let mut bodies = Handlebars::new();
        bodies.set_strict_mode(false);
        bodies.register_template_string(TemplateKind::Client.body_name(), CLIENT_BODY)?;
        bodies.register_template_string(TemplateKind::Admin.body_name(), ADMIN_BODY)?;

        // Subjects are headers, not HTML
        let mut subjects = Handlebars::new();
        subjects.register_escape_fn(handlebars::no_escape);
        subjects.register_template_string(TemplateKind::Client.subject_name(), CLIENT_SUBJECT)?;
        subjects.register_template_string(TemplateKind::Admin.subject_name(), ADMIN_SUBJECT)?;

        info!("Email templates compiled");
        Ok(Self { bodies, subjects })
    }

    pub fn render(&self, kind: TemplateKind, context: &EmailContext) -> Result<RenderedEmail> {
        let subject = self.subjects.render(kind.subject_name(), context)?;
        let html = self.bodies.render(kind.body_name(), context)?;

        Ok(RenderedEmail {
            subject: subject.trim().to_string(),
            html,
        })
    }
}
