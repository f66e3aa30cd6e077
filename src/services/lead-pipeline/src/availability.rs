//! Availability lookup for a lead's event date

use crate::store::BookingCalendar;
use std::sync::Arc;
use studio_shared::Lead;
use tracing::{debug, warn};

/// Answers "is the photographer free on this lead's date?"
///
/// `None` means the question has no answer: no date was given, the date is
/// free text, or the calendar could not be read. Callers fall back to the
/// generic sentence in that case.
#[derive(Clone)]
pub struct AvailabilityChecker {
    calendar: Arc<dyn BookingCalendar>,
}

impl AvailabilityChecker {
    pub fn new(calendar: Arc<dyn BookingCalendar>) -> Self {
        Self { calendar }
    }

    pub async fn check(&self, lead: &Lead) -> Option<bool> {
        let raw = lead.event_date.as_deref()?;

        let Some(date) = lead.event_day() else {
            debug!("Event date '{}' for lead {} is not a calendar date", raw, lead.id);
            return None;
        };

        match self.calendar.is_date_available(date).await {
            Ok(available) => Some(available),
            Err(e) => {
                warn!("Availability lookup failed for lead {}: {}", lead.id, e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{PipelineError, Result};
    use crate::store::{Booking, InMemoryStore};
    use async_trait::async_trait;
    use chrono::{NaiveDate, Utc};
    use studio_shared::LeadSubmission;

    struct BrokenCalendar;

    #[async_trait]
    impl BookingCalendar for BrokenCalendar {
        async fn is_date_available(&self, _date: NaiveDate) -> Result<bool> {
            Err(PipelineError::database("bookings unreachable"))
        }
    }

    fn lead(event_date: Option<&str>) -> Lead {
        LeadSubmission {
            first_name: "Sarah".to_string(),
            last_name: "Johnson".to_string(),
            email: "sarah@example.com".to_string(),
            event_date: event_date.map(str::to_string),
            ..Default::default()
        }
        .into_lead("lead-1".to_string(), Utc::now())
    }

    #[tokio::test]
    async fn test_booked_and_free_dates() {
        let store = InMemoryStore::new();
        store.add_booking(
            "b1",
            Booking::confirmed(NaiveDate::from_ymd_opt(2025, 9, 15).unwrap()),
        );
        let checker = AvailabilityChecker::new(Arc::new(store));

        assert_eq!(checker.check(&lead(Some("2025-09-15"))).await, Some(false));
        assert_eq!(checker.check(&lead(Some("2025-09-16"))).await, Some(true));
    }

    #[tokio::test]
    async fn test_no_answer_without_a_calendar_date() {
        let checker = AvailabilityChecker::new(Arc::new(InMemoryStore::new()));
        assert_eq!(checker.check(&lead(None)).await, None);
        assert_eq!(checker.check(&lead(Some("late summer"))).await, None);
    }

    #[tokio::test]
    async fn test_calendar_errors_are_swallowed() {
        let checker = AvailabilityChecker::new(Arc::new(BrokenCalendar));
        assert_eq!(checker.check(&lead(Some("2025-09-15"))).await, None);
    }
}
