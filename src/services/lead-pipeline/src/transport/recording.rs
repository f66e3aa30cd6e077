//! In-memory transport that records messages instead of sending them
//!
//! Used by the test suites and handy for running the service locally without
//! a relay. Individual recipients can be set to fail.

use super::{EmailTransport, OutboundEmail, TransportInfo};
use crate::error::{PipelineError, Result};
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};

#[derive(Clone, Default)]
pub struct RecordingTransport {
    sent: Arc<Mutex<Vec<OutboundEmail>>>,
    failing: Arc<Mutex<HashSet<String>>>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every send to `recipient` fail with a transport error
    pub fn fail_for(&self, recipient: impl Into<String>) {
        lock(&self.failing).insert(recipient.into());
    }

    pub fn recover(&self, recipient: &str) {
        lock(&self.failing).remove(recipient);
    }

    pub fn sent(&self) -> Vec<OutboundEmail> {
        lock(&self.sent).clone()
    }

    pub fn sent_to(&self, recipient: &str) -> Vec<OutboundEmail> {
        lock(&self.sent)
            .iter()
            .filter(|email| email.to == recipient)
            .cloned()
            .collect()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[async_trait]
impl EmailTransport for RecordingTransport {
    async fn send(&self, email: &OutboundEmail) -> Result<bool> {
        if lock(&self.failing).contains(&email.to) {
            return Err(PipelineError::email(format!(
                "recipient {} rejected",
                email.to
            )));
        }
        lock(&self.sent).push(email.clone());
        Ok(true)
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }

    fn info(&self) -> TransportInfo {
        TransportInfo {
            name: "recording".to_string(),
            description: "In-memory recording transport".to_string(),
            configured: true,
        }
    }
}
