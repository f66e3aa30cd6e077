//! Domain events exchanged between the persistence side and the dispatcher
//!
//! The dispatcher never learns how an event reached it: a store change feed,
//! a webhook and a direct call all deliver the same [`LeadCreated`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::core::Lead;

/// A lead document was created
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LeadCreated {
    pub id: String,
    pub data: Lead,
}

impl LeadCreated {
    pub fn new(lead: Lead) -> Self {
        Self {
            id: lead.id.clone(),
            data: lead,
        }
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.data.created_at
    }
}
