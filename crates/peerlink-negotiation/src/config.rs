//! Coordinator configuration.

use serde::{Deserialize, Serialize};

use crate::{AnswerOptions, OfferOptions};

/// Settings for the negotiation coordinator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NegotiationConfig {
    /// Capacity of the coordinator's mailbox. Senders wait when it is full.
    pub mailbox_capacity: usize,
    /// Options passed to every `createOffer`.
    pub offer: OfferOptions,
    /// Options passed to every `createAnswer`.
    pub answer: AnswerOptions,
}

impl Default for NegotiationConfig {
    fn default() -> Self {
        Self {
            mailbox_capacity: 1_024,
            offer: OfferOptions::default(),
            answer: AnswerOptions::default(),
        }
    }
}
