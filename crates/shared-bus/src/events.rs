//! # Issuer Events
//!
//! Events emitted by the publication pipeline.

use serde::{Deserialize, Serialize};
use shared_types::{Did, Hash};

/// All events that can be published to the event bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum IssuerEvent {
    // =========================================================================
    // PUBLICATION
    // =========================================================================
    /// A state transition transaction was submitted.
    StateTransacted {
        identifier: Did,
        state: Hash,
        tx_hash: Hash,
    },

    /// A state reached the configured confirmation depth.
    StateConfirmed {
        identifier: Did,
        state: Hash,
        block_number: u64,
    },

    /// A publication attempt was abandoned.
    StateFailed {
        identifier: Did,
        state: Hash,
        reason: String,
    },

    // =========================================================================
    // REVOCATION STATUS (reverse-hash sink)
    // =========================================================================
    /// The identity's revocation tree root is now anchored on chain.
    RevocationRootPublished {
        identifier: Did,
        state: Hash,
        revocation_tree_root: Hash,
    },

    // =========================================================================
    // CRITICAL EVENTS (DLQ)
    // =========================================================================
    /// Error requiring operator attention (e.g. tree corruption).
    CriticalError { identifier: Did, error: String },
}

impl IssuerEvent {
    /// Get the topic for this event (for filtering).
    #[must_use]
    pub fn topic(&self) -> EventTopic {
        match self {
            Self::StateTransacted { .. }
            | Self::StateConfirmed { .. }
            | Self::StateFailed { .. } => EventTopic::Publication,
            Self::RevocationRootPublished { .. } => EventTopic::RevocationStatus,
            Self::CriticalError { .. } => EventTopic::DeadLetterQueue,
        }
    }

    /// The identity the event concerns.
    #[must_use]
    pub fn identifier(&self) -> &Did {
        match self {
            Self::StateTransacted { identifier, .. }
            | Self::StateConfirmed { identifier, .. }
            | Self::StateFailed { identifier, .. }
            | Self::RevocationRootPublished { identifier, .. }
            | Self::CriticalError { identifier, .. } => identifier,
        }
    }
}

/// Event topics for subscription filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventTopic {
    /// State publication lifecycle.
    Publication,
    /// Revocation-status notifications.
    RevocationStatus,
    /// Dead Letter Queue for critical errors.
    DeadLetterQueue,
    /// All events (no filtering).
    All,
}

/// Filter for subscribing to specific events.
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    /// Topics to include. Empty means all topics.
    pub topics: Vec<EventTopic>,
    /// Identities to include. Empty means all identities.
    pub identities: Vec<Did>,
}

impl EventFilter {
    /// Create a filter that accepts all events.
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    /// Create a filter for specific topics.
    #[must_use]
    pub fn topics(topics: Vec<EventTopic>) -> Self {
        Self {
            topics,
            identities: Vec::new(),
        }
    }

    /// Restrict to events about the given identity.
    #[must_use]
    pub fn for_identity(mut self, identifier: Did) -> Self {
        self.identities.push(identifier);
        self
    }

    /// Check if an event matches this filter.
    #[must_use]
    pub fn matches(&self, event: &IssuerEvent) -> bool {
        let topic_match = self.topics.is_empty()
            || self.topics.contains(&EventTopic::All)
            || self.topics.contains(&event.topic());

        let identity_match =
            self.identities.is_empty() || self.identities.contains(event.identifier());

        topic_match && identity_match
    }
}
