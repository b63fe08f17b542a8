//! # Shared Bus - Issuer Event Bus
//!
//! Fire-and-forget notifications out of the publication pipeline.
//!
//! ```text
//! ┌──────────────┐                    ┌──────────────────────┐
//! │  Publisher   │                    │ Reverse-hash sink    │
//! │   (id-06)    │    publish()       │ (node-runtime)       │
//! │              │ ──────┐            │                      │
//! └──────────────┘       │            └──────────────────────┘
//!                        ▼                    ↑
//!                  ┌──────────────┐          │
//!                  │  Event Bus   │          │
//!                  │              │ ─────────┘
//!                  └──────────────┘  subscribe()
//! ```
//!
//! Publishing never blocks and never fails the caller: with no subscribers
//! the event is dropped and logged. Consumers must be idempotent.

#![allow(clippy::missing_const_for_fn)]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod events;
pub mod publisher;
pub mod subscriber;

// Re-export main types
pub use events::{EventFilter, EventTopic, IssuerEvent};
pub use publisher::{EventPublisher, InMemoryEventBus};
pub use subscriber::{EventSubscriber, Subscription, SubscriptionError};

/// Maximum events to buffer per subscriber before lagging.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1000;
