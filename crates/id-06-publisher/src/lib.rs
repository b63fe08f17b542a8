//! # Publisher (Subsystem 06)
//!
//! Turns pending tree changes into confirmed on-chain states.
//!
//! ```text
//! ┌────────────┐  compute / sign   ┌────────────┐  prove   ┌────────────┐
//! │   id-03    │ ────────────────→ │  Publisher │ ───────→ │   id-04    │
//! │   engine   │ ←──────────────── │            │          │   prover   │
//! └────────────┘  status updates   └─────┬──────┘          └────────────┘
//!                                        │ submit / wait
//!                                        ▼
//!                                  ┌────────────┐
//!                                  │   id-05    │
//!                                  │  gateway   │
//!                                  └────────────┘
//! ```
//!
//! Status changes (`transacted`, `confirmed`, `failed`) and the confirmed
//! revocation root are announced on the shared event bus.

pub mod domain;
pub mod service;

pub use domain::{PublicationOutcome, PublishError, PublishReport, PublishResult};
pub use service::{Publisher, PublisherConfig};
