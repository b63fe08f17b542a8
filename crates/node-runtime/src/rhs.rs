//! # Reverse Hash Service Forwarder
//!
//! Consumes `RevocationRootPublished` events from the bus and pushes them to
//! the Reverse Hash Service, or logs them when no service is configured.
//! Delivery is best-effort: a failed push is logged and dropped, the sink
//! is idempotent and the next confirmation republishes the latest root.

use crate::config::ReverseHashConfig;
use serde::Serialize;
use shared_bus::{IssuerEvent, Subscription};
use shared_types::{hash_to_hex, Did, Hash};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

#[derive(Debug, Serialize)]
struct RevocationRootNotice<'a> {
    identifier: &'a str,
    state: String,
    revocation_tree_root: String,
}

pub struct RevocationForwarder {
    target: Option<(reqwest::Client, String)>,
    forwarded: AtomicU64,
    failed: AtomicU64,
}

impl RevocationForwarder {
    pub fn new(config: &ReverseHashConfig) -> Result<Self, reqwest::Error> {
        let target = match (&config.url, config.enabled) {
            (Some(url), true) => {
                let client = reqwest::Client::builder()
                    .timeout(config.request_timeout)
                    .build()?;
                Some((client, format!("{}/node", url.trim_end_matches('/'))))
            }
            _ => None,
        };
        Ok(Self {
            target,
            forwarded: AtomicU64::new(0),
            failed: AtomicU64::new(0),
        })
    }

    pub fn forwarded(&self) -> u64 {
        self.forwarded.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    /// Forward events until the bus closes or shutdown is signalled.
    pub async fn run(&self, mut events: Subscription, mut shutdown: watch::Receiver<bool>) {
        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Some(event) => self.handle(event).await,
                    None => break,
                },
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        debug!("[rhs] Forwarder stopped");
    }

    async fn handle(&self, event: IssuerEvent) {
        match event {
            IssuerEvent::RevocationRootPublished {
                identifier,
                state,
                revocation_tree_root,
            } => self.forward(&identifier, state, revocation_tree_root).await,
            IssuerEvent::CriticalError { identifier, error } => {
                error!(did = %identifier, %error, "[rhs] Critical publication error");
            }
            other => debug!(topic = ?other.topic(), "[rhs] Ignoring event"),
        }
    }

    async fn forward(&self, identifier: &Did, state: Hash, revocation_tree_root: Hash) {
        let notice = RevocationRootNotice {
            identifier: identifier.as_str(),
            state: hash_to_hex(&state),
            revocation_tree_root: hash_to_hex(&revocation_tree_root),
        };
        let Some((client, url)) = &self.target else {
            info!(
                did = %identifier,
                root = %notice.revocation_tree_root,
                "[rhs] Revocation root published"
            );
            self.forwarded.fetch_add(1, Ordering::Relaxed);
            return;
        };

        let result = client
            .post(url)
            .json(&notice)
            .send()
            .await
            .and_then(|response| response.error_for_status());
        match result {
            Ok(_) => {
                debug!(did = %identifier, "[rhs] Revocation root pushed");
                self.forwarded.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                warn!(did = %identifier, error = %e, "[rhs] Push failed, dropped");
                self.failed.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
}
