//! Results of publication attempts.

use shared_types::IdentityState;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublicationOutcome {
    /// No pending changes and nothing to resume.
    NothingToPublish,
    Confirmed(IdentityState),
    /// The attempt ended with the state persisted as `failed`.
    Failed(IdentityState),
}

/// Tally of one `publish_all` or `check_transacted_states` pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PublishReport {
    pub confirmed: usize,
    pub failed: usize,
    pub in_progress: usize,
    pub idle: usize,
    /// Attempts that ended in an error without a persisted status change.
    pub errors: usize,
}

impl PublishReport {
    pub fn record(&mut self, result: &Result<PublicationOutcome, super::PublishError>) {
        match result {
            Ok(PublicationOutcome::Confirmed(_)) => self.confirmed += 1,
            Ok(PublicationOutcome::Failed(_)) => self.failed += 1,
            Ok(PublicationOutcome::NothingToPublish) => self.idle += 1,
            Err(super::PublishError::PublicationInProgress(_)) => self.in_progress += 1,
            Err(_) => self.errors += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.confirmed + self.failed + self.in_progress + self.idle + self.errors
    }
}
