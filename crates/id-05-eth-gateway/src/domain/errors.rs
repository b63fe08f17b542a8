//! Gateway errors and their retry classification.

use id_01_kms::KmsError;
use primitive_types::U256;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GatewayError {
    /// Network gas price above the configured ceiling. Nothing was sent.
    #[error("Gas price {network} exceeds maximum {max}")]
    GasPriceExceeded { network: U256, max: U256 },

    /// The transaction could not be submitted within the retry budget.
    #[error("Submission failed: {0}")]
    SubmissionFailed(String),

    /// No receipt, or not enough confirmations, before the deadline.
    #[error("Confirmation timeout: {0}")]
    ConfirmationTimeout(String),

    /// Mined with a failure status.
    #[error("Transaction {tx_hash} reverted in block {block_number}")]
    TransactionReverted { tx_hash: String, block_number: u64 },

    /// Shutdown requested while waiting. Submitted transactions stand.
    #[error("Cancelled by shutdown")]
    Cancelled,

    /// The node refused the transaction for a reason a resend cannot fix.
    #[error("Transaction rejected: {0}")]
    Rejected(String),

    /// A single JSON-RPC call failed.
    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("Malformed transaction: {0}")]
    MalformedTransaction(String),

    #[error("Signing failed: {0}")]
    Signing(#[from] KmsError),
}

impl GatewayError {
    /// Transient errors: a later attempt with fresh gas pricing may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            GatewayError::GasPriceExceeded { .. }
                | GatewayError::SubmissionFailed(_)
                | GatewayError::ConfirmationTimeout(_)
                | GatewayError::Rpc(_)
        )
    }

    /// Reason recorded on a failed state.
    pub fn failure_reason(&self) -> String {
        let kind = match self {
            GatewayError::GasPriceExceeded { .. } => "GasPriceExceeded",
            GatewayError::SubmissionFailed(_) => "SubmissionFailed",
            GatewayError::ConfirmationTimeout(_) => "ConfirmationTimeout",
            GatewayError::TransactionReverted { .. } => "TransactionReverted",
            GatewayError::Cancelled => "Cancelled",
            GatewayError::Rejected(_) => "Rejected",
            GatewayError::Rpc(_) => "RpcError",
            GatewayError::MalformedTransaction(_) => "MalformedTransaction",
            GatewayError::Signing(_) => "SigningFailed",
        };
        format!("{kind}: {self}")
    }
}

pub type GatewayResult<T> = Result<T, GatewayError>;

/// How a failed `eth_sendRawTransaction` is handled, judged from the
/// node's error message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendRejection {
    /// The node already holds this exact transaction.
    AlreadyKnown,
    /// Definitely not accepted, but a fresh nonce or gas price may pass.
    Stale,
    /// Resending cannot succeed.
    Permanent,
    /// Transport or node trouble. The transaction may have been accepted.
    Ambiguous,
}

const ALREADY_KNOWN: &[&str] = &["already known", "known transaction", "already imported"];

const STALE: &[&str] = &[
    "nonce too low",
    "nonce too high",
    "underpriced",
    "fee too low",
];

const PERMANENT: &[&str] = &[
    "insufficient funds",
    "invalid chain id",
    "invalid sender",
    "intrinsic gas too low",
    "exceeds block gas limit",
    "execution reverted",
    "oversized data",
];

impl SendRejection {
    pub fn classify(reason: &str) -> Self {
        let reason = reason.to_ascii_lowercase();
        let any = |needles: &[&str]| needles.iter().any(|n| reason.contains(n));
        if any(ALREADY_KNOWN) {
            SendRejection::AlreadyKnown
        } else if any(STALE) {
            SendRejection::Stale
        } else if any(PERMANENT) {
            SendRejection::Permanent
        } else {
            SendRejection::Ambiguous
        }
    }
}
