//! Error types for the txcourier pipeline

use ethers::types::{Address, Transaction, TransactionReceipt, H256};
use thiserror::Error;

/// Main error type for the submission pipeline
#[derive(Error, Debug)]
pub enum CourierError {
    #[error("Configuration error: {0}")]
    Config(String),

    /// Transport-level failure from the node. The raw message is kept
    /// verbatim: the revert decoder parses `"Node error: "` payloads
    /// out of it.
    #[error("Node RPC error: {0}")]
    Rpc(String),

    #[error("Nonce allocation failed for {address:?}: {message}")]
    NonceAllocation { address: Address, message: String },

    #[error("Wallet error: {0}")]
    Wallet(String),

    #[error("Contract error: {0}")]
    Contract(String),

    /// The transaction was mined with status 0. Carries the original
    /// transaction, the failing receipt and a best-effort reason string
    /// (never empty) so callers can branch on all three.
    #[error("revert {reason}")]
    TransactionFailed {
        transaction: Box<Transaction>,
        receipt: Box<TransactionReceipt>,
        reason: String,
    },

    /// Caller misuse: malformed receipt, successful receipt passed to
    /// the revert decoder, missing transaction hash. Never recovered.
    #[error("{0}")]
    Precondition(String),

    #[error("Transaction failed as it ran out of gas")]
    GasExhausted,

    #[error("{0}")]
    RevertDecode(String),

    #[error("Transaction {hash:?} not found")]
    TransactionNotFound { hash: H256 },

    #[error("Timeout waiting for {operation}")]
    Timeout { operation: String },
}

impl CourierError {
    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CourierError::Rpc(_)
                | CourierError::Timeout { .. }
                | CourierError::NonceAllocation { .. }
        )
    }

    /// The decoded revert reason, if this is a failed-transaction error.
    pub fn revert_reason(&self) -> Option<&str> {
        match self {
            CourierError::TransactionFailed { reason, .. } => Some(reason),
            _ => None,
        }
    }
}

/// Result type for pipeline operations
pub type CourierResult<T> = Result<T, CourierError>;
