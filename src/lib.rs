//! txcourier - transaction submission and revert-diagnosis pipeline
//!
//! Turns a signing request into a confirmed (or diagnosed-as-failed)
//! transaction against an EVM-style chain:
//!
//! - [`TransactionSubmitter`] populates missing fields (nonce, gas price,
//!   gas limit, chain id), signs and broadcasts, and hands back a
//!   [`SubmittedTransaction`] whose `wait` resolves to a receipt or a
//!   diagnosed failure.
//! - [`NonceAllocator`] assigns strictly increasing per-sender sequence
//!   numbers under concurrent callers.
//! - [`ConfirmationWaiter`] polls for inclusion and triggers diagnosis on
//!   status 0.
//! - [`tx::revert`] replays a failed call and decodes the standard
//!   `Error(string)` payload into a human-readable reason.
//! - [`ContractCache`] memoizes (target, signer) contract bindings, and
//!   [`tx::retry`] wraps arbitrary fallible operations with a bounded,
//!   abortable retry loop; both are used by call sites well beyond this
//!   pipeline.
//!
//! The chain node is a black box behind the [`Node`] trait; [`RpcNode`] is
//! the ethers HTTP implementation with endpoint failover.

pub mod config;
pub mod contract;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod node;
pub mod tx;

pub use config::{NodeConfig, RetryConfig, Settings, WalletConfig};
pub use contract::{ContractCache, ContractHandle};
pub use error::{CourierError, CourierResult};
pub use node::{Node, RpcNode};
pub use tx::{
    retry, ConfirmationWaiter, NonceAllocator, NoncePolicy, RetryError, RetryPolicy,
    SubmittedTransaction, TransactionSubmitter,
};
