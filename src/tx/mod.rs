//! Transaction submission pipeline: nonce allocation, population and
//! signing, confirmation waiting, and revert diagnosis

pub mod confirm;
pub mod nonce;
pub mod retry;
pub mod revert;
pub mod submitter;

pub use confirm::ConfirmationWaiter;
pub use nonce::{NonceAllocator, NoncePolicy};
pub use retry::{retry, RetryError, RetryPolicy};
pub use submitter::{SubmittedTransaction, TransactionSubmitter};
