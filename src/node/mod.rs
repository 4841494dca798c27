//! Node collaborator - the JSON-RPC surface the pipeline consumes
//!
//! The pipeline treats the chain node as a black box exposing a handful of
//! call/send/query operations. Everything else (transport, endpoint
//! selection, failover) lives behind this trait; [`rpc::RpcNode`] is the
//! ethers-backed implementation.

pub mod rpc;

pub use rpc::RpcNode;

use crate::error::CourierResult;

use async_trait::async_trait;
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{Address, Bytes, Transaction, TransactionReceipt, H256, U256};

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Node: Send + Sync {
    /// Transaction count for the address including pending transactions.
    /// Seeds the in-memory nonce policy and backs the per-call policy.
    async fn pending_transaction_count(&self, address: Address) -> CourierResult<U256>;

    /// Broadcast a signed transaction, returning its hash.
    async fn send_raw_transaction(&self, payload: Bytes) -> CourierResult<H256>;

    /// Receipt for a transaction, or `None` while it is unmined.
    async fn transaction_receipt(&self, hash: H256)
        -> CourierResult<Option<TransactionReceipt>>;

    /// The transaction object as the node knows it.
    async fn transaction_by_hash(&self, hash: H256) -> CourierResult<Option<Transaction>>;

    /// Execute a read-only call, optionally pinned to a block. Reverts may
    /// surface either as `Ok` bytes or as an `Rpc` error whose message
    /// embeds the revert payload; the revert decoder handles both shapes.
    async fn call(&self, request: TypedTransaction, block: Option<u64>) -> CourierResult<Bytes>;

    /// Current gas price. Consulted when no fixed default is configured.
    async fn gas_price(&self) -> CourierResult<U256>;

    /// Gas estimate for a transaction. Consulted when no fixed default is
    /// configured.
    async fn estimate_gas(&self, request: TypedTransaction) -> CourierResult<U256>;
}
