//! Nonce allocation for reliable transaction submission
//!
//! Handles:
//! - In-memory nonce tracking to avoid conflicts between concurrent senders
//! - Per-call fallback that defers to the node's pending count

use crate::error::{CourierError, CourierResult};
use crate::metrics;
use crate::node::Node;

use dashmap::DashMap;
use ethers::types::Address;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

/// Nonce source for a sender, chosen at configuration time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoncePolicy {
    /// Seed once from the node's pending transaction count, then hand out
    /// strictly increasing values from memory. Only correct while a single
    /// process signs for the address.
    InMemory,
    /// Ask the node for the pending count on every allocation. No local
    /// state, but concurrent submissions from the same address can collide
    /// because the node's pending count lags this process's own sends.
    PerCall,
}

/// Hands out per-address transaction sequence numbers.
///
/// An allocator is an ordinary value owned by whoever constructs it; two
/// allocators share nothing, so tests and embedders can run isolated
/// instances side by side.
pub struct NonceAllocator {
    node: Arc<dyn Node>,
    policy: NoncePolicy,
    /// Next-nonce-to-use per address. Entries are created lazily on first
    /// allocation and never torn down.
    slots: DashMap<Address, Arc<Mutex<Option<u64>>>>,
}

impl NonceAllocator {
    pub fn new(node: Arc<dyn Node>, policy: NoncePolicy) -> Self {
        Self {
            node,
            policy,
            slots: DashMap::new(),
        }
    }

    pub fn policy(&self) -> NoncePolicy {
        self.policy
    }

    /// Allocate the next nonce for an address.
    ///
    /// Under the in-memory policy the read-and-increment happens under the
    /// slot's mutex, so no two callers can observe the same value. If the
    /// node query fails, no nonce is consumed.
    pub async fn allocate(&self, address: Address) -> CourierResult<u64> {
        let nonce = match self.policy {
            NoncePolicy::PerCall => self.fetch_pending_count(address).await?,
            NoncePolicy::InMemory => {
                let slot = self.slots.entry(address).or_default().clone();
                let mut next = slot.lock().await;
                let nonce = match *next {
                    Some(value) => value,
                    None => self.fetch_pending_count(address).await?,
                };
                *next = Some(nonce + 1);
                nonce
            }
        };

        debug!("Allocated nonce {} for {:?}", nonce, address);
        metrics::record_nonce_allocated();
        Ok(nonce)
    }

    async fn fetch_pending_count(&self, address: Address) -> CourierResult<u64> {
        let count = self
            .node
            .pending_transaction_count(address)
            .await
            .map_err(|e| CourierError::NonceAllocation {
                address,
                message: e.to_string(),
            })?;
        Ok(count.as_u64())
    }
}
