//! HTTP node backend with multi-RPC support and automatic failover

use super::Node;
use crate::config::NodeConfig;
use crate::error::{CourierError, CourierResult};

use async_trait::async_trait;
use ethers::prelude::*;
use ethers::providers::{Http, Provider};
use ethers::types::transaction::eip2718::TypedTransaction;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing::{debug, warn};

/// Multi-provider node backend with automatic failover on read paths.
///
/// `send_raw_transaction` and `call` are single-shot against the active
/// provider: a broadcast must not be repeated on an ambiguous failure, and
/// a replay error carries the revert payload the caller is after.
pub struct RpcNode {
    /// HTTP providers (multiple for failover)
    providers: Vec<Provider<Http>>,
    /// Current active provider index
    current: AtomicUsize,
}

impl RpcNode {
    /// Create a node backend from the configured RPC URLs.
    pub fn new(config: &NodeConfig) -> CourierResult<Self> {
        let mut providers = Vec::new();

        for url in &config.rpc_urls {
            match Provider::<Http>::try_from(url.as_str()) {
                Ok(provider) => {
                    let provider = provider.interval(Duration::from_millis(100));
                    providers.push(provider);
                    debug!("Added HTTP provider: {}", url);
                }
                Err(e) => {
                    warn!("Failed to create provider for {}: {}", url, e);
                }
            }
        }

        if providers.is_empty() {
            return Err(CourierError::Config(
                "No valid RPC providers".to_string(),
            ));
        }

        Ok(Self {
            providers,
            current: AtomicUsize::new(0),
        })
    }

    /// Get the active HTTP provider
    fn provider(&self) -> &Provider<Http> {
        let idx = self.current.load(Ordering::Relaxed);
        &self.providers[idx % self.providers.len()]
    }

    /// Switch to next available provider
    fn failover(&self) {
        let current = self.current.load(Ordering::Relaxed);
        let next = (current + 1) % self.providers.len();
        self.current.store(next, Ordering::Relaxed);
        warn!("Node failover to provider {}", next);
    }
}

#[async_trait]
impl Node for RpcNode {
    async fn pending_transaction_count(&self, address: Address) -> CourierResult<U256> {
        for _ in 0..self.providers.len() {
            match self
                .provider()
                .get_transaction_count(address, Some(BlockNumber::Pending.into()))
                .await
            {
                Ok(count) => return Ok(count),
                Err(e) => {
                    warn!("Failed to get transaction count: {}", e);
                    self.failover();
                }
            }
        }

        Err(CourierError::Rpc("All providers failed".to_string()))
    }

    async fn send_raw_transaction(&self, payload: Bytes) -> CourierResult<H256> {
        let pending = self
            .provider()
            .send_raw_transaction(payload)
            .await
            .map_err(|e| CourierError::Rpc(e.to_string()))?;
        Ok(pending.tx_hash())
    }

    async fn transaction_receipt(
        &self,
        hash: H256,
    ) -> CourierResult<Option<TransactionReceipt>> {
        self.provider()
            .get_transaction_receipt(hash)
            .await
            .map_err(|e| CourierError::Rpc(e.to_string()))
    }

    async fn transaction_by_hash(&self, hash: H256) -> CourierResult<Option<Transaction>> {
        self.provider()
            .get_transaction(hash)
            .await
            .map_err(|e| CourierError::Rpc(e.to_string()))
    }

    async fn call(&self, request: TypedTransaction, block: Option<u64>) -> CourierResult<Bytes> {
        self.provider()
            .call(&request, block.map(BlockId::from))
            .await
            .map_err(|e| CourierError::Rpc(e.to_string()))
    }

    async fn gas_price(&self) -> CourierResult<U256> {
        for _ in 0..self.providers.len() {
            match self.provider().get_gas_price().await {
                Ok(price) => return Ok(price),
                Err(e) => {
                    warn!("Failed to get gas price: {}", e);
                    self.failover();
                }
            }
        }

        Err(CourierError::Rpc("All providers failed".to_string()))
    }

    async fn estimate_gas(&self, request: TypedTransaction) -> CourierResult<U256> {
        self.provider()
            .estimate_gas(&request, None)
            .await
            .map_err(|e| CourierError::Rpc(e.to_string()))
    }
}
