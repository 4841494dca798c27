//! Contract handle construction and caching
//!
//! Binding a target address to an ABI and a signer is cheap but not free,
//! and call sites tend to ask for the same (target, signer) pair over and
//! over. The cache hands back the existing binding when it can, derives a
//! signer-bound handle from a cached signer-less one when only the signer
//! is new, and constructs fresh otherwise. Entries are never evicted;
//! capacity grows with the distinct pairs observed.

use crate::error::{CourierError, CourierResult};
use crate::metrics;
use crate::node::Node;

use dashmap::DashMap;
use ethers::abi::{Abi, Token};
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{Address, Bytes, TransactionRequest};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::info;

/// A target contract bound to an ABI and optionally a signer identity.
#[derive(Clone)]
pub struct ContractHandle {
    address: Address,
    abi: Arc<Abi>,
    signer: Option<Address>,
    node: Arc<dyn Node>,
}

impl ContractHandle {
    pub fn address(&self) -> Address {
        self.address
    }

    pub fn signer(&self) -> Option<Address> {
        self.signer
    }

    pub fn abi(&self) -> &Abi {
        &self.abi
    }

    /// Derive a signer-bound handle sharing this handle's binding.
    pub fn connect(&self, signer: Address) -> Self {
        Self {
            address: self.address,
            abi: self.abi.clone(),
            signer: Some(signer),
            node: self.node.clone(),
        }
    }

    /// ABI-encode a call to `function` with `args`.
    pub fn function_data(&self, function: &str, args: &[Token]) -> CourierResult<Bytes> {
        let function = self
            .abi
            .function(function)
            .map_err(|e| CourierError::Contract(e.to_string()))?;
        let data = function
            .encode_input(args)
            .map_err(|e| CourierError::Contract(e.to_string()))?;
        Ok(Bytes::from(data))
    }

    /// A transaction request invoking `function`, ready for the submitter.
    pub fn transaction_request(
        &self,
        function: &str,
        args: &[Token],
    ) -> CourierResult<TransactionRequest> {
        let mut request = TransactionRequest::new()
            .to(self.address)
            .data(self.function_data(function, args)?);
        if let Some(signer) = self.signer {
            request = request.from(signer);
        }
        Ok(request)
    }

    /// Execute `function` as a read-only call and decode its outputs.
    pub async fn read(&self, function: &str, args: &[Token]) -> CourierResult<Vec<Token>> {
        let data = self.function_data(function, args)?;
        let request = TransactionRequest::new().to(self.address).data(data);

        let raw = self
            .node
            .call(TypedTransaction::Legacy(request), None)
            .await?;

        let function = self
            .abi
            .function(function)
            .map_err(|e| CourierError::Contract(e.to_string()))?;
        function
            .decode_output(raw.as_ref())
            .map_err(|e| CourierError::Contract(e.to_string()))
    }
}

#[derive(Clone, PartialEq, Eq, Hash)]
enum SignerKey {
    Default,
    Bound(Address),
}

impl From<Option<Address>> for SignerKey {
    fn from(signer: Option<Address>) -> Self {
        match signer {
            Some(address) => SignerKey::Bound(address),
            None => SignerKey::Default,
        }
    }
}

/// Memoizes (target, signer) bindings for the life of the process.
pub struct ContractCache {
    node: Arc<dyn Node>,
    entries: DashMap<(Address, SignerKey), ContractHandle>,
    created: AtomicU64,
}

impl ContractCache {
    pub fn new(node: Arc<dyn Node>) -> Self {
        Self {
            node,
            entries: DashMap::new(),
            created: AtomicU64::new(0),
        }
    }

    /// Return the cached handle for (target, signer), deriving from the
    /// cached signer-less handle or constructing fresh as needed.
    pub fn get_or_create(
        &self,
        target: Address,
        abi: &Abi,
        signer: Option<Address>,
    ) -> ContractHandle {
        let key = (target, SignerKey::from(signer));

        if let Some(handle) = self.entries.get(&key) {
            return handle.clone();
        }

        // A cached signer-less handle can be bound to the requested signer
        // without re-resolving the target.
        if let Some(signer_address) = signer {
            let derived = self
                .entries
                .get(&(target, SignerKey::Default))
                .map(|default| default.connect(signer_address));
            if let Some(handle) = derived {
                self.entries.insert(key, handle.clone());
                return handle;
            }
        }

        self.created.fetch_add(1, Ordering::Relaxed);
        metrics::record_contract_cache_miss();
        info!(
            "Cached contract {:?} for signer {:?}",
            target,
            signer
        );

        let handle = ContractHandle {
            address: target,
            abi: Arc::new(abi.clone()),
            signer,
            node: self.node.clone(),
        };
        self.entries.insert(key, handle.clone());
        handle
    }

    /// How many handles were constructed fresh (cache misses).
    pub fn created(&self) -> u64 {
        self.created.load(Ordering::Relaxed)
    }
}
