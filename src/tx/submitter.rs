//! Transaction population, signing and submission

use super::confirm::ConfirmationWaiter;
use super::nonce::{NonceAllocator, NoncePolicy};
use crate::config::{Settings, WalletConfig};
use crate::error::{CourierError, CourierResult};
use crate::metrics;
use crate::node::Node;

use ethers::signers::{LocalWallet, Signer};
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{Address, Transaction, TransactionReceipt, TransactionRequest, H256, U256};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info};

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Fixed per-sender defaults applied to any field the caller leaves unset.
struct SenderDefaults {
    chain_id: Option<u64>,
    gas_price: Option<U256>,
    gas_limit: Option<U256>,
}

/// Populates, signs and broadcasts transactions for one sender.
pub struct TransactionSubmitter {
    node: Arc<dyn Node>,
    wallet: LocalWallet,
    defaults: SenderDefaults,
    nonces: NonceAllocator,
    poll_interval: Duration,
}

impl TransactionSubmitter {
    /// Build a submitter from the per-sender configuration surface.
    pub fn new(node: Arc<dyn Node>, config: &WalletConfig) -> CourierResult<Self> {
        let wallet: LocalWallet = config
            .private_key
            .parse()
            .map_err(|e| CourierError::Wallet(format!("Invalid private key: {}", e)))?;
        let wallet = match config.chain_id {
            Some(chain_id) => wallet.with_chain_id(chain_id),
            None => wallet,
        };

        let gas_price = parse_quantity(config.gas_price.as_deref(), "gas_price")?;
        let gas_limit = parse_quantity(config.gas_limit.as_deref(), "gas_limit")?;

        let policy = if config.nonce_in_memory {
            NoncePolicy::InMemory
        } else {
            NoncePolicy::PerCall
        };

        info!("Transaction submitter initialized for {:?}", wallet.address());

        Ok(Self {
            nonces: NonceAllocator::new(node.clone(), policy),
            node,
            wallet,
            defaults: SenderDefaults {
                chain_id: config.chain_id,
                gas_price,
                gas_limit,
            },
            poll_interval: DEFAULT_POLL_INTERVAL,
        })
    }

    /// Build a submitter from loaded settings, taking the wallet surface
    /// and the receipt polling interval from them.
    pub fn from_settings(node: Arc<dyn Node>, settings: &Settings) -> CourierResult<Self> {
        Ok(Self::new(node, &settings.wallet)?.with_poll_interval(settings.node.poll_interval()))
    }

    /// Override the receipt polling interval used by returned handles.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Sender address
    pub fn address(&self) -> Address {
        self.wallet.address()
    }

    /// Fill any field the caller left unset: gas price, nonce, gas limit,
    /// chain id. Fixed defaults bypass the node round trips; absent those,
    /// the node is asked.
    pub async fn populate(
        &self,
        mut request: TransactionRequest,
    ) -> CourierResult<TransactionRequest> {
        let from = match request.from {
            Some(address) => address,
            None => {
                let address = self.wallet.address();
                request.from = Some(address);
                address
            }
        };

        if request.gas_price.is_none() {
            request.gas_price = Some(match self.defaults.gas_price {
                Some(price) => price,
                None => self.node.gas_price().await?,
            });
        }

        if request.nonce.is_none() {
            request.nonce = Some(self.nonces.allocate(from).await?.into());
        }

        if request.gas.is_none() {
            request.gas = Some(match self.defaults.gas_limit {
                Some(limit) => limit,
                None => {
                    self.node
                        .estimate_gas(TypedTransaction::Legacy(request.clone()))
                        .await?
                }
            });
        }

        if request.chain_id.is_none() {
            if let Some(chain_id) = self.defaults.chain_id {
                request.chain_id = Some(chain_id.into());
            }
        }

        Ok(request)
    }

    /// Populate, sign and broadcast, returning a handle whose
    /// [`SubmittedTransaction::wait`] resolves to the confirmed receipt or
    /// the diagnosed failure.
    pub async fn send(&self, request: TransactionRequest) -> CourierResult<SubmittedTransaction> {
        let populated = self.populate(request).await?;
        debug!("Transaction to be sent: {:?}", populated);

        let typed = TypedTransaction::Legacy(populated);
        let signature = self
            .wallet
            .sign_transaction(&typed)
            .await
            .map_err(|e| CourierError::Wallet(e.to_string()))?;
        let payload = typed.rlp_signed(&signature);

        let hash = self.node.send_raw_transaction(payload).await?;
        metrics::record_tx_submitted();
        debug!("Transaction sent: {:?}", hash);

        Ok(SubmittedTransaction {
            hash,
            request: typed,
            waiter: ConfirmationWaiter::new(self.node.clone(), self.poll_interval),
            outcome: Mutex::new(None),
        })
    }
}

fn parse_quantity(raw: Option<&str>, field: &str) -> CourierResult<Option<U256>> {
    raw.map(|value| {
        U256::from_dec_str(value)
            .map_err(|e| CourierError::Config(format!("Invalid {}: {}", field, e)))
    })
    .transpose()
}

/// Terminal outcome of a submitted transaction, cached on the handle.
enum Outcome {
    Confirmed(TransactionReceipt),
    Reverted {
        transaction: Box<Transaction>,
        receipt: Box<TransactionReceipt>,
        reason: String,
    },
}

impl Outcome {
    fn to_result(&self) -> CourierResult<TransactionReceipt> {
        match self {
            Outcome::Confirmed(receipt) => Ok(receipt.clone()),
            Outcome::Reverted {
                transaction,
                receipt,
                reason,
            } => Err(CourierError::TransactionFailed {
                transaction: transaction.clone(),
                receipt: receipt.clone(),
                reason: reason.clone(),
            }),
        }
    }
}

/// Handle to an in-flight transaction.
pub struct SubmittedTransaction {
    hash: H256,
    request: TypedTransaction,
    waiter: ConfirmationWaiter,
    outcome: Mutex<Option<Outcome>>,
}

impl SubmittedTransaction {
    pub fn hash(&self) -> H256 {
        self.hash
    }

    /// The populated transaction as it was signed and broadcast.
    pub fn request(&self) -> &TypedTransaction {
        &self.request
    }

    /// Wait for confirmation and cache the terminal outcome.
    ///
    /// Repeated calls return the cached receipt (or the cached diagnosis)
    /// without polling or re-diagnosing. Transport failures and timeouts
    /// are not terminal and are not cached; a later call polls again.
    pub async fn wait(&self, deadline: Option<Duration>) -> CourierResult<TransactionReceipt> {
        let mut slot = self.outcome.lock().await;

        if let Some(outcome) = slot.as_ref() {
            return outcome.to_result();
        }

        match self.waiter.wait(self.hash, deadline).await {
            Ok(receipt) => {
                metrics::record_tx_confirmed();
                let outcome = Outcome::Confirmed(receipt);
                let result = outcome.to_result();
                *slot = Some(outcome);
                result
            }
            Err(CourierError::TransactionFailed {
                transaction,
                receipt,
                reason,
            }) => {
                metrics::record_tx_reverted();
                let outcome = Outcome::Reverted {
                    transaction,
                    receipt,
                    reason,
                };
                let result = outcome.to_result();
                *slot = Some(outcome);
                result
            }
            Err(other) => Err(other),
        }
    }
}
