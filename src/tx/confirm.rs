//! Confirmation waiting and failure diagnosis

use super::revert;
use crate::error::{CourierError, CourierResult};
use crate::node::Node;

use ethers::types::{TransactionReceipt, H256};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, timeout};
use tracing::{debug, warn};

/// Polls the node until a transaction is mined, then checks its status.
#[derive(Clone)]
pub struct ConfirmationWaiter {
    node: Arc<dyn Node>,
    poll_interval: Duration,
}

impl ConfirmationWaiter {
    pub fn new(node: Arc<dyn Node>, poll_interval: Duration) -> Self {
        Self {
            node,
            poll_interval,
        }
    }

    /// Wait until the transaction is mined and return its receipt.
    ///
    /// A receipt with status 0 is diagnosed and surfaced as
    /// [`CourierError::TransactionFailed`] carrying the transaction, the
    /// receipt and a best-effort reason string.
    ///
    /// `deadline` bounds the whole wait; `None` waits forever, which is
    /// only appropriate when the caller owns cancellation some other way.
    pub async fn wait(
        &self,
        hash: H256,
        deadline: Option<Duration>,
    ) -> CourierResult<TransactionReceipt> {
        match deadline {
            Some(limit) => timeout(limit, self.poll(hash))
                .await
                .map_err(|_| CourierError::Timeout {
                    operation: "transaction confirmation".to_string(),
                })?,
            None => self.poll(hash).await,
        }
    }

    async fn poll(&self, hash: H256) -> CourierResult<TransactionReceipt> {
        loop {
            if let Some(receipt) = self.node.transaction_receipt(hash).await? {
                if receipt.block_number.is_some() {
                    return self.check_status(hash, receipt).await;
                }
            }
            sleep(self.poll_interval).await;
        }
    }

    async fn check_status(
        &self,
        hash: H256,
        receipt: TransactionReceipt,
    ) -> CourierResult<TransactionReceipt> {
        if receipt.status == Some(0.into()) {
            warn!("Transaction {:?} reverted, recovering reason", hash);

            let transaction = self
                .node
                .transaction_by_hash(hash)
                .await?
                .ok_or(CourierError::TransactionNotFound { hash })?;
            let reason = revert::reason(self.node.as_ref(), &receipt).await?;

            return Err(CourierError::TransactionFailed {
                transaction: Box::new(transaction),
                receipt: Box::new(receipt),
                reason,
            });
        }

        debug!(
            "Transaction {:?} confirmed in block {:?}",
            hash, receipt.block_number
        );
        Ok(receipt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::MockNode;
    use ethers::types::{Bytes, Transaction, U256};
    use std::sync::atomic::{AtomicU64, Ordering};

    fn mined_receipt(status: u64) -> TransactionReceipt {
        let mut receipt = TransactionReceipt::default();
        receipt.status = Some(status.into());
        receipt.transaction_hash = H256::from_low_u64_be(0xfeed);
        receipt.block_number = Some(42.into());
        receipt.gas_used = Some(U256::from(30_000));
        receipt
    }

    #[tokio::test]
    async fn test_wait_polls_until_mined() {
        let polls = AtomicU64::new(0);
        let mut node = MockNode::new();
        node.expect_transaction_receipt()
            .times(3)
            .returning(move |_| {
                if polls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Ok(None)
                } else {
                    Ok(Some(mined_receipt(1)))
                }
            });

        let waiter = ConfirmationWaiter::new(Arc::new(node), Duration::from_millis(1));
        let receipt = waiter
            .wait(H256::from_low_u64_be(0xfeed), None)
            .await
            .unwrap();
        assert_eq!(receipt.status, Some(1.into()));
    }

    #[tokio::test]
    async fn test_wait_respects_deadline() {
        let mut node = MockNode::new();
        node.expect_transaction_receipt().returning(|_| Ok(None));

        let waiter = ConfirmationWaiter::new(Arc::new(node), Duration::from_millis(1));
        let err = waiter
            .wait(H256::from_low_u64_be(0xfeed), Some(Duration::from_millis(20)))
            .await
            .unwrap_err();
        assert!(matches!(err, CourierError::Timeout { .. }));
    }

    #[tokio::test]
    async fn test_reverted_transaction_surfaces_diagnosed_failure() {
        let mut node = MockNode::new();
        node.expect_transaction_receipt()
            .returning(|_| Ok(Some(mined_receipt(0))));

        let mut transaction = Transaction::default();
        transaction.hash = H256::from_low_u64_be(0xfeed);
        transaction.gas = U256::from(100_000);
        node.expect_transaction_by_hash()
            .returning(move |_| Ok(Some(transaction.clone())));

        let reason_payload = {
            let mut payload = revert::error_string_selector().to_vec();
            let mut offset = [0u8; 32];
            offset[31] = 0x20;
            payload.extend_from_slice(&offset);
            let mut length = [0u8; 32];
            length[31] = 4;
            payload.extend_from_slice(&length);
            payload.extend_from_slice(b"nope");
            payload.extend_from_slice(&[0u8; 28]);
            payload
        };
        node.expect_call()
            .returning(move |_, _| Ok(Bytes::from(reason_payload.clone())));

        let waiter = ConfirmationWaiter::new(Arc::new(node), Duration::from_millis(1));
        let err = waiter
            .wait(H256::from_low_u64_be(0xfeed), None)
            .await
            .unwrap_err();

        match err {
            CourierError::TransactionFailed {
                receipt, reason, ..
            } => {
                assert_eq!(receipt.status, Some(0.into()));
                assert_eq!(reason, "nope");
            }
            other => panic!("expected TransactionFailed, got {:?}", other),
        }
    }
}
