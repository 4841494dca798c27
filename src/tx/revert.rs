//! Revert-reason recovery for failed transactions
//!
//! A transaction mined with status 0 carries no reason of its own; the
//! reason is recovered by replaying the same call at the failing block and
//! decoding the standard `Error(string)` return payload:
//!
//! ```text
//! selector(4 bytes) ++ offset(32 bytes) ++ length(32 bytes, BE) ++ UTF-8 bytes
//! ```
//!
//! The selector bytes are skipped without being checked against the
//! `Error(string)` value; a custom error whose payload happens to parse as
//! a string return will be mis-decoded. [`error_string_selector`] exposes
//! the reference value for callers that want to check.
//!
//! Depending on transport, a reverting replay surfaces either as an `Ok`
//! result carrying the raw payload or as an error whose message embeds a
//! JSON object behind a `"Node error: "` prefix; both shapes are
//! normalized here.

use crate::error::{CourierError, CourierResult};
use crate::node::Node;

use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{Transaction, TransactionReceipt, TransactionRequest, H256, U64};
use lazy_static::lazy_static;
use regex::Regex;
use sha3::{Digest, Keccak256};

const SELECTOR_BYTES: usize = 4;
const WORD_BYTES: usize = 32;
/// Start of the big-endian length word.
const LENGTH_OFFSET: usize = SELECTOR_BYTES + WORD_BYTES;
/// Start of the UTF-8 reason bytes.
const REASON_OFFSET: usize = LENGTH_OFFSET + WORD_BYTES;

const NODE_ERROR_PREFIX: &str = "Node error: ";

lazy_static! {
    static ref TRANSACTION_HASH: Regex = Regex::new(r"^0x[0-9A-Fa-f]{64}$").unwrap();
}

/// The 4-byte selector of the solidity `Error(string)` revert shape.
pub fn error_string_selector() -> [u8; 4] {
    let digest = Keccak256::digest(b"Error(string)");
    [digest[0], digest[1], digest[2], digest[3]]
}

/// Best-effort reason for a failed receipt.
///
/// Decode failures fold into a descriptive `Ok` string so diagnosis never
/// masks the status-0 signal itself. Precondition violations (successful
/// receipt, missing status or hash) are caller bugs and still fail.
pub async fn reason(node: &dyn Node, receipt: &TransactionReceipt) -> CourierResult<String> {
    match reason_from_receipt(node, receipt).await {
        Ok(reason) => Ok(reason),
        Err(err @ CourierError::Precondition(_)) => Err(err),
        Err(err) => Ok(format!("Failed to get reason code. {}", err)),
    }
}

/// Reason for a failed transaction identified by its hash string.
pub async fn reason_from_tx_hash(node: &dyn Node, tx_hash: &str) -> CourierResult<String> {
    if !TRANSACTION_HASH.is_match(tx_hash) {
        return Err(CourierError::Precondition(format!(
            "Invalid transaction hash argument \"{}\". Must be a 32 byte hex string with a 0x prefix which is 66 characters in total.",
            tx_hash
        )));
    }
    let hash: H256 = tx_hash
        .parse()
        .map_err(|e| CourierError::Precondition(format!("Invalid transaction hash: {}", e)))?;

    let receipt = node
        .transaction_receipt(hash)
        .await?
        .ok_or(CourierError::TransactionNotFound { hash })?;

    reason_from_receipt(node, &receipt).await
}

/// Reason for a failed receipt; every failure propagates.
pub async fn reason_from_receipt(
    node: &dyn Node,
    receipt: &TransactionReceipt,
) -> CourierResult<String> {
    match receipt.status {
        Some(status) if status == U64::one() => {
            return Err(CourierError::Precondition(
                "Transaction did not fail. Can only read the revert reason from failed transactions"
                    .to_string(),
            ))
        }
        Some(_) => {}
        None => {
            return Err(CourierError::Precondition(
                "Receipt carries no status field".to_string(),
            ))
        }
    }
    if receipt.transaction_hash.is_zero() {
        return Err(CourierError::Precondition(
            "There is no transaction hash on the receipt object".to_string(),
        ));
    }

    let transaction = node
        .transaction_by_hash(receipt.transaction_hash)
        .await?
        .ok_or(CourierError::TransactionNotFound {
            hash: receipt.transaction_hash,
        })?;

    // An out-of-gas failure carries no revert payload; replaying would
    // decode garbage.
    if receipt.gas_used == Some(transaction.gas) {
        return Err(CourierError::GasExhausted);
    }

    let payload = replay_payload(node, &transaction, receipt).await?;
    parse_reason_payload(&payload)
}

/// Re-execute the failed call read-only at its block and capture the raw
/// revert payload, whichever of the two transport shapes it arrives in.
async fn replay_payload(
    node: &dyn Node,
    transaction: &Transaction,
    receipt: &TransactionReceipt,
) -> CourierResult<Vec<u8>> {
    let request = replay_request(transaction);
    let block = receipt.block_number.map(|number| number.as_u64());

    match node.call(request, block).await {
        Ok(bytes) => Ok(bytes.to_vec()),
        Err(CourierError::Rpc(message)) => payload_from_rpc_error(&message),
        Err(other) => Err(other),
    }
}

fn replay_request(transaction: &Transaction) -> TypedTransaction {
    let mut request = TransactionRequest::new()
        .from(transaction.from)
        .gas(transaction.gas)
        .value(transaction.value)
        .data(transaction.input.clone());
    if let Some(to) = transaction.to {
        request = request.to(to);
    }
    if let Some(gas_price) = transaction.gas_price {
        request = request.gas_price(gas_price);
    }
    TypedTransaction::Legacy(request)
}

/// Extract the revert payload from a transport error message of the form
/// `Node error: {"...", "data": "Reverted 0x…"}` (or a bare `0x…` data
/// field).
fn payload_from_rpc_error(message: &str) -> CourierResult<Vec<u8>> {
    let body = message.strip_prefix(NODE_ERROR_PREFIX).ok_or_else(|| {
        CourierError::RevertDecode(format!(
            "Failed to parse error message from Ethereum call: {}",
            message
        ))
    })?;

    let object: serde_json::Value = serde_json::from_str(body).map_err(|_| {
        CourierError::RevertDecode(format!("Failed to parse data field error object:{}", body))
    })?;

    let data = object
        .get("data")
        .and_then(serde_json::Value::as_str)
        .ok_or_else(|| {
            CourierError::RevertDecode(format!(
                "Failed to parse data field error object:{}",
                body
            ))
        })?;

    let hex_payload = if let Some(rest) = data.strip_prefix("Reverted 0x") {
        rest
    } else if let Some(rest) = data.strip_prefix("0x") {
        rest
    } else {
        return Err(CourierError::RevertDecode(format!(
            "Failed to parse data field of error object:{}",
            body
        )));
    };

    hex::decode(hex_payload).map_err(|e| {
        CourierError::RevertDecode(format!("Revert data is not valid hex: {}", e))
    })
}

/// Decode a raw `Error(string)` payload into the reason string.
///
/// Bounds are checked explicitly so a malformed payload is reported rather
/// than read out of range.
pub fn parse_reason_payload(data: &[u8]) -> CourierResult<String> {
    if data.len() < REASON_OFFSET {
        return Err(CourierError::RevertDecode(format!(
            "Revert payload of {} bytes is shorter than the {} byte header",
            data.len(),
            REASON_OFFSET
        )));
    }

    let length_word = &data[LENGTH_OFFSET..REASON_OFFSET];
    // A reason string longer than u64::MAX is nonsense; reject rather
    // than truncate.
    if length_word[..WORD_BYTES - 8].iter().any(|byte| *byte != 0) {
        return Err(CourierError::RevertDecode(
            "Reason length word out of range".to_string(),
        ));
    }
    let mut raw = [0u8; 8];
    raw.copy_from_slice(&length_word[WORD_BYTES - 8..]);
    let length = u64::from_be_bytes(raw) as usize;

    let end = REASON_OFFSET
        .checked_add(length)
        .filter(|end| *end <= data.len())
        .ok_or_else(|| {
            CourierError::RevertDecode(format!(
                "Reason length {} exceeds the {} byte payload",
                length,
                data.len()
            ))
        })?;

    let reason = std::str::from_utf8(&data[REASON_OFFSET..end]).map_err(|e| {
        CourierError::RevertDecode(format!("Reason bytes are not valid UTF-8: {}", e))
    })?;

    Ok(reason.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::MockNode;
    use ethers::types::{Bytes, U256};
    use std::sync::Arc;

    /// ABI-encode a reason string the way `Error(string)` returns arrive on
    /// the wire, including trailing padding to the 32-byte boundary.
    fn encode_reason(reason: &str) -> Vec<u8> {
        let mut payload = error_string_selector().to_vec();

        let mut offset = [0u8; 32];
        offset[31] = 0x20;
        payload.extend_from_slice(&offset);

        let mut length = [0u8; 32];
        length[24..].copy_from_slice(&(reason.len() as u64).to_be_bytes());
        payload.extend_from_slice(&length);

        payload.extend_from_slice(reason.as_bytes());
        let pad = (WORD_BYTES - reason.len() % WORD_BYTES) % WORD_BYTES;
        payload.extend(std::iter::repeat(0u8).take(pad));
        payload
    }

    fn failed_receipt() -> TransactionReceipt {
        let mut receipt = TransactionReceipt::default();
        receipt.status = Some(0.into());
        receipt.transaction_hash = H256::from_low_u64_be(0xabcd);
        receipt.block_number = Some(7.into());
        receipt.gas_used = Some(U256::from(40_000));
        receipt
    }

    fn mined_transaction() -> Transaction {
        let mut transaction = Transaction::default();
        transaction.hash = H256::from_low_u64_be(0xabcd);
        transaction.gas = U256::from(100_000);
        transaction
    }

    #[test]
    fn test_error_string_selector_reference_value() {
        assert_eq!(error_string_selector(), [0x08, 0xc3, 0x79, 0xa0]);
    }

    #[test]
    fn test_parse_known_reason_payload() {
        // selector 0x08c379a0, offset 0x20, length 0x17, then the ASCII
        // bytes of the reason.
        let mut hex_payload = String::new();
        hex_payload.push_str("08c379a0");
        hex_payload.push_str(&"0".repeat(62));
        hex_payload.push_str("20");
        hex_payload.push_str(&"0".repeat(62));
        hex_payload.push_str("17");
        hex_payload.push_str(&hex::encode("caller is not the owner"));
        hex_payload.push_str(&"0".repeat(18)); // pad to the word boundary

        let data = hex::decode(&hex_payload).unwrap();
        assert_eq!(
            parse_reason_payload(&data).unwrap(),
            "caller is not the owner"
        );
    }

    #[test]
    fn test_reason_round_trip() {
        for reason in [
            "",
            "a",
            "caller is not the owner",
            "exactly thirty-two bytes long!!!",
            "a string that is longer than one abi word and so spills into the next",
            "นี่คือเหตุผล utf-8",
        ] {
            let payload = encode_reason(reason);
            assert_eq!(parse_reason_payload(&payload).unwrap(), reason);
        }
    }

    #[test]
    fn test_truncated_header_rejected() {
        let payload = encode_reason("some reason");
        assert!(matches!(
            parse_reason_payload(&payload[..40]),
            Err(CourierError::RevertDecode(_))
        ));
    }

    #[test]
    fn test_length_beyond_payload_rejected() {
        let mut payload = encode_reason("short");
        // Claim far more bytes than the payload holds.
        payload[REASON_OFFSET - 1] = 0xff;
        assert!(matches!(
            parse_reason_payload(&payload),
            Err(CourierError::RevertDecode(_))
        ));
    }

    #[test]
    fn test_oversized_length_word_rejected() {
        let mut payload = encode_reason("short");
        payload[LENGTH_OFFSET] = 0x01; // set a high-order byte of the length
        assert!(matches!(
            parse_reason_payload(&payload),
            Err(CourierError::RevertDecode(_))
        ));
    }

    #[test]
    fn test_non_utf8_reason_rejected() {
        let mut payload = encode_reason("abcd");
        payload[REASON_OFFSET] = 0xff;
        assert!(matches!(
            parse_reason_payload(&payload),
            Err(CourierError::RevertDecode(_))
        ));
    }

    #[test]
    fn test_error_payload_with_reverted_prefix() {
        let message = format!(
            "Node error: {{\"code\":3,\"data\":\"Reverted 0x{}\"}}",
            hex::encode(encode_reason("nope"))
        );
        let payload = payload_from_rpc_error(&message).unwrap();
        assert_eq!(parse_reason_payload(&payload).unwrap(), "nope");
    }

    #[test]
    fn test_error_payload_with_bare_hex_prefix() {
        let message = format!(
            "Node error: {{\"data\":\"0x{}\"}}",
            hex::encode(encode_reason("denied"))
        );
        let payload = payload_from_rpc_error(&message).unwrap();
        assert_eq!(parse_reason_payload(&payload).unwrap(), "denied");
    }

    #[test]
    fn test_error_payload_without_node_prefix_rejected() {
        let err = payload_from_rpc_error("execution reverted").unwrap_err();
        assert!(err
            .to_string()
            .starts_with("Failed to parse error message from Ethereum call"));
    }

    #[test]
    fn test_error_payload_with_missing_data_field_rejected() {
        let err = payload_from_rpc_error("Node error: {\"code\":3}").unwrap_err();
        assert!(matches!(err, CourierError::RevertDecode(_)));
    }

    #[tokio::test]
    async fn test_gas_exhaustion_short_circuits_replay() {
        let mut node = MockNode::new();
        let mut transaction = mined_transaction();
        transaction.gas = U256::from(40_000);
        node.expect_transaction_by_hash()
            .returning(move |_| Ok(Some(transaction.clone())));
        // gas_used == gas_limit: the replay call must never be issued.
        node.expect_call().times(0);

        let node: Arc<dyn Node> = Arc::new(node);
        let receipt = failed_receipt();

        let err = reason_from_receipt(node.as_ref(), &receipt).await.unwrap_err();
        assert!(matches!(err, CourierError::GasExhausted));

        let text = reason(node.as_ref(), &receipt).await.unwrap();
        assert!(text.contains("ran out of gas"));
    }

    #[tokio::test]
    async fn test_replay_resolving_with_payload() {
        let mut node = MockNode::new();
        let transaction = mined_transaction();
        node.expect_transaction_by_hash()
            .returning(move |_| Ok(Some(transaction.clone())));
        node.expect_call()
            .times(1)
            .returning(|_, block| {
                assert_eq!(block, Some(7));
                Ok(Bytes::from(encode_reason("caller is not the owner")))
            });

        let result = reason_from_receipt(&node, &failed_receipt()).await.unwrap();
        assert_eq!(result, "caller is not the owner");
    }

    #[tokio::test]
    async fn test_replay_throwing_structured_error() {
        let mut node = MockNode::new();
        let transaction = mined_transaction();
        node.expect_transaction_by_hash()
            .returning(move |_| Ok(Some(transaction.clone())));
        node.expect_call().times(1).returning(|_, _| {
            Err(CourierError::Rpc(format!(
                "Node error: {{\"data\":\"Reverted 0x{}\"}}",
                hex::encode(encode_reason("insufficient balance"))
            )))
        });

        let result = reason_from_receipt(&node, &failed_receipt()).await.unwrap();
        assert_eq!(result, "insufficient balance");
    }

    #[tokio::test]
    async fn test_unparseable_transport_error_becomes_fallback_string() {
        let mut node = MockNode::new();
        let transaction = mined_transaction();
        node.expect_transaction_by_hash()
            .returning(move |_| Ok(Some(transaction.clone())));
        node.expect_call()
            .returning(|_, _| Err(CourierError::Rpc("gateway timeout".to_string())));

        let text = reason(&node, &failed_receipt()).await.unwrap();
        assert!(text.starts_with("Failed to get reason code."));
    }

    #[tokio::test]
    async fn test_successful_receipt_is_a_precondition_failure() {
        let node = MockNode::new();
        let mut receipt = failed_receipt();
        receipt.status = Some(1.into());

        // The hard path fails, and the soft wrapper re-raises instead of
        // folding the misuse into a fallback string.
        assert!(matches!(
            reason_from_receipt(&node, &receipt).await,
            Err(CourierError::Precondition(_))
        ));
        assert!(matches!(
            reason(&node, &receipt).await,
            Err(CourierError::Precondition(_))
        ));
    }

    #[tokio::test]
    async fn test_missing_transaction_hash_is_a_precondition_failure() {
        let node = MockNode::new();
        let mut receipt = failed_receipt();
        receipt.transaction_hash = H256::zero();

        assert!(matches!(
            reason_from_receipt(&node, &receipt).await,
            Err(CourierError::Precondition(_))
        ));
    }

    #[tokio::test]
    async fn test_reason_from_tx_hash_validates_format() {
        let node = MockNode::new();
        let err = reason_from_tx_hash(&node, "0x1234").await.unwrap_err();
        assert!(matches!(err, CourierError::Precondition(_)));

        let err = reason_from_tx_hash(&node, "not-a-hash").await.unwrap_err();
        assert!(matches!(err, CourierError::Precondition(_)));
    }

    #[tokio::test]
    async fn test_reason_from_tx_hash_fetches_receipt() {
        let mut node = MockNode::new();
        let receipt = failed_receipt();
        node.expect_transaction_receipt()
            .times(1)
            .returning(move |_| Ok(Some(receipt.clone())));
        let transaction = mined_transaction();
        node.expect_transaction_by_hash()
            .returning(move |_| Ok(Some(transaction.clone())));
        node.expect_call()
            .returning(|_, _| Ok(Bytes::from(encode_reason("paused"))));

        let hash = format!("0x{}", hex::encode(H256::from_low_u64_be(0xabcd)));
        let result = reason_from_tx_hash(&node, &hash).await.unwrap();
        assert_eq!(result, "paused");
    }
}
