//! # JSON-RPC Collaborators
//!
//! EVM implementations of the wallet and contract traits over plain
//! JSON-RPC, for driving a real node from the operator CLI.
//!
//! | Type | Implements | RPC methods |
//! |------|------------|-------------|
//! | [`RpcPresaleReader`] | `PresaleReader` | `eth_call` |
//! | [`RpcPresaleWriter`] | `PresaleWriter` | `eth_sendTransaction` |
//! | `RpcPendingTransaction` | `PendingTransaction` | `eth_getTransactionReceipt` |
//! | [`RpcWallet`] | `WalletProvider` | `eth_chainId`, `eth_accounts` |
//! | [`RpcWriterFactory`] | `WriterFactory` | none |
//!
//! ## Signing
//!
//! Transactions are signed by the node (`eth_sendTransaction`), so the
//! operator account must be one the node manages (a dev node, or a
//! signer proxy such as Clef). The wallet only hands out a signer when
//! the account shows up in `eth_accounts`.
//!
//! ## Session Snapshot
//!
//! [`RpcWallet::connect`] probes chain id and accounts once. The
//! resulting session does not change; reconnecting builds a new wallet
//! and therefore a new read handle.
//!
//! ## No Implicit Retry
//!
//! Every call is a single request. Receipt polling repeats only while
//! the node reports the transaction as unknown; the overall deadline is
//! the controller's.

use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use alloy_primitives::{Address, B256};
use alloy_sol_types::{sol, SolCall};
use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use crate::authorization::CallerIdentity;
use crate::contract::{PendingTransaction, PresaleReader, PresaleWriter, TxReceipt, WriterFactory};
use crate::error::ChainError;
use crate::wallet::{Signer, WalletProvider};

sol! {
    interface IPresale {
        function isLive() external view returns (bool);
        function isFinalized() external view returns (bool);
        function setLive(bool live) external;
        function finalize() external;
    }
}

/// EIP-1193 "user rejected request".
const USER_REJECTED_CODE: i64 = 4001;

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

// ════════════════════════════════════════════════════════════════════════════════
// CLIENT
// ════════════════════════════════════════════════════════════════════════════════

#[derive(Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcErrorObject>,
}

#[derive(Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
}

/// Minimal JSON-RPC 2.0 client.
#[derive(Clone)]
pub struct JsonRpcClient {
    url: String,
    client: Client,
    next_id: Arc<AtomicU64>,
}

impl JsonRpcClient {
    pub fn new(url: impl Into<String>) -> Result<Self, ChainError> {
        let client = Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|e| ChainError::Network(e.to_string()))?;
        Ok(Self {
            url: url.into(),
            client,
            next_id: Arc::new(AtomicU64::new(1)),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Issues one request and decodes `result` into `T`.
    ///
    /// A missing or `null` result decodes as JSON `null`, so `T` should
    /// be an `Option` for methods that may return nothing.
    pub async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T, ChainError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });

        debug!(method, id, "rpc request");
        let resp = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| ChainError::Network(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let t = resp.text().await.unwrap_or_default();
            return Err(ChainError::Network(format!("{} failed {} {}", method, status, t)));
        }

        let decoded = resp
            .json::<RpcResponse>()
            .await
            .map_err(|e| ChainError::MalformedResponse(e.to_string()))?;

        if let Some(err) = decoded.error {
            return Err(map_rpc_error(err.code, err.message));
        }

        serde_json::from_value(decoded.result.unwrap_or(Value::Null))
            .map_err(|e| ChainError::MalformedResponse(format!("{}: {}", method, e)))
    }

    pub async fn chain_id(&self) -> Result<u64, ChainError> {
        let raw: String = self.call("eth_chainId", json!([])).await?;
        parse_quantity(&raw)
    }

    pub async fn accounts(&self) -> Result<Vec<CallerIdentity>, ChainError> {
        let raw: Vec<String> = self.call("eth_accounts", json!([])).await?;
        raw.iter()
            .map(|s| {
                CallerIdentity::parse(s).map_err(|e| ChainError::MalformedResponse(e.to_string()))
            })
            .collect()
    }
}

/// Classifies a JSON-RPC error object.
pub fn map_rpc_error(code: i64, message: String) -> ChainError {
    if code == USER_REJECTED_CODE {
        return ChainError::UserDeclined;
    }
    if message.to_ascii_lowercase().contains("revert") {
        return ChainError::Reverted(message);
    }
    ChainError::Rpc { code, message }
}

/// Parses a hex `QUANTITY` such as `0x1a`.
pub fn parse_quantity(raw: &str) -> Result<u64, ChainError> {
    let body = raw.strip_prefix("0x").unwrap_or(raw);
    if body.is_empty() {
        return Err(ChainError::MalformedResponse(format!("empty quantity {:?}", raw)));
    }
    u64::from_str_radix(body, 16)
        .map_err(|_| ChainError::MalformedResponse(format!("bad quantity {:?}", raw)))
}

/// Decodes `0x`-prefixed `DATA`.
pub fn decode_data(raw: &str) -> Result<Vec<u8>, ChainError> {
    let body = raw.strip_prefix("0x").unwrap_or(raw);
    hex::decode(body).map_err(|e| ChainError::MalformedResponse(format!("bad data: {}", e)))
}

fn encode_data(bytes: &[u8]) -> String {
    format!("0x{}", hex::encode(bytes))
}

fn encode_address(address: Address) -> String {
    encode_data(address.as_slice())
}

// ════════════════════════════════════════════════════════════════════════════════
// READER
// ════════════════════════════════════════════════════════════════════════════════

/// `eth_call` reads against the presale contract at `latest`.
pub struct RpcPresaleReader {
    rpc: JsonRpcClient,
    contract: Address,
}

impl RpcPresaleReader {
    pub fn new(rpc: JsonRpcClient, contract: Address) -> Self {
        Self { rpc, contract }
    }

    async fn call_view<C>(&self, call: C) -> Result<C::Return, ChainError>
    where
        C: SolCall + Send,
    {
        let params = json!([
            { "to": encode_address(self.contract), "data": encode_data(&call.abi_encode()) },
            "latest"
        ]);
        let raw: String = self.rpc.call("eth_call", params).await?;
        let bytes = decode_data(&raw)?;
        C::abi_decode_returns(&bytes, true).map_err(|e| ChainError::MalformedResponse(e.to_string()))
    }
}

#[async_trait]
impl PresaleReader for RpcPresaleReader {
    async fn is_live(&self) -> Result<bool, ChainError> {
        Ok(self.call_view(IPresale::isLiveCall {}).await?._0)
    }

    async fn is_finalized(&self) -> Result<bool, ChainError> {
        Ok(self.call_view(IPresale::isFinalizedCall {}).await?._0)
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// WRITER
// ════════════════════════════════════════════════════════════════════════════════

/// Sends node-signed transactions from one operator account.
pub struct RpcPresaleWriter {
    rpc: JsonRpcClient,
    contract: Address,
    from: Address,
    poll_interval: Duration,
}

impl RpcPresaleWriter {
    async fn send(&self, data: Vec<u8>) -> Result<Box<dyn PendingTransaction>, ChainError> {
        let params = json!([{
            "from": encode_address(self.from),
            "to": encode_address(self.contract),
            "data": encode_data(&data),
        }]);
        let raw: String = self.rpc.call("eth_sendTransaction", params).await?;
        let tx_hash = B256::from_str(&raw)
            .map_err(|e| ChainError::MalformedResponse(format!("bad tx hash {:?}: {}", raw, e)))?;

        Ok(Box::new(RpcPendingTransaction {
            rpc: self.rpc.clone(),
            tx_hash,
            poll_interval: self.poll_interval,
        }))
    }
}

#[async_trait]
impl PresaleWriter for RpcPresaleWriter {
    async fn set_live(&self, live: bool) -> Result<Box<dyn PendingTransaction>, ChainError> {
        self.send(IPresale::setLiveCall { live }.abi_encode()).await
    }

    async fn finalize(&self) -> Result<Box<dyn PendingTransaction>, ChainError> {
        self.send(IPresale::finalizeCall {}.abi_encode()).await
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcReceipt {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    block_number: Option<String>,
}

/// Interprets a mined receipt.
fn receipt_outcome(tx_hash: B256, receipt: &RpcReceipt) -> Result<TxReceipt, ChainError> {
    let block_number = match receipt.block_number.as_deref() {
        Some(raw) => parse_quantity(raw)?,
        None => 0,
    };
    match receipt.status.as_deref().map(parse_quantity).transpose()? {
        Some(0) => Err(ChainError::Reverted(format!("transaction {} reverted", tx_hash))),
        _ => Ok(TxReceipt {
            tx_hash,
            block_number,
        }),
    }
}

struct RpcPendingTransaction {
    rpc: JsonRpcClient,
    tx_hash: B256,
    poll_interval: Duration,
}

#[async_trait]
impl PendingTransaction for RpcPendingTransaction {
    fn tx_hash(&self) -> B256 {
        self.tx_hash
    }

    async fn wait_for_confirmation(&self) -> Result<TxReceipt, ChainError> {
        let hash = encode_data(self.tx_hash.as_slice());
        loop {
            let receipt: Option<RpcReceipt> = self
                .rpc
                .call("eth_getTransactionReceipt", json!([hash]))
                .await?;
            match receipt {
                Some(r) if r.block_number.is_some() => return receipt_outcome(self.tx_hash, &r),
                _ => tokio::time::sleep(self.poll_interval).await,
            }
        }
    }
}

/// Builds [`RpcPresaleWriter`]s for a signer's account.
pub struct RpcWriterFactory {
    rpc: JsonRpcClient,
    contract: Address,
    poll_interval: Duration,
}

impl RpcWriterFactory {
    pub fn new(rpc: JsonRpcClient, contract: Address, poll_interval: Duration) -> Self {
        Self {
            rpc,
            contract,
            poll_interval,
        }
    }
}

impl WriterFactory for RpcWriterFactory {
    fn connect(&self, signer: Signer) -> Arc<dyn PresaleWriter> {
        Arc::new(RpcPresaleWriter {
            rpc: self.rpc.clone(),
            contract: self.contract,
            from: signer.account().address(),
            poll_interval: self.poll_interval,
        })
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// WALLET
// ════════════════════════════════════════════════════════════════════════════════

/// Wallet session backed by a JSON-RPC node.
pub struct RpcWallet {
    caller: Option<CallerIdentity>,
    correct_network: bool,
    managed: bool,
    reader: Arc<dyn PresaleReader>,
}

impl RpcWallet {
    /// Probes the node and snapshots the session.
    ///
    /// The caller is `operator` if given, else the node's first managed
    /// account.
    pub async fn connect(
        rpc: JsonRpcClient,
        contract: Address,
        expected_chain_id: u64,
        operator: Option<CallerIdentity>,
    ) -> Result<Self, ChainError> {
        let chain_id = rpc.chain_id().await?;
        let accounts = rpc.accounts().await?;

        let caller = operator.or_else(|| accounts.first().copied());
        let managed = caller.map(|c| accounts.contains(&c)).unwrap_or(false);

        debug!(
            url = rpc.url(),
            chain_id,
            expected_chain_id,
            caller = ?caller.map(|c| c.canonical()),
            managed,
            "rpc wallet connected"
        );

        Ok(Self {
            caller,
            correct_network: chain_id == expected_chain_id,
            managed,
            reader: Arc::new(RpcPresaleReader::new(rpc, contract)),
        })
    }
}

#[async_trait]
impl WalletProvider for RpcWallet {
    fn caller(&self) -> Option<CallerIdentity> {
        self.caller
    }

    fn is_correct_network(&self) -> bool {
        self.correct_network
    }

    fn reader(&self) -> Option<Arc<dyn PresaleReader>> {
        Some(Arc::clone(&self.reader))
    }

    async fn signer(&self) -> Result<Signer, ChainError> {
        match self.caller {
            None => Err(ChainError::NoSigner("no account connected".to_string())),
            Some(account) if !self.managed => Err(ChainError::NoSigner(format!(
                "account {} is not managed by the node",
                account
            ))),
            Some(account) => Ok(Signer::new(account)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quantities() {
        assert_eq!(parse_quantity("0x1"), Ok(1));
        assert_eq!(parse_quantity("0x38"), Ok(56));
        assert!(parse_quantity("0x").is_err());
        assert!(parse_quantity("0xzz").is_err());
    }

    #[test]
    fn rpc_error_classification() {
        assert_eq!(map_rpc_error(4001, "User rejected".into()), ChainError::UserDeclined);
        assert!(matches!(
            map_rpc_error(3, "execution reverted: not live".into()),
            ChainError::Reverted(_)
        ));
        assert!(matches!(
            map_rpc_error(-32000, "insufficient funds".into()),
            ChainError::Rpc { code: -32000, .. }
        ));
    }

    #[test]
    fn calldata_layout() {
        let data = IPresale::setLiveCall { live: true }.abi_encode();
        assert_eq!(data.len(), 4 + 32);
        assert_eq!(&data[..4], &IPresale::setLiveCall::SELECTOR[..]);
        assert_eq!(data[35], 1);

        let data = IPresale::finalizeCall {}.abi_encode();
        assert_eq!(data, IPresale::finalizeCall::SELECTOR.to_vec());
    }

    #[test]
    fn bool_return_decoding() {
        let raw = format!("0x{}{}", "00".repeat(31), "01");
        let bytes = decode_data(&raw).unwrap();
        let ret = IPresale::isLiveCall::abi_decode_returns(&bytes, true).unwrap();
        assert!(ret._0);

        let short = decode_data("0x01").unwrap();
        assert!(IPresale::isFinalizedCall::abi_decode_returns(&short, true).is_err());
    }

    #[test]
    fn receipt_status() {
        let hash = B256::with_last_byte(7);
        let ok = RpcReceipt {
            status: Some("0x1".into()),
            block_number: Some("0x10".into()),
        };
        assert_eq!(
            receipt_outcome(hash, &ok),
            Ok(TxReceipt {
                tx_hash: hash,
                block_number: 16
            })
        );

        let reverted = RpcReceipt {
            status: Some("0x0".into()),
            block_number: Some("0x10".into()),
        };
        assert!(matches!(receipt_outcome(hash, &reverted), Err(ChainError::Reverted(_))));
    }
}
