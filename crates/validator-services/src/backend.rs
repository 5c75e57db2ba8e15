//! Upstream Ethereum node access.
//!
//! One base URL (`endpoint/token`) serves both the execution layer JSON-RPC
//! API (POST to the base URL) and the Beacon REST API (GET `/eth/v1/...`).

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use thiserror::Error;
use tracing::debug;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(20);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("backend request failed: {0}")]
    Http(#[source] reqwest::Error),
    #[error("backend returned HTTP {status} for {call}")]
    Status { status: u16, call: String },
    #[error("backend rpc error {code}: {message}")]
    Rpc { code: i64, message: String },
    #[error("malformed backend response: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for BackendError {
    fn from(e: reqwest::Error) -> Self {
        // The URL carries the access token
        BackendError::Http(e.without_url())
    }
}

/// Read access to the chain data the services need.
pub trait Backend: Send + Sync + 'static {
    /// Latest execution layer block number.
    fn block_number(&self) -> impl Future<Output = Result<u64, BackendError>> + Send;

    /// Execution block with full transactions, `None` if the node has no such block.
    fn block_by_number(
        &self,
        number: u64,
    ) -> impl Future<Output = Result<Option<ExecutionBlock>, BackendError>> + Send;

    /// Receipts of every transaction in the block.
    fn block_receipts(
        &self,
        number: u64,
    ) -> impl Future<Output = Result<Vec<TransactionReceipt>, BackendError>> + Send;

    /// Slot of the beacon chain head.
    fn head_slot(&self) -> impl Future<Output = Result<u64, BackendError>> + Send;

    /// Validator indices of the sync committee for `slot`, `None` if the
    /// node has no state for it.
    fn sync_committee(
        &self,
        slot: u64,
    ) -> impl Future<Output = Result<Option<Vec<u64>>, BackendError>> + Send;

    /// Public keys for `indices`, in the same order (duplicates repeated).
    fn validator_pubkeys(
        &self,
        slot: u64,
        indices: &[u64],
    ) -> impl Future<Output = Result<Vec<String>, BackendError>> + Send;
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionBlock {
    #[serde(deserialize_with = "quantity::hex_u64")]
    pub number: u64,
    /// Fee recipient of the block
    pub miner: String,
    /// Absent before London
    #[serde(default, deserialize_with = "quantity::opt_hex_u128")]
    pub base_fee_per_gas: Option<u128>,
    #[serde(default)]
    pub transactions: Vec<Transaction>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub hash: String,
    pub from: String,
    /// `None` for contract creation
    #[serde(default)]
    pub to: Option<String>,
    #[serde(deserialize_with = "quantity::hex_u128")]
    pub value: u128,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionReceipt {
    pub transaction_hash: String,
    #[serde(deserialize_with = "quantity::hex_u128")]
    pub gas_used: u128,
    #[serde(deserialize_with = "quantity::hex_u128")]
    pub effective_gas_price: u128,
}

/// Serde helpers for JSON-RPC hex quantities and Beacon API decimal strings.
pub mod quantity {
    use serde::{Deserialize, Deserializer, de::Error};

    pub fn parse_hex(raw: &str) -> Result<u128, String> {
        let digits = raw
            .strip_prefix("0x")
            .or_else(|| raw.strip_prefix("0X"))
            .ok_or_else(|| format!("quantity {raw:?} lacks 0x prefix"))?;
        if digits.is_empty() {
            return Err(format!("empty quantity {raw:?}"));
        }
        u128::from_str_radix(digits, 16).map_err(|e| format!("bad quantity {raw:?}: {e}"))
    }

    pub fn encode(value: u64) -> String {
        format!("{value:#x}")
    }

    pub fn hex_u128<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u128, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse_hex(&raw).map_err(D::Error::custom)
    }

    pub fn hex_u64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
        let value = hex_u128(deserializer)?;
        u64::try_from(value).map_err(D::Error::custom)
    }

    pub fn opt_hex_u128<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u128>, D::Error> {
        match Option::<String>::deserialize(deserializer)? {
            Some(raw) => parse_hex(&raw).map(Some).map_err(D::Error::custom),
            None => Ok(None),
        }
    }

    pub fn decimal_u64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(D::Error::custom)
    }

    pub fn decimal_vec<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u64>, D::Error> {
        Vec::<String>::deserialize(deserializer)?
            .iter()
            .map(|raw| raw.parse().map_err(D::Error::custom))
            .collect()
    }
}

#[derive(Debug, Clone)]
pub struct BackendConfig {
    /// Node URL, e.g. `https://mainnet.example.io`
    pub endpoint: String,
    /// Access token appended as the last path segment
    pub token: SecretString,
}

impl BackendConfig {
    fn base_url(&self) -> SecretString {
        let endpoint = self.endpoint.trim_end_matches('/');
        let token = self.token.expose_secret();
        if token.is_empty() {
            SecretString::from(endpoint.to_string())
        } else {
            SecretString::from(format!("{endpoint}/{token}"))
        }
    }
}

// ── Wire shapes ──────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct RpcReply {
    #[serde(default)]
    result: Value,
    error: Option<RpcFault>,
}

#[derive(Deserialize)]
struct RpcFault {
    code: i64,
    message: String,
}

#[derive(Deserialize)]
struct Envelope<T> {
    data: T,
}

#[derive(Deserialize)]
struct HeaderData {
    header: SignedHeader,
}

#[derive(Deserialize)]
struct SignedHeader {
    message: HeaderMessage,
}

#[derive(Deserialize)]
struct HeaderMessage {
    #[serde(deserialize_with = "quantity::decimal_u64")]
    slot: u64,
}

#[derive(Deserialize)]
struct SyncCommitteeData {
    #[serde(deserialize_with = "quantity::decimal_vec")]
    validators: Vec<u64>,
}

#[derive(Deserialize)]
struct ValidatorEntry {
    #[serde(deserialize_with = "quantity::decimal_u64")]
    index: u64,
    validator: ValidatorInfo,
}

#[derive(Deserialize)]
struct ValidatorInfo {
    pubkey: String,
}

/// `Backend` over HTTP with reqwest.
pub struct RpcBackend {
    http: Client,
    base_url: SecretString,
    endpoint: String,
    next_id: AtomicU64,
}

impl RpcBackend {
    pub fn new(config: &BackendConfig) -> Result<Self, BackendError> {
        let http = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            http,
            base_url: config.base_url(),
            endpoint: config.endpoint.clone(),
            next_id: AtomicU64::new(1),
        })
    }

    /// Endpoint without the token, safe to log.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn rpc<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T, BackendError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        debug!(id, method, "rpc call");

        let response = self
            .http
            .post(self.base_url.expose_secret())
            .json(&json!({ "jsonrpc": "2.0", "id": id, "method": method, "params": params }))
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(BackendError::Status { status: status.as_u16(), call: method.to_string() });
        }

        let reply: RpcReply = response.json().await?;
        if let Some(fault) = reply.error {
            return Err(BackendError::Rpc { code: fault.code, message: fault.message });
        }
        serde_json::from_value(reply.result)
            .map_err(|e| BackendError::Decode(format!("{method}: {e}")))
    }

    /// GET a Beacon API path. `None` when the node answers 404.
    async fn beacon<T: DeserializeOwned>(&self, path: &str) -> Result<Option<T>, BackendError> {
        debug!(path, "beacon call");
        let url = format!("{}{path}", self.base_url.expose_secret());
        let response = self.http.get(url).send().await?;
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(BackendError::Status { status: status.as_u16(), call: path.to_string() });
        }
        let body = response.bytes().await?;
        serde_json::from_slice::<Envelope<T>>(&body)
            .map(|envelope| Some(envelope.data))
            .map_err(|e| BackendError::Decode(format!("{path}: {e}")))
    }
}

impl Backend for RpcBackend {
    async fn block_number(&self) -> Result<u64, BackendError> {
        let raw: String = self.rpc("eth_blockNumber", json!([])).await?;
        let number = quantity::parse_hex(&raw).map_err(BackendError::Decode)?;
        u64::try_from(number).map_err(|e| BackendError::Decode(e.to_string()))
    }

    async fn block_by_number(&self, number: u64) -> Result<Option<ExecutionBlock>, BackendError> {
        self.rpc("eth_getBlockByNumber", json!([quantity::encode(number), true])).await
    }

    async fn block_receipts(&self, number: u64) -> Result<Vec<TransactionReceipt>, BackendError> {
        let receipts: Option<Vec<TransactionReceipt>> =
            self.rpc("eth_getBlockReceipts", json!([quantity::encode(number)])).await?;
        Ok(receipts.unwrap_or_default())
    }

    async fn head_slot(&self) -> Result<u64, BackendError> {
        let head: HeaderData = self
            .beacon("/eth/v1/beacon/headers/head")
            .await?
            .ok_or_else(|| BackendError::Decode("beacon node has no head".into()))?;
        Ok(head.header.message.slot)
    }

    async fn sync_committee(&self, slot: u64) -> Result<Option<Vec<u64>>, BackendError> {
        let committee: Option<SyncCommitteeData> = self
            .beacon(&format!("/eth/v1/beacon/states/{slot}/sync_committees"))
            .await?;
        Ok(committee.map(|c| c.validators))
    }

    async fn validator_pubkeys(&self, slot: u64, indices: &[u64]) -> Result<Vec<String>, BackendError> {
        if indices.is_empty() {
            return Ok(Vec::new());
        }
        let ids = indices.iter().map(u64::to_string).collect::<Vec<_>>().join(",");
        let entries: Vec<ValidatorEntry> = self
            .beacon(&format!("/eth/v1/beacon/states/{slot}/validators?id={ids}"))
            .await?
            .ok_or_else(|| BackendError::Decode(format!("no validator state for slot {slot}")))?;

        let by_index: HashMap<u64, String> = entries
            .into_iter()
            .map(|entry| (entry.index, entry.validator.pubkey))
            .collect();
        indices
            .iter()
            .map(|index| {
                by_index
                    .get(index)
                    .cloned()
                    .ok_or_else(|| BackendError::Decode(format!("validator {index} missing")))
            })
            .collect()
    }
}
