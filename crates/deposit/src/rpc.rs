//! JSON-RPC plumbing shared by every remote call in the workflow.
//!
//! All traffic to the node goes through the [`Transport`] trait so the
//! workflow can run against a real endpoint ([`HttpTransport`]) or an
//! in-process double in tests.

use std::{
    future::Future,
    sync::atomic::{AtomicU64, Ordering},
    time::{Duration, Instant},
};

use alloy_core::primitives::TxHash;
use serde::{Deserialize, de::DeserializeOwned};
use serde_json::Value;
use url::Url;

use crate::error::{DepositError, Result};

/// Default timeout for a single HTTP round-trip.
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Default time to wait for a transaction to be included.
pub const DEFAULT_INCLUSION_TIMEOUT: Duration = Duration::from_secs(120);

/// Default interval between receipt polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// A connection to a JSON-RPC node.
///
/// Implementations must tolerate concurrent use: independent deposit
/// attempts share one transport.
pub trait Transport: Send + Sync + 'static {
    /// Issue `method` with `params` and return the raw `result` member.
    fn request(
        &self,
        method: &str,
        params: Vec<Value>,
    ) -> impl Future<Output = Result<Value>> + Send;
}

/// [`Transport`] over HTTP, backed by a pooled `reqwest` client.
#[derive(Debug)]
pub struct HttpTransport {
    client: reqwest::Client,
    url: Url,
    next_id: AtomicU64,
}

impl HttpTransport {
    /// Create a transport for `url`.
    pub fn new(url: Url) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(DEFAULT_REQUEST_TIMEOUT)
            .build()
            .map_err(|e| DepositError::Configuration(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            url,
            next_id: AtomicU64::new(1),
        })
    }
}

impl Transport for HttpTransport {
    async fn request(&self, method: &str, params: Vec<Value>) -> Result<Value> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);

        let response = self
            .client
            .post(self.url.clone())
            .json(&serde_json::json!({
                "jsonrpc": "2.0",
                "method": method,
                "params": params,
                "id": id
            }))
            .send()
            .await
            .map_err(|e| DepositError::remote(method, format!("failed to send request: {e}")))?;

        let body: Value = response
            .json()
            .await
            .map_err(|e| DepositError::unexpected(method, format!("failed to parse response: {e}")))?;

        extract_result(method, body)
    }
}

/// Pull the `result` out of a JSON-RPC response envelope.
///
/// An `error` member becomes [`DepositError::RemoteCall`], carrying the
/// revert data when the node provides it.
pub fn extract_result(method: &str, mut body: Value) -> Result<Value> {
    if let Some(error) = body.get("error") {
        let message = error
            .get("message")
            .and_then(|m| m.as_str())
            .unwrap_or("unknown");
        let message = match error.get("data") {
            Some(data) if !data.is_null() => format!("{message} (data: {data})"),
            _ => message.to_string(),
        };
        return Err(DepositError::remote(method, message));
    }

    match body.get_mut("result") {
        Some(result) => Ok(result.take()),
        None => Err(DepositError::unexpected(method, "no result in response")),
    }
}

/// Make a JSON-RPC call and deserialize the result.
pub async fn json_rpc_call<T, R>(transport: &R, method: &str, params: Vec<Value>) -> Result<T>
where
    T: DeserializeOwned,
    R: Transport + ?Sized,
{
    let value = transport.request(method, params).await?;
    serde_json::from_value(value)
        .map_err(|e| DepositError::unexpected(method, format!("failed to deserialize result: {e}")))
}

/// Parse a hex quantity (`0x`-prefixed) as returned by the node.
pub fn parse_quantity(method: &str, quantity: &str) -> Result<u128> {
    let digits = quantity
        .strip_prefix("0x")
        .ok_or_else(|| DepositError::unexpected(method, format!("quantity without 0x prefix: {quantity}")))?;
    if digits.is_empty() {
        return Ok(0);
    }
    u128::from_str_radix(digits, 16)
        .map_err(|e| DepositError::unexpected(method, format!("bad quantity {quantity}: {e}")))
}

/// Deserialize a u64 from a hex string (with 0x prefix).
fn deserialize_u64_from_hex<'de, D>(deserializer: D) -> std::result::Result<u64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s: String = Deserialize::deserialize(deserializer)?;
    u64::from_str_radix(s.trim_start_matches("0x"), 16).map_err(serde::de::Error::custom)
}

/// Deserialize an optional status quantity (`0x1` / `0x0`).
fn deserialize_status<'de, D>(deserializer: D) -> std::result::Result<Option<bool>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s: Option<String> = Deserialize::deserialize(deserializer)?;
    s.map(|s| {
        u64::from_str_radix(s.trim_start_matches("0x"), 16)
            .map(|status| status == 1)
            .map_err(serde::de::Error::custom)
    })
    .transpose()
}

/// Proof that a transaction made it into a block.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TxReceipt {
    pub transaction_hash: TxHash,
    #[serde(deserialize_with = "deserialize_u64_from_hex")]
    pub block_number: u64,
    /// Execution status. Absent on pre-Byzantium chains, where inclusion is
    /// the only signal available.
    #[serde(default, deserialize_with = "deserialize_status")]
    pub status: Option<bool>,
}

impl TxReceipt {
    /// Whether the transaction executed successfully.
    pub fn succeeded(&self) -> bool {
        self.status.unwrap_or(true)
    }
}

/// How long to wait for inclusion and how often to ask.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InclusionPolicy {
    pub timeout: Duration,
    pub poll_interval: Duration,
}

impl Default for InclusionPolicy {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_INCLUSION_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

/// Poll `eth_getTransactionReceipt` until the node returns a receipt.
///
/// A failed poll is not proof of anything: it is logged and polling goes on.
/// Returns [`DepositError::Timeout`] once `policy.timeout` has elapsed without
/// a receipt. A receipt with a failed status is still returned: the caller
/// decides what a revert means.
pub async fn wait_for_receipt<R>(
    transport: &R,
    tx_hash: TxHash,
    policy: InclusionPolicy,
) -> Result<TxReceipt>
where
    R: Transport + ?Sized,
{
    let start = Instant::now();

    loop {
        let receipt: Result<Option<TxReceipt>> = json_rpc_call(
            transport,
            "eth_getTransactionReceipt",
            vec![serde_json::json!(tx_hash)],
        )
        .await;

        match receipt {
            Ok(Some(receipt)) => {
                tracing::debug!(
                    tx_hash = %receipt.transaction_hash,
                    block_number = receipt.block_number,
                    succeeded = receipt.succeeded(),
                    "Transaction included"
                );
                return Ok(receipt);
            }
            Ok(None) => {}
            Err(e) => {
                tracing::trace!(error = %e, tx_hash = %tx_hash, "Receipt poll failed, retrying...");
            }
        }

        if start.elapsed() >= policy.timeout {
            return Err(DepositError::Timeout {
                tx_hash,
                waited: start.elapsed(),
            });
        }

        tracing::trace!(tx_hash = %tx_hash, "Receipt not available yet, polling...");
        tokio::time::sleep(policy.poll_interval).await;
    }
}
