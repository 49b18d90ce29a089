//! Read-only Ethereum JSON-RPC client with rate limiting and retries.

use crate::primitives::{selector, word_to_u128, Address};
use serde::Deserialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use thiserror::Error;
use time::OffsetDateTime;
use tracing::{debug, info, warn};
use url::Url;

const RATE_LIMIT_MS: u64 = 200;
const MAX_RETRIES: u32 = 3;
const RETRY_BACKOFF_MS: u64 = 500;
const REQUEST_TIMEOUT_SECS: u64 = 30;

#[derive(Clone, Debug)]
pub struct RpcConfig {
    pub url: String,
    pub rate_limit_ms: u64,
    pub max_retries: u32,
    pub retry_backoff_ms: u64,
    pub offline: bool,
}

impl RpcConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            rate_limit_ms: RATE_LIMIT_MS,
            max_retries: MAX_RETRIES,
            retry_backoff_ms: RETRY_BACKOFF_MS,
            offline: false,
        }
    }
}

#[derive(Error, Debug)]
pub enum RpcError {
    #[error("request: {0}")]
    Request(#[from] reqwest::Error),
    #[error("url: {0}")]
    Url(#[from] url::ParseError),
    #[error("http status {0}: {1}")]
    Http(u16, String),
    #[error("rpc error {code}: {message}")]
    Rpc { code: i64, message: String },
    #[error("decode: {0}")]
    Decode(String),
    #[error("offline mode: rpc disabled")]
    Offline,
}

impl RpcError {
    /// Transport and server-side failures are retried; JSON-RPC errors are final.
    fn is_retryable(&self) -> bool {
        match self {
            RpcError::Request(_) => true,
            RpcError::Http(status, _) => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

#[derive(Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
}

#[derive(Deserialize)]
struct RpcResponse {
    result: Option<serde_json::Value>,
    error: Option<RpcErrorBody>,
}

/// Parse a hex quantity such as `0x7a69`.
pub fn parse_quantity(s: &str) -> Result<u64, RpcError> {
    let digits = s
        .strip_prefix("0x")
        .ok_or_else(|| RpcError::Decode(format!("quantity without 0x: {s}")))?;
    if digits.is_empty() {
        return Err(RpcError::Decode("empty quantity".into()));
    }
    u64::from_str_radix(digits, 16).map_err(|e| RpcError::Decode(format!("{s}: {e}")))
}

/// Decode `eth_call` return data holding a single ABI word.
pub fn decode_word(s: &str) -> Result<[u8; 32], RpcError> {
    let raw = hex::decode(s.trim_start_matches("0x"))
        .map_err(|e| RpcError::Decode(e.to_string()))?;
    if raw.len() < 32 {
        return Err(RpcError::Decode(format!(
            "expected at least 32 bytes, got {}",
            raw.len()
        )));
    }
    let mut word = [0u8; 32];
    word.copy_from_slice(&raw[..32]);
    Ok(word)
}

pub struct RpcClient {
    config: RpcConfig,
    url: Url,
    client: Option<reqwest::Client>,
    last_request: Mutex<Option<OffsetDateTime>>,
    next_id: AtomicU64,
    request_count: AtomicU64,
}

impl RpcClient {
    pub fn new(config: RpcConfig) -> Result<Self, RpcError> {
        let url = Url::parse(&config.url)?;
        let client = if config.offline {
            None
        } else {
            Some(
                reqwest::Client::builder()
                    .use_rustls_tls()
                    .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
                    .build()?,
            )
        };
        Ok(Self {
            config,
            url,
            client,
            last_request: Mutex::new(None),
            next_id: AtomicU64::new(1),
            request_count: AtomicU64::new(0),
        })
    }

    async fn rate_limit(&self) {
        let sleep_ms = {
            let last = self
                .last_request
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            match *last {
                Some(prev) => {
                    let elapsed = (OffsetDateTime::now_utc() - prev).whole_milliseconds();
                    let need = i128::from(self.config.rate_limit_ms);
                    if elapsed < need {
                        (need - elapsed).max(0) as u64
                    } else {
                        0
                    }
                }
                None => 0,
            }
        };
        if sleep_ms > 0 {
            tokio::time::sleep(Duration::from_millis(sleep_ms)).await;
        }
        *self
            .last_request
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(OffsetDateTime::now_utc());
    }

    async fn send_once(
        &self,
        client: &reqwest::Client,
        body: &serde_json::Value,
    ) -> Result<serde_json::Value, RpcError> {
        let res = client.post(self.url.clone()).json(body).send().await?;
        let status = res.status();
        let text = res.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(RpcError::Http(status.as_u16(), text));
        }
        let parsed: RpcResponse =
            serde_json::from_str(&text).map_err(|e| RpcError::Decode(e.to_string()))?;
        if let Some(err) = parsed.error {
            return Err(RpcError::Rpc {
                code: err.code,
                message: err.message,
            });
        }
        parsed
            .result
            .ok_or_else(|| RpcError::Decode("response without result".into()))
    }

    async fn call(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> Result<serde_json::Value, RpcError> {
        let client = self.client.as_ref().ok_or(RpcError::Offline)?;
        self.rate_limit().await;

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = serde_json::json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });
        let mut attempt = 0;
        loop {
            match self.send_once(client, &body).await {
                Ok(result) => {
                    self.request_count.fetch_add(1, Ordering::Relaxed);
                    debug!(method, id, "rpc ok");
                    return Ok(result);
                }
                Err(e) if e.is_retryable() && attempt < self.config.max_retries => {
                    let ms = self.config.retry_backoff_ms * (1 << attempt);
                    warn!(method, attempt, ms, error = %e, "retry after error");
                    tokio::time::sleep(Duration::from_millis(ms)).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn call_str(&self, method: &str, params: serde_json::Value) -> Result<String, RpcError> {
        match self.call(method, params).await? {
            serde_json::Value::String(s) => Ok(s),
            other => Err(RpcError::Decode(format!("expected string, got {other}"))),
        }
    }

    /// Runtime chain identity (`eth_chainId`).
    pub async fn chain_id(&self) -> Result<u64, RpcError> {
        let s = self.call_str("eth_chainId", serde_json::json!([])).await?;
        parse_quantity(&s)
    }

    pub async fn block_number(&self) -> Result<u64, RpcError> {
        let s = self.call_str("eth_blockNumber", serde_json::json!([])).await?;
        parse_quantity(&s)
    }

    /// `eth_call` of a zero-argument view function at the latest block.
    async fn call_view(&self, to: &Address, signature: &str) -> Result<[u8; 32], RpcError> {
        let data = format!("0x{}", hex::encode(selector(signature)));
        let s = self
            .call_str(
                "eth_call",
                serde_json::json!([{ "to": to.to_string(), "data": data }, "latest"]),
            )
            .await?;
        decode_word(&s)
    }

    /// Current rewards cycle from the Tokemak manager.
    pub async fn current_cycle_index(&self, manager: &Address) -> Result<u64, RpcError> {
        let word = self.call_view(manager, "getCurrentCycleIndex()").await?;
        let cycle = word_to_u128(&word)
            .and_then(|v| u64::try_from(v).ok())
            .ok_or_else(|| RpcError::Decode("cycle index out of range".into()))?;
        info!(%manager, cycle, "current cycle index");
        Ok(cycle)
    }

    /// Address the rewards contract trusts to sign vouchers.
    pub async fn rewards_signer(&self, rewards: &Address) -> Result<Address, RpcError> {
        let word = self.call_view(rewards, "rewardsSigner()").await?;
        Ok(Address::from_word(&word))
    }

    pub fn request_count(&self) -> u64 {
        self.request_count.load(Ordering::Relaxed)
    }
}
