// src/rpc.rs
use crate::ipc::IpcClient;
use crate::models::{Block, TxSummary};
use alloy::primitives::{Address, Bytes};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::{json, Value};
use std::{fmt, path::PathBuf, sync::Arc, time::Duration};
use thiserror::Error;
use tracing::{debug, warn};

const MAX_ATTEMPTS: u32 = 3;
const RETRY_PAUSE: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChainError {
    #[error("{method} transport failure: {message}")]
    Transport {
        method: &'static str,
        message: String,
    },
    #[error("{method} returned RPC error {code}: {message}")]
    Rpc {
        method: &'static str,
        code: i64,
        message: String,
    },
    #[error("{method} returned a malformed response: {message}")]
    Malformed {
        method: &'static str,
        message: String,
    },
    #[error("block {0} not found")]
    MissingBlock(u64),
}

/// What the scanner needs from a node.
#[async_trait]
pub trait ChainClient: Send + Sync {
    async fn current_height(&self) -> Result<u64, ChainError>;

    async fn transaction_count(&self, block_number: u64) -> Result<u64, ChainError>;

    async fn get_block(
        &self,
        block_number: u64,
        include_transactions: bool,
    ) -> Result<Block, ChainError>;
}

/// Where the node listens: an `http(s)://` URL or a local IPC socket path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    Http(String),
    Ipc(PathBuf),
}

impl Endpoint {
    /// Returns `None` for an empty endpoint or a scheme other than http(s).
    pub fn parse(raw: &str) -> Option<Endpoint> {
        let raw = raw.trim();
        if raw.is_empty() {
            return None;
        }
        let lower = raw.to_ascii_lowercase();
        if lower.starts_with("http://") || lower.starts_with("https://") {
            Some(Endpoint::Http(raw.to_string()))
        } else if raw.contains("://") {
            None
        } else {
            Some(Endpoint::Ipc(PathBuf::from(raw)))
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Http(url) => f.write_str(url),
            Endpoint::Ipc(path) => write!(f, "ipc:{}", path.display()),
        }
    }
}

/// Opens the client matching the endpoint kind.
pub async fn connect(
    endpoint: &Endpoint,
    timeout: Duration,
) -> Result<Arc<dyn ChainClient>, ChainError> {
    Ok(match endpoint {
        Endpoint::Http(url) => Arc::new(RpcClient::new(url, timeout)?),
        Endpoint::Ipc(path) => Arc::new(IpcClient::connect(path, timeout).await?),
    })
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RpcResponse<T> {
    Error { error: RpcErrorObject },
    Success { result: T },
}

#[derive(Debug, Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RpcBlock {
    number: String,
    timestamp: String,
    miner: String,
    #[serde(default)]
    transactions: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct RpcTransaction {
    hash: String,
    from: String,
    to: Option<String>,
    #[serde(alias = "data")]
    input: String,
    #[serde(rename = "blockNumber")]
    block_number: Option<String>,
}

/// JSON-RPC over HTTP, with a per-request timeout and retries on
/// transport failures.
#[derive(Debug, Clone)]
pub struct RpcClient {
    url: String,
    client: Client,
}

impl RpcClient {
    pub fn new(url: &str, timeout: Duration) -> Result<Self, ChainError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ChainError::Transport {
                method: "client",
                message: e.to_string(),
            })?;
        Ok(Self {
            url: url.to_string(),
            client,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &'static str,
        params: Value,
    ) -> Result<T, ChainError> {
        let payload = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params
        });

        let mut attempt = 1;
        let text = loop {
            debug!("Sending {} → {}", method, self.url);
            match self.send(&payload).await {
                Ok(text) => break text,
                Err(message) if attempt < MAX_ATTEMPTS => {
                    warn!(
                        "{} failed (attempt {}): {}. Retrying...",
                        method, attempt, message
                    );
                    attempt += 1;
                    tokio::time::sleep(RETRY_PAUSE * attempt).await;
                }
                Err(message) => return Err(ChainError::Transport { method, message }),
            }
        };

        match serde_json::from_str::<RpcResponse<T>>(&text) {
            Ok(RpcResponse::Success { result }) => Ok(result),
            Ok(RpcResponse::Error { error }) => Err(ChainError::Rpc {
                method,
                code: error.code,
                message: error.message,
            }),
            Err(e) => Err(ChainError::Malformed {
                method,
                message: e.to_string(),
            }),
        }
    }

    async fn send(&self, payload: &Value) -> Result<String, String> {
        let resp = self
            .client
            .post(&self.url)
            .json(payload)
            .send()
            .await
            .map_err(|e| e.to_string())?;
        if resp.status() != StatusCode::OK {
            return Err(format!("HTTP {}", resp.status()));
        }
        resp.text().await.map_err(|e| e.to_string())
    }
}

#[async_trait]
impl ChainClient for RpcClient {
    async fn current_height(&self) -> Result<u64, ChainError> {
        let method = "eth_blockNumber";
        let hex: String = self.call(method, json!([])).await?;
        parse_quantity(method, &hex)
    }

    async fn transaction_count(&self, block_number: u64) -> Result<u64, ChainError> {
        let method = "eth_getBlockTransactionCountByNumber";
        let hex: Option<String> = self
            .call(method, json!([format!("0x{:x}", block_number)]))
            .await?;
        let hex = hex.ok_or(ChainError::MissingBlock(block_number))?;
        parse_quantity(method, &hex)
    }

    async fn get_block(
        &self,
        block_number: u64,
        include_transactions: bool,
    ) -> Result<Block, ChainError> {
        let method = "eth_getBlockByNumber";
        let block: Option<RpcBlock> = self
            .call(
                method,
                json!([format!("0x{:x}", block_number), include_transactions]),
            )
            .await?;
        let block = block.ok_or(ChainError::MissingBlock(block_number))?;
        convert_block(method, block)
    }
}

pub(crate) fn convert_block(method: &'static str, block: RpcBlock) -> Result<Block, ChainError> {
    let transactions = block
        .transactions
        .into_iter()
        // hash-only entries when transactions were not requested in full
        .filter(Value::is_object)
        .map(|raw| convert_transaction(method, raw))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Block {
        number: parse_quantity(method, &block.number)?,
        timestamp: parse_quantity(method, &block.timestamp)?,
        miner: parse_address(method, &block.miner)?,
        transactions,
    })
}

fn convert_transaction(method: &'static str, raw: Value) -> Result<TxSummary, ChainError> {
    let tx: RpcTransaction =
        serde_json::from_value(raw.clone()).map_err(|e| ChainError::Malformed {
            method,
            message: e.to_string(),
        })?;

    let input = hex::decode(tx.input.trim_start_matches("0x")).map_err(|e| {
        ChainError::Malformed {
            method,
            message: format!("tx {} input: {}", tx.hash, e),
        }
    })?;

    Ok(TxSummary {
        from: parse_address(method, &tx.from)?,
        to: tx
            .to
            .as_deref()
            .map(|to| parse_address(method, to))
            .transpose()?,
        input: Bytes::from(input),
        block_number: tx
            .block_number
            .as_deref()
            .map(|n| parse_quantity(method, n))
            .transpose()?,
        hash: tx.hash,
        raw,
    })
}

pub fn parse_quantity(method: &'static str, hex: &str) -> Result<u64, ChainError> {
    u64::from_str_radix(hex.trim_start_matches("0x"), 16).map_err(|e| ChainError::Malformed {
        method,
        message: format!("quantity {hex:?}: {e}"),
    })
}

fn parse_address(method: &'static str, s: &str) -> Result<Address, ChainError> {
    s.parse::<Address>().map_err(|e| ChainError::Malformed {
        method,
        message: format!("address {s:?}: {e}"),
    })
}
