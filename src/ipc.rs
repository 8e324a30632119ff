// src/ipc.rs
use crate::models::Block;
use crate::rpc::{convert_block, parse_quantity, ChainClient, ChainError, RpcBlock};
use alloy::providers::{DynProvider, IpcConnect, Provider, ProviderBuilder};
use alloy::rpc::json_rpc::{RpcRecv, RpcSend};
use alloy::transports::{RpcError, TransportError};
use async_trait::async_trait;
use std::{path::Path, time::Duration};
use tracing::debug;

/// JSON-RPC over a node's local IPC socket.
#[derive(Clone)]
pub struct IpcClient {
    provider: DynProvider,
    path: String,
    timeout: Duration,
}

impl IpcClient {
    pub async fn connect(path: &Path, timeout: Duration) -> Result<Self, ChainError> {
        let path = path.to_string_lossy().to_string();
        let provider = ProviderBuilder::new()
            .connect_ipc(IpcConnect::new(path.clone()))
            .await
            .map_err(|e| chain_error("connect", e))?
            .erased();
        Ok(Self {
            provider,
            path,
            timeout,
        })
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    async fn call<P, R>(&self, method: &'static str, params: P) -> Result<R, ChainError>
    where
        P: RpcSend,
        R: RpcRecv,
    {
        debug!("Sending {} → {}", method, self.path);
        let request = self.provider.raw_request(method.into(), params);
        match tokio::time::timeout(self.timeout, request).await {
            Ok(result) => result.map_err(|e| chain_error(method, e)),
            Err(_) => Err(ChainError::Transport {
                method,
                message: format!("no response within {:?}", self.timeout),
            }),
        }
    }
}

#[async_trait]
impl ChainClient for IpcClient {
    async fn current_height(&self) -> Result<u64, ChainError> {
        let method = "eth_blockNumber";
        let hex: String = self.call(method, ()).await?;
        parse_quantity(method, &hex)
    }

    async fn transaction_count(&self, block_number: u64) -> Result<u64, ChainError> {
        let method = "eth_getBlockTransactionCountByNumber";
        let hex: Option<String> = self
            .call(method, (format!("0x{:x}", block_number),))
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
                (format!("0x{:x}", block_number), include_transactions),
            )
            .await?;
        let block = block.ok_or(ChainError::MissingBlock(block_number))?;
        convert_block(method, block)
    }
}

fn chain_error(method: &'static str, err: TransportError) -> ChainError {
    match err {
        RpcError::ErrorResp(payload) => ChainError::Rpc {
            method,
            code: payload.code,
            message: payload.message.to_string(),
        },
        RpcError::DeserError { err, .. } => ChainError::Malformed {
            method,
            message: err.to_string(),
        },
        other => ChainError::Transport {
            method,
            message: other.to_string(),
        },
    }
}
