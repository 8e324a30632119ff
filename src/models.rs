// src/models.rs
use alloy::primitives::{Address, Bytes};

/// Compact block presentation carried by `Matched` events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockSummary {
    pub number: u64,
    pub timestamp: u64,
    pub miner: Address,
}

/// A transaction as returned by the chain client. `raw` keeps every field
/// the node sent, including the ones not lifted into typed fields.
#[derive(Debug, Clone, PartialEq)]
pub struct TxSummary {
    pub hash: String,
    pub from: Address,
    pub to: Option<Address>, // None for contract creation
    pub input: Bytes,
    pub block_number: Option<u64>,
    pub raw: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub number: u64,
    pub timestamp: u64,
    pub miner: Address,
    pub transactions: Vec<TxSummary>,
}

impl Block {
    pub fn summary(&self) -> BlockSummary {
        BlockSummary {
            number: self.number,
            timestamp: self.timestamp,
            miner: self.miner,
        }
    }
}
