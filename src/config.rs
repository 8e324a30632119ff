use crate::output::OutputFormat;
use crate::rpc::Endpoint;
use crate::scanner::{ScanOptions, DEFAULT_PREFETCH_DEPTH, DEFAULT_PROGRESS_INTERVAL};
use alloy::primitives::Address;
use clap::Parser;
use dotenvy::dotenv;
use eyre::{eyre, Result};
use std::{path::PathBuf, time::Duration};

/// Scan a block range and print the transactions sent to a contract,
/// decoded against its ABI.
#[derive(Debug, Clone, Parser)]
#[command(author, version, about, disable_version_flag = true)]
pub struct Config {
    /// Print version
    #[arg(short = 'v', long = "version", action = clap::ArgAction::Version)]
    version: (),

    /// Contract address
    #[arg(short = 'a', long = "addr", env = "CONTRACT_ADDRESS")]
    pub contract_address: Address,

    /// ABI file: a bare ABI array or a build artifact with an `abi` field
    #[arg(short = 'i', long = "abi", env = "ABI_PATH")]
    pub abi_path: PathBuf,

    /// JSON-RPC endpoint: an http(s) URL or a node IPC socket path
    #[arg(
        short = 'g',
        long = "rpc",
        env = "RPC_HTTP_URL",
        default_value = "http://localhost:8545",
        value_parser = parse_endpoint
    )]
    pub rpc_endpoint: Endpoint,

    /// Highest block to scan. Defaults to the node's current height
    #[arg(short = 'b', long, env = "ANCHOR_BLOCK")]
    pub anchor: Option<u64>,

    /// Scan this many blocks below the anchor
    #[arg(short = 'o', long, env = "BLOCK_OFFSET", default_value_t = 2000)]
    pub offset: u64,

    #[arg(long, env = "OUTPUT_FORMAT", value_enum, default_value_t = OutputFormat::Console)]
    pub output: OutputFormat,

    /// 1 - low, 2 - medium, 3 - high
    #[arg(
        short = 'L',
        long,
        env = "VERBOSITY",
        default_value_t = 1,
        value_parser = clap::value_parser!(u8).range(1..=3)
    )]
    pub verbosity: u8,

    /// Stop the whole scan on the first failed block
    #[arg(long, env = "FAIL_FAST")]
    pub fail_fast: bool,

    /// Blocks fetched concurrently
    #[arg(long = "prefetch", env = "PREFETCH_DEPTH", default_value_t = DEFAULT_PREFETCH_DEPTH)]
    pub prefetch_depth: usize,

    /// Emit a progress event every N blocks (0 disables)
    #[arg(long = "progress-every", env = "PROGRESS_INTERVAL", default_value_t = DEFAULT_PROGRESS_INTERVAL)]
    pub progress_interval: u64,

    /// Per-request RPC timeout
    #[arg(long = "rpc-timeout", env = "RPC_TIMEOUT_SECS", default_value_t = 15)]
    pub rpc_timeout_secs: u64,
}

impl Config {
    pub fn scan_options(&self) -> ScanOptions {
        ScanOptions {
            prefetch_depth: self.prefetch_depth,
            progress_interval: self.progress_interval,
            fail_fast: self.fail_fast,
        }
    }

    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_secs(self.rpc_timeout_secs)
    }

    fn validate(self) -> Result<Self> {
        if self.prefetch_depth == 0 {
            return Err(eyre!("prefetch depth must be at least 1"));
        }
        Ok(self)
    }
}

fn parse_endpoint(raw: &str) -> std::result::Result<Endpoint, String> {
    Endpoint::parse(raw)
        .ok_or_else(|| format!("expected an http(s) URL or an IPC socket path, got {raw:?}"))
}

/// Command line first, then environment (including `.env`), then defaults.
pub fn load() -> Result<Config> {
    dotenv().ok();
    Config::parse().validate()
}

pub fn load_from<I, T>(args: I) -> Result<Config>
where
    I: IntoIterator<Item = T>,
    T: Into<std::ffi::OsString> + Clone,
{
    Config::try_parse_from(args)?.validate()
}
