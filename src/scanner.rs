// src/scanner.rs
use crate::decoder::{self, CallOutcome};
use crate::events::{EventStream, TraceEvent};
use crate::models::Block;
use crate::rpc::{ChainClient, ChainError};
use crate::selector::SelectorTable;
use alloy::primitives::Address;
use futures_util::{future, stream, StreamExt};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub const DEFAULT_PREFETCH_DEPTH: usize = 6;
pub const DEFAULT_PROGRESS_INTERVAL: u64 = 1000;
const EVENT_BUFFER: usize = 256;

/// Inclusive block range, never touching genesis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanRange {
    start_block: u64,
    end_block: u64,
}

impl ScanRange {
    pub fn new(start_block: u64, end_block: u64) -> Option<Self> {
        (start_block >= 1 && start_block <= end_block).then_some(Self {
            start_block,
            end_block,
        })
    }

    /// `[max(1, anchor - offset), anchor]`; an anchor of 0 is lifted to 1.
    pub fn from_anchor(anchor: u64, offset: u64) -> Self {
        let end_block = anchor.max(1);
        Self {
            start_block: end_block.saturating_sub(offset).max(1),
            end_block,
        }
    }

    pub fn start_block(&self) -> u64 {
        self.start_block
    }

    pub fn end_block(&self) -> u64 {
        self.end_block
    }

    pub fn len(&self) -> u64 {
        self.end_block - self.start_block + 1
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ScanOptions {
    /// Blocks fetched concurrently ahead of the one being published.
    pub prefetch_depth: usize,
    pub progress_interval: u64,
    pub fail_fast: bool,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            prefetch_depth: DEFAULT_PREFETCH_DEPTH,
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
            fail_fast: false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanReport {
    pub blocks_visited: u64,
    pub blocks_fetched: u64,
    pub matched: u64,
    pub failed: u64,
    pub cancelled: bool,
}

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("scan aborted: {0}")]
    Chain(#[from] ChainError),
    #[error("scan task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Requests a stop at the next block boundary. `Finished` is still
/// published after a cancel.
#[derive(Debug, Clone)]
pub struct CancelToken(Arc<watch::Sender<bool>>);

impl CancelToken {
    pub fn cancel(&self) {
        self.0.send_replace(true);
    }
}

/// Control side of a running scan.
pub struct ScanHandle {
    cancel: CancelToken,
    task: JoinHandle<Result<ScanReport, ChainError>>,
}

impl ScanHandle {
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Waits for the scan to end. With fail-fast set, the first chain
    /// error is returned here.
    pub async fn join(self) -> Result<ScanReport, ScanError> {
        Ok(self.task.await??)
    }
}

enum Fetched {
    Empty,
    Loaded(Block),
    Failed(ChainError),
}

#[derive(Clone)]
pub struct Scanner {
    client: Arc<dyn ChainClient>,
    table: Arc<SelectorTable>,
    target: Address,
    options: ScanOptions,
}

impl Scanner {
    pub fn new(
        client: Arc<dyn ChainClient>,
        table: Arc<SelectorTable>,
        target: Address,
        options: ScanOptions,
    ) -> Self {
        Self {
            client,
            table,
            target,
            options,
        }
    }

    /// Builds the range from an optional anchor, asking the node for its
    /// height when no anchor is given.
    pub async fn resolve_range(
        &self,
        anchor: Option<u64>,
        offset: u64,
    ) -> Result<ScanRange, ChainError> {
        let anchor = match anchor {
            Some(anchor) => anchor,
            None => self.client.current_height().await?,
        };
        Ok(ScanRange::from_anchor(anchor, offset))
    }

    /// Starts scanning on a background task. Must be called within a tokio
    /// runtime.
    pub fn scan(&self, range: ScanRange) -> (EventStream, ScanHandle) {
        let (events, stream) = EventStream::channel(EVENT_BUFFER);
        let (stop, stop_rx) = watch::channel(false);
        let scanner = self.clone();
        let task = tokio::spawn(async move { scanner.run(range, events, stop_rx).await });
        let handle = ScanHandle {
            cancel: CancelToken(Arc::new(stop)),
            task,
        };
        (stream, handle)
    }

    async fn run(
        self,
        range: ScanRange,
        events: mpsc::Sender<TraceEvent>,
        mut stop: watch::Receiver<bool>,
    ) -> Result<ScanReport, ChainError> {
        info!(
            "Anchor block {}. Diving to {} ({} blocks, target {})",
            range.end_block,
            range.start_block,
            range.len(),
            self.target
        );
        let mut report = ScanReport::default();
        let mut outcome = Ok(());

        let started = TraceEvent::Started {
            start_block: range.start_block,
            end_block: range.end_block,
        };
        if events.send(started).await.is_err() {
            report.cancelled = true;
        }

        // `buffered` polls up to `depth` fetches at once but yields them in
        // block order, so publication below is strictly increasing.
        let depth = self.options.prefetch_depth.max(1);
        let client = Arc::clone(&self.client);
        let mut fetches = stream::iter(range.start_block..=range.end_block)
            .map(|number| {
                let client = Arc::clone(&client);
                async move { (number, fetch(client.as_ref(), number).await) }
            })
            .buffered(depth);

        while !report.cancelled {
            let next = tokio::select! {
                biased;
                _ = stop_requested(&mut stop) => {
                    info!("Scan cancelled");
                    report.cancelled = true;
                    break;
                }
                next = fetches.next() => next,
            };
            let Some((number, fetched)) = next else {
                break;
            };
            report.blocks_visited += 1;

            let published = match fetched {
                Fetched::Empty => {
                    debug!("Block {} has no transactions", number);
                    true
                }
                Fetched::Loaded(block) => {
                    report.blocks_fetched += 1;
                    self.publish_matches(block, &events, &mut report).await
                }
                Fetched::Failed(error) => {
                    warn!("Block {} failed: {}", number, error);
                    report.failed += 1;
                    let failed = TraceEvent::Failed {
                        error: error.clone(),
                        block_number: Some(number),
                    };
                    let sent = events.send(failed).await.is_ok();
                    if self.options.fail_fast {
                        outcome = Err(error);
                        break;
                    }
                    sent
                }
            };

            let progress = self.options.progress_interval > 0
                && number % self.options.progress_interval == 0;
            let published = published
                && (!progress
                    || events
                        .send(TraceEvent::Progress {
                            block_number: number,
                        })
                        .await
                        .is_ok());

            if !published {
                debug!("Event consumer went away, stopping scan");
                report.cancelled = true;
            }
        }

        // in-flight fetches past this point are discarded
        drop(fetches);
        let _ = events.send(TraceEvent::Finished).await;

        info!(
            "Scan finished: {} blocks visited, {} fetched, {} matched, {} failed",
            report.blocks_visited, report.blocks_fetched, report.matched, report.failed
        );
        outcome.map(|_| report)
    }

    async fn publish_matches(
        &self,
        block: Block,
        events: &mpsc::Sender<TraceEvent>,
        report: &mut ScanReport,
    ) -> bool {
        let summary = block.summary();
        for tx in block.transactions {
            if tx.to != Some(self.target) {
                continue;
            }
            let call = decoder::decode_input(&self.table, &tx.input);
            match &call {
                CallOutcome::Decoded(decoded) => {
                    debug!("Tx {} → {}", tx.hash, decoded.function.name)
                }
                CallOutcome::UnknownSelector { selector } => debug!(
                    "Tx {} → unknown selector {}",
                    tx.hash,
                    selector.map(hex::encode).unwrap_or_default()
                ),
                CallOutcome::Undecodable { function, error, .. } => warn!(
                    "Tx {} → {} could not be decoded: {}",
                    tx.hash, function.name, error
                ),
            }

            report.matched += 1;
            let matched = TraceEvent::Matched {
                block: summary.clone(),
                tx,
                call,
            };
            if events.send(matched).await.is_err() {
                return false;
            }
        }
        true
    }
}

/// Count first, so empty blocks never cost a full block fetch.
async fn fetch(client: &dyn ChainClient, number: u64) -> Fetched {
    match client.transaction_count(number).await {
        Ok(0) => Fetched::Empty,
        Ok(_) => match client.get_block(number, true).await {
            Ok(block) => Fetched::Loaded(block),
            Err(e) => Fetched::Failed(e),
        },
        Err(e) => Fetched::Failed(e),
    }
}

/// Resolves once a stop was requested. Never resolves if the handle was
/// dropped without cancelling.
async fn stop_requested(stop: &mut watch::Receiver<bool>) {
    while !*stop.borrow_and_update() {
        if stop.changed().await.is_err() {
            future::pending::<()>().await;
        }
    }
}
