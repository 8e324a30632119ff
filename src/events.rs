// src/events.rs
use crate::decoder::CallOutcome;
use crate::models::{BlockSummary, TxSummary};
use crate::rpc::ChainError;
use std::collections::HashMap;
use tokio::sync::mpsc;

#[derive(Debug, Clone, PartialEq)]
pub enum TraceEvent {
    Started {
        start_block: u64,
        end_block: u64,
    },
    Matched {
        block: BlockSummary,
        tx: TxSummary,
        call: CallOutcome,
    },
    Progress {
        block_number: u64,
    },
    Failed {
        error: ChainError,
        block_number: Option<u64>,
    },
    Finished,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Started,
    Matched,
    Progress,
    Failed,
    Finished,
}

impl TraceEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            TraceEvent::Started { .. } => EventKind::Started,
            TraceEvent::Matched { .. } => EventKind::Matched,
            TraceEvent::Progress { .. } => EventKind::Progress,
            TraceEvent::Failed { .. } => EventKind::Failed,
            TraceEvent::Finished => EventKind::Finished,
        }
    }

    /// Block the event refers to, if any.
    pub fn block_number(&self) -> Option<u64> {
        match self {
            TraceEvent::Matched { block, .. } => Some(block.number),
            TraceEvent::Progress { block_number } => Some(*block_number),
            TraceEvent::Failed { block_number, .. } => *block_number,
            TraceEvent::Started { .. } | TraceEvent::Finished => None,
        }
    }
}

/// Receiving side of a scan. Events arrive in block order and the stream
/// ends right after `Finished`.
#[derive(Debug)]
pub struct EventStream {
    rx: mpsc::Receiver<TraceEvent>,
}

impl EventStream {
    pub(crate) fn channel(capacity: usize) -> (mpsc::Sender<TraceEvent>, EventStream) {
        let (tx, rx) = mpsc::channel(capacity);
        (tx, EventStream { rx })
    }

    pub async fn recv(&mut self) -> Option<TraceEvent> {
        self.rx.recv().await
    }

    /// Drains the stream until the scanner hangs up.
    pub async fn collect(mut self) -> Vec<TraceEvent> {
        let mut events = Vec::new();
        while let Some(event) = self.rx.recv().await {
            events.push(event);
        }
        events
    }
}

type Handler = Box<dyn FnMut(&TraceEvent) + Send>;

/// Routes events to handlers registered per event kind. Handlers for one
/// kind run in registration order.
#[derive(Default)]
pub struct EventDispatcher {
    handlers: HashMap<EventKind, Vec<Handler>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(mut self, kind: EventKind, handler: impl FnMut(&TraceEvent) + Send + 'static) -> Self {
        self.handlers.entry(kind).or_default().push(Box::new(handler));
        self
    }

    /// Consumes the stream, returning how many events were seen.
    pub async fn run(mut self, mut stream: EventStream) -> usize {
        let mut seen = 0;
        while let Some(event) = stream.recv().await {
            seen += 1;
            if let Some(handlers) = self.handlers.get_mut(&event.kind()) {
                for handler in handlers.iter_mut() {
                    handler(&event);
                }
            }
        }
        seen
    }
}
