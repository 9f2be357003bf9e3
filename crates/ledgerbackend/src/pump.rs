//! The read-ahead pump: a background task that decodes framed records off
//! the subprocess pipe and pushes them onto a bounded channel.
//!
//! The channel's small capacity is the backpressure mechanism: once it is
//! full the pump stops reading, the pipe fills, and the child's writes
//! block, so the amount of undelivered metadata in memory stays bounded.

use std::io;
use std::time::{Duration, Instant};

use stellar_xdr::curr::LedgerCloseMeta;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::debug;

use captive_core_common::XdrFramedReader;

use crate::error::BackendError;
use crate::runner::MetaPipe;
use crate::{ledger_sequence, READ_AHEAD_BUFFER_SIZE};

/// One decoded record, or the error that ended decoding. Exactly one
/// message carrying an error is sent, and it is always the last.
pub(crate) type MetaResult = Result<Box<LedgerCloseMeta>, BackendError>;

/// Interval between read-ahead buffer occupancy traces.
const OCCUPANCY_TRACE_INTERVAL: Duration = Duration::from_secs(5);

pub(crate) struct MetaPump {
    reader: XdrFramedReader<MetaPipe>,
    tx: mpsc::Sender<MetaResult>,
    stop: watch::Receiver<bool>,
    /// Exit after emitting this sequence. `None` means the pump never
    /// self-terminates (online tracking).
    until: Option<u32>,
}

impl MetaPump {
    pub fn new(
        pipe: MetaPipe,
        tx: mpsc::Sender<MetaResult>,
        stop: watch::Receiver<bool>,
        until: Option<u32>,
    ) -> Self {
        Self {
            reader: XdrFramedReader::new(pipe),
            tx,
            stop,
            until,
        }
    }

    /// Run the pump on its own task. The handle completes once the pump has
    /// observed the stop signal, the terminal sequence, or an error.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    async fn run(mut self) {
        let mut last_trace = Instant::now();
        loop {
            if last_trace.elapsed() >= OCCUPANCY_TRACE_INTERVAL {
                debug!(
                    occupied = READ_AHEAD_BUFFER_SIZE - self.tx.capacity(),
                    "read-ahead buffer occupation"
                );
                last_trace = Instant::now();
            }

            let read = tokio::select! {
                _ = self.stop.changed() => return,
                read = Self::read_meta(&mut self.reader) => read,
            };

            match read {
                Ok(meta) => {
                    let seq = ledger_sequence(&meta);
                    if !self.send(Ok(meta)).await {
                        return;
                    }
                    if matches!(self.until, Some(until) if seq >= until) {
                        return;
                    }
                }
                Err(err) => {
                    // Best effort: the consumer may already be gone.
                    self.send(Err(err)).await;
                    return;
                }
            }
        }
    }

    /// Decode one record, mapping stream conditions onto the backend error
    /// taxonomy.
    async fn read_meta(
        reader: &mut XdrFramedReader<MetaPipe>,
    ) -> Result<Box<LedgerCloseMeta>, BackendError> {
        match reader.read_one::<LedgerCloseMeta>().await {
            Ok(Some(meta)) => Ok(Box::new(meta)),
            Ok(None) => Err(BackendError::SubprocessEof),
            Err(e)
                if matches!(
                    e.kind(),
                    io::ErrorKind::UnexpectedEof | io::ErrorKind::InvalidData
                ) =>
            {
                Err(BackendError::Decode(e.to_string()))
            }
            Err(e) => Err(BackendError::Io(e)),
        }
    }

    /// Send a result, yielding to the stop signal. Returns `false` when the
    /// pump must exit: the stop signal fired first or the consumer dropped
    /// the channel.
    async fn send(&mut self, result: MetaResult) -> bool {
        tokio::select! {
            _ = self.stop.changed() => false,
            sent = self.tx.send(result) => sent.is_ok(),
        }
    }
}
