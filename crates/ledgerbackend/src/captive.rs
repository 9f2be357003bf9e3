//! The captive backend facade.

use std::path::PathBuf;

use async_trait::async_trait;
use stellar_xdr::curr::LedgerCloseMeta;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::warn;

use captive_core_history::{first_replayable_ledger, HistoryArchive};

use crate::error::{BackendError, Result};
use crate::gate::SequenceGate;
use crate::pump::{MetaPump, MetaResult};
use crate::runner::{CoreRunner, StellarCoreRunner};
use crate::{
    ledger_sequence, LedgerBackend, LEDGERS_PER_PROCESS, NUM_CHECKPOINTS_LEEWAY,
    READ_AHEAD_BUFFER_SIZE,
};

/// Streams `LedgerCloseMeta` from a captive stellar-core subprocess.
///
/// The backend is created closed; a subprocess is spawned lazily by
/// [`prepare_range`](CaptiveCore::prepare_range) or by the first
/// [`get_ledger`](CaptiveCore::get_ledger), and killed and respawned when a
/// requested sequence is discontiguous with the current replay window.
///
/// A backend is either doing bulk offline replay or tracking the network as
/// it closes ledgers online, distinguished by `last_ledger`: `None` in the
/// online case (no end to the subprocess), `Some` in the offline case (the
/// subprocess is closed after yielding the last ledger of the segment).
/// Only offline replay is driven to completion today.
///
/// Exactly one consumer may drive a backend; concurrent calls into the same
/// instance are not supported.
pub struct CaptiveCore<R: CoreRunner = StellarCoreRunner> {
    network_passphrase: String,
    history_urls: Vec<String>,
    /// End of the current replay segment; `None` when tracking online.
    last_ledger: Option<u32>,
    gate: SequenceGate,
    /// Most recently returned record, serving idempotent re-reads.
    cached_meta: Option<Box<LedgerCloseMeta>>,
    runner: R,
    meta_rx: Option<mpsc::Receiver<MetaResult>>,
    stop_tx: Option<watch::Sender<bool>>,
    pump_join: Option<JoinHandle<()>>,
}

impl CaptiveCore<StellarCoreRunner> {
    /// Create a backend that is not yet running. `history_urls` must name at
    /// least one archive; the first is used for the latest-ledger advisory
    /// and all of them are offered to the child.
    pub fn new(
        executable_path: impl Into<PathBuf>,
        network_passphrase: &str,
        history_urls: Vec<String>,
    ) -> Self {
        let runner = StellarCoreRunner::new(
            executable_path,
            network_passphrase,
            history_urls.clone(),
        );
        Self::with_runner(runner, network_passphrase, history_urls)
    }
}

impl<R: CoreRunner> CaptiveCore<R> {
    /// Create a backend over an explicit runner. This is the seam tests use
    /// to substitute an in-memory subprocess.
    pub fn with_runner(
        runner: R,
        network_passphrase: impl Into<String>,
        history_urls: Vec<String>,
    ) -> Self {
        Self {
            network_passphrase: network_passphrase.into(),
            history_urls,
            last_ledger: None,
            gate: SequenceGate::default(),
            cached_meta: None,
            runner,
            meta_rx: None,
            stop_tx: None,
            pump_join: None,
        }
    }

    /// The passphrase of the network this backend replays.
    pub fn network_passphrase(&self) -> &str {
        &self.network_passphrase
    }

    /// Whether the backend has no live subprocess and no live pump.
    pub fn is_closed(&self) -> bool {
        self.gate.is_closed()
    }

    /// Whether the backend is replaying a bounded segment.
    pub fn is_in_offline_replay_mode(&self) -> bool {
        self.last_ledger.is_some()
    }

    /// Whether the backend is tracking the network with no terminal ledger.
    pub fn is_in_online_tracking_mode(&self) -> bool {
        self.last_ledger.is_none()
    }

    /// The latest ledger the first configured archive knows about.
    pub async fn get_latest_ledger_sequence(&self) -> Result<u32> {
        let url = self
            .history_urls
            .first()
            .ok_or_else(|| BackendError::Setup("no history archive URLs configured".into()))?;
        let archive = HistoryArchive::new(url)?;
        let has = archive.get_root_has().await?;
        Ok(has.current_ledger())
    }

    /// Make `[from, to]` ready: upon success the next `get_ledger(from)`
    /// returns without further setup.
    ///
    /// Reading ledger `from - 1` and discarding it confirms the range is
    /// ready, which makes ledger 1 impossible to retrieve through this
    /// backend.
    pub async fn prepare_range(&mut self, from: u32, to: u32) -> Result<()> {
        if from == 0 {
            return Err(BackendError::Setup(
                "cannot prepare a range starting at ledger 0".into(),
            ));
        }
        self.open_offline_replay_subprocess(from - 1, to).await?;
        self.get_ledger(from - 1).await?;
        Ok(())
    }

    /// The record for `sequence`.
    ///
    /// Callers are assumed to ask for ledgers in ascending order. When asked
    /// for a ledger the live subprocess has not reached but is within ten
    /// checkpoints of, the intervening records are skipped transparently;
    /// anything farther away tears the subprocess down and starts a fresh
    /// one at the requested sequence. Repeating the previous request
    /// returns the cached record without consuming from the pump.
    pub async fn get_ledger(&mut self, sequence: u32) -> Result<Option<LedgerCloseMeta>> {
        if let Some(cached) = self.cached_meta.as_deref() {
            if ledger_sequence(cached) == sequence {
                return Ok(Some(cached.clone()));
            }
        }

        // First, if we're open but out of range for the request, close.
        if !self.is_closed() && !self.gate.within_checkpoints(sequence, NUM_CHECKPOINTS_LEEWAY) {
            self.close().await?;
        }

        // Next, if we're closed, open.
        if self.is_closed() {
            self.open_offline_replay_subprocess(
                sequence,
                sequence.saturating_add(LEDGERS_PER_PROCESS),
            )
            .await?;
        }

        // Check that the subprocess is where we expect it to be. This guards
        // internal bookkeeping, not record-level discontiguity.
        if !self.gate.within_checkpoints(sequence, 1) {
            self.best_effort_close().await;
            return Err(BackendError::UnexpectedNextLedger);
        }

        // Pull records along the range until the requested one arrives.
        let err = loop {
            let received = match self.meta_rx.as_mut() {
                Some(rx) => rx.recv().await,
                None => break BackendError::State("metadata channel missing".into()),
            };
            let meta = match received {
                Some(Ok(meta)) => meta,
                Some(Err(e)) => break e,
                None => {
                    break BackendError::State(
                        "metadata channel closed before the requested ledger".into(),
                    )
                }
            };

            let seq = ledger_sequence(&meta);
            if let Err(e) = self.gate.deliver(seq) {
                break e;
            }

            if seq == sequence {
                let cached = self.cached_meta.insert(meta);
                let found = cached.as_ref().clone();
                // After the last ledger in a segment, close before
                // returning. The record was delivered, so a close failure
                // here is only worth a warning.
                if self.last_ledger == Some(seq) {
                    self.best_effort_close().await;
                }
                return Ok(Some(found));
            }
            // A warm-up record prior to the requested one: keep pulling.
        };

        self.best_effort_close().await;
        Err(err)
    }

    /// Release the subprocess, the pump, and the channels. Idempotent.
    pub async fn close(&mut self) -> Result<()> {
        if self.is_closed() {
            return Ok(());
        }
        self.gate.close();

        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(true);
            // Discard one pending message so a pump blocked mid-send can
            // observe the stop signal.
            if let Some(rx) = self.meta_rx.as_mut() {
                let _ = rx.try_recv();
            }
            // Do not drop the channel until the pump is done.
            if let Some(join) = self.pump_join.take() {
                if let Err(e) = join.await {
                    warn!(error = %e, "read-ahead pump task failed");
                }
            }
            self.meta_rx = None;
        }

        self.last_ledger = None;
        self.runner.close().await
    }

    /// Kill and restart bookkeeping for a bounded replay of
    /// `[checkpoint start of from, to]`, clamped to the archive's latest.
    async fn open_offline_replay_subprocess(&mut self, from: u32, to: u32) -> Result<()> {
        self.close().await?;

        let max_ledger = self.get_latest_ledger_sequence().await?;
        if from > max_ledger {
            return Err(BackendError::BeyondLatest {
                requested: from,
                max: max_ledger,
            });
        }
        let to = to.min(max_ledger);

        self.runner.run(from, to).await?;
        let pipe = match self.runner.take_meta_pipe() {
            Some(pipe) => pipe,
            None => {
                // The gate is not open yet, so release the child directly.
                if let Err(e) = self.runner.close().await {
                    warn!(error = %e, "error closing subprocess without a pipe");
                }
                return Err(BackendError::MissingMetaPipe);
            }
        };

        // The next ledger is the first one the child will replay: the start
        // of the checkpoint containing the request.
        self.gate.open_at(first_replayable_ledger(from));
        self.last_ledger = Some(to);

        let (tx, rx) = mpsc::channel(READ_AHEAD_BUFFER_SIZE);
        let (stop_tx, stop_rx) = watch::channel(false);
        self.pump_join = Some(MetaPump::new(pipe, tx, stop_rx, Some(to)).spawn());
        self.meta_rx = Some(rx);
        self.stop_tx = Some(stop_tx);
        Ok(())
    }

    /// Close, downgrading a close failure to a warning. Used where another
    /// outcome (an error being surfaced, a record being returned) must not
    /// be displaced by a teardown problem.
    async fn best_effort_close(&mut self) {
        if let Err(e) = self.close().await {
            warn!(error = %e, "error closing captive backend");
        }
    }
}

#[async_trait]
impl<R: CoreRunner> LedgerBackend for CaptiveCore<R> {
    async fn get_latest_ledger_sequence(&mut self) -> Result<u32> {
        CaptiveCore::get_latest_ledger_sequence(self).await
    }

    async fn prepare_range(&mut self, from: u32, to: u32) -> Result<()> {
        CaptiveCore::prepare_range(self, from, to).await
    }

    async fn get_ledger(&mut self, sequence: u32) -> Result<Option<LedgerCloseMeta>> {
        CaptiveCore::get_ledger(self, sequence).await
    }

    async fn close(&mut self) -> Result<()> {
        CaptiveCore::close(self).await
    }
}
