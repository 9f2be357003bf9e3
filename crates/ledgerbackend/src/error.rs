//! Error types for the captive backend.
//!
//! Every error returned from [`CaptiveCore`](crate::CaptiveCore) leaves the
//! backend closed and reusable: the caller may retry with a fresh
//! `prepare_range`. Nothing is retried internally.

use captive_core_history::HistoryError;
use thiserror::Error;

/// Result type for backend operations.
pub type Result<T> = std::result::Result<T, BackendError>;

/// Errors that can occur while streaming ledgers from a captive core.
#[derive(Debug, Error)]
pub enum BackendError {
    /// Failed to spawn or configure the subprocess.
    #[error("setup failed: {0}")]
    Setup(String),

    /// The requested sequence is past the latest ledger the archive knows.
    #[error("sequence {requested} greater than max available {max}")]
    BeyondLatest {
        /// The sequence that was requested.
        requested: u32,
        /// The latest ledger the archive reported.
        max: u32,
    },

    /// The archive query failed.
    #[error("archive error: {0}")]
    Archive(#[from] HistoryError),

    /// The subprocess closed its metadata stream.
    #[error("got EOF from subprocess")]
    SubprocessEof,

    /// A framed record was malformed or truncated.
    #[error("unmarshalling framed LedgerCloseMeta: {0}")]
    Decode(String),

    /// A record arrived out of order: the stream is discontiguous.
    #[error("unexpected ledger (expected={expected} actual={actual})")]
    UnexpectedLedger {
        /// The sequence the gate expected next.
        expected: u32,
        /// The sequence that actually arrived.
        actual: u32,
    },

    /// The live subprocess cannot reach the requested sequence.
    #[error("unexpected subprocess next-ledger")]
    UnexpectedNextLedger,

    /// The subprocess has no metadata pipe.
    #[error("missing metadata pipe")]
    MissingMetaPipe,

    /// The backend's internal plumbing is in an impossible state.
    #[error("backend state error: {0}")]
    State(String),

    /// The subprocess could not be terminated or reaped.
    #[error("error closing subprocess: {0}")]
    Close(String),

    /// I/O error reading the metadata pipe.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
