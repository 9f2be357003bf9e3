//! Captive stellar-core ledger streaming backend.
//!
//! This crate streams a contiguous sequence of [`LedgerCloseMeta`] records
//! out of a stellar-core executable spawned as a child process. The child is
//! treated as an oracle: it is started over a requested ledger range, its
//! framed stdout records are decoded by a background pump into a small
//! read-ahead buffer, and a single consumer polls them out ledger by ledger
//! in strict ascending order.
//!
//! The entry point is [`CaptiveCore`]:
//!
//! ```no_run
//! use captive_core_ledgerbackend::CaptiveCore;
//!
//! # async fn example() -> Result<(), captive_core_ledgerbackend::BackendError> {
//! let mut backend = CaptiveCore::new(
//!     "stellar-core",
//!     "Test SDF Network ; September 2015",
//!     vec!["https://history.stellar.org/prd/core-testnet/core_testnet_001".into()],
//! );
//!
//! backend.prepare_range(100, 200).await?;
//! for seq in 100..=200 {
//!     let meta = backend.get_ledger(seq).await?;
//!     println!("got ledger {seq}: {}", meta.is_some());
//! }
//! backend.close().await?;
//! # Ok(())
//! # }
//! ```
//!
//! Access is strictly ascending. Requests outside the live subprocess's
//! replay window kill the child and respawn it over a fresh range; requests
//! for the most recently returned sequence are served from a one-record
//! cache.

mod captive;
mod gate;
mod pump;

pub mod error;
pub mod runner;

use async_trait::async_trait;
use stellar_xdr::curr::LedgerCloseMeta;

pub use captive::CaptiveCore;
pub use error::BackendError;
pub use runner::{CoreRunner, MetaPipe, StellarCoreRunner};

use error::Result;

/// Ledgers replayed per subprocess incarnation: 24 hours worth of ledgers
/// at 5 second close intervals.
pub const LEDGERS_PER_PROCESS: u32 = 17_280;

/// The number of checkpoints we're willing to scan over and ignore, without
/// restarting a subprocess.
pub const NUM_CHECKPOINTS_LEEWAY: u32 = 10;

/// Capacity of the pump-to-consumer channel. The child's pipe writes block
/// once this many records are buffered, which bounds memory use.
pub const READ_AHEAD_BUFFER_SIZE: usize = 2;

/// A source of closed-ledger metadata records.
///
/// The captive implementation is [`CaptiveCore`]; tests substitute
/// in-memory fakes. Nothing on the hot path requires dynamic dispatch, but
/// the trait lets the surrounding system hold either implementation.
#[async_trait]
pub trait LedgerBackend: Send {
    /// The latest ledger known to the backend's data source.
    async fn get_latest_ledger_sequence(&mut self) -> Result<u32>;

    /// Make the inclusive range `[from, to]` ready, so that the next
    /// `get_ledger(from)` returns without further setup.
    async fn prepare_range(&mut self, from: u32, to: u32) -> Result<()>;

    /// The record for `sequence`, or `None` if the backend cannot serve it.
    /// Requests must arrive in ascending order.
    async fn get_ledger(&mut self, sequence: u32) -> Result<Option<LedgerCloseMeta>>;

    /// Release the subprocess and all buffers. Idempotent.
    async fn close(&mut self) -> Result<()>;
}

/// Sequence number of a [`LedgerCloseMeta`], across meta versions.
pub fn ledger_sequence(meta: &LedgerCloseMeta) -> u32 {
    match meta {
        LedgerCloseMeta::V0(m) => m.ledger_header.header.ledger_seq,
        LedgerCloseMeta::V1(m) => m.ledger_header.header.ledger_seq,
        LedgerCloseMeta::V2(m) => m.ledger_header.header.ledger_seq,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stellar_xdr::curr::{LedgerCloseMetaV0, LedgerCloseMetaV1};

    #[test]
    fn test_ledger_sequence_across_versions() {
        let mut v0 = LedgerCloseMetaV0::default();
        v0.ledger_header.header.ledger_seq = 17;
        assert_eq!(ledger_sequence(&LedgerCloseMeta::V0(v0)), 17);

        let mut v1 = LedgerCloseMetaV1::default();
        v1.ledger_header.header.ledger_seq = 23;
        assert_eq!(ledger_sequence(&LedgerCloseMeta::V1(v1)), 23);
    }
}
