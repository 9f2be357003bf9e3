//! History archive access for rs-captive-core.
//!
//! A Stellar history archive is a static HTTPS file tree published by
//! validators. This crate covers the two pieces the captive backend needs:
//!
//! - Fetching the root History Archive State (HAS) document, whose
//!   `currentLedger` field is the network's latest-known-ledger advisory
//! - Checkpoint arithmetic: history is organized into checkpoints of 64
//!   consecutive ledgers, and a replaying core can only start at a
//!   checkpoint boundary
//!
//! ## Usage
//!
//! ```no_run
//! use captive_core_history::HistoryArchive;
//!
//! # async fn example() -> Result<(), captive_core_history::HistoryError> {
//! let archive = HistoryArchive::new(
//!     "https://history.stellar.org/prd/core-testnet/core_testnet_001",
//! )?;
//! let has = archive.get_root_has().await?;
//! println!("Current ledger: {}", has.current_ledger());
//! # Ok(())
//! # }
//! ```

pub mod archive;
pub mod archive_state;
pub mod checkpoint;
pub mod error;

pub use archive::HistoryArchive;
pub use archive_state::HistoryArchiveState;
pub use checkpoint::{
    checkpoint_containing, checkpoint_start, first_replayable_ledger, is_checkpoint_ledger,
    CHECKPOINT_FREQUENCY,
};
pub use error::HistoryError;

/// Result type for history operations.
pub type Result<T> = std::result::Result<T, HistoryError>;
