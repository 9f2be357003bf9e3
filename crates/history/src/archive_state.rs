//! History Archive State (HAS) parsing.
//!
//! The History Archive State is a JSON document describing the current state
//! of a Stellar history archive. The root instance lives at
//! `.well-known/stellar-history.json`. The captive backend only consumes the
//! `currentLedger` field, but the full document shape is modeled so callers
//! can inspect what the archive reported.

use serde::{Deserialize, Serialize};

use crate::error::HistoryError;

/// History Archive State - the root JSON file describing archive state.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryArchiveState {
    /// Format version (currently 1 or 2).
    pub version: u32,

    /// Server identifier (e.g., "stellar-core 25.0.1").
    #[serde(default)]
    pub server: Option<String>,

    /// Most recent checkpointed ledger sequence.
    pub current_ledger: u32,

    /// Network passphrase, present in version 2 documents.
    #[serde(default)]
    pub network_passphrase: Option<String>,

    /// Bucket list state at the current ledger.
    #[serde(default)]
    pub current_buckets: Vec<BucketLevel>,
}

/// A single level in the bucket list hierarchy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BucketLevel {
    /// Current bucket hash (hex-encoded).
    pub curr: String,

    /// Snapshot bucket hash (hex-encoded).
    pub snap: String,

    /// Next bucket state (async merge tracking).
    #[serde(default)]
    pub next: BucketNext,
}

/// State of the next bucket merge operation at one level.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BucketNext {
    /// Merge state (0 = clear, 1 = output, 2 = inputs).
    pub state: u32,

    /// Output bucket hash if the merge is complete (state == 1).
    #[serde(default)]
    pub output: Option<String>,
}

impl HistoryArchiveState {
    /// Parse a History Archive State from JSON.
    ///
    /// # Examples
    ///
    /// ```
    /// use captive_core_history::archive_state::HistoryArchiveState;
    ///
    /// let json = r#"{
    ///     "version": 2,
    ///     "server": "stellar-core 25.0.1",
    ///     "currentLedger": 12345,
    ///     "networkPassphrase": "Test SDF Network ; September 2015",
    ///     "currentBuckets": []
    /// }"#;
    ///
    /// let has = HistoryArchiveState::from_json(json).unwrap();
    /// assert_eq!(has.current_ledger, 12345);
    /// ```
    pub fn from_json(json: &str) -> Result<Self, HistoryError> {
        serde_json::from_str(json).map_err(HistoryError::Json)
    }

    /// Serialize the History Archive State to JSON.
    pub fn to_json(&self) -> Result<String, HistoryError> {
        serde_json::to_string_pretty(self).map_err(HistoryError::Json)
    }

    /// The most recent checkpointed ledger sequence.
    #[inline]
    pub fn current_ledger(&self) -> u32 {
        self.current_ledger
    }
}
