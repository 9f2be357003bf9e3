//! Ledger-sequence gating.

use captive_core_history::CHECKPOINT_FREQUENCY;
use parking_lot::Mutex;

use crate::error::BackendError;

/// Tracks the next ledger sequence expected from the subprocess and
/// enforces strict +1 progression on delivery.
///
/// The value `0` is the closed sentinel: no live subprocess and no live
/// pump. The mutex makes the open/closed predicate and the
/// compare-and-advance on delivery safe to observe from either side of the
/// read-ahead channel.
#[derive(Debug, Default)]
pub(crate) struct SequenceGate {
    next: Mutex<u32>,
}

impl SequenceGate {
    /// Whether the gate is in the closed state.
    pub fn is_closed(&self) -> bool {
        *self.next.lock() == 0
    }

    /// Open the gate expecting `seq` as the first delivery.
    pub fn open_at(&self, seq: u32) {
        *self.next.lock() = seq;
    }

    /// Return the gate to the closed state.
    pub fn close(&self) {
        *self.next.lock() = 0;
    }

    /// True iff `seq` is at or after the next expected ledger (so it will be
    /// read eventually) and no more than `checkpoints` checkpoints ahead of
    /// it (so it will not be too long before it is read).
    pub fn within_checkpoints(&self, seq: u32, checkpoints: u32) -> bool {
        let next = *self.next.lock();
        next <= seq && seq <= next + checkpoints * CHECKPOINT_FREQUENCY
    }

    /// Record delivery of `seq`, which must be exactly the expected next
    /// ledger; the expectation then advances by one atomically with the
    /// delivery.
    pub fn deliver(&self, seq: u32) -> Result<(), BackendError> {
        let mut next = self.next.lock();
        if seq != *next {
            return Err(BackendError::UnexpectedLedger {
                expected: *next,
                actual: seq,
            });
        }
        *next += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starts_closed() {
        let gate = SequenceGate::default();
        assert!(gate.is_closed());
    }

    #[test]
    fn test_open_close_cycle() {
        let gate = SequenceGate::default();
        gate.open_at(64);
        assert!(!gate.is_closed());
        gate.close();
        assert!(gate.is_closed());
    }

    #[test]
    fn test_deliver_advances_in_order() {
        let gate = SequenceGate::default();
        gate.open_at(100);
        for seq in 100..110 {
            gate.deliver(seq).unwrap();
        }
        assert!(gate.within_checkpoints(110, 0));
    }

    #[test]
    fn test_deliver_rejects_gap() {
        let gate = SequenceGate::default();
        gate.open_at(124);
        let err = gate.deliver(125).unwrap_err();
        assert_eq!(
            err.to_string(),
            "unexpected ledger (expected=124 actual=125)"
        );
        // The expectation is unchanged after a rejected delivery.
        gate.deliver(124).unwrap();
    }

    #[test]
    fn test_within_checkpoints_window() {
        let gate = SequenceGate::default();
        gate.open_at(151);
        assert!(gate.within_checkpoints(151, 1));
        assert!(gate.within_checkpoints(151 + 64, 1));
        assert!(!gate.within_checkpoints(151 + 65, 1));
        assert!(!gate.within_checkpoints(150, 1));
        // Ten checkpoints of leeway reaches 791 but not 900.
        assert!(gate.within_checkpoints(791, 10));
        assert!(!gate.within_checkpoints(900, 10));
    }
}
