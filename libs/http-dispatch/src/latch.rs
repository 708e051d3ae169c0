use std::sync::atomic::{AtomicU8, Ordering};

const PENDING: u8 = 0;
const SETTLED: u8 = 1;
const CANCELLED: u8 = 2;

/// Observable state of a dispatch outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettleState {
    Pending,
    /// Transport path produced the outcome (response or error)
    Settled,
    /// Cancellation produced the outcome
    Cancelled,
}

/// Once-only settlement guard
///
/// Transport completion and cancellation both try to claim the latch; only
/// the first transition away from `Pending` succeeds.
#[derive(Debug, Default)]
pub struct SettleLatch {
    state: AtomicU8,
}

impl SettleLatch {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the latch for the transport path
    #[must_use]
    pub fn try_settle(&self) -> bool {
        self.transition(SETTLED)
    }

    /// Claim the latch for the cancellation path
    #[must_use]
    pub fn try_cancel(&self) -> bool {
        self.transition(CANCELLED)
    }

    #[must_use]
    pub fn state(&self) -> SettleState {
        match self.state.load(Ordering::Acquire) {
            SETTLED => SettleState::Settled,
            CANCELLED => SettleState::Cancelled,
            _ => SettleState::Pending,
        }
    }

    fn transition(&self, to: u8) -> bool {
        self.state
            .compare_exchange(PENDING, to, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_settle_then_cancel_is_noop() {
        let latch = SettleLatch::new();
        assert_eq!(latch.state(), SettleState::Pending);
        assert!(latch.try_settle());
        assert!(!latch.try_cancel());
        assert_eq!(latch.state(), SettleState::Settled);
    }

    #[test]
    fn test_cancel_then_settle_is_noop() {
        let latch = SettleLatch::new();
        assert!(latch.try_cancel());
        assert!(!latch.try_settle());
        assert!(!latch.try_cancel());
        assert_eq!(latch.state(), SettleState::Cancelled);
    }

    #[test]
    fn test_exactly_one_winner_under_contention() {
        for _ in 0..100 {
            let latch = Arc::new(SettleLatch::new());
            let handles: Vec<_> = (0..8)
                .map(|i| {
                    let latch = Arc::clone(&latch);
                    std::thread::spawn(move || {
                        if i % 2 == 0 {
                            latch.try_settle()
                        } else {
                            latch.try_cancel()
                        }
                    })
                })
                .collect();

            let winners = handles
                .into_iter()
                .map(|h| h.join().unwrap())
                .filter(|won| *won)
                .count();
            assert_eq!(winners, 1);
        }
    }
}
