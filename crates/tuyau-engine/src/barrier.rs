//! Per-node readiness barrier.
//!
//! A node with N parents must be notified N times before its body runs. The
//! counter starts at `max(N - 1, 0)`; every notification tries to decrement
//! it. A successful decrement means more parents are outstanding. The
//! notification that finds the counter already at zero is the last one, and
//! the thread delivering it runs the body. An admission latch makes sure that
//! only one thread ever gets past the barrier, even if a node is notified
//! more often than it has parents.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// Result of delivering one notification to a [`Barrier`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arrival {
    /// Other parents have not notified yet.
    Waiting,
    /// Last notification; the caller owns the node body.
    Admitted,
    /// Barrier already released to another caller.
    Duplicate,
}

#[derive(Debug, Default)]
pub struct Barrier {
    remaining: AtomicUsize,
    admitted: AtomicBool,
}

impl Barrier {
    pub fn new(parent_count: usize) -> Self {
        Self {
            remaining: AtomicUsize::new(parent_count.saturating_sub(1)),
            admitted: AtomicBool::new(false),
        }
    }

    /// Notifications still needed before the next one is admitted.
    pub fn remaining(&self) -> usize {
        self.remaining.load(Ordering::Acquire)
    }

    /// Deliver one notification.
    pub fn arrive(&self) -> Arrival {
        let decremented = self
            .remaining
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                current.checked_sub(1)
            })
            .is_ok();
        if decremented {
            return Arrival::Waiting;
        }
        if self
            .admitted
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            Arrival::Admitted
        } else {
            Arrival::Duplicate
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_zero_parents_admits_first_notification() {
        let barrier = Barrier::new(0);
        assert_eq!(barrier.arrive(), Arrival::Admitted);
        assert_eq!(barrier.arrive(), Arrival::Duplicate);
    }

    #[test]
    fn test_single_parent() {
        let barrier = Barrier::new(1);
        assert_eq!(barrier.remaining(), 0);
        assert_eq!(barrier.arrive(), Arrival::Admitted);
    }

    #[test]
    fn test_three_parents_admit_on_third() {
        let barrier = Barrier::new(3);
        assert_eq!(barrier.arrive(), Arrival::Waiting);
        assert_eq!(barrier.arrive(), Arrival::Waiting);
        assert_eq!(barrier.arrive(), Arrival::Admitted);
        assert_eq!(barrier.arrive(), Arrival::Duplicate);
    }

    #[test]
    fn test_concurrent_arrivals_admit_exactly_once() {
        let parents = 16;
        let barrier = Arc::new(Barrier::new(parents));
        let handles: Vec<_> = (0..parents)
            .map(|_| {
                let barrier = Arc::clone(&barrier);
                std::thread::spawn(move || barrier.arrive())
            })
            .collect();
        let arrivals: Vec<Arrival> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let admitted = arrivals.iter().filter(|a| **a == Arrival::Admitted).count();
        let waiting = arrivals.iter().filter(|a| **a == Arrival::Waiting).count();
        assert_eq!(admitted, 1);
        assert_eq!(waiting, parents - 1);
    }
}
