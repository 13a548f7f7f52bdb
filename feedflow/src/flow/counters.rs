//! Per-flow outcome counters.

use serde::{Deserialize, Serialize};
use std::ops::AddAssign;
use std::sync::atomic::{AtomicU64, Ordering};

/// Five monotonically increasing counters owned by a flow.
///
/// Written by the executor task and drained by the scheduler; all access is
/// atomic.
#[derive(Debug, Default)]
pub struct FlowCounters {
    received: AtomicU64,
    sent: AtomicU64,
    errored: AtomicU64,
    expired: AtomicU64,
    no_data: AtomicU64,
}

impl FlowCounters {
    /// Creates zeroed counters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds fetched records.
    pub fn add_received(&self, n: u64) {
        self.received.fetch_add(n, Ordering::Relaxed);
    }

    /// Adds delivered records.
    pub fn add_sent(&self, n: u64) {
        self.sent.fetch_add(n, Ordering::Relaxed);
    }

    /// Counts one error.
    pub fn inc_errored(&self) {
        self.errored.fetch_add(1, Ordering::Relaxed);
    }

    /// Counts one expired-source fetch.
    pub fn inc_expired(&self) {
        self.expired.fetch_add(1, Ordering::Relaxed);
    }

    /// Counts one empty fetch.
    pub fn inc_no_data(&self) {
        self.no_data.fetch_add(1, Ordering::Relaxed);
    }

    /// Reads the current values without resetting them.
    #[must_use]
    pub fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            received: self.received.load(Ordering::Relaxed),
            sent: self.sent.load(Ordering::Relaxed),
            errored: self.errored.load(Ordering::Relaxed),
            expired: self.expired.load(Ordering::Relaxed),
            no_data: self.no_data.load(Ordering::Relaxed),
        }
    }

    /// Swaps every counter to zero and returns what was accumulated.
    ///
    /// Increments racing with a drain land either in the returned snapshot
    /// or in the next one, never in neither.
    pub fn drain(&self) -> CounterSnapshot {
        CounterSnapshot {
            received: self.received.swap(0, Ordering::AcqRel),
            sent: self.sent.swap(0, Ordering::AcqRel),
            errored: self.errored.swap(0, Ordering::AcqRel),
            expired: self.expired.swap(0, Ordering::AcqRel),
            no_data: self.no_data.swap(0, Ordering::AcqRel),
        }
    }
}

/// Point-in-time copy of [`FlowCounters`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterSnapshot {
    /// Records fetched.
    pub received: u64,
    /// Records delivered.
    pub sent: u64,
    /// Fatal or soft errors.
    pub errored: u64,
    /// Fetches that reported expired sources.
    pub expired: u64,
    /// Fetches that returned nothing.
    pub no_data: u64,
}

impl CounterSnapshot {
    /// Returns true if every counter is zero.
    #[must_use]
    pub fn is_zero(&self) -> bool {
        *self == Self::default()
    }
}

impl AddAssign for CounterSnapshot {
    fn add_assign(&mut self, rhs: Self) {
        self.received += rhs.received;
        self.sent += rhs.sent;
        self.errored += rhs.errored;
        self.expired += rhs.expired;
        self.no_data += rhs.no_data;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    #[test]
    fn test_drain_resets() {
        let counters = FlowCounters::new();
        counters.add_received(3);
        counters.add_sent(2);
        counters.inc_errored();
        counters.inc_expired();
        counters.inc_no_data();

        let drained = counters.drain();
        assert_eq!(
            drained,
            CounterSnapshot {
                received: 3,
                sent: 2,
                errored: 1,
                expired: 1,
                no_data: 1,
            }
        );
        assert!(counters.snapshot().is_zero());
    }

    #[test]
    fn test_add_assign() {
        let mut total = CounterSnapshot {
            received: 1,
            ..Default::default()
        };
        total += CounterSnapshot {
            received: 2,
            sent: 4,
            ..Default::default()
        };
        assert_eq!(total.received, 3);
        assert_eq!(total.sent, 4);
    }

    #[test]
    fn test_concurrent_increments_are_not_lost() {
        let counters = Arc::new(FlowCounters::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let c = Arc::clone(&counters);
                std::thread::spawn(move || {
                    for _ in 0..1000 {
                        c.add_received(1);
                    }
                })
            })
            .collect();

        let mut drained = 0;
        for h in handles {
            drained += counters.drain().received;
            h.join().unwrap();
        }
        drained += counters.drain().received;

        assert_eq!(drained, 8000);
    }
}
