//! Lamport clock primitives.
//!
//! A Lamport clock is a monotonically increasing logical counter that orders
//! events across replicas sharing no wall clock. Observing a remote value
//! must *witness* it: the local counter jumps to at least the observed value,
//! so every later sample sorts after everything already seen.
//!
//! Two process-wide clocks exist, one for bug creation and one for edits.
//! They live inside the store (which owns their serialization and locking),
//! not in the bugs themselves.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A single Lamport clock value.
///
/// Values give a causal partial order: `a < b` means `a` could not have
/// observed `b`. Equal values are concurrent.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct LamportTime(pub u64);

impl LamportTime {
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for LamportTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The counter itself. Not thread-safe on its own: the owning store wraps it
/// in its lock together with the persistence of the current value.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LamportClock {
    counter: u64,
}

impl LamportClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resume a clock from a persisted value.
    pub fn with_time(time: LamportTime) -> Self {
        Self { counter: time.0 }
    }

    /// The last sampled value. Does not advance the clock.
    pub fn time(&self) -> LamportTime {
        LamportTime(self.counter)
    }

    /// Advance the clock and return the new value.
    pub fn increment(&mut self) -> LamportTime {
        self.counter += 1;
        LamportTime(self.counter)
    }

    /// Witness an observed value: every subsequent [`increment`] returns at
    /// least `time + 1`.
    ///
    /// [`increment`]: LamportClock::increment
    pub fn witness(&mut self, time: LamportTime) {
        if time.0 > self.counter {
            self.counter = time.0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn increment_is_strictly_monotonic() {
        let mut clock = LamportClock::new();
        let a = clock.increment();
        let b = clock.increment();
        assert_eq!(a, LamportTime(1));
        assert_eq!(b, LamportTime(2));
        assert!(a < b);
    }

    #[test]
    fn witness_advances_past_observed_value() {
        let mut clock = LamportClock::new();
        clock.increment();
        clock.witness(LamportTime(41));
        assert_eq!(clock.increment(), LamportTime(42));
    }

    #[test]
    fn witness_never_rewinds() {
        let mut clock = LamportClock::with_time(LamportTime(10));
        clock.witness(LamportTime(3));
        assert_eq!(clock.time(), LamportTime(10));
        assert_eq!(clock.increment(), LamportTime(11));
    }
}
