//! Edge-trigger debouncing.
//!
//! A mechanical switch produces a burst of edges for one press. Each input
//! source owns a [`DebounceGate`] that lets the first edge through and drops
//! every further edge until the refractory window has elapsed. Dropped edges
//! are lost, never queued.

use std::time::{Duration, Instant};

/// Default refractory window for the clock's push buttons.
pub const DEFAULT_REFRACTORY: Duration = Duration::from_millis(200);

/// Refractory gate for a single input source.
#[derive(Debug, Clone)]
pub struct DebounceGate {
    /// When the gate last let an edge through
    last_fired: Option<Instant>,
    /// Minimum spacing between two accepted edges
    refractory: Duration,
}

impl DebounceGate {
    /// Create a gate with the given refractory window.
    pub fn new(refractory: Duration) -> Self {
        Self {
            last_fired: None,
            refractory,
        }
    }

    /// Get the time of the last accepted edge.
    #[cfg(test)]
    pub fn last_fired(&self) -> Option<Instant> {
        self.last_fired
    }

    /// Decide whether an edge arriving at `now` should fire.
    ///
    /// Returns `true` and records `now` when no edge has fired yet or the
    /// refractory window has elapsed since the last accepted one.
    pub fn should_fire_at(&mut self, now: Instant) -> bool {
        let open = match self.last_fired {
            Some(last) => now.saturating_duration_since(last) >= self.refractory,
            None => true,
        };

        if open {
            self.last_fired = Some(now);
        }
        open
    }
}

impl Default for DebounceGate {
    fn default() -> Self {
        Self::new(DEFAULT_REFRACTORY)
    }
}
