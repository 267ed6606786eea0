//! Monotonic timer scheduling, ticked explicitly by the owning [`crate::ms::Ms`]
//! instance rather than reading the wall clock (spec.md §5, §9). This keeps
//! the core deterministic and unit-testable: feed it `tick(dt_secs)` and it
//! tells you which timers fired.

use std::collections::HashMap;

/// Every timer the core schedules, across all components. One
/// `TimerWheel` per MS instance; timers are looked up by this key so a
/// component only ever has at most one instance of each running
/// (spec.md §3 invariant (d): T3212 "never started twice concurrently").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerId {
    // Mobility Management (spec.md §4.5)
    T3210,
    T3211,
    T3212,
    T3213,
    T3220,
    T3230,
    T3240,
    // Radio Resource (spec.md §4.4)
    T3122,
    T3126,
    // Cell selection / neighbour monitoring (spec.md §4.2)
    SyncTimeout,
    NeighbourTryAgain(u16),
    NeighbourReadAgain(u16),
    ReselDebounce,
    // PLMN selection (spec.md §4.3)
    T6mHplmnSearch,
    // GCC/BCC (spec.md §4.6)
    TNoChannel,
    TMmEst,
    TTerm,
    TConnReq,
}

struct Armed {
    remaining: u32,
    period: u32,
}

/// A tick-driven timer wheel. `remaining` and `period` are in whole seconds;
/// sub-second resolution isn't needed by anything this core schedules.
#[derive(Default)]
pub struct TimerWheel {
    armed: HashMap<TimerId, Armed>,
}

impl TimerWheel {
    pub fn new() -> Self {
        TimerWheel {
            armed: HashMap::new(),
        }
    }

    /// Start (or restart) a timer for `secs` seconds. Idempotent in the
    /// sense that restarting simply replaces the previous deadline,
    /// matching how the original source's `start_mm_t*` helpers behave.
    pub fn start(&mut self, id: TimerId, secs: u32) {
        self.armed.insert(
            id,
            Armed {
                remaining: secs,
                period: secs,
            },
        );
    }

    /// Stop a timer. Cancellation is idempotent: stopping an unarmed timer
    /// is a no-op (spec.md §5 "Cancellation is idempotent").
    pub fn stop(&mut self, id: TimerId) {
        self.armed.remove(&id);
    }

    pub fn is_running(&self, id: TimerId) -> bool {
        self.armed.contains_key(&id)
    }

    pub fn remaining(&self, id: TimerId) -> Option<u32> {
        self.armed.get(&id).map(|a| a.remaining)
    }

    /// Restart a running timer with a new period while preserving its
    /// phase: the remaining time is reduced modulo the new period rather
    /// than simply reset. This is T3212's "modulo-reduced on SI3 change"
    /// behaviour (spec.md §3 invariant (d), §4.5 step 2).
    ///
    /// If the timer isn't currently running, this just starts it fresh.
    pub fn restart_preserving_phase(&mut self, id: TimerId, new_period: u32) {
        let new_remaining = match self.armed.get(&id) {
            Some(armed) if new_period > 0 => armed.remaining % new_period,
            _ => new_period,
        };
        self.armed.insert(
            id,
            Armed {
                remaining: new_remaining,
                period: new_period,
            },
        );
    }

    /// Advance all armed timers by `dt_secs` seconds, returning the set of
    /// timers that expired this tick (in no particular order — callers that
    /// care about ordering should only ever have one such timer armed at a
    /// time, which is true of every timer in this core).
    pub fn tick(&mut self, dt_secs: u32) -> Vec<TimerId> {
        let mut expired = Vec::new();
        self.armed.retain(|id, armed| {
            if armed.remaining <= dt_secs {
                expired.push(*id);
                false
            } else {
                armed.remaining -= dt_secs;
                true
            }
        });
        expired
    }

    /// Stop every running timer (spec.md §7 "Fatal: power-down ... stops
    /// all timers").
    pub fn stop_all(&mut self) {
        self.armed.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timer_expires_after_its_duration() {
        let mut wheel = TimerWheel::new();
        wheel.start(TimerId::T3210, 20);
        assert!(wheel.tick(19).is_empty());
        assert_eq!(wheel.tick(1), vec![TimerId::T3210]);
        assert!(!wheel.is_running(TimerId::T3210));
    }

    #[test]
    fn stop_is_idempotent() {
        let mut wheel = TimerWheel::new();
        wheel.stop(TimerId::T3211);
        wheel.stop(TimerId::T3211);
        assert!(!wheel.is_running(TimerId::T3211));
    }

    #[test]
    fn restart_preserves_phase() {
        let mut wheel = TimerWheel::new();
        wheel.start(TimerId::T3212, 100);
        wheel.tick(40); // 60 remaining
        wheel.restart_preserving_phase(TimerId::T3212, 30);
        // 60 % 30 = 0
        assert_eq!(wheel.remaining(TimerId::T3212), Some(0));
    }

    #[test]
    fn restart_preserving_phase_keeps_nonzero_remainder() {
        let mut wheel = TimerWheel::new();
        wheel.start(TimerId::T3212, 100);
        wheel.tick(65); // 35 remaining
        wheel.restart_preserving_phase(TimerId::T3212, 30);
        // 35 % 30 = 5
        assert_eq!(wheel.remaining(TimerId::T3212), Some(5));
    }

    #[test]
    fn stop_all_clears_every_timer() {
        let mut wheel = TimerWheel::new();
        wheel.start(TimerId::T3210, 20);
        wheel.start(TimerId::T3212, 100);
        wheel.stop_all();
        assert!(!wheel.is_running(TimerId::T3210));
        assert!(!wheel.is_running(TimerId::T3212));
    }
}
