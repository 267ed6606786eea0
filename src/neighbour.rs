//! Neighbour-cell bookkeeping for the cell-selection engine (spec.md §3,
//! §4.2 "Neighbour monitoring").

/// Up to 6 neighbours are tracked concurrently (`GSM58_NB_NUMBER`).
pub const MAX_MONITORED_NEIGHBOURS: usize = 6;

/// Samples averaged for RLA_C (`RLA_C_NUM`).
pub const RLA_C_NUM: usize = 4;

/// Seconds before a scanned neighbour is re-read (`GSM58_READ_AGAIN`).
pub const READ_AGAIN_SECS: u32 = 300;

/// Seconds before a failed neighbour sync is retried (`GSM58_TRY_AGAIN`).
pub const TRY_AGAIN_SECS: u32 = 30;

/// Debounce before a reselection triggered by a neighbour is actually
/// dispatched (`GSM58_RESEL_THRESHOLD`).
pub const RESEL_THRESHOLD_SECS: u32 = 15;

/// The decoded-frequency "type" bit set when a neighbour ARFCN is recorded,
/// named from the SI message (or hopping sequence) it came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NeighbourType {
    Serving,
    Si2,
    Si2bis,
    Si2ter,
    Si5,
    Si5bis,
    Si5ter,
    Hopping,
}

/// Lifecycle state of a tracked neighbour, per spec.md §3.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NeighbourState {
    /// Just allocated, not yet scanned.
    New,
    /// Synced to but this ARFCN isn't a supported band.
    NotSupported,
    /// Has an averaged RLA_C sample.
    RlaC,
    /// Last sync attempt failed (no FBSB sync).
    NoSync,
    /// Synced but no BCCH data found.
    NoBcch,
    /// Full SysInfo decoded.
    SysInfo,
}

/// One monitored neighbour cell.
#[derive(Debug, Clone)]
pub struct Neighbour {
    pub arfcn: u16,
    /// Rolling sum of the last `RLA_C_NUM` rxlev samples.
    rxlev_sum: u32,
    rxlev_count: u8,
    pub c1: i32,
    pub c2: i32,
    pub checked_for_resel: bool,
    /// Set when this neighbour's reselect priority is deliberately lowered
    /// (e.g. already tried and failed recently).
    pub priority_low: bool,
    pub state: NeighbourState,
    pub created_tick: u64,
    pub last_event_tick: u64,
}

impl Neighbour {
    pub fn new(arfcn: u16, now_tick: u64) -> Self {
        Neighbour {
            arfcn,
            rxlev_sum: 0,
            rxlev_count: 0,
            c1: i32::MIN,
            c2: i32::MIN,
            checked_for_resel: false,
            priority_low: false,
            state: NeighbourState::New,
            created_tick: now_tick,
            last_event_tick: now_tick,
        }
    }

    /// Fold in one rxlev sample, averaging over the most recent
    /// `RLA_C_NUM` samples (spec.md §4.2).
    pub fn add_rxlev_sample(&mut self, rxlev: u8) {
        if self.rxlev_count as usize >= RLA_C_NUM {
            // Once full, treat as a simple moving window by decaying the
            // running sum proportionally before adding the new sample.
            self.rxlev_sum -= self.rxlev_sum / RLA_C_NUM as u32;
        } else {
            self.rxlev_count += 1;
        }
        self.rxlev_sum += rxlev as u32;
    }

    /// The averaged RLA_C rxlev over up to `RLA_C_NUM` samples.
    pub fn rla_c(&self) -> Option<u8> {
        if self.rxlev_count == 0 {
            None
        } else {
            Some((self.rxlev_sum / self.rxlev_count as u32) as u8)
        }
    }

    pub fn needs_rescan(&self, now_tick: u64) -> bool {
        match self.state {
            NeighbourState::SysInfo => {
                now_tick.saturating_sub(self.last_event_tick) >= READ_AGAIN_SECS as u64
            }
            NeighbourState::NoSync | NeighbourState::NoBcch => {
                now_tick.saturating_sub(self.last_event_tick) >= TRY_AGAIN_SECS as u64
            }
            NeighbourState::New => true,
            NeighbourState::NotSupported | NeighbourState::RlaC => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rla_c_averages_last_four_samples() {
        let mut nb = Neighbour::new(100, 0);
        for sample in [10, 20, 30, 40] {
            nb.add_rxlev_sample(sample);
        }
        assert_eq!(nb.rla_c(), Some(25));
    }

    #[test]
    fn rescan_gating_by_state() {
        let mut nb = Neighbour::new(100, 0);
        nb.state = NeighbourState::NoSync;
        nb.last_event_tick = 0;
        assert!(!nb.needs_rescan(10));
        assert!(nb.needs_rescan(TRY_AGAIN_SECS as u64));
    }
}
