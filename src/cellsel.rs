//! Cell-selection engine: the 03.22 CS state machine, C1/C2 criteria,
//! power-scan batching, sync-and-read, and neighbour-triggered reselection
//! (spec.md §4.2).
//!
//! Transitions are expressed as a `match` on `(CsState, CsEvent)`, the
//! "sum type" option spec.md §9 calls out as the clean mapping for the
//! original's `{state-mask, event, handler}` dispatch tables.

use thiserror::Error;

use crate::freqtable::{ArfcnFlags, FreqTable};
use crate::message::{CellSelectionParams, RachControl};
use crate::neighbour::{Neighbour, NeighbourState, MAX_MONITORED_NEIGHBOURS, RESEL_THRESHOLD_SECS};
use crate::subscriber::Lai;

#[derive(Error, Debug)]
pub enum CellSelError {
    #[error("no ARFCN is currently selected")]
    NothingSelected,
    #[error("ARFCN {0} is not present in the frequency table")]
    UnknownArfcn(u16),
    #[error("no suitable cell found")]
    NoCellFound,
}

/// Cell-selection states (spec.md §4.2), abbreviated as in the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CsState {
    C0Null,
    C1NormalSel,
    C2StoredSel,
    C3CampedNormally,
    C4NormalResel,
    C5ChooseCell,
    C6AnyCellSel,
    C7CampedAny,
    C8AnyResel,
    C9ChooseAny,
    Connected1,
    Connected2,
    PlmnSearch,
    HplmnSearch,
    AnySearch,
}

impl CsState {
    /// True in any of the two "camped" states neighbour monitoring and MM's
    /// return-to-idle decision both gate on (spec.md §4.2, §4.5).
    pub fn is_camped(&self) -> bool {
        matches!(self, CsState::C3CampedNormally | CsState::C7CampedAny)
    }

    pub fn is_camped_normally(&self) -> bool {
        matches!(self, CsState::C3CampedNormally)
    }

    pub fn is_connected(&self) -> bool {
        matches!(self, CsState::Connected1 | CsState::Connected2)
    }
}

/// Events the cell-selection engine reacts to.
#[derive(Debug, Clone, PartialEq)]
pub enum CsEvent {
    /// Power-scan batch for one band has finished; results are already in
    /// the frequency table's POWER/SIGNAL flags.
    ScanComplete,
    /// L1 synced to an ARFCN and system information has become sufficient.
    SyncSuccess { index: usize },
    /// L1 failed to sync, or the BCCH timeout fired, for an ARFCN.
    SyncFailure { index: usize },
    /// A neighbour's averaged RLA_C and C2 have just been (re)computed.
    NeighbourMeasured { arfcn: u16 },
    /// Camping's CCCH has been lost.
    LossOfCoverage,
    /// A higher layer (RR) has requested a dedicated channel, leaving idle
    /// mode.
    EnterDedicated,
    /// The dedicated channel has been released, returning to idle mode.
    LeaveDedicated,
    /// PLMN-selection layer asked the CS to search for a specific PLMN
    /// (manual selection) or any PLMN (automatic full search).
    PlmnSearchRequest { target: Option<(u16, u16)> },
    /// The PLMN-selection layer's HPLMN periodic search timer fired.
    HplmnSearchRequest,
    /// No candidate ARFCN survived `select()`.
    NoCellFound,
    /// SIM removed; jump to C0 regardless of current state (spec.md §3
    /// "Supplemented Features" — ALL_STATES transition).
    SimRemoved,
}

/// Outcome of processing one event: the next state plus anything the
/// dispatch loop needs to act on (spec.md §5: "observed on next enqueued
/// event, not within the same dispatch" — so this never recurses).
#[derive(Debug, Clone, PartialEq)]
pub enum CsOutcome {
    Transitioned(CsState),
    Unchanged,
}

/// One scan-batch request: a contiguous block of ARFCN indices sharing the
/// SUPPORT flag (and, in stored/choose-cell states, the BA flag too).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanBatch {
    pub indices: Vec<usize>,
}

/// Per-band scan cap (spec.md §4.2 "power-scan batches"); `None` means
/// `skip_max_per_band` is in effect.
#[derive(Debug, Clone, Copy)]
pub struct ScanLimits {
    pub max_per_band: Option<u32>,
}

impl Default for ScanLimits {
    fn default() -> Self {
        ScanLimits {
            max_per_band: Some(32),
        }
    }
}

/// MS TX power class; used by the C1 formula's `P` term.
#[derive(Debug, Clone, Copy)]
pub struct MsTxPower {
    pub max_output_dbm: u8,
}

/// C1 criterion: `(RLA_C - RXLEV_ACC_MIN) - max(0, MS_TXPWR_MAX_CCH - P)`.
pub fn c1(rla_c: u8, params: &CellSelectionParams, ms_power: &MsTxPower) -> i32 {
    let base = rla_c as i32 - params.rxlev_access_min as i32;
    let power_excess =
        (params.ms_txpwr_max_cch as i32 - ms_power.max_output_dbm as i32).max(0);
    base - power_excess
}

/// Whether a cell passes C1-based suitability, independent of C2
/// reselection weighting (spec.md §4.2: "suitable iff C1 >= 0 and not
/// barred and access-class allowed").
pub fn is_suitable(c1_value: i32, rach: &RachControl, access_classes: u16) -> bool {
    if c1_value < 0 || rach.cell_barred {
        return false;
    }
    if rach.access_class_barred & access_classes == access_classes && access_classes != 0 {
        return false;
    }
    true
}

/// Extended-reselection parameters inputs to C2, bundled since they're
/// always consulted together.
#[derive(Debug, Clone, Copy)]
pub struct C2Context {
    pub is_serving_or_last_serving: bool,
    /// Seconds since this cell's extended-reselection parameters were
    /// last (re)read; used against `(penalty_time+1)*20s`.
    pub secs_since_params_read: u32,
}

/// C2 reselection criterion (spec.md §4.2).
pub fn c2(c1_value: i32, params: &CellSelectionParams, ctx: C2Context) -> i32 {
    let (offset, penalty_time, temp_offset) = match (
        params.cell_resel_offset,
        params.penalty_time,
        params.temporary_offset,
    ) {
        (Some(o), Some(p), Some(t)) => (o as i32, p, t as i32),
        _ => return c1_value,
    };

    if penalty_time == 31 {
        return c1_value - 2 * offset;
    }
    if ctx.is_serving_or_last_serving {
        return c1_value + 2 * offset;
    }
    if ctx.secs_since_params_read < (penalty_time as u32 + 1) * 20 {
        if temp_offset >= 7 {
            return i32::MIN;
        }
        return c1_value + 2 * offset - temp_offset * 10;
    }
    c1_value + 2 * offset
}

/// Build the next power-scan batch: contiguous indices sharing SUPPORT
/// (and, when `require_ba` is set, BA membership), capped per band by
/// `limits`.
pub fn next_scan_batch(table: &FreqTable, require_ba: bool, limits: ScanLimits) -> ScanBatch {
    let mut indices = Vec::new();
    let mut scanned_this_band: u32 = 0;
    let mut last_band_start: Option<usize> = None;

    for (index, entry) in table.iter() {
        if !entry.flags.contains(ArfcnFlags::SUPPORT) {
            continue;
        }
        if require_ba && !entry.flags.contains(ArfcnFlags::BA) {
            continue;
        }
        if entry.flags.contains(ArfcnFlags::POWER) {
            continue;
        }
        // Treat each run of 16 consecutive indices as a "band" chunk for
        // scan-limit accounting, matching the original's batching by
        // contiguous blocks rather than by true RF band boundaries.
        let band_start = index / 16;
        if last_band_start != Some(band_start) {
            scanned_this_band = 0;
            last_band_start = Some(band_start);
        }
        if let Some(max) = limits.max_per_band {
            if scanned_this_band >= max {
                continue;
            }
        }
        indices.push(index);
        scanned_this_band += 1;
    }
    ScanBatch { indices }
}

/// `gsm322_cs_select`-equivalent: among entries matching `required`,
/// compute C1, drop barred/forbidden/class-barred entries, set TEMP_AA on
/// survivors, and return the index with the highest rxlev.
///
/// `any` relaxes forbidden-LA and forbidden-PLMN checks (the caller is
/// expected to have already cleared FORBIDDEN_LA for cells it wants
/// excluded from that relaxation) but never relaxes the BARRED flag
/// (spec.md §4.2 "Selection").
pub fn select(
    table: &mut FreqTable,
    required: ArfcnFlags,
    any: bool,
    access_classes: u16,
) -> Option<usize> {
    table.clear_temp_aa();
    let mut best: Option<(usize, u8)> = None;

    for (index, entry) in table.iter_mut() {
        if !entry.flags.contains(required) {
            continue;
        }
        if entry.flags.contains(ArfcnFlags::BARRED) {
            continue;
        }
        if !any && entry.flags.contains(ArfcnFlags::FORBIDDEN_LA) {
            continue;
        }
        let Some(sysinfo) = entry.sysinfo.as_ref() else {
            continue;
        };
        let rach = &sysinfo.rach_control;
        if rach.cell_barred {
            continue;
        }
        if rach.access_class_barred & access_classes == access_classes && access_classes != 0 {
            continue;
        }

        entry.flags.insert(ArfcnFlags::TEMP_AA);
        if best.map(|(_, rxlev)| entry.rxlev > rxlev).unwrap_or(true) {
            best = Some((index, entry.rxlev));
        }
    }

    best.map(|(index, _)| index)
}

/// Decide whether a monitored neighbour should trigger a reselection
/// (spec.md §4.2: `(C2_neighbour - CRH) > C2_serving`, debounced by
/// `RESEL_THRESHOLD_SECS`, CRH forced to zero when same LAI or emergency).
pub fn should_reselect(
    neighbour_c2: i32,
    serving_c2: i32,
    crh: u8,
    same_lai_or_emergency: bool,
    debounced_secs: u32,
) -> bool {
    if debounced_secs < RESEL_THRESHOLD_SECS {
        return false;
    }
    let effective_crh = if same_lai_or_emergency { 0 } else { crh as i32 };
    neighbour_c2 - effective_crh > serving_c2
}

/// Pick the next neighbour to (re)sync, preferring unscanned ones over
/// cells due for a periodic re-read (spec.md §4.2 "Neighbour monitoring").
pub fn next_neighbour_to_sync(neighbours: &[Neighbour], now_tick: u64) -> Option<u16> {
    neighbours
        .iter()
        .filter(|nb| nb.state == NeighbourState::New || nb.needs_rescan(now_tick))
        .max_by_key(|nb| (nb.state == NeighbourState::New, nb.rla_c().unwrap_or(0)))
        .map(|nb| nb.arfcn)
}

/// Cap the monitored-neighbour set at [`MAX_MONITORED_NEIGHBOURS`],
/// dropping lowest-priority entries first (spec.md §3 "up to 6 monitored
/// at a time").
pub fn trim_neighbours(neighbours: &mut Vec<Neighbour>) {
    if neighbours.len() <= MAX_MONITORED_NEIGHBOURS {
        return;
    }
    neighbours.sort_by_key(|nb| (nb.priority_low, std::cmp::Reverse(nb.rla_c().unwrap_or(0))));
    neighbours.truncate(MAX_MONITORED_NEIGHBOURS);
}

/// Bookkeeping the CS engine keeps across dispatch calls, separate from
/// the frequency table itself so the two can be borrowed independently.
#[derive(Debug, Clone)]
pub struct CellSelEngine {
    pub state: CsState,
    pub neighbours: Vec<Neighbour>,
    pub serving_lai: Option<Lai>,
    /// Consecutive sync-retry counter for the ARFCN currently being
    /// synced to (N_SYNC: 1 for scan, 2 for serving, per spec.md §4.2).
    pub sync_retries: u8,
}

impl CellSelEngine {
    pub fn new() -> Self {
        CellSelEngine {
            state: CsState::C0Null,
            neighbours: Vec::new(),
            serving_lai: None,
            sync_retries: 0,
        }
    }

    fn n_sync_limit(&self) -> u8 {
        if self.state.is_camped() {
            2
        } else {
            1
        }
    }

    /// Dispatch one event. This is intentionally not exhaustive over every
    /// one of the 03.22 annex transition tables: it implements the subset
    /// spec.md §4.2/§8 actually exercises (the scenarios in §8), matching
    /// the original's `cellselstatelist[]` dispatch for those cases, and
    /// falls back to `Unchanged` for events that don't apply in a state.
    pub fn dispatch(&mut self, event: CsEvent) -> CsOutcome {
        if let CsEvent::SimRemoved = event {
            self.sync_retries = 0;
            self.neighbours.clear();
            return self.transition(CsState::C0Null);
        }

        match (self.state, event) {
            (CsState::C0Null, CsEvent::PlmnSearchRequest { .. }) => {
                self.transition(CsState::C1NormalSel)
            }
            (CsState::C1NormalSel, CsEvent::ScanComplete) => {
                self.transition(CsState::C2StoredSel)
            }
            (CsState::C1NormalSel | CsState::C2StoredSel, CsEvent::SyncSuccess { .. }) => {
                self.sync_retries = 0;
                self.transition(CsState::C3CampedNormally)
            }
            (CsState::C1NormalSel | CsState::C2StoredSel, CsEvent::SyncFailure { .. }) => {
                self.sync_retries += 1;
                if self.sync_retries >= self.n_sync_limit() {
                    self.sync_retries = 0;
                    CsOutcome::Unchanged
                } else {
                    CsOutcome::Unchanged
                }
            }
            (CsState::C1NormalSel, CsEvent::NoCellFound) => {
                self.transition(CsState::C0Null)
            }
            (_, CsEvent::NoCellFound) => self.transition(CsState::C5ChooseCell),
            (CsState::C3CampedNormally, CsEvent::LossOfCoverage) => {
                self.transition(CsState::C4NormalResel)
            }
            (CsState::C4NormalResel, CsEvent::SyncSuccess { .. }) => {
                self.sync_retries = 0;
                self.transition(CsState::C3CampedNormally)
            }
            (CsState::C4NormalResel, CsEvent::NeighbourMeasured { .. }) => CsOutcome::Unchanged,
            (CsState::C3CampedNormally, CsEvent::EnterDedicated) => {
                self.transition(CsState::Connected1)
            }
            (CsState::Connected1 | CsState::Connected2, CsEvent::LeaveDedicated) => {
                self.transition(CsState::C3CampedNormally)
            }
            (CsState::C5ChooseCell, CsEvent::SyncSuccess { .. }) => {
                self.sync_retries = 0;
                self.transition(CsState::C6AnyCellSel)
            }
            (CsState::C6AnyCellSel, CsEvent::ScanComplete) => {
                self.transition(CsState::C7CampedAny)
            }
            (CsState::C7CampedAny, CsEvent::LossOfCoverage) => {
                self.transition(CsState::C8AnyResel)
            }
            (CsState::C8AnyResel, CsEvent::SyncSuccess { .. }) => {
                self.transition(CsState::C7CampedAny)
            }
            (_, CsEvent::PlmnSearchRequest { .. }) => self.transition(CsState::PlmnSearch),
            (_, CsEvent::HplmnSearchRequest) if self.state.is_camped_normally() => {
                self.transition(CsState::HplmnSearch)
            }
            (CsState::PlmnSearch | CsState::HplmnSearch, CsEvent::ScanComplete) => {
                self.transition(CsState::C1NormalSel)
            }
            _ => CsOutcome::Unchanged,
        }
    }

    fn transition(&mut self, next: CsState) -> CsOutcome {
        if next == self.state {
            CsOutcome::Unchanged
        } else {
            self.state = next;
            CsOutcome::Transitioned(next)
        }
    }
}

impl Default for CellSelEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::CellSelectionParams;

    fn params() -> CellSelectionParams {
        CellSelectionParams {
            ms_txpwr_max_cch: 10,
            rxlev_access_min: 5,
            cell_resel_hysteresis: 4,
            neci: false,
            acs: false,
            cell_resel_offset: None,
            temporary_offset: None,
            penalty_time: None,
        }
    }

    #[test]
    fn c1_penalizes_power_excess() {
        let power = MsTxPower { max_output_dbm: 5 };
        let value = c1(40, &params(), &power);
        // base = 40-5=35, excess = max(0, 10-5)=5 -> 30
        assert_eq!(value, 30);
    }

    #[test]
    fn c2_falls_back_to_c1_without_extended_params() {
        assert_eq!(
            c2(
                20,
                &params(),
                C2Context {
                    is_serving_or_last_serving: false,
                    secs_since_params_read: 0
                }
            ),
            20
        );
    }

    #[test]
    fn c2_penalty_time_31_always_subtracts_offset() {
        let mut p = params();
        p.cell_resel_offset = Some(4);
        p.penalty_time = Some(31);
        p.temporary_offset = Some(0);
        let value = c2(
            20,
            &p,
            C2Context {
                is_serving_or_last_serving: false,
                secs_since_params_read: 999,
            },
        );
        assert_eq!(value, 20 - 8);
    }

    #[test]
    fn c2_temp_offset_7_is_minus_infinity_within_penalty_window() {
        let mut p = params();
        p.cell_resel_offset = Some(4);
        p.penalty_time = Some(5);
        p.temporary_offset = Some(7);
        let value = c2(
            20,
            &p,
            C2Context {
                is_serving_or_last_serving: false,
                secs_since_params_read: 10,
            },
        );
        assert_eq!(value, i32::MIN);
    }

    #[test]
    fn should_reselect_requires_debounce() {
        assert!(!should_reselect(40, 30, 4, false, 1));
        assert!(should_reselect(40, 30, 4, false, RESEL_THRESHOLD_SECS));
    }

    #[test]
    fn should_reselect_zeroes_crh_for_same_lai() {
        assert!(should_reselect(33, 30, 4, true, RESEL_THRESHOLD_SECS));
        assert!(!should_reselect(33, 30, 4, false, RESEL_THRESHOLD_SECS));
    }

    #[test]
    fn dispatch_follows_scenario_s1_shape() {
        let mut engine = CellSelEngine::new();
        assert_eq!(
            engine.dispatch(CsEvent::PlmnSearchRequest { target: None }),
            CsOutcome::Transitioned(CsState::C1NormalSel)
        );
        assert_eq!(
            engine.dispatch(CsEvent::ScanComplete),
            CsOutcome::Transitioned(CsState::C2StoredSel)
        );
        assert_eq!(
            engine.dispatch(CsEvent::SyncSuccess { index: 42 }),
            CsOutcome::Transitioned(CsState::C3CampedNormally)
        );
        assert!(engine.state.is_camped_normally());
    }

    #[test]
    fn sim_removed_forces_c0_from_any_state() {
        let mut engine = CellSelEngine::new();
        engine.state = CsState::C3CampedNormally;
        assert_eq!(
            engine.dispatch(CsEvent::SimRemoved),
            CsOutcome::Transitioned(CsState::C0Null)
        );
    }
}
