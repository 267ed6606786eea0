//! PLMN-selection engine: the automatic and manual selection FSMs, and the
//! sorted-PLMN list construction algorithm (spec.md §4.3).

use thiserror::Error;

use crate::subscriber::{ForbiddenCause, PlmnId, Subscriber};

#[derive(Error, Debug)]
pub enum PlmnError {
    #[error("no scan results available to build a sorted PLMN list")]
    NoScanResults,
    #[error("manual selection requested but no target PLMN given")]
    NoManualTarget,
}

/// Automatic PLMN-selection states (spec.md §4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AutoState {
    A0Null,
    A1TryingRplmn,
    A2OnPlmn,
    A3TryingPlmn,
    A4WaitForPlmn,
    A5HplmnSearch,
    A6NoSim,
}

/// Manual PLMN-selection states (spec.md §4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManualState {
    M0Null,
    M1TryingRplmn,
    M2OnPlmn,
    M3NotOnPlmn,
    M4TryingPlmn,
    M5NoSim,
}

/// Whether the PLMN-selection layer is currently running automatic or
/// manual mode selection (mutually exclusive, switched by the user's
/// selection-mode setting).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionMode {
    Automatic,
    Manual,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlmnState {
    Auto(AutoState),
    Manual(ManualState),
}

/// One scan result folded into the sorted-PLMN list: the strongest rxlev
/// seen for this PLMN across every TEMP_AA ARFCN (spec.md §4.3 step 1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanResult {
    pub plmn: PlmnId,
    pub max_rxlev: u8,
}

/// An entry in the final sorted-PLMN list (spec.md §3 "Sorted-PLMN entry").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortedPlmnEntry {
    pub plmn: PlmnId,
    pub rxlev: u8,
    pub cause: Option<ForbiddenCause>,
}

/// Build the sorted-PLMN list (spec.md §4.3 steps 1-6). `random_order`
/// supplies the ordering used for the ">-85dBm" bucket; callers pass a
/// seeded shuffle in tests and `rand`-backed shuffling in production so
/// the algorithm itself stays deterministic and unit-testable.
///
/// The inner dedup-by-PLMN keeps the *first* entry matching a given MCC/MNC
/// once `scan_results` has been reduced to one entry per PLMN upstream, so
/// unlike the original's `gsm322_sort_list` (spec.md §9: its break-on-first
/// iteration bug), this always compares and replaces on a genuine match
/// rather than aborting the inner loop early.
pub fn sort_plmn_list(
    scan_results: &[ScanResult],
    subscriber: &Subscriber,
    random_order: impl Fn(&mut Vec<SortedPlmnEntry>),
) -> Vec<SortedPlmnEntry> {
    // Step 1: dedup by (MCC,MNC), keeping the max rxlev seen.
    let mut by_plmn: Vec<SortedPlmnEntry> = Vec::new();
    for result in scan_results {
        if let Some(existing) = by_plmn.iter_mut().find(|e| e.plmn == result.plmn) {
            if result.max_rxlev > existing.rxlev {
                existing.rxlev = result.max_rxlev;
            }
        } else {
            by_plmn.push(SortedPlmnEntry {
                plmn: result.plmn,
                rxlev: result.max_rxlev,
                cause: subscriber.is_forbidden_plmn(result.plmn),
            });
        }
    }

    let hplmn = subscriber.hplmn();
    let mut head: Vec<SortedPlmnEntry> = Vec::new();

    // Step 2: move HPLMN to head, if present and not forbidden.
    if let Some(hplmn) = hplmn {
        if let Some(pos) = by_plmn
            .iter()
            .position(|e| e.plmn == hplmn && e.cause.is_none())
        {
            head.push(by_plmn.remove(pos));
        }
    }

    // Step 3: move SIM PLMN-selector entries, preserving selector order.
    for selector in &subscriber.plmn_selector_list {
        if let Some(pos) = by_plmn.iter().position(|e| e.plmn == *selector) {
            head.push(by_plmn.remove(pos));
        }
    }

    // Step 4+5: split the rest by the -85dBm threshold, random order above
    // it, descending rxlev below.
    let (mut strong, mut weak): (Vec<_>, Vec<_>) =
        by_plmn.into_iter().partition(|e| rxlev_dbm(e.rxlev) > -85);
    random_order(&mut strong);
    weak.sort_by(|a, b| b.rxlev.cmp(&a.rxlev));

    head.extend(strong);
    head.extend(weak);
    head
}

/// Map the raw rxlev encoding (0..=63, GSM 05.08 §8.1.4) to dBm, needed only
/// to compare against the sort's -85dBm threshold.
fn rxlev_dbm(rxlev: u8) -> i32 {
    rxlev as i32 - 110
}

/// HPLMN periodic-search timer length in seconds (spec.md §4.3:
/// `subscr.t6m_hplmn * 360`, default 10800).
pub fn hplmn_search_timer_secs(subscriber: &Subscriber) -> u32 {
    subscriber.t6m_hplmn as u32 * 360
}

/// Whether the HPLMN periodic search timer should be running at all:
/// camped on a VPLMN of the home country, or `always_search_hplmn` is set
/// (spec.md §4.3).
pub fn hplmn_search_applies(subscriber: &Subscriber, camped_plmn: PlmnId) -> bool {
    if subscriber.always_search_hplmn {
        return true;
    }
    match subscriber.hplmn() {
        Some(hplmn) => hplmn.mcc == camped_plmn.mcc && hplmn != camped_plmn,
        None => false,
    }
}

/// Events driving both the automatic and manual PLMN FSMs. The two share
/// one event type since most of 03.22's automatic/manual tables react to
/// the same stimuli, differing only in target-selection policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlmnEvent {
    SimInserted,
    SimRemoved,
    CellSelected { plmn: PlmnId, is_rplmn: bool },
    NoCellFound,
    RegistrationSuccess,
    RegistrationFailure,
    /// User (or NITZ-driven automatic logic) picked a specific PLMN.
    ManualSelectRequest { plmn: PlmnId },
    HplmnSearchTimeout,
    PlmnListExhausted,
}

#[derive(Debug, Clone)]
pub struct PlmnEngine {
    pub mode: SelectionMode,
    pub auto_state: AutoState,
    pub manual_state: ManualState,
    pub target: Option<PlmnId>,
}

impl PlmnEngine {
    pub fn new(mode: SelectionMode) -> Self {
        PlmnEngine {
            mode,
            auto_state: AutoState::A0Null,
            manual_state: ManualState::M0Null,
            target: None,
        }
    }

    pub fn state(&self) -> PlmnState {
        match self.mode {
            SelectionMode::Automatic => PlmnState::Auto(self.auto_state),
            SelectionMode::Manual => PlmnState::Manual(self.manual_state),
        }
    }

    /// Dispatch one event against whichever sub-machine is active,
    /// mirroring `plmnastatelist[]` / `plmnmstatelist[]`.
    pub fn dispatch(&mut self, event: PlmnEvent) -> PlmnState {
        match event {
            PlmnEvent::SimRemoved => {
                self.auto_state = AutoState::A6NoSim;
                self.manual_state = ManualState::M5NoSim;
            }
            PlmnEvent::SimInserted => match self.mode {
                SelectionMode::Automatic => self.auto_state = AutoState::A1TryingRplmn,
                SelectionMode::Manual => self.manual_state = ManualState::M1TryingRplmn,
            },
            PlmnEvent::CellSelected { plmn, is_rplmn } => match self.mode {
                SelectionMode::Automatic => {
                    self.auto_state = if is_rplmn {
                        AutoState::A2OnPlmn
                    } else {
                        AutoState::A2OnPlmn
                    };
                    self.target = Some(plmn);
                }
                SelectionMode::Manual => {
                    self.manual_state = if Some(plmn) == self.target || is_rplmn {
                        ManualState::M2OnPlmn
                    } else {
                        ManualState::M3NotOnPlmn
                    };
                }
            },
            PlmnEvent::NoCellFound => match self.mode {
                SelectionMode::Automatic => self.auto_state = AutoState::A4WaitForPlmn,
                SelectionMode::Manual => self.manual_state = ManualState::M3NotOnPlmn,
            },
            PlmnEvent::RegistrationSuccess => match self.mode {
                SelectionMode::Automatic => self.auto_state = AutoState::A2OnPlmn,
                SelectionMode::Manual => self.manual_state = ManualState::M2OnPlmn,
            },
            PlmnEvent::RegistrationFailure => match self.mode {
                SelectionMode::Automatic => self.auto_state = AutoState::A3TryingPlmn,
                SelectionMode::Manual => self.manual_state = ManualState::M4TryingPlmn,
            },
            PlmnEvent::ManualSelectRequest { plmn } => {
                self.mode = SelectionMode::Manual;
                self.target = Some(plmn);
                self.manual_state = ManualState::M4TryingPlmn;
            }
            PlmnEvent::HplmnSearchTimeout => {
                if self.mode == SelectionMode::Automatic {
                    self.auto_state = AutoState::A5HplmnSearch;
                }
            }
            PlmnEvent::PlmnListExhausted => match self.mode {
                SelectionMode::Automatic => self.auto_state = AutoState::A0Null,
                SelectionMode::Manual => self.manual_state = ManualState::M0Null,
            },
        }
        self.state()
    }
}
