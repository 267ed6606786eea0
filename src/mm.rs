//! Mobility Management layer: the ~23-state MM machine, the location
//! update procedure, MM-connection multiplexing over CC/SS/SMS, IMSI
//! detach, and the six MM timers (spec.md §4.5).

use thiserror::Error;

use crate::subscriber::{Lai, Subscriber, UState};
use crate::timer::{TimerId, TimerWheel};

#[derive(Error, Debug)]
pub enum MmError {
    #[error("a connection is already pending; rejecting with cause 17")]
    ConnectionPending,
    #[error("no MM connection exists for reference {0}")]
    UnknownConnection(u32),
    #[error("location-update retry counter exceeded its bound of 4")]
    RetryCounterExceeded,
}

/// Upper-layer protocol multiplexed over an MM connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MmProtocol {
    Cc,
    Ss,
    Sms,
}

/// MM_IDLE substates (spec.md §4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MmIdleSubstate {
    NormalService,
    AttemptUpdate,
    LimitedService,
    NoImsi,
    NoCellAvail,
    LocUpdNeeded,
    PlmnSearch,
    PlmnSearchNormal,
}

/// Top-level MM states (spec.md §4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MmState {
    Null,
    LocUpdInit,
    WaitOutMmConn,
    WaitAddOutMmConn,
    MmConnActive,
    ImsiDetachInit,
    WaitNetworkCmd,
    LocUpdRej,
    WaitRrConnLupd,
    WaitRrConnMmCon,
    WaitRrConnImsiD,
    WaitReest,
    WaitRrActive,
    MmIdle(MmIdleSubstate),
}

/// Inputs to the return-to-idle decision table (spec.md §4.5), gathered
/// from CS/subscriber state at the moment CELL_SELECTED fires while MM is
/// not idle.
#[derive(Debug, Clone, Copy)]
pub struct ReturnToIdleContext {
    pub sim_valid: bool,
    pub camped_normally: bool,
    pub camped_any: bool,
    pub registered_lai_matches_current: bool,
    pub attached: bool,
    pub forbidden_plmn: bool,
    pub forbidden_la: bool,
    pub barred_or_no_access: bool,
}

/// The return-to-idle decision table from spec.md §4.5, evaluated
/// top-to-bottom exactly as the table lists its rows.
pub fn return_to_idle_substate(ctx: ReturnToIdleContext) -> MmIdleSubstate {
    if !ctx.sim_valid {
        return MmIdleSubstate::NoImsi;
    }
    if ctx.registered_lai_matches_current && ctx.attached {
        return MmIdleSubstate::NormalService;
    }
    if ctx.camped_normally && ctx.forbidden_plmn {
        return MmIdleSubstate::LimitedService;
    }
    if ctx.camped_normally && ctx.forbidden_la {
        return MmIdleSubstate::LimitedService;
    }
    if ctx.camped_normally && ctx.barred_or_no_access {
        return MmIdleSubstate::LimitedService;
    }
    if ctx.camped_normally {
        return MmIdleSubstate::LocUpdNeeded;
    }
    if ctx.camped_any {
        return MmIdleSubstate::LimitedService;
    }
    MmIdleSubstate::NoCellAvail
}

/// Location-update request type (04.08 §10.5.3.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocUpdType {
    Normal,
    Periodic,
    ImsiAttach,
}

/// Reject causes that drive specific forbidden-list bookkeeping
/// (spec.md §7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectCause {
    ImsiUnknownInHlr,
    IllegalMs,
    IllegalMe,
    PlmnNotAllowed,
    LocationAreaNotAllowed,
    RoamingNotAllowedInLa,
    NetworkFailure,
    Congestion,
    Other(u8),
}

impl RejectCause {
    pub fn from_code(code: u8) -> Self {
        match code {
            2 => RejectCause::ImsiUnknownInHlr,
            3 => RejectCause::IllegalMs,
            6 => RejectCause::IllegalMe,
            11 => RejectCause::PlmnNotAllowed,
            12 => RejectCause::LocationAreaNotAllowed,
            13 => RejectCause::RoamingNotAllowedInLa,
            17 => RejectCause::NetworkFailure,
            22 => RejectCause::Congestion,
            other => RejectCause::Other(other),
        }
    }

    /// True for the "SIM must be treated as invalid" causes (spec.md §7:
    /// "2/3/6=SIM invalid variants").
    pub fn invalidates_sim(&self) -> bool {
        matches!(
            self,
            RejectCause::ImsiUnknownInHlr | RejectCause::IllegalMs | RejectCause::IllegalMe
        )
    }
}

/// Action to take against subscriber/forbidden-list state for a given
/// reject cause (spec.md §4.5 step 4, §7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectAction {
    AddForbiddenPlmn,
    AddForbiddenLa,
    MarkSimInvalid,
    IncrementRetryCounter,
}

pub fn reject_action_for_cause(cause: RejectCause) -> RejectAction {
    match cause {
        RejectCause::PlmnNotAllowed => RejectAction::AddForbiddenPlmn,
        RejectCause::LocationAreaNotAllowed | RejectCause::RoamingNotAllowedInLa => {
            RejectAction::AddForbiddenLa
        }
        c if c.invalidates_sim() => RejectAction::MarkSimInvalid,
        _ => RejectAction::IncrementRetryCounter,
    }
}

const MAX_LUPD_ATTEMPTS: u8 = 4;

/// Bookkeeping for one location-update attempt sequence (spec.md §4.5,
/// §8 invariant 3: `0 <= lupd_attempt <= 4`).
#[derive(Debug, Clone, Default)]
pub struct LocUpdProcedure {
    pub attempt: u8,
    pub upd_type: Option<LocUpdType>,
    pub last_cause: Option<RejectCause>,
    /// Consecutive RR-release-during-LOC_UPD_INIT-with-RA-failure count
    /// (spec.md §4.5 step 5: "if not twice in a row").
    pub ra_failure_streak: u8,
}

impl LocUpdProcedure {
    pub fn start(&mut self, upd_type: LocUpdType) {
        self.attempt = 0;
        self.upd_type = Some(upd_type);
        self.last_cause = None;
        self.ra_failure_streak = 0;
    }

    /// General-failure retry gate (spec.md §4.5 step 6: "attempt <= 4:
    /// start T3211, retry after delay").
    pub fn note_general_failure(&mut self) -> Result<(), MmError> {
        self.attempt += 1;
        if self.attempt > MAX_LUPD_ATTEMPTS {
            Err(MmError::RetryCounterExceeded)
        } else {
            Ok(())
        }
    }

    /// RR-release-during-LOC_UPD_INIT handling (spec.md §4.5 step 5).
    /// Returns true if the caller should retry via T3213, false if this
    /// should be escalated as a general failure instead.
    pub fn note_ra_failure(&mut self) -> bool {
        self.ra_failure_streak += 1;
        self.ra_failure_streak < 2
    }

    pub fn reset_ra_failure_streak(&mut self) {
        self.ra_failure_streak = 0;
    }
}

/// Apply a LOCATION UPDATING ACCEPT (spec.md §4.5 step 3).
pub fn apply_loc_upd_accept(
    subscriber: &mut Subscriber,
    new_lai: Lai,
    new_tmsi: Option<u32>,
) -> bool {
    subscriber.rplmn = Some(new_lai);
    subscriber.ustate = UState::Updated;
    subscriber.imsi_attached = true;
    if let Some(tmsi) = new_tmsi {
        subscriber.tmsi = Some(tmsi);
        true // caller must send TMSI REALLOCATION COMPLETE
    } else {
        false
    }
}

/// Apply the terminal "attempt exceeded" outcome (spec.md §4.5 step 7).
pub fn apply_loc_upd_give_up(subscriber: &mut Subscriber) {
    subscriber.mark_not_updated();
}

/// One MM connection (spec.md §3 "MM connection").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MmConnState {
    Idle,
    ConnPend,
    Dedicated,
    ConnSusp,
    ReestPend,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MmConnection {
    pub protocol: MmProtocol,
    pub transaction_id: u8,
    pub sapi: u8,
    pub reference: u32,
    pub state: MmConnState,
}

/// Owns MM connection allocation: reference generation, the
/// one-pending-at-a-time gate, and per-connection state (spec.md §4.5
/// "MM-connection multiplexing").
#[derive(Debug, Clone, Default)]
pub struct MmConnectionTable {
    connections: Vec<MmConnection>,
    next_reference: u32,
}

impl MmConnectionTable {
    pub fn new() -> Self {
        MmConnectionTable {
            connections: Vec::new(),
            next_reference: 1,
        }
    }

    fn has_pending(&self) -> bool {
        self.connections
            .iter()
            .any(|c| c.state == MmConnState::ConnPend)
    }

    /// Allocate a new connection for an upper-layer EST-REQ. SMS requests
    /// SAPI 3; everything else SAPI 0. Rejects with cause 17 if one is
    /// already pending (spec.md §4.5).
    pub fn establish(
        &mut self,
        protocol: MmProtocol,
        transaction_id: u8,
    ) -> Result<u32, MmError> {
        if self.has_pending() {
            return Err(MmError::ConnectionPending);
        }
        let reference = self.next_reference;
        self.next_reference += 1;
        let sapi = if protocol == MmProtocol::Sms { 3 } else { 0 };
        self.connections.push(MmConnection {
            protocol,
            transaction_id,
            sapi,
            reference,
            state: MmConnState::ConnPend,
        });
        Ok(reference)
    }

    pub fn activate(&mut self, reference: u32) -> Result<(), MmError> {
        let conn = self
            .connections
            .iter_mut()
            .find(|c| c.reference == reference)
            .ok_or(MmError::UnknownConnection(reference))?;
        conn.state = MmConnState::Dedicated;
        Ok(())
    }

    /// Abort a connection at any non-terminal state: releases it and
    /// signals the caller should send a synthetic REL_IND upward
    /// (spec.md §5 "Cancellation").
    pub fn abort(&mut self, reference: u32) -> Result<(), MmError> {
        let pos = self
            .connections
            .iter()
            .position(|c| c.reference == reference)
            .ok_or(MmError::UnknownConnection(reference))?;
        self.connections.remove(pos);
        Ok(())
    }

    /// Abort every connection, e.g. on RR release or power-down
    /// (spec.md §7 "Fatal").
    pub fn abort_all(&mut self) -> Vec<MmConnection> {
        std::mem::take(&mut self.connections)
    }

    pub fn get(&self, reference: u32) -> Option<&MmConnection> {
        self.connections.iter().find(|c| c.reference == reference)
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}

/// IMSI detach outcome: whether RR establishment + IMSI DETACH INDICATION
/// should actually be sent, or the SIM attachment silently cleared
/// (spec.md §4.5 "IMSI detach", SPEC_FULL.md §3 item 5).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImsiDetachAction {
    SendIndication,
    SilentlyClear,
}

pub fn imsi_detach_action(camped_normally: bool, sim_attached: bool) -> ImsiDetachAction {
    if camped_normally && sim_attached {
        ImsiDetachAction::SendIndication
    } else {
        ImsiDetachAction::SilentlyClear
    }
}

/// If an RR connection failure interrupts an in-flight IMSI DETACH
/// INDICATION, that failure is swallowed rather than retried or surfaced
/// as a general MM failure: the detach has already served its purpose
/// from the network's point of view once the RR attempt was made.
pub fn imsi_detach_rr_failure_is_fatal() -> bool {
    false
}

/// Default MM timer values (spec.md §4.5).
pub fn default_timer_secs(id: TimerId) -> Option<u32> {
    match id {
        TimerId::T3210 => Some(20),
        TimerId::T3211 => Some(10),
        TimerId::T3213 => Some(4),
        TimerId::T3220 => Some(5),
        TimerId::T3230 => Some(15),
        TimerId::T3240 => Some(10),
        _ => None,
    }
}

/// T3212 value, decoded from SI3's decihours field into seconds. Zero
/// disables periodic location update entirely.
pub fn t3212_secs(t3212_value_decihours: u8) -> Option<u32> {
    if t3212_value_decihours == 0 {
        None
    } else {
        Some(t3212_value_decihours as u32 * 360)
    }
}

/// Restart T3212 on an SI3 change, preserving phase (spec.md §3 invariant
/// (d), §4.5 step 2).
pub fn restart_t3212_on_si3_change(wheel: &mut TimerWheel, new_value_decihours: u8) {
    match t3212_secs(new_value_decihours) {
        Some(secs) => wheel.restart_preserving_phase(TimerId::T3212, secs),
        None => wheel.stop(TimerId::T3212),
    }
}

/// Events driving the top-level MM state machine (spec.md §4.5). Named for
/// the primitive or condition that caused them rather than for the source's
/// `MMXX_EV_*` identifiers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MmEvent {
    /// CS has camped (normally or on any cell) and MM must decide whether
    /// to (re)run the return-to-idle table (spec.md §4.5).
    CellSelected(ReturnToIdleContext),
    /// Upper layer wants to originate a CC/SS/SMS transaction.
    EstablishRequest { protocol: MmProtocol },
    RrEstablished,
    RrEstFailed,
    RrReleased,
    LocUpdAccept { new_lai: Lai, new_tmsi: Option<u32> },
    LocUpdReject { cause: RejectCause },
    TmsiReallocComplete,
    ImsiDetachRequest,
    T3210Expiry,
    T3211Expiry,
    T3212Expiry,
    T3213Expiry,
    T3220Expiry,
    T3230Expiry,
    T3240Expiry,
    PowerDown,
}

/// What the `Ms` dispatch loop must apply to `Subscriber` state as a result
/// of an `MmEngine::dispatch` call. Kept out of `MmEngine` itself, which
/// only knows the MM state machine, not the subscriber record it's
/// ultimately updating (spec.md §9 "flat struct" guidance).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MmSubscriberAction {
    ApplyLocUpdAccept {
        new_lai: Lai,
        new_tmsi: Option<u32>,
    },
    ApplyRejectAction(RejectAction),
    MarkNotUpdated,
}

/// Outcome of one [`MmEngine::dispatch`] call: the resulting state plus
/// whatever the caller (the `Ms` dispatch loop) needs to act on — arm/stop
/// a timer, send a message, or update subscriber state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MmOutcome {
    pub state: MmState,
    pub changed: bool,
    pub subscriber_action: Option<MmSubscriberAction>,
}

/// The top-level MM state machine (spec.md §4.5 "Headline states") plus
/// the location-update procedure and IMSI-detach bookkeeping it drives.
#[derive(Debug, Clone)]
pub struct MmEngine {
    pub state: MmState,
    pub loc_upd: LocUpdProcedure,
    pub connections: MmConnectionTable,
}

impl MmEngine {
    pub fn new() -> Self {
        MmEngine {
            state: MmState::Null,
            loc_upd: LocUpdProcedure::default(),
            connections: MmConnectionTable::new(),
        }
    }

    fn transition(&mut self, next: MmState) -> MmOutcome {
        let changed = next != self.state;
        self.state = next;
        MmOutcome {
            state: next,
            changed,
            subscriber_action: None,
        }
    }

    fn unchanged(&self) -> MmOutcome {
        MmOutcome {
            state: self.state,
            changed: false,
            subscriber_action: None,
        }
    }

    fn with_action(outcome: MmOutcome, action: MmSubscriberAction) -> MmOutcome {
        MmOutcome {
            subscriber_action: Some(action),
            ..outcome
        }
    }

    /// Dispatch one event. Mirrors the structure of spec.md §4.5's
    /// location-update procedure (steps 1-7) and the return-to-idle
    /// decision, which together cover every headline-state transition the
    /// `[MODULE]`'s testable scenarios (S1-S3) exercise.
    pub fn dispatch(&mut self, event: MmEvent) -> MmOutcome {
        match event {
            MmEvent::PowerDown => {
                self.connections.abort_all();
                self.loc_upd = LocUpdProcedure::default();
                self.transition(MmState::Null)
            }
            MmEvent::CellSelected(ctx) => {
                if matches!(self.state, MmState::MmIdle(_)) || self.state == MmState::Null {
                    let substate = return_to_idle_substate(ctx);
                    if substate == MmIdleSubstate::LocUpdNeeded {
                        self.loc_upd.start(LocUpdType::Normal);
                        self.transition(MmState::WaitRrConnLupd)
                    } else {
                        self.transition(MmState::MmIdle(substate))
                    }
                } else {
                    self.unchanged()
                }
            }
            MmEvent::EstablishRequest { protocol } => {
                match self.connections.establish(protocol, 0) {
                    Ok(_) => self.transition(MmState::WaitOutMmConn),
                    Err(_) => self.unchanged(),
                }
            }
            MmEvent::RrEstablished if self.state == MmState::WaitRrConnLupd => {
                self.transition(MmState::LocUpdInit)
            }
            MmEvent::RrEstablished if self.state == MmState::WaitOutMmConn => {
                self.transition(MmState::MmConnActive)
            }
            MmEvent::RrEstablished if self.state == MmState::WaitRrConnImsiD => {
                self.transition(MmState::ImsiDetachInit)
            }
            MmEvent::RrEstFailed if self.state == MmState::WaitRrConnImsiD => {
                // IMSI detach swallows RR establishment failure silently
                // (spec.md §4.5 "IMSI detach", SPEC_FULL.md §3 item 5).
                self.transition(MmState::MmIdle(MmIdleSubstate::NormalService))
            }
            MmEvent::LocUpdAccept { new_lai, new_tmsi } if self.state == MmState::LocUpdInit => {
                self.loc_upd = LocUpdProcedure::default();
                let outcome = if new_tmsi.is_some() {
                    self.transition(MmState::WaitNetworkCmd)
                } else {
                    self.transition(MmState::MmIdle(MmIdleSubstate::NormalService))
                };
                Self::with_action(
                    outcome,
                    MmSubscriberAction::ApplyLocUpdAccept { new_lai, new_tmsi },
                )
            }
            MmEvent::TmsiReallocComplete if self.state == MmState::WaitNetworkCmd => {
                self.transition(MmState::MmIdle(MmIdleSubstate::NormalService))
            }
            MmEvent::LocUpdReject { cause } if self.state == MmState::LocUpdInit => {
                self.loc_upd.last_cause = Some(cause);
                let outcome = self.transition(MmState::LocUpdRej);
                Self::with_action(
                    outcome,
                    MmSubscriberAction::ApplyRejectAction(reject_action_for_cause(cause)),
                )
            }
            MmEvent::RrReleased if self.state == MmState::LocUpdRej => {
                self.transition(MmState::MmIdle(MmIdleSubstate::LimitedService))
            }
            MmEvent::RrReleased if self.state == MmState::LocUpdInit => {
                // RR released mid-attempt: RA-failure retries twice before
                // escalating to a general failure (spec.md §4.5 step 5).
                if self.loc_upd.note_ra_failure() {
                    self.transition(MmState::WaitRrConnLupd)
                } else {
                    self.general_lupd_failure()
                }
            }
            MmEvent::RrReleased if self.state == MmState::WaitNetworkCmd => {
                self.transition(MmState::MmIdle(MmIdleSubstate::NormalService))
            }
            MmEvent::RrReleased if self.state == MmState::ImsiDetachInit => {
                self.transition(MmState::Null)
            }
            MmEvent::RrReleased if self.state == MmState::MmConnActive => {
                self.connections.abort_all();
                self.transition(MmState::MmIdle(MmIdleSubstate::NormalService))
            }
            MmEvent::T3210Expiry if self.state == MmState::LocUpdInit => self.general_lupd_failure(),
            MmEvent::T3211Expiry if self.state == MmState::LocUpdRej => {
                self.loc_upd.start(LocUpdType::Normal);
                self.transition(MmState::WaitRrConnLupd)
            }
            MmEvent::T3212Expiry
                if matches!(self.state, MmState::MmIdle(MmIdleSubstate::NormalService)) =>
            {
                self.loc_upd.start(LocUpdType::Periodic);
                self.transition(MmState::WaitRrConnLupd)
            }
            MmEvent::T3213Expiry if self.state == MmState::WaitRrConnLupd => {
                self.loc_upd.reset_ra_failure_streak();
                self.unchanged()
            }
            MmEvent::ImsiDetachRequest => self.transition(MmState::WaitRrConnImsiD),
            _ => self.unchanged(),
        }
    }

    /// General location-update failure path (spec.md §4.5 step 6/7):
    /// retry up to 4 times via T3211, then give up and mark NOT_UPDATED.
    fn general_lupd_failure(&mut self) -> MmOutcome {
        match self.loc_upd.note_general_failure() {
            Ok(()) => self.transition(MmState::LocUpdRej),
            Err(_) => {
                let outcome = self.transition(MmState::MmIdle(MmIdleSubstate::LimitedService));
                Self::with_action(outcome, MmSubscriberAction::MarkNotUpdated)
            }
        }
    }
}

impl Default for MmEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_ctx() -> ReturnToIdleContext {
        ReturnToIdleContext {
            sim_valid: true,
            camped_normally: true,
            camped_any: false,
            registered_lai_matches_current: false,
            attached: false,
            forbidden_plmn: false,
            forbidden_la: false,
            barred_or_no_access: false,
        }
    }

    #[test]
    fn no_sim_always_wins() {
        let mut ctx = base_ctx();
        ctx.sim_valid = false;
        assert_eq!(return_to_idle_substate(ctx), MmIdleSubstate::NoImsi);
    }

    #[test]
    fn matching_lai_and_attached_is_normal_service() {
        let mut ctx = base_ctx();
        ctx.registered_lai_matches_current = true;
        ctx.attached = true;
        assert_eq!(
            return_to_idle_substate(ctx),
            MmIdleSubstate::NormalService
        );
    }

    #[test]
    fn forbidden_plmn_while_camped_normally_is_limited() {
        let mut ctx = base_ctx();
        ctx.forbidden_plmn = true;
        assert_eq!(
            return_to_idle_substate(ctx),
            MmIdleSubstate::LimitedService
        );
    }

    #[test]
    fn plain_camped_normally_needs_location_update() {
        let ctx = base_ctx();
        assert_eq!(
            return_to_idle_substate(ctx),
            MmIdleSubstate::LocUpdNeeded
        );
    }

    #[test]
    fn camped_any_without_normal_camp_is_limited() {
        let mut ctx = base_ctx();
        ctx.camped_normally = false;
        ctx.camped_any = true;
        assert_eq!(
            return_to_idle_substate(ctx),
            MmIdleSubstate::LimitedService
        );
    }

    #[test]
    fn lupd_attempt_counter_bounded_at_four() {
        let mut proc = LocUpdProcedure::default();
        for _ in 0..4 {
            assert!(proc.note_general_failure().is_ok());
        }
        assert!(proc.note_general_failure().is_err());
        assert_eq!(proc.attempt, 5);
    }

    #[test]
    fn ra_failure_retries_once_then_escalates() {
        let mut proc = LocUpdProcedure::default();
        assert!(proc.note_ra_failure());
        assert!(!proc.note_ra_failure());
    }

    #[test]
    fn second_pending_connection_rejected_with_cause_17() {
        let mut table = MmConnectionTable::new();
        table.establish(MmProtocol::Cc, 1).unwrap();
        let result = table.establish(MmProtocol::Ss, 2);
        assert!(matches!(result, Err(MmError::ConnectionPending)));
    }

    #[test]
    fn sms_connection_uses_sapi_3() {
        let mut table = MmConnectionTable::new();
        let reference = table.establish(MmProtocol::Sms, 1).unwrap();
        assert_eq!(table.get(reference).unwrap().sapi, 3);
    }

    #[test]
    fn reject_cause_actions_match_spec_table() {
        assert_eq!(
            reject_action_for_cause(RejectCause::PlmnNotAllowed),
            RejectAction::AddForbiddenPlmn
        );
        assert_eq!(
            reject_action_for_cause(RejectCause::LocationAreaNotAllowed),
            RejectAction::AddForbiddenLa
        );
        assert_eq!(
            reject_action_for_cause(RejectCause::ImsiUnknownInHlr),
            RejectAction::MarkSimInvalid
        );
    }

    #[test]
    fn imsi_detach_silently_clears_when_not_attached() {
        assert_eq!(
            imsi_detach_action(true, false),
            ImsiDetachAction::SilentlyClear
        );
        assert_eq!(
            imsi_detach_action(true, true),
            ImsiDetachAction::SendIndication
        );
    }

    fn camped_normally_not_registered() -> ReturnToIdleContext {
        ReturnToIdleContext {
            sim_valid: true,
            camped_normally: true,
            camped_any: false,
            registered_lai_matches_current: false,
            attached: false,
            forbidden_plmn: false,
            forbidden_la: false,
            barred_or_no_access: false,
        }
    }

    /// Scenario S1: cold boot with an available cell drives MM straight
    /// from NULL through LOC_UPD_INIT to NORMAL_SERVICE on accept.
    #[test]
    fn scenario_s1_cold_boot_to_normal_service() {
        let mut mm = MmEngine::new();
        let outcome = mm.dispatch(MmEvent::CellSelected(camped_normally_not_registered()));
        assert_eq!(outcome.state, MmState::WaitRrConnLupd);

        let outcome = mm.dispatch(MmEvent::RrEstablished);
        assert_eq!(outcome.state, MmState::LocUpdInit);

        let lai = Lai {
            mcc: 1,
            mnc: 1,
            lac: 1,
        };
        let outcome = mm.dispatch(MmEvent::LocUpdAccept {
            new_lai: lai,
            new_tmsi: None,
        });
        assert_eq!(outcome.state, MmState::MmIdle(MmIdleSubstate::NormalService));
        assert_eq!(
            outcome.subscriber_action,
            Some(MmSubscriberAction::ApplyLocUpdAccept {
                new_lai: lai,
                new_tmsi: None
            })
        );
    }

    /// Scenario S2: periodic location update from NORMAL_SERVICE, T3212
    /// firing, round-trips back to NORMAL_SERVICE on accept.
    #[test]
    fn scenario_s2_periodic_location_update() {
        let mut mm = MmEngine::new();
        mm.state = MmState::MmIdle(MmIdleSubstate::NormalService);
        let outcome = mm.dispatch(MmEvent::T3212Expiry);
        assert_eq!(outcome.state, MmState::WaitRrConnLupd);
        assert_eq!(mm.loc_upd.upd_type, Some(LocUpdType::Periodic));

        mm.dispatch(MmEvent::RrEstablished);
        let outcome = mm.dispatch(MmEvent::LocUpdAccept {
            new_lai: Lai {
                mcc: 1,
                mnc: 1,
                lac: 1,
            },
            new_tmsi: None,
        });
        assert_eq!(outcome.state, MmState::MmIdle(MmIdleSubstate::NormalService));
    }

    /// Scenario S3: a reject with cause 12 (LA not allowed) surfaces the
    /// forbidden-LA action and, once RR releases, lands in LIMITED_SERVICE.
    #[test]
    fn scenario_s3_forbidden_la_reject() {
        let mut mm = MmEngine::new();
        mm.state = MmState::LocUpdInit;
        let outcome = mm.dispatch(MmEvent::LocUpdReject {
            cause: RejectCause::LocationAreaNotAllowed,
        });
        assert_eq!(outcome.state, MmState::LocUpdRej);
        assert_eq!(
            outcome.subscriber_action,
            Some(MmSubscriberAction::ApplyRejectAction(
                RejectAction::AddForbiddenLa
            ))
        );

        let outcome = mm.dispatch(MmEvent::RrReleased);
        assert_eq!(
            outcome.state,
            MmState::MmIdle(MmIdleSubstate::LimitedService)
        );
    }

    #[test]
    fn general_failure_gives_up_after_four_retries() {
        let mut mm = MmEngine::new();
        mm.state = MmState::LocUpdInit;
        for _ in 0..4 {
            mm.state = MmState::LocUpdInit;
            let outcome = mm.dispatch(MmEvent::T3210Expiry);
            assert_eq!(outcome.state, MmState::LocUpdRej);
        }
        mm.state = MmState::LocUpdInit;
        let outcome = mm.dispatch(MmEvent::T3210Expiry);
        assert_eq!(
            outcome.state,
            MmState::MmIdle(MmIdleSubstate::LimitedService)
        );
        assert_eq!(
            outcome.subscriber_action,
            Some(MmSubscriberAction::MarkNotUpdated)
        );
    }

    #[test]
    fn second_establish_request_rejected_while_one_pending() {
        let mut mm = MmEngine::new();
        let outcome = mm.dispatch(MmEvent::EstablishRequest {
            protocol: MmProtocol::Cc,
        });
        assert_eq!(outcome.state, MmState::WaitOutMmConn);
        let outcome = mm.dispatch(MmEvent::EstablishRequest {
            protocol: MmProtocol::Sms,
        });
        assert_eq!(outcome.state, MmState::WaitOutMmConn);
        assert!(!outcome.changed);
    }

    #[test]
    fn power_down_aborts_connections_and_returns_to_null() {
        let mut mm = MmEngine::new();
        mm.dispatch(MmEvent::EstablishRequest {
            protocol: MmProtocol::Cc,
        });
        let outcome = mm.dispatch(MmEvent::PowerDown);
        assert_eq!(outcome.state, MmState::Null);
        assert!(mm.connections.is_empty());
    }
}
