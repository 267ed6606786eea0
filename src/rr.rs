//! Radio Resource layer: channel request/immediate assignment, ciphering,
//! paging, measurement reports, and the downlink-signalling-failure
//! counter (spec.md §4.4).

use thiserror::Error;

use crate::timer::TimerId;

#[derive(Error, Debug)]
pub enum RrError {
    #[error("requested ciphering algorithm A5/{0} is not supported")]
    UnsupportedCipher(u8),
    #[error("already enciphered; refusing re-ciphering request")]
    AlreadyEnciphered,
    #[error("channel request history is empty, nothing to match against")]
    NoChanReqHistory,
    #[error("channel-request bursts exhausted without an assignment")]
    ChanReqExhausted,
}

/// RR connection states (spec.md §4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RrState {
    Idle,
    ConnPend,
    Dedicated,
}

/// Establishment causes, 04.08 §9.1.8 Table 9.9 (the subset this core
/// issues channel requests for).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EstablishCause {
    MmLocationUpdate,
    MmOriginatingCallOrSms,
    MmEmergencyCall,
    MmAnswerToPaging,
    MmReestablishment,
    GccBccNotification,
}

/// One generated CHAN_REQ value, kept for matching against the immediate
/// assignment's request reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChanReq {
    pub value: u8,
    pub sent_at_frame_number: u32,
}

/// Build an 8-bit RACH CHANNEL REQUEST value: a 5-bit establishment-cause
/// selector in the high bits, masked random padding in the low bits
/// (04.08 §9.1.8).
pub fn build_chan_req(cause: EstablishCause, random_low_bits: u8) -> u8 {
    let cause_bits: u8 = match cause {
        EstablishCause::MmEmergencyCall => 0b101,
        EstablishCause::MmAnswerToPaging => 0b100,
        EstablishCause::MmLocationUpdate => 0b000,
        EstablishCause::MmOriginatingCallOrSms => 0b111,
        EstablishCause::MmReestablishment => 0b000,
        EstablishCause::GccBccNotification => 0b110,
    };
    (cause_bits << 5) | (random_low_bits & 0x1f)
}

/// Slot-delay lookup, keyed by exact `tx_integer` match rather than the
/// original source's fallthrough `switch` (spec.md §9 design note: "MUST
/// NOT replicate the fallthrough").
pub fn slot_delay_for_tx_integer(tx_integer: u8, ccch_combined: bool) -> u8 {
    let base = match tx_integer {
        3 => 55,
        4 => 76,
        5 => 109,
        6 => 163,
        7 => 217,
        8 => 55,
        9 => 76,
        10 => 109,
        11 => 163,
        12 => 217,
        14 => 55,
        16 => 76,
        20 => 109,
        25 => 163,
        32 => 217,
        50 => 32,
        _ => 55,
    };
    if ccch_combined {
        base / 2
    } else {
        base
    }
}

const MAX_CHAN_REQ_HISTORY: usize = 3;

/// Channel-request bookkeeping for the current RR connection attempt.
#[derive(Debug, Clone, Default)]
pub struct ChanReqState {
    /// Last [`MAX_CHAN_REQ_HISTORY`] generated values, most recent last.
    pub history: Vec<ChanReq>,
    pub retransmit_count: u8,
}

impl ChanReqState {
    pub fn record(&mut self, req: ChanReq) {
        self.history.push(req);
        if self.history.len() > MAX_CHAN_REQ_HISTORY {
            self.history.remove(0);
        }
    }

    /// Whether `request_reference` (decoded from IMMEDIATE ASSIGNMENT)
    /// matches one of the last three generated CHAN_REQ values
    /// (spec.md §8 invariant 6).
    pub fn matches(&self, request_reference: u8) -> bool {
        self.history.iter().any(|r| r.value == request_reference)
    }

    pub fn exhausted(&self, max_retrans: u8) -> bool {
        self.retransmit_count > max_retrans
    }
}

/// Channel description decoded from IMMEDIATE ASSIGNMENT (04.08 §10.5.2.5).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelDescription {
    SingleFrequency {
        arfcn: u16,
        timeslot: u8,
        channel_type: u8,
    },
    Hopping {
        maio: u8,
        hsn: u8,
        mobile_allocation: Vec<u8>,
        timeslot: u8,
        channel_type: u8,
    },
}

/// A decoded IMMEDIATE ASSIGNMENT, enough to decide whether to activate a
/// dedicated channel (spec.md §4.4).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImmediateAssignment {
    pub request_reference: u8,
    pub timing_advance: u8,
    pub channel: ChannelDescription,
    pub starting_time: Option<u16>,
}

/// Supported ciphering algorithms this core can instruct L1 to run.
#[derive(Debug, Clone, Copy, Default)]
pub struct SupportedCiphers {
    pub a5_1: bool,
    pub a5_2: bool,
    pub a5_3: bool,
}

impl SupportedCiphers {
    pub fn supports(&self, algorithm: u8) -> bool {
        match algorithm {
            1 => self.a5_1,
            2 => self.a5_2,
            3 => self.a5_3,
            0 => true, // "no ciphering"
            _ => false,
        }
    }
}

/// Ciphering negotiation outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CipherOutcome {
    Complete { algorithm: u8 },
    Refused,
}

/// Handle a CIPHERING MODE COMMAND: validate the requested algorithm is
/// supported and not a re-ciphering attempt (spec.md §4.4).
pub fn negotiate_cipher(
    requested_algorithm: u8,
    already_enciphered: bool,
    supported: &SupportedCiphers,
) -> Result<CipherOutcome, RrError> {
    if already_enciphered && requested_algorithm != 0 {
        return Err(RrError::AlreadyEnciphered);
    }
    if !supported.supports(requested_algorithm) {
        return Ok(CipherOutcome::Refused);
    }
    Ok(CipherOutcome::Complete {
        algorithm: requested_algorithm,
    })
}

/// A single paging identity, as carried in PAGING REQUEST 1/2/3.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PagingIdentity {
    Tmsi(u32),
    Imsi(String),
}

/// Match a list of paging identities against this MS's own TMSI/IMSI. TMSI
/// is matched first when valid, per spec.md §4.4.
pub fn paging_matches(
    identities: &[PagingIdentity],
    tmsi: Option<u32>,
    imsi: &str,
) -> bool {
    identities.iter().any(|id| match id {
        PagingIdentity::Tmsi(t) => tmsi == Some(*t),
        PagingIdentity::Imsi(i) => i == imsi,
    })
}

/// One SACCH-periodic measurement report, packed per 04.08 §10.5.2.20.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MeasurementReport {
    pub rxlev_full_serving: u8,
    pub rxlev_sub_serving: u8,
    pub rxqual_full_serving: u8,
    pub rxqual_sub_serving: u8,
    pub dtx_used: bool,
    pub ba_used: bool,
    pub neighbours: Vec<NeighbourMeasurement>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NeighbourMeasurement {
    pub rxlev: u8,
    pub bsic: u8,
    pub bcch_freq_index: u8,
}

impl MeasurementReport {
    /// Encodes to the fixed 16-byte SACCH measurement report field.
    /// Layout follows 04.08 §10.5.2.20 bit-for-bit for the fields this
    /// core populates; reserved bits are left zero.
    pub fn to_bytes(&self) -> [u8; 16] {
        let mut out = [0u8; 16];
        out[0] = self.rxlev_full_serving & 0x3f;
        out[1] = self.rxlev_sub_serving & 0x3f;
        out[2] = (self.rxqual_full_serving & 0x7) | ((self.rxqual_sub_serving & 0x7) << 3);
        out[3] = (self.dtx_used as u8) | ((self.ba_used as u8) << 1);
        for (i, nb) in self.neighbours.iter().take(6).enumerate() {
            let base = 4 + i * 2;
            if base + 1 < out.len() {
                out[base] = nb.rxlev & 0x3f;
                out[base + 1] = (nb.bsic << 3) | (nb.bcch_freq_index & 0x7);
            }
        }
        out
    }
}

/// Downlink Signalling Counter: decrements on SACCH block error, saturates
/// upward on good blocks, and signals loss-of-coverage at or below zero
/// (spec.md §4.4).
#[derive(Debug, Clone, Copy)]
pub struct DownlinkSignallingCounter {
    value: i16,
    max: i16,
}

impl DownlinkSignallingCounter {
    pub fn new(dsc_max: u8) -> Self {
        DownlinkSignallingCounter {
            value: dsc_max as i16,
            max: dsc_max as i16,
        }
    }

    pub fn on_block_error(&mut self) -> bool {
        self.value -= 1;
        self.value <= 0
    }

    pub fn on_good_block(&mut self) {
        self.value = (self.value + 1).min(self.max);
    }

    pub fn value(&self) -> i16 {
        self.value
    }
}

/// RR's view of one connection attempt/session, enough for the MS
/// dispatch loop to drive channel request, assignment, ciphering, and
/// release.
#[derive(Debug, Clone)]
pub struct RrConnection {
    pub state: RrState,
    pub chan_req: ChanReqState,
    pub enciphered: bool,
    pub dsc: Option<DownlinkSignallingCounter>,
}

impl RrConnection {
    pub fn new() -> Self {
        RrConnection {
            state: RrState::Idle,
            chan_req: ChanReqState::default(),
            enciphered: false,
            dsc: None,
        }
    }

    /// Begin a channel-request attempt (spec.md §4.4): arm T3126 once bursts
    /// are exhausted, represented here by returning whether the caller
    /// should stop retransmitting and start that timer.
    pub fn on_chan_req_burst_sent(&mut self, max_retrans: u8) -> Option<TimerId> {
        self.chan_req.retransmit_count += 1;
        if self.chan_req.exhausted(max_retrans) {
            Some(TimerId::T3126)
        } else {
            None
        }
    }

    pub fn on_immediate_assignment(&mut self, ia: &ImmediateAssignment) -> bool {
        if !self.chan_req.matches(ia.request_reference) {
            return false;
        }
        self.state = RrState::Dedicated;
        true
    }

    pub fn on_release(&mut self) {
        self.state = RrState::Idle;
        self.chan_req = ChanReqState::default();
        self.enciphered = false;
        self.dsc = None;
    }
}

impl Default for RrConnection {
    fn default() -> Self {
        Self::new()
    }
}
