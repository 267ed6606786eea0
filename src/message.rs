//! Wire-level data definitions: the aggregated per-cell `SysInfo` record
//! (spec.md §3), classmark 1/2 encode, LAI encode, and the L1/upper-layer
//! primitive enums that cross the component boundary (spec.md §6).
//!
//! Bit-exact structures use [`deku`], the same crate the teacher repository
//! uses for its diag-protocol and GSMTAP structs.

use deku::prelude::*;
use serde::{Deserialize, Serialize};

use crate::subscriber::Lai;

/// Which System Information message type produced a piece of aggregated
/// data. Used both to select a decode path and to track SI freshness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SiType {
    Si1,
    Si2,
    Si2bis,
    Si2ter,
    Si3,
    Si4,
    Si5,
    Si5bis,
    Si5ter,
    Si6,
}

bitflags::bitflags! {
    /// Freshness bits tracking which SI types have been decoded for the
    /// cell currently being aggregated (spec.md §3 "SI freshness bits").
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct SiFreshness: u16 {
        const SI1     = 1 << 0;
        const SI2     = 1 << 1;
        const SI2BIS  = 1 << 2;
        const SI2TER  = 1 << 3;
        const SI3     = 1 << 4;
        const SI4     = 1 << 5;
        const SI5     = 1 << 6;
        const SI5BIS  = 1 << 7;
        const SI5TER  = 1 << 8;
        const SI6     = 1 << 9;
    }
}

impl SiFreshness {
    pub fn for_type(ty: SiType) -> Self {
        match ty {
            SiType::Si1 => SiFreshness::SI1,
            SiType::Si2 => SiFreshness::SI2,
            SiType::Si2bis => SiFreshness::SI2BIS,
            SiType::Si2ter => SiFreshness::SI2TER,
            SiType::Si3 => SiFreshness::SI3,
            SiType::Si4 => SiFreshness::SI4,
            SiType::Si5 => SiFreshness::SI5,
            SiType::Si5bis => SiFreshness::SI5BIS,
            SiType::Si5ter => SiFreshness::SI5TER,
            SiType::Si6 => SiFreshness::SI6,
        }
    }
}

/// Cell options broadcast in SI3/SI4 (DTX policy, power control, radio
/// link timeout).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CellOptions {
    pub dtx_required: bool,
    pub dtx_allowed: bool,
    pub pwrc: bool,
    /// Radio link timeout, in SACCH multiframes (4..=64 per 04.08 table).
    pub radio_link_timeout: u8,
}

/// Cell-selection parameters broadcast in SI3/SI4.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CellSelectionParams {
    pub ms_txpwr_max_cch: u8,
    pub rxlev_access_min: u8,
    /// Cell reselect hysteresis, in dB (0, 2, 4, .. 14).
    pub cell_resel_hysteresis: u8,
    /// Non-EGPRS cell reselection info present.
    pub neci: bool,
    pub acs: bool,
    /// Extended reselection parameters (penalty time / temporary offset).
    pub cell_resel_offset: Option<u8>,
    pub temporary_offset: Option<u8>,
    pub penalty_time: Option<u8>,
}

/// RACH control parameters broadcast in SI1/SI3/SI4.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RachControl {
    pub reest_denied: bool,
    pub cell_barred: bool,
    pub tx_integer: u8,
    pub max_retrans: u8,
    /// Bit N set iff access class N is barred (classes 0..=9, 11..=15).
    pub access_class_barred: u16,
}

/// Control-channel description broadcast in SI3/SI4.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ControlChannelDescription {
    pub ccch_conf: u8,
    pub bs_ag_blks_res: u8,
    pub paging_multiframes: u8,
    /// T3212 timeout value in deci-hours (0 disables periodic LU).
    pub t3212_value: u8,
}

/// CBCH channel descriptor, present only when SI4 carries one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CbchDescriptor {
    pub arfcn: Option<u16>,
    pub timeslot: u8,
    pub subchannel: u8,
}

/// The aggregated, decoded state of one cell, built up across however many
/// SI messages have been seen so far (spec.md §3 `SysInfo record`).
#[derive(Debug, Clone, Default)]
pub struct SysInfo {
    pub mcc: u16,
    pub mnc: u16,
    pub lac: u16,
    pub cell_id: u16,
    pub bsic: u8,
    /// ARFCNs the serving SI2/2bis/2ter indicate as neighbours; stored as a
    /// plain de-duplicated list rather than a raw 1024-bit mask, since
    /// that's all any consumer (cell-selection neighbour builder) ever
    /// wants from it.
    pub neighbour_arfcns: Vec<u16>,
    pub cell_options: CellOptions,
    pub cell_sel_params: CellSelectionParams,
    pub rach_control: RachControl,
    pub control_channel_desc: ControlChannelDescription,
    pub cbch: Option<CbchDescriptor>,
    /// BA list (BCCH allocation), as decoded from SI2/SI5 in this cell's
    /// own signalling (distinct from the subscriber's persisted BA list
    /// in `ba_list.rs`, though the two get merged when stored).
    pub ba_list_arfcns: Vec<u16>,
    pub freshness: SiFreshness,
    pub nb_ext_ind: bool,
    pub si2ter_ind: bool,
}

impl SysInfo {
    /// A cell's SysInfo is "sufficient" once SI1+SI2+SI3 are present and
    /// any neighbour-extension indicators SI2 raised have themselves been
    /// satisfied (spec.md §4.1 Aggregation).
    pub fn sufficient(&self) -> bool {
        let base = self.freshness.contains(SiFreshness::SI1)
            && self.freshness.contains(SiFreshness::SI2)
            && self.freshness.contains(SiFreshness::SI3);
        if !base {
            return false;
        }
        if self.nb_ext_ind && !self.freshness.contains(SiFreshness::SI2BIS) {
            return false;
        }
        if self.si2ter_ind && !self.freshness.contains(SiFreshness::SI2TER) {
            return false;
        }
        true
    }

    pub fn lai(&self) -> Lai {
        Lai {
            mcc: self.mcc,
            mnc: self.mnc,
            lac: self.lac,
        }
    }
}

/// Classmark 1, as sent in LOCATION UPDATING REQUEST / CM SERVICE REQUEST
/// (04.08 §10.5.1.5). Encoded as a single octet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, DekuRead, DekuWrite)]
#[deku(endian = "big")]
pub struct Classmark1 {
    #[deku(bits = 1)]
    pub spare: u8,
    #[deku(bits = 3)]
    pub rev_level: u8,
    #[deku(bits = 1)]
    pub es_ind: u8,
    #[deku(bits = 1)]
    pub a5_1: u8,
    #[deku(bits = 2)]
    pub rf_power_capability: u8,
}

/// Classmark 2 (04.08 §10.5.1.6): classmark 1's fields plus a second and
/// third octet of capability bits. We model the fields this core's MM/RR
/// actually need to set and leave the rest at their spec-mandated zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, DekuRead, DekuWrite)]
#[deku(endian = "big")]
pub struct Classmark2 {
    #[deku(bits = 1)]
    pub spare1: u8,
    #[deku(bits = 3)]
    pub rev_level: u8,
    #[deku(bits = 1)]
    pub es_ind: u8,
    #[deku(bits = 1)]
    pub a5_1: u8,
    #[deku(bits = 2)]
    pub rf_power_capability: u8,
    #[deku(bits = 1)]
    pub spare2: u8,
    #[deku(bits = 1)]
    pub ps_capability: u8,
    #[deku(bits = 1)]
    pub ss_screen_indicator_hi: u8,
    #[deku(bits = 1)]
    pub sm_capability: u8,
    #[deku(bits = 1)]
    pub vbs: u8,
    #[deku(bits = 1)]
    pub vgcs: u8,
    #[deku(bits = 1)]
    pub fc: u8,
    #[deku(bits = 1)]
    pub cm3: u8,
    #[deku(bits = 1)]
    pub spare3: u8,
    #[deku(bits = 1)]
    pub lcsva_cap: u8,
    #[deku(bits = 1)]
    pub ucs2: u8,
    #[deku(bits = 1)]
    pub solsa: u8,
    #[deku(bits = 1)]
    pub cmsp: u8,
    #[deku(bits = 1)]
    pub a5_3: u8,
    #[deku(bits = 1)]
    pub a5_2: u8,
}

/// Classmark 3 field set (04.08 §10.5.1.7): multiband/multislot
/// capabilities. SPEC_FULL.md §3 item 7 documents this as fields-only,
/// no encoder — classmark 3 content never drives any FSM transition in
/// this core, only RR's classmark-change reporting carries it opaquely.
#[derive(Debug, Clone, Default)]
pub struct Classmark3 {
    pub multiband_supported: bool,
    pub a5_bits: u8,
    pub multislot_class: Option<u8>,
}

/// Encode a PLMN identity (MCC + 2 or 3 digit MNC) to the 3-byte format
/// used throughout 04.08 (and the BA-list file format, spec.md §6).
pub fn encode_plmn(mcc: u16, mnc: u16, mnc_is_3_digit: bool) -> [u8; 3] {
    let mcc_digits = [
        (mcc / 100 % 10) as u8,
        (mcc / 10 % 10) as u8,
        (mcc % 10) as u8,
    ];
    // A 2-digit MNC occupies only the tens/units positions; splitting it
    // as if it were a 3-digit value (hundreds/tens/units) would shift
    // every digit one place and corrupt the low byte below.
    let mnc_digits = if mnc_is_3_digit {
        [
            (mnc / 100 % 10) as u8,
            (mnc / 10 % 10) as u8,
            (mnc % 10) as u8,
        ]
    } else {
        [(mnc / 10 % 10) as u8, (mnc % 10) as u8, 0]
    };
    let mut encoded = [0u8; 3];
    encoded[0] = (mcc_digits[1] << 4) | mcc_digits[0];
    encoded[1] = if !mnc_is_3_digit {
        0xf0 | mcc_digits[2]
    } else {
        (mnc_digits[2] << 4) | mcc_digits[2]
    };
    encoded[2] = (mnc_digits[1] << 4) | mnc_digits[0];
    encoded
}

/// Decode a 3-byte PLMN identity back to (mcc, mnc, mnc_is_3_digit).
pub fn decode_plmn(bytes: [u8; 3]) -> (u16, u16, bool) {
    let mcc_digits = [bytes[0] & 0x0f, bytes[0] >> 4, bytes[1] & 0x0f];
    // The digit-count filler marker (0xf) lives in the high nibble of
    // byte 1 (the MNC's third digit slot), not the low nibble (which is
    // always the MCC's third digit).
    let mnc_is_3_digit = (bytes[1] >> 4) != 0xf;
    let mnc_digits = if mnc_is_3_digit {
        [bytes[2] & 0x0f, bytes[2] >> 4, bytes[1] >> 4]
    } else {
        [bytes[2] & 0x0f, bytes[2] >> 4, 0]
    };
    let mcc = mcc_digits[0] as u16 * 100 + mcc_digits[1] as u16 * 10 + mcc_digits[2] as u16;
    let mnc = if mnc_is_3_digit {
        mnc_digits[0] as u16 * 100 + mnc_digits[1] as u16 * 10 + mnc_digits[2] as u16
    } else {
        mnc_digits[0] as u16 * 10 + mnc_digits[1] as u16
    };
    (mcc, mnc, mnc_is_3_digit)
}

/// Encode a LAI (PLMN + LAC) as the 5-byte 04.08 format.
pub fn encode_lai(lai: &Lai, mnc_is_3_digit: bool) -> [u8; 5] {
    let plmn = encode_plmn(lai.mcc, lai.mnc, mnc_is_3_digit);
    let lac = lai.lac.to_be_bytes();
    [plmn[0], plmn[1], plmn[2], lac[0], lac[1]]
}

pub fn decode_lai(bytes: [u8; 5]) -> Lai {
    let (mcc, mnc, _) = decode_plmn([bytes[0], bytes[1], bytes[2]]);
    let lac = u16::from_be_bytes([bytes[3], bytes[4]]);
    Lai { mcc, mnc, lac }
}

/// L1 downlink primitives consumed by this core (spec.md §6).
#[derive(Debug, Clone, PartialEq)]
pub enum L1Downlink {
    PmRes { arfcn: u16, rxlev: u8 },
    PmDone,
    FbsbResp { arfcn: u16, bsic: u8, snr: u8 },
    FbsbErr { arfcn: u16 },
    CcchResp,
    LossInd,
    Reset,
    NeighPmInd { arfcn: u16, rxlev: u8 },
}

/// L1 uplink primitives produced by this core (spec.md §6).
#[derive(Debug, Clone, PartialEq)]
pub enum L1Uplink {
    Reset,
    PmReq { arfcns: Vec<u16> },
    FbsbReq {
        arfcn: u16,
        flags: u8,
        timeout_secs: u8,
        bsic: Option<u8>,
        ccch_mode: CcchMode,
        rxlev_expected: u8,
    },
    CcchReq,
    RachReq { chan_req: u8 },
    NeighPmReq { arfcns: Vec<u16> },
}

/// Inferred CCCH combination, used to parameterise FBSB requests
/// (spec.md §4.2 "Sync-and-read").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CcchMode {
    NonCombined,
    Combined,
}

/// One upper-layer SAP primitive (MMCC/MMSS/MMSMS/MMGCC/MMBCC), per
/// spec.md §6.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum UpperLayerSap {
    Mmcc,
    Mmss,
    Mmsms,
    Mmgcc,
    Mmbcc,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UpperLayerPrimitive {
    pub sap: UpperLayerSap,
    pub msg_type: String,
    pub reference: u32,
    pub transaction_id: u8,
    pub sapi: u8,
    pub cause: Option<u8>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plmn_encode_2digit_mnc_roundtrip() {
        let encoded = encode_plmn(208, 93, false);
        assert_eq!(encoded, [0x02, 0xf8, 0x39]);
        assert_eq!(decode_plmn(encoded), (208, 93, false));
    }

    #[test]
    fn plmn_encode_3digit_mnc_roundtrip() {
        let encoded = encode_plmn(1, 1, true);
        assert_eq!(decode_plmn(encoded), (1, 1, true));
    }

    #[test]
    fn lai_roundtrip() {
        let lai = Lai {
            mcc: 1,
            mnc: 1,
            lac: 0x0001,
        };
        let encoded = encode_lai(&lai, false);
        assert_eq!(decode_lai(encoded), lai);
    }

    #[test]
    fn sufficient_requires_si1_si2_si3() {
        let mut si = SysInfo::default();
        assert!(!si.sufficient());
        si.freshness = SiFreshness::SI1 | SiFreshness::SI2 | SiFreshness::SI3;
        assert!(si.sufficient());
    }

    #[test]
    fn sufficient_requires_si2bis_when_indicated() {
        let mut si = SysInfo::default();
        si.freshness = SiFreshness::SI1 | SiFreshness::SI2 | SiFreshness::SI3;
        si.nb_ext_ind = true;
        assert!(!si.sufficient());
        si.freshness |= SiFreshness::SI2BIS;
        assert!(si.sufficient());
    }

    #[test]
    fn classmark1_encodes_to_one_octet() {
        let cm1 = Classmark1 {
            spare: 0,
            rev_level: 2,
            es_ind: 1,
            a5_1: 0,
            rf_power_capability: 2,
        };
        let bytes = cm1.to_bytes().unwrap();
        assert_eq!(bytes.len(), 1);
        let (_, decoded) = Classmark1::from_bytes((&bytes, 0)).unwrap();
        assert_eq!(decoded, cm1);
    }
}
