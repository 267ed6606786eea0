//! Subscriber-side state: SIM identity, registration state, and the
//! forbidden-PLMN / forbidden-LA lists (spec.md §3).

/// Mobility-management registration state of the subscriber
/// (spec.md §3 `ustate`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UState {
    /// U0: no valid LAI stored, never updated.
    Null,
    /// U1: updated, LAI is valid and current.
    Updated,
    /// U2: last update attempt failed or none has succeeded.
    NotUpdated,
    /// U3: roaming not allowed in this location area.
    RoamingNotAllowed,
}

/// A cell/location identity: MCC + MNC + LAC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Lai {
    pub mcc: u16,
    pub mnc: u16,
    pub lac: u16,
}

/// A bare PLMN identity (no LAC).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PlmnId {
    pub mcc: u16,
    pub mnc: u16,
}

impl Lai {
    pub fn plmn(&self) -> PlmnId {
        PlmnId {
            mcc: self.mcc,
            mnc: self.mnc,
        }
    }
}

/// Cause codes recorded against forbidden entries (subset of GSM 04.08
/// annex G reject causes relevant to forbidden-list bookkeeping).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForbiddenCause {
    PlmnNotAllowed,
    LaNotAllowed,
    RoamingNotAllowed,
    NoSuitableCellsInLa,
}

/// The subscriber's identity and registration state, as loaded from the SIM
/// collaborator (out of scope per spec.md §1; this struct is the contract
/// surface, populated once at MS startup).
#[derive(Debug, Clone)]
pub struct Subscriber {
    pub sim_valid: bool,
    pub imsi: String,
    pub tmsi: Option<u32>,
    pub rplmn: Option<Lai>,
    pub ustate: UState,
    /// Ciphering key sequence number (0..=6 valid, 7 = "no key available").
    pub key_seq: u8,
    pub imsi_attached: bool,
    pub access_classes: u16,
    pub emergency_only: bool,
    /// SIM PLMN-selector list, in the subscriber-preferred order.
    pub plmn_selector_list: Vec<PlmnId>,
    /// Forbidden PLMNs ("PLMN not allowed"/equivalent causes).
    pub forbidden_plmns: Vec<(PlmnId, ForbiddenCause)>,
    /// Forbidden location areas, keyed by (MCC, MNC, LAC).
    pub forbidden_las: Vec<Lai>,
    /// Home-PLMN periodic search timer base, in units of 360s
    /// (`t6m_hplmn`); the running timer value is `t6m_hplmn * 360`.
    pub t6m_hplmn: u16,
    pub always_search_hplmn: bool,
}

impl Subscriber {
    pub fn new(imsi: impl Into<String>) -> Self {
        Subscriber {
            sim_valid: true,
            imsi: imsi.into(),
            tmsi: None,
            rplmn: None,
            ustate: UState::Null,
            key_seq: 7,
            imsi_attached: false,
            access_classes: 0xffff,
            emergency_only: false,
            plmn_selector_list: Vec::new(),
            forbidden_plmns: Vec::new(),
            forbidden_las: Vec::new(),
            t6m_hplmn: 30, // 30*360s = 10800s = 3h, spec.md §4.3 default
            always_search_hplmn: false,
        }
    }

    /// Home PLMN, derived from the IMSI's MCC/MNC (first 5 or 6 digits).
    pub fn hplmn(&self) -> Option<PlmnId> {
        if self.imsi.len() < 6 {
            return None;
        }
        let mcc: u16 = self.imsi.get(0..3)?.parse().ok()?;
        // GSM doesn't encode MNC length in the IMSI; 2-digit MNC is assumed
        // here the same way the original source's `gsm_match_mnc` compares
        // against both candidate lengths and the original takes the
        // 2-digit form for display. Distinguishing 2 vs 3 digit MNC from
        // IMSI alone is inherently ambiguous without the SIM's MNC-length
        // byte (out of scope, §1); callers that need the 3-digit form
        // should use the SIM-provided PlmnId directly instead.
        let mnc: u16 = self.imsi.get(3..5)?.parse().ok()?;
        Some(PlmnId { mcc, mnc })
    }

    pub fn is_forbidden_plmn(&self, plmn: PlmnId) -> Option<ForbiddenCause> {
        self.forbidden_plmns
            .iter()
            .find(|(p, _)| *p == plmn)
            .map(|(_, c)| *c)
    }

    pub fn is_forbidden_la(&self, lai: Lai) -> bool {
        self.forbidden_las.contains(&lai)
    }

    pub fn add_forbidden_plmn(&mut self, plmn: PlmnId, cause: ForbiddenCause) {
        if let Some(entry) = self.forbidden_plmns.iter_mut().find(|(p, _)| *p == plmn) {
            entry.1 = cause;
        } else {
            self.forbidden_plmns.push((plmn, cause));
        }
    }

    pub fn add_forbidden_la(&mut self, lai: Lai) {
        if !self.forbidden_las.contains(&lai) {
            self.forbidden_las.push(lai);
        }
    }

    /// Apply the return-to-idle `NOT_UPDATED` transition: LAI and TMSI are
    /// invalidated and the key sequence is marked unavailable (spec.md §4.5
    /// step 7, §8 invariant on `lupd_attempt`).
    pub fn mark_not_updated(&mut self) {
        self.ustate = UState::NotUpdated;
        self.tmsi = None;
        self.rplmn = None;
        self.key_seq = 7;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hplmn_derived_from_imsi() {
        let subscr = Subscriber::new("001010000000001");
        assert_eq!(
            subscr.hplmn(),
            Some(PlmnId { mcc: 1, mnc: 1 })
        );
    }

    #[test]
    fn forbidden_plmn_roundtrip() {
        let mut subscr = Subscriber::new("001010000000001");
        let plmn = PlmnId { mcc: 2, mnc: 2 };
        assert!(subscr.is_forbidden_plmn(plmn).is_none());
        subscr.add_forbidden_plmn(plmn, ForbiddenCause::PlmnNotAllowed);
        assert_eq!(
            subscr.is_forbidden_plmn(plmn),
            Some(ForbiddenCause::PlmnNotAllowed)
        );
    }

    #[test]
    fn mark_not_updated_clears_identity() {
        let mut subscr = Subscriber::new("001010000000001");
        subscr.tmsi = Some(0xdead_beef);
        subscr.rplmn = Some(Lai { mcc: 1, mnc: 1, lac: 1 });
        subscr.key_seq = 3;
        subscr.mark_not_updated();
        assert_eq!(subscr.ustate, UState::NotUpdated);
        assert!(subscr.tmsi.is_none());
        assert!(subscr.rplmn.is_none());
        assert_eq!(subscr.key_seq, 7);
    }
}
