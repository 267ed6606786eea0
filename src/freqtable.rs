//! The ARFCN frequency table: one entry per channel the MS might camp on or
//! scan, covering GSM ARFCN 0..=1023 and, in the same flat index space, PCS
//! 1900 ARFCN 512..=810 (indices 1024..=1322). See spec.md §3.
//!
//! The table size here (1323) matches the original source's own loop bound
//! (`for i in 0..=1023+299`), which is the authoritative count: 1024 GSM
//! indices plus 299 PCS indices.

use bitflags::bitflags;

use crate::neighbour::NeighbourType;

/// Number of ARFCN-indexed slots in the frequency table.
pub const NUM_ARFCN_INDICES: usize = 1024 + 299;

/// First flat index that encodes a PCS 1900 ARFCN (512..=810).
pub const PCS_BASE_INDEX: usize = 1024;

/// Convert a flat table index into the ARFCN it represents.
pub fn index_to_arfcn(index: usize) -> Option<u16> {
    if index < 1024 {
        Some(index as u16)
    } else if index < NUM_ARFCN_INDICES {
        Some(512 + (index - PCS_BASE_INDEX) as u16)
    } else {
        None
    }
}

bitflags! {
    /// Per-ARFCN state flags. Named after the `GSM322_CS_FLAG_*` bits in the
    /// original cell-selection table.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ArfcnFlags: u16 {
        /// This ARFCN is within a band the MS hardware supports.
        const SUPPORT      = 1 << 0;
        /// Power has been measured on this ARFCN this scan pass.
        const POWER        = 1 << 1;
        /// Measured rxlev is above the band's minimum.
        const SIGNAL       = 1 << 2;
        /// SI1..SI4 (as required) have been received for this ARFCN.
        const SYSINFO      = 1 << 3;
        /// This ARFCN is a member of the serving PLMN's BA list.
        const BA           = 1 << 4;
        /// SI3/SI4 marked this cell as barred.
        const BARRED       = 1 << 5;
        /// This cell's LAI is on the forbidden-LA list.
        const FORBIDDEN_LA = 1 << 6;
        /// Marked as a survivor of the last `gsm322_cs_select` pass
        /// ("temporary available and allowable").
        const TEMP_AA      = 1 << 7;
        /// This ARFCN is currently camped on / selected.
        const SELECTED     = 1 << 8;
    }
}

/// A single frequency-table entry. Most entries carry no `SysInfo`; one is
/// allocated only once the ARFCN has actually been synced to (spec.md §3
/// lifecycles).
#[derive(Debug, Clone, Default)]
pub struct FreqEntry {
    pub flags: ArfcnFlagsStore,
    pub rxlev: u8,
    pub sysinfo: Option<Box<crate::message::SysInfo>>,
}

/// Wraps `ArfcnFlags` so `FreqEntry` can `#[derive(Default)]` (bitflags'
/// generated type doesn't implement `Default` the way we want without this).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArfcnFlagsStore(pub ArfcnFlags);

impl Default for ArfcnFlagsStore {
    fn default() -> Self {
        ArfcnFlagsStore(ArfcnFlags::empty())
    }
}

impl std::ops::Deref for ArfcnFlagsStore {
    type Target = ArfcnFlags;
    fn deref(&self) -> &ArfcnFlags {
        &self.0
    }
}

impl std::ops::DerefMut for ArfcnFlagsStore {
    fn deref_mut(&mut self) -> &mut ArfcnFlags {
        &mut self.0
    }
}

/// The full frequency table, owned by one MS instance (spec.md §5: "owned by
/// the MS instance and mutated only from its dispatch loop").
pub struct FreqTable {
    entries: Vec<FreqEntry>,
    selected: Option<usize>,
}

impl FreqTable {
    pub fn new() -> Self {
        FreqTable {
            entries: vec![FreqEntry::default(); NUM_ARFCN_INDICES],
            selected: None,
        }
    }

    pub fn get(&self, index: usize) -> Option<&FreqEntry> {
        self.entries.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut FreqEntry> {
        self.entries.get_mut(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &FreqEntry)> {
        self.entries.iter().enumerate()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (usize, &mut FreqEntry)> {
        self.entries.iter_mut().enumerate()
    }

    /// The currently-selected ARFCN's index, if any. Invariant (a) in
    /// spec.md §3: at most one is ever selected.
    pub fn selected_index(&self) -> Option<usize> {
        self.selected
    }

    /// Mark `index` as selected, clearing any previous selection. Enforces
    /// invariant (a).
    pub fn select(&mut self, index: usize) {
        if let Some(prev) = self.selected.take() {
            if let Some(entry) = self.entries.get_mut(prev) {
                entry.flags.remove(ArfcnFlags::SELECTED);
            }
        }
        if let Some(entry) = self.entries.get_mut(index) {
            entry.flags.insert(ArfcnFlags::SELECTED);
            self.selected = Some(index);
        }
    }

    pub fn deselect(&mut self) {
        if let Some(prev) = self.selected.take() {
            if let Some(entry) = self.entries.get_mut(prev) {
                entry.flags.remove(ArfcnFlags::SELECTED);
            }
        }
    }

    /// Free a synced-to ARFCN's SysInfo and clear its SYSINFO bit (spec.md
    /// §3 lifecycles: "freed on loss-of-signal or scan flush").
    pub fn clear_sysinfo(&mut self, index: usize) {
        if let Some(entry) = self.entries.get_mut(index) {
            entry.sysinfo = None;
            entry.flags.remove(ArfcnFlags::SYSINFO);
        }
    }

    /// Clear every TEMP_AA flag ahead of a new `gsm322_cs_select` pass.
    pub fn clear_temp_aa(&mut self) {
        for entry in &mut self.entries {
            entry.flags.remove(ArfcnFlags::TEMP_AA);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for FreqTable {
    fn default() -> Self {
        Self::new()
    }
}

/// A type bit recorded against a decoded neighbour-ARFCN, selected by the
/// caller of the frequency-list decoder (spec.md §4.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodedFreqType(pub NeighbourType);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_to_arfcn_gsm_range() {
        assert_eq!(index_to_arfcn(0), Some(0));
        assert_eq!(index_to_arfcn(1023), Some(1023));
    }

    #[test]
    fn index_to_arfcn_pcs_range() {
        assert_eq!(index_to_arfcn(1024), Some(512));
        assert_eq!(index_to_arfcn(1322), Some(810));
        assert_eq!(index_to_arfcn(1323), None);
    }

    #[test]
    fn select_enforces_single_selection() {
        let mut table = FreqTable::new();
        table.select(10);
        table.select(20);
        assert_eq!(table.selected_index(), Some(20));
        assert!(!table.get(10).unwrap().flags.contains(ArfcnFlags::SELECTED));
        assert!(table.get(20).unwrap().flags.contains(ArfcnFlags::SELECTED));
    }

    #[test]
    fn table_has_expected_len() {
        assert_eq!(FreqTable::new().len(), NUM_ARFCN_INDICES);
    }
}
