//! BA-list (BCCH Allocation) persistence: the on-disk record format and
//! dirty-flag-gated save/load (spec.md §6, §3 "Supplemented Features").

use std::io::{self, Read, Write};

use bytes::Buf;
use thiserror::Error;

use crate::freqtable::NUM_ARFCN_INDICES;
use crate::subscriber::PlmnId;

#[derive(Error, Debug)]
pub enum BaListError {
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
    #[error("truncated record: need {need} bytes, got {got}")]
    Truncated { need: usize, got: usize },
    #[error("version header present but did not match \"{0}\"; file discarded")]
    VersionMismatch(String),
}

/// Version header written at the start of a BA-list file
/// (spec.md §6: `"osmocom BA V1\n"`).
pub const VERSION_HEADER: &str = "osmocom BA V1\n";

/// Bitmap byte width: 166 bytes cover 1328 bits, enough for all 1323
/// ARFCN indices this core tracks (spec.md §6: "166-byte bitmap").
pub const BITMAP_BYTES: usize = 166;

/// One on-disk BA-list record: a PLMN plus the bitmap of ARFCNs known to
/// be in its allocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BaListEntry {
    pub plmn: PlmnId,
    bitmap: [u8; BITMAP_BYTES],
    /// Set whenever `bitmap` changes since the last save, so a save pass
    /// that finds nothing dirty can skip the write entirely
    /// (SPEC_FULL.md §3 item 1).
    dirty: bool,
}

impl BaListEntry {
    pub fn new(plmn: PlmnId) -> Self {
        BaListEntry {
            plmn,
            bitmap: [0u8; BITMAP_BYTES],
            dirty: false,
        }
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn clear_dirty(&mut self) {
        self.dirty = false;
    }

    fn index_for_arfcn(arfcn: u16) -> Option<usize> {
        if arfcn < 1024 {
            Some(arfcn as usize)
        } else if (512..=810).contains(&arfcn) {
            Some(1024 + (arfcn - 512) as usize)
        } else {
            None
        }
    }

    /// Record `arfcn` as known-in-allocation. Returns whether this
    /// actually changed anything (and thus marked the entry dirty).
    pub fn insert(&mut self, arfcn: u16) -> bool {
        let Some(index) = Self::index_for_arfcn(arfcn) else {
            return false;
        };
        if index >= NUM_ARFCN_INDICES {
            return false;
        }
        let byte = index / 8;
        let bit = index % 8;
        let mask = 1u8 << bit;
        if self.bitmap[byte] & mask != 0 {
            return false;
        }
        self.bitmap[byte] |= mask;
        self.dirty = true;
        true
    }

    pub fn contains(&self, arfcn: u16) -> bool {
        match Self::index_for_arfcn(arfcn) {
            Some(index) if index < NUM_ARFCN_INDICES => {
                let byte = index / 8;
                let bit = index % 8;
                self.bitmap[byte] & (1 << bit) != 0
            }
            _ => false,
        }
    }

    pub fn arfcns(&self) -> Vec<u16> {
        (0..NUM_ARFCN_INDICES)
            .filter(|&index| {
                let byte = index / 8;
                let bit = index % 8;
                self.bitmap[byte] & (1 << bit) != 0
            })
            .filter_map(|index| {
                if index < 1024 {
                    Some(index as u16)
                } else {
                    Some(512 + (index - 1024) as u16)
                }
            })
            .collect()
    }

    fn to_record_bytes(&self) -> [u8; 4 + BITMAP_BYTES] {
        let mut out = [0u8; 4 + BITMAP_BYTES];
        out[0..2].copy_from_slice(&self.plmn.mcc.to_be_bytes());
        out[2..4].copy_from_slice(&self.plmn.mnc.to_be_bytes());
        out[4..].copy_from_slice(&self.bitmap);
        out
    }

    fn from_record_bytes(bytes: &[u8]) -> Result<Self, BaListError> {
        if bytes.len() < 4 + BITMAP_BYTES {
            return Err(BaListError::Truncated {
                need: 4 + BITMAP_BYTES,
                got: bytes.len(),
            });
        }
        let mut cursor = bytes;
        let mcc = cursor.get_u16();
        let mnc = cursor.get_u16();
        let mut bitmap = [0u8; BITMAP_BYTES];
        bitmap.copy_from_slice(&cursor[..BITMAP_BYTES]);
        Ok(BaListEntry {
            plmn: PlmnId { mcc, mnc },
            bitmap,
            dirty: false,
        })
    }
}

/// Save every entry to `writer`, prefixed by the version header. Skips the
/// write (but still writes the header and any already-dirty entries)
/// entries that are not dirty still get persisted once — the dirty flag
/// only gates *whether a save pass is triggered at all*, not which
/// entries within a triggered pass are written, since the file format has
/// no way to patch a single record in place.
pub fn save<W: Write>(writer: &mut W, entries: &[BaListEntry]) -> Result<(), BaListError> {
    writer.write_all(VERSION_HEADER.as_bytes())?;
    for entry in entries {
        writer.write_all(&entry.to_record_bytes())?;
    }
    Ok(())
}

/// Whether any entry needs saving at all (SPEC_FULL.md §3 item 1: skip the
/// write entirely when nothing changed since last save).
pub fn any_dirty(entries: &[BaListEntry]) -> bool {
    entries.iter().any(|e| e.is_dirty())
}

/// Load entries from `reader`. A version header, if present, must match
/// [`VERSION_HEADER`] exactly or the whole file is discarded
/// (spec.md §6: "version mismatch discards the file").
pub fn load<R: Read>(reader: &mut R) -> Result<Vec<BaListEntry>, BaListError> {
    let mut buf = Vec::new();
    reader.read_to_end(&mut buf)?;

    let record_size = 4 + BITMAP_BYTES;
    let body = if buf.starts_with(VERSION_HEADER.as_bytes()) {
        &buf[VERSION_HEADER.len()..]
    } else if looks_like_version_header(&buf) {
        return Err(BaListError::VersionMismatch(VERSION_HEADER.to_string()));
    } else {
        &buf[..]
    };

    let mut entries = Vec::new();
    for chunk in body.chunks(record_size) {
        if chunk.len() < record_size {
            break;
        }
        entries.push(BaListEntry::from_record_bytes(chunk)?);
    }
    Ok(entries)
}

/// Heuristic: a leading `"osmocom BA V"` prefix followed by anything other
/// than our exact version string is a version mismatch rather than a
/// headerless legacy file.
fn looks_like_version_header(buf: &[u8]) -> bool {
    buf.starts_with(b"osmocom BA V") && !buf.starts_with(VERSION_HEADER.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn insert_and_contains_roundtrip() {
        let mut entry = BaListEntry::new(PlmnId { mcc: 1, mnc: 1 });
        assert!(!entry.contains(42));
        assert!(entry.insert(42));
        assert!(entry.contains(42));
        assert!(entry.is_dirty());
    }

    #[test]
    fn insert_pcs_band_arfcn() {
        let mut entry = BaListEntry::new(PlmnId { mcc: 1, mnc: 1 });
        assert!(entry.insert(600));
        assert!(entry.contains(600));
        assert_eq!(entry.arfcns(), vec![600]);
    }

    #[test]
    fn duplicate_insert_does_not_redirty() {
        let mut entry = BaListEntry::new(PlmnId { mcc: 1, mnc: 1 });
        entry.insert(42);
        entry.clear_dirty();
        assert!(!entry.insert(42));
        assert!(!entry.is_dirty());
    }

    #[test]
    fn save_then_load_roundtrip() {
        let mut entry = BaListEntry::new(PlmnId { mcc: 1, mnc: 1 });
        entry.insert(42);
        entry.insert(600);
        let mut buf = Vec::new();
        save(&mut buf, &[entry.clone()]).unwrap();

        let loaded = load(&mut Cursor::new(buf)).unwrap();
        assert_eq!(loaded.len(), 1);
        assert!(loaded[0].contains(42));
        assert!(loaded[0].contains(600));
    }

    #[test]
    fn mismatched_version_header_discards_file() {
        let mut buf = b"osmocom BA V2\n".to_vec();
        buf.extend_from_slice(&[0u8; 170]);
        let result = load(&mut Cursor::new(buf));
        assert!(matches!(result, Err(BaListError::VersionMismatch(_))));
    }

    #[test]
    fn any_dirty_reports_across_entries() {
        let mut entries = vec![
            BaListEntry::new(PlmnId { mcc: 1, mnc: 1 }),
            BaListEntry::new(PlmnId { mcc: 2, mnc: 2 }),
        ];
        assert!(!any_dirty(&entries));
        entries[1].insert(10);
        assert!(any_dirty(&entries));
    }
}

impl Clone for BaListEntry {
    fn clone(&self) -> Self {
        BaListEntry {
            plmn: self.plmn,
            bitmap: self.bitmap,
            dirty: self.dirty,
        }
    }
}
