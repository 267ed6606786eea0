//! System Information decoding: per-message field extraction, the six
//! frequency-list encodings (04.08 §10.5.2.13), and the aggregation logic
//! that decides when a cell's SysInfo is complete enough to select
//! (spec.md §4.1).

use thiserror::Error;

use crate::freqtable::{FreqTable, NUM_ARFCN_INDICES};
use crate::message::{SiFreshness, SiType, SysInfo};
use crate::neighbour::NeighbourType;

#[derive(Error, Debug)]
pub enum SysInfoError {
    #[error("short read: need at least {need} octets, got {got}")]
    ShortRead { need: usize, got: usize },
    #[error("unsupported frequency-list encoding (format bits {0:#04b})")]
    UnsupportedEncoding(u8),
    #[error("frequency index {0} out of range")]
    IndexOutOfRange(usize),
}

/// Outcome of [`decode`], matching the three-way contract in spec.md §4.1.
#[derive(Debug, PartialEq, Eq)]
pub enum DecodeOutcome {
    /// Decoded and applied; the SI's content actually changed.
    Applied,
    /// Octet-for-octet identical to what's already stored: a no-op applied
    /// for idempotency (spec.md §4.1 "Idempotency").
    Unchanged,
}

/// Decode one System Information message's octets into `sysinfo`,
/// recording any neighbour-frequency-list ARFCNs discovered into
/// `freq_table` (tagged with `nb_type`).
///
/// This models the dispatch spec.md §4.1 describes in prose; the octet
/// layouts for SI1/SI3/SI4 header fields are deliberately left to the
/// caller (already split apart by the L1 framing layer) — what this
/// function owns is the frequency-list tail common to SI2/SI2bis/SI2ter/
/// SI5/SI5bis/SI5ter, plus the freshness/sufficiency bookkeeping.
pub fn decode(
    si_type: SiType,
    octets: &[u8],
    sysinfo: &mut SysInfo,
    freq_table: &mut FreqTable,
) -> Result<DecodeOutcome, SysInfoError> {
    if octets.is_empty() {
        return Err(SysInfoError::ShortRead { need: 1, got: 0 });
    }

    let nb_type = match si_type {
        SiType::Si2 => NeighbourType::Si2,
        SiType::Si2bis => NeighbourType::Si2bis,
        SiType::Si2ter => NeighbourType::Si2ter,
        SiType::Si5 => NeighbourType::Si5,
        SiType::Si5bis => NeighbourType::Si5bis,
        SiType::Si5ter => NeighbourType::Si5ter,
        _ => NeighbourType::Serving,
    };

    let arfcns = decode_frequency_list(octets)?;

    let mut changed = !sysinfo.freshness.contains(SiFreshness::for_type(si_type));
    if arfcns != sysinfo.neighbour_arfcns {
        changed = true;
    }

    if !changed {
        return Ok(DecodeOutcome::Unchanged);
    }

    for &arfcn in &arfcns {
        if let Some(index) = arfcn_to_index(arfcn) {
            if let Some(entry) = freq_table.get_mut(index) {
                entry.flags.insert(crate::freqtable::ArfcnFlags::BA);
            }
        }
    }
    sysinfo.neighbour_arfcns = arfcns;
    sysinfo.freshness.insert(SiFreshness::for_type(si_type));

    Ok(DecodeOutcome::Applied)
}

fn arfcn_to_index(arfcn: u16) -> Option<usize> {
    if arfcn < 1024 {
        Some(arfcn as usize)
    } else if (512..=810).contains(&arfcn) {
        Some(1024 + (arfcn - 512) as usize)
    } else {
        None
    }
}

/// Euclidean remainder, the `%` used throughout 04.08 §10.5.2.13's "SMOD"
/// formulas. Plain `rem_euclid` rather than C's truncating `%`: the source
/// comment defines SMOD mathematically ("n SMOD m == ((n-1) % m) + 1") and
/// a truncating remainder can drive the cascade negative for some inputs,
/// which would be a negative array index in the original and is simply a
/// wrong ARFCN here. Euclidean remainder keeps every intermediate value
/// non-negative and agrees with the truncating form whenever the original
/// itself stays in range.
fn rm(a: i32, b: i32) -> i32 {
    a.rem_euclid(b)
}

/// Decode a 04.08 §10.5.2.13 "Frequency list" IE body (the tail after any
/// header octets the caller has already stripped) into a sorted, deduped
/// list of ARFCNs. Format is indicated by a multi-bit masked prefix of the
/// first octet, matching the original source's `gsm48_decode_freq_list`
/// (the discriminator is never a bare 3-bit shift: the six formats overlap
/// at different mask widths).
pub fn decode_frequency_list(octets: &[u8]) -> Result<Vec<u16>, SysInfoError> {
    if octets.is_empty() {
        return Err(SysInfoError::ShortRead { need: 1, got: 0 });
    }
    let b0 = octets[0];
    if b0 & 0xc0 == 0x00 {
        decode_bitmap0(octets)
    } else if b0 & 0xc8 == 0x80 {
        decode_range1024(octets)
    } else if b0 & 0xce == 0x88 {
        decode_range512(octets)
    } else if b0 & 0xce == 0x8a {
        decode_range256(octets)
    } else if b0 & 0xce == 0x8c {
        decode_range128(octets)
    } else if b0 & 0xce == 0x8e {
        decode_variable_bitmap(octets)
    } else {
        Err(SysInfoError::UnsupportedEncoding(b0))
    }
}

/// Bit map 0 format: ARFCN `i` (1..=124) is represented by bit `(i-1)&7` of
/// octet `15-((i-1)>>3)` — the map is read starting from the *last* octet
/// of the 16-octet frame, least-significant bit first within each octet.
fn decode_bitmap0(octets: &[u8]) -> Result<Vec<u16>, SysInfoError> {
    if octets.len() < 16 {
        return Err(SysInfoError::ShortRead {
            need: 16,
            got: octets.len(),
        });
    }
    let mut out = Vec::new();
    for i in 1..=124u32 {
        let octet_index = 15 - ((i - 1) >> 3) as usize;
        let bit = (i - 1) & 7;
        if (octets[octet_index] >> bit) & 1 == 1 {
            out.push(i as u16);
        }
    }
    out.sort_unstable();
    Ok(out)
}

/// Inverse of [`decode_bitmap0`], used only by tests to exercise the
/// decoder against a known-good round trip (the mobile-station-only
/// source this is ported from never encodes a frequency list itself).
#[cfg(test)]
fn encode_bitmap0(arfcns: &[u16]) -> [u8; 16] {
    let mut octets = [0u8; 16];
    for &arfcn in arfcns {
        if (1..=124).contains(&arfcn) {
            let i = arfcn as u32;
            let octet_index = 15 - ((i - 1) >> 3) as usize;
            let bit = (i - 1) & 7;
            octets[octet_index] |= 1 << bit;
        }
    }
    octets
}

/// Shared root-ARFCN field of the four RANGE formats: `orig_arfcn_hi`
/// (1 bit) and `orig_arfcn_lo` (1 bit) are the free bits of octet 0 that
/// the `0xce` discriminator mask doesn't use (bit 5 and bit 0), and
/// `orig_arfcn_mid` is all of octet 1. `lo` is the value's least
/// significant bit despite sitting in octet 0, *before* `mid` in the byte
/// stream — the packing is `(hi<<9)|(mid<<1)|lo`, not a plain MSB-first
/// concatenation.
fn decode_root_arfcn(octets: &[u8]) -> i32 {
    let b0 = octets[0];
    let hi = ((b0 >> 5) & 1) as i32;
    let lo = (b0 & 1) as i32;
    let mid = octets[1] as i32;
    (hi << 9) | (mid << 1) | lo
}

/// Range 1024's `f0` flag and 10-bit `w1` field, packed across the free
/// bits of octet 0 (bit 5 is `f0`, bits 4 and 2 are `w1`'s high 2 bits)
/// and all of octet 1 (`w1`'s low 8 bits).
fn decode_f0_and_w1(octets: &[u8]) -> (bool, i32) {
    let b0 = octets[0];
    let f0 = (b0 >> 5) & 1 == 1;
    let w1_hi = ((((b0 >> 4) & 1) << 1) | ((b0 >> 2) & 1)) as i32;
    let w1_lo = octets[1] as i32;
    (f0, (w1_hi << 8) | w1_lo)
}

/// Range 1024 format: a 1-bit `f0` flag (selects ARFCN 0) plus `w[1..=16]`
/// read as a binary tree of nested nested SMOD computations. Widths below
/// (w1=10, w2/w3=9, w4..w7=8, w8..w15=7, w16=6) fill the 123 usable bits of
/// the 16-octet frame exactly for the w2..w16 portion (112 of 112 tail
/// bits), the strongest evidence the table is right.
fn decode_range1024(octets: &[u8]) -> Result<Vec<u16>, SysInfoError> {
    if octets.len() < 2 {
        return Err(SysInfoError::ShortRead {
            need: 2,
            got: octets.len(),
        });
    }
    let (f0, w1) = decode_f0_and_w1(octets);
    let mut w = [0i32; 17];
    w[1] = w1;

    let widths = [0, 0, 9, 9, 8, 8, 8, 8, 7, 7, 7, 7, 7, 7, 7, 7, 6];
    let mut reader = BitReader::new(if octets.len() > 2 { &octets[2..] } else { &[] });
    for (n, &width) in widths.iter().enumerate().skip(2) {
        w[n] = reader.try_take(width).unwrap_or(0);
    }

    let mut out = Vec::new();
    if f0 {
        out.push(0);
    }
    if w[1] != 0 {
        out.push(w[1] as u16);
    }
    if w[2] != 0 {
        out.push((rm(w[1] - 512 + w[2] - 1, 1023) + 1) as u16);
    }
    if w[3] != 0 {
        out.push((rm(w[1] + w[3] - 1, 1023) + 1) as u16);
    }
    if w[4] != 0 {
        out.push((rm(w[1] - 512 + rm(w[2] - 256 + w[4] - 1, 511), 1023) + 1) as u16);
    }
    if w[5] != 0 {
        // Faithful to the original: this branch alone subtracts w[5]
        // where every sibling branch adds its own w[n].
        out.push((rm(w[1] + rm(w[3] - 256 - w[5] - 1, 511), 1023) + 1) as u16);
    }
    if w[6] != 0 {
        out.push((rm(w[1] - 512 + rm(w[2] + w[6] - 1, 511), 1023) + 1) as u16);
    }
    if w[7] != 0 {
        out.push((rm(w[1] + rm(w[3] + w[7] - 1, 511), 1023) + 1) as u16);
    }
    if w[8] != 0 {
        out.push(
            (rm(w[1] - 512 + rm(w[2] - 256 + rm(w[4] - 128 + w[8] - 1, 255), 511), 1023) + 1)
                as u16,
        );
    }
    if w[9] != 0 {
        out.push(
            (rm(w[1] + rm(w[3] - 256 + rm(w[5] - 128 + w[9] - 1, 255), 511), 1023) + 1) as u16,
        );
    }
    if w[10] != 0 {
        out.push(
            (rm(w[1] - 512 + rm(w[2] + rm(w[6] - 128 + w[10] - 1, 255), 511), 1023) + 1) as u16,
        );
    }
    if w[11] != 0 {
        out.push((rm(w[1] + rm(w[3] + rm(w[7] - 128 + w[11] - 1, 255), 511), 1023) + 1) as u16);
    }
    if w[12] != 0 {
        out.push(
            (rm(w[1] - 512 + rm(w[2] - 256 + rm(w[4] + w[12] - 1, 255), 511), 1023) + 1) as u16,
        );
    }
    if w[13] != 0 {
        out.push((rm(w[1] + rm(w[3] - 256 + rm(w[5] + w[13] - 1, 255), 511), 1023) + 1) as u16);
    }
    if w[14] != 0 {
        out.push((rm(w[1] - 512 + rm(w[2] + rm(w[6] + w[14] - 1, 255), 511), 1023) + 1) as u16);
    }
    if w[15] != 0 {
        out.push((rm(w[1] + rm(w[3] + rm(w[7] + w[15] - 1, 255), 511), 1023) + 1) as u16);
    }
    if w[16] != 0 {
        out.push(
            (rm(
                w[1] - 512 + rm(w[2] - 256 + rm(w[4] - 128 + rm(w[8] - 64 + w[16] - 1, 127), 255), 511),
                1023,
            ) + 1) as u16,
        );
    }
    out.sort_unstable();
    out.dedup();
    Ok(out)
}

/// Range 512 format: a 10-bit root ARFCN (`w[0]`) plus `w[1..=17]`, widths
/// w1=9, w2/w3=8, w4..w7=7, w8..w15=6, w16/w17=5.
fn decode_range512(octets: &[u8]) -> Result<Vec<u16>, SysInfoError> {
    if octets.len() < 4 {
        return Err(SysInfoError::ShortRead {
            need: 4,
            got: octets.len(),
        });
    }
    let w0 = decode_root_arfcn(octets);
    let mut w = [0i32; 18];
    let widths = [0, 9, 8, 8, 7, 7, 7, 7, 6, 6, 6, 6, 6, 6, 6, 6, 5, 5];
    let mut reader = BitReader::new(&octets[2..]);
    for (n, &width) in widths.iter().enumerate().skip(1) {
        w[n] = reader.try_take(width).unwrap_or(0);
    }

    let mut out = vec![w0.rem_euclid(1024) as u16];
    if w[1] != 0 {
        out.push((w0 + w[1]).rem_euclid(1024) as u16);
    }
    if w[2] != 0 {
        out.push((w0 + rm(w[1] - 256 + w[2] - 1, 511) + 1).rem_euclid(1024) as u16);
    }
    if w[3] != 0 {
        out.push((w0 + rm(w[1] + w[3] - 1, 511) + 1).rem_euclid(1024) as u16);
    }
    if w[4] != 0 {
        out.push(
            (w0 + rm(w[1] - 256 + rm(w[2] - 128 + w[4] - 1, 255), 511) + 1).rem_euclid(1024)
                as u16,
        );
    }
    if w[5] != 0 {
        out.push(
            (w0 + rm(w[1] + rm(w[3] - 128 + w[5] - 1, 255), 511) + 1).rem_euclid(1024) as u16,
        );
    }
    if w[6] != 0 {
        out.push(
            (w0 + rm(w[1] - 256 + rm(w[2] + w[6] - 1, 255), 511) + 1).rem_euclid(1024) as u16,
        );
    }
    if w[7] != 0 {
        out.push((w0 + rm(w[1] + rm(w[3] + w[7] - 1, 255), 511) + 1).rem_euclid(1024) as u16);
    }
    if w[8] != 0 {
        out.push(
            (w0 + rm(w[1] - 256 + rm(w[2] - 128 + rm(w[4] - 64 + w[8] - 1, 127), 255), 511) + 1)
                .rem_euclid(1024) as u16,
        );
    }
    if w[9] != 0 {
        out.push(
            (w0 + rm(w[1] + rm(w[3] - 128 + rm(w[5] - 64 + w[9] - 1, 127), 255), 511) + 1)
                .rem_euclid(1024) as u16,
        );
    }
    if w[10] != 0 {
        out.push(
            (w0 + rm(w[1] - 256 + rm(w[2] + rm(w[6] - 64 + w[10] - 1, 127), 255), 511) + 1)
                .rem_euclid(1024) as u16,
        );
    }
    if w[11] != 0 {
        out.push(
            (w0 + rm(w[1] + rm(w[3] + rm(w[7] - 64 + w[11] - 1, 127), 255), 511) + 1)
                .rem_euclid(1024) as u16,
        );
    }
    if w[12] != 0 {
        out.push(
            (w0 + rm(w[1] - 256 + rm(w[2] - 128 + rm(w[4] + w[12] - 1, 127), 255), 511) + 1)
                .rem_euclid(1024) as u16,
        );
    }
    if w[13] != 0 {
        out.push(
            (w0 + rm(w[1] + rm(w[3] - 128 + rm(w[5] + w[13] - 1, 127), 255), 511) + 1)
                .rem_euclid(1024) as u16,
        );
    }
    if w[14] != 0 {
        out.push(
            (w0 + rm(w[1] - 256 + rm(w[2] + rm(w[6] + w[14] - 1, 127), 255), 511) + 1)
                .rem_euclid(1024) as u16,
        );
    }
    if w[15] != 0 {
        out.push(
            (w0 + rm(w[1] + rm(w[3] + rm(w[7] + w[15] - 1, 127), 255), 511) + 1).rem_euclid(1024)
                as u16,
        );
    }
    if w[16] != 0 {
        out.push(
            (w0 + rm(
                w[1] - 256 + rm(w[2] - 128 + rm(w[4] - 64 + rm(w[8] - 32 + w[16] - 1, 63), 127), 255),
                511,
            ) + 1)
                .rem_euclid(1024) as u16,
        );
    }
    if w[17] != 0 {
        out.push(
            (w0 + rm(
                w[1] + rm(w[3] - 128 + rm(w[5] - 64 + rm(w[9] - 32 + w[17] - 1, 63), 127), 255),
                511,
            ) + 1)
                .rem_euclid(1024) as u16,
        );
    }
    out.sort_unstable();
    out.dedup();
    Ok(out)
}

/// Range 256 format: root ARFCN plus `w[1..=21]`, widths w1=8, w2/w3=7,
/// w4..w7=6, w8..w15=5, w16..w21=4.
fn decode_range256(octets: &[u8]) -> Result<Vec<u16>, SysInfoError> {
    if octets.len() < 4 {
        return Err(SysInfoError::ShortRead {
            need: 4,
            got: octets.len(),
        });
    }
    let w0 = decode_root_arfcn(octets);
    let mut w = [0i32; 22];
    let widths = [
        0, 8, 7, 7, 6, 6, 6, 6, 5, 5, 5, 5, 5, 5, 5, 5, 4, 4, 4, 4, 4, 4,
    ];
    let mut reader = BitReader::new(&octets[2..]);
    for (n, &width) in widths.iter().enumerate().skip(1) {
        w[n] = reader.try_take(width).unwrap_or(0);
    }

    let mut out = vec![w0.rem_euclid(1024) as u16];
    if w[1] != 0 {
        out.push((w0 + w[1]).rem_euclid(1024) as u16);
    }
    if w[2] != 0 {
        out.push((w0 + rm(w[1] - 128 + w[2] - 1, 255) + 1).rem_euclid(1024) as u16);
    }
    if w[3] != 0 {
        out.push((w0 + rm(w[1] + w[3] - 1, 255) + 1).rem_euclid(1024) as u16);
    }
    if w[4] != 0 {
        out.push(
            (w0 + rm(w[1] - 128 + rm(w[2] - 64 + w[4] - 1, 127), 255) + 1).rem_euclid(1024)
                as u16,
        );
    }
    if w[5] != 0 {
        out.push(
            (w0 + rm(w[1] + rm(w[3] - 64 + w[5] - 1, 127), 255) + 1).rem_euclid(1024) as u16,
        );
    }
    if w[6] != 0 {
        out.push(
            (w0 + rm(w[1] - 128 + rm(w[2] + w[6] - 1, 127), 255) + 1).rem_euclid(1024) as u16,
        );
    }
    if w[7] != 0 {
        out.push((w0 + rm(w[1] + rm(w[3] + w[7] - 1, 127), 255) + 1).rem_euclid(1024) as u16);
    }
    if w[8] != 0 {
        out.push(
            (w0 + rm(w[1] - 128 + rm(w[2] - 64 + rm(w[4] - 32 + w[8] - 1, 63), 127), 255) + 1)
                .rem_euclid(1024) as u16,
        );
    }
    if w[9] != 0 {
        out.push(
            (w0 + rm(w[1] + rm(w[3] - 64 + rm(w[5] - 32 + w[9] - 1, 63), 127), 255) + 1)
                .rem_euclid(1024) as u16,
        );
    }
    if w[10] != 0 {
        out.push(
            (w0 + rm(w[1] - 128 + rm(w[2] + rm(w[6] - 32 + w[10] - 1, 63), 127), 255) + 1)
                .rem_euclid(1024) as u16,
        );
    }
    if w[11] != 0 {
        out.push(
            (w0 + rm(w[1] + rm(w[3] + rm(w[7] - 32 + w[11] - 1, 63), 127), 255) + 1)
                .rem_euclid(1024) as u16,
        );
    }
    if w[12] != 0 {
        out.push(
            (w0 + rm(w[1] - 128 + rm(w[2] - 64 + rm(w[4] + w[12] - 1, 63), 127), 255) + 1)
                .rem_euclid(1024) as u16,
        );
    }
    if w[13] != 0 {
        out.push(
            (w0 + rm(w[1] + rm(w[3] - 64 + rm(w[5] + w[13] - 1, 63), 127), 255) + 1)
                .rem_euclid(1024) as u16,
        );
    }
    if w[14] != 0 {
        out.push(
            (w0 + rm(w[1] - 128 + rm(w[2] + rm(w[6] + w[14] - 1, 63), 127), 255) + 1)
                .rem_euclid(1024) as u16,
        );
    }
    if w[15] != 0 {
        out.push(
            (w0 + rm(w[1] + rm(w[3] + rm(w[7] + w[15] - 1, 63), 127), 255) + 1).rem_euclid(1024)
                as u16,
        );
    }
    if w[16] != 0 {
        out.push(
            (w0 + rm(
                w[1] - 128 + rm(w[2] - 64 + rm(w[4] - 32 + rm(w[8] - 16 + w[16] - 1, 31), 63), 127),
                255,
            ) + 1)
                .rem_euclid(1024) as u16,
        );
    }
    if w[17] != 0 {
        out.push(
            (w0 + rm(
                w[1] + rm(w[3] - 64 + rm(w[5] - 32 + rm(w[9] - 16 + w[17] - 1, 31), 63), 127),
                255,
            ) + 1)
                .rem_euclid(1024) as u16,
        );
    }
    if w[18] != 0 {
        out.push(
            (w0 + rm(
                w[1] - 128 + rm(w[2] + rm(w[6] - 32 + rm(w[10] - 16 + w[18] - 1, 31), 63), 127),
                255,
            ) + 1)
                .rem_euclid(1024) as u16,
        );
    }
    if w[19] != 0 {
        out.push(
            (w0 + rm(
                w[1] + rm(w[3] + rm(w[7] - 32 + rm(w[11] - 16 + w[19] - 1, 31), 63), 127),
                255,
            ) + 1)
                .rem_euclid(1024) as u16,
        );
    }
    if w[20] != 0 {
        out.push(
            (w0 + rm(
                w[1] - 128 + rm(w[2] - 64 + rm(w[4] + rm(w[12] - 16 + w[20] - 1, 31), 63), 127),
                255,
            ) + 1)
                .rem_euclid(1024) as u16,
        );
    }
    if w[21] != 0 {
        out.push(
            (w0 + rm(
                w[1] + rm(w[3] - 64 + rm(w[5] + rm(w[13] - 16 + w[21] - 1, 31), 63), 127),
                255,
            ) + 1)
                .rem_euclid(1024) as u16,
        );
    }
    out.sort_unstable();
    out.dedup();
    Ok(out)
}

/// Range 128 format: root ARFCN plus `w[1..=28]`, widths w1=7, w2/w3=6,
/// w4..w7=5, w8..w15=4, w16..w28=3.
fn decode_range128(octets: &[u8]) -> Result<Vec<u16>, SysInfoError> {
    if octets.len() < 3 {
        return Err(SysInfoError::ShortRead {
            need: 3,
            got: octets.len(),
        });
    }
    let w0 = decode_root_arfcn(octets);
    let mut w = [0i32; 29];
    let widths = [
        0, 7, 6, 6, 5, 5, 5, 5, 4, 4, 4, 4, 4, 4, 4, 4, 3, 3, 3, 3, 3, 3, 3, 3, 3, 3, 3, 3, 3,
    ];
    let mut reader = BitReader::new(&octets[2..]);
    for (n, &width) in widths.iter().enumerate().skip(1) {
        w[n] = reader.try_take(width).unwrap_or(0);
    }

    let mut out = vec![w0.rem_euclid(1024) as u16];
    if w[1] != 0 {
        out.push((w0 + w[1]).rem_euclid(1024) as u16);
    }
    if w[2] != 0 {
        out.push((w0 + rm(w[1] - 64 + w[2] - 1, 127) + 1).rem_euclid(1024) as u16);
    }
    if w[3] != 0 {
        out.push((w0 + rm(w[1] + w[3] - 1, 127) + 1).rem_euclid(1024) as u16);
    }
    if w[4] != 0 {
        out.push(
            (w0 + rm(w[1] - 64 + rm(w[2] - 32 + w[4] - 1, 63), 127) + 1).rem_euclid(1024) as u16,
        );
    }
    if w[5] != 0 {
        out.push(
            (w0 + rm(w[1] + rm(w[3] - 32 + w[5] - 1, 63), 127) + 1).rem_euclid(1024) as u16,
        );
    }
    if w[6] != 0 {
        out.push(
            (w0 + rm(w[1] - 64 + rm(w[2] + w[6] - 1, 63), 127) + 1).rem_euclid(1024) as u16,
        );
    }
    if w[7] != 0 {
        out.push((w0 + rm(w[1] + rm(w[3] + w[7] - 1, 63), 127) + 1).rem_euclid(1024) as u16);
    }
    if w[8] != 0 {
        out.push(
            (w0 + rm(w[1] - 64 + rm(w[2] - 32 + rm(w[4] - 16 + w[8] - 1, 31), 63), 127) + 1)
                .rem_euclid(1024) as u16,
        );
    }
    if w[9] != 0 {
        out.push(
            (w0 + rm(w[1] + rm(w[3] - 32 + rm(w[5] - 16 + w[9] - 1, 31), 63), 127) + 1)
                .rem_euclid(1024) as u16,
        );
    }
    if w[10] != 0 {
        out.push(
            (w0 + rm(w[1] - 64 + rm(w[2] + rm(w[6] - 16 + w[10] - 1, 31), 63), 127) + 1)
                .rem_euclid(1024) as u16,
        );
    }
    if w[11] != 0 {
        out.push(
            (w0 + rm(w[1] + rm(w[3] + rm(w[7] - 16 + w[11] - 1, 31), 63), 127) + 1)
                .rem_euclid(1024) as u16,
        );
    }
    if w[12] != 0 {
        out.push(
            (w0 + rm(w[1] - 64 + rm(w[2] - 32 + rm(w[4] + w[12] - 1, 31), 63), 127) + 1)
                .rem_euclid(1024) as u16,
        );
    }
    if w[13] != 0 {
        out.push(
            (w0 + rm(w[1] + rm(w[3] - 32 + rm(w[5] + w[13] - 1, 31), 63), 127) + 1)
                .rem_euclid(1024) as u16,
        );
    }
    if w[14] != 0 {
        out.push(
            (w0 + rm(w[1] - 64 + rm(w[2] + rm(w[6] + w[14] - 1, 31), 63), 127) + 1)
                .rem_euclid(1024) as u16,
        );
    }
    if w[15] != 0 {
        out.push(
            (w0 + rm(w[1] + rm(w[3] + rm(w[7] + w[15] - 1, 31), 63), 127) + 1).rem_euclid(1024)
                as u16,
        );
    }
    if w[16] != 0 {
        out.push(
            (w0 + rm(
                w[1] - 64 + rm(w[2] - 32 + rm(w[4] - 16 + rm(w[8] - 8 + w[16] - 1, 15), 31), 63),
                127,
            ) + 1)
                .rem_euclid(1024) as u16,
        );
    }
    if w[17] != 0 {
        out.push(
            (w0 + rm(
                w[1] + rm(w[3] - 32 + rm(w[5] - 16 + rm(w[9] - 8 + w[17] - 1, 15), 31), 63),
                127,
            ) + 1)
                .rem_euclid(1024) as u16,
        );
    }
    if w[18] != 0 {
        out.push(
            (w0 + rm(
                w[1] - 64 + rm(w[2] + rm(w[6] - 16 + rm(w[10] - 8 + w[18] - 1, 15), 31), 63),
                127,
            ) + 1)
                .rem_euclid(1024) as u16,
        );
    }
    if w[19] != 0 {
        out.push(
            (w0 + rm(
                w[1] + rm(w[3] + rm(w[7] - 16 + rm(w[11] - 8 + w[19] - 1, 15), 31), 63),
                127,
            ) + 1)
                .rem_euclid(1024) as u16,
        );
    }
    if w[20] != 0 {
        out.push(
            (w0 + rm(
                w[1] - 64 + rm(w[2] - 32 + rm(w[4] + rm(w[12] - 8 + w[20] - 1, 15), 31), 63),
                127,
            ) + 1)
                .rem_euclid(1024) as u16,
        );
    }
    if w[21] != 0 {
        out.push(
            (w0 + rm(
                w[1] + rm(w[3] - 32 + rm(w[5] + rm(w[13] - 8 + w[21] - 1, 15), 31), 63),
                127,
            ) + 1)
                .rem_euclid(1024) as u16,
        );
    }
    if w[22] != 0 {
        out.push(
            (w0 + rm(
                w[1] - 64 + rm(w[2] + rm(w[6] + rm(w[14] - 8 + w[22] - 1, 15), 31), 63),
                127,
            ) + 1)
                .rem_euclid(1024) as u16,
        );
    }
    if w[23] != 0 {
        out.push(
            (w0 + rm(
                w[1] + rm(w[3] + rm(w[7] + rm(w[15] - 8 + w[23] - 1, 15), 31), 63),
                127,
            ) + 1)
                .rem_euclid(1024) as u16,
        );
    }
    if w[24] != 0 {
        out.push(
            (w0 + rm(
                w[1] - 64 + rm(w[2] - 32 + rm(w[4] - 16 + rm(w[8] + w[24] - 1, 15), 31), 63),
                127,
            ) + 1)
                .rem_euclid(1024) as u16,
        );
    }
    if w[25] != 0 {
        out.push(
            (w0 + rm(
                w[1] + rm(w[3] - 32 + rm(w[5] - 16 + rm(w[9] + w[25] - 1, 15), 31), 63),
                127,
            ) + 1)
                .rem_euclid(1024) as u16,
        );
    }
    if w[26] != 0 {
        out.push(
            (w0 + rm(
                w[1] - 64 + rm(w[2] + rm(w[6] - 16 + rm(w[10] + w[26] - 1, 15), 31), 63),
                127,
            ) + 1)
                .rem_euclid(1024) as u16,
        );
    }
    if w[27] != 0 {
        out.push(
            (w0 + rm(
                w[1] + rm(w[3] + rm(w[7] - 16 + rm(w[11] + w[27] - 1, 15), 31), 63),
                127,
            ) + 1)
                .rem_euclid(1024) as u16,
        );
    }
    if w[28] != 0 {
        out.push(
            (w0 + rm(
                w[1] - 64 + rm(w[2] - 32 + rm(w[4] + rm(w[12] + w[28] - 1, 15), 31), 63),
                127,
            ) + 1)
                .rem_euclid(1024) as u16,
        );
    }
    out.sort_unstable();
    out.dedup();
    Ok(out)
}

/// Variable Bitmap format: a 10-bit root ARFCN (same packing as the other
/// RANGE formats) followed by a run-length bitmap of relative offsets.
/// There is exactly one spare bit right after the root field (the MSB of
/// octet 2) before the bitmap itself starts; bit `i` (starting at 1) set
/// means ARFCN `(orig+i) % 1024` is present.
fn decode_variable_bitmap(octets: &[u8]) -> Result<Vec<u16>, SysInfoError> {
    if octets.len() < 3 {
        return Err(SysInfoError::ShortRead {
            need: 3,
            got: octets.len(),
        });
    }
    let orig = decode_root_arfcn(octets);
    let mut out = vec![orig.rem_euclid(1024) as u16];
    let mut reader = BitReader::new(&octets[2..]);
    reader.skip(1);
    let mut i: i32 = 1;
    while let Some(bit) = reader.try_take(1) {
        if bit == 1 {
            out.push((orig + i).rem_euclid(1024) as u16);
        }
        i += 1;
    }
    out.sort_unstable();
    out.dedup();
    Ok(out)
}

/// Minimal MSB-first bit cursor over a byte slice, used only by the
/// frequency-list range decoders above.
struct BitReader<'a> {
    bytes: &'a [u8],
    bit_pos: usize,
}

impl<'a> BitReader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        BitReader { bytes, bit_pos: 0 }
    }

    fn remaining_bits(&self) -> usize {
        self.bytes.len() * 8 - self.bit_pos
    }

    fn skip(&mut self, n: usize) {
        self.bit_pos += n;
    }

    fn take(&mut self, n: usize) -> u32 {
        let mut value: u32 = 0;
        for _ in 0..n {
            let byte = self.bit_pos / 8;
            let bit = 7 - (self.bit_pos % 8);
            let b = self.bytes.get(byte).copied().unwrap_or(0);
            value = (value << 1) | ((b >> bit) & 1) as u32;
            self.bit_pos += 1;
        }
        value
    }

    /// Like [`Self::take`], but reports exhaustion instead of zero-filling
    /// past the end of the buffer, so callers can treat a short dedicated
    /// message as "no more W fields" rather than a run of spurious zeros.
    fn try_take(&mut self, n: usize) -> Option<i32> {
        if n == 0 {
            return Some(0);
        }
        if self.remaining_bits() < n {
            return None;
        }
        Some(self.take(n) as i32)
    }
}

/// Validate a fully-aggregated cell's ARFCN references all fall within the
/// frequency table (defensive check against a malformed range-decode
/// producing an out-of-band index).
pub fn validate_neighbours(sysinfo: &SysInfo) -> Result<(), SysInfoError> {
    for &arfcn in &sysinfo.neighbour_arfcns {
        let index = arfcn_to_index(arfcn).ok_or(SysInfoError::IndexOutOfRange(arfcn as usize))?;
        if index >= NUM_ARFCN_INDICES {
            return Err(SysInfoError::IndexOutOfRange(index));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rm_wraps_into_0_to_b_minus_1() {
        assert_eq!(rm(0, 1024), 0);
        assert_eq!(rm(1023, 1024), 1023);
        assert_eq!(rm(1024, 1024), 0);
        assert_eq!(rm(-1, 1024), 1023);
    }

    #[test]
    fn bitmap0_decodes_single_bit() {
        let mut octets = [0u8; 16];
        // ARFCN 1 is bit 0 (LSB) of the *last* octet of the frame.
        octets[15] = 0b0000_0001;
        let arfcns = decode_bitmap0(&octets).unwrap();
        assert_eq!(arfcns, vec![1]);
    }

    #[test]
    fn bitmap0_round_trips_through_encode() {
        let arfcns = vec![1, 42, 63, 64, 124];
        let octets = encode_bitmap0(&arfcns);
        let decoded = decode_bitmap0(&octets).unwrap();
        assert_eq!(decoded, arfcns);
    }

    #[test]
    fn bitmap0_rejects_short_read() {
        let octets = [0u8; 4];
        assert!(matches!(
            decode_bitmap0(&octets),
            Err(SysInfoError::ShortRead { .. })
        ));
    }

    #[test]
    fn decode_applies_and_then_reports_unchanged() {
        let mut sysinfo = SysInfo::default();
        let mut table = FreqTable::new();
        let mut octets = [0u8; 16];
        octets[0] = 0b0000_0000; // bitmap0 format id
        octets[15] = 0b0000_0001; // ARFCN 1 set
        let outcome = decode(SiType::Si2, &octets, &mut sysinfo, &mut table).unwrap();
        assert_eq!(outcome, DecodeOutcome::Applied);
        assert!(sysinfo.freshness.contains(SiFreshness::SI2));

        let outcome2 = decode(SiType::Si2, &octets, &mut sysinfo, &mut table).unwrap();
        assert_eq!(outcome2, DecodeOutcome::Unchanged);
    }

    #[test]
    fn decode_rejects_empty_input() {
        let mut sysinfo = SysInfo::default();
        let mut table = FreqTable::new();
        assert!(decode(SiType::Si2, &[], &mut sysinfo, &mut table).is_err());
    }

    #[test]
    fn validate_neighbours_accepts_in_range_arfcns() {
        let mut sysinfo = SysInfo::default();
        sysinfo.neighbour_arfcns = vec![0, 500, 810];
        assert!(validate_neighbours(&sysinfo).is_ok());
    }

    #[test]
    fn range1024_decodes_f0_flag_and_w1() {
        // octet0 = 0b1010_0000: discriminator bits 7/6/3 = 1/0/0 (matches
        // Range1024's 0xc8 mask), free bit 5 (f0) set, free bits 4/2 (w1
        // high) clear.
        let octets = [0xA0u8, 5];
        let arfcns = decode_range1024(&octets).unwrap();
        assert_eq!(arfcns, vec![0, 5]);
    }

    #[test]
    fn range512_decodes_root_arfcn_only() {
        let octets = [0x88u8, 0, 0, 0];
        let arfcns = decode_range512(&octets).unwrap();
        assert_eq!(arfcns, vec![0]);
    }

    #[test]
    fn range256_decodes_root_arfcn_only() {
        let octets = [0x8au8, 0, 0, 0];
        let arfcns = decode_range256(&octets).unwrap();
        assert_eq!(arfcns, vec![0]);
    }

    #[test]
    fn range128_decodes_root_arfcn_only() {
        let octets = [0x8cu8, 0, 0];
        let arfcns = decode_range128(&octets).unwrap();
        assert_eq!(arfcns, vec![0]);
    }

    #[test]
    fn dispatcher_picks_range1024_not_range512_for_overlapping_prefix() {
        // octets[0] = 0xA0 has the same top 3 bits (0b101) as a bare
        // `>>5` read would see for Range512's 0xce/0x88 discriminator, but
        // under the real masked-prefix rule it's Range1024 (0xc8/0x80).
        let octets = [0xA0u8, 5, 0];
        let arfcns = decode_frequency_list(&octets).unwrap();
        assert_eq!(arfcns, vec![0, 5]);
    }
}
