//! A fake L1: answers the engine's uplink primitives with canned downlink
//! responses for a handful of configured ARFCNs, so the `Ms` dispatch loop
//! can be exercised end to end without real radio hardware. Real L1/RF is
//! out of scope for the engine itself; this harness plays the role the
//! engine expects its owner to play.

use gsm_l3::freqtable::ArfcnFlags;
use gsm_l3::message::{L1Downlink, L1Uplink, SiFreshness, SysInfo};
use gsm_l3::ms::{Ms, MsEvent};
use gsm_l3::subscriber::Lai;

pub struct FakeCell {
    pub arfcn: u16,
    pub lai: Lai,
    pub bsic: u8,
    pub rxlev: u8,
}

pub struct FakeL1 {
    cells: Vec<FakeCell>,
}

impl FakeL1 {
    pub fn new(arfcns: &[u16]) -> Self {
        let cells = arfcns
            .iter()
            .enumerate()
            .map(|(i, &arfcn)| FakeCell {
                arfcn,
                lai: Lai {
                    mcc: 1,
                    mnc: 1,
                    lac: 1 + i as u16,
                },
                bsic: i as u8 & 0x3f,
                rxlev: 40,
            })
            .collect();
        FakeL1 { cells }
    }

    fn cell_for_arfcn(&self, arfcn: u16) -> Option<&FakeCell> {
        self.cells.iter().find(|c| c.arfcn == arfcn)
    }

    /// Mark every fake cell's ARFCN as within a supported band, the way a
    /// real band-capability probe would at startup, so scan batches
    /// actually include them.
    pub fn mark_supported(&self, ms: &mut Ms) {
        for cell in &self.cells {
            if let Some(entry) = ms.freq_table.get_mut(cell.arfcn as usize) {
                entry.flags.insert(ArfcnFlags::SUPPORT);
            }
        }
    }

    /// Drain and answer every uplink primitive the engine queued since the
    /// last call.
    pub fn service_uplink(&self, ms: &mut Ms) {
        for prim in ms.drain_uplink() {
            match prim {
                L1Uplink::Reset | L1Uplink::CcchReq | L1Uplink::RachReq { .. } => {}
                L1Uplink::PmReq { arfcns } => self.service_pm_req(ms, &arfcns),
                L1Uplink::NeighPmReq { arfcns } => self.service_neigh_pm_req(ms, &arfcns),
                L1Uplink::FbsbReq { arfcn, .. } => self.service_fbsb_req(ms, arfcn),
            }
        }
    }

    fn service_pm_req(&self, ms: &mut Ms, arfcns: &[u16]) {
        for &arfcn in arfcns {
            if let Some(cell) = self.cell_for_arfcn(arfcn) {
                if let Some(entry) = ms.freq_table.get_mut(arfcn as usize) {
                    entry.rxlev = cell.rxlev;
                    entry.flags.insert(ArfcnFlags::POWER | ArfcnFlags::SIGNAL);
                }
            }
        }
        ms.enqueue(MsEvent::L1(L1Downlink::PmDone));
    }

    fn service_neigh_pm_req(&self, ms: &mut Ms, arfcns: &[u16]) {
        for &arfcn in arfcns {
            if let Some(cell) = self.cell_for_arfcn(arfcn) {
                ms.enqueue(MsEvent::L1(L1Downlink::NeighPmInd {
                    arfcn,
                    rxlev: cell.rxlev,
                }));
            }
        }
    }

    fn service_fbsb_req(&self, ms: &mut Ms, arfcn: u16) {
        match self.cell_for_arfcn(arfcn) {
            Some(cell) => {
                if let Some(entry) = ms.freq_table.get_mut(arfcn as usize) {
                    entry.sysinfo = Some(Box::new(fake_sysinfo(cell)));
                    entry.flags.insert(ArfcnFlags::SYSINFO);
                }
                ms.freq_table.select(arfcn as usize);
                ms.enqueue(MsEvent::L1(L1Downlink::FbsbResp {
                    arfcn,
                    bsic: cell.bsic,
                    snr: 20,
                }));
            }
            None => ms.enqueue(MsEvent::L1(L1Downlink::FbsbErr { arfcn })),
        }
    }
}

fn fake_sysinfo(cell: &FakeCell) -> SysInfo {
    let mut si = SysInfo::default();
    si.mcc = cell.lai.mcc;
    si.mnc = cell.lai.mnc;
    si.lac = cell.lai.lac;
    si.bsic = cell.bsic;
    si.freshness = SiFreshness::SI1 | SiFreshness::SI2 | SiFreshness::SI3;
    si
}

#[cfg(test)]
mod tests {
    use super::*;
    use gsm_l3::subscriber::Subscriber;

    #[test]
    fn fbsb_req_selects_and_populates_sysinfo() {
        let mut ms = Ms::new(Subscriber::new("001010000000001"));
        let fake = FakeL1::new(&[42]);
        fake.mark_supported(&mut ms);
        ms.start_sync(42, gsm_l3::message::CcchMode::NonCombined);
        fake.service_uplink(&mut ms);
        assert_eq!(ms.freq_table.selected_index(), Some(42));
        assert!(ms.freq_table.get(42).unwrap().sysinfo.is_some());
    }
}
