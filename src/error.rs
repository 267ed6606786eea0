//! Error kinds shared across the core. Each subsystem also defines its own
//! narrower error enum (see `sysinfo::SysInfoError`, `rr::RrError`, ...);
//! `CoreError` is what the dispatch loop in `ms` collapses them into when it
//! needs to report a failure to its own caller.

use thiserror::Error;

use crate::cellsel::CellSelError;
use crate::gcc_bcc::GccBccError;
use crate::mm::MmError;
use crate::plmn::PlmnError;
use crate::rr::RrError;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("cell selection error: {0}")]
    CellSel(#[from] CellSelError),

    #[error("PLMN selection error: {0}")]
    Plmn(#[from] PlmnError),

    #[error("radio resource error: {0}")]
    Rr(#[from] RrError),

    #[error("mobility management error: {0}")]
    Mm(#[from] MmError),

    #[error("GCC/BCC error: {0}")]
    GccBcc(#[from] GccBccError),

    #[error("BA-list file error: {0}")]
    BaList(#[from] crate::ba_list::BaListError),
}
