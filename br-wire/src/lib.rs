#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

use thiserror::Error;

pub mod header;
pub mod payload;

pub use header::{Header, PayloadClass, VERSION};
pub use payload::RevocationInfo;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum WireError {
    #[error("truncated {what}: need {need} bytes, have {have}")]
    Truncated { what: &'static str, need: usize, have: usize },
    #[error("unsupported version {0}")]
    Version(u8),
    #[error("unknown payload class {0}")]
    PayloadClass(u8),
    #[error("length mismatch: header says {header}, packet has {actual}")]
    LengthMismatch { header: usize, actual: usize },
    #[error("hop limit exhausted")]
    HopLimit,
    #[error("router service address in foreign AS {0}")]
    ForeignService(br_common::IsdAs),
}
