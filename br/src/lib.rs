#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

pub use br_common::{constants, IfId, IsdAs};
pub use br_enforce as enforce;
pub use br_router::*;
pub use br_wire as wire;
