#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

//! The packet-forwarding core of the border router.
//!
//! Every registered socket gets a worker that reads packets off its ring in batches and runs
//! them through the [`PacketPipeline`]. Ingress and egress admission control sits right after
//! parsing, so packets over their AS's share are dropped before any further work is done. The
//! [`Router`] owns the workers and swaps in new enforcement state on reload.

mod error;
pub mod hooks;
mod packet;
mod pipeline;
pub mod ring;
mod router;
mod stats;
mod worker;

pub use error::{PacketError, ReloadError, RouterError, Stage};
pub use packet::{Dir, RtrPacket};
pub use pipeline::{Disposition, ErrorResponder, Forwarder, PacketPipeline};
pub use router::{
    Enforcers, ReloadCommand, ReloadHandle, Router, RouterOptions, DEFAULT_BATCH_SIZE,
};
pub use stats::RouterStats;
