//! Per-packet extension points for packets that need local handling.
//!
//! While checking whether a packet needs local processing, the pipeline attaches the [`HookSet`]
//! registered for its payload class. A [`PayloadHook`] parses the payload, a [`ProcessHook`] acts
//! on it. Either may be absent, in which case that stage is skipped.

use std::{fmt, sync::Arc};

use br_common::unix_secs;
use br_wire::RevocationInfo;
use bytes::Bytes;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::debug;

use crate::{PacketError, RtrPacket};

/// A parsed payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Revocation(RevocationInfo),
    /// A payload the router does not interpret itself.
    Opaque(Bytes),
}

/// Parses the payload of a packet.
pub trait PayloadHook: Send + Sync + 'static {
    fn parse(&self, pkt: &RtrPacket) -> Result<Payload, PacketError>;
}

/// Processes a packet locally. `payload` is the output of the [`PayloadHook`], if one ran.
pub trait ProcessHook: Send + Sync + 'static {
    fn process(&self, pkt: &RtrPacket, payload: Option<&Payload>) -> Result<(), PacketError>;
}

/// The hooks attached to one packet.
#[derive(Clone, Default)]
pub struct HookSet {
    pub payload: Option<Arc<dyn PayloadHook>>,
    pub process: Option<Arc<dyn ProcessHook>>,
}

impl fmt::Debug for HookSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HookSet")
            .field("payload", &self.payload.is_some())
            .field("process", &self.process.is_some())
            .finish()
    }
}

impl HookSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_payload<H: PayloadHook>(mut self, hook: H) -> Self {
        self.payload = Some(Arc::new(hook));
        self
    }

    pub fn with_process<H: ProcessHook>(mut self, hook: H) -> Self {
        self.process = Some(Arc::new(hook));
        self
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.payload.is_none() && self.process.is_none()
    }
}

/// Parses any payload into [`Payload::Opaque`].
#[derive(Debug, Default, Clone, Copy)]
pub struct OpaquePayload;

impl PayloadHook for OpaquePayload {
    fn parse(&self, pkt: &RtrPacket) -> Result<Payload, PacketError> {
        Ok(Payload::Opaque(Bytes::copy_from_slice(pkt.payload())))
    }
}

/// Parses revocation notices and hands unexpired ones to a bounded queue, for forwarding to
/// the rest of the control plane.
#[derive(Debug, Clone)]
pub struct RevocationHandler {
    tx: mpsc::Sender<RevocationInfo>,
}

impl RevocationHandler {
    /// Creates a handler with a queue of the given capacity, and the receiving end of the queue.
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<RevocationInfo>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }

    /// The hooks to register for revocation payloads.
    pub fn hooks(self) -> HookSet {
        let handler = Arc::new(self);
        HookSet {
            payload: Some(Arc::clone(&handler) as Arc<dyn PayloadHook>),
            process: Some(handler as Arc<dyn ProcessHook>),
        }
    }
}

impl PayloadHook for RevocationHandler {
    fn parse(&self, pkt: &RtrPacket) -> Result<Payload, PacketError> {
        RevocationInfo::decode(pkt.payload()).map(Payload::Revocation).map_err(PacketError::Payload)
    }
}

impl ProcessHook for RevocationHandler {
    fn process(&self, _pkt: &RtrPacket, payload: Option<&Payload>) -> Result<(), PacketError> {
        let Some(Payload::Revocation(info)) = payload else {
            return Err(PacketError::Process("expected a revocation payload".to_string()));
        };

        if info.is_expired(unix_secs()) {
            debug!(isd_as = %info.isd_as, ifid = %info.ifid, "ignoring expired revocation");
            return Ok(());
        }

        match self.tx.try_send(*info) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(PacketError::Process("revocation queue full".to_string())),
            Err(TrySendError::Closed(_)) => {
                Err(PacketError::Process("revocation queue closed".to_string()))
            }
        }
    }
}
