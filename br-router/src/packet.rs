use std::{fmt, time::Instant};

use br_common::{IfId, IsdAs};
use br_wire::Header;
use bytes::BytesMut;

use crate::hooks::HookSet;

/// Where a packet comes from or goes to, relative to this router.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Dir {
    #[default]
    Unset,
    /// A host or service inside the local AS.
    Local,
    /// This router itself.
    Router,
    /// A neighboring AS.
    External,
}

/// A packet owned by the router while it moves through the pipeline.
pub struct RtrPacket {
    /// The raw packet, header included.
    pub(crate) raw: BytesMut,
    pub(crate) dir_from: Dir,
    /// The interface the packet was received on.
    pub(crate) ingress_if: IfId,
    pub(crate) time_in: Instant,

    /// Correlation id for log entries, assigned by the pipeline.
    pub(crate) id: u32,
    pub(crate) dir_to: Dir,
    pub(crate) header: Option<Header>,
    /// Extension points registered while checking for local processing.
    pub(crate) hooks: HookSet,
}

impl fmt::Debug for RtrPacket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RtrPacket")
            .field("id", &format_args!("{:08x}", self.id))
            .field("len", &self.raw.len())
            .field("dir_from", &self.dir_from)
            .field("dir_to", &self.dir_to)
            .field("ingress_if", &self.ingress_if)
            .field("header", &self.header)
            .finish_non_exhaustive()
    }
}

impl RtrPacket {
    /// Wraps a received buffer. `dir_from` and `ingress_if` are known to the receiving socket.
    pub fn new(raw: BytesMut, dir_from: Dir, ingress_if: IfId) -> Self {
        Self::with_time_in(raw, dir_from, ingress_if, Instant::now())
    }

    pub fn with_time_in(raw: BytesMut, dir_from: Dir, ingress_if: IfId, time_in: Instant) -> Self {
        Self {
            raw,
            dir_from,
            ingress_if,
            time_in,
            id: 0,
            dir_to: Dir::Unset,
            header: None,
            hooks: HookSet::default(),
        }
    }

    #[inline]
    pub fn raw(&self) -> &[u8] {
        &self.raw
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.raw.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }

    #[inline]
    pub fn dir_from(&self) -> Dir {
        self.dir_from
    }

    /// Destination relative to this router. [`Dir::Unset`] until the packet is parsed.
    #[inline]
    pub fn dir_to(&self) -> Dir {
        self.dir_to
    }

    #[inline]
    pub fn ingress_if(&self) -> IfId {
        self.ingress_if
    }

    #[inline]
    pub fn time_in(&self) -> Instant {
        self.time_in
    }

    #[inline]
    pub fn id(&self) -> u32 {
        self.id
    }

    /// The decoded header, once parsed.
    #[inline]
    pub fn header(&self) -> Option<&Header> {
        self.header.as_ref()
    }

    /// The payload following the common header. Empty until parsed.
    pub fn payload(&self) -> &[u8] {
        self.header.as_ref().map(|h| h.payload(&self.raw)).unwrap_or_default()
    }

    /// Source ISD-AS, once parsed.
    #[inline]
    pub fn src_ia(&self) -> Option<IsdAs> {
        self.header.map(|h| h.src)
    }

    /// Gives back the buffer so it can be reused.
    pub fn into_raw(self) -> BytesMut {
        self.raw
    }
}
