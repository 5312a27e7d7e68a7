use bytes::{Buf, BufMut, BytesMut};

use br_common::{IfId, IsdAs};

use crate::WireError;

/// A revocation notice for an interface of some AS, carried in
/// [`PayloadClass::Revocation`](crate::PayloadClass::Revocation) packets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RevocationInfo {
    pub isd_as: IsdAs,
    pub ifid: IfId,
    /// Expiry of the revocation, UNIX seconds.
    pub expiry: u32,
}

impl RevocationInfo {
    #[inline]
    pub const fn len() -> usize {
        10
    }

    pub fn decode(mut src: &[u8]) -> Result<Self, WireError> {
        if src.len() < Self::len() {
            return Err(WireError::Truncated {
                what: "revocation payload",
                need: Self::len(),
                have: src.len(),
            });
        }

        let ifid = IfId(src.get_u16());
        let isd_as = IsdAs::from_u32(src.get_u32());
        let expiry = src.get_u32();

        Ok(Self { isd_as, ifid, expiry })
    }

    pub fn encode(&self, dst: &mut BytesMut) {
        dst.reserve(Self::len());
        dst.put_u16(self.ifid.0);
        dst.put_u32(self.isd_as.as_u32());
        dst.put_u32(self.expiry);
    }

    /// Whether the revocation is expired at `now` (UNIX seconds).
    pub fn is_expired(&self, now: u64) -> bool {
        (self.expiry as u64) <= now
    }
}
