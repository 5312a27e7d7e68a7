use bytes::{Buf, BufMut, BytesMut};

use br_common::{IfId, IsdAs};

use crate::WireError;

/// The only header version understood by this router.
pub const VERSION: u8 = 1;

/// Class of the payload following the common header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PayloadClass {
    /// End-host data, never inspected by the router.
    Data = 0,
    /// Interface state information.
    IfState = 1,
    /// Interface revocation notice.
    Revocation = 2,
}

impl TryFrom<u8> for PayloadClass {
    type Error = WireError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Data),
            1 => Ok(Self::IfState),
            2 => Ok(Self::Revocation),
            other => Err(WireError::PayloadClass(other)),
        }
    }
}

/// The common header every router packet starts with.
///
/// ```text
///  0       1       2               4
/// +-------+-------+---------------+
/// |version| class |   total_len   |
/// +-------+-------+---------------+
/// |            src ISD-AS         |
/// +-------------------------------+
/// |            dst ISD-AS         |
/// +-------+-------+---------------+
/// |dst_svc|hop_lim|   egress_if   |
/// +-------+-------+---------------+
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub version: u8,
    pub class: PayloadClass,
    /// Length of the whole packet, header included.
    pub total_len: u16,
    pub src: IsdAs,
    pub dst: IsdAs,
    /// Whether the destination is the router service of `dst` rather than an end host.
    pub dst_svc: bool,
    pub hop_limit: u8,
    /// Next-hop interface on this router, [`IfId::NONE`] when the packet terminates here.
    pub egress_if: IfId,
}

impl Header {
    /// Returns the length of the header in bytes.
    #[inline]
    pub const fn len() -> usize {
        16
    }

    /// Decodes the common header from the front of `src`. Only framing is checked here,
    /// see [`Header::validate`] for content checks.
    pub fn decode(mut src: &[u8]) -> Result<Self, WireError> {
        if src.len() < Self::len() {
            return Err(WireError::Truncated {
                what: "common header",
                need: Self::len(),
                have: src.len(),
            });
        }

        let version = src.get_u8();
        if version != VERSION {
            return Err(WireError::Version(version));
        }

        let class = PayloadClass::try_from(src.get_u8())?;

        Ok(Self {
            version,
            class,
            total_len: src.get_u16(),
            src: IsdAs::from_u32(src.get_u32()),
            dst: IsdAs::from_u32(src.get_u32()),
            dst_svc: src.get_u8() != 0,
            hop_limit: src.get_u8(),
            egress_if: IfId(src.get_u16()),
        })
    }

    /// Checks decoded contents against the raw packet length and the local AS.
    pub fn validate(&self, raw_len: usize, local: IsdAs) -> Result<(), WireError> {
        if self.total_len as usize != raw_len {
            return Err(WireError::LengthMismatch { header: self.total_len as usize, actual: raw_len });
        }

        if self.hop_limit == 0 {
            return Err(WireError::HopLimit);
        }

        if self.dst_svc && self.dst != local {
            return Err(WireError::ForeignService(self.dst));
        }

        Ok(())
    }

    pub fn encode(&self, dst: &mut BytesMut) {
        dst.reserve(Self::len());

        dst.put_u8(self.version);
        dst.put_u8(self.class as u8);
        dst.put_u16(self.total_len);
        dst.put_u32(self.src.as_u32());
        dst.put_u32(self.dst.as_u32());
        dst.put_u8(self.dst_svc as u8);
        dst.put_u8(self.hop_limit);
        dst.put_u16(self.egress_if.0);
    }

    /// Returns the payload slice of `raw`, which must start with this header.
    #[inline]
    pub fn payload<'a>(&self, raw: &'a [u8]) -> &'a [u8] {
        raw.get(Self::len()..).unwrap_or_default()
    }
}
