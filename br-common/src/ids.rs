use std::{fmt, num::ParseIntError, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Number of bits of an [`IsdAs`] used for the AS number.
const AS_BITS: u32 = 20;
const AS_MASK: u32 = (1 << AS_BITS) - 1;
const MAX_ISD: u16 = (1 << (32 - AS_BITS)) - 1;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum IdError {
    #[error("malformed ISD-AS {0:?}, expected \"<isd>-<as>\"")]
    Malformed(String),
    #[error("invalid number: {0}")]
    Number(#[from] ParseIntError),
    #[error("ISD {0} out of range")]
    IsdRange(u32),
    #[error("AS {0} out of range")]
    AsRange(u64),
}

/// Identifier of an interface of this router. Scoped to the router, never global.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IfId(pub u16);

impl IfId {
    /// The "no interface" value carried in headers of packets that terminate locally.
    pub const NONE: Self = Self(0);

    pub const fn is_none(&self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for IfId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u16> for IfId {
    fn from(id: u16) -> Self {
        Self(id)
    }
}

/// An ISD-AS pair packed into 32 bits: the top 12 bits are the ISD, the low 20 the AS.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct IsdAs(u32);

impl IsdAs {
    pub fn new(isd: u16, asn: u32) -> Result<Self, IdError> {
        if isd > MAX_ISD {
            return Err(IdError::IsdRange(isd as u32));
        }
        if asn > AS_MASK {
            return Err(IdError::AsRange(asn as u64));
        }

        Ok(Self(((isd as u32) << AS_BITS) | asn))
    }

    #[inline]
    pub const fn from_u32(raw: u32) -> Self {
        Self(raw)
    }

    #[inline]
    pub const fn as_u32(&self) -> u32 {
        self.0
    }

    #[inline]
    pub const fn isd(&self) -> u16 {
        (self.0 >> AS_BITS) as u16
    }

    #[inline]
    pub const fn asn(&self) -> u32 {
        self.0 & AS_MASK
    }
}

impl fmt::Display for IsdAs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.isd(), self.asn())
    }
}

impl FromStr for IsdAs {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let Some((isd, asn)) = s.split_once('-') else {
            return Err(IdError::Malformed(s.to_string()));
        };

        let isd: u32 = isd.trim().parse()?;
        let asn: u64 = asn.trim().parse()?;
        let isd = u16::try_from(isd).map_err(|_| IdError::IsdRange(isd))?;
        let asn = u32::try_from(asn).map_err(|_| IdError::AsRange(asn))?;

        Self::new(isd, asn)
    }
}

impl TryFrom<String> for IsdAs {
    type Error = IdError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<IsdAs> for String {
    fn from(ia: IsdAs) -> Self {
        ia.to_string()
    }
}
