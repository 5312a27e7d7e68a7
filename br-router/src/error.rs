use std::{fmt, io};

use br_common::IsdAs;
use br_enforce::ConfigError;
use br_wire::{PayloadClass, WireError};
use thiserror::Error;

/// Pipeline stage at which a packet failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Parse,
    Validate,
    LocalProcessing,
    Payload,
    Process,
    Route,
    /// The pipeline panicked.
    Fault,
}

impl Stage {
    pub(crate) const ALL: [Self; 7] = [
        Self::Parse,
        Self::Validate,
        Self::LocalProcessing,
        Self::Payload,
        Self::Process,
        Self::Route,
        Self::Fault,
    ];

    #[inline]
    pub(crate) const fn index(&self) -> usize {
        *self as usize
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Parse => "parse",
            Self::Validate => "validate",
            Self::LocalProcessing => "local_processing",
            Self::Payload => "payload",
            Self::Process => "process",
            Self::Route => "route",
            Self::Fault => "fault",
        };
        f.write_str(s)
    }
}

/// A per-packet failure. Never fatal to the worker.
#[derive(Debug, Error)]
pub enum PacketError {
    #[error("error parsing packet: {0}")]
    Parse(#[source] WireError),
    #[error("error validating packet: {0}")]
    Validate(#[source] WireError),
    #[error("no local handler for {0:?} payload")]
    NoHandler(PayloadClass),
    #[error("error parsing payload: {0}")]
    Payload(#[source] WireError),
    #[error("error processing packet: {0}")]
    Process(String),
    #[error("no next hop for packet to {0}")]
    NoNextHop(IsdAs),
    #[error("error routing packet: {0:?}")]
    Forward(#[from] io::Error),
    #[error("packet processing panicked: {0}")]
    Fault(String),
}

impl PacketError {
    pub fn stage(&self) -> Stage {
        match self {
            Self::Parse(_) => Stage::Parse,
            Self::Validate(_) => Stage::Validate,
            Self::NoHandler(_) => Stage::LocalProcessing,
            Self::Payload(_) => Stage::Payload,
            Self::Process(_) => Stage::Process,
            Self::NoNextHop(_) | Self::Forward(_) => Stage::Route,
            Self::Fault(_) => Stage::Fault,
        }
    }

    /// Whether the sender is told about this error. Local-processing and payload errors are
    /// application-level and only logged.
    pub fn responds(&self) -> bool {
        matches!(self.stage(), Stage::Parse | Stage::Validate | Stage::Process | Stage::Route)
    }
}

#[derive(Debug, Error)]
pub enum RouterError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("router is already running")]
    Running,
    #[error("router is not running")]
    NotRunning,
}

#[derive(Debug, Error)]
pub enum ReloadError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("router stopped")]
    Closed,
}
