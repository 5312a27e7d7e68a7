use std::time::SystemTime;

mod ids;
pub use ids::{IdError, IfId, IsdAs};

/// Returns the current UNIX timestamp in seconds. Clocks set before the epoch yield 0.
#[inline]
pub fn unix_secs() -> u64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

/// Bit-rate units, in bits per second.
#[allow(non_upper_case_globals)]
pub mod constants {
    pub const Kbps: u64 = 1_000;
    pub const Mbps: u64 = 1_000 * Kbps;
    pub const Gbps: u64 = 1_000 * Mbps;
}
