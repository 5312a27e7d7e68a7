#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

//! Bandwidth enforcement for the border router.
//!
//! Admission is hierarchical: a [`BandwidthEnforcer`] holds one [`InterfaceQuota`] per enforced
//! interface, which in turn holds one [`AsQuota`] per AS with a reservation plus a single shared
//! fallback quota for every other AS. Rates are estimated with a [`WindowedRateCounter`].

use std::time::Duration;

mod config;
mod counter;
mod enforcer;
mod interface;
mod metrics;
mod quota;

pub use config::{AsConfig, ConfigError, DirectionConfig, EnforcementConfig, FallbackConfig, InterfaceConfig};
pub use counter::WindowedRateCounter;
pub use enforcer::BandwidthEnforcer;
pub use interface::InterfaceQuota;
pub use metrics::{AsLabels, AsMetrics, Direction, MetricsSink, NoopMetrics};
pub use quota::{AsQuota, BwLimit};

/// Trailing window over which AS rates are estimated.
pub const RATE_WINDOW: Duration = Duration::from_secs(1);

/// Number of sub-intervals the rate window is split into.
pub const RATE_WINDOW_SLOTS: u32 = 10;

/// Maximum staleness of an interface's cached aggregate usage.
pub const USED_BW_REFRESH: Duration = Duration::from_secs(5);
