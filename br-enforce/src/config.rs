use std::{collections::HashSet, path::Path, time::Instant};

use br_common::{IfId, IsdAs};
use serde::Deserialize;
use thiserror::Error;

use crate::{AsLabels, AsQuota, BwLimit, Direction, InterfaceQuota};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0:?}")]
    Io(#[from] std::io::Error),
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("invalid bandwidth limit {value} for {what}: must be -1, 0 or positive")]
    InvalidLimit { what: String, value: i64 },
    #[error("interface {0} has no bandwidth cap")]
    ZeroCap(IfId),
    #[error("{direction} interface {ifid} configured twice")]
    DuplicateInterface { direction: Direction, ifid: IfId },
    #[error("AS {isd_as} configured twice on {direction} interface {ifid}")]
    DuplicateAs { direction: Direction, ifid: IfId, isd_as: IsdAs },
}

/// Bandwidth enforcement configuration for both traffic directions.
///
/// ```toml
/// enabled = true
///
/// [ingress]
/// enabled = true
///
/// [[ingress.interfaces]]
/// ifid = 1
/// max_bps = 1_000_000
/// unknown = { max_bps = 0 }
/// ases = [
///     { isd_as = "1-11", max_bps = 100_000, alert_bps = 95_000 },
///     { isd_as = "1-12", max_bps = -1 },
/// ]
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EnforcementConfig {
    /// Global switch. When off, neither direction is enforced.
    pub enabled: bool,
    pub ingress: DirectionConfig,
    pub egress: DirectionConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DirectionConfig {
    pub enabled: bool,
    /// Enforced interfaces. Interfaces not listed here are never enforced.
    pub interfaces: Vec<InterfaceConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InterfaceConfig {
    pub ifid: IfId,
    /// Interface cap in bits per second.
    pub max_bps: u64,
    /// Quota shared by every AS without a reservation.
    #[serde(default)]
    pub unknown: FallbackConfig,
    #[serde(default)]
    pub ases: Vec<AsConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AsConfig {
    pub isd_as: IsdAs,
    /// `-1` unlimited, `0` blocked, otherwise the limit in bits per second.
    pub max_bps: i64,
    /// Admitted traffic above this rate is reported. Defaults to 95% of a positive limit.
    #[serde(default)]
    pub alert_bps: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FallbackConfig {
    /// Same encoding as [`AsConfig::max_bps`]. The default of `0` lets unclassified traffic use
    /// only the capacity left idle by known ASes.
    pub max_bps: i64,
    pub alert_bps: Option<u64>,
}

impl EnforcementConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    /// Checks the whole configuration, so that building enforcers from it cannot fail halfway.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.ingress.validate(Direction::Ingress)?;
        self.egress.validate(Direction::Egress)
    }

    /// Returns the configuration of the given direction.
    pub fn direction(&self, direction: Direction) -> &DirectionConfig {
        match direction {
            Direction::Ingress => &self.ingress,
            Direction::Egress => &self.egress,
        }
    }
}

impl DirectionConfig {
    pub fn validate(&self, direction: Direction) -> Result<(), ConfigError> {
        let mut seen_ifids = HashSet::new();

        for iface in &self.interfaces {
            if !seen_ifids.insert(iface.ifid) {
                return Err(ConfigError::DuplicateInterface { direction, ifid: iface.ifid });
            }

            if iface.max_bps == 0 {
                return Err(ConfigError::ZeroCap(iface.ifid));
            }

            parse_limit(iface.unknown.max_bps, || format!("unknown ASes on interface {}", iface.ifid))?;

            let mut seen_ases = HashSet::new();
            for as_config in &iface.ases {
                if !seen_ases.insert(as_config.isd_as) {
                    return Err(ConfigError::DuplicateAs {
                        direction,
                        ifid: iface.ifid,
                        isd_as: as_config.isd_as,
                    });
                }

                parse_limit(as_config.max_bps, || format!("AS {}", as_config.isd_as))?;
            }
        }

        Ok(())
    }
}

impl InterfaceConfig {
    /// Builds the complete enforcement state of this interface.
    pub fn build(&self, direction: Direction, now: Instant) -> Result<InterfaceQuota, ConfigError> {
        let max = parse_limit(self.unknown.max_bps, || {
            format!("unknown ASes on interface {}", self.ifid)
        })?;
        let labels = AsLabels { direction, ifid: self.ifid, isd_as: None };
        let fallback = AsQuota::new(max, self.unknown.alert_bps, labels);

        let mut iface = InterfaceQuota::new_at(now, self.ifid, self.max_bps, fallback);
        for as_config in &self.ases {
            let max = parse_limit(as_config.max_bps, || format!("AS {}", as_config.isd_as))?;
            let alert = as_config.alert_bps.or_else(|| default_alert(max));
            let labels = AsLabels { direction, ifid: self.ifid, isd_as: Some(as_config.isd_as) };

            iface = iface.with_as(as_config.isd_as, AsQuota::new(max, alert, labels));
        }

        Ok(iface)
    }
}

fn parse_limit(value: i64, what: impl FnOnce() -> String) -> Result<BwLimit, ConfigError> {
    match value {
        -1 => Ok(BwLimit::Unlimited),
        0 => Ok(BwLimit::Blocked),
        v if v > 0 => Ok(BwLimit::Limited(v as u64)),
        v => Err(ConfigError::InvalidLimit { what: what(), value: v }),
    }
}

fn default_alert(max: BwLimit) -> Option<u64> {
    match max {
        BwLimit::Limited(max) => Some((max as u128 * 95 / 100) as u64),
        BwLimit::Unlimited | BwLimit::Blocked => None,
    }
}
