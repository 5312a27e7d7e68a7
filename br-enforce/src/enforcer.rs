use std::{fmt, sync::Arc, time::Instant};

use br_common::{IfId, IsdAs};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tracing::debug;

use crate::{ConfigError, Direction, DirectionConfig, InterfaceQuota, MetricsSink, NoopMetrics};

/// Admission control for one traffic direction.
///
/// Built once from configuration and never patched: a reload builds a new enforcer and replaces
/// the old one as a whole. Each interface quota sits behind its own lock, so the
/// refresh-compare-record sequence of an admission decision is atomic per interface while
/// packets on different interfaces never contend.
pub struct BandwidthEnforcer {
    direction: Direction,
    enabled: bool,
    interfaces: FxHashMap<IfId, Mutex<InterfaceQuota>>,
    metrics: Arc<dyn MetricsSink>,
}

impl fmt::Debug for BandwidthEnforcer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BandwidthEnforcer")
            .field("direction", &self.direction)
            .field("enabled", &self.enabled)
            .field("interfaces", &self.interfaces.len())
            .finish_non_exhaustive()
    }
}

impl BandwidthEnforcer {
    pub fn new(direction: Direction, enabled: bool, metrics: Arc<dyn MetricsSink>) -> Self {
        Self { direction, enabled, interfaces: FxHashMap::default(), metrics }
    }

    /// An enforcer that admits everything.
    pub fn disabled(direction: Direction) -> Self {
        Self::new(direction, false, Arc::new(NoopMetrics))
    }

    /// Builds an enforcer from the configuration of one direction. `globally_enabled` is the
    /// router-wide switch; the enforcer is enabled only if both switches are on.
    pub fn from_config(
        direction: Direction,
        config: &DirectionConfig,
        globally_enabled: bool,
        metrics: Arc<dyn MetricsSink>,
    ) -> Result<Self, ConfigError> {
        config.validate(direction)?;

        let now = Instant::now();
        let mut enforcer = Self::new(direction, globally_enabled && config.enabled, metrics);
        for iface in &config.interfaces {
            enforcer = enforcer.with_interface(iface.build(direction, now)?);
        }

        debug!(%direction, enabled = enforcer.enabled, interfaces = enforcer.interfaces.len(), "built bandwidth enforcer");
        Ok(enforcer)
    }

    /// Registers the quota of an interface, replacing any previous one with the same id.
    pub fn with_interface(mut self, quota: InterfaceQuota) -> Self {
        self.interfaces.insert(quota.ifid(), Mutex::new(quota));
        self
    }

    /// Decides whether a packet of `len` bytes from `isd_as` may pass through interface `ifid`.
    ///
    /// Always admits when enforcement is disabled or the interface is not enforced.
    pub fn check(&self, ifid: IfId, isd_as: IsdAs, len: usize) -> bool {
        self.check_at(Instant::now(), ifid, isd_as, len)
    }

    pub fn check_at(&self, now: Instant, ifid: IfId, isd_as: IsdAs, len: usize) -> bool {
        if !self.enabled {
            return true;
        }

        let Some(iface) = self.interfaces.get(&ifid) else {
            return true;
        };

        iface.lock().can_forward_at(now, isd_as, len as u64, self.metrics.as_ref())
    }

    #[inline]
    pub fn direction(&self) -> Direction {
        self.direction
    }

    #[inline]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Whether the given interface is enforced.
    #[inline]
    pub fn is_enforced(&self, ifid: &IfId) -> bool {
        self.interfaces.contains_key(ifid)
    }

    /// Number of enforced interfaces.
    #[inline]
    pub fn len(&self) -> usize {
        self.interfaces.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.interfaces.is_empty()
    }

    /// Runs `f` with the locked quota of an interface.
    pub fn inspect<R>(&self, ifid: &IfId, f: impl FnOnce(&InterfaceQuota) -> R) -> Option<R> {
        self.interfaces.get(ifid).map(|iface| f(&iface.lock()))
    }
}
