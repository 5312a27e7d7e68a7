use std::{
    fmt,
    sync::{
        atomic::{AtomicI64, AtomicU64, Ordering},
        Arc,
    },
};

use br_common::{IfId, IsdAs};
use parking_lot::RwLock;
use rustc_hash::FxHashMap;

/// Direction of traffic relative to the local AS boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Ingress,
    Egress,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ingress => f.write_str("ingress"),
            Self::Egress => f.write_str("egress"),
        }
    }
}

/// Labels attached to every per-AS observability signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AsLabels {
    pub direction: Direction,
    pub ifid: IfId,
    /// `None` for the shared fallback quota of unclassified ASes.
    pub isd_as: Option<IsdAs>,
}

impl fmt::Display for AsLabels {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.isd_as {
            Some(ia) => write!(f, "{}/if{}/{}", self.direction, self.ifid, ia),
            None => write!(f, "{}/if{}/unknown", self.direction, self.ifid),
        }
    }
}

/// Sink for per-AS enforcement signals. Implementations are called on the packet path and
/// must not block.
pub trait MetricsSink: Send + Sync + 'static {
    /// Sets the current rate gauge, in bits per second.
    fn set_gauge(&self, labels: &AsLabels, value: i64);

    /// Increments the dropped packets counter.
    fn increment_counter(&self, labels: &AsLabels);
}

/// A sink that discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMetrics;

impl MetricsSink for NoopMetrics {
    fn set_gauge(&self, _labels: &AsLabels, _value: i64) {}

    fn increment_counter(&self, _labels: &AsLabels) {}
}

#[derive(Debug, Default)]
struct AsCounters {
    /// Last reported rate in bits per second.
    current_bps: AtomicI64,
    /// Total number of dropped packets.
    drops: AtomicU64,
}

/// In-process [`MetricsSink`] keeping one set of atomics per label set.
#[derive(Debug, Default)]
pub struct AsMetrics {
    counters: RwLock<FxHashMap<AsLabels, Arc<AsCounters>>>,
}

impl AsMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(&self, labels: &AsLabels) -> Arc<AsCounters> {
        if let Some(counters) = self.counters.read().get(labels) {
            return Arc::clone(counters);
        }

        Arc::clone(self.counters.write().entry(*labels).or_default())
    }

    /// Returns the last reported rate for the given labels, if any was reported.
    #[inline]
    pub fn current_bps(&self, labels: &AsLabels) -> Option<i64> {
        self.counters.read().get(labels).map(|c| c.current_bps.load(Ordering::Relaxed))
    }

    /// Returns the number of drops recorded for the given labels.
    #[inline]
    pub fn drops(&self, labels: &AsLabels) -> u64 {
        self.counters.read().get(labels).map_or(0, |c| c.drops.load(Ordering::Relaxed))
    }
}

impl MetricsSink for AsMetrics {
    fn set_gauge(&self, labels: &AsLabels, value: i64) {
        self.entry(labels).current_bps.store(value, Ordering::Relaxed);
    }

    fn increment_counter(&self, labels: &AsLabels) {
        self.entry(labels).drops.fetch_add(1, Ordering::Relaxed);
    }
}
