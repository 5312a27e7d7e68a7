use std::{
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};

use br_enforce::Direction;

use crate::Stage;

/// Router-wide packet statistics, shared between all socket workers.
#[derive(Debug, Default)]
pub struct RouterStats {
    /// Total packets taken off the rings
    processed: AtomicU64,
    /// Packets sent to a next hop
    forwarded: AtomicU64,
    /// Packets delivered inside the local AS
    delivered: AtomicU64,
    /// Packets consumed by the router itself
    consumed: AtomicU64,
    /// Packets dropped by ingress admission control
    ingress_drops: AtomicU64,
    /// Packets dropped by egress admission control
    egress_drops: AtomicU64,
    /// Failed packets, per stage
    errors: [AtomicU64; Stage::ALL.len()],
    /// Sum of processing latencies, from receipt to completion, in microseconds
    process_time_us: AtomicU64,
    /// Sum of admission decision times in nanoseconds
    admission_ns: AtomicU64,
    /// Number of admission decisions
    admission_checks: AtomicU64,
}

impl RouterStats {
    #[inline]
    pub(crate) fn record_processed(&self, latency: Duration) {
        self.processed.fetch_add(1, Ordering::Relaxed);
        self.process_time_us.fetch_add(latency.as_micros() as u64, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn increment_forwarded(&self) {
        self.forwarded.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn increment_delivered(&self) {
        self.delivered.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn increment_consumed(&self) {
        self.consumed.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn increment_drops(&self, direction: Direction) {
        match direction {
            Direction::Ingress => self.ingress_drops.fetch_add(1, Ordering::Relaxed),
            Direction::Egress => self.egress_drops.fetch_add(1, Ordering::Relaxed),
        };
    }

    #[inline]
    pub(crate) fn increment_errors(&self, stage: Stage) {
        self.errors[stage.index()].fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_admission(&self, elapsed: Duration) {
        self.admission_checks.fetch_add(1, Ordering::Relaxed);
        self.admission_ns.fetch_add(elapsed.as_nanos() as u64, Ordering::Relaxed);
    }

    #[inline]
    pub fn processed(&self) -> u64 {
        self.processed.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn forwarded(&self) -> u64 {
        self.forwarded.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn consumed(&self) -> u64 {
        self.consumed.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn drops(&self, direction: Direction) -> u64 {
        match direction {
            Direction::Ingress => self.ingress_drops.load(Ordering::Relaxed),
            Direction::Egress => self.egress_drops.load(Ordering::Relaxed),
        }
    }

    #[inline]
    pub fn errors(&self, stage: Stage) -> u64 {
        self.errors[stage.index()].load(Ordering::Relaxed)
    }

    /// Average processing latency in microseconds.
    pub fn avg_process_time_us(&self) -> u64 {
        self.process_time_us.load(Ordering::Relaxed) / self.processed().max(1)
    }

    /// Average admission decision time in nanoseconds.
    pub fn avg_admission_ns(&self) -> u64 {
        self.admission_ns.load(Ordering::Relaxed) /
            self.admission_checks.load(Ordering::Relaxed).max(1)
    }

    #[inline]
    pub fn admission_checks(&self) -> u64 {
        self.admission_checks.load(Ordering::Relaxed)
    }
}
