use std::time::Instant;

use crate::{AsLabels, WindowedRateCounter};

/// A configured bandwidth limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BwLimit {
    /// No limit; traffic is always admitted.
    Unlimited,
    /// Every packet is dropped.
    Blocked,
    /// Admit while the rate stays strictly below this many bits per second.
    Limited(u64),
}

impl BwLimit {
    /// Whether a current rate of `bps` is still below the limit.
    #[inline]
    pub const fn permits(&self, bps: u64) -> bool {
        match *self {
            Self::Unlimited => true,
            Self::Blocked => false,
            Self::Limited(max) => bps < max,
        }
    }

    #[inline]
    pub const fn is_blocked(&self) -> bool {
        matches!(self, Self::Blocked)
    }

    /// The limit in the signed encoding used by configuration: `-1` unlimited, `0` blocked.
    pub const fn as_bps(&self) -> i64 {
        match *self {
            Self::Unlimited => -1,
            Self::Blocked => 0,
            Self::Limited(max) => max as i64,
        }
    }
}

/// Enforcement state of a single AS, or of the fallback shared by all unclassified ASes.
#[derive(Debug, Clone)]
pub struct AsQuota {
    max: BwLimit,
    /// Rate above which admitted traffic is reported. `None` never reports.
    alert_bps: Option<u64>,
    /// Last computed rate, written only by [`AsQuota::refresh`].
    cached_bps: u64,
    counter: WindowedRateCounter,
    labels: AsLabels,
}

impl AsQuota {
    pub fn new(max: BwLimit, alert_bps: Option<u64>, labels: AsLabels) -> Self {
        Self::with_counter(max, alert_bps, labels, WindowedRateCounter::default())
    }

    pub fn with_counter(
        max: BwLimit,
        alert_bps: Option<u64>,
        labels: AsLabels,
        counter: WindowedRateCounter,
    ) -> Self {
        Self { max, alert_bps, cached_bps: 0, counter, labels }
    }

    /// Recomputes the current rate in bits per second and returns `(previous, current)`.
    ///
    /// A blocked AS that is not the fallback is never tracked and always reports `(0, 0)`.
    pub fn refresh(&mut self, now: Instant, is_fallback: bool) -> (u64, u64) {
        if !is_fallback && self.max.is_blocked() {
            return (0, 0);
        }

        let previous = self.cached_bps;
        self.cached_bps = self.counter.rate_at(now).saturating_mul(8);

        (previous, self.cached_bps)
    }

    /// Records an admitted packet of `len` bytes.
    pub fn record(&mut self, now: Instant, len: u64, is_fallback: bool) {
        if is_fallback || !self.max.is_blocked() {
            self.counter.add_at(now, len);
        }
    }

    /// Whether admitted traffic at `bps` should be reported.
    #[inline]
    pub fn should_alert(&self, bps: u64) -> bool {
        self.alert_bps.is_some_and(|alert| bps > alert)
    }

    #[inline]
    pub fn max(&self) -> BwLimit {
        self.max
    }

    #[inline]
    pub fn cached_bps(&self) -> u64 {
        self.cached_bps
    }

    #[inline]
    pub fn labels(&self) -> &AsLabels {
        &self.labels
    }

    #[inline]
    pub fn counter(&self) -> &WindowedRateCounter {
        &self.counter
    }
}
