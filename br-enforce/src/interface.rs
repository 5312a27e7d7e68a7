use std::time::Instant;

use br_common::{IfId, IsdAs};
use rustc_hash::FxHashMap;
use tracing::trace;

use crate::{AsLabels, AsQuota, MetricsSink, USED_BW_REFRESH};

/// Enforcement state of one interface.
///
/// Known ASes are checked against their own quota in O(1). Unclassified ASes share one fallback
/// quota and may additionally use the headroom left by known ASes, which is estimated from a
/// cached aggregate that is recomputed at most every [`USED_BW_REFRESH`].
#[derive(Debug)]
pub struct InterfaceQuota {
    ifid: IfId,
    /// Interface cap in bits per second.
    max_bps: u64,
    /// Aggregate rate of all known ASes. Recomputed every [`USED_BW_REFRESH`], adjusted
    /// incrementally by admitted known-AS packets in between.
    used_bps: u64,
    last_refresh: Instant,
    ases: FxHashMap<IsdAs, AsQuota>,
    fallback: AsQuota,
}

impl InterfaceQuota {
    pub fn new(ifid: IfId, max_bps: u64, fallback: AsQuota) -> Self {
        Self::new_at(Instant::now(), ifid, max_bps, fallback)
    }

    /// Creates an interface quota whose usage cache was last refreshed at `now`.
    pub fn new_at(now: Instant, ifid: IfId, max_bps: u64, fallback: AsQuota) -> Self {
        Self {
            ifid,
            max_bps,
            used_bps: 0,
            last_refresh: now,
            ases: FxHashMap::default(),
            fallback,
        }
    }

    /// Adds the quota for an AS with a reservation on this interface.
    pub fn with_as(mut self, isd_as: IsdAs, quota: AsQuota) -> Self {
        self.ases.insert(isd_as, quota);
        self
    }

    /// Decides whether a packet of `len` bytes from `isd_as` may pass, and accounts for it if so.
    pub fn can_forward(&mut self, isd_as: IsdAs, len: u64, metrics: &dyn MetricsSink) -> bool {
        self.can_forward_at(Instant::now(), isd_as, len, metrics)
    }

    pub fn can_forward_at(
        &mut self,
        now: Instant,
        isd_as: IsdAs,
        len: u64,
        metrics: &dyn MetricsSink,
    ) -> bool {
        if let Some(quota) = self.ases.get_mut(&isd_as) {
            let (old_bps, cur_bps) = quota.refresh(now, false);

            if quota.max().permits(cur_bps) {
                quota.record(now, len, false);
                self.used_bps = apply_delta(self.used_bps, old_bps, cur_bps);

                if quota.should_alert(cur_bps) {
                    metrics.set_gauge(quota.labels(), cur_bps as i64);
                }

                return true;
            }

            trace!(labels = %quota.labels(), cur_bps, "dropping packet over AS quota");
            reject(metrics, quota.labels(), cur_bps);
            return false;
        }

        let (_, candidate_bps) = self.fallback.refresh(now, true);
        let free_bps = self.max_bps as i128 - self.used_bits_at(now) as i128;

        let admit = candidate_bps < self.unknown_share()
            && (self.fallback.max().permits(candidate_bps) || (candidate_bps as i128) < free_bps);

        if admit {
            self.fallback.record(now, len, true);
            return true;
        }

        trace!(labels = %self.fallback.labels(), %isd_as, candidate_bps, free_bps, "dropping unclassified packet");
        reject(metrics, self.fallback.labels(), candidate_bps);
        false
    }

    /// Returns the aggregate rate of all known ASes, recomputing it from their counters if the
    /// cached value is older than [`USED_BW_REFRESH`].
    pub fn used_bits_at(&mut self, now: Instant) -> u64 {
        if now.saturating_duration_since(self.last_refresh) >= USED_BW_REFRESH {
            self.used_bps = self.ases.values_mut().map(|quota| quota.refresh(now, false).1).sum();
            self.last_refresh = now;
        }

        self.used_bps
    }

    /// The maximum rate unclassified traffic may reach: 75% of the interface cap.
    #[inline]
    pub fn unknown_share(&self) -> u64 {
        self.max_bps / 2 + self.max_bps / 4
    }

    #[inline]
    pub fn ifid(&self) -> IfId {
        self.ifid
    }

    #[inline]
    pub fn max_bps(&self) -> u64 {
        self.max_bps
    }

    /// The cached aggregate, without refreshing it.
    #[inline]
    pub fn cached_used_bps(&self) -> u64 {
        self.used_bps
    }

    #[inline]
    pub fn quota(&self, isd_as: &IsdAs) -> Option<&AsQuota> {
        self.ases.get(isd_as)
    }

    #[inline]
    pub fn fallback(&self) -> &AsQuota {
        &self.fallback
    }

    /// Number of ASes with a reservation.
    #[inline]
    pub fn len(&self) -> usize {
        self.ases.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.ases.is_empty()
    }
}

fn apply_delta(used: u64, old: u64, cur: u64) -> u64 {
    if cur >= old {
        used.saturating_add(cur - old)
    } else {
        used.saturating_sub(old - cur)
    }
}

fn reject(metrics: &dyn MetricsSink, labels: &AsLabels, bps: u64) {
    metrics.set_gauge(labels, bps as i64);
    metrics.increment_counter(labels);
}
