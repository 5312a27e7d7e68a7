use std::{
    collections::VecDeque,
    time::{Duration, Instant},
};

use crate::{RATE_WINDOW, RATE_WINDOW_SLOTS};

/// Byte counter over a trailing time window.
///
/// The window is split into a fixed number of slots, so memory stays bounded no matter the packet
/// rate; samples are evicted one slot at a time. The counter holds no lock, callers that share it
/// must serialize access.
#[derive(Debug, Clone)]
pub struct WindowedRateCounter {
    window: Duration,
    slot_len: Duration,
    n_slots: u64,
    /// Slot indices are counted from here.
    origin: Instant,
    /// Non-empty slots as `(slot index, bytes)`, oldest first.
    slots: VecDeque<(u64, u64)>,
    /// Sum of the bytes in `slots`.
    sum: u64,
}

impl Default for WindowedRateCounter {
    fn default() -> Self {
        Self::new(RATE_WINDOW, RATE_WINDOW_SLOTS)
    }
}

impl WindowedRateCounter {
    /// Creates a counter over `window` split into `n_slots` slots.
    pub fn new(window: Duration, n_slots: u32) -> Self {
        Self::with_origin(Instant::now(), window, n_slots)
    }

    /// Same as [`WindowedRateCounter::new`], counting slots from `origin`.
    pub fn with_origin(origin: Instant, window: Duration, n_slots: u32) -> Self {
        let window = window.max(Duration::from_nanos(1));
        let n_slots = n_slots.max(1);
        let slot_len = (window / n_slots).max(Duration::from_nanos(1));

        Self {
            window,
            slot_len,
            n_slots: n_slots as u64,
            origin,
            slots: VecDeque::with_capacity(n_slots as usize),
            sum: 0,
        }
    }

    /// Records `n_bytes` now.
    pub fn add(&mut self, n_bytes: u64) {
        self.add_at(Instant::now(), n_bytes);
    }

    pub fn add_at(&mut self, now: Instant, n_bytes: u64) {
        let idx = self.slot_index(now);
        self.evict(idx);

        match self.slots.back_mut() {
            // Samples older than the newest slot are folded into it.
            Some((last, bytes)) if *last >= idx => *bytes += n_bytes,
            _ => self.slots.push_back((idx, n_bytes)),
        }

        self.sum += n_bytes;
    }

    /// Returns the byte rate per second over the trailing window.
    pub fn rate(&mut self) -> u64 {
        self.rate_at(Instant::now())
    }

    pub fn rate_at(&mut self, now: Instant) -> u64 {
        let idx = self.slot_index(now);
        self.evict(idx);

        (self.sum as u128 * 1_000_000_000 / self.window.as_nanos()) as u64
    }

    /// Total bytes currently inside the window, as of the last update.
    #[inline]
    pub fn bytes_in_window(&self) -> u64 {
        self.sum
    }

    #[inline]
    pub fn window(&self) -> Duration {
        self.window
    }

    fn slot_index(&self, now: Instant) -> u64 {
        (now.saturating_duration_since(self.origin).as_nanos() / self.slot_len.as_nanos()) as u64
    }

    /// Drops every slot that fell out of the window ending in slot `idx`.
    fn evict(&mut self, idx: u64) {
        while let Some(&(slot, bytes)) = self.slots.front() {
            if slot + self.n_slots > idx {
                break;
            }

            self.slots.pop_front();
            self.sum -= bytes;
        }
    }
}
