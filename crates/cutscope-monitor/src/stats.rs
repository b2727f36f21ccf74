//! Frame accounting shared between the renderer, display and controller.

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters updated from several threads.
#[derive(Debug, Default)]
pub struct FrameStats {
    received: AtomicU64,
    superseded: AtomicU64,
    uploaded: AtomicU64,
    presented: AtomicU64,
    dropped: AtomicU64,
    lost: AtomicU64,
    reallocations: AtomicU64,
}

/// Point-in-time copy of [`FrameStats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatsSnapshot {
    /// Frames accepted from the engine.
    pub received: u64,
    /// Frames replaced in the renderer inbox by a newer one before upload.
    pub superseded: u64,
    pub uploaded: u64,
    /// Paints that showed a new frame.
    pub presented: u64,
    /// Frames that never reached the screen because a newer one was shown.
    pub dropped: u64,
    /// Frames lost to unsupported formats or failed uploads.
    pub lost: u64,
    pub reallocations: u64,
}

impl FrameStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_received(&self) {
        self.received.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_superseded(&self) {
        self.superseded.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_uploaded(&self) {
        self.uploaded.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_presented(&self) {
        self.presented.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns the new total.
    pub(crate) fn record_dropped(&self, count: u64) -> u64 {
        self.dropped.fetch_add(count, Ordering::Relaxed) + count
    }

    /// Returns the new total.
    pub(crate) fn record_lost(&self) -> u64 {
        self.lost.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub(crate) fn record_reallocation(&self) {
        self.reallocations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn lost(&self) -> u64 {
        self.lost.load(Ordering::Relaxed)
    }

    /// Zero the dropped-frame counter.
    pub fn reset_drops(&self) {
        self.dropped.store(0, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            received: self.received.load(Ordering::Relaxed),
            superseded: self.superseded.load(Ordering::Relaxed),
            uploaded: self.uploaded.load(Ordering::Relaxed),
            presented: self.presented.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            lost: self.lost.load(Ordering::Relaxed),
            reallocations: self.reallocations.load(Ordering::Relaxed),
        }
    }
}
