//! Bridge-wide statistics counters.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Frame and protocol counters for one bridge.
///
/// Counters are incremented with relaxed ordering from both the packet and
/// timer contexts; readers get approximate values, which is sufficient for
/// diagnostics.
#[derive(Debug, Default)]
pub struct BridgeStats {
    pub frames_in: AtomicU64,
    pub frames_forwarded: AtomicU64,
    pub frames_flooded: AtomicU64,
    pub frames_delivered_local: AtomicU64,
    pub frames_dropped: AtomicU64,
    pub frames_malformed: AtomicU64,
    pub mcast_expansions: AtomicU64,
    pub proxy_rewrites: AtomicU64,
    pub bpdus_rx: AtomicU64,
    pub bpdus_tx: AtomicU64,
    pub bpdus_malformed: AtomicU64,
    pub fdb_entries_aged: AtomicU64,
    pub mcast_members_aged: AtomicU64,
}

/// A point-in-time copy of the counters, serializable for status queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub frames_in: u64,
    pub frames_forwarded: u64,
    pub frames_flooded: u64,
    pub frames_delivered_local: u64,
    pub frames_dropped: u64,
    pub frames_malformed: u64,
    pub mcast_expansions: u64,
    pub proxy_rewrites: u64,
    pub bpdus_rx: u64,
    pub bpdus_tx: u64,
    pub bpdus_malformed: u64,
    pub fdb_entries_aged: u64,
    pub mcast_members_aged: u64,
}

impl BridgeStats {
    /// Bumps a counter by one.
    pub fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Adds to a counter.
    pub fn add(counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    /// Takes an approximate snapshot of all counters.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            frames_in: self.frames_in.load(Ordering::Relaxed),
            frames_forwarded: self.frames_forwarded.load(Ordering::Relaxed),
            frames_flooded: self.frames_flooded.load(Ordering::Relaxed),
            frames_delivered_local: self.frames_delivered_local.load(Ordering::Relaxed),
            frames_dropped: self.frames_dropped.load(Ordering::Relaxed),
            frames_malformed: self.frames_malformed.load(Ordering::Relaxed),
            mcast_expansions: self.mcast_expansions.load(Ordering::Relaxed),
            proxy_rewrites: self.proxy_rewrites.load(Ordering::Relaxed),
            bpdus_rx: self.bpdus_rx.load(Ordering::Relaxed),
            bpdus_tx: self.bpdus_tx.load(Ordering::Relaxed),
            bpdus_malformed: self.bpdus_malformed.load(Ordering::Relaxed),
            fdb_entries_aged: self.fdb_entries_aged.load(Ordering::Relaxed),
            mcast_members_aged: self.mcast_members_aged.load(Ordering::Relaxed),
        }
    }
}
