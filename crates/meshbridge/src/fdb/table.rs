//! The forwarding database table.

use super::types::{EntryClass, FdbDumpEntry, FdbEntry, FdbKey, FdbLookup};
use crate::error::{BridgeError, BridgeResult};
use crate::ports::PortIndex;
use dashmap::DashMap;
use meshbridge_types::MacAddress;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, trace};

/// FDB operation counters (relaxed; approximate).
#[derive(Debug, Default)]
pub struct FdbStats {
    pub learned: AtomicU64,
    pub roamed: AtomicU64,
    pub refreshed: AtomicU64,
    pub aged: AtomicU64,
    pub capacity_drops: AtomicU64,
}

/// MAC address table with aging and static/local pinning.
///
/// Sharded by key so the learn-and-forward path does not serialize across
/// unrelated addresses.
#[derive(Debug)]
pub struct Fdb {
    entries: DashMap<FdbKey, FdbEntry>,
    capacity: usize,
    priority_ouis: Vec<[u8; 3]>,
    stats: FdbStats,
}

impl Fdb {
    /// Creates a table with the given entry cap and priority-class OUI
    /// allowlist.
    pub fn new(capacity: usize, priority_ouis: Vec<[u8; 3]>) -> Self {
        Self {
            entries: DashMap::new(),
            capacity,
            priority_ouis,
            stats: FdbStats::default(),
        }
    }

    fn class_of(&self, mac: &MacAddress) -> EntryClass {
        if self.priority_ouis.iter().any(|p| *p == mac.oui()) {
            EntryClass::Priority
        } else {
            EntryClass::Normal
        }
    }

    /// Looks up the entry for `mac`. Never blocks on writers of other shards
    /// and never creates entries.
    pub fn lookup(&self, mac: MacAddress) -> Option<FdbLookup> {
        self.entries
            .get(&FdbKey::untagged(mac))
            .map(|entry| FdbLookup::from(entry.value()))
    }

    /// Learns `mac` on `port`, refreshing an existing entry or creating a
    /// dynamic one.
    ///
    /// A changed owning port on a dynamic entry means the station roamed:
    /// the entry moves and any stale direct shortcut is cleared. Static
    /// entries are never reassigned.
    pub fn learn(&self, mac: MacAddress, port: PortIndex, now: Instant) -> BridgeResult<()> {
        if mac.is_multicast() || mac.is_zero() {
            return Ok(());
        }
        let key = FdbKey::untagged(mac);

        if let Some(mut entry) = self.entries.get_mut(&key) {
            if entry.is_static {
                // Pinned entries keep their port; only the timestamp moves.
                entry.last_seen = now;
                self.stats.refreshed.fetch_add(1, Ordering::Relaxed);
                return Ok(());
            }
            if entry.port != port {
                debug!(%mac, from = entry.port.0, to = port.0, "station roamed");
                entry.port = port;
                entry.direct = None;
                self.stats.roamed.fetch_add(1, Ordering::Relaxed);
            } else {
                self.stats.refreshed.fetch_add(1, Ordering::Relaxed);
            }
            entry.last_seen = now;
            return Ok(());
        }

        if self.entries.len() >= self.capacity {
            self.stats.capacity_drops.fetch_add(1, Ordering::Relaxed);
            return Err(BridgeError::ResourceExhausted(format!(
                "fdb full ({} entries), cannot learn {}",
                self.capacity, mac
            )));
        }

        trace!(%mac, port = port.0, "learned station");
        self.stats.learned.fetch_add(1, Ordering::Relaxed);
        self.entries.insert(
            key,
            FdbEntry {
                key,
                port,
                direct: None,
                is_local: false,
                is_static: false,
                class: self.class_of(&mac),
                last_seen: now,
            },
        );
        Ok(())
    }

    /// Records a direct one-hop shortcut for `mac`.
    ///
    /// Creates the entry if the station is not yet known (the announcement
    /// may precede any data frame), with `owner` as the topology port.
    pub fn learn_direct(
        &self,
        mac: MacAddress,
        owner: PortIndex,
        direct: PortIndex,
        now: Instant,
    ) -> BridgeResult<()> {
        let key = FdbKey::untagged(mac);
        if let Some(mut entry) = self.entries.get_mut(&key) {
            if !entry.is_static {
                entry.direct = Some(direct);
                entry.last_seen = now;
            }
            return Ok(());
        }
        if self.entries.len() >= self.capacity {
            self.stats.capacity_drops.fetch_add(1, Ordering::Relaxed);
            return Err(BridgeError::ResourceExhausted(format!(
                "fdb full ({} entries), cannot record direct path for {}",
                self.capacity, mac
            )));
        }
        self.entries.insert(
            key,
            FdbEntry {
                key,
                port: owner,
                direct: Some(direct),
                is_local: false,
                is_static: false,
                class: self.class_of(&mac),
                last_seen: now,
            },
        );
        Ok(())
    }

    /// Seeds a static, local entry for a bridge-owned address. Used at
    /// port-attach time; replaces any dynamic entry for the same address.
    pub fn insert_local(&self, mac: MacAddress, port: PortIndex) {
        let key = FdbKey::untagged(mac);
        self.entries.insert(
            key,
            FdbEntry {
                key,
                port,
                direct: None,
                is_local: true,
                is_static: true,
                class: self.class_of(&mac),
                last_seen: Instant::now(),
            },
        );
    }

    /// Removes every entry owned by `port` (static or not) and clears any
    /// direct shortcut through it. Called on port detach.
    pub fn delete_by_port(&self, port: PortIndex) {
        self.entries.retain(|_, entry| entry.port != port);
        for mut entry in self.entries.iter_mut() {
            if entry.direct == Some(port) {
                entry.direct = None;
            }
        }
    }

    /// Removes dynamic entries idle longer than `ageing_time`.
    ///
    /// Idempotent for a fixed `now`: a second sweep with the same timestamp
    /// removes nothing further. Returns the number of entries removed.
    pub fn age_sweep(&self, now: Instant, ageing_time: Duration) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| {
            entry.is_static
                || entry.is_local
                || now.saturating_duration_since(entry.last_seen) <= ageing_time
        });
        let removed = before - self.entries.len();
        if removed > 0 {
            debug!(removed, "fdb age sweep");
            self.stats.aged.fetch_add(removed as u64, Ordering::Relaxed);
        }
        removed
    }

    /// Ages out dynamic entries as if `ageing_time` were the forward delay.
    ///
    /// This is the topology-change fast-ageing: stations behind a moved
    /// link must be relearned quickly.
    pub fn flush_dynamic(&self) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|_, entry| entry.is_static || entry.is_local);
        before - self.entries.len()
    }

    /// Returns one key-ordered page of entries starting at index `start`.
    pub fn dump_page(&self, start: usize, page_size: usize, now: Instant) -> Vec<FdbDumpEntry> {
        let mut keys: Vec<FdbKey> = self.entries.iter().map(|e| *e.key()).collect();
        keys.sort_unstable();
        keys.into_iter()
            .skip(start)
            .take(page_size)
            .filter_map(|key| {
                self.entries.get(&key).map(|entry| FdbDumpEntry {
                    mac: entry.key.mac,
                    vlan: entry.key.vlan,
                    port: entry.port.0,
                    direct: entry.direct.map(|p| p.0),
                    is_local: entry.is_local,
                    is_static: entry.is_static,
                    class: entry.class,
                    idle_secs: now.saturating_duration_since(entry.last_seen).as_secs(),
                })
            })
            .collect()
    }

    /// Number of entries currently in the table.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the table holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Operation counters.
    pub fn stats(&self) -> &FdbStats {
        &self.stats
    }
}
