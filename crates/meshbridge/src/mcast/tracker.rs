//! The multicast membership tracker.

use super::types::{GroupDumpEntry, GroupEntry, GroupSnapshot, MemberInfo, PortMembership};
use crate::error::{BridgeError, BridgeResult};
use crate::ports::PortIndex;
use dashmap::DashMap;
use meshbridge_types::MacAddress;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, trace};

/// Tracker operation counters (relaxed; approximate).
#[derive(Debug, Default)]
pub struct McastStats {
    pub joins: AtomicU64,
    pub leaves: AtomicU64,
    pub members_aged: AtomicU64,
    pub groups_reclaimed: AtomicU64,
    pub capacity_drops: AtomicU64,
}

/// Group MAC → per-port member index, with independent member aging.
#[derive(Debug)]
pub struct MulticastTracker {
    groups: DashMap<MacAddress, GroupEntry>,
    capacity: usize,
    ageing_time: Duration,
    stats: McastStats,
}

impl MulticastTracker {
    /// Creates a tracker with the given group cap and membership ageing
    /// time.
    pub fn new(capacity: usize, ageing_time: Duration) -> Self {
        Self {
            groups: DashMap::new(),
            capacity,
            ageing_time,
            stats: McastStats::default(),
        }
    }

    /// Applies a membership report: adds or removes `member` from `group`'s
    /// list on `port`. The group entry is created lazily on first join.
    pub fn handle_membership_report(
        &self,
        port: PortIndex,
        group: MacAddress,
        member: MacAddress,
        join: bool,
        now: Instant,
    ) -> BridgeResult<()> {
        if !group.is_multicast() || group.is_broadcast() {
            return Err(BridgeError::InvalidArgument(format!(
                "{} is not a multicast group address",
                group
            )));
        }

        if join {
            if !self.groups.contains_key(&group) && self.groups.len() >= self.capacity {
                self.stats.capacity_drops.fetch_add(1, Ordering::Relaxed);
                return Err(BridgeError::ResourceExhausted(format!(
                    "multicast table full ({} groups), cannot track {}",
                    self.capacity, group
                )));
            }
            trace!(%group, %member, port = port.0, "membership join");
            self.stats.joins.fetch_add(1, Ordering::Relaxed);
            let mut entry = self.groups.entry(group).or_default();
            entry.ports.entry(port).or_default().insert(
                member,
                MemberInfo {
                    last_seen: now,
                    direct: None,
                },
            );
        } else {
            self.stats.leaves.fetch_add(1, Ordering::Relaxed);
            let mut reclaim = false;
            if let Some(mut entry) = self.groups.get_mut(&group) {
                if let Some(members) = entry.ports.get_mut(&port) {
                    members.remove(&member);
                    if members.is_empty() {
                        entry.ports.remove(&port);
                    }
                }
                reclaim = entry.is_empty();
            }
            if reclaim {
                self.groups.remove(&group);
                self.stats.groups_reclaimed.fetch_add(1, Ordering::Relaxed);
            }
        }
        Ok(())
    }

    /// Records a direct one-hop port toward `member` of `group`.
    pub fn record_direct(&self, group: MacAddress, member: MacAddress, direct: PortIndex) {
        if let Some(mut entry) = self.groups.get_mut(&group) {
            for members in entry.ports.values_mut() {
                if let Some(info) = members.get_mut(&member) {
                    info.direct = Some(direct);
                }
            }
        }
    }

    /// Returns an owned snapshot of `group`'s membership, or `None` when
    /// the group is untracked (caller floods instead).
    pub fn lookup(&self, group: MacAddress) -> Option<GroupSnapshot> {
        self.groups.get(&group).map(|entry| GroupSnapshot {
            group,
            ports: entry
                .ports
                .iter()
                .map(|(port, members)| PortMembership {
                    port: *port,
                    members: members
                        .iter()
                        .map(|(mac, info)| (*mac, info.direct))
                        .collect(),
                })
                .collect(),
        })
    }

    /// Refresh hook fed on every frame: a member transmitting to its group
    /// counts as continued membership on the arrival port.
    pub fn snoop(&self, port: PortIndex, src: MacAddress, dst: MacAddress, now: Instant) {
        if !dst.is_multicast() || dst.is_broadcast() || src.is_multicast() {
            return;
        }
        if let Some(mut entry) = self.groups.get_mut(&dst) {
            if let Some(members) = entry.ports.get_mut(&port) {
                if let Some(info) = members.get_mut(&src) {
                    info.last_seen = now;
                }
            }
        }
    }

    /// Removes `port` from every group's port list; reclaims groups left
    /// empty. Called on port detach.
    pub fn delete_by_port(&self, port: PortIndex) {
        self.groups.retain(|_, entry| {
            entry.ports.remove(&port);
            for members in entry.ports.values_mut() {
                for info in members.values_mut() {
                    if info.direct == Some(port) {
                        info.direct = None;
                    }
                }
            }
            !entry.is_empty()
        });
    }

    /// Drops members that have not refreshed within the ageing time and
    /// reclaims emptied groups. Returns the number of members removed.
    pub fn age_sweep(&self, now: Instant) -> usize {
        let mut removed = 0;
        self.groups.retain(|group, entry| {
            entry.ports.retain(|_, members| {
                let before = members.len();
                members.retain(|_, info| {
                    now.saturating_duration_since(info.last_seen) <= self.ageing_time
                });
                removed += before - members.len();
                !members.is_empty()
            });
            let keep = !entry.is_empty();
            if !keep {
                debug!(%group, "multicast group reclaimed");
                self.stats.groups_reclaimed.fetch_add(1, Ordering::Relaxed);
            }
            keep
        });
        if removed > 0 {
            self.stats
                .members_aged
                .fetch_add(removed as u64, Ordering::Relaxed);
        }
        removed
    }

    /// Drops all tracked state. Used when the spanning tree is disabled.
    pub fn flush(&self) {
        self.groups.clear();
    }

    /// Serializable dump of all group memberships.
    pub fn dump(&self) -> Vec<GroupDumpEntry> {
        let mut rows: Vec<GroupDumpEntry> = self
            .groups
            .iter()
            .flat_map(|entry| {
                let group = *entry.key();
                entry
                    .ports
                    .iter()
                    .map(|(port, members)| {
                        let mut macs: Vec<MacAddress> = members.keys().copied().collect();
                        macs.sort_unstable();
                        GroupDumpEntry {
                            group,
                            port: port.0,
                            members: macs,
                        }
                    })
                    .collect::<Vec<_>>()
            })
            .collect();
        rows.sort_by_key(|r| (r.group, r.port));
        rows
    }

    /// Number of tracked groups.
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    /// Returns true when no group is tracked.
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Operation counters.
    pub fn stats(&self) -> &McastStats {
        &self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn mac(s: &str) -> MacAddress {
        s.parse().unwrap()
    }

    fn tracker() -> MulticastTracker {
        MulticastTracker::new(16, Duration::from_secs(260))
    }

    const GROUP: &str = "01:00:5e:00:00:fb";

    #[test]
    fn test_join_creates_group_lazily() {
        let t = tracker();
        assert!(t.is_empty());
        t.handle_membership_report(
            PortIndex(2),
            mac(GROUP),
            mac("00:11:22:33:44:55"),
            true,
            Instant::now(),
        )
        .unwrap();
        assert_eq!(t.len(), 1);

        let snap = t.lookup(mac(GROUP)).unwrap();
        assert_eq!(snap.ports.len(), 1);
        assert_eq!(snap.ports[0].port, PortIndex(2));
        assert_eq!(snap.ports[0].members, vec![(mac("00:11:22:33:44:55"), None)]);
    }

    #[test]
    fn test_join_rejects_unicast_group() {
        let t = tracker();
        let err = t.handle_membership_report(
            PortIndex(1),
            mac("00:11:22:33:44:55"),
            mac("00:11:22:33:44:56"),
            true,
            Instant::now(),
        );
        assert!(matches!(err, Err(BridgeError::InvalidArgument(_))));
    }

    #[test]
    fn test_leave_reclaims_empty_group() {
        let t = tracker();
        let now = Instant::now();
        let member = mac("00:11:22:33:44:55");
        t.handle_membership_report(PortIndex(2), mac(GROUP), member, true, now)
            .unwrap();
        t.handle_membership_report(PortIndex(2), mac(GROUP), member, false, now)
            .unwrap();
        assert!(t.lookup(mac(GROUP)).is_none());
        assert!(t.is_empty());
    }

    #[test]
    fn test_members_tracked_per_port() {
        let t = tracker();
        let now = Instant::now();
        t.handle_membership_report(PortIndex(2), mac(GROUP), mac("00:00:00:00:00:01"), true, now)
            .unwrap();
        t.handle_membership_report(PortIndex(2), mac(GROUP), mac("00:00:00:00:00:02"), true, now)
            .unwrap();
        t.handle_membership_report(PortIndex(3), mac(GROUP), mac("00:00:00:00:00:03"), true, now)
            .unwrap();

        let snap = t.lookup(mac(GROUP)).unwrap();
        let total: usize = snap.ports.iter().map(|p| p.members.len()).sum();
        assert_eq!(total, 3);
        assert_eq!(snap.ports.len(), 2);
    }

    #[test]
    fn test_snoop_refreshes_membership() {
        let t = MulticastTracker::new(16, Duration::from_secs(100));
        let t0 = Instant::now();
        let member = mac("00:11:22:33:44:55");
        t.handle_membership_report(PortIndex(2), mac(GROUP), member, true, t0)
            .unwrap();

        // Member keeps sending to the group; membership must not age.
        t.snoop(PortIndex(2), member, mac(GROUP), t0 + Duration::from_secs(90));
        let removed = t.age_sweep(t0 + Duration::from_secs(150));
        assert_eq!(removed, 0);
        assert!(t.lookup(mac(GROUP)).is_some());
    }

    #[test]
    fn test_age_sweep_drops_stale_members_and_reclaims() {
        let t = MulticastTracker::new(16, Duration::from_secs(100));
        let t0 = Instant::now();
        t.handle_membership_report(PortIndex(2), mac(GROUP), mac("00:00:00:00:00:01"), true, t0)
            .unwrap();

        let removed = t.age_sweep(t0 + Duration::from_secs(101));
        assert_eq!(removed, 1);
        assert!(t.is_empty());
    }

    #[test]
    fn test_age_sweep_idempotent_for_same_timestamp() {
        let t = MulticastTracker::new(16, Duration::from_secs(100));
        let t0 = Instant::now();
        t.handle_membership_report(PortIndex(2), mac(GROUP), mac("00:00:00:00:00:01"), true, t0)
            .unwrap();

        let at = t0 + Duration::from_secs(101);
        assert_eq!(t.age_sweep(at), 1);
        assert_eq!(t.age_sweep(at), 0);
    }

    #[test]
    fn test_delete_by_port() {
        let t = tracker();
        let now = Instant::now();
        t.handle_membership_report(PortIndex(2), mac(GROUP), mac("00:00:00:00:00:01"), true, now)
            .unwrap();
        t.handle_membership_report(PortIndex(3), mac(GROUP), mac("00:00:00:00:00:02"), true, now)
            .unwrap();

        t.delete_by_port(PortIndex(2));
        let snap = t.lookup(mac(GROUP)).unwrap();
        assert_eq!(snap.ports.len(), 1);
        assert_eq!(snap.ports[0].port, PortIndex(3));

        t.delete_by_port(PortIndex(3));
        assert!(t.is_empty());
    }

    #[test]
    fn test_record_direct_member_port() {
        let t = tracker();
        let now = Instant::now();
        let member = mac("00:11:22:33:44:55");
        t.handle_membership_report(PortIndex(2), mac(GROUP), member, true, now)
            .unwrap();
        t.record_direct(mac(GROUP), member, PortIndex(4));

        let snap = t.lookup(mac(GROUP)).unwrap();
        assert_eq!(snap.ports[0].members, vec![(member, Some(PortIndex(4)))]);
    }

    #[test]
    fn test_flush_clears_everything() {
        let t = tracker();
        let now = Instant::now();
        t.handle_membership_report(PortIndex(2), mac(GROUP), mac("00:00:00:00:00:01"), true, now)
            .unwrap();
        t.flush();
        assert!(t.is_empty());
    }

    #[test]
    fn test_group_capacity_exhaustion() {
        let t = MulticastTracker::new(1, Duration::from_secs(260));
        let now = Instant::now();
        t.handle_membership_report(
            PortIndex(1),
            mac("01:00:5e:00:00:01"),
            mac("00:00:00:00:00:01"),
            true,
            now,
        )
        .unwrap();

        let err = t.handle_membership_report(
            PortIndex(1),
            mac("01:00:5e:00:00:02"),
            mac("00:00:00:00:00:02"),
            true,
            now,
        );
        assert!(matches!(err, Err(BridgeError::ResourceExhausted(_))));
        // Existing group still joinable.
        t.handle_membership_report(
            PortIndex(2),
            mac("01:00:5e:00:00:01"),
            mac("00:00:00:00:00:03"),
            true,
            now,
        )
        .unwrap();
    }
}
