//! Queue partitions: pools of pending solo and party entries, plus rolling
//! wait-time statistics per role and per activity.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use crate::ids::{ActivityId, PartitionId, PlayerId, Queuer};
use crate::roles::Roles;

/// The unit inserted into a partition: one solo ticket or one whole party.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueEntry {
    pub queuer: Queuer,
    pub joined_at_ms: u64,
    /// Candidate activities this entry is willing to enter.
    pub activities: Vec<ActivityId>,
    /// Confirmed role sets per member.
    pub roles: BTreeMap<PlayerId, Roles>,
}

impl QueueEntry {
    pub fn member_count(&self) -> usize {
        self.roles.len()
    }

    pub fn members(&self) -> impl Iterator<Item = PlayerId> + '_ {
        self.roles.keys().copied()
    }

    pub fn contains_member(&self, player: PlayerId) -> bool {
        self.roles.contains_key(&player)
    }
}

/// Rolling average without sample history.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollingAverage {
    total_ms: u64,
    samples: u32,
}

impl RollingAverage {
    pub fn add_sample(&mut self, sample_ms: u64) {
        self.total_ms += sample_ms;
        self.samples += 1;
    }

    pub fn average_ms(&self) -> Option<u64> {
        if self.samples == 0 {
            None
        } else {
            Some(self.total_ms / self.samples as u64)
        }
    }

    pub fn samples(&self) -> u32 {
        self.samples
    }
}

/// Snapshot of the per-role averages, handed to clients in queue-status
/// notifications.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaitSummary {
    pub tank_ms: Option<u64>,
    pub healer_ms: Option<u64>,
    pub damage_ms: Option<u64>,
    pub other_ms: Option<u64>,
}

/// Wait-time bookkeeping for one partition.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WaitTimes {
    tank: RollingAverage,
    healer: RollingAverage,
    damage: RollingAverage,
    /// Multi-role members and anything else that defies a single bucket.
    other: RollingAverage,
    per_activity: HashMap<ActivityId, RollingAverage>,
}

impl WaitTimes {
    /// Attribute one wait sample to the member's confirmed role. Members
    /// holding more than one combat role land in the "other" bucket.
    pub fn record(&mut self, roles: Roles, activity: ActivityId, sample_ms: u64) {
        if roles.is_single() {
            if roles.contains(Roles::TANK) {
                self.tank.add_sample(sample_ms);
            } else if roles.contains(Roles::HEALER) {
                self.healer.add_sample(sample_ms);
            } else {
                self.damage.add_sample(sample_ms);
            }
        } else {
            self.other.add_sample(sample_ms);
        }
        self.per_activity.entry(activity).or_default().add_sample(sample_ms);
    }

    pub fn summary(&self) -> WaitSummary {
        WaitSummary {
            tank_ms: self.tank.average_ms(),
            healer_ms: self.healer.average_ms(),
            damage_ms: self.damage.average_ms(),
            other_ms: self.other.average_ms(),
        }
    }

    pub fn activity_average_ms(&self, activity: ActivityId) -> Option<u64> {
        self.per_activity.get(&activity).and_then(RollingAverage::average_ms)
    }
}

/// A named pool of pending entries, scanned once per tick by the matcher.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueuePartition {
    pub id: PartitionId,
    entries: Vec<QueueEntry>,
    pub wait: WaitTimes,
    /// Engine time the last queue-status batch went out.
    pub last_status_at_ms: u64,
}

impl QueuePartition {
    pub fn new(id: PartitionId) -> Self {
        Self { id, entries: Vec::new(), wait: WaitTimes::default(), last_status_at_ms: 0 }
    }

    /// Insert an entry keeping the pool ordered by join time. Re-enqueued
    /// entries keep their original timestamp and therefore their place.
    pub fn add(&mut self, entry: QueueEntry) {
        self.remove(entry.queuer);
        let at = self
            .entries
            .iter()
            .position(|e| e.joined_at_ms > entry.joined_at_ms)
            .unwrap_or(self.entries.len());
        self.entries.insert(at, entry);
    }

    pub fn remove(&mut self, queuer: Queuer) -> Option<QueueEntry> {
        let at = self.entries.iter().position(|e| e.queuer == queuer)?;
        Some(self.entries.remove(at))
    }

    pub fn contains(&self, queuer: Queuer) -> bool {
        self.entries.iter().any(|e| e.queuer == queuer)
    }

    pub fn entry(&self, queuer: Queuer) -> Option<&QueueEntry> {
        self.entries.iter().find(|e| e.queuer == queuer)
    }

    /// Entry currently holding the given player, solo or via party.
    pub fn entry_with_member(&self, player: PlayerId) -> Option<&QueueEntry> {
        self.entries.iter().find(|e| e.contains_member(player))
    }

    pub fn entries(&self) -> &[QueueEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_entry(queuer: Queuer, joined_at_ms: u64, player: u64, roles: Roles) -> QueueEntry {
        let mut map = BTreeMap::new();
        map.insert(PlayerId(player), roles);
        QueueEntry { queuer, joined_at_ms, activities: vec![ActivityId(1)], roles: map }
    }

    #[test]
    fn test_requeue_keeps_join_order() {
        let mut partition = QueuePartition::new(PartitionId(0));
        partition.add(make_entry(Queuer::Player(PlayerId(1)), 100, 1, Roles::TANK));
        partition.add(make_entry(Queuer::Player(PlayerId(2)), 200, 2, Roles::HEALER));
        partition.add(make_entry(Queuer::Player(PlayerId(3)), 300, 3, Roles::DAMAGE));

        // Middle entry leaves for a proposal that then falls apart; it comes
        // back with its original timestamp and regains its slot.
        let entry = partition.remove(Queuer::Player(PlayerId(2))).unwrap();
        partition.add(entry);

        let order: Vec<Queuer> = partition.entries().iter().map(|e| e.queuer).collect();
        assert_eq!(
            order,
            vec![
                Queuer::Player(PlayerId(1)),
                Queuer::Player(PlayerId(2)),
                Queuer::Player(PlayerId(3)),
            ]
        );
    }

    #[test]
    fn test_add_replaces_same_queuer() {
        let mut partition = QueuePartition::new(PartitionId(0));
        partition.add(make_entry(Queuer::Player(PlayerId(1)), 100, 1, Roles::TANK));
        partition.add(make_entry(Queuer::Player(PlayerId(1)), 150, 1, Roles::HEALER));
        assert_eq!(partition.len(), 1);
        assert_eq!(partition.entries()[0].joined_at_ms, 150);
    }

    #[test]
    fn test_wait_time_role_attribution() {
        let mut wait = WaitTimes::default();
        wait.record(Roles::TANK, ActivityId(1), 1_000);
        wait.record(Roles::TANK, ActivityId(1), 3_000);
        wait.record(Roles::HEALER.with(Roles::DAMAGE), ActivityId(1), 9_000);

        let summary = wait.summary();
        assert_eq!(summary.tank_ms, Some(2_000));
        assert_eq!(summary.healer_ms, None);
        assert_eq!(summary.other_ms, Some(9_000));
        assert_eq!(wait.activity_average_ms(ActivityId(1)), Some(4_333));
    }
}
