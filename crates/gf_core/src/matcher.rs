//! Group formation: role-compatibility search and the per-tick partition
//! scan.
//!
//! The search decides whether a set of members, each holding one or more
//! eligible roles, can fill an activity's quota exactly. Ambiguous members
//! are resolved by recursive case-splitting with value semantics: each
//! branch works on its own copy, so failed branches leave nothing to undo.
//! Any valid assignment is accepted; search order breaks ties.

use std::collections::{BTreeMap, HashSet};

use crate::catalog::{Catalog, RoleQuota};
use crate::ids::{ActivityId, PlayerId, Queuer};
use crate::queue::{QueueEntry, QueuePartition};
use crate::roles::Roles;

/// A fully role-assigned set of queue entries ready to become a proposal.
#[derive(Debug, Clone)]
pub struct MatchedGroup {
    /// The activity the group was assembled for.
    pub activity: ActivityId,
    /// Candidate set every picked entry agrees on (always contains
    /// `activity`).
    pub candidates: Vec<ActivityId>,
    pub entries: Vec<QueueEntry>,
    /// Exactly one combat role per member.
    pub assignment: BTreeMap<PlayerId, Roles>,
}

#[derive(Debug, Clone, Copy, Default)]
struct RoleCounts {
    tanks: u8,
    healers: u8,
    damage: u8,
}

impl RoleCounts {
    fn bump(mut self, role: Roles) -> Self {
        if role == Roles::TANK {
            self.tanks += 1;
        } else if role == Roles::HEALER {
            self.healers += 1;
        } else {
            self.damage += 1;
        }
        self
    }

    fn within(&self, quota: RoleQuota) -> bool {
        self.tanks <= quota.tanks && self.healers <= quota.healers && self.damage <= quota.damage
    }
}

/// Find a perfect assignment filling the quota exactly: every member gets
/// one combat role, no role over quota, nothing left unfilled. Returns
/// `None` when member count differs from the quota total or no branch
/// closes.
pub fn assign_roles(
    quota: RoleQuota,
    members: &BTreeMap<PlayerId, Roles>,
) -> Option<BTreeMap<PlayerId, Roles>> {
    if members.len() != quota.total() as usize {
        return None;
    }
    let pending: Vec<(PlayerId, Roles)> = members.iter().map(|(p, r)| (*p, *r)).collect();
    solve(quota, &pending, RoleCounts::default(), Vec::new())
        .map(|fixed| fixed.into_iter().collect())
}

/// Check whether a partial set could still grow into a full group: each
/// member can take one of its roles without any role exceeding quota.
pub fn roles_compatible(quota: RoleQuota, members: &BTreeMap<PlayerId, Roles>) -> bool {
    if members.len() > quota.total() as usize {
        return false;
    }
    let pending: Vec<(PlayerId, Roles)> = members.iter().map(|(p, r)| (*p, *r)).collect();
    solve(quota, &pending, RoleCounts::default(), Vec::new()).is_some()
}

fn solve(
    quota: RoleQuota,
    pending: &[(PlayerId, Roles)],
    counts: RoleCounts,
    fixed: Vec<(PlayerId, Roles)>,
) -> Option<Vec<(PlayerId, Roles)>> {
    let Some(((player, roles), rest)) = pending.split_first() else {
        return Some(fixed);
    };
    for role in roles.iter_combat() {
        let next = counts.bump(role);
        if !next.within(quota) {
            continue;
        }
        let mut taken = fixed.clone();
        taken.push((*player, role));
        if let Some(solution) = solve(quota, rest, next, taken) {
            return Some(solution);
        }
    }
    None
}

/// Scan a partition for new groups. `claimed` holds queuers already bound
/// to an open proposal; they are skipped, and queuers picked here are added
/// so one tick never double-books an entry.
pub fn find_groups(
    partition: &QueuePartition,
    catalog: &Catalog,
    claimed: &mut HashSet<Queuer>,
) -> Vec<MatchedGroup> {
    let entries = partition.entries();
    let mut groups = Vec::new();

    for (i, anchor) in entries.iter().enumerate() {
        if claimed.contains(&anchor.queuer) {
            continue;
        }
        'activities: for &activity in &anchor.activities {
            let Some(def) = catalog.activity(activity) else {
                continue;
            };
            let needed = def.quota.total() as usize;
            if anchor.member_count() > needed {
                continue;
            }

            let mut combined = anchor.roles.clone();
            if !roles_compatible(def.quota, &combined) {
                continue;
            }
            let mut picked: Vec<&QueueEntry> = vec![anchor];

            // Extend with later entries that share the activity and keep the
            // combination solvable. Pure search order, no scoring.
            if combined.len() < needed {
                for other in entries.iter().skip(i + 1) {
                    if claimed.contains(&other.queuer)
                        || !other.activities.contains(&activity)
                        || combined.len() + other.member_count() > needed
                    {
                        continue;
                    }
                    let mut trial = combined.clone();
                    trial.extend(other.roles.iter().map(|(p, r)| (*p, *r)));
                    if roles_compatible(def.quota, &trial) {
                        combined = trial;
                        picked.push(other);
                        if combined.len() == needed {
                            break;
                        }
                    }
                }
            }

            if combined.len() != needed {
                continue;
            }
            let Some(assignment) = assign_roles(def.quota, &combined) else {
                continue 'activities;
            };

            let candidates: Vec<ActivityId> = anchor
                .activities
                .iter()
                .copied()
                .filter(|a| picked.iter().all(|e| e.activities.contains(a)))
                .filter(|a| catalog.activity(*a).map(|d| d.quota == def.quota).unwrap_or(false))
                .collect();

            claimed.extend(picked.iter().map(|e| e.queuer));
            groups.push(MatchedGroup {
                activity,
                candidates,
                entries: picked.into_iter().cloned().collect(),
                assignment,
            });
            break 'activities;
        }
    }

    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{ActivityDefinition, ActivityKind, Difficulty, EntryPoint};
    use crate::ids::{MapId, PartitionId};

    fn quota() -> RoleQuota {
        RoleQuota::DUNGEON
    }

    fn member_map(specs: &[(u64, Roles)]) -> BTreeMap<PlayerId, Roles> {
        specs.iter().map(|(id, r)| (PlayerId(*id), *r)).collect()
    }

    fn dungeon_def(id: u32) -> ActivityDefinition {
        ActivityDefinition {
            id: ActivityId(id),
            name: format!("Dungeon {}", id),
            map: MapId(id),
            difficulty: Difficulty::Normal,
            kind: ActivityKind::Dungeon,
            quota: quota(),
            min_level: 1,
            max_level: 60,
            expansion: 0,
            min_item_level: 0,
            entry: EntryPoint { map: MapId(id), x: 0.0, y: 0.0, z: 0.0 },
            final_encounter: 1,
        }
    }

    fn solo_entry(id: u64, joined_at: u64, roles: Roles, activities: &[u32]) -> QueueEntry {
        QueueEntry {
            queuer: Queuer::Player(PlayerId(id)),
            joined_at_ms: joined_at,
            activities: activities.iter().map(|a| ActivityId(*a)).collect(),
            roles: member_map(&[(id, roles)]),
        }
    }

    #[test]
    fn test_assign_exact_fill() {
        let members = member_map(&[
            (1, Roles::TANK),
            (2, Roles::HEALER),
            (3, Roles::DAMAGE),
            (4, Roles::DAMAGE),
            (5, Roles::DAMAGE),
        ]);
        let assignment = assign_roles(quota(), &members).unwrap();
        assert_eq!(assignment[&PlayerId(1)], Roles::TANK);
        assert_eq!(assignment[&PlayerId(2)], Roles::HEALER);
        assert!(assignment.values().all(|r| r.is_single()));
    }

    #[test]
    fn test_assign_resolves_hybrid() {
        // Player 1 must flex to healer even though tank appears first in
        // its bitset, because player 2 can only tank.
        let members = member_map(&[
            (1, Roles::TANK.with(Roles::HEALER)),
            (2, Roles::TANK),
            (3, Roles::DAMAGE),
            (4, Roles::DAMAGE),
            (5, Roles::DAMAGE),
        ]);
        let assignment = assign_roles(quota(), &members).unwrap();
        assert_eq!(assignment[&PlayerId(1)], Roles::HEALER);
        assert_eq!(assignment[&PlayerId(2)], Roles::TANK);
    }

    #[test]
    fn test_assign_rejects_two_pure_tanks() {
        let members = member_map(&[
            (1, Roles::TANK),
            (2, Roles::TANK),
            (3, Roles::DAMAGE),
            (4, Roles::DAMAGE),
            (5, Roles::DAMAGE),
        ]);
        assert!(assign_roles(quota(), &members).is_none());
    }

    #[test]
    fn test_search_leaves_inputs_untouched() {
        let members = member_map(&[(1, Roles::TANK.with(Roles::DAMAGE)), (2, Roles::TANK)]);
        let before = members.clone();
        let _ = roles_compatible(quota(), &members);
        let _ = assign_roles(quota(), &members);
        assert_eq!(members, before);
    }

    #[test]
    fn test_partial_compatibility() {
        // Two damage and a tank can still grow into a full group...
        let some = member_map(&[(1, Roles::TANK), (2, Roles::DAMAGE), (3, Roles::DAMAGE)]);
        assert!(roles_compatible(quota(), &some));
        // ...four pure damage cannot.
        let too_many = member_map(&[
            (1, Roles::DAMAGE),
            (2, Roles::DAMAGE),
            (3, Roles::DAMAGE),
            (4, Roles::DAMAGE),
        ]);
        assert!(!roles_compatible(quota(), &too_many));
    }

    #[test]
    fn test_find_groups_five_solos() {
        let mut catalog = Catalog::new();
        catalog.add_activity(dungeon_def(1));

        let mut partition = QueuePartition::new(PartitionId(0));
        partition.add(solo_entry(1, 10, Roles::TANK, &[1]));
        partition.add(solo_entry(2, 20, Roles::HEALER, &[1]));
        partition.add(solo_entry(3, 30, Roles::DAMAGE, &[1]));
        partition.add(solo_entry(4, 40, Roles::DAMAGE, &[1]));
        partition.add(solo_entry(5, 50, Roles::DAMAGE, &[1]));

        let mut claimed = HashSet::new();
        let groups = find_groups(&partition, &catalog, &mut claimed);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].entries.len(), 5);
        assert_eq!(groups[0].assignment.len(), 5);
        assert_eq!(claimed.len(), 5);
    }

    #[test]
    fn test_find_groups_skips_claimed() {
        let mut catalog = Catalog::new();
        catalog.add_activity(dungeon_def(1));

        let mut partition = QueuePartition::new(PartitionId(0));
        partition.add(solo_entry(1, 10, Roles::TANK, &[1]));
        partition.add(solo_entry(2, 20, Roles::HEALER, &[1]));
        partition.add(solo_entry(3, 30, Roles::DAMAGE, &[1]));
        partition.add(solo_entry(4, 40, Roles::DAMAGE, &[1]));
        partition.add(solo_entry(5, 50, Roles::DAMAGE, &[1]));

        let mut claimed = HashSet::new();
        claimed.insert(Queuer::Player(PlayerId(1)));
        // The only tank is spoken for; nothing can form.
        let groups = find_groups(&partition, &catalog, &mut claimed);
        assert!(groups.is_empty());
    }

    #[test]
    fn test_find_groups_candidate_intersection() {
        let mut catalog = Catalog::new();
        catalog.add_activity(dungeon_def(1));
        catalog.add_activity(dungeon_def(2));

        let mut partition = QueuePartition::new(PartitionId(0));
        partition.add(solo_entry(1, 10, Roles::TANK, &[1, 2]));
        partition.add(solo_entry(2, 20, Roles::HEALER, &[1, 2]));
        partition.add(solo_entry(3, 30, Roles::DAMAGE, &[1, 2]));
        partition.add(solo_entry(4, 40, Roles::DAMAGE, &[1]));
        partition.add(solo_entry(5, 50, Roles::DAMAGE, &[1, 2]));

        let mut claimed = HashSet::new();
        let groups = find_groups(&partition, &catalog, &mut claimed);
        assert_eq!(groups.len(), 1);
        // Player 4 only queued for dungeon 1, so 2 drops out of the shared
        // candidate set.
        assert_eq!(groups[0].candidates, vec![ActivityId(1)]);
    }

    #[cfg(all(test, feature = "proptest"))]
    mod proptests {
        use super::*;
        use proptest::prelude::*;

        fn role_bits() -> impl Strategy<Value = Roles> {
            (1u8..8u8).prop_map(|bits| Roles(bits << 1))
        }

        proptest! {
            /// Property: planting a known-valid assignment and widening each
            /// member's bitset never makes the search fail.
            #[test]
            fn prop_solvable_is_found(extra in proptest::collection::vec(role_bits(), 5)) {
                let base = [Roles::TANK, Roles::HEALER, Roles::DAMAGE, Roles::DAMAGE, Roles::DAMAGE];
                let members: BTreeMap<PlayerId, Roles> = base
                    .iter()
                    .zip(extra.iter())
                    .enumerate()
                    .map(|(i, (b, e))| (PlayerId(i as u64 + 1), b.with(*e)))
                    .collect();
                let assignment = assign_roles(RoleQuota::DUNGEON, &members);
                prop_assert!(assignment.is_some());
                let assignment = assignment.unwrap();
                let tanks = assignment.values().filter(|r| **r == Roles::TANK).count();
                let healers = assignment.values().filter(|r| **r == Roles::HEALER).count();
                let damage = assignment.values().filter(|r| **r == Roles::DAMAGE).count();
                prop_assert_eq!((tanks, healers, damage), (1, 1, 3));
            }

            /// Property: the search never mutates its input map.
            #[test]
            fn prop_search_is_pure(bits in proptest::collection::vec(role_bits(), 1..6)) {
                let members: BTreeMap<PlayerId, Roles> = bits
                    .iter()
                    .enumerate()
                    .map(|(i, r)| (PlayerId(i as u64 + 1), *r))
                    .collect();
                let before = members.clone();
                let _ = assign_roles(RoleQuota::DUNGEON, &members);
                let _ = roles_compatible(RoleQuota::DUNGEON, &members);
                prop_assert_eq!(members, before);
            }
        }
    }
}
