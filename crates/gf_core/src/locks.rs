//! Eligibility evaluation: per-player, per-activity lock reasons.
//!
//! Checks run in a fixed order and the first failure wins, producing at most
//! one lock reason per activity. Activities with no failing check are simply
//! omitted from the result.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::catalog::{ActivityKind, Catalog};
use crate::ids::{ActivityId, PlayerId, QuestId};
use crate::profile::{Faction, PlayerProfile};

/// Why an activity is closed to a player.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LockReason {
    /// Matchmaking ban or missing permission.
    NotPermitted,
    ExpansionTooLow,
    ContentDisabled,
    /// An unexpired hold on this instance and difficulty.
    InstanceOnHold,
    OutOfSeason,
    GearTooLow { required: u32 },
    /// Achievement/quest/item gate not met.
    MissingAccess,
    TooLowLevel { required: u32 },
    TooHighLevel { allowed: u32 },
}

pub type LockMap = BTreeMap<ActivityId, LockReason>;
pub type MemberLockMap = BTreeMap<PlayerId, LockMap>;

/// Evaluate every candidate activity for one player. Unknown activities are
/// treated as permanently closed.
pub fn get_locks(
    profile: &PlayerProfile,
    catalog: &Catalog,
    activities: &[ActivityId],
    now_ms: u64,
) -> LockMap {
    let mut locks = LockMap::new();
    for &activity in activities {
        if let Some(reason) = lock_for(profile, catalog, activity, now_ms) {
            locks.insert(activity, reason);
        }
    }
    locks
}

fn lock_for(
    profile: &PlayerProfile,
    catalog: &Catalog,
    activity: ActivityId,
    now_ms: u64,
) -> Option<LockReason> {
    let Some(def) = catalog.activity(activity) else {
        return Some(LockReason::ContentDisabled);
    };

    if profile.banned {
        return Some(LockReason::NotPermitted);
    }
    if def.expansion > profile.expansion {
        return Some(LockReason::ExpansionTooLow);
    }
    if catalog.is_disabled(activity) {
        return Some(LockReason::ContentDisabled);
    }
    if profile.hold_for(def.map, def.difficulty, now_ms).is_some() {
        return Some(LockReason::InstanceOnHold);
    }
    if def.kind == ActivityKind::Seasonal && !catalog.seasonal_open() {
        return Some(LockReason::OutOfSeason);
    }
    if profile.item_level < def.min_item_level {
        return Some(LockReason::GearTooLow { required: def.min_item_level });
    }
    if let Some(req) = catalog.access_requirement(def.map, def.difficulty) {
        if !access_met(profile, req.achievement, req.item, req.quest_azure, req.quest_crimson) {
            return Some(LockReason::MissingAccess);
        }
    }
    if profile.level < def.min_level {
        return Some(LockReason::TooLowLevel { required: def.min_level });
    }
    if profile.level > def.max_level {
        return Some(LockReason::TooHighLevel { allowed: def.max_level });
    }
    None
}

fn access_met(
    profile: &PlayerProfile,
    achievement: Option<u32>,
    item: Option<u32>,
    quest_azure: Option<QuestId>,
    quest_crimson: Option<QuestId>,
) -> bool {
    if let Some(achievement) = achievement {
        if !profile.achievements.contains(&achievement) {
            return false;
        }
    }
    if let Some(item) = item {
        if !profile.items.contains(&item) {
            return false;
        }
    }
    let quest = match profile.faction {
        Faction::Azure => quest_azure,
        Faction::Crimson => quest_crimson,
    };
    if let Some(quest) = quest {
        if !profile.has_completed(quest) {
            return false;
        }
    }
    true
}

/// Intersect per-member eligibility against a candidate set.
///
/// An activity is dropped when any member holds a lock for it, except that a
/// continuing party may pass through its own instance hold on exactly that
/// activity. An empty survivor set fails the join and hands back the full
/// per-member lock map for display; otherwise the caller sees no locks at
/// all.
pub fn get_compatible_activities(
    candidates: &[ActivityId],
    profiles: &[&PlayerProfile],
    is_continuing: bool,
    catalog: &Catalog,
    now_ms: u64,
) -> std::result::Result<Vec<ActivityId>, MemberLockMap> {
    let member_locks: MemberLockMap = profiles
        .iter()
        .map(|p| (p.id, get_locks(p, catalog, candidates, now_ms)))
        .collect();

    let compatible: Vec<ActivityId> = candidates
        .iter()
        .copied()
        .filter(|activity| {
            member_locks.values().all(|locks| match locks.get(activity) {
                None => true,
                Some(LockReason::InstanceOnHold) => is_continuing,
                Some(_) => false,
            })
        })
        .collect();

    if compatible.is_empty() {
        Err(member_locks)
    } else {
        Ok(compatible)
    }
}
