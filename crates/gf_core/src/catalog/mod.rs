//! Read-only activity catalog.
//!
//! The catalog maps activity identifiers to their requirements and metadata.
//! It is built once at load time from static data and never mutated by the
//! engine; the engine receives it as an injected dependency.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

use crate::ids::{ActivityId, MapId, QuestId};

/// Instance difficulty tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Difficulty {
    Normal,
    Heroic,
}

/// Activity classification. Random selectors expand to a concrete set of
/// dungeons at join time; seasonal selectors additionally require the season
/// to be open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActivityKind {
    Dungeon,
    Raid,
    RandomDungeon,
    Seasonal,
}

impl ActivityKind {
    pub fn is_selector(self) -> bool {
        matches!(self, ActivityKind::RandomDungeon | ActivityKind::Seasonal)
    }
}

/// Required role counts for a full group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleQuota {
    pub tanks: u8,
    pub healers: u8,
    pub damage: u8,
}

impl RoleQuota {
    pub const DUNGEON: RoleQuota = RoleQuota { tanks: 1, healers: 1, damage: 3 };

    pub fn total(self) -> u8 {
        self.tanks + self.healers + self.damage
    }
}

/// Where a formed party is teleported to.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EntryPoint {
    pub map: MapId,
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

/// One catalog row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityDefinition {
    pub id: ActivityId,
    pub name: String,
    pub map: MapId,
    pub difficulty: Difficulty,
    pub kind: ActivityKind,
    pub quota: RoleQuota,
    pub min_level: u32,
    pub max_level: u32,
    /// Expansion index the account must own.
    pub expansion: u8,
    pub min_item_level: u32,
    pub entry: EntryPoint,
    /// Encounter whose defeat the host reports as activity completion.
    pub final_encounter: u32,
}

impl ActivityDefinition {
    pub fn is_random_or_seasonal(&self) -> bool {
        self.kind.is_selector()
    }
}

/// Achievement/quest/item gate for entering an instance. Quest gates are
/// faction-specific.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AccessRequirement {
    pub achievement: Option<u32>,
    pub item: Option<u32>,
    pub quest_azure: Option<QuestId>,
    pub quest_crimson: Option<QuestId>,
}

/// One row of a level-banded reward table. Tables are ordered by ascending
/// `max_level`; the first row whose `max_level` covers the player wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardTier {
    pub max_level: u32,
    pub first_quest: QuestId,
    pub repeat_quest: QuestId,
}

/// Immutable reference data consumed by the engine.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Catalog {
    activities: HashMap<ActivityId, ActivityDefinition>,
    /// Selector activity -> concrete member activities.
    groups: HashMap<ActivityId, Vec<ActivityId>>,
    access: HashMap<(MapId, Difficulty), AccessRequirement>,
    rewards: HashMap<ActivityId, Vec<RewardTier>>,
    disabled: HashSet<ActivityId>,
    seasonal_open: bool,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_activity(&mut self, def: ActivityDefinition) {
        self.activities.insert(def.id, def);
    }

    pub fn add_group(&mut self, selector: ActivityId, members: Vec<ActivityId>) {
        self.groups.insert(selector, members);
    }

    pub fn add_access_requirement(
        &mut self,
        map: MapId,
        difficulty: Difficulty,
        requirement: AccessRequirement,
    ) {
        self.access.insert((map, difficulty), requirement);
    }

    /// Install a reward table. Rows are kept sorted by `max_level` so that
    /// selection can scan in order.
    pub fn add_reward_table(&mut self, activity: ActivityId, mut tiers: Vec<RewardTier>) {
        tiers.sort_by_key(|t| t.max_level);
        self.rewards.insert(activity, tiers);
    }

    pub fn disable_activity(&mut self, activity: ActivityId) {
        self.disabled.insert(activity);
    }

    pub fn set_seasonal_open(&mut self, open: bool) {
        self.seasonal_open = open;
    }

    // ========================
    // Lookups
    // ========================

    pub fn activity(&self, id: ActivityId) -> Option<&ActivityDefinition> {
        self.activities.get(&id)
    }

    /// Concrete activities behind a random/seasonal selector. A concrete
    /// activity expands to itself.
    pub fn activities_in_group(&self, selector: ActivityId) -> Vec<ActivityId> {
        match self.groups.get(&selector) {
            Some(members) => members.clone(),
            None => vec![selector],
        }
    }

    /// Every concrete activity reachable through some random/seasonal
    /// selector, deduplicated and ordered. This is the domain the
    /// eligibility evaluator reports locks over.
    pub fn selector_reachable(&self) -> Vec<ActivityId> {
        let mut reachable: Vec<ActivityId> =
            self.groups.values().flatten().copied().collect();
        reachable.sort();
        reachable.dedup();
        reachable
    }

    pub fn access_requirement(
        &self,
        map: MapId,
        difficulty: Difficulty,
    ) -> Option<&AccessRequirement> {
        self.access.get(&(map, difficulty))
    }

    pub fn reward_table(&self, activity: ActivityId) -> &[RewardTier] {
        self.rewards.get(&activity).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn is_disabled(&self, activity: ActivityId) -> bool {
        self.disabled.contains(&activity)
    }

    pub fn seasonal_open(&self) -> bool {
        self.seasonal_open
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_def(id: u32, kind: ActivityKind) -> ActivityDefinition {
        ActivityDefinition {
            id: ActivityId(id),
            name: format!("Activity {}", id),
            map: MapId(id * 10),
            difficulty: Difficulty::Normal,
            kind,
            quota: RoleQuota::DUNGEON,
            min_level: 10,
            max_level: 60,
            expansion: 0,
            min_item_level: 0,
            entry: EntryPoint { map: MapId(id * 10), x: 0.0, y: 0.0, z: 0.0 },
            final_encounter: 1,
        }
    }

    #[test]
    fn test_group_expansion() {
        let mut catalog = Catalog::new();
        catalog.add_activity(make_def(1, ActivityKind::RandomDungeon));
        catalog.add_activity(make_def(2, ActivityKind::Dungeon));
        catalog.add_activity(make_def(3, ActivityKind::Dungeon));
        catalog.add_group(ActivityId(1), vec![ActivityId(2), ActivityId(3)]);

        assert_eq!(catalog.activities_in_group(ActivityId(1)), vec![ActivityId(2), ActivityId(3)]);
        // Concrete activities expand to themselves.
        assert_eq!(catalog.activities_in_group(ActivityId(2)), vec![ActivityId(2)]);
    }

    #[test]
    fn test_reward_table_sorted_on_insert() {
        let mut catalog = Catalog::new();
        catalog.add_reward_table(
            ActivityId(1),
            vec![
                RewardTier { max_level: 60, first_quest: QuestId(3), repeat_quest: QuestId(4) },
                RewardTier { max_level: 30, first_quest: QuestId(1), repeat_quest: QuestId(2) },
            ],
        );
        let table = catalog.reward_table(ActivityId(1));
        assert_eq!(table[0].max_level, 30);
        assert_eq!(table[1].max_level, 60);
    }
}
