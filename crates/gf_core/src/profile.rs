//! Player snapshot data consumed by validation and eligibility checks.
//!
//! The engine owns these records; the host registers a profile before the
//! player first touches the finder and keeps it current through the update
//! accessors. Eligibility reads never call out to collaborators mid-check.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::catalog::Difficulty;
use crate::ids::{MapId, PartitionId, PlayerId, QuestId};
use crate::roles::PlayerClass;

/// Faction gate used by faction-specific access quests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Faction {
    Azure,
    Crimson,
}

/// An unexpired hold on an instance the player has already entered.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InstanceHold {
    pub map: MapId,
    pub difficulty: Difficulty,
    /// Engine-clock expiry in milliseconds.
    pub expires_at_ms: u64,
}

/// Per-player snapshot the eligibility evaluator reads.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerProfile {
    pub id: PlayerId,
    pub level: u32,
    pub class: PlayerClass,
    pub item_level: u32,
    pub faction: Faction,
    pub partition: PartitionId,
    /// Highest expansion index the account owns.
    pub expansion: u8,
    /// Matchmaking ban (conduct or otherwise); rejected before any state
    /// mutation.
    pub banned: bool,
    /// Deserter-style cooldown; blocks joining while set.
    pub on_cooldown: bool,
    /// In combat right now; queue requests are rejected outright.
    pub in_combat: bool,
    pub completed_quests: HashSet<QuestId>,
    pub achievements: HashSet<u32>,
    pub items: HashSet<u32>,
    pub instance_holds: Vec<InstanceHold>,
    /// Map the player is physically inside, if any.
    pub inside_map: Option<MapId>,
}

impl PlayerProfile {
    pub fn new(id: PlayerId, level: u32, class: PlayerClass) -> Self {
        Self {
            id,
            level,
            class,
            item_level: 0,
            faction: Faction::Azure,
            partition: PartitionId(0),
            expansion: 0,
            banned: false,
            on_cooldown: false,
            in_combat: false,
            completed_quests: HashSet::new(),
            achievements: HashSet::new(),
            items: HashSet::new(),
            instance_holds: Vec::new(),
            inside_map: None,
        }
    }

    /// Unexpired hold matching the given instance, if any.
    pub fn hold_for(&self, map: MapId, difficulty: Difficulty, now_ms: u64) -> Option<&InstanceHold> {
        self.instance_holds
            .iter()
            .find(|h| h.map == map && h.difficulty == difficulty && h.expires_at_ms > now_ms)
    }

    pub fn has_completed(&self, quest: QuestId) -> bool {
        self.completed_quests.contains(&quest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::roles::PlayerClass;

    #[test]
    fn test_hold_expiry() {
        let mut profile = PlayerProfile::new(PlayerId(1), 60, PlayerClass::Warrior);
        profile.instance_holds.push(InstanceHold {
            map: MapId(7),
            difficulty: Difficulty::Heroic,
            expires_at_ms: 1_000,
        });

        assert!(profile.hold_for(MapId(7), Difficulty::Heroic, 500).is_some());
        // Expired holds do not count.
        assert!(profile.hold_for(MapId(7), Difficulty::Heroic, 1_000).is_none());
        // Difficulty must match.
        assert!(profile.hold_for(MapId(7), Difficulty::Normal, 500).is_none());
    }
}
