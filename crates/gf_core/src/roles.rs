//! Role bitsets and the class → legal roles table.
//!
//! A member's role selection is a small bitset over Tank/Healer/Damage plus
//! the Leader marker bit. Hybrid classes submit more than one combat bit and
//! the matcher decides which one they actually fill.

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Role selection bitset.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Roles(pub u8);

impl Roles {
    pub const NONE: Roles = Roles(0);
    pub const LEADER: Roles = Roles(0x01);
    pub const TANK: Roles = Roles(0x02);
    pub const HEALER: Roles = Roles(0x04);
    pub const DAMAGE: Roles = Roles(0x08);

    /// The three combat roles, in matcher search order.
    pub const COMBAT: [Roles; 3] = [Roles::TANK, Roles::HEALER, Roles::DAMAGE];

    pub fn contains(self, other: Roles) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn with(self, other: Roles) -> Roles {
        Roles(self.0 | other.0)
    }

    pub fn without(self, other: Roles) -> Roles {
        Roles(self.0 & !other.0)
    }

    /// Combat bits only, Leader marker stripped.
    pub fn combat(self) -> Roles {
        self.without(Roles::LEADER)
    }

    /// Number of combat roles selected.
    pub fn combat_count(self) -> u32 {
        self.combat().0.count_ones()
    }

    /// True when exactly one combat role is selected.
    pub fn is_single(self) -> bool {
        self.combat_count() == 1
    }

    pub fn is_empty(self) -> bool {
        self.combat().0 == 0
    }

    /// Iterate the combat roles present in this set, in search order.
    pub fn iter_combat(self) -> impl Iterator<Item = Roles> {
        Roles::COMBAT.into_iter().filter(move |r| self.contains(*r))
    }
}

impl fmt::Debug for Roles {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut parts = Vec::new();
        if self.contains(Roles::LEADER) {
            parts.push("Leader");
        }
        if self.contains(Roles::TANK) {
            parts.push("Tank");
        }
        if self.contains(Roles::HEALER) {
            parts.push("Healer");
        }
        if self.contains(Roles::DAMAGE) {
            parts.push("Damage");
        }
        if parts.is_empty() {
            parts.push("None");
        }
        write!(f, "Roles({})", parts.join("|"))
    }
}

/// Character class, used only to sanitize role selections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PlayerClass {
    Warrior,
    Guardian,
    Cleric,
    Ranger,
    Sorcerer,
    Bard,
}

/// Legal combat roles per class, built once at load.
static CLASS_ROLES: Lazy<HashMap<PlayerClass, Roles>> = Lazy::new(|| {
    let mut table = HashMap::new();
    table.insert(PlayerClass::Warrior, Roles::TANK.with(Roles::DAMAGE));
    table.insert(PlayerClass::Guardian, Roles::TANK.with(Roles::HEALER).with(Roles::DAMAGE));
    table.insert(PlayerClass::Cleric, Roles::HEALER.with(Roles::DAMAGE));
    table.insert(PlayerClass::Ranger, Roles::DAMAGE);
    table.insert(PlayerClass::Sorcerer, Roles::DAMAGE);
    table.insert(PlayerClass::Bard, Roles::HEALER.with(Roles::DAMAGE));
    table
});

impl PlayerClass {
    /// Combat roles this class is allowed to fill.
    pub fn legal_roles(self) -> Roles {
        *CLASS_ROLES.get(&self).expect("class missing from role table")
    }

    /// Strip combat bits the class cannot legally fill. The Leader marker
    /// passes through untouched.
    pub fn sanitize(self, submitted: Roles) -> Roles {
        let leader =
            if submitted.contains(Roles::LEADER) { Roles::LEADER } else { Roles::NONE };
        Roles(submitted.combat().0 & self.legal_roles().0).with(leader)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bit_operations() {
        let r = Roles::TANK.with(Roles::DAMAGE);
        assert!(r.contains(Roles::TANK));
        assert!(!r.contains(Roles::HEALER));
        assert_eq!(r.combat_count(), 2);
        assert!(!r.is_single());
        assert!(r.without(Roles::TANK).is_single());
    }

    #[test]
    fn test_leader_bit_is_not_a_combat_role() {
        let r = Roles::LEADER.with(Roles::HEALER);
        assert_eq!(r.combat_count(), 1);
        assert!(r.is_single());
        assert!(Roles::LEADER.is_empty());
    }

    #[test]
    fn test_iter_combat_order() {
        let r = Roles::DAMAGE.with(Roles::TANK);
        let collected: Vec<Roles> = r.iter_combat().collect();
        assert_eq!(collected, vec![Roles::TANK, Roles::DAMAGE]);
    }

    #[test]
    fn test_sanitize_against_class() {
        // A pure damage class cannot queue as tank, however it asked.
        let asked = Roles::TANK.with(Roles::DAMAGE).with(Roles::LEADER);
        let got = PlayerClass::Sorcerer.sanitize(asked);
        assert_eq!(got, Roles::DAMAGE.with(Roles::LEADER));

        // Hybrid keeps everything it asked for.
        let got = PlayerClass::Guardian.sanitize(Roles::TANK.with(Roles::HEALER));
        assert_eq!(got, Roles::TANK.with(Roles::HEALER));
    }
}
