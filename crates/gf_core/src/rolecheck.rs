//! Pre-queue role-check handshake for pre-formed parties.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::ids::{ActivityId, PartyId, PlayerId};
use crate::roles::Roles;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoleCheckStatus {
    Initializing,
    /// All members answered but the combination cannot fill the quota.
    WrongRoles,
    Finished,
    /// A member explicitly submitted an empty role set.
    NoRole,
    /// A member left the party while the check was open.
    MissingRole,
    /// Leader abort or deadline.
    Aborted,
}

impl RoleCheckStatus {
    pub fn is_terminal(self) -> bool {
        self != RoleCheckStatus::Initializing
    }
}

/// An open role check. Created when a pre-formed party asks to queue,
/// destroyed on resolution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleCheck {
    pub party: PartyId,
    pub leader: PlayerId,
    pub deadline_ms: u64,
    /// `None` until the member submits.
    pub roles: BTreeMap<PlayerId, Option<Roles>>,
    pub status: RoleCheckStatus,
    /// What the party asked to queue for; enqueued verbatim on Finished.
    pub activities: Vec<ActivityId>,
    /// Selector the request came through, if any.
    pub selected_via: Option<ActivityId>,
}

impl RoleCheck {
    pub fn new(
        party: PartyId,
        leader: PlayerId,
        members: &[PlayerId],
        deadline_ms: u64,
        activities: Vec<ActivityId>,
        selected_via: Option<ActivityId>,
    ) -> Self {
        Self {
            party,
            leader,
            deadline_ms,
            roles: members.iter().map(|m| (*m, None)).collect(),
            status: RoleCheckStatus::Initializing,
            activities,
            selected_via,
        }
    }

    pub fn record(&mut self, member: PlayerId, roles: Roles) {
        if let Some(slot) = self.roles.get_mut(&member) {
            *slot = Some(roles);
        }
    }

    pub fn all_submitted(&self) -> bool {
        self.roles.values().all(Option::is_some)
    }

    /// Confirmed role sets once everyone has answered.
    pub fn confirmed_roles(&self) -> BTreeMap<PlayerId, Roles> {
        self.roles.iter().filter_map(|(p, r)| r.map(|r| (*p, r))).collect()
    }

    pub fn is_expired(&self, now_ms: u64) -> bool {
        now_ms >= self.deadline_ms
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_submission_tracking() {
        let members = [PlayerId(1), PlayerId(2)];
        let mut check = RoleCheck::new(
            PartyId(1),
            PlayerId(1),
            &members,
            45_000,
            vec![ActivityId(3)],
            None,
        );
        assert!(!check.all_submitted());

        check.record(PlayerId(1), Roles::TANK.with(Roles::LEADER));
        check.record(PlayerId(2), Roles::HEALER);
        assert!(check.all_submitted());

        let confirmed = check.confirmed_roles();
        assert_eq!(confirmed[&PlayerId(1)], Roles::TANK.with(Roles::LEADER));
        assert_eq!(confirmed[&PlayerId(2)], Roles::HEALER);
    }

    #[test]
    fn test_record_ignores_outsiders() {
        let members = [PlayerId(1)];
        let mut check =
            RoleCheck::new(PartyId(1), PlayerId(1), &members, 45_000, vec![ActivityId(3)], None);
        check.record(PlayerId(99), Roles::TANK);
        assert!(!check.roles.contains_key(&PlayerId(99)));
    }
}
