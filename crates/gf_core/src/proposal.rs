//! Proposal bookkeeping: a tentative match awaiting unanimous consent.
//!
//! Proposals are created by the matcher, mutated only by answer updates and
//! the deadline sweep, and destroyed on resolution. The engine drives the
//! actual member/party transitions; this module owns the data and the tally
//! arithmetic.

use serde::{Deserialize, Serialize};

use crate::ids::{ActivityId, PartyId, PlayerId, ProposalId, Queuer};
use crate::queue::QueueEntry;
use crate::roles::Roles;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProposalAnswer {
    Pending,
    Agree,
    Deny,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProposalState {
    Initiating,
    Success,
    Failed,
}

/// One matched member's slot in a proposal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProposalMember {
    pub player: PlayerId,
    /// The single combat role the matcher assigned.
    pub role: Roles,
    /// The queue entry that carried this member in.
    pub queuer: Queuer,
    pub joined_queue_at_ms: u64,
    pub answer: ProposalAnswer,
}

/// A tentative match bounded by a deadline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Proposal {
    pub id: ProposalId,
    /// Final activity, already picked from the shared candidate set.
    pub activity: ActivityId,
    /// Candidate set shown to members alongside the find notification.
    pub candidates: Vec<ActivityId>,
    /// Originating party when the match grew around one; empty for a match
    /// built purely from solo tickets.
    pub party: Option<PartyId>,
    pub leader: Option<PlayerId>,
    pub deadline_ms: u64,
    pub members: Vec<ProposalMember>,
    /// Queue entries to dissolve on success or re-enqueue on failure.
    pub entries: Vec<QueueEntry>,
    pub state: ProposalState,
}

impl Proposal {
    pub fn member(&self, player: PlayerId) -> Option<&ProposalMember> {
        self.members.iter().find(|m| m.player == player)
    }

    pub fn member_mut(&mut self, player: PlayerId) -> Option<&mut ProposalMember> {
        self.members.iter_mut().find(|m| m.player == player)
    }

    pub fn agreed_count(&self) -> u32 {
        self.members.iter().filter(|m| m.answer == ProposalAnswer::Agree).count() as u32
    }

    pub fn pending_count(&self) -> u32 {
        self.members.iter().filter(|m| m.answer == ProposalAnswer::Pending).count() as u32
    }

    pub fn all_agreed(&self) -> bool {
        self.members.iter().all(|m| m.answer == ProposalAnswer::Agree)
    }

    /// Players whose answer is anything but Agree; on failure they are all
    /// treated as deniers.
    pub fn deniers(&self) -> Vec<PlayerId> {
        self.members
            .iter()
            .filter(|m| m.answer != ProposalAnswer::Agree)
            .map(|m| m.player)
            .collect()
    }

    pub fn is_expired(&self, now_ms: u64) -> bool {
        now_ms >= self.deadline_ms
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn make_proposal(answers: &[(u64, ProposalAnswer)]) -> Proposal {
        let members = answers
            .iter()
            .map(|(id, answer)| ProposalMember {
                player: PlayerId(*id),
                role: Roles::DAMAGE,
                queuer: Queuer::Player(PlayerId(*id)),
                joined_queue_at_ms: 0,
                answer: *answer,
            })
            .collect();
        Proposal {
            id: ProposalId(1),
            activity: ActivityId(1),
            candidates: vec![ActivityId(1)],
            party: None,
            leader: None,
            deadline_ms: 40_000,
            members,
            entries: vec![QueueEntry {
                queuer: Queuer::Player(PlayerId(1)),
                joined_at_ms: 0,
                activities: vec![ActivityId(1)],
                roles: BTreeMap::new(),
            }],
            state: ProposalState::Initiating,
        }
    }

    #[test]
    fn test_tally() {
        let proposal = make_proposal(&[
            (1, ProposalAnswer::Agree),
            (2, ProposalAnswer::Pending),
            (3, ProposalAnswer::Agree),
        ]);
        assert_eq!(proposal.agreed_count(), 2);
        assert_eq!(proposal.pending_count(), 1);
        assert!(!proposal.all_agreed());
        assert_eq!(proposal.deniers(), vec![PlayerId(2)]);
    }

    #[test]
    fn test_expiry_is_inclusive() {
        let proposal = make_proposal(&[(1, ProposalAnswer::Pending)]);
        assert!(!proposal.is_expired(39_999));
        assert!(proposal.is_expired(40_000));
    }
}
