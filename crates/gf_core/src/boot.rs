//! Vote-kick proceedings.
//!
//! One boot at a time per party, bounded by a deadline and the party's kick
//! budget. The passing condition is an exact quorum match, not a threshold;
//! a vote that can no longer reach the quorum closes early as failed.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{FinderError, Result};
use crate::ids::{PartyId, PlayerId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BootVote {
    Pending,
    Agree,
    Deny,
}

/// How a boot ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BootOutcome {
    Kicked,
    /// Could no longer reach quorum.
    Failed,
    TimedOut,
}

/// An open vote-kick proceeding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Boot {
    pub party: PartyId,
    pub victim: PlayerId,
    pub kicker: PlayerId,
    pub reason: String,
    pub deadline_ms: u64,
    pub votes: BTreeMap<PlayerId, BootVote>,
}

impl Boot {
    /// Seed the ballot: victim auto-denies, kicker auto-agrees, everyone
    /// else pending.
    pub fn new(
        party: PartyId,
        kicker: PlayerId,
        victim: PlayerId,
        reason: String,
        members: &[PlayerId],
        deadline_ms: u64,
    ) -> Self {
        let votes = members
            .iter()
            .map(|m| {
                let vote = if *m == victim {
                    BootVote::Deny
                } else if *m == kicker {
                    BootVote::Agree
                } else {
                    BootVote::Pending
                };
                (*m, vote)
            })
            .collect();
        Self { party, victim, kicker, reason, deadline_ms, votes }
    }

    /// Register a vote. Repeating the same answer is a no-op; changing an
    /// already-cast answer is rejected (the first vote is binding).
    pub fn cast(&mut self, member: PlayerId, agree: bool) -> Result<()> {
        let wanted = if agree { BootVote::Agree } else { BootVote::Deny };
        let slot = self.votes.get_mut(&member).ok_or(FinderError::NotAMember {
            player: member,
            context: format!("boot vote in {}", self.party),
        })?;
        match *slot {
            BootVote::Pending => {
                *slot = wanted;
                Ok(())
            }
            current if current == wanted => Ok(()),
            _ => Err(FinderError::VoteAlreadyCast),
        }
    }

    pub fn agree_count(&self) -> u32 {
        self.votes.values().filter(|v| **v == BootVote::Agree).count() as u32
    }

    pub fn deny_count(&self) -> u32 {
        self.votes.values().filter(|v| **v == BootVote::Deny).count() as u32
    }

    /// Resolution check. `Some(true)` exactly when the agree tally equals
    /// the quorum; `Some(false)` when the quorum is mathematically out of
    /// reach; `None` while the vote stays open.
    pub fn tally(&self, quorum: u32) -> Option<bool> {
        if self.agree_count() == quorum {
            return Some(true);
        }
        let voters = self.votes.len() as u32;
        if voters.saturating_sub(self.deny_count()) < quorum {
            return Some(false);
        }
        None
    }

    pub fn is_expired(&self, now_ms: u64) -> bool {
        now_ms >= self.deadline_ms
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn five_member_boot() -> Boot {
        let members: Vec<PlayerId> = (1..=5).map(PlayerId).collect();
        Boot::new(
            PartyId(1),
            PlayerId(1),
            PlayerId(5),
            "afk at first boss".to_string(),
            &members,
            120_000,
        )
    }

    #[test]
    fn test_seeded_votes() {
        let boot = five_member_boot();
        assert_eq!(boot.votes[&PlayerId(1)], BootVote::Agree);
        assert_eq!(boot.votes[&PlayerId(5)], BootVote::Deny);
        assert_eq!(boot.votes[&PlayerId(3)], BootVote::Pending);
        assert_eq!(boot.tally(3), None);
    }

    #[test]
    fn test_exact_quorum_passes() {
        let mut boot = five_member_boot();
        boot.cast(PlayerId(2), true).unwrap();
        assert_eq!(boot.tally(3), None);
        boot.cast(PlayerId(3), true).unwrap();
        // kicker + 2 = exactly 3.
        assert_eq!(boot.tally(3), Some(true));
    }

    #[test]
    fn test_vote_idempotent_and_binding() {
        let mut boot = five_member_boot();
        boot.cast(PlayerId(2), true).unwrap();
        // Same answer again: accepted, tallies unchanged.
        boot.cast(PlayerId(2), true).unwrap();
        assert_eq!(boot.agree_count(), 2);
        // Flipping is rejected.
        assert!(matches!(boot.cast(PlayerId(2), false), Err(FinderError::VoteAlreadyCast)));
        assert_eq!(boot.agree_count(), 2);
        assert_eq!(boot.deny_count(), 1);
    }

    #[test]
    fn test_early_close_when_unwinnable() {
        let mut boot = five_member_boot();
        // Victim already denies; two more denies leave only 2 possible
        // agrees against a quorum of 3.
        boot.cast(PlayerId(2), false).unwrap();
        assert_eq!(boot.tally(3), None);
        boot.cast(PlayerId(3), false).unwrap();
        assert_eq!(boot.tally(3), Some(false));
    }

    #[test]
    fn test_outsider_cannot_vote() {
        let mut boot = five_member_boot();
        assert!(boot.cast(PlayerId(42), true).is_err());
    }
}
