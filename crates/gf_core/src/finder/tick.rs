//! Tick driver: deadline sweeps, the matcher scan, queue-status updates and
//! the activity-completion hook.
//!
//! All timeouts are wall-of-engine-clock deadlines compared against the
//! current tick time; a sweep is at most one tick late.

use rand::seq::SliceRandom;
use std::collections::HashSet;

use super::Finder;
use crate::error::{FinderError, Result};
use crate::ids::{ActivityId, PartitionId, PartyId, PlayerId, Queuer};
use crate::matcher::{self, MatchedGroup};
use crate::notify::FinderEvent;
use crate::proposal::{Proposal, ProposalAnswer, ProposalState, ProposalMember};
use crate::reward;
use crate::rolecheck::RoleCheckStatus;
use crate::roles::Roles;
use crate::tickets::FinderState;

impl Finder {
    /// Advance the engine clock and drive every periodic duty.
    pub fn tick(&mut self, elapsed_ms: u64) {
        self.now_ms += elapsed_ms;
        self.sweep_role_checks();
        self.sweep_proposals();
        self.sweep_boots();
        self.run_matcher();
        self.send_queue_status();
    }

    // ========================
    // Deadline sweeps
    // ========================

    fn sweep_role_checks(&mut self) {
        let now = self.now_ms;
        let expired: Vec<PartyId> = self
            .role_checks
            .iter()
            .filter(|(_, check)| check.is_expired(now))
            .map(|(id, _)| *id)
            .collect();
        for party in expired {
            log::debug!("role check for {} timed out", party);
            self.finish_role_check(party, RoleCheckStatus::Aborted);
        }
    }

    fn sweep_proposals(&mut self) {
        let now = self.now_ms;
        let expired: Vec<_> = self
            .proposals
            .iter()
            .filter(|(_, p)| p.state == ProposalState::Initiating && p.is_expired(now))
            .map(|(id, _)| *id)
            .collect();
        for id in expired {
            log::debug!("proposal {:?} timed out", id);
            self.resolve_proposal_failure(id, true);
        }
    }

    fn sweep_boots(&mut self) {
        let now = self.now_ms;
        let expired: Vec<PartyId> = self
            .boots
            .iter()
            .filter(|(_, boot)| boot.is_expired(now))
            .map(|(id, _)| *id)
            .collect();
        for party in expired {
            self.resolve_boot(party, false, true);
        }
    }

    // ========================
    // Matcher
    // ========================

    /// One scan per partition. Entries bound to an open proposal are
    /// excluded before the search starts.
    fn run_matcher(&mut self) {
        let mut claimed: HashSet<Queuer> = self
            .proposals
            .values()
            .filter(|p| p.state == ProposalState::Initiating)
            .flat_map(|p| p.members.iter().map(|m| m.queuer))
            .collect();

        let mut found: Vec<(PartitionId, MatchedGroup)> = Vec::new();
        for (id, partition) in &self.partitions {
            for group in matcher::find_groups(partition, &self.catalog, &mut claimed) {
                found.push((*id, group));
            }
        }
        for (partition, group) in found {
            self.create_proposal(partition, group);
        }
    }

    fn create_proposal(&mut self, _partition: PartitionId, group: MatchedGroup) {
        let id = self.alloc_proposal_id();
        let activity = *group.candidates.choose(&mut self.rng).unwrap_or(&group.activity);

        let party = group.entries.iter().find_map(|e| match e.queuer {
            Queuer::Party(p) => Some(p),
            Queuer::Player(_) => None,
        });
        let leader = party
            .and_then(|p| self.store.party(p))
            .map(|p| p.leader)
            .or_else(|| {
                group.entries.iter().flat_map(|e| e.roles.iter()).find_map(|(player, roles)| {
                    roles.contains(Roles::LEADER).then_some(*player)
                })
            });

        let mut members = Vec::new();
        for entry in &group.entries {
            for (player, _) in &entry.roles {
                members.push(ProposalMember {
                    player: *player,
                    role: group.assignment[player],
                    queuer: entry.queuer,
                    joined_queue_at_ms: entry.joined_at_ms,
                    answer: ProposalAnswer::Pending,
                });
            }
        }

        for member in &members {
            let _ = self.store.set_ticket_state(member.player, FinderState::Proposal);
        }
        if let Some(party) = party {
            let _ = self.store.set_party_state(party, FinderState::Proposal);
        }

        log::info!(
            "proposal {:?} formed for {} with {} members",
            id,
            activity,
            members.len()
        );
        for member in &members {
            self.notifier.send(
                member.player,
                FinderEvent::ProposalFound { proposal: id, activity, role: member.role },
            );
        }

        let deadline = self.now_ms + self.config.proposal_timeout_ms;
        self.proposals.insert(
            id,
            Proposal {
                id,
                activity,
                candidates: group.candidates,
                party,
                leader,
                deadline_ms: deadline,
                members,
                entries: group.entries,
                state: ProposalState::Initiating,
            },
        );
    }

    // ========================
    // Proposal resolution
    // ========================

    /// Unanimous agreement: form the party, record wait samples, pull every
    /// involved entry out of the queue and move the group into the
    /// activity.
    pub(crate) fn resolve_proposal_success(&mut self, id: crate::ids::ProposalId) {
        let Some(mut proposal) = self.proposals.remove(&id) else {
            return;
        };
        proposal.state = ProposalState::Success;
        let activity = proposal.activity;
        let Some(def) = self.catalog.activity(activity).cloned() else {
            log::warn!("proposal {:?} resolved against unknown {}", id, activity);
            return;
        };

        let target_party = proposal.party.unwrap_or_else(|| {
            let fresh = self.alloc_party_id();
            let leader =
                proposal.leader.unwrap_or_else(|| proposal.members[0].player);
            let kick_budget = self.config.kick_budget;
            let party = self.store.get_or_create_party(fresh, kick_budget);
            party.leader = leader;
            fresh
        });

        // Dissolve every involved queue entry.
        for entry in &proposal.entries {
            for partition in self.partitions.values_mut() {
                partition.remove(entry.queuer);
            }
        }

        let now = self.now_ms;
        for member in &proposal.members {
            // Wait-time sample, attributed to the confirmed role set.
            let confirmed =
                self.store.ticket(member.player).map(|t| t.roles).unwrap_or(member.role);
            let sample = now.saturating_sub(member.joined_queue_at_ms);
            if let Some(profile) = self.profiles.get(&member.player) {
                if let Some(partition) = self.partitions.get_mut(&profile.partition) {
                    partition.wait.record(confirmed.combat(), activity, sample);
                }
            }

            // Displaced members leave whatever unrelated party they were in.
            let old_party = self.store.ticket(member.player).and_then(|t| t.party);
            if let Some(old) = old_party {
                if old != target_party {
                    if let Some(old_state) = self.store.party_mut(old) {
                        old_state.remove_member(member.player);
                    }
                    self.world.remove_from_party(old, member.player);
                }
            }

            if let Some(ticket) = self.store.ticket_mut(member.player) {
                ticket.party = Some(target_party);
                ticket.matches.record(member.role);
                ticket.set_state(FinderState::InActivity);
            }
            if let Some(party) = self.store.party_mut(target_party) {
                party.add_member(member.player);
            }
        }

        if let Some(party) = self.store.party_mut(target_party) {
            party.chosen_activity = Some(activity);
            party.difficulty = Some(def.difficulty);
            party.set_state(FinderState::InActivity);
        }

        // Teleport whoever is not already inside, then tell everyone.
        for member in &proposal.members {
            let inside = self
                .profiles
                .get(&member.player)
                .map(|p| p.inside_map == Some(def.map))
                .unwrap_or(false);
            if !inside {
                match self.world.teleport_to_entry(member.player, def.entry) {
                    Ok(()) => {
                        if let Some(profile) = self.profiles.get_mut(&member.player) {
                            profile.inside_map = Some(def.map);
                        }
                    }
                    Err(message) => {
                        log::warn!("teleport failed for {}: {}", member.player, message);
                        self.notifier
                            .send(member.player, FinderEvent::CollaboratorError { message });
                    }
                }
            }
            self.notifier.send(member.player, FinderEvent::ActivityReady { activity });
        }

        log::info!(
            "proposal {:?} succeeded, {} enters {}",
            id,
            target_party,
            activity
        );
    }

    /// A decline or the deadline: evict the denier's whole entry, restore
    /// everyone else to the queue they never actually left.
    pub(crate) fn resolve_proposal_failure(&mut self, id: crate::ids::ProposalId, timed_out: bool) {
        let Some(mut proposal) = self.proposals.remove(&id) else {
            return;
        };
        proposal.state = ProposalState::Failed;

        // On the deadline, everyone who never agreed counts as a denier; on
        // an explicit decline only the decliner does, and still-pending
        // members are requeued with the rest.
        if timed_out {
            for member in &mut proposal.members {
                if member.answer != ProposalAnswer::Agree {
                    member.answer = ProposalAnswer::Deny;
                }
            }
        }
        let denier_queuers: HashSet<Queuer> = proposal
            .members
            .iter()
            .filter(|m| m.answer == ProposalAnswer::Deny)
            .map(|m| m.queuer)
            .collect();

        for entry in &proposal.entries {
            let evicted = denier_queuers.contains(&entry.queuer);
            if evicted {
                for partition in self.partitions.values_mut() {
                    partition.remove(entry.queuer);
                }
            }
            for player in entry.members() {
                if evicted {
                    let _ = self.store.set_ticket_state(player, FinderState::Idle);
                } else {
                    // Back to Queued; the entry kept its slot and timestamp.
                    let _ = self.store.restore_ticket_state(player);
                }
            }
            if let Queuer::Party(party) = entry.queuer {
                if evicted {
                    let _ = self.store.set_party_state(party, FinderState::Idle);
                } else {
                    let _ = self.store.restore_party_state(party);
                }
            }
        }

        log::debug!(
            "proposal {:?} failed ({})",
            id,
            if timed_out { "deadline" } else { "declined" }
        );
        for member in &proposal.members {
            self.notifier
                .send(member.player, FinderEvent::ProposalFailed { proposal: id, timed_out });
        }
    }

    // ========================
    // Queue status
    // ========================

    fn send_queue_status(&mut self) {
        let now = self.now_ms;
        let interval = self.config.queue_status_interval_ms;
        let mut outgoing: Vec<(PlayerId, FinderEvent)> = Vec::new();

        for partition in self.partitions.values_mut() {
            if now.saturating_sub(partition.last_status_at_ms) < interval {
                continue;
            }
            partition.last_status_at_ms = now;
            let summary = partition.wait.summary();
            for entry in partition.entries() {
                let waited_ms = now.saturating_sub(entry.joined_at_ms);
                for player in entry.members() {
                    outgoing.push((player, FinderEvent::QueueStatus { summary, waited_ms }));
                }
            }
        }
        for (player, event) in outgoing {
            self.notifier.send(player, event);
        }
    }

    // ========================
    // Completion & reward
    // ========================

    /// Completion hook: mark the party finished and grant the one-time
    /// reward to every member who earned it. Safe to call repeatedly.
    pub fn on_activity_completed(&mut self, party_id: PartyId, activity: ActivityId) -> Result<()> {
        let party = self.store.party(party_id).ok_or(FinderError::UnknownParty(party_id))?;
        if party.state() == FinderState::FinishedActivity {
            return Ok(());
        }
        let members = party.members.clone();
        let def = self
            .catalog
            .activity(activity)
            .cloned()
            .ok_or(FinderError::UnknownActivity(activity))?;

        self.store.set_party_state(party_id, FinderState::FinishedActivity)?;
        log::info!("{} completed {}", party_id, activity);

        for member in members {
            let Some(ticket) = self.store.ticket(member) else {
                continue;
            };
            if ticket.state() == FinderState::FinishedActivity {
                continue;
            }
            // Only members physically inside the instance count.
            let inside = self
                .profiles
                .get(&member)
                .map(|p| p.inside_map == Some(def.map))
                .unwrap_or(false);
            if !inside {
                continue;
            }
            let selected_via = ticket.selected_via;
            self.store.set_ticket_state(member, FinderState::FinishedActivity)?;

            // Specific-dungeon selections complete without a reward.
            let Some(selector) = selected_via else {
                continue;
            };

            if let Some(profile) = self.profiles.get_mut(&member) {
                profile.on_cooldown = false;
            }
            self.world.remove_cooldown_aura(member);

            let level = self.profiles.get(&member).map(|p| p.level).unwrap_or(0);
            let Some(tier) = reward::select_reward(self.catalog.reward_table(selector), level)
                .copied()
            else {
                log::warn!("no reward tier for {} at level {}", selector, level);
                continue;
            };

            let first = !self
                .profiles
                .get(&member)
                .map(|p| p.has_completed(tier.first_quest))
                .unwrap_or(true);
            if first {
                if let Some(profile) = self.profiles.get_mut(&member) {
                    profile.completed_quests.insert(tier.first_quest);
                }
            }
            log::debug!(
                "reward for {}: {:?} ({})",
                member,
                if first { tier.first_quest } else { tier.repeat_quest },
                if first { "first" } else { "repeat" }
            );
            self.notifier.send(
                member,
                FinderEvent::RewardGranted { activity: selector, first_completion: first },
            );
        }
        Ok(())
    }
}
