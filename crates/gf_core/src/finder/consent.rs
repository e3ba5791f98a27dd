//! Consent lifecycles: role-check submissions, proposal answers and
//! vote-kick ballots.

use super::Finder;
use crate::boot::{Boot, BootOutcome};
use crate::error::{FinderError, Result};
use crate::ids::{PartyId, PlayerId, ProposalId, Queuer};
use crate::notify::FinderEvent;
use crate::proposal::{ProposalAnswer, ProposalState};
use crate::queue::QueueEntry;
use crate::rolecheck::RoleCheckStatus;
use crate::roles::Roles;
use crate::tickets::FinderState;
use crate::matcher;

impl Finder {
    // ========================
    // Role check
    // ========================

    /// Record a member's role submission. `member == None` means the leader
    /// aborted the check.
    pub fn submit_role(
        &mut self,
        party_id: PartyId,
        member: Option<PlayerId>,
        roles: Roles,
    ) -> Result<()> {
        if !self.role_checks.contains_key(&party_id) {
            return Err(FinderError::NoRoleCheck(party_id));
        }
        let Some(member) = member else {
            self.finish_role_check(party_id, RoleCheckStatus::Aborted);
            return Ok(());
        };
        if !self.role_checks[&party_id].roles.contains_key(&member) {
            return Err(FinderError::NotAMember {
                player: member,
                context: format!("role check for {}", party_id),
            });
        }
        if roles.is_empty() {
            self.finish_role_check(party_id, RoleCheckStatus::NoRole);
            return Ok(());
        }

        let class = self
            .profiles
            .get(&member)
            .ok_or(FinderError::UnknownPlayer(member))?
            .class;
        let confirmed = class.sanitize(roles);
        if confirmed.is_empty() {
            self.finish_role_check(party_id, RoleCheckStatus::NoRole);
            return Ok(());
        }

        let check = self.role_checks.get_mut(&party_id).expect("checked above");
        check.record(member, confirmed);

        if !check.all_submitted() {
            let members: Vec<PlayerId> = check.roles.keys().copied().collect();
            for m in members {
                self.notifier.send(
                    m,
                    FinderEvent::RoleCheckUpdated { status: RoleCheckStatus::Initializing },
                );
            }
            return Ok(());
        }

        // Everyone answered: solvable combination or wrong roles.
        let confirmed_roles = check.confirmed_roles();
        let quota = check
            .activities
            .first()
            .and_then(|a| self.catalog.activity(*a))
            .map(|d| d.quota);
        let solvable = quota
            .map(|q| matcher::roles_compatible(q, &confirmed_roles))
            .unwrap_or(false);

        if solvable {
            self.finish_role_check(party_id, RoleCheckStatus::Finished);
        } else {
            self.finish_role_check(party_id, RoleCheckStatus::WrongRoles);
        }
        Ok(())
    }

    /// Resolve an open role check. `Finished` sends the party into the
    /// queue; every other status restores each member to its prior state.
    pub(crate) fn finish_role_check(&mut self, party_id: PartyId, status: RoleCheckStatus) {
        let Some(check) = self.role_checks.remove(&party_id) else {
            return;
        };
        let members: Vec<PlayerId> = check.roles.keys().copied().collect();

        if status == RoleCheckStatus::Finished {
            let confirmed = check.confirmed_roles();
            for member in &members {
                if let Some(ticket) = self.store.ticket_mut(*member) {
                    ticket.roles = confirmed[member];
                    ticket.activities = check.activities.clone();
                    ticket.selected_via = check.selected_via;
                    ticket.set_state(FinderState::Queued);
                }
            }
            let _ = self.store.set_party_state(party_id, FinderState::Queued);

            let entry = QueueEntry {
                queuer: Queuer::Party(party_id),
                joined_at_ms: self.now_ms,
                activities: check.activities.clone(),
                roles: confirmed,
            };
            let partition = self.profiles.get(&check.leader).map(|p| p.partition);
            if let Some(pool) = partition.and_then(|p| self.partitions.get_mut(&p)) {
                pool.add(entry);
            }

            log::info!("{} passed role check, entering queue", party_id);
            for member in &members {
                self.notifier.send(
                    *member,
                    FinderEvent::RoleCheckUpdated { status: RoleCheckStatus::Finished },
                );
                self.notifier.send(
                    *member,
                    FinderEvent::QueueJoined { activities: check.activities.clone() },
                );
            }
            return;
        }

        // Any other terminal outcome: put everyone back where they were.
        for member in &members {
            let _ = self.store.restore_ticket_state(*member);
        }
        let _ = self.store.restore_party_state(party_id);

        log::debug!("role check for {} ended: {:?}", party_id, status);
        for member in &members {
            self.notifier.send(*member, FinderEvent::RoleCheckUpdated { status });
        }
        self.notifier.send(check.leader, FinderEvent::RoleCheckFailed { status });
    }

    // ========================
    // Proposal answers
    // ========================

    /// Register a member's accept/decline. A single decline fails the whole
    /// proposal immediately; unanimous agreement resolves it as success.
    pub fn update_proposal_answer(
        &mut self,
        proposal_id: ProposalId,
        member: PlayerId,
        accept: bool,
    ) -> Result<()> {
        let proposal = self
            .proposals
            .get_mut(&proposal_id)
            .ok_or(FinderError::UnknownProposal(proposal_id))?;
        if proposal.state != ProposalState::Initiating {
            return Ok(());
        }
        let slot = proposal.member_mut(member).ok_or(FinderError::NotAMember {
            player: member,
            context: format!("proposal {:?}", proposal_id),
        })?;

        if !accept {
            slot.answer = ProposalAnswer::Deny;
            self.resolve_proposal_failure(proposal_id, false);
            return Ok(());
        }

        slot.answer = ProposalAnswer::Agree;
        if self.proposals[&proposal_id].all_agreed() {
            self.resolve_proposal_success(proposal_id);
            return Ok(());
        }

        let proposal = &self.proposals[&proposal_id];
        let (agreed, pending) = (proposal.agreed_count(), proposal.pending_count());
        let players: Vec<PlayerId> = proposal.members.iter().map(|m| m.player).collect();
        for player in players {
            self.notifier.send(
                player,
                FinderEvent::ProposalUpdated { proposal: proposal_id, agreed, pending },
            );
        }
        Ok(())
    }

    // ========================
    // Vote-kick
    // ========================

    /// Open a boot against a party member. Requires budget and no other
    /// boot in flight; victim and kicker votes are seeded automatically.
    pub fn initiate_boot(
        &mut self,
        party_id: PartyId,
        kicker: PlayerId,
        victim: PlayerId,
        reason: String,
    ) -> Result<()> {
        let party = self.store.party(party_id).ok_or(FinderError::UnknownParty(party_id))?;
        if party.kicks_left == 0 {
            return Err(FinderError::KickBudgetExhausted(party_id));
        }
        if party.boot_in_progress {
            return Err(FinderError::BootInProgress(party_id));
        }
        for player in [kicker, victim] {
            if !party.is_member(player) {
                return Err(FinderError::NotAMember {
                    player,
                    context: format!("{}", party_id),
                });
            }
        }
        let members = party.members.clone();

        let deadline = self.now_ms + self.config.boot_timeout_ms;
        let boot = Boot::new(party_id, kicker, victim, reason.clone(), &members, deadline);
        let verdict = boot.tally(self.config.boot_quorum);
        self.boots.insert(party_id, boot);
        if let Some(party) = self.store.party_mut(party_id) {
            party.boot_in_progress = true;
        }

        log::info!("boot opened in {} against {}", party_id, victim);
        for member in &members {
            self.notifier.send(*member, FinderEvent::BootStarted { victim, reason: reason.clone() });
        }

        // A tiny party can be decided by the seeded votes alone.
        if let Some(passed) = verdict {
            self.resolve_boot(party_id, passed, false);
        }
        Ok(())
    }

    /// Register a boot vote; repeats are idempotent, first answers binding.
    pub fn cast_vote(&mut self, party_id: PartyId, member: PlayerId, agree: bool) -> Result<()> {
        let boot = self.boots.get_mut(&party_id).ok_or(FinderError::NoBoot(party_id))?;
        boot.cast(member, agree)?;
        let (agree_count, deny_count) = (boot.agree_count(), boot.deny_count());
        let victim = boot.victim;
        let voters: Vec<PlayerId> =
            boot.votes.keys().copied().filter(|v| *v != victim).collect();
        let verdict = boot.tally(self.config.boot_quorum);

        for voter in voters {
            self.notifier
                .send(voter, FinderEvent::BootUpdated { agree: agree_count, deny: deny_count });
        }
        if let Some(passed) = verdict {
            self.resolve_boot(party_id, passed, false);
        }
        Ok(())
    }

    /// Close a boot. Executes the kick when it passed: the victim leaves
    /// the party, picks up a deserter cooldown, and the budget burns one.
    pub(crate) fn resolve_boot(&mut self, party_id: PartyId, passed: bool, timed_out: bool) {
        let Some(boot) = self.boots.remove(&party_id) else {
            return;
        };
        let victim = boot.victim;
        let voters: Vec<PlayerId> =
            boot.votes.keys().copied().filter(|v| *v != victim).collect();

        if let Some(party) = self.store.party_mut(party_id) {
            party.boot_in_progress = false;
            if passed {
                party.remove_member(victim);
                party.kicks_left = party.kicks_left.saturating_sub(1);
            }
        }

        let outcome = if passed {
            BootOutcome::Kicked
        } else if timed_out {
            BootOutcome::TimedOut
        } else {
            BootOutcome::Failed
        };

        if passed {
            if let Some(ticket) = self.store.ticket_mut(victim) {
                ticket.party = None;
                ticket.set_state(FinderState::Idle);
            }
            if let Some(profile) = self.profiles.get_mut(&victim) {
                profile.on_cooldown = true;
            }
            self.world.remove_from_party(party_id, victim);
            self.world.apply_cooldown_aura(victim);
            self.notifier.send(victim, FinderEvent::KickedFromParty { party: party_id });
            log::info!("{} kicked from {} by vote", victim, party_id);
        } else {
            log::debug!("boot in {} closed without a kick ({:?})", party_id, outcome);
        }

        for voter in voters {
            self.notifier.send(voter, FinderEvent::BootResolved { victim, outcome });
        }
    }
}
