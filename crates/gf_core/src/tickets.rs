//! Per-player and per-party matchmaking state.
//!
//! Tickets are created lazily on first reference and destroyed only by
//! explicit removal. Both tickets and parties carry their previous lifecycle
//! state so an aborted proposal/role-check/boot can put the entity back
//! exactly where it was.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::catalog::Difficulty;
use crate::error::{FinderError, Result};
use crate::ids::{ActivityId, PartyId, PlayerId};
use crate::roles::Roles;

/// Lifecycle state shared by player tickets and party tickets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FinderState {
    #[default]
    Idle,
    RoleCheck,
    Queued,
    Proposal,
    InActivity,
    FinishedActivity,
    Browser,
}

/// Per-role match counters kept for achievement bookkeeping.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchCounters {
    pub total: u32,
    pub as_tank: u32,
    pub as_healer: u32,
    pub as_damage: u32,
}

impl MatchCounters {
    pub fn record(&mut self, assigned: Roles) {
        self.total += 1;
        if assigned.contains(Roles::TANK) {
            self.as_tank += 1;
        } else if assigned.contains(Roles::HEALER) {
            self.as_healer += 1;
        } else if assigned.contains(Roles::DAMAGE) {
            self.as_damage += 1;
        }
    }
}

/// Per-player matchmaking record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ticket {
    pub id: PlayerId,
    /// Concrete selected activities, already expanded from any selector.
    pub activities: Vec<ActivityId>,
    /// The random/seasonal selector originally requested, if the selection
    /// came through one. Drives reward eligibility on completion.
    pub selected_via: Option<ActivityId>,
    pub roles: Roles,
    /// Owning party, lookup only.
    pub party: Option<PartyId>,
    state: FinderState,
    previous_state: FinderState,
    pub created_at_ms: u64,
    pub matches: MatchCounters,
}

impl Ticket {
    fn new(id: PlayerId, now_ms: u64) -> Self {
        Self {
            id,
            activities: Vec::new(),
            selected_via: None,
            roles: Roles::NONE,
            party: None,
            state: FinderState::Idle,
            previous_state: FinderState::Idle,
            created_at_ms: now_ms,
            matches: MatchCounters::default(),
        }
    }

    pub fn state(&self) -> FinderState {
        self.state
    }

    pub fn previous_state(&self) -> FinderState {
        self.previous_state
    }

    /// Record the previous state atomically with the new one.
    pub fn set_state(&mut self, state: FinderState) {
        self.previous_state = self.state;
        self.state = state;
    }

    /// Revert to the previous state; used when a proposal/role-check/boot
    /// aborts.
    pub fn restore_state(&mut self) {
        self.state = self.previous_state;
    }
}

/// Per-party matchmaking record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartyState {
    pub id: PartyId,
    pub leader: PlayerId,
    /// Ordered member list.
    pub members: Vec<PlayerId>,
    pub chosen_activity: Option<ActivityId>,
    pub difficulty: Option<Difficulty>,
    /// Remaining kick budget; decrements on every executed kick.
    pub kicks_left: u8,
    pub boot_in_progress: bool,
    state: FinderState,
    previous_state: FinderState,
}

impl PartyState {
    fn new(id: PartyId, kick_budget: u8) -> Self {
        Self {
            id,
            leader: PlayerId(0),
            members: Vec::new(),
            chosen_activity: None,
            difficulty: None,
            kicks_left: kick_budget,
            boot_in_progress: false,
            state: FinderState::Idle,
            previous_state: FinderState::Idle,
        }
    }

    pub fn is_member(&self, player: PlayerId) -> bool {
        self.members.contains(&player)
    }

    pub fn add_member(&mut self, player: PlayerId) {
        if !self.members.contains(&player) {
            self.members.push(player);
        }
    }

    /// Remove a member, promoting the next member to leader if needed.
    pub fn remove_member(&mut self, player: PlayerId) {
        self.members.retain(|m| *m != player);
        if self.leader == player {
            if let Some(next) = self.members.first() {
                self.leader = *next;
            }
        }
    }

    pub fn state(&self) -> FinderState {
        self.state
    }

    pub fn previous_state(&self) -> FinderState {
        self.previous_state
    }

    pub fn set_state(&mut self, state: FinderState) {
        self.previous_state = self.state;
        self.state = state;
    }

    pub fn restore_state(&mut self) {
        self.state = self.previous_state;
    }
}

/// Store for all live tickets and party records.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TicketStore {
    tickets: HashMap<PlayerId, Ticket>,
    parties: HashMap<PartyId, PartyState>,
}

impl TicketStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_create_ticket(&mut self, id: PlayerId, now_ms: u64) -> &mut Ticket {
        self.tickets.entry(id).or_insert_with(|| Ticket::new(id, now_ms))
    }

    pub fn ticket(&self, id: PlayerId) -> Option<&Ticket> {
        self.tickets.get(&id)
    }

    pub fn ticket_mut(&mut self, id: PlayerId) -> Option<&mut Ticket> {
        self.tickets.get_mut(&id)
    }

    /// Explicit removal (leave-group, disconnect cleanup). Callers are
    /// responsible for dissolving queue entries and proposals first.
    pub fn remove_ticket(&mut self, id: PlayerId) {
        self.tickets.remove(&id);
    }

    pub fn get_or_create_party(&mut self, id: PartyId, kick_budget: u8) -> &mut PartyState {
        self.parties.entry(id).or_insert_with(|| PartyState::new(id, kick_budget))
    }

    pub fn party(&self, id: PartyId) -> Option<&PartyState> {
        self.parties.get(&id)
    }

    pub fn party_mut(&mut self, id: PartyId) -> Option<&mut PartyState> {
        self.parties.get_mut(&id)
    }

    pub fn remove_party(&mut self, id: PartyId) {
        self.parties.remove(&id);
    }

    pub fn parties(&self) -> impl Iterator<Item = &PartyState> {
        self.parties.values()
    }

    // ========================
    // State transitions
    // ========================

    pub fn set_ticket_state(&mut self, id: PlayerId, state: FinderState) -> Result<()> {
        let ticket = self.tickets.get_mut(&id).ok_or(FinderError::UnknownPlayer(id))?;
        ticket.set_state(state);
        Ok(())
    }

    pub fn restore_ticket_state(&mut self, id: PlayerId) -> Result<()> {
        let ticket = self.tickets.get_mut(&id).ok_or(FinderError::UnknownPlayer(id))?;
        ticket.restore_state();
        Ok(())
    }

    pub fn set_party_state(&mut self, id: PartyId, state: FinderState) -> Result<()> {
        let party = self.parties.get_mut(&id).ok_or(FinderError::UnknownParty(id))?;
        party.set_state(state);
        Ok(())
    }

    pub fn restore_party_state(&mut self, id: PartyId) -> Result<()> {
        let party = self.parties.get_mut(&id).ok_or(FinderError::UnknownParty(id))?;
        party.restore_state();
        Ok(())
    }
}
