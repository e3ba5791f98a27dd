//! The matchmaking engine context.
//!
//! One `Finder` is constructed at startup and owns every shared table:
//! tickets, queue partitions, proposals, role checks, boots. All entry
//! points take `&mut self`; a host accepting requests from several
//! connection handlers funnels them through its own serialization point.
//! Collaborator reads are copied out before any mutation, and collaborator
//! mutations go through the injected gateways.

mod consent;
mod tick;

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::collections::HashMap;

use crate::catalog::{ActivityKind, Catalog};
use crate::config::FinderConfig;
use crate::error::{FinderError, Result};
use crate::ids::{ActivityId, PartitionId, PartyId, PlayerId, ProposalId, Queuer};
use crate::locks::{self, MemberLockMap};
use crate::notify::{FinderEvent, NotificationGateway, WorldGateway};
use crate::profile::PlayerProfile;
use crate::proposal::Proposal;
use crate::queue::{QueueEntry, QueuePartition};
use crate::rolecheck::{RoleCheck, RoleCheckStatus};
use crate::roles::Roles;
use crate::tickets::{FinderState, TicketStore};
use crate::boot::Boot;

/// Engine-allocated parties (groups assembled from solo tickets) live above
/// this base so they never collide with host-assigned party ids.
const ENGINE_PARTY_BASE: u64 = 1 << 48;

/// Structured answer to a join request. Everything here is an ordinary
/// protocol outcome; engine faults surface as [`FinderError`] instead.
#[derive(Debug, Clone, PartialEq)]
pub enum JoinResult {
    /// Solo ticket entered the queue.
    Joined,
    /// Party handshake opened; the queue is entered when it finishes.
    RoleCheckStarted,
    /// Banned or otherwise not permitted to use the finder.
    NotAllowed,
    /// A deserter-style cooldown is still running.
    OnCooldown,
    /// The requester (or a party member) is in combat.
    InCombat,
    /// The requester (or its party) is already in some finder lifecycle.
    InvalidState,
    NoSelection,
    /// Raid and dungeon types in one request, or a selector mixed with
    /// concrete picks.
    MixedActivityTypes,
    TooManyRandoms,
    TooManyMembers,
    InvalidRoles,
    /// Only the party leader may queue a party.
    NotLeader,
    /// Every candidate was eligibility-locked for somebody; the map says
    /// who and why.
    Locked(MemberLockMap),
}

pub struct Finder {
    pub(crate) config: FinderConfig,
    pub(crate) catalog: Catalog,
    pub(crate) store: TicketStore,
    pub(crate) profiles: HashMap<PlayerId, PlayerProfile>,
    pub(crate) partitions: HashMap<PartitionId, QueuePartition>,
    pub(crate) proposals: HashMap<ProposalId, Proposal>,
    pub(crate) role_checks: HashMap<PartyId, RoleCheck>,
    pub(crate) boots: HashMap<PartyId, Boot>,
    pub(crate) notifier: Box<dyn NotificationGateway>,
    pub(crate) world: Box<dyn WorldGateway>,
    pub(crate) rng: ChaCha8Rng,
    pub(crate) now_ms: u64,
    next_proposal_id: u32,
    next_party_seq: u64,
}

impl Finder {
    pub fn new(
        config: FinderConfig,
        catalog: Catalog,
        world: Box<dyn WorldGateway>,
        notifier: Box<dyn NotificationGateway>,
        seed: u64,
    ) -> Self {
        Self {
            config,
            catalog,
            store: TicketStore::new(),
            profiles: HashMap::new(),
            partitions: HashMap::new(),
            proposals: HashMap::new(),
            role_checks: HashMap::new(),
            boots: HashMap::new(),
            notifier,
            world,
            rng: ChaCha8Rng::seed_from_u64(seed),
            now_ms: 0,
            next_proposal_id: 0,
            next_party_seq: 0,
        }
    }

    pub fn now_ms(&self) -> u64 {
        self.now_ms
    }

    pub fn config(&self) -> &FinderConfig {
        &self.config
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn partitions(&self) -> impl Iterator<Item = &QueuePartition> {
        self.partitions.values()
    }

    // ========================
    // Registration
    // ========================

    /// Install or refresh a player snapshot. The partition pool is created
    /// lazily on first sight.
    pub fn register_player(&mut self, profile: PlayerProfile) {
        self.partitions
            .entry(profile.partition)
            .or_insert_with(|| QueuePartition::new(profile.partition));
        self.profiles.insert(profile.id, profile);
    }

    pub fn profile(&self, id: PlayerId) -> Option<&PlayerProfile> {
        self.profiles.get(&id)
    }

    pub fn profile_mut(&mut self, id: PlayerId) -> Option<&mut PlayerProfile> {
        self.profiles.get_mut(&id)
    }

    /// Adopt a host-formed party: creates the party record and points every
    /// member's ticket at it.
    pub fn register_party(&mut self, id: PartyId, leader: PlayerId, members: &[PlayerId]) {
        let kick_budget = self.config.kick_budget;
        let party = self.store.get_or_create_party(id, kick_budget);
        party.leader = leader;
        for member in members {
            party.add_member(*member);
        }
        let now = self.now_ms;
        for member in members {
            self.store.get_or_create_ticket(*member, now).party = Some(id);
        }
    }

    pub(crate) fn alloc_party_id(&mut self) -> PartyId {
        self.next_party_seq += 1;
        PartyId(ENGINE_PARTY_BASE + self.next_party_seq)
    }

    pub(crate) fn alloc_proposal_id(&mut self) -> ProposalId {
        self.next_proposal_id += 1;
        ProposalId(self.next_proposal_id)
    }

    // ========================
    // Join / leave
    // ========================

    /// Queue a solo player, or open a role check for the requester's party.
    pub fn join_queue(
        &mut self,
        requester: PlayerId,
        roles: Roles,
        selections: &[ActivityId],
    ) -> Result<JoinResult> {
        if !self.profiles.contains_key(&requester) {
            return Err(FinderError::UnknownPlayer(requester));
        }
        let now = self.now_ms;
        let party_ref = self.store.get_or_create_ticket(requester, now).party;

        let Some(expanded) = self.expand_selections(selections)? else {
            return Ok(self.validate_selection_shape(selections));
        };

        match party_ref.and_then(|p| self.store.party(p).map(|party| party.id)) {
            Some(party) => self.join_party(requester, party, roles, selections, expanded),
            None => self.join_solo(requester, roles, selections, expanded),
        }
    }

    /// Expand a selector request to its concrete set. Returns `Ok(None)`
    /// when the shape is invalid; the caller re-derives the precise code.
    fn expand_selections(
        &self,
        selections: &[ActivityId],
    ) -> Result<Option<(Vec<ActivityId>, Option<ActivityId>)>> {
        if selections.is_empty() {
            return Ok(None);
        }
        let mut selectors = Vec::new();
        let mut kinds = Vec::new();
        for &id in selections {
            let def = self.catalog.activity(id).ok_or(FinderError::UnknownActivity(id))?;
            if def.kind.is_selector() {
                selectors.push(id);
            }
            kinds.push(def.kind);
        }
        if selectors.len() > 1 {
            return Ok(None);
        }
        if selectors.len() == 1 {
            if selections.len() > 1 {
                return Ok(None);
            }
            let selector = selectors[0];
            return Ok(Some((self.catalog.activities_in_group(selector), Some(selector))));
        }
        let mixed = kinds.iter().any(|k| *k == ActivityKind::Raid)
            && kinds.iter().any(|k| *k == ActivityKind::Dungeon);
        if mixed {
            return Ok(None);
        }
        Ok(Some((selections.to_vec(), None)))
    }

    /// Map an invalid selection shape to its join-result code.
    fn validate_selection_shape(&self, selections: &[ActivityId]) -> JoinResult {
        if selections.is_empty() {
            return JoinResult::NoSelection;
        }
        let selector_count = selections
            .iter()
            .filter_map(|id| self.catalog.activity(*id))
            .filter(|def| def.kind.is_selector())
            .count();
        if selector_count > 1 {
            return JoinResult::TooManyRandoms;
        }
        JoinResult::MixedActivityTypes
    }

    fn join_solo(
        &mut self,
        requester: PlayerId,
        roles: Roles,
        _selections: &[ActivityId],
        (expanded, selected_via): (Vec<ActivityId>, Option<ActivityId>),
    ) -> Result<JoinResult> {
        let profile = &self.profiles[&requester];
        let (banned, on_cooldown, in_combat, class, partition) = (
            profile.banned,
            profile.on_cooldown,
            profile.in_combat,
            profile.class,
            profile.partition,
        );

        if banned {
            return Ok(JoinResult::NotAllowed);
        }
        let state = self.store.ticket(requester).map(|t| t.state()).unwrap_or_default();
        if !matches!(state, FinderState::Idle | FinderState::Browser) {
            return Ok(JoinResult::InvalidState);
        }
        if in_combat {
            return Ok(JoinResult::InCombat);
        }
        if on_cooldown {
            return Ok(JoinResult::OnCooldown);
        }
        let confirmed = class.sanitize(roles);
        if confirmed.is_empty() {
            return Ok(JoinResult::InvalidRoles);
        }

        let profile = &self.profiles[&requester];
        let compatible = match locks::get_compatible_activities(
            &expanded,
            &[profile],
            false,
            &self.catalog,
            self.now_ms,
        ) {
            Ok(compatible) => compatible,
            Err(map) => return Ok(JoinResult::Locked(map)),
        };

        let now = self.now_ms;
        let ticket = self.store.get_or_create_ticket(requester, now);
        ticket.activities = compatible.clone();
        ticket.selected_via = selected_via;
        ticket.roles = confirmed;
        ticket.set_state(FinderState::Queued);

        let entry = QueueEntry {
            queuer: Queuer::Player(requester),
            joined_at_ms: now,
            activities: compatible.clone(),
            roles: [(requester, confirmed)].into_iter().collect(),
        };
        self.partitions
            .entry(partition)
            .or_insert_with(|| QueuePartition::new(partition))
            .add(entry);

        log::debug!("{} queued for {} activities", requester, compatible.len());
        self.notifier.send(requester, FinderEvent::QueueJoined { activities: compatible });
        Ok(JoinResult::Joined)
    }

    fn join_party(
        &mut self,
        requester: PlayerId,
        party_id: PartyId,
        roles: Roles,
        _selections: &[ActivityId],
        (expanded, selected_via): (Vec<ActivityId>, Option<ActivityId>),
    ) -> Result<JoinResult> {
        let party = self.store.party(party_id).ok_or(FinderError::UnknownParty(party_id))?;
        if party.leader != requester {
            return Ok(JoinResult::NotLeader);
        }
        let members = party.members.clone();
        let party_state = party.state();
        let is_continuing = party_state == FinderState::InActivity;
        if !matches!(
            party_state,
            FinderState::Idle | FinderState::Browser | FinderState::InActivity
        ) {
            return Ok(JoinResult::InvalidState);
        }

        let max_quota = expanded
            .iter()
            .filter_map(|a| self.catalog.activity(*a))
            .map(|d| d.quota.total() as usize)
            .max()
            .unwrap_or(0);
        if members.len() > max_quota {
            return Ok(JoinResult::TooManyMembers);
        }

        for member in &members {
            let profile =
                self.profiles.get(member).ok_or(FinderError::UnknownPlayer(*member))?;
            if profile.banned {
                return Ok(JoinResult::NotAllowed);
            }
            if profile.in_combat {
                return Ok(JoinResult::InCombat);
            }
            if profile.on_cooldown {
                return Ok(JoinResult::OnCooldown);
            }
        }

        let leader_roles =
            self.profiles[&requester].class.sanitize(roles).with(Roles::LEADER);
        if leader_roles.is_empty() {
            return Ok(JoinResult::InvalidRoles);
        }

        let member_profiles: Vec<&PlayerProfile> =
            members.iter().map(|m| &self.profiles[m]).collect();
        let compatible = match locks::get_compatible_activities(
            &expanded,
            &member_profiles,
            is_continuing,
            &self.catalog,
            self.now_ms,
        ) {
            Ok(compatible) => compatible,
            Err(map) => return Ok(JoinResult::Locked(map)),
        };

        // Open the handshake; the queue is entered when it finishes.
        let now = self.now_ms;
        let deadline = now + self.config.role_check_timeout_ms;
        let mut check =
            RoleCheck::new(party_id, requester, &members, deadline, compatible, selected_via);
        check.record(requester, leader_roles);

        for member in &members {
            self.store.get_or_create_ticket(*member, now).set_state(FinderState::RoleCheck);
        }
        self.store.set_party_state(party_id, FinderState::RoleCheck)?;
        self.role_checks.insert(party_id, check);

        log::debug!("role check opened for {}", party_id);
        for member in &members {
            self.notifier.send(
                *member,
                FinderEvent::RoleCheckUpdated { status: RoleCheckStatus::Initializing },
            );
        }
        Ok(JoinResult::RoleCheckStarted)
    }

    /// Remove a player from whichever lifecycle currently holds them.
    /// Collateral members are restored as the lifecycle rules dictate. On
    /// disconnect the ticket itself is destroyed afterwards.
    pub fn leave_queue(&mut self, requester: PlayerId, is_disconnect: bool) -> Result<()> {
        let Some(ticket) = self.store.ticket(requester) else {
            return Ok(());
        };
        let state = ticket.state();
        let party = ticket.party;

        match state {
            FinderState::RoleCheck => {
                if let Some(party_id) = party {
                    if self.role_checks.contains_key(&party_id) {
                        let leader = self.role_checks[&party_id].leader;
                        let status = if leader == requester {
                            RoleCheckStatus::Aborted
                        } else {
                            RoleCheckStatus::MissingRole
                        };
                        self.finish_role_check(party_id, status);
                    }
                }
            }
            FinderState::Queued => {
                self.remove_from_queues(requester, party);
            }
            FinderState::Proposal => {
                let holding = self
                    .proposals
                    .values()
                    .find(|p| p.member(requester).is_some())
                    .map(|p| p.id);
                if let Some(id) = holding {
                    // Leaving mid-proposal is a decline.
                    self.update_proposal_answer(id, requester, false)?;
                }
            }
            FinderState::Browser => {
                self.store.set_ticket_state(requester, FinderState::Idle)?;
            }
            FinderState::Idle | FinderState::InActivity | FinderState::FinishedActivity => {}
        }

        if is_disconnect {
            self.store.remove_ticket(requester);
            log::debug!("{} ticket destroyed on disconnect", requester);
        }
        Ok(())
    }

    /// Drop the queue entry holding this player: their own for solos, the
    /// whole party's for grouped players.
    fn remove_from_queues(&mut self, requester: PlayerId, party: Option<PartyId>) {
        let queuer = match party {
            Some(p) => Queuer::Party(p),
            None => Queuer::Player(requester),
        };
        let mut dropped: Vec<PlayerId> = Vec::new();
        for partition in self.partitions.values_mut() {
            if let Some(entry) = partition.remove(queuer) {
                dropped.extend(entry.members());
            }
        }
        if dropped.is_empty() {
            dropped.push(requester);
        }
        for member in &dropped {
            let _ = self.store.set_ticket_state(*member, FinderState::Idle);
            self.notifier.send(*member, FinderEvent::QueueLeft);
        }
        if let Some(party_id) = party {
            let _ = self.store.set_party_state(party_id, FinderState::Idle);
        }
        log::debug!("{} left the queue ({} tickets released)", requester, dropped.len());
    }

    /// Lock reasons for every activity reachable from the random selector
    /// set, for client display.
    pub fn get_locks(&self, player: PlayerId) -> Result<crate::locks::LockMap> {
        let profile =
            self.profiles.get(&player).ok_or(FinderError::UnknownPlayer(player))?;
        let reachable = self.catalog.selector_reachable();
        Ok(locks::get_locks(profile, &self.catalog, &reachable, self.now_ms))
    }

    // ========================
    // Persistence
    // ========================

    /// Snapshot the party rows worth keeping across a restart.
    pub fn snapshot(&self) -> crate::save::FinderSave {
        let mut save = crate::save::FinderSave::new();
        for party in self.store.parties() {
            save.parties.push(crate::save::PartyRow {
                party: party.id,
                activity: party.chosen_activity,
                difficulty: party.difficulty,
                state: party.state(),
            });
        }
        save
    }

    /// Re-adopt persisted rows. Only in-activity and finished parties
    /// survive a restart; every other state was stale the moment the
    /// process died.
    pub fn restore(&mut self, save: &crate::save::FinderSave) {
        for row in &save.parties {
            match row.state {
                FinderState::InActivity | FinderState::FinishedActivity => {
                    let kick_budget = self.config.kick_budget;
                    let party = self.store.get_or_create_party(row.party, kick_budget);
                    party.chosen_activity = row.activity;
                    party.difficulty = row.difficulty;
                    party.set_state(row.state);
                    log::info!("restored {} in {:?}", row.party, row.state);
                }
                _ => log::debug!("discarding stale save row for {}", row.party),
            }
        }
    }

    /// Park an idle player in the browser listing state.
    pub fn open_browser(&mut self, player: PlayerId) -> Result<()> {
        let ticket = self.store.get_or_create_ticket(player, self.now_ms);
        if ticket.state() != FinderState::Idle {
            return Err(FinderError::InvalidParameter(format!(
                "{} cannot browse from {:?}",
                player,
                ticket.state()
            )));
        }
        ticket.set_state(FinderState::Browser);
        Ok(())
    }
}
