//! Outbound interfaces: client notifications and world mutations.
//!
//! The engine never talks to a socket or the world simulation directly. It
//! emits [`FinderEvent`]s through a [`NotificationGateway`] and requests
//! world-side effects through a [`WorldGateway`]; delivery guarantees are the
//! host's problem.

use serde::{Deserialize, Serialize};

use crate::boot::BootOutcome;
use crate::catalog::EntryPoint;
use crate::ids::{ActivityId, PartyId, PlayerId, ProposalId};
use crate::queue::WaitSummary;
use crate::rolecheck::RoleCheckStatus;
use crate::roles::Roles;

/// Lifecycle events delivered to connected clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FinderEvent {
    QueueJoined { activities: Vec<ActivityId> },
    QueueLeft,
    QueueStatus { summary: WaitSummary, waited_ms: u64 },

    RoleCheckUpdated { status: RoleCheckStatus },
    /// Sent to the leader only, alongside the final `RoleCheckUpdated`, when
    /// a role check ends without entering the queue.
    RoleCheckFailed { status: RoleCheckStatus },

    ProposalFound { proposal: ProposalId, activity: ActivityId, role: Roles },
    ProposalUpdated { proposal: ProposalId, agreed: u32, pending: u32 },
    ProposalFailed { proposal: ProposalId, timed_out: bool },
    /// The proposal succeeded and the member is being placed into the
    /// activity.
    ActivityReady { activity: ActivityId },

    BootStarted { victim: PlayerId, reason: String },
    BootUpdated { agree: u32, deny: u32 },
    BootResolved { victim: PlayerId, outcome: BootOutcome },
    KickedFromParty { party: PartyId },

    RewardGranted { activity: ActivityId, first_completion: bool },

    /// A collaborator call failed (teleport, catalog miss). Engine state is
    /// unaffected; the player just gets told.
    CollaboratorError { message: String },
}

/// Delivers lifecycle events to connected clients.
pub trait NotificationGateway {
    fn send(&mut self, to: PlayerId, event: FinderEvent);
}

/// World-side mutators the engine requests but does not perform itself.
pub trait WorldGateway {
    /// Move the player to an activity entry point. Failure is reported to
    /// the player and must not wedge engine state.
    fn teleport_to_entry(
        &mut self,
        player: PlayerId,
        entry: EntryPoint,
    ) -> std::result::Result<(), String>;

    /// Detach a player from a party in the world/social layer.
    fn remove_from_party(&mut self, party: PartyId, player: PlayerId);

    fn apply_cooldown_aura(&mut self, player: PlayerId);

    fn remove_cooldown_aura(&mut self, player: PlayerId);
}

/// Gateway that records every event; used by tests and by hosts that batch
/// deliveries themselves.
#[derive(Debug, Default)]
pub struct RecordingGateway {
    pub sent: Vec<(PlayerId, FinderEvent)>,
}

impl RecordingGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events_for(&self, player: PlayerId) -> Vec<&FinderEvent> {
        self.sent.iter().filter(|(to, _)| *to == player).map(|(_, e)| e).collect()
    }

    pub fn clear(&mut self) {
        self.sent.clear();
    }
}

impl NotificationGateway for RecordingGateway {
    fn send(&mut self, to: PlayerId, event: FinderEvent) {
        self.sent.push((to, event));
    }
}

/// World gateway that records requested effects and always succeeds.
#[derive(Debug, Default)]
pub struct RecordingWorld {
    pub teleports: Vec<PlayerId>,
    pub removed_from_party: Vec<(PartyId, PlayerId)>,
    pub cooldowns_applied: Vec<PlayerId>,
    pub cooldowns_removed: Vec<PlayerId>,
    /// When set, teleports fail with this message.
    pub fail_teleports: Option<String>,
}

impl RecordingWorld {
    pub fn new() -> Self {
        Self::default()
    }
}

impl WorldGateway for RecordingWorld {
    fn teleport_to_entry(
        &mut self,
        player: PlayerId,
        _entry: EntryPoint,
    ) -> std::result::Result<(), String> {
        if let Some(msg) = &self.fail_teleports {
            return Err(msg.clone());
        }
        self.teleports.push(player);
        Ok(())
    }

    fn remove_from_party(&mut self, party: PartyId, player: PlayerId) {
        self.removed_from_party.push((party, player));
    }

    fn apply_cooldown_aura(&mut self, player: PlayerId) {
        self.cooldowns_applied.push(player);
    }

    fn remove_cooldown_aura(&mut self, player: PlayerId) {
        self.cooldowns_removed.push(player);
    }
}
