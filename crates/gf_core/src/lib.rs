//! # gf_core - Group Finder Matchmaking Engine
//!
//! This library groups players requesting shared group content into
//! compatible parties: per-role quotas, eligibility locks, pre-queue role
//! checks, unanimous-consent proposals and majority vote-kicks, all driven
//! by a single-authority tick loop.
//!
//! ## Features
//! - Deterministic matching (same seed + same requests = same proposals)
//! - Exact role-quota assignment with hybrid-role backtracking
//! - Deadline sweeps that never leave a lifecycle dangling
//! - Save/load hooks for the party rows that survive a restart

// Allow unused code for features under development
#![allow(dead_code)]

pub mod boot;
pub mod catalog;
pub mod config;
pub mod error;
pub mod finder;
pub mod ids;
pub mod locks;
pub mod matcher;
pub mod notify;
pub mod profile;
pub mod proposal;
pub mod queue;
pub mod reward;
pub mod rolecheck;
pub mod roles;
pub mod save;
pub mod tickets;


// Re-export the engine surface
pub use config::FinderConfig;
pub use error::{FinderError, Result};
pub use finder::{Finder, JoinResult};

// Re-export the core vocabulary types
pub use catalog::{
    AccessRequirement, ActivityDefinition, ActivityKind, Catalog, Difficulty, EntryPoint,
    RewardTier, RoleQuota,
};
pub use boot::{BootOutcome, BootVote};
pub use ids::{ActivityId, MapId, PartitionId, PartyId, PlayerId, ProposalId, QuestId, Queuer};
pub use locks::{LockMap, LockReason, MemberLockMap};
pub use notify::{FinderEvent, NotificationGateway, RecordingGateway, RecordingWorld, WorldGateway};
pub use profile::{Faction, InstanceHold, PlayerProfile};
pub use proposal::{ProposalAnswer, ProposalState};
pub use queue::{QueueEntry, WaitSummary};
pub use rolecheck::RoleCheckStatus;
pub use roles::{PlayerClass, Roles};
pub use tickets::{FinderState, MatchCounters, Ticket};

// Re-export save system
pub use save::{FinderSave, PartyRow, SaveError, SaveManager};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
