use thiserror::Error;

use crate::ids::{ActivityId, PartyId, PlayerId, ProposalId};

/// Engine-internal failures. Protocol answers (join rejections, lock maps,
/// vote outcomes) are ordinary return values, not errors.
#[derive(Error, Debug)]
pub enum FinderError {
    #[error("unknown player {0:?}")]
    UnknownPlayer(PlayerId),

    #[error("unknown party {0:?}")]
    UnknownParty(PartyId),

    #[error("unknown activity {0:?}")]
    UnknownActivity(ActivityId),

    #[error("unknown proposal {0:?}")]
    UnknownProposal(ProposalId),

    #[error("no role check in progress for party {0:?}")]
    NoRoleCheck(PartyId),

    #[error("no vote-kick in progress for party {0:?}")]
    NoBoot(PartyId),

    #[error("player {player:?} is not part of {context}")]
    NotAMember { player: PlayerId, context: String },

    #[error("vote already cast with a different answer")]
    VoteAlreadyCast,

    #[error("kick budget exhausted for party {0:?}")]
    KickBudgetExhausted(PartyId),

    #[error("a vote-kick is already in progress for party {0:?}")]
    BootInProgress(PartyId),

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
}

pub type Result<T> = std::result::Result<T, FinderError>;
