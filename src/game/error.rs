use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::state::Side;

/// Everything a battle operation can refuse to do.
///
/// The first four variants are validation failures: the submission is rejected,
/// nothing in the session changes and the caller may simply prompt again.
/// The last two are configuration defects and are never expected in a
/// correctly wired game.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Error)]
#[serde(tag = "type")]
pub enum BattleError {
    #[error("not enough EP for {action}: need {required}, have {available}")]
    InsufficientEp {
        action: String,
        required: u32,
        available: u32,
    },
    #[error("{action} is cooling down ({remaining} turns left)")]
    OnCooldown { action: String, remaining: u8 },
    #[error("it is the {expected:?} side's turn")]
    NotYourTurn { expected: Side },
    #[error("the battle is already over")]
    BattleOver,
    #[error("unknown action id `{id}`")]
    UnknownAction { id: String },
    #[error("invalid battle configuration: {reason}")]
    InvalidConfig { reason: String },
}

impl BattleError {
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            BattleError::InsufficientEp { .. }
                | BattleError::OnCooldown { .. }
                | BattleError::NotYourTurn { .. }
                | BattleError::BattleOver
        )
    }

    pub fn is_configuration(&self) -> bool {
        !self.is_validation()
    }
}

pub type BattleResult<T> = Result<T, BattleError>;
