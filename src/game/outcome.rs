use serde::{Deserialize, Serialize};

use super::state::BattleSession;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BattleResultKind {
    Won,
    Lost,
}

/// Terminal report of a battle. Pure data; applying the score and board move
/// is up to whoever consumes it (see `SessionLedger`).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct BattleOutcome {
    pub result: BattleResultKind,
    pub score_delta: i32,
    pub board_advance: i32,
}

impl BattleOutcome {
    pub fn player_won(&self) -> bool {
        self.result == BattleResultKind::Won
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct OutcomeRewards {
    pub win_score: i32,
    pub loss_score: i32,
    pub win_advance: i32,
    pub loss_advance: i32,
}

impl Default for OutcomeRewards {
    fn default() -> Self {
        Self {
            win_score: 1,
            loss_score: -1,
            win_advance: 6,
            loss_advance: -4,
        }
    }
}

pub struct BattleOutcomeEvaluator;

impl BattleOutcomeEvaluator {
    /// Returns the terminal outcome the first time a side is at 0 hp, and `None`
    /// on every other call, including every call after the outcome was recorded.
    pub fn evaluate(session: &BattleSession, rewards: &OutcomeRewards) -> Option<BattleOutcome> {
        if session.outcome.is_some() {
            return None;
        }
        if session.opponent.is_defeated() {
            return Some(BattleOutcome {
                result: BattleResultKind::Won,
                score_delta: rewards.win_score,
                board_advance: rewards.win_advance,
            });
        }
        if session.player.is_defeated() {
            return Some(BattleOutcome {
                result: BattleResultKind::Lost,
                score_delta: rewards.loss_score,
                board_advance: rewards.loss_advance,
            });
        }
        None
    }
}
