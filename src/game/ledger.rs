use serde::{Deserialize, Serialize};

use super::outcome::BattleOutcome;

/// Running score and board position across battles of one play session.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct SessionLedger {
    pub score: i32,
    /// Square on the board. Never negative.
    pub position: u32,
    pub battles: u32,
    pub wins: u32,
}

impl SessionLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply(&mut self, outcome: &BattleOutcome) {
        self.score += outcome.score_delta;
        self.battles += 1;
        if outcome.player_won() {
            self.wins += 1;
        }
        self.move_by(outcome.board_advance);
    }

    pub fn move_by(&mut self, squares: i32) {
        let target = self.position as i64 + squares as i64;
        self.position = target.clamp(0, u32::MAX as i64) as u32;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::outcome::BattleResultKind;

    fn win() -> BattleOutcome {
        BattleOutcome {
            result: BattleResultKind::Won,
            score_delta: 1,
            board_advance: 6,
        }
    }

    fn loss() -> BattleOutcome {
        BattleOutcome {
            result: BattleResultKind::Lost,
            score_delta: -1,
            board_advance: -4,
        }
    }

    #[test]
    fn win_then_loss() {
        let mut ledger = SessionLedger::new();
        ledger.apply(&win());
        assert_eq!(ledger.position, 6);
        assert_eq!(ledger.score, 1);

        ledger.apply(&loss());
        assert_eq!(ledger.position, 2);
        assert_eq!(ledger.score, 0);
        assert_eq!(ledger.battles, 2);
        assert_eq!(ledger.wins, 1);
    }

    #[test]
    fn position_never_goes_negative() {
        let mut ledger = SessionLedger::new();
        ledger.apply(&loss());
        assert_eq!(ledger.position, 0);
        assert_eq!(ledger.score, -1);
    }
}
