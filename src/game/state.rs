use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::catalog::{ActionCatalog, ActionId, TurnChoice};
use super::config::{BattleConfig, SideConfig};
use super::error::{BattleError, BattleResult};
use super::outcome::BattleOutcome;

/// Which combatant a value belongs to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Player,
    Opponent,
}

impl Side {
    pub fn other(self) -> Side {
        match self {
            Side::Player => Side::Opponent,
            Side::Opponent => Side::Player,
        }
    }
}

/// Hit points, energy and cooldowns of one side.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CombatantState {
    pub hp: u32,
    pub max_hp: u32,
    pub ep: u32,
    pub max_ep: u32,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub cooldowns: BTreeMap<ActionId, u8>,
}

impl CombatantState {
    pub fn new(max_hp: u32, max_ep: u32) -> Self {
        Self {
            hp: max_hp,
            max_hp,
            ep: max_ep,
            max_ep,
            cooldowns: BTreeMap::new(),
        }
    }

    pub fn from_config(config: &SideConfig) -> Self {
        Self::new(config.max_hp, config.max_ep)
    }

    /// Builder used by tests and previews to start from an arbitrary snapshot.
    pub fn with_vitals(mut self, hp: u32, ep: u32) -> Self {
        self.hp = hp.min(self.max_hp);
        self.ep = ep.min(self.max_ep);
        self
    }

    pub fn is_defeated(&self) -> bool {
        self.hp == 0
    }

    pub fn hp_percent(&self) -> f64 {
        if self.max_hp == 0 {
            return 0.0;
        }
        self.hp as f64 / self.max_hp as f64 * 100.0
    }

    /// Removes `amount` EP. Callers validate affordability first; the floor is 0 regardless.
    pub fn spend_ep(&mut self, amount: u32) {
        self.ep = self.ep.saturating_sub(amount);
    }

    /// Adds EP up to the maximum and returns how much was actually gained.
    pub fn restore_ep(&mut self, amount: u32) -> u32 {
        let before = self.ep;
        self.ep = self.ep.saturating_add(amount).min(self.max_ep);
        self.ep.saturating_sub(before)
    }

    /// Subtracts damage, clamping at 0, and returns the hp actually lost.
    pub fn take_damage(&mut self, amount: u32) -> u32 {
        let before = self.hp;
        self.hp = self.hp.saturating_sub(amount).min(self.max_hp);
        before.saturating_sub(self.hp)
    }
}

/// State machine position of a battle.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum TurnPhase {
    WaitingPlayerAction,
    ResolvingPlayerAction,
    WaitingOpponentAction,
    ResolvingOpponentAction,
    BattleOver { player_won: bool },
}

impl TurnPhase {
    pub fn waiting_for(side: Side) -> Self {
        match side {
            Side::Player => TurnPhase::WaitingPlayerAction,
            Side::Opponent => TurnPhase::WaitingOpponentAction,
        }
    }

    pub fn resolving(side: Side) -> Self {
        match side {
            Side::Player => TurnPhase::ResolvingPlayerAction,
            Side::Opponent => TurnPhase::ResolvingOpponentAction,
        }
    }

    pub fn is_over(&self) -> bool {
        matches!(self, TurnPhase::BattleOver { .. })
    }
}

/// Battle log entries, in the order they happened.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum BattleEvent {
    ActionUsed {
        side: Side,
        action: ActionId,
        damage: u32,
        crit: bool,
        strong_hit: bool,
    },
    ActionMissed {
        side: Side,
        action: ActionId,
    },
    Rested {
        side: Side,
        ep_gained: u32,
    },
    TurnPassed {
        next: Side,
    },
    BattleEnded {
        outcome: BattleOutcome,
    },
    BattleReset,
}

/// One duel from reset to knockout.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BattleSession {
    pub player: CombatantState,
    pub opponent: CombatantState,
    pub turn_owner: Side,
    pub phase: TurnPhase,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_opponent_action: Option<ActionId>,
    pub in_battle: bool,
    #[serde(default)]
    pub score_delta: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outcome: Option<BattleOutcome>,
    pub turn: u32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub event_log: Vec<BattleEvent>,
}

impl BattleSession {
    pub fn new(config: &BattleConfig) -> Self {
        let starter = config.starting_side();
        Self {
            player: CombatantState::from_config(&config.player),
            opponent: CombatantState::from_config(&config.opponent),
            turn_owner: starter,
            phase: TurnPhase::waiting_for(starter),
            last_opponent_action: None,
            in_battle: true,
            score_delta: 0,
            outcome: None,
            turn: 1,
            event_log: Vec::new(),
        }
    }

    pub fn combatant(&self, side: Side) -> &CombatantState {
        match side {
            Side::Player => &self.player,
            Side::Opponent => &self.opponent,
        }
    }

    pub fn combatant_mut(&mut self, side: Side) -> &mut CombatantState {
        match side {
            Side::Player => &mut self.player,
            Side::Opponent => &mut self.opponent,
        }
    }

    pub fn is_finished(&self) -> bool {
        !self.in_battle || self.phase.is_over()
    }

    pub fn record_event(&mut self, event: BattleEvent) {
        self.event_log.push(event);
    }

    /// Records a side's choice for the anti-repetition memory. Only the opponent is tracked.
    pub fn remember_choice(&mut self, side: Side, choice: &TurnChoice) {
        if side == Side::Opponent {
            if let Some(action) = choice.action_id() {
                self.last_opponent_action = Some(action.to_string());
            }
        }
    }

    /// Checks a session that came from outside (e.g. JSON) against the catalog.
    pub fn integrity_check(&self, catalog: &ActionCatalog) -> BattleResult<()> {
        for side in [&self.player, &self.opponent] {
            if side.hp > side.max_hp || side.ep > side.max_ep {
                return Err(invalid_session(format!(
                    "combatant vitals out of range: hp {}/{}, ep {}/{}",
                    side.hp, side.max_hp, side.ep, side.max_ep
                )));
            }
            if let Some(id) = side.cooldowns.keys().find(|id| !catalog.contains(id)) {
                return Err(BattleError::UnknownAction { id: id.clone() });
            }
        }
        if let Some(id) = &self.last_opponent_action {
            if !catalog.contains(id) {
                return Err(BattleError::UnknownAction { id: id.clone() });
            }
        }
        let phase_owner_mismatch = match self.phase {
            TurnPhase::WaitingPlayerAction => self.turn_owner != Side::Player,
            TurnPhase::WaitingOpponentAction => self.turn_owner != Side::Opponent,
            TurnPhase::ResolvingPlayerAction | TurnPhase::ResolvingOpponentAction => {
                return Err(invalid_session(format!(
                    "session was captured mid-resolution ({:?})",
                    self.phase
                )));
            }
            TurnPhase::BattleOver { .. } => false,
        };
        if phase_owner_mismatch {
            return Err(invalid_session(format!(
                "phase {:?} does not belong to the {:?} side",
                self.phase, self.turn_owner
            )));
        }
        self.check_terminal_state()
    }

    /// A finished battle must say so everywhere, and a running one nowhere.
    fn check_terminal_state(&self) -> BattleResult<()> {
        match (self.phase, self.outcome) {
            (TurnPhase::BattleOver { player_won }, Some(outcome)) => {
                if self.in_battle {
                    return Err(invalid_session("finished battle is still flagged in_battle"));
                }
                if outcome.player_won() != player_won {
                    return Err(invalid_session("phase and outcome disagree on the winner"));
                }
                let loser = if player_won { &self.opponent } else { &self.player };
                if !loser.is_defeated() {
                    return Err(invalid_session("finished battle has no knocked out side"));
                }
                Ok(())
            }
            (TurnPhase::BattleOver { .. }, None) => {
                Err(invalid_session("finished battle carries no outcome"))
            }
            (_, Some(_)) => Err(invalid_session("running battle already carries an outcome")),
            (_, None) => {
                if !self.in_battle {
                    return Err(invalid_session("running battle is flagged as not in_battle"));
                }
                if self.player.is_defeated() || self.opponent.is_defeated() {
                    return Err(invalid_session("a side is at 0 hp in a running battle"));
                }
                Ok(())
            }
        }
    }
}

fn invalid_session(reason: impl Into<String>) -> BattleError {
    BattleError::InvalidConfig {
        reason: reason.into(),
    }
}

impl Default for BattleSession {
    fn default() -> Self {
        Self::new(&BattleConfig::default())
    }
}
