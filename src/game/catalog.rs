use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::error::{BattleError, BattleResult};

/// Catalog key of an action, e.g. `"basic1"`.
pub type ActionId = String;

/// Reserved id accepted wherever an action id is, meaning "skip the attack and recover EP".
pub const REST_ID: &str = "rest";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ActionKind {
    Physical,
    Precision,
    Special,
}

impl Default for ActionKind {
    fn default() -> Self {
        ActionKind::Physical
    }
}

/// One attack the combatants can use. Shared read-only by both sides.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ActionDefinition {
    pub id: ActionId,
    pub display_name: String,
    pub base_damage: u32,
    pub ep_cost: u32,
    #[serde(default)]
    pub kind: ActionKind,
    pub hit_chance: f64,
    #[serde(default)]
    pub cooldown_turns: u8,
}

impl ActionDefinition {
    pub fn new(
        id: impl Into<ActionId>,
        display_name: impl Into<String>,
        base_damage: u32,
        ep_cost: u32,
        kind: ActionKind,
        hit_chance: f64,
        cooldown_turns: u8,
    ) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            base_damage,
            ep_cost,
            kind,
            hit_chance,
            cooldown_turns,
        }
    }

    pub fn is_special(&self) -> bool {
        self.kind == ActionKind::Special
    }
}

/// Static table of actions.
///
/// Declaration order matters: the opponent evaluates candidates in this order
/// and keeps the first of equally scored ones.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct ActionCatalog {
    actions: Vec<ActionDefinition>,
}

impl ActionCatalog {
    pub fn new(actions: Vec<ActionDefinition>) -> BattleResult<Self> {
        let catalog = Self { actions };
        catalog.validate()?;
        Ok(catalog)
    }

    /// The four moves of the standard duel, listed in the opponent's evaluation order.
    pub fn standard() -> Self {
        Self {
            actions: vec![
                ActionDefinition::new(
                    "special",
                    "Explosão Máxima",
                    50,
                    30,
                    ActionKind::Special,
                    0.95,
                    2,
                ),
                ActionDefinition::new(
                    "precision",
                    "Mira Precisa",
                    32,
                    22,
                    ActionKind::Precision,
                    0.8,
                    0,
                ),
                ActionDefinition::new(
                    "basic2",
                    "Corte Seguro",
                    18,
                    16,
                    ActionKind::Physical,
                    1.0,
                    0,
                ),
                ActionDefinition::new(
                    "basic1",
                    "Golpe Rápido",
                    12,
                    10,
                    ActionKind::Physical,
                    1.0,
                    0,
                ),
            ],
        }
    }

    pub fn lookup(&self, id: &str) -> BattleResult<&ActionDefinition> {
        self.actions
            .iter()
            .find(|action| action.id == id)
            .ok_or_else(|| BattleError::UnknownAction { id: id.to_string() })
    }

    pub fn contains(&self, id: &str) -> bool {
        self.actions.iter().any(|action| action.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ActionDefinition> {
        self.actions.iter()
    }

    /// Actions whose cost fits in `ep`, ignoring cooldowns.
    pub fn affordable(&self, ep: u32) -> impl Iterator<Item = &ActionDefinition> {
        self.actions.iter().filter(move |action| action.ep_cost <= ep)
    }

    pub fn validate(&self) -> BattleResult<()> {
        if self.actions.is_empty() {
            return Err(invalid("action catalog is empty"));
        }
        let mut seen = HashSet::new();
        for action in &self.actions {
            if action.id == REST_ID {
                return Err(invalid(format!("`{REST_ID}` is reserved and cannot be a catalog id")));
            }
            if !seen.insert(action.id.as_str()) {
                return Err(invalid(format!("duplicate action id `{}`", action.id)));
            }
            if action.base_damage == 0 {
                return Err(invalid(format!("action `{}` has zero base damage", action.id)));
            }
            if !(action.hit_chance > 0.0 && action.hit_chance <= 1.0) {
                return Err(invalid(format!(
                    "action `{}` hit chance {} is outside (0, 1]",
                    action.id, action.hit_chance
                )));
            }
        }
        Ok(())
    }
}

impl Default for ActionCatalog {
    fn default() -> Self {
        Self::standard()
    }
}

fn invalid(reason: impl Into<String>) -> BattleError {
    BattleError::InvalidConfig {
        reason: reason.into(),
    }
}

/// What a side does with its turn.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TurnChoice {
    Rest,
    Attack { action: ActionId },
}

impl TurnChoice {
    pub fn attack(action: impl Into<ActionId>) -> Self {
        TurnChoice::Attack {
            action: action.into(),
        }
    }

    pub fn action_id(&self) -> Option<&str> {
        match self {
            TurnChoice::Rest => None,
            TurnChoice::Attack { action } => Some(action.as_str()),
        }
    }

    pub fn is_rest(&self) -> bool {
        matches!(self, TurnChoice::Rest)
    }
}

impl FromStr for TurnChoice {
    type Err = BattleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(BattleError::UnknownAction { id: s.to_string() });
        }
        if trimmed.eq_ignore_ascii_case(REST_ID) {
            Ok(TurnChoice::Rest)
        } else {
            Ok(TurnChoice::attack(trimmed))
        }
    }
}

impl fmt::Display for TurnChoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TurnChoice::Rest => f.write_str(REST_ID),
            TurnChoice::Attack { action } => f.write_str(action),
        }
    }
}
