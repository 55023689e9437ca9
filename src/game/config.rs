use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::ai::PolicyConfig;

use super::catalog::ActionCatalog;
use super::error::{BattleError, BattleResult};
use super::outcome::OutcomeRewards;
use super::state::Side;

static DEFAULT_CONFIG: Lazy<BattleConfig> = Lazy::new(BattleConfig::standard);

/// Per-side stats and regeneration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SideConfig {
    pub max_hp: u32,
    pub max_ep: u32,
    /// Scales every damage roll this side deals.
    pub damage_multiplier: f64,
    /// EP recovered by resting, on top of the end-of-turn regen.
    pub rest_regen: u32,
    /// EP recovered whenever this side finishes a turn without winning.
    pub turn_end_regen: u32,
}

impl SideConfig {
    pub fn player() -> Self {
        Self {
            max_hp: 180,
            max_ep: 45,
            damage_multiplier: 0.9,
            rest_regen: 5,
            turn_end_regen: 5,
        }
    }

    pub fn opponent() -> Self {
        Self {
            max_hp: 240,
            max_ep: 60,
            damage_multiplier: 1.15,
            rest_regen: 8,
            turn_end_regen: 0,
        }
    }

    fn validate(&self, label: &str) -> BattleResult<()> {
        if self.max_hp == 0 {
            return Err(invalid(format!("{label} max_hp must be positive")));
        }
        if !(self.damage_multiplier.is_finite() && self.damage_multiplier > 0.0) {
            return Err(invalid(format!(
                "{label} damage_multiplier {} must be a positive number",
                self.damage_multiplier
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct CritConfig {
    pub chance: f64,
    pub multiplier: f64,
}

impl Default for CritConfig {
    fn default() -> Self {
        Self {
            chance: 0.15,
            multiplier: 1.5,
        }
    }
}

/// Everything tunable about a duel. Every field falls back to the standard duel's values,
/// so a JSON document only needs to name what it overrides.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BattleConfig {
    pub player: SideConfig,
    pub opponent: SideConfig,
    pub crit: CritConfig,
    pub catalog: ActionCatalog,
    pub policy: PolicyConfig,
    pub rewards: OutcomeRewards,
    pub player_starts: bool,
    /// Damage above this fraction of the target's max hp is reported as a strong hit.
    pub strong_hit_ratio: f64,
    /// Presentation pause before the opponent replies. The engine itself never waits.
    pub reply_delay_ms: u32,
}

impl BattleConfig {
    pub fn standard() -> Self {
        Self {
            player: SideConfig::player(),
            opponent: SideConfig::opponent(),
            crit: CritConfig::default(),
            catalog: ActionCatalog::standard(),
            policy: PolicyConfig::default(),
            rewards: OutcomeRewards::default(),
            player_starts: true,
            strong_hit_ratio: 0.30,
            reply_delay_ms: 0,
        }
    }

    pub fn from_json(json: &str) -> BattleResult<Self> {
        let config: BattleConfig =
            serde_json::from_str(json).map_err(|error| invalid(error.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> BattleResult<String> {
        serde_json::to_string(self).map_err(|error| invalid(error.to_string()))
    }

    pub fn side(&self, side: Side) -> &SideConfig {
        match side {
            Side::Player => &self.player,
            Side::Opponent => &self.opponent,
        }
    }

    pub fn starting_side(&self) -> Side {
        if self.player_starts {
            Side::Player
        } else {
            Side::Opponent
        }
    }

    pub fn validate(&self) -> BattleResult<()> {
        self.player.validate("player")?;
        self.opponent.validate("opponent")?;
        self.catalog.validate()?;
        if !(0.0..=1.0).contains(&self.crit.chance) {
            return Err(invalid(format!(
                "crit chance {} is outside [0, 1]",
                self.crit.chance
            )));
        }
        if !(self.crit.multiplier.is_finite() && self.crit.multiplier >= 1.0) {
            return Err(invalid(format!(
                "crit multiplier {} must be at least 1",
                self.crit.multiplier
            )));
        }
        self.policy.validate()?;
        Ok(())
    }
}

impl Default for BattleConfig {
    fn default() -> Self {
        DEFAULT_CONFIG.clone()
    }
}

fn invalid(reason: impl Into<String>) -> BattleError {
    BattleError::InvalidConfig {
        reason: reason.into(),
    }
}
