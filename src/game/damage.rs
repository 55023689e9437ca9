use rand::Rng;
use serde::{Deserialize, Serialize};

use super::catalog::ActionDefinition;
use super::config::CritConfig;

pub const VARIANCE_MIN: f64 = 0.85;
pub const VARIANCE_MAX: f64 = 1.15;

/// Result of one attack roll.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct DamageRoll {
    pub hit: bool,
    pub damage: u32,
    pub crit: bool,
}

impl DamageRoll {
    pub fn miss() -> Self {
        Self::default()
    }
}

/// Rolls hit, variance and crit for a single use of an action.
///
/// Draw order is fixed (hit, then variance, then crit) so a seeded generator
/// replays a battle exactly. A miss consumes only the hit draw.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DamageResolver {
    crit_chance: f64,
    crit_multiplier: f64,
}

impl DamageResolver {
    pub fn new(crit_chance: f64, crit_multiplier: f64) -> Self {
        Self {
            crit_chance,
            crit_multiplier,
        }
    }

    pub fn resolve<R: Rng + ?Sized>(
        &self,
        action: &ActionDefinition,
        side_multiplier: f64,
        rng: &mut R,
    ) -> DamageRoll {
        if rng.gen::<f64>() >= action.hit_chance {
            return DamageRoll::miss();
        }

        let variance = VARIANCE_MIN + rng.gen::<f64>() * (VARIANCE_MAX - VARIANCE_MIN);
        let mut raw = action.base_damage as f64 * variance * side_multiplier;

        let crit = rng.gen::<f64>() < self.crit_chance;
        if crit {
            raw *= self.crit_multiplier;
        }

        DamageRoll {
            hit: true,
            damage: (raw.round() as u32).max(1),
            crit,
        }
    }
}

impl From<CritConfig> for DamageResolver {
    fn from(crit: CritConfig) -> Self {
        Self::new(crit.chance, crit.multiplier)
    }
}
