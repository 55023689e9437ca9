use log::trace;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::game::{
    ActionCatalog, ActionDefinition, ActionId, ActionKind, BattleConfig, BattleError,
    BattleResult, BattleSession, CombatantState, CooldownTracker, TurnChoice,
};

/// Heuristic weights. Defaults are the tuned values shipped with the standard duel.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PolicyConfig {
    pub min_hit_chance: f64,
    pub overkill_margin: f64,
    pub special_bonus: f64,
    /// Player hp percentage at or below which precision attacks get a bonus.
    pub low_hp_threshold_pct: f64,
    pub precision_bonus: f64,
    /// Fraction of the player's hp that raw damage must reach to count as a finisher.
    pub finisher_ratio: f64,
    pub finisher_bonus: f64,
    pub low_ep_threshold: f64,
    pub low_ep_penalty: f64,
    pub special_ep_threshold: f64,
    pub special_ep_penalty: f64,
    pub cost_penalty: f64,
    pub conserve_floor: f64,
    pub conserve_reward: f64,
    pub efficiency_ep_threshold: f64,
    pub efficiency_weight_low_ep: f64,
    pub efficiency_weight: f64,
    pub cheaper_finisher_discount: f64,
    pub repeat_penalty: f64,
    pub risk_ep_threshold: f64,
    /// Player threat above this fraction of the opponent's max hp makes draining EP risky.
    pub risk_damage_ratio: f64,
    pub risk_penalty: f64,
    /// Player threat at or above this fraction of the opponent's current hp boosts every candidate.
    pub threat_ratio: f64,
    pub threat_bonus: f64,
    pub jitter_min: f64,
    pub jitter_max: f64,
    pub rest_score_floor: f64,
    pub rest_ep_ceiling: u32,
    pub exhausted_ep: u32,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            min_hit_chance: 0.05,
            overkill_margin: 1.1,
            special_bonus: 1.06,
            low_hp_threshold_pct: 35.0,
            precision_bonus: 1.08,
            finisher_ratio: 0.92,
            finisher_bonus: 1.20,
            low_ep_threshold: 10.0,
            low_ep_penalty: 0.86,
            special_ep_threshold: 15.0,
            special_ep_penalty: 0.90,
            cost_penalty: 0.22,
            conserve_floor: 14.0,
            conserve_reward: 0.35,
            efficiency_ep_threshold: 20.0,
            efficiency_weight_low_ep: 6.0,
            efficiency_weight: 3.0,
            cheaper_finisher_discount: 0.88,
            repeat_penalty: 0.92,
            risk_ep_threshold: 8.0,
            risk_damage_ratio: 0.16,
            risk_penalty: 0.88,
            threat_ratio: 0.80,
            threat_bonus: 1.06,
            jitter_min: 0.96,
            jitter_max: 1.08,
            rest_score_floor: 12.0,
            rest_ep_ceiling: 22,
            exhausted_ep: 9,
        }
    }
}

impl PolicyConfig {
    pub fn validate(&self) -> BattleResult<()> {
        if !(self.jitter_min > 0.0 && self.jitter_min <= self.jitter_max) {
            return Err(BattleError::InvalidConfig {
                reason: format!(
                    "policy jitter range [{}, {}] is empty or non-positive",
                    self.jitter_min, self.jitter_max
                ),
            });
        }
        if !(0.0..=1.0).contains(&self.min_hit_chance) {
            return Err(BattleError::InvalidConfig {
                reason: format!("policy min_hit_chance {} is outside [0, 1]", self.min_hit_chance),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RestReason {
    /// Nothing affordable and off cooldown.
    NoCandidates,
    /// EP below the hard floor; rest no matter what the scores say.
    Exhausted,
    /// Best score too low while EP is short.
    Unprofitable,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CandidateScore {
    pub action: ActionId,
    pub score: f64,
    pub finisher: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PolicyDecision {
    pub choice: TurnChoice,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub evaluation: Option<f64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub candidates: Vec<CandidateScore>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rest_reason: Option<RestReason>,
}

/// Read-only snapshot the policy decides from.
#[derive(Debug, Clone, Copy)]
pub struct PolicyInput<'a> {
    pub opponent: &'a CombatantState,
    pub player: &'a CombatantState,
    pub catalog: &'a ActionCatalog,
    pub last_action: Option<&'a str>,
    pub opponent_multiplier: f64,
    pub player_multiplier: f64,
}

impl<'a> PolicyInput<'a> {
    pub fn from_session(session: &'a BattleSession, config: &'a BattleConfig) -> Self {
        Self {
            opponent: &session.opponent,
            player: &session.player,
            catalog: &config.catalog,
            last_action: session.last_opponent_action.as_deref(),
            opponent_multiplier: config.opponent.damage_multiplier,
            player_multiplier: config.player.damage_multiplier,
        }
    }
}

/// Facts shared by every candidate of one decision.
#[derive(Debug, Clone)]
pub(crate) struct ScoreContext<'a> {
    player_hp: f64,
    player_hp_pct: f64,
    opponent_ep: f64,
    opponent_hp: f64,
    opponent_max_hp: f64,
    /// Best expected damage the player can afford next turn.
    player_threat: f64,
    cheapest_finisher_cost: Option<u32>,
    last_action: Option<&'a str>,
}

#[derive(Debug, Clone)]
pub(crate) struct Candidate<'a> {
    action: &'a ActionDefinition,
    raw_base: f64,
    hit: f64,
    post_ep: f64,
    finisher: bool,
}

type ScoreStep = fn(f64, &Candidate<'_>, &ScoreContext<'_>, &PolicyConfig) -> f64;

/// Adjustments applied, in this order, on top of `expected_damage`. Jitter comes last
/// and is applied separately because it draws from the generator.
const SCORE_PIPELINE: [(&str, ScoreStep); 12] = [
    ("overkill_discount", overkill_discount),
    ("type_bonus", type_bonus),
    ("low_hp_precision_bonus", low_hp_precision_bonus),
    ("finisher_bonus", finisher_bonus),
    ("ep_conservation_penalty", ep_conservation_penalty),
    ("linear_cost_penalty", linear_cost_penalty),
    ("conservation_reward", conservation_reward),
    ("efficiency_bonus", efficiency_bonus),
    ("cheaper_finisher_discount", cheaper_finisher_discount),
    ("anti_repetition", anti_repetition),
    ("risk_penalty", risk_penalty),
    ("threat_amplifier", threat_amplifier),
];

pub(crate) fn expected_damage(candidate: &Candidate<'_>) -> f64 {
    candidate.raw_base * candidate.hit * candidate.hit
}

pub(crate) fn overkill_discount(
    score: f64,
    candidate: &Candidate<'_>,
    ctx: &ScoreContext<'_>,
    config: &PolicyConfig,
) -> f64 {
    score * (ctx.player_hp * config.overkill_margin / candidate.raw_base.max(1.0)).min(1.0)
}

pub(crate) fn type_bonus(
    score: f64,
    candidate: &Candidate<'_>,
    _ctx: &ScoreContext<'_>,
    config: &PolicyConfig,
) -> f64 {
    if candidate.action.is_special() {
        score * config.special_bonus
    } else {
        score
    }
}

pub(crate) fn low_hp_precision_bonus(
    score: f64,
    candidate: &Candidate<'_>,
    ctx: &ScoreContext<'_>,
    config: &PolicyConfig,
) -> f64 {
    if candidate.action.kind == ActionKind::Precision
        && ctx.player_hp_pct <= config.low_hp_threshold_pct
    {
        score * config.precision_bonus
    } else {
        score
    }
}

pub(crate) fn finisher_bonus(
    score: f64,
    candidate: &Candidate<'_>,
    _ctx: &ScoreContext<'_>,
    config: &PolicyConfig,
) -> f64 {
    if candidate.finisher {
        score * config.finisher_bonus
    } else {
        score
    }
}

pub(crate) fn ep_conservation_penalty(
    score: f64,
    candidate: &Candidate<'_>,
    _ctx: &ScoreContext<'_>,
    config: &PolicyConfig,
) -> f64 {
    if candidate.finisher {
        return score;
    }
    let mut score = score;
    if candidate.post_ep < config.low_ep_threshold {
        score *= config.low_ep_penalty;
    }
    if candidate.action.is_special() && candidate.post_ep < config.special_ep_threshold {
        score *= config.special_ep_penalty;
    }
    score
}

pub(crate) fn linear_cost_penalty(
    score: f64,
    candidate: &Candidate<'_>,
    _ctx: &ScoreContext<'_>,
    config: &PolicyConfig,
) -> f64 {
    score - candidate.action.ep_cost as f64 * config.cost_penalty
}

pub(crate) fn conservation_reward(
    score: f64,
    candidate: &Candidate<'_>,
    _ctx: &ScoreContext<'_>,
    config: &PolicyConfig,
) -> f64 {
    score + (candidate.post_ep - config.conserve_floor).max(0.0) * config.conserve_reward
}

pub(crate) fn efficiency_bonus(
    score: f64,
    candidate: &Candidate<'_>,
    ctx: &ScoreContext<'_>,
    config: &PolicyConfig,
) -> f64 {
    let per_ep = score / (candidate.action.ep_cost as f64).max(1.0);
    let weight = if ctx.opponent_ep < config.efficiency_ep_threshold {
        config.efficiency_weight_low_ep
    } else {
        config.efficiency_weight
    };
    score + per_ep * weight
}

pub(crate) fn cheaper_finisher_discount(
    score: f64,
    candidate: &Candidate<'_>,
    ctx: &ScoreContext<'_>,
    config: &PolicyConfig,
) -> f64 {
    let cheaper_exists = ctx
        .cheapest_finisher_cost
        .is_some_and(|cost| cost < candidate.action.ep_cost);
    if candidate.finisher && candidate.action.is_special() && cheaper_exists {
        score * config.cheaper_finisher_discount
    } else {
        score
    }
}

pub(crate) fn anti_repetition(
    score: f64,
    candidate: &Candidate<'_>,
    ctx: &ScoreContext<'_>,
    config: &PolicyConfig,
) -> f64 {
    if !candidate.finisher && ctx.last_action == Some(candidate.action.id.as_str()) {
        score * config.repeat_penalty
    } else {
        score
    }
}

pub(crate) fn risk_penalty(
    score: f64,
    candidate: &Candidate<'_>,
    ctx: &ScoreContext<'_>,
    config: &PolicyConfig,
) -> f64 {
    let risky = candidate.post_ep < config.risk_ep_threshold
        && ctx.player_threat > ctx.opponent_max_hp * config.risk_damage_ratio;
    if risky && !candidate.finisher {
        score * config.risk_penalty
    } else {
        score
    }
}

pub(crate) fn threat_amplifier(
    score: f64,
    _candidate: &Candidate<'_>,
    ctx: &ScoreContext<'_>,
    config: &PolicyConfig,
) -> f64 {
    if ctx.player_threat >= ctx.opponent_hp * config.threat_ratio {
        score * config.threat_bonus
    } else {
        score
    }
}

/// Chooses the opponent's move each opponent turn.
#[derive(Debug, Clone, Default)]
pub struct OpponentPolicy {
    config: PolicyConfig,
}

impl OpponentPolicy {
    pub fn new(config: PolicyConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PolicyConfig {
        &self.config
    }

    /// Scores every eligible action and picks one, or rest.
    ///
    /// Draws exactly one jitter value per candidate, in catalog order, so a seeded
    /// generator makes the choice reproducible.
    pub fn decide<R: Rng + ?Sized>(&self, input: &PolicyInput<'_>, rng: &mut R) -> PolicyDecision {
        let candidates = self.candidates(input);
        if candidates.is_empty() {
            return PolicyDecision {
                choice: TurnChoice::Rest,
                evaluation: None,
                candidates: Vec::new(),
                rest_reason: Some(RestReason::NoCandidates),
            };
        }

        let ctx = self.context(input, &candidates);
        let mut scored = Vec::with_capacity(candidates.len());
        let mut best: Option<(usize, f64)> = None;

        for (index, candidate) in candidates.iter().enumerate() {
            let score = self.score(candidate, &ctx) * self.jitter(rng);
            if best.map_or(true, |(_, best_score)| score > best_score) {
                best = Some((index, score));
            }
            scored.push(CandidateScore {
                action: candidate.action.id.clone(),
                score,
                finisher: candidate.finisher,
            });
        }

        let (best_index, best_score) = match best {
            Some(best) => best,
            None => (0, f64::NEG_INFINITY),
        };

        let rest_reason = self.rest_override(input.opponent.ep, best_score);
        let choice = if rest_reason.is_some() {
            TurnChoice::Rest
        } else {
            TurnChoice::attack(candidates[best_index].action.id.clone())
        };

        PolicyDecision {
            choice,
            evaluation: Some(best_score),
            candidates: scored,
            rest_reason,
        }
    }

    /// Score of one candidate before jitter.
    pub(crate) fn score(&self, candidate: &Candidate<'_>, ctx: &ScoreContext<'_>) -> f64 {
        SCORE_PIPELINE
            .iter()
            .fold(expected_damage(candidate), |score, (name, step)| {
                let adjusted = step(score, candidate, ctx, &self.config);
                trace!(
                    "{} {name}: {score:.3} -> {adjusted:.3}",
                    candidate.action.id
                );
                adjusted
            })
    }

    fn candidates<'a>(&self, input: &PolicyInput<'a>) -> Vec<Candidate<'a>> {
        let player_hp = input.player.hp as f64;
        input
            .catalog
            .affordable(input.opponent.ep)
            .filter(|action| CooldownTracker::is_available(input.opponent, &action.id))
            .map(|action| {
                let raw_base = action.base_damage as f64 * input.opponent_multiplier;
                Candidate {
                    action,
                    raw_base,
                    hit: action.hit_chance.max(self.config.min_hit_chance),
                    post_ep: input.opponent.ep.saturating_sub(action.ep_cost) as f64,
                    finisher: raw_base >= player_hp * self.config.finisher_ratio,
                }
            })
            .collect()
    }

    fn context<'a>(
        &self,
        input: &PolicyInput<'a>,
        candidates: &[Candidate<'_>],
    ) -> ScoreContext<'a> {
        let player_threat = input
            .catalog
            .affordable(input.player.ep)
            .map(|action| {
                action.base_damage as f64
                    * input.player_multiplier
                    * action.hit_chance.max(self.config.min_hit_chance)
            })
            .fold(0.0, f64::max);

        ScoreContext {
            player_hp: input.player.hp as f64,
            player_hp_pct: input.player.hp_percent(),
            opponent_ep: input.opponent.ep as f64,
            opponent_hp: input.opponent.hp as f64,
            opponent_max_hp: input.opponent.max_hp as f64,
            player_threat,
            cheapest_finisher_cost: candidates
                .iter()
                .filter(|candidate| candidate.finisher)
                .map(|candidate| candidate.action.ep_cost)
                .min(),
            last_action: input.last_action,
        }
    }

    fn jitter<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        let span = self.config.jitter_max - self.config.jitter_min;
        self.config.jitter_min + rng.gen::<f64>() * span
    }

    fn rest_override(&self, opponent_ep: u32, best_score: f64) -> Option<RestReason> {
        if opponent_ep < self.config.exhausted_ep {
            Some(RestReason::Exhausted)
        } else if best_score < self.config.rest_score_floor
            && opponent_ep < self.config.rest_ep_ceiling
        {
            Some(RestReason::Unprofitable)
        } else {
            None
        }
    }
}
