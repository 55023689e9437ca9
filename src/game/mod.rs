//! Battle rules: catalog, combatant state, damage, cooldowns and the turn state machine.

pub mod catalog;
pub mod config;
pub mod cooldowns;
pub mod damage;
pub mod error;
pub mod ledger;
pub mod outcome;
pub mod rules;
pub mod state;

pub use catalog::{ActionCatalog, ActionDefinition, ActionId, ActionKind, TurnChoice, REST_ID};
pub use config::{BattleConfig, CritConfig, SideConfig};
pub use cooldowns::CooldownTracker;
pub use damage::{DamageResolver, DamageRoll};
pub use error::{BattleError, BattleResult};
pub use ledger::SessionLedger;
pub use outcome::{BattleOutcome, BattleOutcomeEvaluator, BattleResultKind, OutcomeRewards};
pub use rules::{StepReport, TurnEngine, TurnReport};
pub use state::{BattleEvent, BattleSession, CombatantState, Side, TurnPhase};
