pub mod ai;
pub mod game;

use std::cell::RefCell;
use std::rc::Rc;

use gloo_timers::future::TimeoutFuture;
use rand::rngs::SmallRng;
use rand::SeedableRng;
use serde::Serialize;
use serde_wasm_bindgen::{from_value, to_value};
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::future_to_promise;
use web_sys::js_sys::Promise;

pub use ai::{
    CandidateScore, OpponentPolicy, PolicyConfig, PolicyDecision, PolicyInput, RestReason,
};
pub use game::{
    ActionCatalog, ActionDefinition, ActionId, ActionKind, BattleConfig, BattleError, BattleEvent,
    BattleOutcome, BattleOutcomeEvaluator, BattleResult, BattleResultKind, BattleSession,
    CombatantState, CooldownTracker, CritConfig, DamageResolver, DamageRoll, OutcomeRewards,
    SessionLedger, Side, SideConfig, StepReport, TurnChoice, TurnEngine, TurnPhase, TurnReport,
};

#[cfg(all(feature = "wee_alloc", target_arch = "wasm32"))]
#[global_allocator]
static ALLOC: wee_alloc::WeeAlloc = wee_alloc::WeeAlloc::INIT;

#[wasm_bindgen(start)]
pub fn start() {
    set_panic_hook();
    let _ = console_log::init_with_level(log::Level::Debug);
}

fn to_js_error(error: BattleError) -> JsValue {
    to_value(&error).unwrap_or_else(|serialize_err| JsValue::from_str(&serialize_err.to_string()))
}

fn serde_to_js_error<E: std::fmt::Display>(error: E) -> JsValue {
    JsValue::from_str(&error.to_string())
}

fn to_json<T: Serialize>(value: &T) -> Result<String, JsValue> {
    serde_json::to_string(value).map_err(serde_to_js_error)
}

fn config_from_js(config: JsValue) -> Result<BattleConfig, JsValue> {
    if config.is_undefined() || config.is_null() {
        return Ok(BattleConfig::default());
    }
    let config: BattleConfig = from_value(config).map_err(JsValue::from)?;
    config.validate().map_err(to_js_error)?;
    Ok(config)
}

fn make_rng(seed: Option<u32>) -> SmallRng {
    match seed {
        Some(seed) => SmallRng::seed_from_u64(u64::from(seed)),
        None => SmallRng::from_entropy(),
    }
}

#[derive(Serialize)]
struct OpponentReply {
    decision: PolicyDecision,
    step: StepReport,
}

struct Inner {
    engine: TurnEngine,
    session: BattleSession,
    ledger: SessionLedger,
    rng: SmallRng,
}

impl Inner {
    /// Folds a freshly finished battle into the running ledger.
    fn settle(&mut self, outcome: Option<BattleOutcome>) {
        if let Some(outcome) = outcome {
            self.ledger.apply(&outcome);
        }
    }

    fn opponent_reply(&mut self) -> Result<OpponentReply, JsValue> {
        let (decision, step) = self
            .engine
            .opponent_turn(&mut self.session, &mut self.rng)
            .map_err(to_js_error)?;
        self.settle(step.outcome);
        Ok(OpponentReply { decision, step })
    }
}

/// One battle plus the ledger of every battle fought through this handle.
#[wasm_bindgen]
pub struct BattleEngine {
    inner: Rc<RefCell<Inner>>,
}

impl BattleEngine {
    fn with_inner<T>(
        &self,
        f: impl FnOnce(&mut Inner) -> Result<T, JsValue>,
    ) -> Result<T, JsValue> {
        let mut inner = self
            .inner
            .try_borrow_mut()
            .map_err(|_| JsValue::from_str("battle engine is busy resolving a turn"))?;
        f(&mut *inner)
    }
}

#[wasm_bindgen]
impl BattleEngine {
    #[wasm_bindgen(constructor)]
    pub fn new(config_json: Option<String>, seed: Option<u32>) -> Result<BattleEngine, JsValue> {
        let config = match config_json {
            Some(json) => BattleConfig::from_json(&json).map_err(to_js_error)?,
            None => BattleConfig::default(),
        };
        let engine = TurnEngine::new(config).map_err(to_js_error)?;
        let session = engine.new_session();
        Ok(BattleEngine {
            inner: Rc::new(RefCell::new(Inner {
                engine,
                session,
                ledger: SessionLedger::new(),
                rng: make_rng(seed),
            })),
        })
    }

    pub fn state_json(&self) -> Result<String, JsValue> {
        self.with_inner(|inner| to_json(&inner.session))
    }

    pub fn set_state_json(&mut self, json: &str) -> Result<(), JsValue> {
        let session: BattleSession = serde_json::from_str(json).map_err(serde_to_js_error)?;
        self.with_inner(|inner| {
            session
                .integrity_check(&inner.engine.config().catalog)
                .map_err(to_js_error)?;
            inner.session = session;
            Ok(())
        })
    }

    pub fn config_json(&self) -> Result<String, JsValue> {
        self.with_inner(|inner| inner.engine.config().to_json().map_err(to_js_error))
    }

    pub fn ledger_json(&self) -> Result<String, JsValue> {
        self.with_inner(|inner| to_json(&inner.ledger))
    }

    pub fn available_actions_json(&self, side: Option<String>) -> Result<String, JsValue> {
        let side = match side.as_deref() {
            None | Some("player") => Side::Player,
            Some("opponent") => Side::Opponent,
            Some(other) => return Err(JsValue::from_str(&format!("unknown side `{other}`"))),
        };
        self.with_inner(|inner| to_json(&inner.engine.available_actions(&inner.session, side)))
    }

    /// Resolves the player's choice and the opponent's reply in one call.
    pub fn submit_json(&mut self, choice: &str) -> Result<String, JsValue> {
        let choice: TurnChoice = choice.parse().map_err(to_js_error)?;
        self.with_inner(|inner| {
            let report = inner
                .engine
                .submit(&mut inner.session, &choice, &mut inner.rng)
                .map_err(to_js_error)?;
            inner.settle(report.outcome);
            to_json(&report)
        })
    }

    /// Resolves only the player's half; pair with `opponent_turn` for a paced reply.
    pub fn player_turn_json(&mut self, choice: &str) -> Result<String, JsValue> {
        let choice: TurnChoice = choice.parse().map_err(to_js_error)?;
        self.with_inner(|inner| {
            let step = inner
                .engine
                .player_turn(&mut inner.session, &choice, &mut inner.rng)
                .map_err(to_js_error)?;
            inner.settle(step.outcome);
            to_json(&step)
        })
    }

    /// Waits `delay_ms` (or the configured reply delay) before the opponent acts.
    pub fn opponent_turn(&self, delay_ms: Option<u32>) -> Promise {
        let inner = Rc::clone(&self.inner);
        let delay = delay_ms.unwrap_or_else(|| {
            inner
                .try_borrow()
                .map(|inner| inner.engine.config().reply_delay_ms)
                .unwrap_or(0)
        });

        future_to_promise(async move {
            if delay > 0 {
                TimeoutFuture::new(delay).await;
            }
            let mut inner = inner
                .try_borrow_mut()
                .map_err(|_| JsValue::from_str("battle engine is busy resolving a turn"))?;
            let reply = inner.opponent_reply()?;
            Ok(JsValue::from_str(&to_json(&reply)?))
        })
    }

    pub fn reset(&mut self) -> Result<String, JsValue> {
        self.with_inner(|inner| {
            inner.engine.reset(&mut inner.session);
            to_json(&inner.session)
        })
    }
}

/// Fresh session for the given config (defaults when omitted).
#[wasm_bindgen(js_name = "createBattleSession")]
pub fn create_battle_session(config: JsValue) -> Result<JsValue, JsValue> {
    let config = config_from_js(config)?;
    to_value(&BattleSession::new(&config)).map_err(JsValue::from)
}

#[wasm_bindgen(js_name = "defaultConfig")]
pub fn default_config() -> Result<JsValue, JsValue> {
    to_value(&BattleConfig::default()).map_err(JsValue::from)
}

#[wasm_bindgen(js_name = "validateSession")]
pub fn validate_session(session: JsValue, config: JsValue) -> Result<(), JsValue> {
    let session: BattleSession = from_value(session).map_err(JsValue::from)?;
    let config = config_from_js(config)?;
    session.integrity_check(&config.catalog).map_err(to_js_error)
}

/// What the opponent would do from this session, without applying it.
#[wasm_bindgen(js_name = "previewOpponentChoice")]
pub fn preview_opponent_choice(
    session: JsValue,
    config: JsValue,
    seed: Option<u32>,
) -> Result<JsValue, JsValue> {
    let session: BattleSession = from_value(session).map_err(JsValue::from)?;
    let config = config_from_js(config)?;
    session.integrity_check(&config.catalog).map_err(to_js_error)?;
    let policy = OpponentPolicy::new(config.policy.clone());
    let input = PolicyInput::from_session(&session, &config);
    let decision = policy.decide(&input, &mut make_rng(seed));
    to_value(&decision).map_err(JsValue::from)
}

#[cfg(feature = "console_error_panic_hook")]
fn set_panic_hook() {
    console_error_panic_hook::set_once();
}

#[cfg(not(feature = "console_error_panic_hook"))]
fn set_panic_hook() {}
