use super::state::CombatantState;

/// Per-side cooldown bookkeeping. Counters only ever live in `CombatantState::cooldowns`;
/// an absent entry means the action is ready.
pub struct CooldownTracker;

impl CooldownTracker {
    /// Ready check, independent of EP.
    pub fn is_available(combatant: &CombatantState, action_id: &str) -> bool {
        Self::remaining(combatant, action_id) == 0
    }

    pub fn remaining(combatant: &CombatantState, action_id: &str) -> u8 {
        combatant.cooldowns.get(action_id).copied().unwrap_or(0)
    }

    /// Ticks every counter down once and drops the ones that reach zero.
    pub fn decrement(combatant: &mut CombatantState) {
        combatant.cooldowns.retain(|_, remaining| {
            *remaining = remaining.saturating_sub(1);
            *remaining > 0
        });
    }

    pub fn start(combatant: &mut CombatantState, action_id: &str, turns: u8) {
        if turns == 0 {
            return;
        }
        combatant.cooldowns.insert(action_id.to_string(), turns);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn combatant() -> CombatantState {
        CombatantState::new(100, 50)
    }

    #[test]
    fn fresh_combatant_has_everything_ready() {
        let state = combatant();
        assert!(CooldownTracker::is_available(&state, "special"));
        assert_eq!(CooldownTracker::remaining(&state, "special"), 0);
    }

    #[test]
    fn cooldown_needs_k_decrements() {
        let mut state = combatant();
        CooldownTracker::start(&mut state, "special", 2);
        assert!(!CooldownTracker::is_available(&state, "special"));

        CooldownTracker::decrement(&mut state);
        assert!(!CooldownTracker::is_available(&state, "special"));
        assert_eq!(CooldownTracker::remaining(&state, "special"), 1);

        CooldownTracker::decrement(&mut state);
        assert!(CooldownTracker::is_available(&state, "special"));
        assert!(state.cooldowns.is_empty(), "expired entries are removed");
    }

    #[test]
    fn zero_turn_cooldown_is_a_no_op() {
        let mut state = combatant();
        CooldownTracker::start(&mut state, "basic1", 0);
        assert!(state.cooldowns.is_empty());
    }

    #[test]
    fn decrement_without_cooldowns_is_idempotent() {
        let mut state = combatant();
        for _ in 0..5 {
            CooldownTracker::decrement(&mut state);
        }
        assert!(state.cooldowns.is_empty());
        assert_eq!(state, combatant());
    }

    #[test]
    fn availability_ignores_ep() {
        let mut state = combatant();
        state.ep = 0;
        assert!(CooldownTracker::is_available(&state, "special"));
    }
}
