use chrono::{DateTime, Utc};
use tracing::debug;
use vigil_config::PermissionConfig;
use vigil_core::{ActionDescriptor, AgentSnapshot, Complexity, Decision, DecisionReason};

/// Answers allow/deny for one action by one agent.
///
/// Implementations must be pure given their inputs: no I/O, no hidden state
/// that changes the answer between calls.
pub trait PermissionPolicy: Send + Sync {
    fn name(&self) -> &str;
    fn check(
        &self,
        snapshot: &AgentSnapshot,
        action: &ActionDescriptor,
        now: DateTime<Utc>,
    ) -> Decision;
}

/// The built-in gate: complexity → minimum tier, then the per-tier
/// intervention-rate ceiling.
#[derive(Debug, Clone, Default)]
pub struct PermissionGate {
    config: PermissionConfig,
}

impl PermissionGate {
    pub fn new(config: PermissionConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PermissionConfig {
        &self.config
    }
}

impl PermissionPolicy for PermissionGate {
    fn name(&self) -> &str {
        "permission_gate"
    }

    fn check(
        &self,
        snapshot: &AgentSnapshot,
        action: &ActionDescriptor,
        now: DateTime<Utc>,
    ) -> Decision {
        let Some(min_tier) =
            Complexity::new(action.complexity).and_then(|c| self.config.min_tier_for(c))
        else {
            debug!(
                action = %action.action_type,
                complexity = action.complexity,
                "unknown action complexity"
            );
            return Decision::deny(DecisionReason::UnknownAction, now);
        };

        if snapshot.tier < min_tier {
            debug!(
                agent = %snapshot.agent_id,
                action = %action.action_type,
                tier = %snapshot.tier,
                required = %min_tier,
                "tier below action minimum"
            );
            return Decision::deny(DecisionReason::InsufficientTier, now);
        }

        // Exclusive ceiling: a rate sitting exactly on the limit is too high.
        let rate = snapshot.effective_intervention_rate();
        let over_limit = match self.config.max_intervention_rate.get(snapshot.tier) {
            _ if rate.is_nan() => true,
            Some(limit) => rate >= limit,
            None => false,
        };
        if over_limit {
            debug!(
                agent = %snapshot.agent_id,
                action = %action.action_type,
                rate,
                "intervention rate at or above tier ceiling"
            );
            return Decision::deny(DecisionReason::InterventionRateTooHigh, now);
        }

        Decision::allow(now)
    }
}
