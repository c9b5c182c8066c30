use dashmap::DashMap;
use std::borrow::Cow;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;
use vigil_config::{GovernanceConfig, GraduationConfig};
use vigil_core::{
    ActionDescriptor, AgentId, AgentSnapshot, Decision, DecisionReason, EventBus, GovernanceEvent,
    GraduationCriteria, GraduationResult, Tier, VigilError,
};

use crate::cache::{CacheKey, CacheStats, GovernanceCache};
use crate::clock::{Clock, SystemClock};
use crate::confidence::ConfidenceScorer;
use crate::graduation::GraduationEvaluator;
use crate::locks::AgentLocks;
use crate::normalize;
use crate::permission::{PermissionGate, PermissionPolicy};

/// Façade over the scorer, gate, evaluator, and cache. The only component
/// that changes an agent's tier.
pub struct GovernanceService {
    scorer: ConfidenceScorer,
    policy: Arc<dyn PermissionPolicy>,
    evaluator: GraduationEvaluator,
    graduation: GraduationConfig,
    cache: Arc<GovernanceCache>,
    ttl: Duration,
    locks: AgentLocks,
    /// Tiers this engine promoted agents to that the external store has not
    /// reported back yet.
    ledger: DashMap<AgentId, Tier>,
    clock: Arc<dyn Clock>,
    events: EventBus,
}

/// Wires a [`GovernanceService`] from config plus optional injected parts.
pub struct GovernanceServiceBuilder {
    config: GovernanceConfig,
    clock: Option<Arc<dyn Clock>>,
    policy: Option<Arc<dyn PermissionPolicy>>,
    cache: Option<Arc<GovernanceCache>>,
    events: Option<EventBus>,
}

impl GovernanceServiceBuilder {
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Replace the built-in [`PermissionGate`].
    pub fn with_policy(mut self, policy: Arc<dyn PermissionPolicy>) -> Self {
        self.policy = Some(policy);
        self
    }

    /// Share an externally owned cache.
    pub fn with_cache(mut self, cache: Arc<GovernanceCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_event_bus(mut self, events: EventBus) -> Self {
        self.events = Some(events);
        self
    }

    pub fn build(self) -> vigil_core::Result<GovernanceService> {
        let config = self.config;
        for w in config.validate().map_err(VigilError::Config)? {
            warn!("{}", w);
        }

        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock) as Arc<dyn Clock>);
        let policy = self.policy.unwrap_or_else(|| {
            Arc::new(PermissionGate::new(config.permission.clone())) as Arc<dyn PermissionPolicy>
        });
        let cache = self
            .cache
            .unwrap_or_else(|| Arc::new(GovernanceCache::new(&config.cache, Arc::clone(&clock))));
        let events = self.events.unwrap_or_else(|| EventBus::new(config.events.capacity));

        info!(
            policy = policy.name(),
            capacity = cache.capacity(),
            ttl_secs = config.cache.ttl_secs,
            "governance service ready"
        );

        Ok(GovernanceService {
            scorer: ConfidenceScorer::new(config.confidence.clone()),
            policy,
            evaluator: GraduationEvaluator::new(),
            graduation: config.graduation.clone(),
            ttl: config.cache.ttl(),
            locks: AgentLocks::new(config.cache.shards),
            ledger: DashMap::new(),
            cache,
            clock,
            events,
        })
    }
}

impl GovernanceService {
    pub fn builder(config: GovernanceConfig) -> GovernanceServiceBuilder {
        GovernanceServiceBuilder {
            config,
            clock: None,
            policy: None,
            cache: None,
            events: None,
        }
    }

    pub fn new(config: GovernanceConfig) -> vigil_core::Result<Self> {
        Self::builder(config).build()
    }

    pub fn cache(&self) -> &Arc<GovernanceCache> {
        &self.cache
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Allow or deny one action. Denials are `Ok` decisions; only a snapshot
    /// without an agent id is an error.
    pub fn check_permission(
        &self,
        snapshot: &AgentSnapshot,
        action: &ActionDescriptor,
    ) -> vigil_core::Result<Decision> {
        snapshot.validate()?;
        let agent = normalize(&snapshot.agent_id);
        let _order = self.locks.read(&agent);
        let tier = self.effective_tier(&agent, snapshot.tier);

        let check = self.scorer.validate(snapshot.tier, snapshot.confidence);
        if !check.ok {
            warn!(
                agent = %snapshot.agent_id,
                tier = %snapshot.tier,
                confidence = snapshot.confidence,
                clamped = check.clamped,
                "confidence outside tier bound, flagging for review"
            );
            self.events.publish(GovernanceEvent::ConfidenceFlagged {
                event_id: Uuid::new_v4(),
                agent_id: snapshot.agent_id.clone(),
                tier: snapshot.tier,
                confidence: snapshot.confidence,
                clamped: check.clamped,
            });
            // Not cached: the next call re-validates.
            let decision =
                Decision::deny(DecisionReason::InsufficientTier, self.clock.now()).flagged();
            self.publish_decision(snapshot, action, tier, &decision, false);
            return Ok(decision);
        }

        let view = if tier == snapshot.tier {
            Cow::Borrowed(snapshot)
        } else {
            Cow::Owned(AgentSnapshot {
                tier,
                ..snapshot.clone()
            })
        };
        let key = CacheKey::new(&agent, &action.action_type, action.complexity, tier);
        let (decision, lookup) = self.cache.get_or_compute(key, self.ttl, || {
            self.policy.check(&view, action, self.clock.now())
        });

        debug!(
            agent = %snapshot.agent_id,
            action = %action.action_type,
            allowed = decision.allowed,
            reason = %decision.reason,
            ?lookup,
            "permission decided"
        );
        self.publish_decision(snapshot, action, tier, &decision, lookup.is_cached());
        Ok(decision)
    }

    /// Evaluate the agent against the configured criteria of its next tier and
    /// promote it on success.
    pub fn evaluate_graduation(
        &self,
        snapshot: &AgentSnapshot,
    ) -> vigil_core::Result<GraduationResult> {
        snapshot.validate()?;
        let current = self.effective_tier(&normalize(&snapshot.agent_id), snapshot.tier);
        let target = current.next().ok_or(VigilError::NoPromotionPath(current))?;
        let criteria = self
            .graduation
            .criteria_for(target)
            .ok_or(VigilError::MissingCriteria(target))?;
        self.evaluate_graduation_with(snapshot, target, criteria)
    }

    /// Evaluate against explicit criteria. `target_tier` must be the agent's
    /// next tier; skipping a tier is rejected.
    pub fn evaluate_graduation_with(
        &self,
        snapshot: &AgentSnapshot,
        target_tier: Tier,
        criteria: &GraduationCriteria,
    ) -> vigil_core::Result<GraduationResult> {
        snapshot.validate()?;
        let agent = normalize(&snapshot.agent_id);
        let current = self.effective_tier(&agent, snapshot.tier);
        if current.next() != Some(target_tier) {
            return Err(VigilError::InvalidTransition {
                from: current,
                to: target_tier,
            });
        }

        let view = AgentSnapshot {
            tier: current,
            ..snapshot.clone()
        };
        let result = self
            .evaluator
            .evaluate(&view, target_tier, criteria, self.clock.now());

        info!(
            agent = %snapshot.agent_id,
            from = %current,
            to = %target_tier,
            readiness = result.readiness_score,
            episode = result.component_scores.episode,
            intervention = result.component_scores.intervention,
            behavior = result.component_scores.behavior,
            promote = result.promote,
            "graduation evaluated"
        );
        self.events.publish(GovernanceEvent::GraduationEvaluated {
            event_id: Uuid::new_v4(),
            agent_id: snapshot.agent_id.clone(),
            current_tier: current,
            target_tier,
            readiness_score: result.readiness_score,
            component_scores: result.component_scores,
            promote: result.promote,
            evaluated_at: result.evaluated_at,
        });

        if result.promote {
            self.promote(&agent, &snapshot.agent_id, current, target_tier);
        }
        Ok(result)
    }

    /// Drop every cached decision of the agent and forget any tier this engine
    /// recorded for it. External demotion flows must call this.
    pub fn invalidate_agent(&self, agent_id: &str) -> vigil_core::Result<usize> {
        let agent = normalize(agent_id);
        if agent.is_empty() {
            return Err(VigilError::UnknownAgent(agent_id.to_string()));
        }
        let _order = self.locks.write(&agent);
        self.ledger.remove(&agent);
        let removed = self.cache.invalidate_agent(&agent);
        info!(agent = %agent_id, removed, "agent invalidated");
        self.events.publish(GovernanceEvent::AgentInvalidated {
            event_id: Uuid::new_v4(),
            agent_id: agent_id.to_string(),
            entries_removed: removed,
        });
        Ok(removed)
    }

    /// The tier this engine promoted the agent to, while the external store
    /// has not caught up.
    pub fn recorded_tier(&self, agent_id: &str) -> vigil_core::Result<Tier> {
        self.ledger
            .get(&normalize(agent_id))
            .map(|tier| *tier)
            .ok_or_else(|| VigilError::UnknownAgent(agent_id.to_string()))
    }

    /// Record the new tier, then invalidate, both under the agent's write lock.
    fn promote(&self, agent: &str, agent_id: &str, from: Tier, to: Tier) {
        let _order = self.locks.write(agent);
        let current = self.effective_tier(agent, from);
        if current != from {
            debug!(agent = %agent_id, %current, "agent already moved past {}, skipping", from);
            return;
        }

        self.ledger.insert(agent.to_string(), to);
        let removed = self.cache.invalidate_agent(agent);

        info!(agent = %agent_id, %from, %to, removed, "agent promoted");
        self.events.publish(GovernanceEvent::AgentPromoted {
            event_id: Uuid::new_v4(),
            agent_id: agent_id.to_string(),
            from,
            to,
            promoted_at: self.clock.now(),
        });
        self.events.publish(GovernanceEvent::AgentInvalidated {
            event_id: Uuid::new_v4(),
            agent_id: agent_id.to_string(),
            entries_removed: removed,
        });
    }

    /// `max(snapshot tier, recorded tier)`. A snapshot that has caught up with
    /// the recorded tier retires the record.
    fn effective_tier(&self, agent: &str, snapshot_tier: Tier) -> Tier {
        let recorded = self.ledger.get(agent).map(|tier| *tier);
        match recorded {
            Some(recorded) if recorded > snapshot_tier => recorded,
            Some(_) => {
                self.ledger.remove_if(agent, |_, recorded| *recorded <= snapshot_tier);
                snapshot_tier
            }
            None => snapshot_tier,
        }
    }

    fn publish_decision(
        &self,
        snapshot: &AgentSnapshot,
        action: &ActionDescriptor,
        tier: Tier,
        decision: &Decision,
        cached: bool,
    ) {
        self.events.publish(GovernanceEvent::PermissionDecided {
            event_id: Uuid::new_v4(),
            agent_id: snapshot.agent_id.clone(),
            action_type: action.action_type.clone(),
            tier,
            allowed: decision.allowed,
            reason: decision.reason,
            cached,
            computed_at: decision.computed_at,
        });
    }
}
