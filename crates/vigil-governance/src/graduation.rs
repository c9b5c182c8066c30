use chrono::{DateTime, Utc};
use vigil_core::{
    AgentSnapshot, ComponentScores, GraduationBlocker, GraduationCriteria, GraduationResult, Tier,
};

/// Weights in percentage points; they sum to exactly 100.
const EPISODE_WEIGHT: f64 = 40.0;
const INTERVENTION_WEIGHT: f64 = 30.0;
const BEHAVIOR_WEIGHT: f64 = 30.0;

/// Scores graduation readiness. Stateless: promotion itself (tier update and
/// cache invalidation) belongs to the service.
#[derive(Debug, Clone, Copy, Default)]
pub struct GraduationEvaluator;

impl GraduationEvaluator {
    pub fn new() -> Self {
        Self
    }

    /// Each component is clamped to [0, 1] before weighting, so the readiness
    /// score stays in [0, 100] for every input. Nothing is rounded.
    pub fn component_scores(
        &self,
        snapshot: &AgentSnapshot,
        criteria: &GraduationCriteria,
    ) -> ComponentScores {
        let required = criteria.min_episodes.max(1) as f64;
        let episode = unit(snapshot.episode_count as f64 / required);

        let rate = snapshot.effective_intervention_rate();
        let ceiling = if criteria.max_intervention_rate >= f64::EPSILON {
            criteria.max_intervention_rate
        } else {
            f64::EPSILON
        };
        let intervention = unit(1.0 - rate / ceiling);

        let behavior = unit(snapshot.behavior_score);

        ComponentScores {
            episode,
            intervention,
            behavior,
        }
    }

    pub fn readiness(&self, scores: &ComponentScores) -> f64 {
        let weighted = scores.episode * EPISODE_WEIGHT
            + scores.intervention * INTERVENTION_WEIGHT
            + scores.behavior * BEHAVIOR_WEIGHT;
        weighted.clamp(0.0, 100.0)
    }

    pub fn evaluate(
        &self,
        snapshot: &AgentSnapshot,
        target_tier: Tier,
        criteria: &GraduationCriteria,
        now: DateTime<Utc>,
    ) -> GraduationResult {
        let component_scores = self.component_scores(snapshot, criteria);
        let readiness_score = self.readiness(&component_scores);

        let mut blockers = Vec::new();
        if !(readiness_score >= criteria.promotion_threshold) {
            blockers.push(GraduationBlocker::ReadinessBelowThreshold);
        }
        if let Some(min) = criteria.min_behavior_score {
            // Raw comparison: 0.6999 must not pass a 0.70 gate.
            if !(snapshot.behavior_score >= min) {
                blockers.push(GraduationBlocker::BehaviorBelowMinimum);
            }
        }

        GraduationResult {
            agent_id: snapshot.agent_id.clone(),
            current_tier: snapshot.tier,
            target_tier,
            readiness_score,
            component_scores,
            promote: blockers.is_empty(),
            blockers,
            evaluated_at: now,
        }
    }
}

/// Clamp to [0, 1]; NaN counts as the worst score.
fn unit(v: f64) -> f64 {
    if v.is_nan() { 0.0 } else { v.clamp(0.0, 1.0) }
}
