use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Result, VigilError};
use crate::tier::Tier;

/// Opaque, caller-assigned agent identifier.
pub type AgentId = String;

/// Point-in-time view of an agent, built by the caller for a single call.
///
/// The engine never retains a snapshot beyond the call it was passed to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentSnapshot {
    pub agent_id: AgentId,
    pub tier: Tier,
    /// Expected to lie within the confidence bound of `tier`.
    pub confidence: f64,
    /// Fraction of past actions that needed a human override, nominally in [0, 1].
    pub intervention_rate: f64,
    pub episode_count: u64,
    /// Constitutional / behavior-quality score from episodic memory, nominally in [0, 1].
    pub behavior_score: f64,
}

impl AgentSnapshot {
    pub fn new(agent_id: impl Into<AgentId>, tier: Tier, confidence: f64) -> Self {
        Self {
            agent_id: agent_id.into(),
            tier,
            confidence,
            intervention_rate: 0.0,
            episode_count: 0,
            behavior_score: 0.0,
        }
    }

    pub fn with_intervention_rate(mut self, rate: f64) -> Self {
        self.intervention_rate = rate;
        self
    }

    pub fn with_episodes(mut self, episode_count: u64) -> Self {
        self.episode_count = episode_count;
        self
    }

    pub fn with_behavior_score(mut self, score: f64) -> Self {
        self.behavior_score = score;
        self
    }

    /// Reject snapshots that do not identify an agent.
    pub fn validate(&self) -> Result<()> {
        if self.agent_id.trim().is_empty() {
            return Err(VigilError::UnknownAgent(self.agent_id.clone()));
        }
        Ok(())
    }

    /// Intervention rate with negative input clamped to zero. NaN is passed through
    /// so each consumer can fail closed on it.
    pub fn effective_intervention_rate(&self) -> f64 {
        if self.intervention_rate < 0.0 {
            0.0
        } else {
            self.intervention_rate
        }
    }
}

/// Action complexity, 1 (trivial) through 4 (irreversible / high blast radius).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Complexity(u8);

impl Complexity {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 4;

    pub fn new(level: u8) -> Option<Self> {
        (Self::MIN..=Self::MAX).contains(&level).then_some(Self(level))
    }

    pub fn get(&self) -> u8 {
        self.0
    }
}

impl TryFrom<u8> for Complexity {
    type Error = String;

    fn try_from(v: u8) -> std::result::Result<Self, Self::Error> {
        Self::new(v).ok_or_else(|| {
            format!("complexity {v} is outside {}..={}", Self::MIN, Self::MAX)
        })
    }
}

impl From<Complexity> for u8 {
    fn from(c: Complexity) -> u8 {
        c.0
    }
}

/// What the agent wants to do.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionDescriptor {
    pub action_type: String,
    /// Raw complexity as supplied; values outside 1..=4 are denied as unknown actions.
    pub complexity: u8,
}

impl ActionDescriptor {
    pub fn new(action_type: impl Into<String>, complexity: u8) -> Self {
        Self {
            action_type: action_type.into(),
            complexity,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionReason {
    Ok,
    InsufficientTier,
    InterventionRateTooHigh,
    UnknownAction,
}

impl fmt::Display for DecisionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Ok => "ok",
            Self::InsufficientTier => "insufficient tier",
            Self::InterventionRateTooHigh => "intervention rate too high",
            Self::UnknownAction => "unknown action",
        })
    }
}

/// Allow/deny answer for one action request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub allowed: bool,
    pub reason: DecisionReason,
    pub computed_at: DateTime<Utc>,
    /// The snapshot failed confidence validation and needs a human look.
    #[serde(default)]
    pub requires_review: bool,
}

impl Decision {
    pub fn allow(computed_at: DateTime<Utc>) -> Self {
        Self {
            allowed: true,
            reason: DecisionReason::Ok,
            computed_at,
            requires_review: false,
        }
    }

    pub fn deny(reason: DecisionReason, computed_at: DateTime<Utc>) -> Self {
        Self {
            allowed: false,
            reason,
            computed_at,
            requires_review: false,
        }
    }

    pub fn flagged(mut self) -> Self {
        self.requires_review = true;
        self
    }
}

/// Per-target-tier requirements for graduation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraduationCriteria {
    pub min_episodes: u64,
    pub max_intervention_rate: f64,
    #[serde(default = "default_promotion_threshold")]
    pub promotion_threshold: f64,
    /// Separate constitutional gate, compared against the raw behavior score.
    #[serde(default)]
    pub min_behavior_score: Option<f64>,
}

impl GraduationCriteria {
    pub fn new(min_episodes: u64, max_intervention_rate: f64) -> Self {
        Self {
            min_episodes,
            max_intervention_rate,
            promotion_threshold: default_promotion_threshold(),
            min_behavior_score: None,
        }
    }

    pub fn with_threshold(mut self, promotion_threshold: f64) -> Self {
        self.promotion_threshold = promotion_threshold;
        self
    }

    pub fn with_min_behavior_score(mut self, score: f64) -> Self {
        self.min_behavior_score = Some(score);
        self
    }
}

fn default_promotion_threshold() -> f64 {
    70.0
}

/// Component scores, each already clamped to [0, 1].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ComponentScores {
    pub episode: f64,
    pub intervention: f64,
    pub behavior: f64,
}

/// Why a graduation evaluation did not promote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GraduationBlocker {
    ReadinessBelowThreshold,
    BehaviorBelowMinimum,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraduationResult {
    pub agent_id: AgentId,
    pub current_tier: Tier,
    pub target_tier: Tier,
    /// Weighted readiness in [0, 100].
    pub readiness_score: f64,
    pub component_scores: ComponentScores,
    pub promote: bool,
    #[serde(default)]
    pub blockers: Vec<GraduationBlocker>,
    pub evaluated_at: DateTime<Utc>,
}
