use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use std::sync::Arc;
use tokio::sync::broadcast;

use crate::tier::Tier;
use crate::types::{ComponentScores, DecisionReason};

/// Audit events emitted for every decision and graduation result. Persisting
/// or formatting them is the subscriber's concern.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GovernanceEvent {
    // ── Permission lifecycle ───────────────────────────────────
    PermissionDecided {
        event_id: Uuid,
        agent_id: String,
        action_type: String,
        tier: Tier,
        allowed: bool,
        reason: DecisionReason,
        /// Served from the cache rather than recomputed.
        cached: bool,
        computed_at: DateTime<Utc>,
    },
    ConfidenceFlagged {
        event_id: Uuid,
        agent_id: String,
        tier: Tier,
        confidence: f64,
        clamped: f64,
    },

    // ── Graduation lifecycle ───────────────────────────────────
    GraduationEvaluated {
        event_id: Uuid,
        agent_id: String,
        current_tier: Tier,
        target_tier: Tier,
        readiness_score: f64,
        component_scores: ComponentScores,
        promote: bool,
        evaluated_at: DateTime<Utc>,
    },
    AgentPromoted {
        event_id: Uuid,
        agent_id: String,
        from: Tier,
        to: Tier,
        promoted_at: DateTime<Utc>,
    },

    // ── Cache lifecycle ────────────────────────────────────────
    AgentInvalidated {
        event_id: Uuid,
        agent_id: String,
        entries_removed: usize,
    },
}

impl GovernanceEvent {
    pub fn agent_id(&self) -> &str {
        match self {
            Self::PermissionDecided { agent_id, .. }
            | Self::ConfidenceFlagged { agent_id, .. }
            | Self::GraduationEvaluated { agent_id, .. }
            | Self::AgentPromoted { agent_id, .. }
            | Self::AgentInvalidated { agent_id, .. } => agent_id,
        }
    }
}

/// A broadcast-based event bus for audit subscribers.
#[derive(Clone)]
pub struct EventBus {
    sender: Arc<broadcast::Sender<GovernanceEvent>>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender: Arc::new(sender),
        }
    }

    pub fn publish(&self, event: GovernanceEvent) {
        // Ignore send errors (no subscribers).
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<GovernanceEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(4096)
    }
}
