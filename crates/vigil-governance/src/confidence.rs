use vigil_config::{ConfidenceBound, ConfidenceConfig};
use vigil_core::{Tier, VigilError};

/// Outcome of a confidence validation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConfidenceCheck {
    /// The input when valid, otherwise the nearest bound endpoint.
    pub clamped: f64,
    /// `false` means the snapshot must be flagged for manual review.
    pub ok: bool,
}

/// Validates a caller-supplied confidence against the bound of the
/// caller-supplied tier. Never infers a tier from the confidence value.
#[derive(Debug, Clone, Default)]
pub struct ConfidenceScorer {
    bounds: ConfidenceConfig,
}

impl ConfidenceScorer {
    pub fn new(bounds: ConfidenceConfig) -> Self {
        Self { bounds }
    }

    pub fn bound(&self, tier: Tier) -> ConfidenceBound {
        self.bounds.bound(tier)
    }

    pub fn validate(&self, tier: Tier, confidence: f64) -> ConfidenceCheck {
        let bound = self.bounds.bound(tier);
        if bound.contains(confidence) {
            return ConfidenceCheck {
                clamped: confidence,
                ok: true,
            };
        }
        // NaN fails `contains` and lands on the minimum.
        let clamped = if confidence > bound.max {
            bound.max
        } else {
            bound.min
        };
        ConfidenceCheck { clamped, ok: false }
    }

    /// Like [`validate`](Self::validate) but surfaces an out-of-bound value as an error.
    pub fn ensure(&self, tier: Tier, confidence: f64) -> vigil_core::Result<f64> {
        let check = self.validate(tier, confidence);
        if check.ok {
            Ok(check.clamped)
        } else {
            Err(VigilError::InvalidConfidence { tier, confidence })
        }
    }
}
