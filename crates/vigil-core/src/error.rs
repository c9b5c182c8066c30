use thiserror::Error;

use crate::tier::Tier;

/// Unified error type for the Vigil governance engine.
///
/// Routine denials are not errors: they come back as a [`crate::Decision`]
/// with `allowed == false`. These variants cover caller mistakes and internal
/// invariant violations.
#[derive(Error, Debug)]
pub enum VigilError {
    // ── Caller errors ──────────────────────────────────────────
    #[error("unknown agent: {0:?}")]
    UnknownAgent(String),

    #[error("unknown tier: {0:?}")]
    UnknownTier(String),

    #[error("invalid tier transition: {from} -> {to}")]
    InvalidTransition { from: Tier, to: Tier },

    #[error("no promotion path beyond {0}")]
    NoPromotionPath(Tier),

    #[error("no graduation criteria configured for {0}")]
    MissingCriteria(Tier),

    #[error("confidence {confidence} is outside the bound for {tier}")]
    InvalidConfidence { tier: Tier, confidence: f64 },

    // ── Cache errors ───────────────────────────────────────────
    #[error("cache corruption: {0}")]
    CacheCorruption(String),

    // ── Config errors ──────────────────────────────────────────
    #[error("config error: {0}")]
    Config(String),

    // ── I/O ────────────────────────────────────────────────────
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, VigilError>;
