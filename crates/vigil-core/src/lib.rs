//! # vigil-core
//!
//! Core types, events, and error types for the Vigil agent governance engine.
//! This crate defines the shared vocabulary used by every other crate in the workspace.

pub mod error;
pub mod event;
pub mod tier;
pub mod types;

pub use error::{Result, VigilError};
pub use event::{EventBus, GovernanceEvent};
pub use tier::Tier;
pub use types::*;
