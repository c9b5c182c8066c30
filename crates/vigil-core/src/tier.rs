use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::VigilError;

/// Four trust tiers an agent progresses through as it accumulates supervised
/// experience:
///
/// - **Student**: trivial actions only, everything is a learning opportunity.
/// - **Intern**: low-complexity actions under close supervision.
/// - **Supervised**: most actions, with a human watching the outcomes.
/// - **Autonomous**: irreversible, high-blast-radius actions without review.
///
/// Promotion is strictly forward and one step at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum Tier {
    Student = 0,
    Intern = 1,
    Supervised = 2,
    Autonomous = 3,
}

impl Tier {
    pub const ALL: [Tier; 4] = [
        Tier::Student,
        Tier::Intern,
        Tier::Supervised,
        Tier::Autonomous,
    ];

    /// Out-of-range values are rejected, never coerced to a default tier.
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(Self::Student),
            1 => Some(Self::Intern),
            2 => Some(Self::Supervised),
            3 => Some(Self::Autonomous),
            _ => None,
        }
    }

    /// The only tier this one may graduate to.
    pub fn next(&self) -> Option<Self> {
        match self {
            Self::Student => Some(Self::Intern),
            Self::Intern => Some(Self::Supervised),
            Self::Supervised => Some(Self::Autonomous),
            Self::Autonomous => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Student => "student",
            Self::Intern => "intern",
            Self::Supervised => "supervised",
            Self::Autonomous => "autonomous",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Student => "Student",
            Self::Intern => "Intern",
            Self::Supervised => "Supervised",
            Self::Autonomous => "Autonomous",
        };
        write!(f, "T{} ({})", *self as u8, name)
    }
}

impl FromStr for Tier {
    type Err = VigilError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "student" => Ok(Self::Student),
            "intern" => Ok(Self::Intern),
            "supervised" => Ok(Self::Supervised),
            "autonomous" => Ok(Self::Autonomous),
            _ => Err(VigilError::UnknownTier(s.to_string())),
        }
    }
}
