// ABOUTME: Deployment environment identifiers and their roles.
// ABOUTME: The environment set is closed: staging, blue, green.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ParseEnvIdError {
    #[error("unknown environment: {0} (expected staging, blue, or green)")]
    Unknown(String),
}

/// One of the three deployable targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnvId {
    Staging,
    Blue,
    Green,
}

/// What an environment is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EnvRole {
    /// Throwaway verification target for development-line builds.
    EphemeralCi,
    /// Isolated lane hosting the next release candidate.
    ReleaseCandidate,
    /// The slot eligible to receive live traffic.
    Live,
}

impl EnvId {
    pub const ALL: [EnvId; 3] = [EnvId::Staging, EnvId::Blue, EnvId::Green];

    pub fn as_str(&self) -> &'static str {
        match self {
            EnvId::Staging => "staging",
            EnvId::Blue => "blue",
            EnvId::Green => "green",
        }
    }

    pub fn role(&self) -> EnvRole {
        match self {
            EnvId::Staging => EnvRole::EphemeralCi,
            EnvId::Blue => EnvRole::ReleaseCandidate,
            EnvId::Green => EnvRole::Live,
        }
    }

    /// Whether this environment is half of the blue/green pair.
    pub fn in_live_pair(&self) -> bool {
        matches!(self, EnvId::Blue | EnvId::Green)
    }

    /// The other half of the blue/green pair. None for staging.
    pub fn pair_peer(&self) -> Option<EnvId> {
        match self {
            EnvId::Blue => Some(EnvId::Green),
            EnvId::Green => Some(EnvId::Blue),
            EnvId::Staging => None,
        }
    }
}

impl FromStr for EnvId {
    type Err = ParseEnvIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "staging" => Ok(EnvId::Staging),
            "blue" => Ok(EnvId::Blue),
            "green" => Ok(EnvId::Green),
            other => Err(ParseEnvIdError::Unknown(other.to_string())),
        }
    }
}

impl fmt::Display for EnvId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
