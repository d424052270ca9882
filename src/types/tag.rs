// ABOUTME: Environment-scoped artifact tag parsing and construction.
// ABOUTME: Schemes: staging-<sha>, blue-<version>-<sha>, green-<date>-<sha>.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use super::commit::CommitRef;
use super::env_id::EnvId;

/// Registries cap references at 128 characters.
const MAX_LEN: usize = 128;

#[derive(Debug, Error)]
pub enum ParseTagError {
    #[error("artifact tag cannot be empty")]
    Empty,

    #[error("artifact tag exceeds maximum length of {MAX_LEN} characters")]
    TooLong,

    #[error("artifact tag must start with an environment prefix: {0}")]
    MissingEnvPrefix(String),

    #[error("artifact tag has nothing after the environment prefix: {0}")]
    MissingSuffix(String),

    #[error("invalid character in artifact tag: '{0}'")]
    InvalidChar(char),

    #[error("invalid version component: {0}")]
    InvalidVersion(String),
}

/// A human-readable, environment-scoped label pointing at an immutable
/// digest. Once pushed, never overwritten.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ArtifactTag {
    env: EnvId,
    value: String,
}

impl ArtifactTag {
    /// `staging-<shortsha>`
    pub fn staging(commit: &CommitRef) -> Self {
        Self {
            env: EnvId::Staging,
            value: format!("staging-{}", commit.short()),
        }
    }

    /// `blue-<version>-<shortsha>`
    pub fn blue(version: &str, commit: &CommitRef) -> Result<Self, ParseTagError> {
        if version.is_empty()
            || !version
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '.' || c == '-')
        {
            return Err(ParseTagError::InvalidVersion(version.to_string()));
        }
        let value = format!("blue-{}-{}", version, commit.short());
        if value.len() > MAX_LEN {
            return Err(ParseTagError::TooLong);
        }
        Ok(Self {
            env: EnvId::Blue,
            value,
        })
    }

    /// `green-<yyyy-mm-dd>-<shortsha>`
    pub fn green(date: NaiveDate, commit: &CommitRef) -> Self {
        Self {
            env: EnvId::Green,
            value: format!("green-{}-{}", date.format("%Y-%m-%d"), commit.short()),
        }
    }

    pub fn parse(input: &str) -> Result<Self, ParseTagError> {
        let input = input.trim();
        if input.is_empty() {
            return Err(ParseTagError::Empty);
        }
        if input.len() > MAX_LEN {
            return Err(ParseTagError::TooLong);
        }
        for c in input.chars() {
            if !c.is_ascii_lowercase() && !c.is_ascii_digit() && c != '.' && c != '-' {
                return Err(ParseTagError::InvalidChar(c));
            }
        }
        let env = EnvId::ALL
            .into_iter()
            .find(|e| input.starts_with(e.as_str()))
            .ok_or_else(|| ParseTagError::MissingEnvPrefix(input.to_string()))?;
        let rest = &input[env.as_str().len()..];
        let suffix = rest
            .strip_prefix('-')
            .ok_or_else(|| ParseTagError::MissingEnvPrefix(input.to_string()))?;
        if suffix.is_empty() {
            return Err(ParseTagError::MissingSuffix(input.to_string()));
        }
        Ok(Self {
            env,
            value: input.to_string(),
        })
    }

    /// The environment this tag is scoped to.
    pub fn env(&self) -> EnvId {
        self.env
    }

    pub fn as_str(&self) -> &str {
        &self.value
    }
}

impl TryFrom<String> for ArtifactTag {
    type Error = ParseTagError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        ArtifactTag::parse(&value)
    }
}

impl From<ArtifactTag> for String {
    fn from(value: ArtifactTag) -> Self {
        value.value
    }
}

impl fmt::Display for ArtifactTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.value)
    }
}
