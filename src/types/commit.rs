// ABOUTME: Git commit reference validation.
// ABOUTME: Accepts abbreviated or full hex object names, lowercased.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Shortest abbreviation we accept; anything less is too collision-prone
/// to name a build.
const MIN_LEN: usize = 7;
/// SHA-256 object names are the longest git produces.
const MAX_LEN: usize = 64;
/// Length used when embedding the commit in an artifact tag.
const SHORT_LEN: usize = 12;

#[derive(Debug, Error)]
pub enum ParseCommitRefError {
    #[error("commit reference cannot be empty")]
    Empty,

    #[error("commit reference must be {MIN_LEN}-{MAX_LEN} hex characters, got {0}")]
    BadLength(usize),

    #[error("invalid character in commit reference: '{0}'")]
    InvalidChar(char),
}

/// A validated git commit object name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CommitRef(String);

impl CommitRef {
    pub fn parse(input: &str) -> Result<Self, ParseCommitRefError> {
        let input = input.trim();
        if input.is_empty() {
            return Err(ParseCommitRefError::Empty);
        }
        if input.len() < MIN_LEN || input.len() > MAX_LEN {
            return Err(ParseCommitRefError::BadLength(input.len()));
        }
        for c in input.chars() {
            if !c.is_ascii_hexdigit() || c.is_ascii_uppercase() {
                return Err(ParseCommitRefError::InvalidChar(c));
            }
        }
        Ok(Self(input.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The abbreviation embedded in artifact tags.
    pub fn short(&self) -> &str {
        &self.0[..SHORT_LEN.min(self.0.len())]
    }
}

impl TryFrom<String> for CommitRef {
    type Error = ParseCommitRefError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        CommitRef::parse(&value)
    }
}

impl From<CommitRef> for String {
    fn from(value: CommitRef) -> Self {
        value.0
    }
}

impl fmt::Display for CommitRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
