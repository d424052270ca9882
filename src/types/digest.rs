// ABOUTME: Content-addressed registry digest in algorithm:hex form.
// ABOUTME: The immutable identity an artifact tag points at.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ParseDigestError {
    #[error("digest cannot be empty")]
    Empty,

    #[error("digest must be of the form sha256:<64 hex chars>: {0}")]
    BadFormat(String),
}

/// An immutable registry digest, e.g. `sha256:1b2c...`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Digest(String);

impl Digest {
    pub fn parse(input: &str) -> Result<Self, ParseDigestError> {
        let input = input.trim();
        if input.is_empty() {
            return Err(ParseDigestError::Empty);
        }
        let hex = input
            .strip_prefix("sha256:")
            .ok_or_else(|| ParseDigestError::BadFormat(input.to_string()))?;
        if hex.len() != 64 || !hex.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase())
        {
            return Err(ParseDigestError::BadFormat(input.to_string()));
        }
        Ok(Self(input.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Digest {
    type Error = ParseDigestError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Digest::parse(&value)
    }
}

impl From<Digest> for String {
    fn from(value: Digest) -> Self {
        value.0
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
