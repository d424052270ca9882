// ABOUTME: Application-wide error types for anodos.
// ABOUTME: Maps error kinds to the operator surface's exit codes.

use std::path::PathBuf;
use thiserror::Error;

use crate::artifacts::ArtifactError;
use crate::environments::RegistryError;
use crate::release::{PromoteError, PromoteErrorKind};
use crate::secrets::SecretError;

/// Exit codes for the operator surface.
pub const EXIT_CONFLICT: i32 = 2;
pub const EXIT_NOT_FOUND: i32 = 3;
pub const EXIT_UPSTREAM: i32 = 4;

#[derive(Debug, Error)]
pub enum Error {
    #[error("file already exists: {0}")]
    AlreadyExists(PathBuf),

    #[error("configuration file not found in {0}")]
    ConfigNotFound(PathBuf),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Promote(#[from] PromoteError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Artifact(#[from] ArtifactError),

    #[error(transparent)]
    Secret(#[from] SecretError),
}

impl Error {
    /// Process exit code: 0 success, 2 conflict (lock held), 3
    /// not-found (unknown tag/environment), 4 upstream-failure, 1
    /// anything else.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::Promote(e) => match e.kind() {
                PromoteErrorKind::Conflict => EXIT_CONFLICT,
                PromoteErrorKind::NotFound => EXIT_NOT_FOUND,
                PromoteErrorKind::Upstream => EXIT_UPSTREAM,
                PromoteErrorKind::Internal => 1,
            },
            Error::Registry(e) if e.is_lock_conflict() => EXIT_CONFLICT,
            Error::Artifact(_) => EXIT_UPSTREAM,
            _ => 1,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
