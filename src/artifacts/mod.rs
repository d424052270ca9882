// ABOUTME: Artifact registry adapter: push, tag queries, tag history.
// ABOUTME: Stateless contract, safely callable concurrently by all environments.

mod bollard;
mod builder;
mod error;

pub use bollard::BollardArtifactRegistry;
pub use builder::{ArtifactBuilder, BuildError, CommandBuilder};
pub use error::{ArtifactError, ArtifactErrorKind};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::types::{ArtifactTag, Digest};

/// Registry credentials resolved through the secret store at startup.
#[derive(Debug, Clone)]
pub struct RegistryAuth {
    pub username: String,
    pub password: String,
    pub server: Option<String>,
}

/// Result of a push. Pushing a digest under a tag that already points
/// at that digest is a no-op success, so triggers can be re-run without
/// side effects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushOutcome {
    Pushed(Digest),
    AlreadyPresent(Digest),
}

impl PushOutcome {
    pub fn digest(&self) -> &Digest {
        match self {
            PushOutcome::Pushed(d) | PushOutcome::AlreadyPresent(d) => d,
        }
    }
}

/// One entry in the registry's tag history.
#[derive(Debug, Clone, serde::Serialize)]
pub struct TagEntry {
    pub tag: ArtifactTag,
    pub digest: Option<Digest>,
    pub created_at: Option<DateTime<Utc>>,
}

/// Operations against the container-image registry holding build
/// artifacts. Tags are immutable once pushed; the orchestrator never
/// deletes artifacts.
#[async_trait]
pub trait ArtifactRegistryOps: Send + Sync {
    /// Tag the locally built artifact and push it under `tag`,
    /// returning the registry digest.
    async fn push(
        &self,
        local_ref: &str,
        tag: &ArtifactTag,
    ) -> Result<PushOutcome, ArtifactError>;

    async fn tag_exists(&self, tag: &ArtifactTag) -> Result<bool, ArtifactError>;

    /// Tags under this repository matching `prefix`, newest first.
    async fn list_tags(&self, prefix: &str) -> Result<Vec<TagEntry>, ArtifactError>;
}
