// ABOUTME: Bollard-based artifact registry adapter over the build host's daemon.
// ABOUTME: Tags, pushes, and lists artifact images via the Docker-compatible API.

use async_trait::async_trait;
use bollard::Docker;
use bollard::query_parameters::{ListImagesOptions, PushImageOptions, TagImageOptions};
use chrono::{DateTime, Utc};
use futures::StreamExt;
use std::collections::HashMap;

use crate::types::{ArtifactTag, Digest};

use super::error::ArtifactError;
use super::{ArtifactRegistryOps, PushOutcome, RegistryAuth, TagEntry};

/// Talks to the build host's container daemon, which is where freshly
/// built artifacts live before they are pushed. All pushes originate
/// here, so the daemon's image list doubles as the repository's tag
/// history.
pub struct BollardArtifactRegistry {
    client: Docker,
    repository: String,
    auth: Option<RegistryAuth>,
}

impl BollardArtifactRegistry {
    pub fn connect(repository: &str, auth: Option<RegistryAuth>) -> Result<Self, ArtifactError> {
        let client = Docker::connect_with_local_defaults().map_err(|e| {
            ArtifactError::QueryFailed {
                message: format!("failed to connect to container daemon: {e}"),
            }
        })?;
        Ok(Self {
            client,
            repository: repository.to_string(),
            auth,
        })
    }

    fn reference(&self, tag: &ArtifactTag) -> String {
        format!("{}:{}", self.repository, tag)
    }

    fn credentials(&self) -> Option<bollard::auth::DockerCredentials> {
        self.auth.as_ref().map(|a| bollard::auth::DockerCredentials {
            username: Some(a.username.clone()),
            password: Some(a.password.clone()),
            serveraddress: a.server.clone(),
            ..Default::default()
        })
    }

    /// The repository-scoped digest of an image, if the daemon knows one.
    async fn repo_digest(&self, reference: &str) -> Result<Option<Digest>, ArtifactError> {
        let inspect = match self.client.inspect_image(reference).await {
            Ok(i) => i,
            Err(bollard::errors::Error::DockerResponseServerError {
                status_code: 404, ..
            }) => return Ok(None),
            Err(e) => {
                return Err(ArtifactError::QueryFailed {
                    message: e.to_string(),
                });
            }
        };

        let Some(repo_digests) = inspect.repo_digests else {
            return Ok(None);
        };
        for entry in repo_digests {
            // Entries look like "registry/repo@sha256:...".
            if let Some((repo, digest)) = entry.split_once('@')
                && repo == self.repository
            {
                let digest = Digest::parse(digest).map_err(|e| ArtifactError::BadDigest {
                    message: e.to_string(),
                })?;
                return Ok(Some(digest));
            }
        }
        Ok(None)
    }
}

#[async_trait]
impl ArtifactRegistryOps for BollardArtifactRegistry {
    async fn push(
        &self,
        local_ref: &str,
        tag: &ArtifactTag,
    ) -> Result<PushOutcome, ArtifactError> {
        // The build must exist on this host before we can tag it.
        if let Err(bollard::errors::Error::DockerResponseServerError {
            status_code: 404, ..
        }) = self.client.inspect_image(local_ref).await
        {
            return Err(ArtifactError::LocalMissing {
                reference: local_ref.to_string(),
            });
        }

        let reference = self.reference(tag);

        // Re-running a trigger must be a no-op: if the tag already points
        // at a pushed digest for this repository, report it as present.
        if let Some(existing) = self.repo_digest(&reference).await? {
            tracing::debug!(%tag, digest = %existing, "tag already pushed, skipping");
            return Ok(PushOutcome::AlreadyPresent(existing));
        }

        let opts = TagImageOptions {
            repo: Some(self.repository.clone()),
            tag: Some(tag.to_string()),
            ..Default::default()
        };
        self.client
            .tag_image(local_ref, Some(opts))
            .await
            .map_err(|e| ArtifactError::PushFailed {
                tag: tag.to_string(),
                message: format!("tagging failed: {e}"),
            })?;

        let push_opts = PushImageOptions {
            tag: Some(tag.to_string()),
            ..Default::default()
        };

        // Push returns a stream of progress updates - consume it.
        let mut stream =
            self.client
                .push_image(&self.repository, Some(push_opts), self.credentials());
        while let Some(result) = stream.next().await {
            let info = result.map_err(|e| ArtifactError::PushFailed {
                tag: tag.to_string(),
                message: e.to_string(),
            })?;
            if let Some(error) = info.error_detail {
                return Err(ArtifactError::PushFailed {
                    tag: tag.to_string(),
                    message: error.message.unwrap_or_default(),
                });
            }
        }

        let digest = self
            .repo_digest(&reference)
            .await?
            .ok_or_else(|| ArtifactError::DigestMissing {
                tag: tag.to_string(),
            })?;

        tracing::info!(%tag, %digest, "artifact pushed");
        Ok(PushOutcome::Pushed(digest))
    }

    async fn tag_exists(&self, tag: &ArtifactTag) -> Result<bool, ArtifactError> {
        Ok(self.repo_digest(&self.reference(tag)).await?.is_some())
    }

    async fn list_tags(&self, prefix: &str) -> Result<Vec<TagEntry>, ArtifactError> {
        let mut filters: HashMap<String, Vec<String>> = HashMap::new();
        filters.insert(
            "reference".to_string(),
            vec![format!("{}:*", self.repository)],
        );

        let opts = ListImagesOptions {
            all: false,
            filters: Some(filters),
            ..Default::default()
        };

        let images = self
            .client
            .list_images(Some(opts))
            .await
            .map_err(|e| ArtifactError::QueryFailed {
                message: e.to_string(),
            })?;

        let mut entries = Vec::new();
        for image in images {
            let digest = image
                .repo_digests
                .iter()
                .find_map(|d| d.split_once('@').map(|(_, digest)| digest))
                .and_then(|d| Digest::parse(d).ok());
            let created_at = DateTime::<Utc>::from_timestamp(image.created, 0);

            for repo_tag in &image.repo_tags {
                let Some((repo, tag)) = repo_tag.rsplit_once(':') else {
                    continue;
                };
                if repo != self.repository || !tag.starts_with(prefix) {
                    continue;
                }
                let Ok(tag) = ArtifactTag::parse(tag) else {
                    // Manually applied tags outside our scheme are not ours.
                    continue;
                };
                entries.push(TagEntry {
                    tag,
                    digest: digest.clone(),
                    created_at,
                });
            }
        }

        // Newest first.
        entries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(entries)
    }
}
