// ABOUTME: Artifact registry error types with SNAFU pattern.
// ABOUTME: Unifies push and query failures for programmatic handling.

use snafu::Snafu;

/// Unified artifact-registry error.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ArtifactError {
    #[snafu(display("artifact {reference} not found on the build host"))]
    LocalMissing { reference: String },

    #[snafu(display("failed to push {tag}: {message}"))]
    PushFailed { tag: String, message: String },

    #[snafu(display("push of {tag} completed without a registry digest"))]
    DigestMissing { tag: String },

    #[snafu(display("registry reported a malformed digest: {message}"))]
    BadDigest { message: String },

    #[snafu(display("registry query failed: {message}"))]
    QueryFailed { message: String },
}

/// Error kind for programmatic handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactErrorKind {
    /// The local artifact to push does not exist.
    NotFound,
    /// The registry rejected the push.
    Push,
    /// The push succeeded but no digest could be determined.
    Digest,
    /// A read-side registry operation failed.
    Query,
}

impl ArtifactError {
    /// Returns the error kind for programmatic handling.
    pub fn kind(&self) -> ArtifactErrorKind {
        match self {
            ArtifactError::LocalMissing { .. } => ArtifactErrorKind::NotFound,
            ArtifactError::PushFailed { .. } => ArtifactErrorKind::Push,
            ArtifactError::DigestMissing { .. } => ArtifactErrorKind::Digest,
            ArtifactError::BadDigest { .. } => ArtifactErrorKind::Digest,
            ArtifactError::QueryFailed { .. } => ArtifactErrorKind::Query,
        }
    }
}
