// ABOUTME: Build step boundary: turns a commit into a local artifact reference.
// ABOUTME: The default implementation shells out to a configured build command.

use async_trait::async_trait;
use thiserror::Error;

use crate::config::BuildConfig;
use crate::types::CommitRef;

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("build command exited with {status}: {stderr}")]
    CommandFailed { status: i32, stderr: String },

    #[error("failed to launch build command: {0}")]
    Spawn(String),
}

/// Produces a locally built artifact for a commit and returns the
/// local reference to push. An error here is a `BuildFailure`: nothing
/// was deployed, so no rollback follows.
#[async_trait]
pub trait ArtifactBuilder: Send + Sync {
    async fn build(&self, commit: &CommitRef) -> Result<String, BuildError>;
}

/// Runs the configured build command with `{commit}` / `{shortsha}`
/// placeholders substituted, then reports the rendered local reference.
/// With no command configured the artifact is assumed to be built by an
/// earlier pipeline step and only the reference is rendered.
pub struct CommandBuilder {
    config: BuildConfig,
}

impl CommandBuilder {
    pub fn new(config: BuildConfig) -> Self {
        Self { config }
    }

    fn render(template: &str, commit: &CommitRef) -> String {
        template
            .replace("{commit}", commit.as_str())
            .replace("{shortsha}", commit.short())
    }
}

#[async_trait]
impl ArtifactBuilder for CommandBuilder {
    async fn build(&self, commit: &CommitRef) -> Result<String, BuildError> {
        if let Some(command) = &self.config.command {
            let rendered: Vec<String> = command
                .iter()
                .map(|part| Self::render(part, commit))
                .collect();
            let (program, args) = rendered
                .split_first()
                .ok_or_else(|| BuildError::Spawn("empty build command".to_string()))?;

            tracing::info!(command = %rendered.join(" "), "running build");
            let output = tokio::process::Command::new(program)
                .args(args)
                .output()
                .await
                .map_err(|e| BuildError::Spawn(e.to_string()))?;

            if !output.status.success() {
                return Err(BuildError::CommandFailed {
                    status: output.status.code().unwrap_or(-1),
                    stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
                });
            }
        }

        Ok(Self::render(&self.config.local_ref, commit))
    }
}
