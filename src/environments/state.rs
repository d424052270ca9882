// ABOUTME: Persisted registry state: current tags, traffic route, attempt history.
// ABOUTME: JSON state file written atomically via temp-file rename.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::release::DeploymentAttempt;
use crate::types::{ArtifactTag, EnvId};

use super::error::RegistryError;

const STATE_FILENAME: &str = "state.json";

/// Mutable per-environment state.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EnvState {
    /// Tag currently deployed; None until the first deploy.
    pub current_tag: Option<ArtifactTag>,
}

/// Everything the registry persists between invocations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedState {
    pub environments: HashMap<EnvId, EnvState>,
    /// Which half of the blue/green pair the routing alias points at.
    pub active: EnvId,
    /// Append-only audit log of promotion tries.
    pub attempts: Vec<DeploymentAttempt>,
    pub next_attempt_id: u64,
}

impl PersistedState {
    pub fn initial(active: EnvId) -> Self {
        let environments = EnvId::ALL
            .into_iter()
            .map(|env| (env, EnvState::default()))
            .collect();
        Self {
            environments,
            active,
            attempts: Vec::new(),
            next_attempt_id: 1,
        }
    }

    pub fn env_mut(&mut self, env: EnvId) -> &mut EnvState {
        self.environments.entry(env).or_default()
    }

    pub fn env(&self, env: EnvId) -> Option<&EnvState> {
        self.environments.get(&env)
    }
}

pub(crate) fn state_path(state_dir: &Path) -> PathBuf {
    state_dir.join(STATE_FILENAME)
}

/// Load persisted state, or initialize it if no state file exists yet.
pub(crate) fn load_state(state_dir: &Path, initial_active: EnvId) -> Result<PersistedState, RegistryError> {
    let path = state_path(state_dir);
    if !path.exists() {
        return Ok(PersistedState::initial(initial_active));
    }
    let content = std::fs::read_to_string(&path)?;
    serde_json::from_str(&content).map_err(|e| RegistryError::CorruptState(e.to_string()))
}

/// Persist state atomically: write a temp file, then rename over the old one.
pub(crate) fn save_state(state_dir: &Path, state: &PersistedState) -> Result<(), RegistryError> {
    let path = state_path(state_dir);
    let tmp = state_dir.join(format!("{STATE_FILENAME}.tmp"));
    let json = serde_json::to_string_pretty(state)
        .map_err(|e| RegistryError::CorruptState(e.to_string()))?;
    std::fs::write(&tmp, json)?;
    std::fs::rename(&tmp, &path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CommitRef;

    #[test]
    fn initial_state_covers_all_environments() {
        let state = PersistedState::initial(EnvId::Green);
        assert_eq!(state.environments.len(), 3);
        assert_eq!(state.active, EnvId::Green);
        assert_eq!(state.next_attempt_id, 1);
    }

    #[test]
    fn state_survives_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let mut state = PersistedState::initial(EnvId::Blue);
        let commit = CommitRef::parse("abc123def456789").unwrap();
        state.env_mut(EnvId::Staging).current_tag = Some(ArtifactTag::staging(&commit));

        save_state(dir.path(), &state).unwrap();
        let loaded = load_state(dir.path(), EnvId::Green).unwrap();

        assert_eq!(loaded.active, EnvId::Blue);
        assert_eq!(
            loaded.env(EnvId::Staging).unwrap().current_tag.as_ref().unwrap().as_str(),
            "staging-abc123def456"
        );
    }

    #[test]
    fn missing_file_yields_initial_state() {
        let dir = tempfile::tempdir().unwrap();
        let state = load_state(dir.path(), EnvId::Green).unwrap();
        assert_eq!(state.active, EnvId::Green);
    }

    #[test]
    fn corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(state_path(dir.path()), "not json").unwrap();
        assert!(matches!(
            load_state(dir.path(), EnvId::Green),
            Err(RegistryError::CorruptState(_))
        ));
    }
}
