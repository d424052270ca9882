// ABOUTME: Configuration types and parsing for anodos.yml.
// ABOUTME: Environments, registry, routing alias, branch mapping, health policy.

mod healthcheck;
mod init;
mod mapping;

pub use healthcheck::{HealthPolicy, StatusRange};
pub use init::init_config;
pub use mapping::{MappingRule, resolve_environment, version_from_ref};

use crate::error::{Error, Result};
use crate::types::EnvId;
use nonempty::NonEmpty;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_FILENAME: &str = "anodos.yml";
pub const CONFIG_FILENAME_ALT: &str = "anodos.yaml";
pub const CONFIG_FILENAME_DIR: &str = ".anodos/config.yml";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub registry: RegistryConfig,

    pub environments: EnvironmentsConfig,

    pub routing: RoutingConfig,

    #[serde(deserialize_with = "deserialize_mapping")]
    pub mapping: NonEmpty<MappingRule>,

    #[serde(default)]
    pub build: BuildConfig,

    #[serde(default)]
    pub health: HealthPolicy,

    /// Deadline for the instance group to report new-tag instances
    /// registered with the load balancer.
    #[serde(default = "default_readiness_timeout", with = "humantime_serde")]
    pub readiness_timeout: Duration,

    /// Where locks, the state file, and attempt history live.
    /// Defaults to ~/.local/state/anodos.
    #[serde(default)]
    pub state_dir: Option<PathBuf>,
}

/// The container-image registry artifacts are pushed to.
#[derive(Debug, Clone, Deserialize)]
pub struct RegistryConfig {
    /// Repository base, e.g. `registry.example.com/acme/app`.
    pub repository: String,

    /// Secret-store key holding the registry username.
    #[serde(default)]
    pub username_key: Option<String>,

    /// Secret-store key holding the registry password or token.
    #[serde(default)]
    pub password_key: Option<String>,
}

/// One deployable target's boundary references.
#[derive(Debug, Clone, Deserialize)]
pub struct EnvEntry {
    /// Instance-group reference understood by the provisioning layer.
    pub instance_group: String,

    /// Base URL of the provisioning layer's control API for this group.
    pub control_endpoint: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EnvironmentsConfig {
    pub staging: EnvEntry,
    pub blue: EnvEntry,
    pub green: EnvEntry,
}

impl EnvironmentsConfig {
    pub fn entry(&self, env: EnvId) -> &EnvEntry {
        match env {
            EnvId::Staging => &self.staging,
            EnvId::Blue => &self.blue,
            EnvId::Green => &self.green,
        }
    }
}

/// The stable routing alias shared by the blue/green pair.
#[derive(Debug, Clone, Deserialize)]
pub struct RoutingConfig {
    /// Alias name at the routing boundary (listener / target-group binding).
    pub alias: String,

    /// Base URL of the routing boundary's control API.
    pub control_endpoint: String,

    /// Which half of the pair serves live traffic before any recorded swap.
    #[serde(default = "default_initial_active")]
    pub initial_active: EnvId,

    /// Whether the boundary can rebind the alias in one atomic step.
    /// When false, swaps use the weighted-rebalance fallback.
    #[serde(default = "default_atomic_rebind")]
    pub atomic_rebind: bool,
}

fn default_atomic_rebind() -> bool {
    true
}

fn default_initial_active() -> EnvId {
    EnvId::Green
}

/// How to produce the local artifact for a commit before pushing.
#[derive(Debug, Clone, Deserialize)]
pub struct BuildConfig {
    /// Build command with `{commit}` / `{shortsha}` placeholders.
    /// Omit when an earlier pipeline step already built the artifact.
    #[serde(default)]
    pub command: Option<Vec<String>>,

    /// Local image reference the build produces, with placeholders.
    #[serde(default = "default_local_ref")]
    pub local_ref: String,
}

fn default_local_ref() -> String {
    "app:{shortsha}".to_string()
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            command: None,
            local_ref: default_local_ref(),
        }
    }
}

fn default_readiness_timeout() -> Duration {
    Duration::from_secs(300)
}

fn deserialize_mapping<'de, D>(deserializer: D) -> std::result::Result<NonEmpty<MappingRule>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de::Error as _;
    let rules: Vec<MappingRule> = Vec::deserialize(deserializer)?;
    NonEmpty::from_vec(rules)
        .ok_or_else(|| D::Error::custom("mapping must contain at least one rule"))
}

impl Config {
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    pub fn discover(dir: &Path) -> Result<Self> {
        let candidates = [
            dir.join(CONFIG_FILENAME),
            dir.join(CONFIG_FILENAME_ALT),
            dir.join(CONFIG_FILENAME_DIR),
        ];

        for path in &candidates {
            if path.exists() {
                return Self::load(path);
            }
        }

        Err(Error::ConfigNotFound(dir.to_path_buf()))
    }

    fn validate(&self) -> Result<()> {
        for rule in self.mapping.iter() {
            rule.validate()
                .map_err(|e| Error::InvalidConfig(e.to_string()))?;
        }
        if !self.routing.initial_active.in_live_pair() {
            return Err(Error::InvalidConfig(format!(
                "routing.initial_active must be blue or green, got {}",
                self.routing.initial_active
            )));
        }
        self.health
            .validate()
            .map_err(|e| Error::InvalidConfig(e.to_string()))?;
        Ok(())
    }

    /// Resolved state directory.
    pub fn state_dir(&self) -> PathBuf {
        if let Some(ref dir) = self.state_dir {
            return dir.clone();
        }
        let home = std::env::var_os("HOME").map(PathBuf::from).unwrap_or_default();
        home.join(".local/state/anodos")
    }

    pub fn template() -> Self {
        Config {
            registry: RegistryConfig {
                repository: "registry.example.com/acme/app".to_string(),
                username_key: Some("registry_username".to_string()),
                password_key: Some("registry_password".to_string()),
            },
            environments: EnvironmentsConfig {
                staging: EnvEntry {
                    instance_group: "app-staging".to_string(),
                    control_endpoint: "http://provisioner.internal:7000/groups/app-staging"
                        .to_string(),
                },
                blue: EnvEntry {
                    instance_group: "app-blue".to_string(),
                    control_endpoint: "http://provisioner.internal:7000/groups/app-blue"
                        .to_string(),
                },
                green: EnvEntry {
                    instance_group: "app-green".to_string(),
                    control_endpoint: "http://provisioner.internal:7000/groups/app-green"
                        .to_string(),
                },
            },
            routing: RoutingConfig {
                alias: "app-live".to_string(),
                control_endpoint: "http://router.internal:7001".to_string(),
                initial_active: EnvId::Green,
                atomic_rebind: true,
            },
            mapping: NonEmpty::from_vec(vec![
                MappingRule::prefix("refs/heads/feature/", EnvId::Staging),
                MappingRule::exact("refs/heads/develop", EnvId::Staging),
                MappingRule::prefix("refs/heads/release/", EnvId::Blue),
                MappingRule::exact("refs/heads/main", EnvId::Green),
            ])
            .expect("template mapping is non-empty"),
            build: BuildConfig::default(),
            health: HealthPolicy::default(),
            readiness_timeout: default_readiness_timeout(),
            state_dir: None,
        }
    }
}
