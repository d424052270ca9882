// ABOUTME: Config scaffolding for new projects.
// ABOUTME: Creates anodos.yml template files.

use std::path::Path;

use crate::error::{Error, Result};

use super::CONFIG_FILENAME;

pub fn init_config(dir: &Path, repository: Option<&str>, force: bool) -> Result<()> {
    let config_path = dir.join(CONFIG_FILENAME);

    if config_path.exists() && !force {
        return Err(Error::AlreadyExists(config_path));
    }

    let yaml = generate_template_yaml(repository.unwrap_or("registry.example.com/acme/app"));
    std::fs::write(&config_path, yaml)?;

    Ok(())
}

fn generate_template_yaml(repository: &str) -> String {
    format!(
        r#"registry:
  repository: {repository}
  # Secret-store keys for registry credentials (resolved at startup,
  # environment variables take precedence)
  username_key: registry_username
  password_key: registry_password

environments:
  staging:
    instance_group: app-staging
    control_endpoint: http://provisioner.internal:7000/groups/app-staging
  blue:
    instance_group: app-blue
    control_endpoint: http://provisioner.internal:7000/groups/app-blue
  green:
    instance_group: app-green
    control_endpoint: http://provisioner.internal:7000/groups/app-green

routing:
  alias: app-live
  control_endpoint: http://router.internal:7001
  initial_active: green

# First match wins. Each rule sets git_ref (exact) or ref_prefix.
mapping:
  - ref_prefix: refs/heads/feature/
    environment: staging
  - git_ref: refs/heads/develop
    environment: staging
  - ref_prefix: refs/heads/release/
    environment: blue
  - git_ref: refs/heads/main
    environment: green

health:
  path: /health
  consecutive_successes: 2
  interval: 30s
  timeout: 5m
"#
    )
}
