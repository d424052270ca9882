// ABOUTME: Secret store boundary for runtime credentials.
// ABOUTME: Environment variables first, then a backing store; values never persisted.

use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SecretError {
    #[error("failed to read secret store: {0}")]
    Io(#[from] std::io::Error),

    #[error("secret store is not a JSON object: {0}")]
    BadDocument(PathBuf),

    #[error("secret {0} is not a string value")]
    NotAString(String),
}

/// Lookup of runtime configuration by key. Implementations must never
/// write secret values anywhere.
pub trait SecretStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, SecretError>;
}

/// Resolves keys against process environment variables, uppercased:
/// `registry_password` reads `REGISTRY_PASSWORD`.
#[derive(Debug, Default)]
pub struct EnvSecretStore;

impl SecretStore for EnvSecretStore {
    fn get(&self, key: &str) -> Result<Option<String>, SecretError> {
        Ok(std::env::var(key.to_uppercase()).ok())
    }
}

/// A JSON document of string values, as dropped by the secret-fetch step
/// of the deploy pipeline. Loaded once; missing file means no secrets.
#[derive(Debug)]
pub struct FileSecretStore {
    values: HashMap<String, String>,
}

impl FileSecretStore {
    pub fn load(path: &Path) -> Result<Self, SecretError> {
        if !path.exists() {
            return Ok(Self {
                values: HashMap::new(),
            });
        }
        let content = std::fs::read_to_string(path)?;
        let doc: Value = serde_json::from_str(&content)
            .map_err(|_| SecretError::BadDocument(path.to_path_buf()))?;
        let object = doc
            .as_object()
            .ok_or_else(|| SecretError::BadDocument(path.to_path_buf()))?;

        let mut values = HashMap::new();
        for (key, value) in object {
            match value {
                Value::String(s) => {
                    values.insert(key.clone(), s.clone());
                }
                Value::Null => {}
                _ => return Err(SecretError::NotAString(key.clone())),
            }
        }
        Ok(Self { values })
    }

    #[cfg(test)]
    pub fn from_values(values: HashMap<String, String>) -> Self {
        Self { values }
    }
}

impl SecretStore for FileSecretStore {
    fn get(&self, key: &str) -> Result<Option<String>, SecretError> {
        Ok(self.values.get(key).cloned())
    }
}

/// Checks stores in order, first hit wins.
pub struct LayeredSecretStore {
    layers: Vec<Box<dyn SecretStore>>,
}

impl LayeredSecretStore {
    pub fn new(layers: Vec<Box<dyn SecretStore>>) -> Self {
        Self { layers }
    }

    /// The default chain: environment variables, then the state-dir
    /// secrets document.
    pub fn standard(state_dir: &Path) -> Result<Self, SecretError> {
        Ok(Self::new(vec![
            Box::new(EnvSecretStore),
            Box::new(FileSecretStore::load(&state_dir.join("secrets.json"))?),
        ]))
    }
}

impl SecretStore for LayeredSecretStore {
    fn get(&self, key: &str) -> Result<Option<String>, SecretError> {
        for layer in &self.layers {
            if let Some(value) = layer.get(key)? {
                return Ok(Some(value));
            }
        }
        Ok(None)
    }
}
