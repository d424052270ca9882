// ABOUTME: Declarative branch-to-environment mapping rules.
// ABOUTME: Replaces scattered branch-name string matching with configured data.

use serde::Deserialize;
use thiserror::Error;

use crate::types::EnvId;

#[derive(Debug, Error)]
pub enum MappingRuleError {
    #[error("mapping rule must set exactly one of git_ref or ref_prefix")]
    AmbiguousMatcher,
}

/// One rule in the trigger-ref to environment mapping.
///
/// Exactly one of `git_ref` (exact match) or `ref_prefix` must be set.
/// Rules are evaluated in order; the first match wins.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct MappingRule {
    #[serde(default)]
    pub git_ref: Option<String>,

    #[serde(default)]
    pub ref_prefix: Option<String>,

    pub environment: EnvId,
}

impl MappingRule {
    pub fn exact(git_ref: &str, environment: EnvId) -> Self {
        Self {
            git_ref: Some(git_ref.to_string()),
            ref_prefix: None,
            environment,
        }
    }

    pub fn prefix(ref_prefix: &str, environment: EnvId) -> Self {
        Self {
            git_ref: None,
            ref_prefix: Some(ref_prefix.to_string()),
            environment,
        }
    }

    pub fn validate(&self) -> Result<(), MappingRuleError> {
        match (&self.git_ref, &self.ref_prefix) {
            (Some(_), None) | (None, Some(_)) => Ok(()),
            _ => Err(MappingRuleError::AmbiguousMatcher),
        }
    }

    fn matches(&self, git_ref: &str) -> bool {
        if let Some(ref exact) = self.git_ref {
            return exact == git_ref;
        }
        if let Some(ref prefix) = self.ref_prefix {
            return git_ref.starts_with(prefix.as_str());
        }
        false
    }
}

/// Pure mapping from a trigger ref to its target environment.
/// Returns None when no rule matches; the caller drops the event.
pub fn resolve_environment<'a, I>(rules: I, git_ref: &str) -> Option<EnvId>
where
    I: IntoIterator<Item = &'a MappingRule>,
{
    rules
        .into_iter()
        .find(|rule| rule.matches(git_ref))
        .map(|rule| rule.environment)
}

/// Extract a version component from a release-line ref.
///
/// `refs/heads/release/1.4.2` yields `1.4.2`. The final path segment
/// must contain a digit and stick to tag-safe characters; refs like
/// `refs/heads/develop` yield None.
pub fn version_from_ref(git_ref: &str) -> Option<String> {
    let segment = git_ref.rsplit('/').next()?;
    if segment.is_empty() || !segment.chars().any(|c| c.is_ascii_digit()) {
        return None;
    }
    let tag_safe = segment
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '.' || c == '-');
    if !tag_safe {
        return None;
    }
    Some(segment.to_string())
}
