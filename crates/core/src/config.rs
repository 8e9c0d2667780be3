//! Store configuration.
//!
//! Components take the flags they need from this value at construction time;
//! nothing reads process state after that.

use serde::{Deserialize, Serialize};

use crate::error::{StoreError, StoreResult};

pub const ENV_RECREATE_DB: &str = "ESDOC_RECREATE_DB";
pub const ENV_RECREATE_DB_AUTH: &str = "ESDOC_RECREATE_DB_AUTH";
pub const ENV_AUTH_DISABLED: &str = "ESDOC_AUTH_DISABLED";
pub const ENV_AUTH_ROLES: &str = "ESDOC_AUTH_ROLES";
pub const ENV_LEGACY_SEQUENCE: &str = "ESDOC_LEGACY_SEQUENCE";

/// Roles used when none are configured, most privileged first.
pub const DEFAULT_ROLES: [&str; 3] = ["admin", "maintainer", "user"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Drop and rebuild per-type collections when they are first built.
    pub recreate_db: bool,
    /// Also rebuild authorization relation collections whenever a type's event
    /// and snapshot collections are rebuilt, on startup or by explicit recreate.
    pub recreate_db_auth: bool,
    /// Every access rule becomes "always permit".
    pub auth_disabled: bool,
    /// Ordered role list; the first role is the only one allowed to delete.
    pub auth_roles: Vec<String>,
    /// Detect freshly created sequence counters by value comparison instead of
    /// an explicit flag. Only for deployments that depend on the old behavior.
    pub legacy_sequence_detection: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            recreate_db: false,
            recreate_db_auth: false,
            auth_disabled: false,
            auth_roles: DEFAULT_ROLES.iter().map(|r| r.to_string()).collect(),
            legacy_sequence_detection: false,
        }
    }
}

impl StoreConfig {
    /// Load from `ESDOC_*` environment variables, defaulting anything unset.
    pub fn from_env() -> StoreResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary key lookup (environment, config map, test fixture).
    pub fn from_lookup<F>(lookup: F) -> StoreResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let auth_roles = match lookup(ENV_AUTH_ROLES) {
            Some(raw) => raw
                .split(',')
                .map(str::trim)
                .filter(|r| !r.is_empty())
                .map(str::to_string)
                .collect(),
            None => defaults.auth_roles,
        };

        let config = Self {
            recreate_db: parse_flag(ENV_RECREATE_DB, lookup(ENV_RECREATE_DB))?,
            recreate_db_auth: parse_flag(ENV_RECREATE_DB_AUTH, lookup(ENV_RECREATE_DB_AUTH))?,
            auth_disabled: parse_flag(ENV_AUTH_DISABLED, lookup(ENV_AUTH_DISABLED))?,
            auth_roles,
            legacy_sequence_detection: parse_flag(
                ENV_LEGACY_SEQUENCE,
                lookup(ENV_LEGACY_SEQUENCE),
            )?,
        };

        tracing::debug!(?config, "store configuration loaded");
        Ok(config)
    }
}

fn parse_flag(key: &str, value: Option<String>) -> StoreResult<bool> {
    let Some(raw) = value else {
        return Ok(false);
    };
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "" | "0" | "false" | "no" | "off" => Ok(false),
        other => Err(StoreError::configuration(format!(
            "{key}: expected a boolean, got '{other}'"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn unset_values_fall_back_to_defaults() {
        let config = StoreConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, StoreConfig::default());
        assert_eq!(config.auth_roles, vec!["admin", "maintainer", "user"]);
    }

    #[test]
    fn flags_and_roles_are_parsed() {
        let config = StoreConfig::from_lookup(lookup(&[
            (ENV_RECREATE_DB, "true"),
            (ENV_AUTH_DISABLED, "1"),
            (ENV_AUTH_ROLES, "owner, editor ,,viewer"),
        ]))
        .unwrap();

        assert!(config.recreate_db);
        assert!(config.auth_disabled);
        assert!(!config.recreate_db_auth);
        assert_eq!(config.auth_roles, vec!["owner", "editor", "viewer"]);
    }

    #[test]
    fn invalid_flag_is_configuration_error() {
        let err = StoreConfig::from_lookup(lookup(&[(ENV_RECREATE_DB, "sometimes")])).unwrap_err();
        assert!(matches!(err, StoreError::Configuration(msg) if msg.contains(ENV_RECREATE_DB)));
    }
}
