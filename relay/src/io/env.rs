//! Environment resolver: named configuration values read once at startup.

use std::collections::BTreeMap;

use serde_json::Value;

use crate::error::RelayError;

/// Prefix shared by all relay environment variables.
pub const ENV_PREFIX: &str = "RELAY_";

pub const BUILD_VPC: &str = "RELAY_BUILD_VPC";
pub const BUILD_SECURITY_GROUP: &str = "RELAY_BUILD_SECURITY_GROUP";
pub const BUILD_SUBNET: &str = "RELAY_BUILD_SUBNET";
pub const APP_NAME: &str = "RELAY_APP_NAME";
pub const BUILD_TARGET: &str = "RELAY_BUILD_TARGET";
pub const GOLD_MASTER_NAME: &str = "RELAY_GOLD_MASTER_NAME";
pub const GOLD_MASTER_IMAGE_PREFIX: &str = "RELAY_GOLD_MASTER_IMAGE_PREFIX";
pub const BASE_IMAGE_ID: &str = "RELAY_BASE_IMAGE_ID";
pub const S3_BUCKET: &str = "RELAY_S3_BUCKET";
pub const S3_PREFIXES: &str = "RELAY_S3_PREFIXES";

/// Snapshot of the process environment.
///
/// Unset and empty variables are both treated as absent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Environment {
    vars: BTreeMap<String, String>,
}

impl Environment {
    pub fn from_process() -> Self {
        Self::from_pairs(std::env::vars())
    }

    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let vars = pairs
            .into_iter()
            .map(|(key, value)| (key.into(), value.into()))
            .filter(|(_, value)| !value.trim().is_empty())
            .collect();
        Self { vars }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    /// Value for `key`, or a configuration error naming it.
    pub fn require(&self, key: &str) -> Result<&str, RelayError> {
        self.get(key).ok_or_else(|| RelayError::Configuration {
            key: key.to_string(),
        })
    }

    /// Fail on the first absent key, in the order given.
    pub fn require_all(&self, keys: &[&str]) -> Result<(), RelayError> {
        for key in keys {
            self.require(key)?;
        }
        Ok(())
    }

    /// All `RELAY_*` variables, sorted by name.
    pub fn relay_vars(&self) -> BTreeMap<&str, &str> {
        self.vars
            .iter()
            .filter(|(key, _)| key.starts_with(ENV_PREFIX))
            .map(|(key, value)| (key.as_str(), value.as_str()))
            .collect()
    }

    /// Object type → key prefix mapping from `RELAY_S3_PREFIXES` (a JSON
    /// object). Unset means an empty mapping.
    pub fn s3_prefixes(&self) -> Result<BTreeMap<String, String>, RelayError> {
        let Some(raw) = self.get(S3_PREFIXES) else {
            return Ok(BTreeMap::new());
        };
        let value: Value = serde_json::from_str(raw).map_err(|err| {
            RelayError::InvalidConfig(format!("{S3_PREFIXES} is not valid JSON: {err}"))
        })?;
        let Value::Object(entries) = value else {
            return Err(RelayError::InvalidConfig(format!(
                "{S3_PREFIXES} must be a JSON object"
            )));
        };
        entries
            .into_iter()
            .map(|(key, value)| match value {
                Value::String(prefix) => Ok((key, prefix)),
                _ => Err(RelayError::InvalidConfig(format!(
                    "{S3_PREFIXES} entry '{key}' must be a string"
                ))),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn require_names_missing_key() {
        let env = Environment::from_pairs([(BUILD_VPC, "build")]);
        assert_eq!(env.require(BUILD_VPC).expect("present"), "build");

        let err = env.require(BUILD_SUBNET).expect_err("missing");
        assert!(matches!(err, RelayError::Configuration { ref key } if key == BUILD_SUBNET));
        assert!(err.to_string().contains(BUILD_SUBNET));
    }

    #[test]
    fn empty_values_are_absent() {
        let env = Environment::from_pairs([(APP_NAME, "  ")]);
        assert!(env.get(APP_NAME).is_none());
    }

    #[test]
    fn require_all_reports_first_missing_in_order() {
        let env = Environment::from_pairs([(BUILD_VPC, "build")]);
        let err = env
            .require_all(&[BUILD_VPC, BUILD_SECURITY_GROUP, BUILD_SUBNET])
            .expect_err("missing");
        assert!(matches!(err, RelayError::Configuration { ref key } if key == BUILD_SECURITY_GROUP));
    }

    #[test]
    fn relay_vars_filters_by_prefix() {
        let env = Environment::from_pairs([
            ("HOME", "/root"),
            (APP_NAME, "shop"),
            (BUILD_TARGET, "web"),
        ]);
        let vars: Vec<_> = env.relay_vars().into_iter().collect();
        assert_eq!(vars, vec![(APP_NAME, "shop"), (BUILD_TARGET, "web")]);
    }

    #[test]
    fn s3_prefixes_parse_json_object() {
        let env = Environment::from_pairs([(
            S3_PREFIXES,
            r#"{"root": "jenkins", "semaphores": "flags"}"#,
        )]);
        let prefixes = env.s3_prefixes().expect("parse");
        assert_eq!(prefixes.get("root").map(String::as_str), Some("jenkins"));
        assert_eq!(prefixes.get("semaphores").map(String::as_str), Some("flags"));

        let bad = Environment::from_pairs([(S3_PREFIXES, "[1]")]);
        assert!(bad.s3_prefixes().is_err());
        assert!(Environment::default().s3_prefixes().expect("empty").is_empty());
    }
}
