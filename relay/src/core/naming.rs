//! Names derived from configuration: instance names and storage object keys.

use std::collections::BTreeMap;

/// Root prefix used when the prefix mapping has no `root` entry.
pub const DEFAULT_OBJECT_ROOT: &str = "relay";

/// Object type for semaphore objects.
pub const SEMAPHORE_OBJECT_TYPE: &str = "semaphores";

/// `{app}-{target}` family prefix shared by application images and instances.
pub fn application_prefix(app_name: &str, build_target: &str) -> String {
    format!("{app_name}-{build_target}")
}

/// `{prefix}-{index}`.
pub fn indexed_name(prefix: &str, index: u64) -> String {
    format!("{prefix}-{index}")
}

/// Build `{root}/{prefix}/{key}` where `prefix` is looked up by object type
/// and falls back to the type itself.
pub fn object_name(key: &str, object_type: &str, prefixes: &BTreeMap<String, String>) -> String {
    let root = prefixes
        .get("root")
        .map(String::as_str)
        .unwrap_or(DEFAULT_OBJECT_ROOT);
    let prefix = prefixes
        .get(object_type)
        .map(String::as_str)
        .unwrap_or(object_type);
    [root, prefix, key]
        .iter()
        .map(|part| part.trim_matches('/'))
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn application_names_are_indexed() {
        let prefix = application_prefix("shop", "web");
        assert_eq!(prefix, "shop-web");
        assert_eq!(indexed_name(&prefix, 4), "shop-web-4");
    }

    #[test]
    fn object_name_uses_mapped_prefix() {
        let prefixes = BTreeMap::from([
            ("root".to_string(), "jenkins".to_string()),
            ("semaphores".to_string(), "flags/".to_string()),
        ]);
        assert_eq!(
            object_name("deploy-ready", SEMAPHORE_OBJECT_TYPE, &prefixes),
            "jenkins/flags/deploy-ready"
        );
    }

    #[test]
    fn object_name_falls_back_to_type_and_default_root() {
        assert_eq!(
            object_name("build-7", "artifacts", &BTreeMap::new()),
            "relay/artifacts/build-7"
        );
    }
}
