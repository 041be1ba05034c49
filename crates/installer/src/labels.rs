//! Labels and annotations put on every generated object

use std::collections::BTreeMap;

/// Instance identifier label
pub const INSTANCE_ID_LABEL: &str = "landscaper.services.microscaler.io/instance-id";

/// Landscaper version label
pub const VERSION_LABEL: &str = "landscaper.services.microscaler.io/version";

/// Component label
pub const COMPONENT_LABEL: &str = "landscaper.services.microscaler.io/component";

/// Marks a copied image pull secret; the value names the platform secret it was copied from
pub const PULL_SECRET_LABEL: &str = "landscaper.services.microscaler.io/pull-secret";

/// Standard managed-by label
pub const MANAGED_BY_LABEL: &str = "app.kubernetes.io/managed-by";

/// Value of the managed-by label
pub const MANAGED_BY: &str = "landscaper-provider";

/// Pod template annotation carrying the hash of the component configuration
pub const CONFIG_HASH_ANNOTATION: &str = "landscaper.services.microscaler.io/config-hash";

/// Pod template annotation carrying the hash of the mounted kubeconfig
pub const KUBECONFIG_HASH_ANNOTATION: &str = "landscaper.services.microscaler.io/kubeconfig-hash";

/// Full label set of an object belonging to `component`.
pub fn labels(instance_id: &str, version: &str, component: &str) -> BTreeMap<String, String> {
    let mut labels = selector_labels(instance_id, component);
    labels.insert(VERSION_LABEL.to_string(), version.to_string());
    labels.insert(MANAGED_BY_LABEL.to_string(), MANAGED_BY.to_string());
    labels
}

/// Labels of objects shared by all components of an instance.
pub fn instance_labels(instance_id: &str, version: &str) -> BTreeMap<String, String> {
    BTreeMap::from([
        (INSTANCE_ID_LABEL.to_string(), instance_id.to_string()),
        (VERSION_LABEL.to_string(), version.to_string()),
        (MANAGED_BY_LABEL.to_string(), MANAGED_BY.to_string()),
    ])
}

/// Labels used in selectors.
///
/// Selectors are immutable, so they must not include the version.
pub fn selector_labels(instance_id: &str, component: &str) -> BTreeMap<String, String> {
    BTreeMap::from([
        (INSTANCE_ID_LABEL.to_string(), instance_id.to_string()),
        (COMPONENT_LABEL.to_string(), component.to_string()),
    ])
}

/// Inserts `entries` into an optional map, keeping unrelated keys.
pub fn merge_into(target: &mut Option<BTreeMap<String, String>>, entries: &BTreeMap<String, String>) {
    let map = target.get_or_insert_with(BTreeMap::new);
    for (key, value) in entries {
        map.insert(key.clone(), value.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_selector_excludes_version() {
        let selector = selector_labels("abc", "helm-deployer");
        assert!(!selector.contains_key(VERSION_LABEL));
        assert_eq!(selector[COMPONENT_LABEL], "helm-deployer");

        let all = labels("abc", "v1", "helm-deployer");
        assert_eq!(all[VERSION_LABEL], "v1");
        assert_eq!(all[MANAGED_BY_LABEL], MANAGED_BY);
    }

    #[test]
    fn test_merge_into_keeps_foreign_keys() {
        let mut target = Some(BTreeMap::from([("other".to_string(), "x".to_string())]));
        merge_into(&mut target, &selector_labels("abc", "rbac"));
        let target = target.unwrap();
        assert_eq!(target.len(), 3);
        assert_eq!(target["other"], "x");
    }
}
