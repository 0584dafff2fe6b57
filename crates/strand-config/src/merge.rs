//! Deep merge of TOML layers.
//!
//! Merging works on raw [`toml::Value`] trees, so a key missing from an
//! upper layer never overrides the layer below it.

use std::collections::HashMap;

/// Which configuration layer a value came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigLayer {
    /// Compiled-in defaults (`defaults.toml`).
    Defaults,
    /// System-wide configuration (`/etc/strand/config.toml`).
    System,
    /// User-level configuration (`~/.strand/config.toml`).
    User,
    /// Workspace-level configuration (`{workspace}/.strand/config.toml`).
    Workspace,
    /// Environment variable fallback.
    Environment,
}

impl std::fmt::Display for ConfigLayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Defaults => write!(f, "defaults"),
            Self::System => write!(f, "system (/etc/strand/config.toml)"),
            Self::User => write!(f, "user (~/.strand/config.toml)"),
            Self::Workspace => write!(f, "workspace (.strand/config.toml)"),
            Self::Environment => write!(f, "environment variable"),
        }
    }
}

/// Tracks which layer set each dotted field path.
pub type FieldSources = HashMap<String, ConfigLayer>;

/// Deep-merge `overlay` into `base`, recording which layer set each leaf.
///
/// Tables merge per key. Scalars and arrays from the overlay replace the base.
pub fn deep_merge_tracking(
    base: &mut toml::Value,
    overlay: &toml::Value,
    prefix: &str,
    layer: &ConfigLayer,
    sources: &mut FieldSources,
) {
    match (base, overlay) {
        (toml::Value::Table(base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let path = join_path(prefix, key);
                if let Some(base_val) = base_table.get_mut(key) {
                    if overlay_val.is_table() {
                        deep_merge_tracking(base_val, overlay_val, &path, layer, sources);
                    } else {
                        *base_val = overlay_val.clone();
                        sources.insert(path, layer.clone());
                    }
                } else {
                    base_table.insert(key.clone(), overlay_val.clone());
                    record_leaves(overlay_val, &path, layer, sources);
                }
            }
        },
        (base, overlay) => {
            *base = overlay.clone();
            sources.insert(prefix.to_owned(), layer.clone());
        },
    }
}

/// Record every leaf under `val` as coming from `layer`.
pub fn record_leaves(
    val: &toml::Value,
    prefix: &str,
    layer: &ConfigLayer,
    sources: &mut FieldSources,
) {
    if let toml::Value::Table(table) = val {
        for (key, child) in table {
            record_leaves(child, &join_path(prefix, key), layer, sources);
        }
    } else {
        sources.insert(prefix.to_owned(), layer.clone());
    }
}

fn join_path(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_owned()
    } else {
        format!("{prefix}.{key}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(s: &str) -> toml::Value {
        toml::from_str(s).unwrap()
    }

    #[test]
    fn overlay_replaces_scalars_and_keeps_siblings() {
        let mut base = parse(
            r#"
            [plugins]
            prefix = "strand-plugin-"
            sandbox = false
            "#,
        );
        let overlay = parse("[plugins]\nsandbox = true\n");
        let mut sources = FieldSources::new();
        deep_merge_tracking(&mut base, &overlay, "", &ConfigLayer::User, &mut sources);

        assert_eq!(base["plugins"]["sandbox"].as_bool(), Some(true));
        assert_eq!(base["plugins"]["prefix"].as_str(), Some("strand-plugin-"));
        assert_eq!(sources.get("plugins.sandbox"), Some(&ConfigLayer::User));
        assert!(!sources.contains_key("plugins.prefix"));
    }

    #[test]
    fn arrays_are_replaced_not_appended() {
        let mut base = parse("reserved = [\"devtools\"]\n");
        let overlay = parse("reserved = [\"tools\", \"kit\"]\n");
        let mut sources = FieldSources::new();
        deep_merge_tracking(&mut base, &overlay, "", &ConfigLayer::Workspace, &mut sources);
        assert_eq!(base["reserved"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn new_tables_record_all_leaves() {
        let mut base = parse("[plugins]\nsandbox = false\n");
        let overlay = parse("[plugins.wasm]\nmemory_limit_mb = 16\ntimeout_secs = 5\n");
        let mut sources = FieldSources::new();
        deep_merge_tracking(&mut base, &overlay, "", &ConfigLayer::System, &mut sources);
        assert_eq!(
            sources.get("plugins.wasm.memory_limit_mb"),
            Some(&ConfigLayer::System)
        );
        assert_eq!(
            sources.get("plugins.wasm.timeout_secs"),
            Some(&ConfigLayer::System)
        );
    }
}
