//! Environment variable fallbacks.
//!
//! A variable only fills a field that no config file has set; explicit file
//! values always win.

use std::collections::HashMap;

use crate::error::{ConfigError, ConfigResult};
use crate::merge::{ConfigLayer, FieldSources};

/// Kind of value an environment variable maps to.
#[derive(Debug, Clone, Copy)]
enum EnvKind {
    Str,
    Bool,
}

/// Environment variables and the dotted config fields they fall back into.
const ENV_FALLBACKS: &[(&str, &str, EnvKind)] = &[
    ("STRAND_LOG", "logging.level", EnvKind::Str),
    ("STRAND_LOG_FORMAT", "logging.format", EnvKind::Str),
    ("STRAND_LOG_TARGET", "logging.target", EnvKind::Str),
    ("STRAND_PLUGINS_SANDBOX", "plugins.sandbox", EnvKind::Bool),
    ("STRAND_PLUGINS_VERBOSE", "plugins.verbose", EnvKind::Bool),
];

/// Snapshot the `STRAND_*` variables from the process environment.
#[must_use]
pub fn collect_env_vars() -> HashMap<String, String> {
    std::env::vars()
        .filter(|(k, _)| k.starts_with("STRAND_"))
        .collect()
}

/// Apply environment fallbacks to fields still at their default value.
///
/// Returns the number of fields set from the environment.
///
/// # Errors
///
/// Returns [`ConfigError::EnvError`] if a boolean variable holds an
/// unrecognized value.
pub fn apply_env_fallbacks(
    merged: &mut toml::Value,
    sources: &mut FieldSources,
    env: &HashMap<String, String>,
) -> ConfigResult<usize> {
    let mut applied = 0usize;
    for (var, field, kind) in ENV_FALLBACKS {
        let Some(raw) = env.get(*var) else {
            continue;
        };
        let set_by_file = sources
            .get(*field)
            .is_some_and(|layer| *layer != ConfigLayer::Defaults);
        if set_by_file {
            continue;
        }

        let value = match kind {
            EnvKind::Str => toml::Value::String(raw.clone()),
            EnvKind::Bool => toml::Value::Boolean(parse_bool(var, raw)?),
        };
        set_field(merged, field, value);
        sources.insert((*field).to_owned(), ConfigLayer::Environment);
        applied = applied.saturating_add(1);
    }
    Ok(applied)
}

fn parse_bool(var: &str, raw: &str) -> ConfigResult<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        other => Err(ConfigError::EnvError {
            var_name: var.to_owned(),
            message: format!("expected a boolean, got '{other}'"),
        }),
    }
}

/// Set a dotted path inside a TOML table tree, creating tables as needed.
fn set_field(root: &mut toml::Value, dotted: &str, value: toml::Value) {
    let mut current = root;
    let mut parts = dotted.split('.').peekable();
    while let Some(part) = parts.next() {
        let toml::Value::Table(table) = current else {
            return;
        };
        if parts.peek().is_none() {
            table.insert(part.to_owned(), value);
            return;
        }
        current = table
            .entry(part.to_owned())
            .or_insert_with(|| toml::Value::Table(toml::map::Map::new()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn defaults() -> (toml::Value, FieldSources) {
        let val: toml::Value =
            toml::from_str("[logging]\nlevel = \"warn\"\n[plugins]\nsandbox = false\n").unwrap();
        let mut sources = FieldSources::new();
        sources.insert("logging.level".to_owned(), ConfigLayer::Defaults);
        sources.insert("plugins.sandbox".to_owned(), ConfigLayer::Defaults);
        (val, sources)
    }

    #[test]
    fn env_fills_default_fields() {
        let (mut val, mut sources) = defaults();
        let env = HashMap::from([
            ("STRAND_LOG".to_owned(), "debug".to_owned()),
            ("STRAND_PLUGINS_SANDBOX".to_owned(), "yes".to_owned()),
        ]);
        let n = apply_env_fallbacks(&mut val, &mut sources, &env).unwrap();
        assert_eq!(n, 2);
        assert_eq!(val["logging"]["level"].as_str(), Some("debug"));
        assert_eq!(val["plugins"]["sandbox"].as_bool(), Some(true));
        assert_eq!(
            sources.get("logging.level"),
            Some(&ConfigLayer::Environment)
        );
    }

    #[test]
    fn file_values_beat_env() {
        let (mut val, mut sources) = defaults();
        sources.insert("logging.level".to_owned(), ConfigLayer::User);
        let env = HashMap::from([("STRAND_LOG".to_owned(), "trace".to_owned())]);
        let n = apply_env_fallbacks(&mut val, &mut sources, &env).unwrap();
        assert_eq!(n, 0);
        assert_eq!(val["logging"]["level"].as_str(), Some("warn"));
    }

    #[test]
    fn bad_bool_is_rejected() {
        let (mut val, mut sources) = defaults();
        let env = HashMap::from([("STRAND_PLUGINS_SANDBOX".to_owned(), "maybe".to_owned())]);
        let err = apply_env_fallbacks(&mut val, &mut sources, &env).unwrap_err();
        assert!(matches!(err, ConfigError::EnvError { .. }));
    }
}
