//! Config file discovery and layered loading.
//!
//! Implements the `Config::load()` algorithm:
//! 1. Parse `defaults.toml` → base
//! 2. Merge `/etc/strand/config.toml` (system)
//! 3. Merge `<home>/config.toml` (user)
//! 4. Merge `{workspace}/.strand/config.toml` (workspace)
//! 5. Apply env var fallbacks for fields no file has set
//! 6. Deserialize merged tree → `Config`
//! 7. Validate

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::env::{apply_env_fallbacks, collect_env_vars};
use crate::error::{ConfigError, ConfigResult};
use crate::merge::{ConfigLayer, FieldSources, deep_merge_tracking, record_leaves};
use crate::types::Config;
use crate::validate;

/// Embedded default configuration.
const DEFAULTS_TOML: &str = include_str!("defaults.toml");

/// Maximum allowed config file size (1 MB).
const MAX_CONFIG_FILE_SIZE: u64 = 1_048_576;

/// A merged configuration together with where each value came from.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    /// The final configuration.
    pub config: Config,
    /// Layer that set each dotted field path.
    pub field_sources: FieldSources,
    /// Config files that were found and merged, in merge order.
    pub loaded_files: Vec<String>,
}

/// Load the configuration with layered file precedence.
///
/// `workspace_root` is the project root; `None` skips the workspace layer.
/// `home_override` is used in place of the resolved strand home directory.
///
/// # Errors
///
/// Returns a [`ConfigError`] if any config file is malformed, an environment
/// fallback is unusable, or the merged configuration fails validation.
pub fn load(
    workspace_root: Option<&Path>,
    home_override: Option<&Path>,
) -> ConfigResult<ResolvedConfig> {
    let home = match home_override {
        Some(h) => h.to_path_buf(),
        None => strand_home()?,
    };
    let layers = [
        (PathBuf::from("/etc/strand/config.toml"), ConfigLayer::System),
        (home.join("config.toml"), ConfigLayer::User),
    ];
    let workspace = workspace_root.map(|root| {
        (
            root.join(".strand").join("config.toml"),
            ConfigLayer::Workspace,
        )
    });

    load_layers(layers.into_iter().chain(workspace), &collect_env_vars())
}

fn load_layers(
    layers: impl IntoIterator<Item = (PathBuf, ConfigLayer)>,
    env_vars: &std::collections::HashMap<String, String>,
) -> ConfigResult<ResolvedConfig> {
    let mut merged: toml::Value =
        toml::from_str(DEFAULTS_TOML).map_err(|e| ConfigError::ParseError {
            path: "<embedded defaults>".to_owned(),
            source: e,
        })?;

    let mut field_sources = FieldSources::new();
    record_leaves(&merged, "", &ConfigLayer::Defaults, &mut field_sources);
    let mut loaded_files = Vec::new();

    for (path, layer) in layers {
        if let Some(overlay) = try_load_file(&path)? {
            deep_merge_tracking(&mut merged, &overlay, "", &layer, &mut field_sources);
            loaded_files.push(path.display().to_string());
            info!(path = %path.display(), layer = %layer, "loaded config");
        }
    }

    let env_count = apply_env_fallbacks(&mut merged, &mut field_sources, env_vars)?;
    if env_count > 0 {
        debug!(count = env_count, "applied environment variable fallbacks");
    }

    let config: Config =
        merged
            .try_into()
            .map_err(|e: toml::de::Error| ConfigError::ParseError {
                path: "<merged config>".to_owned(),
                source: e,
            })?;

    validate::validate(&config)?;

    Ok(ResolvedConfig {
        config,
        field_sources,
        loaded_files,
    })
}

/// Load a config from a single file (no layering).
///
/// # Errors
///
/// Returns a [`ConfigError`] if the file cannot be read, parsed or validated.
pub fn load_file(path: &Path) -> ConfigResult<Config> {
    let value = try_load_file(path)?.ok_or_else(|| ConfigError::ReadError {
        path: path.display().to_string(),
        source: std::io::Error::from(std::io::ErrorKind::NotFound),
    })?;
    let config: Config = value
        .try_into()
        .map_err(|e: toml::de::Error| ConfigError::ParseError {
            path: path.display().to_string(),
            source: e,
        })?;
    validate::validate(&config)?;
    Ok(config)
}

/// Try to load a file, returning `None` if it doesn't exist.
fn try_load_file(path: &Path) -> ConfigResult<Option<toml::Value>> {
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "config file not found, skipping");
            return Ok(None);
        },
        Err(e) => {
            return Err(ConfigError::ReadError {
                path: path.display().to_string(),
                source: e,
            });
        },
    };

    if content.len() as u64 > MAX_CONFIG_FILE_SIZE {
        return Err(ConfigError::ValidationError {
            field: path.display().to_string(),
            message: format!(
                "config file is {} bytes, exceeding the {MAX_CONFIG_FILE_SIZE} byte limit",
                content.len()
            ),
        });
    }

    let value: toml::Value = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
        path: path.display().to_string(),
        source: e,
    })?;

    Ok(Some(value))
}

/// Resolve the strand home directory: `$STRAND_HOME`, else `~/.strand`.
fn strand_home() -> ConfigResult<PathBuf> {
    if let Ok(custom) = std::env::var("STRAND_HOME") {
        let p = PathBuf::from(custom);
        if p.is_absolute() {
            return Ok(p);
        }
        tracing::warn!(path = %p.display(), "STRAND_HOME is not absolute; ignoring");
    }
    directories::BaseDirs::new()
        .map(|d| d.home_dir().join(".strand"))
        .ok_or(ConfigError::NoHomeDir)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn defaults_deserialize_to_default_config() {
        let config: Config = toml::from_str(DEFAULTS_TOML).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn missing_layers_fall_back_to_defaults() {
        let resolved = load_layers(
            [(PathBuf::from("/nonexistent/config.toml"), ConfigLayer::User)],
            &HashMap::new(),
        )
        .unwrap();
        assert_eq!(resolved.config, Config::default());
        assert!(resolved.loaded_files.is_empty());
        assert_eq!(
            resolved.field_sources.get("plugins.prefix"),
            Some(&ConfigLayer::Defaults)
        );
    }

    #[test]
    fn workspace_overrides_user() {
        let dir = tempfile::tempdir().unwrap();
        let user = dir.path().join("user.toml");
        let ws = dir.path().join("ws.toml");
        std::fs::write(&user, "[plugins]\nverbose = true\nwatch_debounce_ms = 250\n").unwrap();
        std::fs::write(&ws, "[plugins]\nwatch_debounce_ms = 100\n").unwrap();

        let resolved = load_layers(
            [(user, ConfigLayer::User), (ws, ConfigLayer::Workspace)],
            &HashMap::new(),
        )
        .unwrap();
        assert!(resolved.config.plugins.verbose);
        assert_eq!(resolved.config.plugins.watch_debounce_ms, 100);
        assert_eq!(resolved.loaded_files.len(), 2);
        assert_eq!(
            resolved.field_sources.get("plugins.watch_debounce_ms"),
            Some(&ConfigLayer::Workspace)
        );
    }

    #[test]
    fn env_fallback_applies_after_files() {
        let env = HashMap::from([("STRAND_LOG".to_owned(), "debug".to_owned())]);
        let resolved = load_layers(std::iter::empty(), &env).unwrap();
        assert_eq!(resolved.config.logging.level, "debug");
    }

    #[test]
    fn invalid_layer_fails_validation() {
        let dir = tempfile::tempdir().unwrap();
        let user = dir.path().join("user.toml");
        std::fs::write(&user, "[logging]\nlevel = \"loud\"\n").unwrap();
        let err = load_layers([(user, ConfigLayer::User)], &HashMap::new()).unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError { .. }));
    }

    #[test]
    fn malformed_file_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "[plugins\n").unwrap();
        let err = load_file(&path).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { .. }));
    }

    #[test]
    fn load_file_nonexistent() {
        let result = load_file(Path::new("/nonexistent/config.toml"));
        assert!(matches!(result, Err(ConfigError::ReadError { .. })));
    }
}
