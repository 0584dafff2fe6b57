//! Configuration struct definitions.
//!
//! Every section derives `Default` with values matching `defaults.toml`, so a
//! partially written file deserializes into a complete [`Config`].

use serde::{Deserialize, Serialize};

/// Top-level strand configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Plugin discovery and loading.
    pub plugins: PluginsSection,
    /// Logging output.
    pub logging: LoggingSection,
}

/// `[plugins]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PluginsSection {
    /// Required folder-name prefix for standalone plugin packages.
    pub prefix: String,
    /// Organization scope whose packages may be plugins (e.g. `@strand`).
    pub scope: String,
    /// Unscoped names under the organization scope that are always plugins.
    pub reserved: Vec<String>,
    /// Run hooks through the permission sandbox.
    pub sandbox: bool,
    /// Emit a lifecycle line for every plugin loaded.
    pub verbose: bool,
    /// Debounce window for the hot-reload watcher, in milliseconds.
    pub watch_debounce_ms: u64,
    /// How long a discovery scan is reused, in milliseconds. `0` disables
    /// the cache.
    pub discovery_cache_ttl_ms: u64,
    /// Package manager binary used for installs and global root lookup.
    pub package_manager: String,
    /// Limits for WASM plugin guests.
    pub wasm: WasmSection,
}

impl Default for PluginsSection {
    fn default() -> Self {
        Self {
            prefix: "strand-plugin-".to_owned(),
            scope: "@strand".to_owned(),
            reserved: vec!["devtools".to_owned()],
            sandbox: false,
            verbose: false,
            watch_debounce_ms: 500,
            discovery_cache_ttl_ms: 30_000,
            package_manager: "npm".to_owned(),
            wasm: WasmSection::default(),
        }
    }
}

/// `[plugins.wasm]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WasmSection {
    /// Guest memory ceiling in MiB.
    pub memory_limit_mb: u64,
    /// Per-call timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for WasmSection {
    fn default() -> Self {
        Self {
            memory_limit_mb: 64,
            timeout_secs: 30,
        }
    }
}

/// `[logging]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// Base filter level (`trace`, `debug`, `info`, `warn`, `error`, `off`).
    pub level: String,
    /// Output format: `pretty`, `compact`, `json` or `full`.
    pub format: String,
    /// Where log lines go: `stderr`, `stdout` or `file`.
    pub target: String,
    /// Log directory for the `file` target. Empty means `<home>/logs`.
    pub directory: String,
    /// File rotation for the `file` target: `daily`, `hourly` or `never`.
    pub rotation: String,
    /// Prefix each line with a timestamp.
    pub timestamps: bool,
    /// Include the source file and line.
    pub file_info: bool,
    /// Extra filter directives (e.g. `strand_plugins=debug`).
    pub directives: Vec<String>,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "warn".to_owned(),
            format: "compact".to_owned(),
            target: "stderr".to_owned(),
            directory: String::new(),
            rotation: "daily".to_owned(),
            timestamps: true,
            file_info: false,
            directives: Vec::new(),
        }
    }
}
