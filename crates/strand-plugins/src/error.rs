//! Plugin error types.

use std::path::PathBuf;

/// Errors from plugin operations.
///
/// Loader-internal failures (a broken plugin, a bad manifest) never surface
/// as this type; they are captured as strings in
/// [`PluginStatus`](crate::PluginStatus). This enum covers the operations a
/// caller invokes directly: registry edits, package manager runs, hooks.
#[derive(Debug, thiserror::Error)]
pub enum PluginError {
    /// The requested plugin was not found.
    #[error("Plugin \"{0}\" could not be found.")]
    NotFound(String),

    /// `unlink` was called for a plugin that was never linked.
    #[error("Plugin {0} is not linked.")]
    NotLinked(String),

    /// The package at a path does not yield a usable plugin.
    #[error("not a plugin package at {path}: {message}")]
    InvalidPackage {
        /// Package root that was inspected.
        path: PathBuf,
        /// Why it was rejected.
        message: String,
    },

    /// The imported module's default export is not a plugin definition.
    #[error("Invalid plugin export")]
    InvalidExport,

    /// Manifest validation failed.
    #[error(transparent)]
    Manifest(#[from] crate::manifest::ManifestError),

    /// A module could not be imported.
    #[error(transparent)]
    Import(#[from] crate::importer::ImportError),

    /// A command-tree operation was rejected.
    #[error(transparent)]
    Command(#[from] crate::command::CommandTreeError),

    /// A lifecycle hook failed.
    #[error("hook {hook} failed for {plugin}: {message}")]
    HookFailed {
        /// Plugin that owns the hook.
        plugin: String,
        /// Hook name.
        hook: String,
        /// Error reported by the hook.
        message: String,
    },

    /// The external package manager failed.
    #[error("package manager command `{command}` failed: {message}")]
    PackageManager {
        /// Command line that was run.
        command: String,
        /// Failure description (stderr or spawn error).
        message: String,
    },

    /// Invalid npm package name or spec.
    #[error("invalid package name '{name}': {reason}")]
    InvalidPackageName {
        /// The invalid name.
        name: String,
        /// Why the name is invalid.
        reason: String,
    },

    /// Registry file read/write/parse error.
    #[error("registry error at {path}: {message}")]
    RegistryError {
        /// Path to the registry file.
        path: PathBuf,
        /// Error description.
        message: String,
    },

    /// Filesystem watcher error.
    #[error("watcher error: {0}")]
    Watcher(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for plugin operations.
pub type PluginResult<T> = Result<T, PluginError>;
