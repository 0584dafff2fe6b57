//! Contexts handed to plugins.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::{Value, json};

use crate::candidate::RuntimeType;
use crate::manifest::{Permission, PluginManifest};

/// What the host exposes to the loader: working directory, version and the
/// span plugin logging nests under.
#[derive(Debug, Clone)]
pub struct HostEnvironment {
    root_path: PathBuf,
    host_version: String,
    span: tracing::Span,
}

impl HostEnvironment {
    /// Environment rooted at `root_path`, reporting the current host version.
    #[must_use]
    pub fn new(root_path: impl Into<PathBuf>) -> Self {
        let root_path = root_path.into();
        let span = tracing::info_span!("plugins", root = %root_path.display());
        Self {
            root_path,
            host_version: strand_core::HOST_VERSION.to_owned(),
            span,
        }
    }

    /// Override the reported host version.
    #[must_use]
    pub fn with_host_version(mut self, version: impl Into<String>) -> Self {
        self.host_version = version.into();
        self
    }

    /// Working directory plugins resolve against.
    #[must_use]
    pub fn root_path(&self) -> &Path {
        &self.root_path
    }

    /// Host version string.
    #[must_use]
    pub fn host_version(&self) -> &str {
        &self.host_version
    }

    /// Span that load cycles run under.
    #[must_use]
    pub fn span(&self) -> &tracing::Span {
        &self.span
    }
}

/// Per-invocation context for hooks and command actions.
///
/// Cloning is the isolation mechanism: a sandboxed run receives its own copy
/// of the permission list and metadata.
#[derive(Debug, Clone)]
pub struct PluginRuntimeContext {
    /// Working directory.
    pub cwd: PathBuf,
    /// The plugin's validated manifest.
    pub manifest: Arc<PluginManifest>,
    /// Whether this context is running inside a sandbox.
    pub sandboxed: bool,
    /// Effective permissions.
    pub permissions: Vec<Permission>,
    /// Free-form values such as `commandName`.
    pub meta: BTreeMap<String, Value>,
}

impl PluginRuntimeContext {
    /// Fresh context whose permissions are the manifest's.
    #[must_use]
    pub fn new(cwd: impl Into<PathBuf>, manifest: Arc<PluginManifest>) -> Self {
        let permissions = manifest.permissions.clone();
        Self {
            cwd: cwd.into(),
            manifest,
            sandboxed: false,
            permissions,
            meta: BTreeMap::new(),
        }
    }

    /// Set one metadata value.
    #[must_use]
    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.meta.insert(key.into(), value.into());
        self
    }

    /// Name of the plugin this context belongs to.
    #[must_use]
    pub fn plugin_name(&self) -> &str {
        &self.manifest.name
    }

    /// JSON form passed to WASM guests.
    #[must_use]
    pub fn to_json(&self) -> Value {
        json!({
            "cwd": self.cwd,
            "plugin": self.manifest.name,
            "version": self.manifest.version,
            "sandboxed": self.sandboxed,
            "permissions": self.permissions,
            "meta": self.meta,
        })
    }
}

/// Context passed to a plugin's `install`.
#[derive(Debug, Clone)]
pub struct PluginContext {
    /// Host working directory.
    pub root_path: PathBuf,
    /// The plugin's package root.
    pub plugin_path: PathBuf,
    /// Plugin name.
    pub plugin_name: String,
    /// Plugin version, `0.0.0` when unknown.
    pub version: String,
    /// How the plugin is installed.
    pub plugin_type: RuntimeType,
    /// Host version.
    pub host_version: String,
    /// Runtime context for hooks fired during install.
    pub runtime: PluginRuntimeContext,
}

impl PluginContext {
    /// JSON form passed to WASM guests.
    #[must_use]
    pub fn to_json(&self) -> Value {
        json!({
            "rootPath": self.root_path,
            "pluginPath": self.plugin_path,
            "pluginName": self.plugin_name,
            "version": self.version,
            "pluginType": self.plugin_type,
            "hostVersion": self.host_version,
            "runtime": self.runtime.to_json(),
        })
    }
}
