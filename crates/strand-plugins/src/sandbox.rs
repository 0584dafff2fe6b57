//! Permission bookkeeping for plugin execution.
//!
//! Nothing here enforces isolation. The sandbox records what a plugin asked
//! for, warns about escalation requests, and hands callees a private copy
//! of the runtime context.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::context::PluginRuntimeContext;
use crate::manifest::{Permission, PluginManifest};

/// Per-plugin sandbox.
#[derive(Debug, Clone)]
pub struct PluginSandbox {
    manifest: Arc<PluginManifest>,
    cwd: PathBuf,
    verbose: bool,
}

impl PluginSandbox {
    /// Sandbox for `manifest` rooted at `cwd`.
    #[must_use]
    pub fn new(manifest: Arc<PluginManifest>, cwd: impl Into<PathBuf>, verbose: bool) -> Self {
        Self {
            manifest,
            cwd: cwd.into(),
            verbose,
        }
    }

    /// Working directory of sandboxed runs.
    #[must_use]
    pub fn cwd(&self) -> &Path {
        &self.cwd
    }

    /// Log that the sandbox is being set up.
    pub fn prepare(&self) {
        if self.verbose {
            info!(plugin = %self.manifest.name, cwd = %self.cwd.display(), "preparing sandbox");
        } else {
            debug!(plugin = %self.manifest.name, "preparing sandbox");
        }
    }

    /// Check requested permissions. Never rejects; `sandbox:escape` only
    /// produces a warning.
    pub fn verify_permissions(&self) {
        if self.has_permission(Permission::SandboxEscape) {
            warn!(
                plugin = %self.manifest.name,
                "plugin {} requests sandbox:escape", self.manifest.name
            );
        }
        if self.verbose {
            let granted: Vec<&str> = self
                .manifest
                .permissions
                .iter()
                .map(|p| p.as_str())
                .collect();
            info!(plugin = %self.manifest.name, permissions = ?granted, "permissions verified");
        }
    }

    /// Whether the manifest requests `permission`.
    #[must_use]
    pub fn has_permission(&self, permission: Permission) -> bool {
        self.manifest.permissions.contains(&permission)
    }

    /// Context `f` would receive for `ctx`: a copy marked sandboxed, with
    /// its own permission list and metadata.
    #[must_use]
    pub fn isolate(&self, ctx: &PluginRuntimeContext) -> PluginRuntimeContext {
        let mut isolated = ctx.clone();
        isolated.sandboxed = true;
        isolated.cwd.clone_from(&self.cwd);
        isolated
    }

    /// Run `f` with an isolated copy of `ctx`.
    pub async fn run<F, Fut, T>(&self, ctx: &PluginRuntimeContext, f: F) -> T
    where
        F: FnOnce(PluginRuntimeContext) -> Fut,
        Fut: Future<Output = T>,
    {
        f(self.isolate(ctx)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manifest(permissions: Vec<Permission>) -> Arc<PluginManifest> {
        Arc::new(PluginManifest {
            name: "demo".into(),
            version: "1.0.0".into(),
            permissions,
            ..PluginManifest::default()
        })
    }

    #[test]
    fn permission_lookup() {
        let sandbox = PluginSandbox::new(manifest(vec![Permission::FsRead]), "/w", false);
        assert!(sandbox.has_permission(Permission::FsRead));
        assert!(!sandbox.has_permission(Permission::Network));
        sandbox.prepare();
        sandbox.verify_permissions();
    }

    #[tokio::test]
    async fn run_isolates_permissions_and_meta() {
        let m = manifest(vec![Permission::FsRead, Permission::SandboxEscape]);
        let sandbox = PluginSandbox::new(Arc::clone(&m), "/sandbox", true);
        sandbox.verify_permissions();
        let ctx = PluginRuntimeContext::new("/work", m).with_meta("commandName", "greet");

        let inner = sandbox
            .run(&ctx, |mut isolated| async move {
                isolated.permissions.clear();
                isolated.meta.insert("touched".into(), true.into());
                isolated
            })
            .await;

        assert!(inner.sandboxed);
        assert_eq!(inner.cwd, PathBuf::from("/sandbox"));
        assert!(inner.permissions.is_empty());
        assert!(!ctx.sandboxed);
        assert_eq!(ctx.permissions.len(), 2);
        assert!(!ctx.meta.contains_key("touched"));
        assert_eq!(ctx.meta["commandName"], "greet");
    }
}
