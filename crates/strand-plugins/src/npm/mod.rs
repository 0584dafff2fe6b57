//! Package manager integration.
//!
//! The loader and registry never install anything themselves; they delegate
//! to a [`PackageManager`], normally the `npm` binary run as a child process.

mod spec;

pub use spec::NpmSpec;

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use crate::error::{PluginError, PluginResult};

/// Narrow interface over the external package manager.
#[async_trait]
pub trait PackageManager: Send + Sync {
    /// Root directory of globally installed packages, or `None` if the query
    /// fails for any reason.
    async fn global_root(&self) -> Option<PathBuf>;

    /// Install `spec` (e.g. `name@latest`) into `<prefix>/node_modules`.
    async fn install(&self, spec: &NpmSpec, prefix: &Path) -> PluginResult<()>;

    /// Remove `name` from `<prefix>/node_modules`.
    async fn uninstall(&self, spec: &NpmSpec, prefix: &Path) -> PluginResult<()>;
}

/// [`PackageManager`] backed by an npm-compatible binary.
#[derive(Debug, Clone)]
pub struct Npm {
    program: PathBuf,
}

impl Npm {
    /// Locate `program` (e.g. `"npm"`, `"pnpm"`) on `PATH`.
    ///
    /// Falls back to the bare name so a missing binary surfaces as a spawn
    /// error at call time rather than here.
    #[must_use]
    pub fn locate(program: &str) -> Self {
        let program = which::which(program).unwrap_or_else(|_| PathBuf::from(program));
        Self { program }
    }

    /// Use an explicit binary path.
    #[must_use]
    pub fn with_program(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Binary this manager runs.
    #[must_use]
    pub fn program(&self) -> &Path {
        &self.program
    }

    async fn run(&self, args: &[&str]) -> PluginResult<String> {
        let command = format!("{} {}", self.program.display(), args.join(" "));
        debug!(command = %command, "running package manager");

        let output = Command::new(&self.program)
            .args(args)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| PluginError::PackageManager {
                command: command.clone(),
                message: e.to_string(),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(PluginError::PackageManager {
                command,
                message: if stderr.trim().is_empty() {
                    format!("exited with {}", output.status)
                } else {
                    stderr.trim().to_owned()
                },
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl Default for Npm {
    fn default() -> Self {
        Self::locate("npm")
    }
}

#[async_trait]
impl PackageManager for Npm {
    async fn global_root(&self) -> Option<PathBuf> {
        match self.run(&["root", "-g"]).await {
            Ok(stdout) => {
                let root = stdout.trim();
                (!root.is_empty()).then(|| PathBuf::from(root))
            },
            Err(e) => {
                debug!(error = %e, "global package root unavailable");
                None
            },
        }
    }

    async fn install(&self, spec: &NpmSpec, prefix: &Path) -> PluginResult<()> {
        tokio::fs::create_dir_all(prefix).await?;
        let spec = spec.to_string();
        let prefix = prefix.to_string_lossy();
        self.run(&["install", &spec, "--prefix", &prefix]).await?;
        Ok(())
    }

    async fn uninstall(&self, spec: &NpmSpec, prefix: &Path) -> PluginResult<()> {
        let name = spec.full_name();
        let prefix = prefix.to_string_lossy();
        self.run(&["uninstall", &name, "--prefix", &prefix]).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_binary_yields_no_global_root() {
        let npm = Npm::with_program("/nonexistent/strand-test-npm");
        assert!(npm.global_root().await.is_none());
    }

    #[tokio::test]
    async fn missing_binary_fails_install_with_command_context() {
        let npm = Npm::with_program("/nonexistent/strand-test-npm");
        let dir = tempfile::tempdir().unwrap();
        let spec = NpmSpec::parse("strand-plugin-x").unwrap();
        let err = npm.install(&spec, dir.path()).await.unwrap_err();
        match err {
            PluginError::PackageManager { command, .. } => {
                assert!(command.contains("install strand-plugin-x"));
            },
            other => panic!("unexpected error: {other}"),
        }
    }
}
