//! Directory layout for strand home and workspace directories.
//!
//! - [`StrandHome`]: global state at `~/.strand/` (or `$STRAND_HOME`).
//!   Holds the custom plugin directory, the plugin registry, the global
//!   plugin list file and the global config.
//!
//! - [`WorkspaceDir`]: per-project root. Holds the project plugin list file
//!   and an optional `.strand/config.toml`.
//!
//! # Layout
//!
//! ```text
//! ~/.strand/                      (StrandHome)
//! ├── plugins/                      (custom plugin directory, watched)
//! │   ├── node_modules/             (packages installed with the global scope)
//! │   ├── <local-plugin>/           (directly installed local plugins)
//! │   └── registry.json             (persisted registry records)
//! ├── cache/plugins/                (plugin cache)
//! ├── logs/                         (log files when logging to a file)
//! ├── strand.plugins.json           (global plugin list)
//! └── config.toml                   (global config)
//!
//! <project>/
//! ├── node_modules/                 (local and workspace-scoped packages)
//! ├── strand.plugins.json           (project plugin list)
//! └── .strand/config.toml           (workspace config)
//! ```

use std::io;
use std::path::{Path, PathBuf};

/// File name of the project and global plugin list files.
pub const PLUGIN_LIST_FILE: &str = "strand.plugins.json";

/// File name of the persisted plugin registry.
pub const REGISTRY_FILE: &str = "registry.json";

/// Global strand home directory (`~/.strand/` or `$STRAND_HOME`).
#[derive(Debug, Clone)]
pub struct StrandHome {
    root: PathBuf,
}

impl StrandHome {
    /// Resolve the home directory.
    ///
    /// Checks `$STRAND_HOME` first, then `$HOME/.strand/`, then the platform
    /// home directory reported by the OS.
    ///
    /// # Errors
    ///
    /// Returns an error if `$STRAND_HOME` is relative, or if no home directory
    /// can be determined.
    pub fn resolve() -> io::Result<Self> {
        let root = if let Ok(custom) = std::env::var("STRAND_HOME") {
            let p = PathBuf::from(&custom);
            if !p.is_absolute() {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    "STRAND_HOME must be an absolute path",
                ));
            }
            p
        } else if let Ok(home) = std::env::var("HOME") {
            PathBuf::from(home).join(".strand")
        } else {
            directories::BaseDirs::new()
                .map(|d| d.home_dir().join(".strand"))
                .ok_or_else(|| {
                    io::Error::new(
                        io::ErrorKind::NotFound,
                        "neither STRAND_HOME nor HOME environment variable is set",
                    )
                })?
        };

        Ok(Self { root })
    }

    /// Create from an explicit path (useful for testing).
    #[must_use]
    pub fn from_path(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Ensure the plugin and cache directories exist.
    ///
    /// # Errors
    ///
    /// Returns an error if directory creation fails.
    pub fn ensure(&self) -> io::Result<()> {
        std::fs::create_dir_all(self.plugins_dir())?;
        std::fs::create_dir_all(self.plugin_cache_dir())?;
        Ok(())
    }

    /// Root directory path.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path to the global configuration file.
    #[must_use]
    pub fn config_path(&self) -> PathBuf {
        self.root.join("config.toml")
    }

    /// Custom plugin directory (`~/.strand/plugins/`).
    ///
    /// Directly installed local plugins live here as subfolders, and
    /// globally scoped installs land in its `node_modules`.
    #[must_use]
    pub fn plugins_dir(&self) -> PathBuf {
        self.root.join("plugins")
    }

    /// Nested `node_modules` of the custom plugin directory.
    #[must_use]
    pub fn plugins_node_modules(&self) -> PathBuf {
        self.plugins_dir().join("node_modules")
    }

    /// Path to the persisted registry (`~/.strand/plugins/registry.json`).
    #[must_use]
    pub fn registry_path(&self) -> PathBuf {
        self.plugins_dir().join(REGISTRY_FILE)
    }

    /// Path to the global plugin list file.
    #[must_use]
    pub fn plugin_list_path(&self) -> PathBuf {
        self.root.join(PLUGIN_LIST_FILE)
    }

    /// Plugin cache directory (`~/.strand/cache/plugins/`).
    #[must_use]
    pub fn plugin_cache_dir(&self) -> PathBuf {
        self.root.join("cache").join("plugins")
    }

    /// Logs directory (`~/.strand/logs/`).
    #[must_use]
    pub fn logs_dir(&self) -> PathBuf {
        self.root.join("logs")
    }
}

/// Per-project workspace directory.
#[derive(Debug, Clone)]
pub struct WorkspaceDir {
    project_root: PathBuf,
}

impl WorkspaceDir {
    /// Detect the workspace by walking up from `start_dir`.
    ///
    /// Detection order:
    /// 1. Directory containing `.strand/`
    /// 2. Directory containing the project plugin list file
    /// 3. Directory containing `.git`
    /// 4. Fallback to `start_dir` itself
    #[must_use]
    pub fn detect(start_dir: &Path) -> Self {
        let start = if start_dir.is_absolute() {
            start_dir.to_path_buf()
        } else {
            std::env::current_dir().unwrap_or_default().join(start_dir)
        };

        let mut current = start.as_path();
        loop {
            if current.join(".strand").is_dir()
                || current.join(PLUGIN_LIST_FILE).is_file()
                || current.join(".git").exists()
            {
                return Self {
                    project_root: current.to_path_buf(),
                };
            }

            match current.parent() {
                Some(parent) if parent != current => current = parent,
                _ => break,
            }
        }

        Self {
            project_root: start,
        }
    }

    /// Create from an explicit project root (useful for testing).
    #[must_use]
    pub fn from_path(project_root: impl Into<PathBuf>) -> Self {
        Self {
            project_root: project_root.into(),
        }
    }

    /// Project root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.project_root
    }

    /// The `.strand/` directory.
    #[must_use]
    pub fn dot_strand(&self) -> PathBuf {
        self.project_root.join(".strand")
    }

    /// Path to the workspace configuration file.
    #[must_use]
    pub fn config_path(&self) -> PathBuf {
        self.dot_strand().join("config.toml")
    }

    /// Path to the project plugin list file.
    #[must_use]
    pub fn plugin_list_path(&self) -> PathBuf {
        self.project_root.join(PLUGIN_LIST_FILE)
    }

    /// Project `node_modules` directory.
    #[must_use]
    pub fn node_modules(&self) -> PathBuf {
        self.project_root.join("node_modules")
    }
}
