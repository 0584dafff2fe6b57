//! Discovery cache.
//!
//! Scanning every plugin source touches many directories, so the scan
//! result is kept in `<cache>/plugins.json` for a short time. An entry is
//! used only while it is younger than the TTL, was written for the same
//! linked paths, and every cached entry file still exists. Reload, watch and
//! every registry change drop it.

use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::candidate::PluginCandidate;
use crate::package::is_file;

/// File name inside the cache directory.
pub const CACHE_FILE: &str = "plugins.json";

#[derive(Debug, Serialize, Deserialize)]
struct CacheFile {
    updated_at: DateTime<Utc>,
    #[serde(default)]
    linked: Vec<PathBuf>,
    candidates: Vec<PluginCandidate>,
}

/// Scan results persisted between runs.
#[derive(Debug, Clone)]
pub struct DiscoveryCache {
    path: PathBuf,
    ttl: Duration,
}

impl DiscoveryCache {
    /// Cache stored in `dir`, valid for `ttl`.
    #[must_use]
    pub fn new(dir: impl AsRef<Path>, ttl: Duration) -> Self {
        Self {
            path: dir.as_ref().join(CACHE_FILE),
            ttl,
        }
    }

    /// Cache file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Cached candidates, or `None` on a miss.
    ///
    /// Misses: no file, an unreadable file, an entry older than the TTL or
    /// dated in the future, different `linked` paths, or an entry file that
    /// is gone.
    pub async fn read(&self, linked: &[PathBuf]) -> Option<Vec<PluginCandidate>> {
        let body = tokio::fs::read_to_string(&self.path).await.ok()?;
        let file: CacheFile = match serde_json::from_str(&body) {
            Ok(file) => file,
            Err(e) => {
                debug!(path = %self.path.display(), error = %e, "ignoring unreadable discovery cache");
                return None;
            },
        };

        let age = Utc::now().signed_duration_since(file.updated_at);
        let ttl = TimeDelta::from_std(self.ttl).unwrap_or(TimeDelta::MAX);
        if age < TimeDelta::zero() || age > ttl {
            debug!(age_ms = age.num_milliseconds(), "discovery cache expired");
            return None;
        }
        if file.linked != linked {
            debug!("linked plugins changed since the discovery cache was written");
            return None;
        }
        for candidate in &file.candidates {
            if !is_file(candidate.entry_file()).await {
                debug!(plugin = candidate.name(), "cached entry file is gone");
                return None;
            }
        }
        Some(file.candidates)
    }

    /// Persist `candidates`. Failures are logged and otherwise ignored.
    pub fn store(&self, linked: &[PathBuf], candidates: &[PluginCandidate]) {
        let file = CacheFile {
            updated_at: Utc::now(),
            linked: linked.to_vec(),
            candidates: candidates.to_vec(),
        };
        if let Err(e) = self.write(&file) {
            warn!(path = %self.path.display(), error = %e, "could not write discovery cache");
        }
    }

    fn write(&self, file: &CacheFile) -> std::io::Result<()> {
        let parent = self.path.parent().unwrap_or(Path::new("."));
        std::fs::create_dir_all(parent)?;
        let body = serde_json::to_vec_pretty(file)?;
        let mut tmp = tempfile::NamedTempFile::new_in(parent)?;
        tmp.write_all(&body)?;
        tmp.persist(&self.path).map_err(|e| e.error)?;
        Ok(())
    }

    /// Drop the cached scan.
    pub fn invalidate(&self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!(path = %self.path.display(), "discovery cache cleared"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {},
            Err(e) => warn!(path = %self.path.display(), error = %e, "could not clear discovery cache"),
        }
    }
}
