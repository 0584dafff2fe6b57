//! Hot reload of the custom plugin directory.
//!
//! ```text
//! filesystem events (notify)
//!   → first path component under the watch root
//!   → pending folder set, debounce timer restarted per event
//!   → timer fires: full loader reload
//! ```

use std::collections::BTreeSet;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::{Mutex, mpsc};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::error::{PluginError, PluginResult};
use crate::loader::PluginLoader;

/// Default debounce interval for file change events.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(500);

/// Folders touched since the last reload, and when to act on them.
#[derive(Debug, Clone)]
pub struct Debouncer {
    delay: Duration,
    pending: BTreeSet<String>,
    deadline: Option<Instant>,
}

impl Debouncer {
    /// Empty debouncer waiting `delay` after the last event.
    #[must_use]
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            pending: BTreeSet::new(),
            deadline: None,
        }
    }

    /// Add `folder` and restart the timer from `now`.
    pub fn record(&mut self, folder: String, now: Instant) {
        self.pending.insert(folder);
        self.deadline = now.checked_add(self.delay);
    }

    /// When the timer fires, if it is running.
    #[must_use]
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// The pending folders, sorted, once the timer has expired at `now`.
    pub fn take_ready(&mut self, now: Instant) -> Option<Vec<String>> {
        let deadline = self.deadline?;
        if now < deadline {
            return None;
        }
        self.deadline = None;
        let ready: Vec<String> = std::mem::take(&mut self.pending).into_iter().collect();
        (!ready.is_empty()).then_some(ready)
    }

    /// Drop pending folders and stop the timer.
    pub fn cancel(&mut self) {
        self.pending.clear();
        self.deadline = None;
    }

    /// Whether nothing is pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

/// Name of the top-level folder under `root` that `path` lives in.
///
/// `None` for paths outside `root` and for `root` itself.
#[must_use]
pub fn affected_folder(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    match relative.components().next()? {
        Component::Normal(name) => Some(name.to_string_lossy().into_owned()),
        _ => None,
    }
}

/// Watches the custom plugin directory and reloads the loader on change.
pub struct PluginWatcher {
    root: PathBuf,
    loader: Arc<Mutex<PluginLoader>>,
    debouncer: Debouncer,
    /// Dropping the handle stops filesystem monitoring.
    watcher: Option<RecommendedWatcher>,
    raw_rx: mpsc::UnboundedReceiver<notify::Result<Event>>,
}

impl std::fmt::Debug for PluginWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginWatcher")
            .field("root", &self.root)
            .field("debouncer", &self.debouncer)
            .field("active", &self.watcher.is_some())
            .finish_non_exhaustive()
    }
}

impl PluginWatcher {
    /// Start watching `root` recursively, creating it first if needed.
    ///
    /// # Errors
    ///
    /// [`PluginError::Io`] when `root` cannot be created and
    /// [`PluginError::Watcher`] when it cannot be watched.
    pub fn new(loader: Arc<Mutex<PluginLoader>>, root: impl Into<PathBuf>) -> PluginResult<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;

        let (raw_tx, raw_rx) = mpsc::unbounded_channel();
        let mut watcher = RecommendedWatcher::new(
            move |res| {
                let _ = raw_tx.send(res);
            },
            notify::Config::default(),
        )
        .map_err(|e| PluginError::Watcher(e.to_string()))?;
        watcher
            .watch(&root, RecursiveMode::Recursive)
            .map_err(|e| PluginError::Watcher(format!("{}: {e}", root.display())))?;
        info!(path = %root.display(), "Watching local plugins");

        Ok(Self {
            root,
            loader,
            debouncer: Debouncer::new(DEFAULT_DEBOUNCE),
            watcher: Some(watcher),
            raw_rx,
        })
    }

    /// Use `delay` instead of [`DEFAULT_DEBOUNCE`].
    #[must_use]
    pub fn with_debounce(mut self, delay: Duration) -> Self {
        self.debouncer = Debouncer::new(delay);
        self
    }

    /// Watched directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Whether the watch handle is still held.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.watcher.is_some()
    }

    /// Process events until Ctrl+C, SIGTERM or the event channel closing,
    /// then [`stop`](Self::stop).
    pub async fn run(&mut self) {
        self.run_until(async {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => debug!("interrupt received, stopping watcher"),
                () = terminate_signal() => debug!("terminate received, stopping watcher"),
            }
        })
        .await;
    }

    /// Process events until `shutdown` completes or the event channel
    /// closes, then [`stop`](Self::stop).
    ///
    /// `shutdown` lives for the whole loop, so a signal that arrives while a
    /// reload is running still ends the loop once the reload returns.
    pub async fn run_until<F>(&mut self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        while self.is_active() {
            let deadline = self.debouncer.deadline();
            tokio::select! {
                biased;

                () = &mut shutdown => break,
                () = async {
                    match deadline {
                        Some(deadline) => tokio::time::sleep_until(deadline).await,
                        None => std::future::pending::<()>().await,
                    }
                } => {
                    self.flush().await;
                }
                event = self.raw_rx.recv() => match event {
                    Some(Ok(event)) => self.handle_event(&event),
                    Some(Err(e)) => warn!(error = %e, "Filesystem watcher error"),
                    None => {
                        debug!("Filesystem watcher channel closed, stopping");
                        break;
                    },
                },
            }
        }
        self.stop();
    }

    /// Cancel the timer and release the watch handle. Returns `false` when
    /// already stopped.
    pub fn stop(&mut self) -> bool {
        self.debouncer.cancel();
        match self.watcher.take() {
            Some(watcher) => {
                drop(watcher);
                info!(path = %self.root.display(), "Stopped watching local plugins");
                true
            },
            None => false,
        }
    }

    fn handle_event(&mut self, event: &Event) {
        match event.kind {
            EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_) => {},
            _ => return,
        }
        let now = Instant::now();
        for path in &event.paths {
            if let Some(folder) = affected_folder(&self.root, path) {
                debug!(path = %path.display(), folder = %folder, kind = ?event.kind, "plugin file changed");
                self.debouncer.record(folder, now);
            }
        }
    }

    async fn flush(&mut self) {
        let Some(folders) = self.debouncer.take_ready(Instant::now()) else {
            return;
        };
        let list = folders.join(", ");
        info!("Detected changes in local plugins: {list}");
        let summary = self.loader.lock().await.reload().await;
        info!(
            loaded = summary.loaded,
            failed = summary.failed,
            "Reloaded local plugins ({list})"
        );
    }
}

impl Drop for PluginWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(unix)]
async fn terminate_signal() {
    use tokio::signal::unix::{SignalKind, signal};
    match signal(SignalKind::terminate()) {
        Ok(mut sig) => {
            sig.recv().await;
        },
        Err(e) => {
            warn!(error = %e, "cannot listen for SIGTERM");
            std::future::pending::<()>().await;
        },
    }
}

#[cfg(not(unix))]
async fn terminate_signal() {
    std::future::pending::<()>().await;
}
