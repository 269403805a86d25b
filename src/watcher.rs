//! Polling file watcher that hot-reloads the policy file.
//!
//! Polling (mtime + size) was chosen over OS file events for portability
//! and because it composes with the debounce window: editors that write to
//! a temp file and rename over the target, or flush in several chunks,
//! settle within the debounce and trigger exactly one reload. Reload
//! failures are logged and leave the running policy untouched.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::manager::PolicyManager;
use crate::{Error, Result};

/// Default stat interval.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);
/// Default settle window after the last observed change.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(200);

/// Watches the manager's policy file and triggers [`PolicyManager::reload`]
/// once changes settle.
///
/// `start` and `stop` are idempotent; `stop` joins the polling loop. The
/// watcher only ever talks to the manager through its public reload method.
pub struct PolicyWatcher {
    manager: Arc<PolicyManager>,
    poll_interval: Duration,
    debounce: Duration,
    running: Mutex<Option<WatcherTask>>,
}

struct WatcherTask {
    shutdown: broadcast::Sender<()>,
    handle: JoinHandle<()>,
}

impl PolicyWatcher {
    /// Watcher with the default poll and debounce intervals.
    #[must_use]
    pub fn new(manager: Arc<PolicyManager>) -> Self {
        Self::with_intervals(manager, DEFAULT_POLL_INTERVAL, DEFAULT_DEBOUNCE)
    }

    /// Watcher with explicit intervals (tests tighten these).
    #[must_use]
    pub fn with_intervals(
        manager: Arc<PolicyManager>,
        poll_interval: Duration,
        debounce: Duration,
    ) -> Self {
        Self {
            manager,
            poll_interval,
            debounce,
            running: Mutex::new(None),
        }
    }

    /// Spawn the polling loop. A second call while running is a no-op.
    pub fn start(&self) -> Result<()> {
        let mut running = self.running.lock();
        if running.is_some() {
            return Ok(());
        }
        let Some(path) = self.manager.file_path() else {
            return Err(Error::FileNotConfigured);
        };

        let (shutdown, shutdown_rx) = broadcast::channel(1);
        let handle = spawn_poll_loop(
            path.to_path_buf(),
            Arc::clone(&self.manager),
            self.poll_interval,
            self.debounce,
            shutdown_rx,
        );
        *running = Some(WatcherTask { shutdown, handle });
        info!(path = %path.display(), "Policy watcher started");
        Ok(())
    }

    /// Signal the loop to stop and join it. A call without a running loop
    /// is a no-op.
    pub async fn stop(&self) {
        let task = self.running.lock().take();
        let Some(task) = task else { return };
        let _ = task.shutdown.send(());
        let _ = task.handle.await;
        debug!("Policy watcher stopped");
    }

    /// Whether the polling loop is currently running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.lock().is_some()
    }
}

fn spawn_poll_loop(
    path: PathBuf,
    manager: Arc<PolicyManager>,
    poll_interval: Duration,
    debounce: Duration,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut last_seen = file_signature(&path);
        let mut dirty_since: Option<Instant> = None;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let current = file_signature(&path);
                    if current != last_seen {
                        last_seen = current;
                        dirty_since = Some(Instant::now());
                        debug!(path = %path.display(), "Policy file changed, debouncing");
                    } else if dirty_since.is_some_and(|since| since.elapsed() >= debounce) {
                        dirty_since = None;
                        match manager.reload() {
                            Ok(()) => {
                                info!(path = %path.display(), "Policy file reloaded");
                            }
                            Err(e) => {
                                warn!(
                                    path = %path.display(),
                                    error = %e,
                                    "Policy reload failed, keeping current policy"
                                );
                            }
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    debug!("Policy watcher shutting down");
                    break;
                }
            }
        }
    })
}

/// Modification time and size; either changing marks the file dirty.
/// `None` when the file is momentarily absent (e.g. mid-rename).
fn file_signature(path: &Path) -> Option<(SystemTime, u64)> {
    let meta = std::fs::metadata(path).ok()?;
    Some((meta.modified().ok()?, meta.len()))
}
