// src/monitor/retry.rs

//! Periodic re-registration of pending paths.
//!
//! Paths that failed an earlier registration attempt are retried on a fixed
//! interval for the lifetime of the monitor. The policy deciding when (and
//! whether) to retry is a trait, so a capped or backoff variant can be
//! substituted without touching the reconciler.

use std::path::PathBuf;
use std::sync::{Arc, PoisonError};
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::metrics::FileMetrics;
use crate::monitor::snapshot::snapshot_watched_files;
use crate::monitor::SharedState;
use crate::watch::{PathFilter, WatchHandle};

/// Decides the delay before each retry pass.
pub trait RetryPolicy: Send {
    /// Delay before the next pass, or `None` to stop retrying.
    fn next_delay(&mut self) -> Option<Duration>;
}

/// Retries forever on a fixed interval, the default behaviour.
#[derive(Debug, Clone)]
pub struct FixedInterval {
    interval: Duration,
}

impl FixedInterval {
    pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(30);

    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }
}

impl Default for FixedInterval {
    fn default() -> Self {
        Self::new(Self::DEFAULT_INTERVAL)
    }
}

impl RetryPolicy for FixedInterval {
    fn next_delay(&mut self) -> Option<Duration> {
        Some(self.interval)
    }
}

/// The retry loop task.
pub struct RetryScheduler {
    metrics: Arc<FileMetrics>,
    state: SharedState,
    handle: Arc<WatchHandle>,
    rootfs: PathBuf,
    filter: Option<PathFilter>,
    policy: Box<dyn RetryPolicy>,
    cancel: CancellationToken,
}

impl std::fmt::Debug for RetryScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryScheduler").finish_non_exhaustive()
    }
}

impl RetryScheduler {
    pub fn new(
        metrics: Arc<FileMetrics>,
        state: SharedState,
        handle: Arc<WatchHandle>,
        rootfs: PathBuf,
        filter: Option<PathFilter>,
        policy: Box<dyn RetryPolicy>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            metrics,
            state,
            handle,
            rootfs,
            filter,
            policy,
            cancel,
        }
    }

    /// Run until cancelled or the policy gives up.
    pub async fn run(mut self) {
        self.publish_pending_gauges();

        while let Some(delay) = self.policy.next_delay() {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    debug!("retry loop cancelled");
                    return;
                }
                _ = tokio::time::sleep(delay) => {
                    self.tick();
                }
            }
        }

        debug!("retry policy exhausted; retry loop finished");
    }

    /// One retry pass over both pending sets.
    fn tick(&mut self) {
        debug!("processing pending paths");
        self.publish_pending_gauges();

        let (paths, recursive) = {
            let mut st = self
                .state
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            st.pending.take_all()
        };

        let mut any_added = false;
        any_added |= self.retry_batch(paths, false);
        any_added |= self.retry_batch(recursive, true);

        // A file that existed before its directory became watchable has never
        // been snapshotted, so refresh everything, not just the new targets.
        if any_added {
            snapshot_watched_files(
                &self.metrics,
                &self.state,
                &self.rootfs,
                self.filter.as_ref(),
            );
        }

        self.publish_pending_gauges();
    }

    fn retry_batch(&self, paths: Vec<PathBuf>, recursive: bool) -> bool {
        let mut any_added = false;

        for path in paths {
            if let Some(f) = &self.filter {
                if !recursive && f.excludes_file(&path) {
                    debug!(path = %path.display(), "pending path excluded by regex filter");
                    continue;
                }
            }

            let result = if recursive {
                self.handle.add_recursive(&path)
            } else {
                self.handle.add(&path)
            };

            let mut st = self
                .state
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            match result {
                Ok(()) => {
                    debug!(path = %path.display(), "successfully added pending path");
                    if recursive {
                        st.registered_recursive.insert(path);
                    } else {
                        st.registered.insert(path);
                    }
                    any_added = true;
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "unable to add pending path for watching; will retry"
                    );
                    st.pending.insert(path, recursive);
                }
            }
        }

        any_added
    }

    fn publish_pending_gauges(&self) {
        let st = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        self.metrics.set_pending(st.pending.len());
        self.metrics.set_pending_recursive(st.pending.len_recursive());
    }
}
