// src/monitor/mod.rs

//! The monitor: composition root for the watch-reconciliation engine.
//!
//! Owns the shared state (pending sets, file-info cache, label map), wires
//! the watch backend to the event reconciler and the pending-path retry
//! loop, and ties both to the cancellation signal.

pub mod reconciler;
pub mod registry;
pub mod retry;
pub mod snapshot;

use std::collections::{BTreeSet, HashMap};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::errors::{ExporterError, Result};
use crate::metrics::FileMetrics;
use crate::watch::{spawn_backend, FileMeta, PathFilter, WatchChannels, WatchHandle};

pub use reconciler::Reconciler;
pub use registry::{register_specs, PendingSet, WatchPathSpec};
pub use retry::{FixedInterval, RetryPolicy, RetryScheduler};
pub use snapshot::{snapshot, snapshot_watched_files};

/// Monitor configuration, produced by the CLI layer.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Prefix prepended when resolving paths and stripped from metric labels.
    pub rootfs: PathBuf,
    /// Non-recursive watch targets (all flag forms merged).
    pub paths: Vec<String>,
    /// Recursive watch targets.
    pub recursive_paths: Vec<String>,
    /// Optional filter restricting which files receive watches.
    pub regex: Option<String>,
    /// Match the regex against the full path instead of the file name.
    pub regex_fullpath: bool,
    /// Interval between pending-path retry passes.
    pub retry_interval: Duration,
}

impl MonitorConfig {
    pub fn is_empty(&self) -> bool {
        self.paths.is_empty() && self.recursive_paths.is_empty()
    }

    /// All configured specs, non-recursive first.
    pub fn specs(&self) -> Vec<WatchPathSpec> {
        self.paths
            .iter()
            .map(|p| WatchPathSpec::new(p.clone(), false))
            .chain(
                self.recursive_paths
                    .iter()
                    .map(|p| WatchPathSpec::new(p.clone(), true)),
            )
            .collect()
    }

    /// The non-recursive specs, the only ones the recovery sweep re-checks.
    pub fn non_recursive_specs(&self) -> Vec<WatchPathSpec> {
        self.paths
            .iter()
            .map(|p| WatchPathSpec::new(p.clone(), false))
            .collect()
    }
}

/// State shared between the reconciler and the retry loop.
///
/// Guarded by a single mutex; lock it briefly and never across an await.
#[derive(Debug, Default)]
pub struct MonitorState {
    pub pending: PendingSet,
    /// Last-observed metadata per absolute path. An entry exists iff the
    /// path is watched and has been observed at least once.
    pub cache: HashMap<PathBuf, FileMeta>,
    /// Live non-recursive watch targets.
    pub registered: BTreeSet<PathBuf>,
    /// Live recursive watch roots.
    pub registered_recursive: BTreeSet<PathBuf>,
    /// Normalized label -> absolute path, for collision detection.
    pub labels: HashMap<String, PathBuf>,
}

pub type SharedState = Arc<Mutex<MonitorState>>;

/// The assembled monitor, ready to run.
pub struct Monitor {
    config: MonitorConfig,
    metrics: Arc<FileMetrics>,
    state: SharedState,
    handle: Arc<WatchHandle>,
    channels: WatchChannels,
    filter: Option<PathFilter>,
}

impl std::fmt::Debug for Monitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Monitor")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Monitor {
    /// Build the watch backend and shared state.
    ///
    /// Fails only for configuration errors: no paths at all, or an invalid
    /// regex. Unresolvable paths are handled later, through the pending
    /// mechanism.
    pub fn new(config: MonitorConfig, metrics: Arc<FileMetrics>) -> Result<Self> {
        if config.is_empty() {
            return Err(ExporterError::ConfigError(
                "you must pass a path or recursive-path to the tool for monitoring"
                    .to_string(),
            ));
        }

        let filter = match &config.regex {
            Some(pattern) => Some(PathFilter::new(pattern, config.regex_fullpath)?),
            None => None,
        };

        let (handle, channels) = spawn_backend(filter.clone())?;

        Ok(Self {
            config,
            metrics,
            state: Arc::new(Mutex::new(MonitorState::default())),
            handle,
            channels,
            filter,
        })
    }

    /// Shared state handle, mainly for tests and diagnostics.
    pub fn state(&self) -> SharedState {
        Arc::clone(&self.state)
    }

    /// Register the configured paths, take the initial snapshot, and run the
    /// reconciler and retry loops until the cancellation token fires.
    pub async fn run(self, cancel: CancellationToken) {
        let Monitor {
            config,
            metrics,
            state,
            handle,
            channels,
            filter,
        } = self;

        register_specs(&handle, &state, &config.rootfs, &config.specs(), filter.as_ref());

        {
            let st = state.lock().unwrap_or_else(PoisonError::into_inner);
            metrics.set_pending(st.pending.len());
            metrics.set_pending_recursive(st.pending.len_recursive());
        }

        // Files that already exist get their first metric value now rather
        // than on their first change.
        snapshot_watched_files(&metrics, &state, &config.rootfs, filter.as_ref());

        info!("starting watcher");

        let retry = RetryScheduler::new(
            Arc::clone(&metrics),
            Arc::clone(&state),
            Arc::clone(&handle),
            config.rootfs.clone(),
            filter.clone(),
            Box::new(FixedInterval::new(config.retry_interval)),
            cancel.clone(),
        );
        let retry_task = tokio::spawn(retry.run());

        let reconciler = Reconciler::new(
            metrics,
            state,
            handle,
            config.rootfs.clone(),
            config.non_recursive_specs(),
            filter,
            channels.event_rx,
            channels.error_rx,
            channels.event_tx,
            cancel,
        );
        reconciler.run().await;

        retry_task.abort();
    }
}
