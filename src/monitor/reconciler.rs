// src/monitor/reconciler.rs

//! The event reconciler: single consumer of the watch event and error
//! streams, responsible for all per-file metric lifecycle decisions.
//!
//! The per-event logic is synchronous and exercised directly by tests; the
//! async [`Reconciler::run`] loop is only the channel/cancellation shell
//! around it.

use std::path::PathBuf;
use std::sync::{Arc, PoisonError};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace};

use crate::metrics::FileMetrics;
use crate::monitor::registry::{register_specs, WatchPathSpec};
use crate::monitor::snapshot::snapshot;
use crate::monitor::SharedState;
use crate::watch::{
    normalize_label, EventKind, FileEvent, PathFilter, WatchError, WatchHandle,
};

pub struct Reconciler {
    metrics: Arc<FileMetrics>,
    state: SharedState,
    handle: Arc<WatchHandle>,
    rootfs: PathBuf,
    /// Originally-configured non-recursive specs, re-checked by the recovery
    /// sweep. Recursive watches self-heal through directory notifications and
    /// are never swept.
    sweep_specs: Vec<WatchPathSpec>,
    filter: Option<PathFilter>,
    event_rx: mpsc::UnboundedReceiver<FileEvent>,
    error_rx: mpsc::UnboundedReceiver<WatchError>,
    event_tx: mpsc::UnboundedSender<FileEvent>,
    cancel: CancellationToken,
}

impl std::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("rootfs", &self.rootfs)
            .finish_non_exhaustive()
    }
}

impl Reconciler {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        metrics: Arc<FileMetrics>,
        state: SharedState,
        handle: Arc<WatchHandle>,
        rootfs: PathBuf,
        sweep_specs: Vec<WatchPathSpec>,
        filter: Option<PathFilter>,
        event_rx: mpsc::UnboundedReceiver<FileEvent>,
        error_rx: mpsc::UnboundedReceiver<WatchError>,
        event_tx: mpsc::UnboundedSender<FileEvent>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            metrics,
            state,
            handle,
            rootfs,
            sweep_specs,
            filter,
            event_rx,
            error_rx,
            event_tx,
            cancel,
        }
    }

    /// Main loop: consume events and errors in delivery order until
    /// cancellation. Cancellation is "stop consuming now"; no in-flight
    /// event is drained.
    pub async fn run(mut self) {
        info!("reconciler started");

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    debug!("reconciler cancelled");
                    break;
                }
                maybe_event = self.event_rx.recv() => {
                    match maybe_event {
                        Some(event) => self.handle_event(event),
                        None => break,
                    }
                }
                maybe_error = self.error_rx.recv() => {
                    match maybe_error {
                        Some(err) => self.handle_error(err),
                        None => break,
                    }
                }
            }
        }

        info!("reconciler exiting");
    }

    /// Apply one event's effect on metrics and the file-info cache.
    pub fn handle_event(&self, event: FileEvent) {
        // Fall back to the cache when the event carried no metadata (removes
        // and synthesized events for files that are already gone).
        let meta = event.meta.or_else(|| {
            let st = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            st.cache.get(&event.path).copied()
        });

        let Some(meta) = meta else {
            match event.kind {
                EventKind::Remove | EventKind::Rename => {
                    // Never snapshotted, so there is nothing to tear down.
                    debug!(
                        op = event.kind.as_str(),
                        path = %event.path.display(),
                        "ignoring event for untracked path"
                    );
                }
                EventKind::Create | EventKind::Write | EventKind::Chmod => {
                    error!(
                        op = event.kind.as_str(),
                        path = %event.path.display(),
                        "event carried no file info; dropping"
                    );
                }
            }
            return;
        };

        // Directories never receive metrics.
        if meta.is_dir {
            return;
        }

        let label = normalize_label(&event.path, &self.rootfs);
        debug!(path = %label, op = event.kind.as_str(), "event received");

        match event.kind {
            EventKind::Remove => {
                self.metrics.inc_event(&label, event.kind.as_str());
                self.metrics.remove_series(&label);

                let mut st = self.state.lock().unwrap_or_else(PoisonError::into_inner);
                st.cache.remove(&event.path);
                st.registered.remove(&event.path);
                st.labels.remove(&label);
            }
            EventKind::Rename => {
                let Some(old_path) = event.old_path.as_deref() else {
                    error!(
                        path = %event.path.display(),
                        "rename event missing the previous path; dropping"
                    );
                    return;
                };

                let old_label = normalize_label(old_path, &self.rootfs);
                self.metrics.inc_event(&old_label, event.kind.as_str());
                self.metrics.remove_series(&old_label);

                {
                    let mut st =
                        self.state.lock().unwrap_or_else(PoisonError::into_inner);
                    st.cache.remove(old_path);
                    st.registered.remove(old_path);
                    st.labels.remove(&old_label);
                    st.cache.insert(event.path.clone(), meta);
                }

                snapshot(&self.metrics, &self.state, &self.rootfs, &event.path);
            }
            EventKind::Create | EventKind::Write | EventKind::Chmod => {
                {
                    let mut st =
                        self.state.lock().unwrap_or_else(PoisonError::into_inner);
                    st.cache.insert(event.path.clone(), meta);
                }

                self.metrics.inc_event(&label, event.kind.as_str());
                snapshot(&self.metrics, &self.state, &self.rootfs, &event.path);
            }
        }
    }

    /// Log a transport error; a disappeared target additionally triggers the
    /// recovery sweep.
    pub fn handle_error(&self, err: WatchError) {
        error!(error = %err, "watch error");

        if matches!(err, WatchError::TargetDisappeared { .. }) {
            self.recovery_sweep();
        }
    }

    /// Re-check every originally-configured non-recursive path. Missing ones
    /// get a synthesized Remove pushed through the normal event path (with
    /// cached metadata, so teardown can proceed even though the file is
    /// gone), then go back into the pending mechanism.
    fn recovery_sweep(&self) {
        let mut missing: Vec<WatchPathSpec> = Vec::new();

        for spec in &self.sweep_specs {
            let path = spec.resolve(&self.rootfs);
            trace!(path = %path.display(), "sweep: checking configured path");

            match std::fs::metadata(&path) {
                Ok(_) => {}
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                    let meta = {
                        let st =
                            self.state.lock().unwrap_or_else(PoisonError::into_inner);
                        st.cache.get(&path).copied()
                    };
                    trace!(
                        path = %path.display(),
                        cache_hit = meta.is_some(),
                        "sweep: triggering remove event"
                    );

                    let _ = self.event_tx.send(FileEvent {
                        kind: EventKind::Remove,
                        path: path.clone(),
                        old_path: None,
                        meta,
                    });

                    missing.push(spec.clone());
                }
                Err(_) => {}
            }
        }

        if !missing.is_empty() {
            register_specs(
                &self.handle,
                &self.state,
                &self.rootfs,
                &missing,
                self.filter.as_ref(),
            );
        }
    }
}
