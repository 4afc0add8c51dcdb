// src/monitor/registry.rs

//! Resolution and registration of configured watch targets.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::monitor::SharedState;
use crate::watch::{clean_path, PathFilter, WatchHandle};

/// One configured watch target, as supplied on the command line.
///
/// Immutable; consumed at startup (and again by the recovery sweep) to
/// attempt registration. The rootfs prefix is applied during resolution, not
/// stored here.
#[derive(Debug, Clone)]
pub struct WatchPathSpec {
    pub raw: String,
    pub recursive: bool,
}

impl WatchPathSpec {
    pub fn new(raw: impl Into<String>, recursive: bool) -> Self {
        Self {
            raw: raw.into(),
            recursive,
        }
    }

    /// Resolve against the rootfs prefix into an absolute, cleaned path.
    pub fn resolve(&self, rootfs: &Path) -> PathBuf {
        let joined = if rootfs.as_os_str().is_empty() {
            PathBuf::from(&self.raw)
        } else {
            rootfs.join(self.raw.trim_start_matches('/'))
        };

        let abs = std::path::absolute(&joined).unwrap_or(joined);
        clean_path(&abs)
    }
}

/// Paths that failed registration, split by watch mode.
///
/// A processed path lives in exactly one place: either registered with the
/// watch primitive or in one of these two sets.
#[derive(Debug, Default)]
pub struct PendingSet {
    paths: BTreeSet<PathBuf>,
    recursive: BTreeSet<PathBuf>,
}

impl PendingSet {
    pub fn insert(&mut self, path: PathBuf, recursive: bool) {
        if recursive {
            self.recursive.insert(path);
        } else {
            self.paths.insert(path);
        }
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn len_recursive(&self) -> usize {
        self.recursive.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty() && self.recursive.is_empty()
    }

    /// Remove and return both sets, e.g. for a retry pass. Failures are
    /// re-inserted by the caller.
    pub fn take_all(&mut self) -> (Vec<PathBuf>, Vec<PathBuf>) {
        (
            std::mem::take(&mut self.paths).into_iter().collect(),
            std::mem::take(&mut self.recursive).into_iter().collect(),
        )
    }
}

/// Attempt registration for every spec, failing open.
///
/// A path that cannot be registered (not found, permission denied) is queued
/// into the pending set with a warning and never aborts the others. A file
/// target excluded by the regex filter is never watched at all; its events
/// would be dropped anyway, and a one-shot snapshot would leave permanently
/// stale series.
pub fn register_specs(
    handle: &WatchHandle,
    state: &SharedState,
    rootfs: &Path,
    specs: &[WatchPathSpec],
    filter: Option<&PathFilter>,
) {
    for spec in specs {
        let path = spec.resolve(rootfs);

        if let Some(f) = filter {
            if !spec.recursive && f.excludes_file(&path) {
                debug!(path = %path.display(), "path excluded by regex filter");
                continue;
            }
        }

        let result = if spec.recursive {
            debug!(path = %path.display(), "monitoring path recursively");
            handle.add_recursive(&path)
        } else {
            debug!(path = %path.display(), "monitoring path");
            handle.add(&path)
        };

        let mut st = state.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        match result {
            Ok(()) => {
                if spec.recursive {
                    st.registered_recursive.insert(path);
                } else {
                    st.registered.insert(path);
                }
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "unable to add path for watching; queued as pending"
                );
                st.pending.insert(path, spec.recursive);
            }
        }
    }
}
