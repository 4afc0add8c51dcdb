// src/watch/backend.rs

//! Boundary to the filesystem-watch primitive.
//!
//! `notify` does the actual OS-level watching. This module wraps it behind a
//! small surface the monitor can reason about:
//!
//! - [`WatchHandle`] for registering targets (non-recursive or recursive),
//! - [`FileEvent`] / [`EventKind`], a closed tagged union of event kinds,
//! - [`WatchError`], a closed error set in which "a watched target
//!   disappeared" is a distinct variant rather than a sentinel value.
//!
//! The notify callback runs synchronously on the watcher's own thread; raw
//! events are forwarded over an unbounded channel into a translation task
//! which applies the optional regex filter, captures file metadata, and
//! detects disappearing non-recursive targets.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::SystemTime;

use anyhow::{Context, Result};
use notify::event::{ModifyKind, RenameMode};
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use regex::Regex;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::debug;

/// Kinds of file events the reconciler consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Create,
    Write,
    Chmod,
    Remove,
    Rename,
}

impl EventKind {
    /// Value of the `op` label on the event counter. Uppercase; existing
    /// dashboards key on these exact strings.
    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::Create => "CREATE",
            EventKind::Write => "WRITE",
            EventKind::Chmod => "CHMOD",
            EventKind::Remove => "REMOVE",
            EventKind::Rename => "RENAME",
        }
    }
}

/// File metadata captured when an event was observed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FileMeta {
    pub len: u64,
    /// Permission bits, already masked to the lower nine.
    pub mode: u32,
    pub modified: Option<SystemTime>,
    pub is_dir: bool,
}

impl FileMeta {
    pub fn from_std(meta: &std::fs::Metadata) -> Self {
        Self {
            len: meta.len(),
            mode: permission_bits(meta),
            modified: meta.modified().ok(),
            is_dir: meta.is_dir(),
        }
    }
}

#[cfg(unix)]
fn permission_bits(meta: &std::fs::Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    meta.permissions().mode() & 0o777
}

#[cfg(not(unix))]
fn permission_bits(meta: &std::fs::Metadata) -> u32 {
    if meta.permissions().readonly() { 0o444 } else { 0o644 }
}

/// A single translated filesystem event.
#[derive(Debug, Clone)]
pub struct FileEvent {
    pub kind: EventKind,
    pub path: PathBuf,
    /// Previous path, present for renames only.
    pub old_path: Option<PathBuf>,
    /// Metadata captured at event time where the target still existed.
    pub meta: Option<FileMeta>,
}

/// Errors surfaced by the watch boundary.
#[derive(Debug, Error)]
pub enum WatchError {
    #[error("watch target not found: {}", path.display())]
    TargetNotFound { path: PathBuf },

    #[error("watched target disappeared: {}", path.display())]
    TargetDisappeared { path: PathBuf },

    #[error("watch backend error: {0}")]
    Backend(#[from] notify::Error),
}

/// Regex filter restricting which files receive watches and events.
#[derive(Debug, Clone)]
pub struct PathFilter {
    regex: Regex,
    full_path: bool,
}

impl PathFilter {
    pub fn new(pattern: &str, full_path: bool) -> Result<Self, regex::Error> {
        Ok(Self {
            regex: Regex::new(pattern)?,
            full_path,
        })
    }

    /// Whether an explicitly-configured target should be skipped outright:
    /// it exists, it is a regular file, and it fails the filter. Directories
    /// always pass here; their children are filtered individually.
    pub fn excludes_file(&self, path: &Path) -> bool {
        path.is_file() && !self.matches(path)
    }

    /// Match against the full path or just the final component, depending on
    /// how the filter was configured. Paths without a final component (e.g.
    /// a filesystem root) pass in name mode.
    pub fn matches(&self, path: &Path) -> bool {
        if self.full_path {
            self.regex.is_match(&path.to_string_lossy())
        } else {
            match path.file_name() {
                Some(name) => self.regex.is_match(&name.to_string_lossy()),
                None => true,
            }
        }
    }
}

/// Registration handle for the underlying watcher.
///
/// Keeps the `RecommendedWatcher` alive; dropping the last handle stops file
/// watching. The set of non-recursive targets is tracked so the translation
/// task can tell when one of them is removed out from under the watcher.
pub struct WatchHandle {
    inner: Mutex<RecommendedWatcher>,
    targets: Arc<Mutex<BTreeSet<PathBuf>>>,
}

impl std::fmt::Debug for WatchHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatchHandle").finish_non_exhaustive()
    }
}

impl WatchHandle {
    /// Register a single non-recursive watch target.
    pub fn add(&self, path: &Path) -> Result<(), WatchError> {
        let mut watcher = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        map_registration(watcher.watch(path, RecursiveMode::NonRecursive), path)?;
        self.targets
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(path.to_path_buf());
        Ok(())
    }

    /// Register a directory tree for recursive watching.
    pub fn add_recursive(&self, path: &Path) -> Result<(), WatchError> {
        let mut watcher = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        map_registration(watcher.watch(path, RecursiveMode::Recursive), path)
    }
}

fn map_registration(res: notify::Result<()>, path: &Path) -> Result<(), WatchError> {
    match res {
        Ok(()) => Ok(()),
        Err(err) => match &err.kind {
            notify::ErrorKind::PathNotFound => Err(WatchError::TargetNotFound {
                path: path.to_path_buf(),
            }),
            notify::ErrorKind::Io(io) if io.kind() == std::io::ErrorKind::NotFound => {
                Err(WatchError::TargetNotFound {
                    path: path.to_path_buf(),
                })
            }
            _ => Err(WatchError::Backend(err)),
        },
    }
}

/// Channel ends handed to the reconciler.
///
/// `event_tx` feeds the same stream the backend writes to, so the recovery
/// sweep can push synthesized Remove events back through the normal path.
pub struct WatchChannels {
    pub event_rx: mpsc::UnboundedReceiver<FileEvent>,
    pub error_rx: mpsc::UnboundedReceiver<WatchError>,
    pub event_tx: mpsc::UnboundedSender<FileEvent>,
}

/// Create the watcher and spawn the event translation task.
pub fn spawn_backend(
    filter: Option<PathFilter>,
) -> Result<(Arc<WatchHandle>, WatchChannels)> {
    // Channel from the blocking notify callback into the async world.
    let (raw_tx, mut raw_rx) =
        mpsc::unbounded_channel::<notify::Result<notify::Event>>();

    let watcher = RecommendedWatcher::new(
        move |res: notify::Result<notify::Event>| {
            // Runs on the notify worker thread. Send failure means the
            // translation task is gone and the process is shutting down.
            let _ = raw_tx.send(res);
        },
        notify::Config::default(),
    )
    .context("creating filesystem watcher")?;

    let targets = Arc::new(Mutex::new(BTreeSet::new()));
    let handle = Arc::new(WatchHandle {
        inner: Mutex::new(watcher),
        targets: Arc::clone(&targets),
    });

    let (event_tx, event_rx) = mpsc::unbounded_channel::<FileEvent>();
    let (error_tx, error_rx) = mpsc::unbounded_channel::<WatchError>();

    let out_tx = event_tx.clone();
    tokio::spawn(async move {
        while let Some(res) = raw_rx.recv().await {
            match res {
                Ok(event) => {
                    debug!(?event, "received notify event");
                    forward_event(event, filter.as_ref(), &targets, &out_tx, &error_tx);
                }
                Err(err) => {
                    let _ = error_tx.send(WatchError::Backend(err));
                }
            }
        }
        debug!("watch event translation loop finished");
    });

    Ok((
        handle,
        WatchChannels {
            event_rx,
            error_rx,
            event_tx,
        },
    ))
}

/// Translate one notify event into zero or more `FileEvent`s.
fn forward_event(
    event: notify::Event,
    filter: Option<&PathFilter>,
    targets: &Mutex<BTreeSet<PathBuf>>,
    event_tx: &mpsc::UnboundedSender<FileEvent>,
    error_tx: &mpsc::UnboundedSender<WatchError>,
) {
    // A fully tracked rename carries both ends in one event.
    if let notify::EventKind::Modify(ModifyKind::Name(RenameMode::Both)) = event.kind {
        if let [old, new] = event.paths.as_slice() {
            if passes(filter, old) || passes(filter, new) {
                let _ = event_tx.send(FileEvent {
                    kind: EventKind::Rename,
                    path: new.clone(),
                    old_path: Some(old.clone()),
                    meta: read_meta(new),
                });
            }
            note_disappeared(targets, old, error_tx);
            return;
        }
    }

    let kind = match event.kind {
        notify::EventKind::Create(_) => EventKind::Create,
        notify::EventKind::Remove(_) => EventKind::Remove,
        notify::EventKind::Modify(ModifyKind::Metadata(_)) => EventKind::Chmod,
        notify::EventKind::Modify(ModifyKind::Name(RenameMode::From)) => EventKind::Remove,
        notify::EventKind::Modify(ModifyKind::Name(RenameMode::To)) => EventKind::Create,
        notify::EventKind::Modify(_) => EventKind::Write,
        notify::EventKind::Access(_) | notify::EventKind::Any | notify::EventKind::Other => {
            return;
        }
    };

    for path in event.paths {
        if !passes(filter, &path) {
            continue;
        }
        let meta = match kind {
            EventKind::Remove => None,
            _ => read_meta(&path),
        };
        let _ = event_tx.send(FileEvent {
            kind,
            path: path.clone(),
            old_path: None,
            meta,
        });
        if kind == EventKind::Remove {
            note_disappeared(targets, &path, error_tx);
        }
    }
}

fn read_meta(path: &Path) -> Option<FileMeta> {
    std::fs::metadata(path).ok().map(|m| FileMeta::from_std(&m))
}

fn passes(filter: Option<&PathFilter>, path: &Path) -> bool {
    match filter {
        // Directories are never filtered; the filter targets files.
        Some(f) => f.matches(path) || path.is_dir(),
        None => true,
    }
}

/// If a top-level non-recursive target was removed, report it on the error
/// channel so the reconciler can run its recovery sweep.
fn note_disappeared(
    targets: &Mutex<BTreeSet<PathBuf>>,
    path: &Path,
    error_tx: &mpsc::UnboundedSender<WatchError>,
) {
    let removed = targets
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .remove(path);
    if removed {
        let _ = error_tx.send(WatchError::TargetDisappeared {
            path: path.to_path_buf(),
        });
    }
}
