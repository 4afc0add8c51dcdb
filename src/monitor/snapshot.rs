// src/monitor/snapshot.rs

//! Per-path metric snapshots.
//!
//! A snapshot recomputes and republishes the three per-file gauges for one
//! path. Failures are per-path and stale-on-error: a gauge that cannot be
//! recomputed keeps its last published value.

use std::path::{Path, PathBuf};
use std::sync::PoisonError;
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::{debug, warn};

use crate::metrics::FileMetrics;
use crate::monitor::SharedState;
use crate::watch::{compute_crc32, normalize_label, FileMeta, PathFilter};

/// Recompute and publish the full gauge set for one path.
///
/// Order matters: the "modified" gauge is a freshness marker set to the
/// current wall-clock time before the stat, so a scrape can tell when the
/// exporter last looked at the file even if the stat then failed.
pub fn snapshot(metrics: &FileMetrics, state: &SharedState, rootfs: &Path, path: &Path) {
    let label = normalize_label(path, rootfs);

    {
        let mut st = state.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = st.labels.insert(label.clone(), path.to_path_buf()) {
            if previous != path {
                warn!(
                    label = %label,
                    previous = %previous.display(),
                    path = %path.display(),
                    "metric label collision; earlier series is being overwritten"
                );
            }
        }
    }

    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0);
    metrics.set_modified(&label, now);

    let meta = match std::fs::metadata(path) {
        Ok(m) => FileMeta::from_std(&m),
        Err(err) => {
            warn!(path = %path.display(), error = %err, "unable to stat file");
            return;
        }
    };

    {
        let mut st = state.lock().unwrap_or_else(PoisonError::into_inner);
        st.cache.insert(path.to_path_buf(), meta);
    }

    metrics.set_permissions(&label, permissions_value(meta.mode));

    match compute_crc32(path) {
        Ok(sum) => metrics.set_content_hash(&label, f64::from(sum)),
        Err(err) => {
            warn!(path = %path.display(), error = %err, "unable to compute content hash");
        }
    }
}

/// Historical permission encoding: the bits are rendered as octal text and
/// that text is read back as a decimal number, so mode 0644 is published as
/// 644 rather than 420. Existing dashboards depend on this.
pub fn permissions_value(mode: u32) -> f64 {
    let octal = format!("{:o}", mode & 0o777);
    octal.parse::<u32>().map(f64::from).unwrap_or(0.0)
}

/// Resnapshot every currently-registered non-directory watch target.
///
/// Non-recursive targets that are directories contribute their immediate
/// children; recursive targets contribute their whole tree. The regex filter
/// restricts which discovered files count, matching registration behaviour.
pub fn snapshot_watched_files(
    metrics: &FileMetrics,
    state: &SharedState,
    rootfs: &Path,
    filter: Option<&PathFilter>,
) {
    debug!("processing all watched files");

    let (non_recursive, recursive) = {
        let st = state.lock().unwrap_or_else(PoisonError::into_inner);
        (
            st.registered.iter().cloned().collect::<Vec<_>>(),
            st.registered_recursive.iter().cloned().collect::<Vec<_>>(),
        )
    };

    let mut files: Vec<PathBuf> = Vec::new();

    for path in non_recursive {
        match std::fs::metadata(&path) {
            Ok(m) if m.is_dir() => collect_files(&path, filter, false, &mut files),
            Ok(_) => {
                if filter.map(|f| f.matches(&path)).unwrap_or(true) {
                    files.push(path);
                }
            }
            Err(_) => {}
        }
    }

    for root in recursive {
        collect_files(&root, filter, true, &mut files);
    }

    for path in files {
        debug!(path = %path.display(), "watched file");
        snapshot(metrics, state, rootfs, &path);
    }
}

/// Collect the regular files under `root` that pass the filter.
fn collect_files(
    root: &Path,
    filter: Option<&PathFilter>,
    recursive: bool,
    out: &mut Vec<PathBuf>,
) {
    let mut stack = vec![root.to_path_buf()];

    while let Some(dir) = stack.pop() {
        let entries = match std::fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(err) => {
                warn!(path = %dir.display(), error = %err, "unable to read directory");
                continue;
            }
        };

        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                if recursive {
                    stack.push(path);
                }
            } else if filter.map(|f| f.matches(&path)).unwrap_or(true) {
                out.push(path);
            }
        }
    }
}
