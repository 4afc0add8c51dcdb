// src/watch/path_utils.rs

//! Path cleaning and metric label normalization.

use std::path::{Component, Path, PathBuf};

/// Lexically clean a path: drop `.` components and redundant separators,
/// resolve `..` against preceding components where possible.
///
/// Purely textual; the filesystem is never consulted, so this also works for
/// paths that no longer exist (e.g. when labelling a Remove event).
pub fn clean_path(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();

    for comp in path.components() {
        match comp {
            Component::CurDir => {}
            Component::ParentDir => match out.components().next_back() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                Some(Component::RootDir) => {}
                _ => out.push(".."),
            },
            other => out.push(other.as_os_str()),
        }
    }

    if out.as_os_str().is_empty() {
        PathBuf::from(".")
    } else {
        out
    }
}

/// Derive the canonical metric label for an absolute path.
///
/// The configured rootfs prefix is stripped (keeping a leading slash), the
/// result is lexically cleaned, and separators are forced to forward slashes
/// regardless of host conventions. Deterministic: the same path always yields
/// the same label.
///
/// The prefix is stripped at most once. A path that still begins with the
/// rootfs after stripping (`/host/host/x` under rootfs `/host`) keeps the
/// remainder as-is; callers only ever pass raw event paths, never labels.
pub fn normalize_label(path: &Path, rootfs: &Path) -> String {
    let cleaned = clean_path(path);

    let labelled = if rootfs.as_os_str().is_empty() {
        cleaned
    } else {
        let rootfs = clean_path(rootfs);
        match cleaned.strip_prefix(&rootfs) {
            Ok(rel) => PathBuf::from("/").join(rel),
            Err(_) => cleaned,
        }
    };

    labelled.to_string_lossy().replace('\\', "/")
}
