// src/watch/mod.rs

//! The watch boundary: event/error types, the `notify` adapter, content
//! hashing and label normalization.
//!
//! Nothing in here knows about metrics or pending-path bookkeeping; it only
//! turns filesystem activity into a typed event stream the monitor consumes.

pub mod backend;
pub mod hash;
pub mod path_utils;

pub use backend::{
    spawn_backend, EventKind, FileEvent, FileMeta, PathFilter, WatchChannels,
    WatchError, WatchHandle,
};
pub use hash::compute_crc32;
pub use path_utils::{clean_path, normalize_label};
