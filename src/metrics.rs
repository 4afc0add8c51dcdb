// src/metrics.rs

//! The metric families this exporter publishes.
//!
//! All per-file series are keyed by the normalized path label
//! (see [`crate::watch::path_utils::normalize_label`]); the reconciler
//! creates and deletes label sets as files appear and disappear. The
//! registry itself is thread-safe, so the reconciler loop, the retry loop
//! and the HTTP scrape handler can all touch it concurrently.

use prometheus::proto::MetricFamily;
use prometheus::{Encoder, Gauge, GaugeVec, IntCounterVec, Opts, Registry, TextEncoder};

/// Owns the registry and the six metric families.
///
/// Constructed once at startup and shared via `Arc`. Tests build their own
/// instance so series from one test never leak into another.
pub struct FileMetrics {
    registry: Registry,
    stat_modified: GaugeVec,
    permissions: GaugeVec,
    content_hash: GaugeVec,
    events: IntCounterVec,
    pending_paths: Gauge,
    pending_recursive_paths: Gauge,
}

impl std::fmt::Debug for FileMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileMetrics").finish_non_exhaustive()
    }
}

impl FileMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let stat_modified = GaugeVec::new(
            Opts::new(
                "file_stat_modified_time_seconds",
                "The unix time the file was last modified",
            ),
            &["path"],
        )?;
        registry.register(Box::new(stat_modified.clone()))?;

        let permissions = GaugeVec::new(
            Opts::new("file_permissions", "The permissions of a file"),
            &["path"],
        )?;
        registry.register(Box::new(permissions.clone()))?;

        let content_hash = GaugeVec::new(
            Opts::new(
                "file_content_hash_crc32",
                "The CRC32 hash of the file's content",
            ),
            &["path"],
        )?;
        registry.register(Box::new(content_hash.clone()))?;

        let events = IntCounterVec::new(
            Opts::new("file_event", "Events that occur against a file"),
            &["path", "op"],
        )?;
        registry.register(Box::new(events.clone()))?;

        let pending_paths = Gauge::new(
            "file_pending_paths",
            "Paths that are pending monitoring, usually because they were initially not found",
        )?;
        registry.register(Box::new(pending_paths.clone()))?;

        let pending_recursive_paths = Gauge::new(
            "file_pending_recursive_paths",
            "Recursive paths that are pending monitoring, usually because they were initially not found",
        )?;
        registry.register(Box::new(pending_recursive_paths.clone()))?;

        Ok(Self {
            registry,
            stat_modified,
            permissions,
            content_hash,
            events,
            pending_paths,
            pending_recursive_paths,
        })
    }

    pub fn set_modified(&self, label: &str, unix_seconds: f64) {
        self.stat_modified
            .with_label_values(&[label])
            .set(unix_seconds);
    }

    pub fn set_permissions(&self, label: &str, value: f64) {
        self.permissions.with_label_values(&[label]).set(value);
    }

    pub fn set_content_hash(&self, label: &str, value: f64) {
        self.content_hash.with_label_values(&[label]).set(value);
    }

    pub fn inc_event(&self, label: &str, op: &str) {
        self.events.with_label_values(&[label, op]).inc();
    }

    /// Delete all three per-file gauges for a label.
    ///
    /// Removing an absent label set is not an error; a Remove following a
    /// Rename for the same label must stay a no-op.
    pub fn remove_series(&self, label: &str) {
        let _ = self.stat_modified.remove_label_values(&[label]);
        let _ = self.permissions.remove_label_values(&[label]);
        let _ = self.content_hash.remove_label_values(&[label]);
    }

    pub fn set_pending(&self, count: usize) {
        self.pending_paths.set(count as f64);
    }

    pub fn set_pending_recursive(&self, count: usize) {
        self.pending_recursive_paths.set(count as f64);
    }

    /// Snapshot of every registered family, for the scrape handler and tests.
    pub fn gather(&self) -> Vec<MetricFamily> {
        self.registry.gather()
    }

    /// Render the registry in the Prometheus text exposition format.
    pub fn render(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        let encoder = TextEncoder::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}
