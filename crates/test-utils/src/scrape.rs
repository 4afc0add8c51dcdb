//! Helpers for asserting on metric values in tests.
//!
//! These read the registry's gathered protobuf families directly instead of
//! parsing the text exposition format.

use file_exporter::metrics::FileMetrics;
use prometheus::proto::{Metric, MetricFamily};

fn find_metric<'a>(
    families: &'a [MetricFamily],
    name: &str,
    labels: &[(&str, &str)],
) -> Option<&'a Metric> {
    families
        .iter()
        .find(|f| f.get_name() == name)?
        .get_metric()
        .iter()
        .find(|m| {
            labels.iter().all(|(k, v)| {
                m.get_label()
                    .iter()
                    .any(|lp| lp.get_name() == *k && lp.get_value() == *v)
            })
        })
}

/// Value of a per-path gauge series, or `None` if the series is absent.
pub fn gauge_value(metrics: &FileMetrics, name: &str, path: &str) -> Option<f64> {
    let families = metrics.gather();
    find_metric(&families, name, &[("path", path)]).map(|m| m.get_gauge().get_value())
}

/// Value of an unlabelled gauge.
pub fn plain_gauge_value(metrics: &FileMetrics, name: &str) -> Option<f64> {
    let families = metrics.gather();
    find_metric(&families, name, &[]).map(|m| m.get_gauge().get_value())
}

/// Value of the event counter for a (path, op) pair, or `None` if absent.
pub fn counter_value(metrics: &FileMetrics, path: &str, op: &str) -> Option<f64> {
    let families = metrics.gather();
    find_metric(&families, "file_event", &[("path", path), ("op", op)])
        .map(|m| m.get_counter().get_value())
}

/// Whether all three per-file gauges exist for a path label.
pub fn has_file_series(metrics: &FileMetrics, path: &str) -> bool {
    [
        "file_stat_modified_time_seconds",
        "file_permissions",
        "file_content_hash_crc32",
    ]
    .iter()
    .all(|name| gauge_value(metrics, name, path).is_some())
}

/// Whether none of the three per-file gauges exist for a path label.
pub fn has_no_file_series(metrics: &FileMetrics, path: &str) -> bool {
    [
        "file_stat_modified_time_seconds",
        "file_permissions",
        "file_content_hash_crc32",
    ]
    .iter()
    .all(|name| gauge_value(metrics, name, path).is_none())
}
