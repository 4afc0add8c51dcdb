use std::error::Error;
use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use tempfile::tempdir;

use file_exporter::metrics::FileMetrics;
use file_exporter::monitor::snapshot::{permissions_value, snapshot};
use file_exporter::monitor::{MonitorState, SharedState};
use file_exporter::watch::normalize_label;
use file_exporter_test_utils::scrape::{gauge_value, has_file_series};
use file_exporter_test_utils::init_tracing;

type TestResult = Result<(), Box<dyn Error>>;

fn fresh_state() -> SharedState {
    Arc::new(Mutex::new(MonitorState::default()))
}

#[test]
fn snapshot_publishes_all_three_gauges() -> TestResult {
    init_tracing();

    let dir = tempdir()?;
    let path = dir.path().join("app.conf");
    fs::write(&path, b"123456789")?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(&path, fs::Permissions::from_mode(0o644))?;
    }

    let metrics = FileMetrics::new()?;
    let state = fresh_state();
    let rootfs = Path::new("");
    let label = normalize_label(&path, rootfs);

    let before = SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs_f64();
    snapshot(&metrics, &state, rootfs, &path);

    assert!(has_file_series(&metrics, &label));

    let modified =
        gauge_value(&metrics, "file_stat_modified_time_seconds", &label).unwrap();
    assert!(modified >= before, "modified gauge is a freshness marker");

    #[cfg(unix)]
    assert_eq!(gauge_value(&metrics, "file_permissions", &label), Some(644.0));

    assert_eq!(
        gauge_value(&metrics, "file_content_hash_crc32", &label),
        Some(f64::from(0xCBF4_3926u32)),
    );

    // The cache now knows about the file.
    let st = state.lock().unwrap();
    assert!(st.cache.contains_key(&path));
    Ok(())
}

#[test]
fn permission_encoding_is_octal_text_as_decimal() {
    init_tracing();

    // Mode 0644 is published as the number 644, not 420.
    assert_eq!(permissions_value(0o644), 644.0);
    assert_eq!(permissions_value(0o755), 755.0);
    assert_eq!(permissions_value(0o7777), 777.0); // setuid bits are masked off
    assert_eq!(permissions_value(0), 0.0);
}

#[test]
fn snapshot_of_missing_file_leaves_gauges_stale() -> TestResult {
    init_tracing();

    let dir = tempdir()?;
    let path = dir.path().join("flaky.conf");
    fs::write(&path, b"first")?;

    let metrics = FileMetrics::new()?;
    let state = fresh_state();
    let rootfs = Path::new("");
    let label = normalize_label(&path, rootfs);

    snapshot(&metrics, &state, rootfs, &path);
    let hash_before = gauge_value(&metrics, "file_content_hash_crc32", &label).unwrap();
    let perms_before = gauge_value(&metrics, "file_permissions", &label).unwrap();

    // Stat failure: the modified marker still moves, the rest stay put.
    fs::remove_file(&path)?;
    snapshot(&metrics, &state, rootfs, &path);

    assert_eq!(
        gauge_value(&metrics, "file_content_hash_crc32", &label),
        Some(hash_before),
    );
    assert_eq!(gauge_value(&metrics, "file_permissions", &label), Some(perms_before));
    Ok(())
}

#[test]
fn render_exposes_the_metric_families() -> TestResult {
    init_tracing();

    let dir = tempdir()?;
    let path = dir.path().join("rendered.conf");
    fs::write(&path, b"content")?;

    let metrics = FileMetrics::new()?;
    let state = fresh_state();
    snapshot(&metrics, &state, Path::new(""), &path);
    metrics.set_pending(2);

    let body = metrics.render()?;
    assert!(body.contains("file_stat_modified_time_seconds"));
    assert!(body.contains("file_content_hash_crc32"));
    assert!(body.contains("file_pending_paths 2"));
    Ok(())
}
