use std::error::Error;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tempfile::tempdir;
use tokio_util::sync::CancellationToken;

use file_exporter::errors::ExporterError;
use file_exporter::metrics::FileMetrics;
use file_exporter::monitor::{Monitor, MonitorConfig, WatchPathSpec};
use file_exporter::watch::normalize_label;
use file_exporter_test_utils::scrape::{has_file_series, plain_gauge_value};
use file_exporter_test_utils::{init_tracing, wait_until};

type TestResult = Result<(), Box<dyn Error>>;

fn config_with(paths: Vec<String>, recursive: Vec<String>) -> MonitorConfig {
    MonitorConfig {
        rootfs: PathBuf::new(),
        paths,
        recursive_paths: recursive,
        regex: None,
        regex_fullpath: false,
        retry_interval: Duration::from_millis(200),
    }
}

#[tokio::test]
async fn zero_configured_paths_is_a_configuration_error() {
    init_tracing();

    let metrics = Arc::new(FileMetrics::new().unwrap());
    let err = Monitor::new(config_with(Vec::new(), Vec::new()), metrics)
        .err()
        .expect("empty config must be rejected");

    assert!(matches!(err, ExporterError::ConfigError(_)));
}

#[tokio::test]
async fn an_invalid_regex_is_a_configuration_error() {
    init_tracing();

    let metrics = Arc::new(FileMetrics::new().unwrap());
    let mut config = config_with(vec!["/tmp/whatever".to_string()], Vec::new());
    config.regex = Some("[unterminated".to_string());

    assert!(Monitor::new(config, metrics).is_err());
}

#[tokio::test]
async fn missing_path_converges_once_it_becomes_creatable() -> TestResult {
    init_tracing();

    let dir = tempdir()?;
    let missing = dir.path().join("late.conf");
    let raw = missing.to_string_lossy().to_string();

    let metrics = Arc::new(FileMetrics::new()?);
    let monitor = Monitor::new(config_with(vec![raw.clone()], Vec::new()), Arc::clone(&metrics))?;
    let state = monitor.state();

    let cancel = CancellationToken::new();
    let task = tokio::spawn(monitor.run(cancel.clone()));

    // The unresolvable path shows up in the pending gauge.
    assert!(
        wait_until(5, || {
            plain_gauge_value(&metrics, "file_pending_paths") == Some(1.0)
        })
        .await,
        "pending gauge never reached 1"
    );

    // Create the file; within one retry interval it is picked up.
    fs::write(&missing, b"finally")?;

    let label = normalize_label(&WatchPathSpec::new(raw, false).resolve(Path::new("")), Path::new(""));
    assert!(
        wait_until(5, || {
            plain_gauge_value(&metrics, "file_pending_paths") == Some(0.0)
                && has_file_series(&metrics, &label)
        })
        .await,
        "pending path never converged"
    );

    {
        let st = state.lock().unwrap();
        assert!(st.pending.is_empty());
        assert_eq!(st.registered.len(), 1);
    }

    cancel.cancel();
    let _ = task.await;
    Ok(())
}

#[tokio::test]
async fn missing_recursive_path_is_tracked_separately() -> TestResult {
    init_tracing();

    let dir = tempdir()?;
    let missing_dir = dir.path().join("not-yet");
    let raw = missing_dir.to_string_lossy().to_string();

    let metrics = Arc::new(FileMetrics::new()?);
    let monitor = Monitor::new(config_with(Vec::new(), vec![raw]), Arc::clone(&metrics))?;

    let cancel = CancellationToken::new();
    let task = tokio::spawn(monitor.run(cancel.clone()));

    assert!(
        wait_until(5, || {
            plain_gauge_value(&metrics, "file_pending_recursive_paths") == Some(1.0)
                && plain_gauge_value(&metrics, "file_pending_paths") == Some(0.0)
        })
        .await,
        "recursive pending gauge never reached 1"
    );

    fs::create_dir(&missing_dir)?;

    assert!(
        wait_until(5, || {
            plain_gauge_value(&metrics, "file_pending_recursive_paths") == Some(0.0)
        })
        .await,
        "recursive pending path never converged"
    );

    cancel.cancel();
    let _ = task.await;
    Ok(())
}
