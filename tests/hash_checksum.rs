use std::error::Error;
use std::fs;

use tempfile::tempdir;

use file_exporter::watch::compute_crc32;
use file_exporter_test_utils::init_tracing;

type TestResult = Result<(), Box<dyn Error>>;

#[test]
fn crc32_of_empty_file_is_zero() -> TestResult {
    init_tracing();

    let dir = tempdir()?;
    let path = dir.path().join("empty");
    fs::write(&path, b"")?;

    assert_eq!(compute_crc32(&path)?, 0);
    Ok(())
}

#[test]
fn crc32_matches_the_standard_check_value() -> TestResult {
    init_tracing();

    let dir = tempdir()?;
    let path = dir.path().join("check");
    fs::write(&path, b"123456789")?;

    // The reference check value for CRC32 (IEEE).
    assert_eq!(compute_crc32(&path)?, 0xCBF4_3926);
    Ok(())
}

#[test]
fn crc32_streams_across_chunk_boundaries() -> TestResult {
    init_tracing();

    // 100 KiB forces several 32 KiB reads plus a short final one.
    let content: Vec<u8> = (0..100 * 1024).map(|i| (i % 251) as u8).collect();

    let dir = tempdir()?;
    let path = dir.path().join("large");
    fs::write(&path, &content)?;

    assert_eq!(compute_crc32(&path)?, crc32fast::hash(&content));
    Ok(())
}

#[test]
fn crc32_of_missing_file_is_an_error() {
    init_tracing();

    let dir = tempdir().unwrap();
    let path = dir.path().join("does-not-exist");

    assert!(compute_crc32(&path).is_err());
}
