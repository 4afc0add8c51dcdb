use std::path::{Path, PathBuf};

use file_exporter::monitor::WatchPathSpec;
use file_exporter::watch::{clean_path, normalize_label};
use file_exporter_test_utils::init_tracing;

#[test]
fn clean_drops_redundant_components() {
    init_tracing();

    assert_eq!(clean_path(Path::new("/etc//nginx/./nginx.conf")), PathBuf::from("/etc/nginx/nginx.conf"));
    assert_eq!(clean_path(Path::new("/etc/nginx/../passwd")), PathBuf::from("/etc/passwd"));
    assert_eq!(clean_path(Path::new("/../etc")), PathBuf::from("/etc"));
    assert_eq!(clean_path(Path::new("")), PathBuf::from("."));
}

#[test]
fn normalize_strips_the_rootfs_prefix() {
    init_tracing();

    let rootfs = Path::new("/host");
    assert_eq!(normalize_label(Path::new("/host/etc/passwd"), rootfs), "/etc/passwd");
    assert_eq!(normalize_label(Path::new("/host//etc/./passwd"), rootfs), "/etc/passwd");

    // Paths outside the rootfs are left alone.
    assert_eq!(normalize_label(Path::new("/etc/passwd"), rootfs), "/etc/passwd");
}

#[test]
fn normalize_without_rootfs_only_cleans() {
    init_tracing();

    let rootfs = Path::new("");
    assert_eq!(normalize_label(Path::new("/var//log/syslog"), rootfs), "/var/log/syslog");
}

#[test]
fn normalize_is_idempotent_and_deterministic() {
    init_tracing();

    let rootfs = Path::new("/host");
    for raw in [
        "/host/etc/passwd",
        "/host//etc/./nginx/../passwd",
        "/etc/passwd",
        "relative/path.txt",
    ] {
        let once = normalize_label(Path::new(raw), rootfs);
        let twice = normalize_label(Path::new(&once), rootfs);
        assert_eq!(once, twice, "normalization must be idempotent for {raw}");

        let again = normalize_label(Path::new(raw), rootfs);
        assert_eq!(once, again, "normalization must be deterministic for {raw}");
    }
}

#[test]
fn rootfs_prefix_is_stripped_at_most_once() {
    init_tracing();

    let rootfs = Path::new("/host");

    // Only the leading rootfs is removed; a second occurrence survives.
    assert_eq!(normalize_label(Path::new("/host/host/x"), rootfs), "/host/x");

    // Applying normalization to the result would strip again, which is why
    // labels are always derived from raw paths, never from other labels.
    assert_eq!(normalize_label(Path::new("/host/x"), rootfs), "/x");
}

#[test]
fn spec_resolution_joins_the_rootfs() {
    init_tracing();

    let spec = WatchPathSpec::new("/etc/passwd", false);
    assert_eq!(spec.resolve(Path::new("/host")), PathBuf::from("/host/etc/passwd"));

    // Without a rootfs the path is used as-is (absolutized and cleaned).
    assert_eq!(spec.resolve(Path::new("")), PathBuf::from("/etc/passwd"));
}
