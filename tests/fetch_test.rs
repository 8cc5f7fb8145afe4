//! Integration tests for source acquisition
//!
//! Archives are served by a local mock server. Staging is idempotent, a
//! failed download leaves nothing behind, and pinned checksums are enforced.

use eslbuild::core::acquire::{AcquireOptions, Acquirer, SourceRequest};
use eslbuild::error::{AcquireError, DownloadError};
use eslbuild::infra::download::{compute_checksum, Downloader};
use std::io::Write;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Zip archive with a single top-level directory, as release archives have
fn source_zip() -> Vec<u8> {
    let mut zip = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
    let options = zip::write::SimpleFileOptions::default();
    zip.add_directory("quickfix-1.15.1/", options).unwrap();
    zip.start_file("quickfix-1.15.1/CMakeLists.txt", options)
        .unwrap();
    zip.write_all(b"project(quickfix)\n").unwrap();
    zip.start_file("quickfix-1.15.1/include/quickfix/Session.h", options)
        .unwrap();
    zip.write_all(b"// session\n").unwrap();
    zip.finish().unwrap().into_inner()
}

fn request(server: &MockServer, sha256: Option<String>) -> SourceRequest {
    SourceRequest {
        feature: "with_quickfix".to_string(),
        url: format!("{}/quickfix/archive/v1.15.1.zip", server.uri()),
        dir: "quickfix".to_string(),
        sha256,
    }
}

fn acquirer(staging: &std::path::Path, force: bool) -> Acquirer {
    Acquirer::with_downloader(Downloader::new(), staging, AcquireOptions { force })
}

#[tokio::test]
async fn test_fetch_stages_stripped_source_once() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/quickfix/archive/v1.15.1.zip"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(source_zip()))
        .expect(1)
        .mount(&server)
        .await;

    let temp = TempDir::new().unwrap();
    let staging = temp.path().join("staging");
    let acquirer = acquirer(&staging, false);
    let request = request(&server, None);

    let first = acquirer.acquire_all(&[request.clone()]).await.unwrap();
    assert_eq!(first.fetched.len(), 1);
    assert!(staging.join("quickfix/CMakeLists.txt").exists());
    assert!(staging.join("quickfix/include/quickfix/Session.h").exists());
    assert!(!staging.join("quickfix/quickfix-1.15.1").exists());

    // Second run finds the populated directory and does not download
    let second = acquirer.acquire_all(&[request]).await.unwrap();
    assert!(second.fetched.is_empty());
    assert_eq!(second.skipped.len(), 1);
    assert_eq!(second.skipped[0].path, staging.join("quickfix"));

    // No archive or partial directory is left next to the staged source
    let leftovers: Vec<_> = std::fs::read_dir(&staging)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
        .collect();
    assert_eq!(leftovers, vec!["quickfix".to_string()]);
}

#[tokio::test]
async fn test_force_refetches_staged_source() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/quickfix/archive/v1.15.1.zip"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(source_zip()))
        .expect(1)
        .mount(&server)
        .await;

    let temp = TempDir::new().unwrap();
    let staging = temp.path().join("staging");
    std::fs::create_dir_all(staging.join("quickfix")).unwrap();
    std::fs::write(staging.join("quickfix/stale.txt"), "old").unwrap();

    let staged = acquirer(&staging, true)
        .acquire(&request(&server, None))
        .await
        .unwrap();

    assert!(staged.fetched);
    assert!(!staging.join("quickfix/stale.txt").exists());
    assert!(staging.join("quickfix/CMakeLists.txt").exists());
}

#[tokio::test]
async fn test_failed_download_leaves_nothing_staged() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let temp = TempDir::new().unwrap();
    let staging = temp.path().join("staging");

    let result = acquirer(&staging, false)
        .acquire(&request(&server, None))
        .await;

    match result {
        Err(AcquireError::Download { feature, source, .. }) => {
            assert_eq!(feature, "with_quickfix");
            assert!(matches!(source, DownloadError::NetworkError { .. }));
        }
        other => panic!("Expected Download error, got {other:?}"),
    }
    assert!(!staging.join("quickfix").exists());
}

#[tokio::test]
async fn test_checksum_pin_enforced() {
    let body = source_zip();
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(body.clone()))
        .mount(&server)
        .await;

    let temp = TempDir::new().unwrap();
    let staging = temp.path().join("staging");

    let wrong = "0".repeat(64);
    let result = acquirer(&staging, false)
        .acquire(&request(&server, Some(wrong)))
        .await;
    assert!(matches!(
        result,
        Err(AcquireError::Download {
            source: DownloadError::ChecksumFailed { .. },
            ..
        })
    ));
    assert!(!staging.join("quickfix").exists());

    let staged = acquirer(&staging, false)
        .acquire(&request(&server, Some(compute_checksum(&body))))
        .await
        .unwrap();
    assert!(staged.fetched);
}

#[tokio::test]
async fn test_corrupt_archive_cleans_up() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"not a zip".to_vec()))
        .mount(&server)
        .await;

    let temp = TempDir::new().unwrap();
    let staging = temp.path().join("staging");

    let result = acquirer(&staging, false)
        .acquire(&request(&server, None))
        .await;

    assert!(matches!(result, Err(AcquireError::Extraction { .. })));
    let leftovers: Vec<_> = std::fs::read_dir(&staging)
        .unwrap()
        .map(|e| e.unwrap().file_name())
        .collect();
    assert!(leftovers.is_empty(), "left behind: {leftovers:?}");
}
