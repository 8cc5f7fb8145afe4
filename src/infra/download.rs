//! HTTP download functionality
//!
//! Streams archives to disk while hashing them. A download is attempted once;
//! failures are reported to the caller, which treats them as fatal.

use futures::StreamExt;
use sha2::{Digest, Sha256};
use std::path::Path;
use std::time::Duration;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;

use crate::config::defaults;
use crate::error::DownloadError;

/// Size and digest of a finished download
#[derive(Debug)]
pub struct DownloadResult {
    /// Size in bytes
    pub size: u64,
    /// SHA256 checksum of the downloaded content
    pub checksum: String,
}

/// Streaming HTTP downloader
#[derive(Debug, Clone)]
pub struct Downloader {
    client: reqwest::Client,
}

impl Downloader {
    /// Create a downloader with the default timeouts
    pub fn new() -> Self {
        Self::with_timeouts(
            Duration::from_secs(defaults::DOWNLOAD_TIMEOUT_SECS),
            Duration::from_secs(defaults::CONNECT_TIMEOUT_SECS),
        )
    }

    /// Create a downloader with custom timeouts
    pub fn with_timeouts(timeout: Duration, connect_timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(timeout)
                .connect_timeout(connect_timeout)
                .user_agent(concat!("eslbuild/", env!("CARGO_PKG_VERSION")))
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
        }
    }

    /// Download `url` to `dest`.
    ///
    /// When `expected_checksum` is given, a mismatching download is deleted
    /// and reported as [`DownloadError::ChecksumFailed`]. A failed transfer
    /// never leaves a partial file behind.
    pub async fn download(
        &self,
        url: &str,
        dest: &Path,
        expected_checksum: Option<&str>,
    ) -> Result<DownloadResult, DownloadError> {
        let result = match self.stream_to_file(url, dest).await {
            Ok(result) => result,
            Err(e) => {
                let _ = tokio::fs::remove_file(dest).await;
                return Err(e);
            }
        };

        if let Some(expected) = expected_checksum {
            if !result.checksum.eq_ignore_ascii_case(expected) {
                let _ = tokio::fs::remove_file(dest).await;
                return Err(DownloadError::ChecksumFailed {
                    file: dest.display().to_string(),
                    expected: expected.to_lowercase(),
                    actual: result.checksum,
                });
            }
        }

        tracing::debug!(
            "Downloaded {url} ({} bytes, sha256 {})",
            result.size,
            result.checksum
        );
        Ok(result)
    }

    async fn stream_to_file(
        &self,
        url: &str,
        dest: &Path,
    ) -> Result<DownloadResult, DownloadError> {
        let network_error = |e: reqwest::Error| DownloadError::NetworkError {
            url: url.to_string(),
            error: e.to_string(),
        };
        let io_error = |path: &Path, e: std::io::Error| DownloadError::IoError {
            path: path.to_path_buf(),
            error: e.to_string(),
        };

        let response = self.client.get(url).send().await.map_err(network_error)?;

        if !response.status().is_success() {
            return Err(DownloadError::NetworkError {
                url: url.to_string(),
                error: format!("HTTP {}", response.status()),
            });
        }

        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| io_error(parent, e))?;
        }

        let mut file = File::create(dest).await.map_err(|e| io_error(dest, e))?;

        let mut hasher = Sha256::new();
        let mut downloaded: u64 = 0;
        let mut stream = response.bytes_stream();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(network_error)?;

            file.write_all(&chunk)
                .await
                .map_err(|e| io_error(dest, e))?;

            hasher.update(&chunk);
            downloaded += chunk.len() as u64;
        }

        file.flush().await.map_err(|e| io_error(dest, e))?;

        Ok(DownloadResult {
            size: downloaded,
            checksum: hex::encode(hasher.finalize()),
        })
    }
}

impl Default for Downloader {
    fn default() -> Self {
        Self::new()
    }
}

/// Compute SHA256 checksum of data
pub fn compute_checksum(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use tempfile::TempDir;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const HELLO_SHA256: &str = "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9";

    // ============================================
    // Unit Tests - Checksums
    // ============================================

    #[test]
    fn test_compute_checksum() {
        assert_eq!(compute_checksum(b"hello world"), HELLO_SHA256);
    }

    #[test]
    fn test_compute_checksum_empty() {
        assert_eq!(
            compute_checksum(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    // ============================================
    // Integration Tests - HTTP
    // ============================================

    #[tokio::test]
    async fn test_download_success() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/master.zip"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"hello world".to_vec()))
            .expect(1)
            .mount(&mock_server)
            .await;

        let temp = TempDir::new().unwrap();
        let dest = temp.path().join("downloads/master.zip");
        let url = format!("{}/master.zip", mock_server.uri());

        let result = Downloader::new()
            .download(&url, &dest, None)
            .await
            .unwrap();

        assert_eq!(result.size, 11);
        assert_eq!(result.checksum, HELLO_SHA256);
        assert_eq!(std::fs::read(&dest).unwrap(), b"hello world");
    }

    #[tokio::test]
    async fn test_download_verified_checksum() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"hello world".to_vec()))
            .mount(&mock_server)
            .await;

        let temp = TempDir::new().unwrap();
        let result = Downloader::new()
            .download(
                &format!("{}/a.zip", mock_server.uri()),
                &temp.path().join("a.zip"),
                Some(&HELLO_SHA256.to_uppercase()),
            )
            .await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_checksum_mismatch_deletes_file() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"tampered".to_vec()))
            .mount(&mock_server)
            .await;

        let temp = TempDir::new().unwrap();
        let dest = temp.path().join("a.zip");
        let result = Downloader::new()
            .download(
                &format!("{}/a.zip", mock_server.uri()),
                &dest,
                Some(HELLO_SHA256),
            )
            .await;

        match result {
            Err(DownloadError::ChecksumFailed { expected, .. }) => {
                assert_eq!(expected, HELLO_SHA256);
            }
            other => panic!("Expected ChecksumFailed, got {other:?}"),
        }
        assert!(!dest.exists());
    }

    #[tokio::test]
    async fn test_http_error_not_retried() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .expect(1)
            .mount(&mock_server)
            .await;

        let temp = TempDir::new().unwrap();
        let dest = temp.path().join("a.zip");
        let result = Downloader::new()
            .download(&format!("{}/a.zip", mock_server.uri()), &dest, None)
            .await;

        match result {
            Err(DownloadError::NetworkError { error, .. }) => assert!(error.contains("503")),
            other => panic!("Expected NetworkError, got {other:?}"),
        }
        assert!(!dest.exists());
    }

    // ============================================
    // Property-Based Tests
    // ============================================

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// Checksums are 64 lowercase hex characters and deterministic
        #[test]
        fn prop_checksum_format(data in proptest::collection::vec(any::<u8>(), 0..1024)) {
            let checksum = compute_checksum(&data);
            prop_assert_eq!(checksum.len(), 64);
            prop_assert!(checksum.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
            prop_assert_eq!(checksum, compute_checksum(&data));
        }
    }
}
