//! Source acquisition
//!
//! Stages the sources of enabled sub-projects under the staging root. A
//! populated staging directory is left alone, so acquisition is idempotent.
//! Archives are extracted next to their final location and renamed into
//! place, so an interrupted run never leaves a half-staged directory behind.

use std::path::PathBuf;

use crate::core::features::{self, SourceSpec};
use crate::core::options::{BuildConfiguration, Feature};
use crate::error::{AcquireError, DownloadError};
use crate::infra::archive::{self, ArchiveError, ArchiveFormat};
use crate::infra::download::Downloader;
use crate::infra::filesystem;

/// Options for acquiring sources
#[derive(Debug, Clone, Copy, Default)]
pub struct AcquireOptions {
    /// Remove and re-fetch sources that are already staged
    pub force: bool,
}

/// One source to stage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceRequest {
    /// Feature the source belongs to
    pub feature: String,
    /// Archive origin
    pub url: String,
    /// Directory name under the staging root
    pub dir: String,
    /// Optional SHA-256 pin
    pub sha256: Option<String>,
}

impl SourceRequest {
    pub fn from_spec(feature: Feature, spec: &SourceSpec) -> Self {
        Self {
            feature: feature.name().to_string(),
            url: spec.url.to_string(),
            dir: spec.dir.to_string(),
            sha256: spec.sha256.map(str::to_string),
        }
    }
}

/// Source requests for the enabled features, in catalog order
pub fn requests(config: &BuildConfiguration) -> Vec<SourceRequest> {
    features::enabled(config)
        .filter_map(|spec| {
            spec.source
                .map(|source| SourceRequest::from_spec(spec.feature, &source))
        })
        .collect()
}

/// A staged source directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedSource {
    pub feature: String,
    pub path: PathBuf,
    /// Whether this run downloaded it
    pub fetched: bool,
}

/// Result of staging all requested sources
#[derive(Debug, Default)]
pub struct AcquireResult {
    /// Sources downloaded by this run
    pub fetched: Vec<StagedSource>,
    /// Sources that were already staged
    pub skipped: Vec<StagedSource>,
}

/// Stages sources under one staging root
#[derive(Debug, Clone)]
pub struct Acquirer {
    downloader: Downloader,
    staging_root: PathBuf,
    options: AcquireOptions,
}

impl Acquirer {
    pub fn new(staging_root: impl Into<PathBuf>, options: AcquireOptions) -> Self {
        Self::with_downloader(Downloader::new(), staging_root, options)
    }

    pub fn with_downloader(
        downloader: Downloader,
        staging_root: impl Into<PathBuf>,
        options: AcquireOptions,
    ) -> Self {
        Self {
            downloader,
            staging_root: staging_root.into(),
            options,
        }
    }

    /// Stage every request in order, stopping at the first failure
    pub async fn acquire_all(
        &self,
        requests: &[SourceRequest],
    ) -> Result<AcquireResult, AcquireError> {
        let mut result = AcquireResult::default();

        for request in requests {
            let staged = self.acquire(request).await?;
            if staged.fetched {
                result.fetched.push(staged);
            } else {
                result.skipped.push(staged);
            }
        }

        Ok(result)
    }

    /// Stage a single source
    pub async fn acquire(&self, request: &SourceRequest) -> Result<StagedSource, AcquireError> {
        let target = self.staging_root.join(&request.dir);
        let staging_error = |source| AcquireError::Staging {
            feature: request.feature.clone(),
            source,
        };

        if filesystem::is_populated_dir(&target) {
            if !self.options.force {
                tracing::info!(
                    "Sources for {} already staged at {}",
                    request.feature,
                    target.display()
                );
                return Ok(StagedSource {
                    feature: request.feature.clone(),
                    path: target,
                    fetched: false,
                });
            }
            tracing::info!("Removing staged sources for {} (--force)", request.feature);
            filesystem::remove_dir_all(&target).map_err(staging_error)?;
        }

        let format =
            ArchiveFormat::detect(&request.url).ok_or_else(|| AcquireError::Extraction {
                feature: request.feature.clone(),
                archive: PathBuf::from(&request.url),
                source: ArchiveError::Unsupported {
                    name: request.url.clone(),
                },
            })?;

        filesystem::create_dir_all(&self.staging_root).map_err(staging_error)?;

        let archive_path = self
            .staging_root
            .join(format!(".{}.download.{}", request.dir, format.extension()));
        let partial = self.staging_root.join(format!(".{}.partial", request.dir));
        filesystem::remove_dir_all(&partial).map_err(staging_error)?;

        tracing::info!("Fetching {} from {}", request.feature, request.url);
        self.downloader
            .download(&request.url, &archive_path, request.sha256.as_deref())
            .await
            .map_err(|source: DownloadError| AcquireError::Download {
                feature: request.feature.clone(),
                url: request.url.clone(),
                source,
            })?;

        let extracted = archive::extract_stripped(&archive_path, &partial, Some(format));
        if let Err(e) = filesystem::remove_file(&archive_path) {
            tracing::warn!("Could not remove downloaded archive: {e}");
        }
        if let Err(source) = extracted {
            if let Err(e) = filesystem::remove_dir_all(&partial) {
                tracing::warn!("Could not remove partial extraction: {e}");
            }
            return Err(AcquireError::Extraction {
                feature: request.feature.clone(),
                archive: archive_path,
                source,
            });
        }

        filesystem::rename(&partial, &target).map_err(staging_error)?;
        tracing::info!("Staged {} at {}", request.feature, target.display());

        Ok(StagedSource {
            feature: request.feature.clone(),
            path: target,
            fetched: true,
        })
    }
}
