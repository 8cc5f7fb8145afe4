//! Archive extraction
//!
//! Unpacks source archives with their single top-level directory stripped, so
//! `quickfix-master/src/...` lands as `<dest>/src/...`.

use flate2::read::GzDecoder;
use std::fs::{self, File};
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Archive extraction errors
#[derive(Error, Debug)]
pub enum ArchiveError {
    /// Archive format not recognised from the file name
    #[error("Unsupported archive format: {name}")]
    Unsupported { name: String },

    /// Archive could not be opened or read
    #[error("Failed to read archive: {reason}")]
    Corrupt { reason: String },

    /// An entry would be written outside the destination
    #[error("Archive entry '{entry}' escapes the destination directory")]
    UnsafeEntry { entry: String },

    /// Writing an entry failed
    #[error("Failed to write '{}'", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Supported archive formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    Zip,
    Tar,
    TarGz,
}

impl ArchiveFormat {
    /// Detect the format from a file name or URL
    pub fn detect(name: &str) -> Option<Self> {
        let lower = name.to_ascii_lowercase();
        if lower.ends_with(".zip") {
            Some(Self::Zip)
        } else if lower.ends_with(".tar.gz") || lower.ends_with(".tgz") {
            Some(Self::TarGz)
        } else if lower.ends_with(".tar") {
            Some(Self::Tar)
        } else {
            None
        }
    }

    /// File extension used when saving a downloaded archive
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Zip => "zip",
            Self::Tar => "tar",
            Self::TarGz => "tar.gz",
        }
    }
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> ArchiveError + '_ {
    move |source| ArchiveError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Drop the first path component, rejecting anything that could escape `dest`
fn strip_root(entry: &Path) -> Result<Option<PathBuf>, ArchiveError> {
    use std::path::Component;

    let mut stripped = PathBuf::new();
    for component in entry.components().skip(1) {
        match component {
            Component::Normal(part) => stripped.push(part),
            Component::CurDir => {}
            _ => {
                return Err(ArchiveError::UnsafeEntry {
                    entry: entry.display().to_string(),
                })
            }
        }
    }

    Ok((!stripped.as_os_str().is_empty()).then_some(stripped))
}

/// Extract `archive` into `dest` with the top-level directory stripped.
///
/// `format` overrides detection from the archive's file name.
pub fn extract_stripped(
    archive: &Path,
    dest: &Path,
    format: Option<ArchiveFormat>,
) -> Result<(), ArchiveError> {
    let format = format
        .or_else(|| ArchiveFormat::detect(&archive.to_string_lossy()))
        .ok_or_else(|| ArchiveError::Unsupported {
            name: archive.display().to_string(),
        })?;

    fs::create_dir_all(dest).map_err(io_error(dest))?;

    let file = File::open(archive).map_err(io_error(archive))?;
    let reader = BufReader::new(file);

    match format {
        ArchiveFormat::Zip => unpack_zip(reader, dest)?,
        ArchiveFormat::Tar => unpack_tar(reader, dest)?,
        ArchiveFormat::TarGz => unpack_tar(GzDecoder::new(reader), dest)?,
    }

    tracing::debug!("Unpacked {} to {}", archive.display(), dest.display());
    Ok(())
}

fn unpack_tar<R: Read>(reader: R, dest: &Path) -> Result<(), ArchiveError> {
    let corrupt = |e: std::io::Error| ArchiveError::Corrupt {
        reason: e.to_string(),
    };

    let mut archive = tar::Archive::new(reader);
    for entry in archive.entries().map_err(corrupt)? {
        let mut entry = entry.map_err(corrupt)?;
        let path = entry.path().map_err(corrupt)?.into_owned();

        let Some(stripped) = strip_root(&path)? else {
            continue;
        };
        let dest_path = dest.join(&stripped);

        if let Some(parent) = dest_path.parent() {
            fs::create_dir_all(parent).map_err(io_error(parent))?;
        }
        entry.unpack(&dest_path).map_err(io_error(&dest_path))?;
    }

    Ok(())
}

fn unpack_zip<R: Read + std::io::Seek>(reader: R, dest: &Path) -> Result<(), ArchiveError> {
    let mut archive = zip::ZipArchive::new(reader).map_err(|e| ArchiveError::Corrupt {
        reason: e.to_string(),
    })?;

    for i in 0..archive.len() {
        let mut file = archive.by_index(i).map_err(|e| ArchiveError::Corrupt {
            reason: e.to_string(),
        })?;

        let path = file
            .enclosed_name()
            .ok_or_else(|| ArchiveError::UnsafeEntry {
                entry: file.name().to_string(),
            })?;

        let Some(stripped) = strip_root(&path)? else {
            continue;
        };
        let dest_path = dest.join(&stripped);

        if file.is_dir() {
            fs::create_dir_all(&dest_path).map_err(io_error(&dest_path))?;
            continue;
        }

        if let Some(parent) = dest_path.parent() {
            fs::create_dir_all(parent).map_err(io_error(parent))?;
        }
        let mut outfile = File::create(&dest_path).map_err(io_error(&dest_path))?;
        std::io::copy(&mut file, &mut outfile).map_err(io_error(&dest_path))?;

        // Keep executable bits for configure scripts
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Some(mode) = file.unix_mode() {
                fs::set_permissions(&dest_path, fs::Permissions::from_mode(mode))
                    .map_err(io_error(&dest_path))?;
            }
        }
    }

    Ok(())
}
