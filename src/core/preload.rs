//! Runtime library preloading
//!
//! Platforms without rpath-style resolution need a package's runtime
//! libraries opened in dependency order before its extension module loads.
//! The strategy is chosen once per process by [`preloader_for`].

use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::core::options::Os;
use crate::error::PreloadError;

/// Prefix of load-order manifest file names
pub const MANIFEST_PREFIX: &str = ".load-order-";

/// Opens one library file
pub type Opener = Box<dyn Fn(&Path) -> std::io::Result<()> + Send + Sync>;

/// Loads the runtime libraries listed in a load-order manifest
pub trait LibraryPreloader {
    /// Short name shown in diagnostics
    fn name(&self) -> &'static str;

    /// Open every library listed in `manifest`, in order.
    ///
    /// Library names are resolved relative to the manifest's directory.
    /// Returns the paths that were opened.
    fn preload(&self, manifest: &Path) -> Result<Vec<PathBuf>, PreloadError>;
}

/// Leaves library resolution to the dynamic linker
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopPreloader;

impl LibraryPreloader for NoopPreloader {
    fn name(&self) -> &'static str {
        "noop"
    }

    fn preload(&self, manifest: &Path) -> Result<Vec<PathBuf>, PreloadError> {
        tracing::debug!(
            "Dynamic linker resolves libraries, ignoring {}",
            manifest.display()
        );
        Ok(Vec::new())
    }
}

/// Opens libraries explicitly in manifest order
pub struct OrderedPreloader {
    opener: Opener,
}

impl OrderedPreloader {
    pub fn new(opener: Opener) -> Self {
        Self { opener }
    }
}

impl std::fmt::Debug for OrderedPreloader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrderedPreloader").finish_non_exhaustive()
    }
}

impl LibraryPreloader for OrderedPreloader {
    fn name(&self) -> &'static str {
        "ordered"
    }

    fn preload(&self, manifest: &Path) -> Result<Vec<PathBuf>, PreloadError> {
        // The whole list is read before anything is opened
        let text = std::fs::read_to_string(manifest).map_err(|source| {
            tracing::error!("Cannot read load-order manifest {}", manifest.display());
            PreloadError::Manifest {
                path: manifest.to_path_buf(),
                source,
            }
        })?;

        let dir = manifest.parent().unwrap_or_else(|| Path::new("."));
        let libraries: Vec<PathBuf> = text.split_whitespace().map(|name| dir.join(name)).collect();

        for library in &libraries {
            tracing::debug!("Preloading {}", library.display());
            (self.opener)(library).map_err(|source| {
                tracing::error!("Failed to preload {}: {source}", library.display());
                PreloadError::Load {
                    path: library.clone(),
                    source,
                }
            })?;
        }

        Ok(libraries)
    }
}

/// Opener that only checks the library can be opened for reading
pub fn open_for_read(path: &Path) -> std::io::Result<()> {
    std::fs::File::open(path).map(drop)
}

/// Select the preloader for a target platform
pub fn preloader_for(os: Os, opener: Opener) -> Box<dyn LibraryPreloader> {
    match os {
        Os::Windows => Box::new(OrderedPreloader::new(opener)),
        Os::Linux | Os::Macos => Box::new(NoopPreloader),
    }
}

/// Load-order manifests in a directory, sorted by name
pub fn manifests_in(dir: &Path) -> Vec<PathBuf> {
    WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| {
            entry
                .file_name()
                .to_str()
                .is_some_and(|name| name.starts_with(MANIFEST_PREFIX))
        })
        .map(|entry| entry.into_path())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;

    fn recording_opener(log: Arc<Mutex<Vec<String>>>) -> Opener {
        Box::new(move |path: &Path| {
            let name = path.file_name().unwrap().to_string_lossy().to_string();
            log.lock().unwrap().push(name);
            Ok(())
        })
    }

    #[test]
    fn test_platform_selection() {
        assert_eq!(preloader_for(Os::Linux, Box::new(open_for_read)).name(), "noop");
        assert_eq!(preloader_for(Os::Macos, Box::new(open_for_read)).name(), "noop");
        assert_eq!(
            preloader_for(Os::Windows, Box::new(open_for_read)).name(),
            "ordered"
        );
    }

    #[test]
    fn test_ordered_opens_in_manifest_order() {
        let temp = TempDir::new().unwrap();
        let manifest = temp.path().join(".load-order-esl-0.2.0");
        std::fs::write(&manifest, "quickfix.dll\n  QuantLib.dll\tesl.dll\n").unwrap();

        let log = Arc::new(Mutex::new(Vec::new()));
        let preloader = OrderedPreloader::new(recording_opener(Arc::clone(&log)));
        let opened = preloader.preload(&manifest).unwrap();

        assert_eq!(opened.len(), 3);
        assert_eq!(opened[0], temp.path().join("quickfix.dll"));
        assert_eq!(
            *log.lock().unwrap(),
            vec!["quickfix.dll", "QuantLib.dll", "esl.dll"]
        );
    }

    #[test]
    fn test_ordered_stops_at_first_failure() {
        let temp = TempDir::new().unwrap();
        let manifest = temp.path().join(".load-order-esl-0.2.0");
        std::fs::write(&manifest, "a.dll b.dll c.dll").unwrap();

        let log = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&log);
        let preloader = OrderedPreloader::new(Box::new(move |path: &Path| {
            let name = path.file_name().unwrap().to_string_lossy().to_string();
            seen.lock().unwrap().push(name.clone());
            if name == "b.dll" {
                Err(std::io::Error::new(std::io::ErrorKind::NotFound, "missing"))
            } else {
                Ok(())
            }
        }));

        match preloader.preload(&manifest).unwrap_err() {
            PreloadError::Load { path, source } => {
                assert_eq!(path, temp.path().join("b.dll"));
                assert_eq!(source.kind(), std::io::ErrorKind::NotFound);
            }
            e => panic!("Expected Load error, got {e:?}"),
        }
        assert_eq!(*log.lock().unwrap(), vec!["a.dll", "b.dll"]);
    }

    #[test]
    fn test_missing_manifest_opens_nothing() {
        let temp = TempDir::new().unwrap();
        let log = Arc::new(Mutex::new(Vec::new()));
        let preloader = OrderedPreloader::new(recording_opener(Arc::clone(&log)));

        let result = preloader.preload(&temp.path().join(".load-order-esl-1.0.0"));
        assert!(matches!(result, Err(PreloadError::Manifest { .. })));
        assert!(log.lock().unwrap().is_empty());
    }

    #[test]
    fn test_noop_ignores_manifest() {
        assert!(NoopPreloader
            .preload(Path::new("/nonexistent/.load-order-esl-1.0.0"))
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_open_for_read() {
        let temp = TempDir::new().unwrap();
        let lib = temp.path().join("esl.dll");
        std::fs::write(&lib, b"MZ").unwrap();
        assert!(open_for_read(&lib).is_ok());
        assert!(open_for_read(&temp.path().join("other.dll")).is_err());
    }

    #[test]
    fn test_manifests_in_sorted() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join(".load-order-esl-0.3.0"), "").unwrap();
        std::fs::write(temp.path().join(".load-order-esl-0.2.0"), "").unwrap();
        std::fs::write(temp.path().join("esl.dll"), "").unwrap();

        let found: Vec<_> = manifests_in(temp.path())
            .into_iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(found, vec![".load-order-esl-0.2.0", ".load-order-esl-0.3.0"]);
    }
}
