//! Artifact packaging
//!
//! Collects headers, libraries, runtime binaries and license files from every
//! built unit into one package directory. Copying is additive: a file that
//! already exists with identical content is accepted, a differing one is a
//! conflict and is never overwritten. Directory walks are sorted, so the
//! result does not depend on filesystem iteration order.

use regex::Regex;
use serde::Serialize;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::core::builder::BuildPaths;
use crate::core::features::{self, ArtifactLayout, INSTALL_LAYOUT};
use crate::core::options::{BuildConfiguration, Feature, Os};
use crate::core::preload::MANIFEST_PREFIX;
use crate::core::toolchain::{install_prefix, MAIN_PROJECT};
use crate::core::version::VersionTriple;
use crate::error::PackageError;
use crate::infra::filesystem;

const HEADER_PATTERNS: &[&str] = &["*.h", "*.hpp"];
const LICENSE_PATTERNS: &[&str] = &["LICENSE*", "COPYING*"];

/// Kind of packaged file
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactKind {
    /// Kept at its relative path under `include/`
    Header,
    /// Flattened into `lib/`
    Library,
    /// Flattened into `bin/` (Windows DLLs)
    Runtime,
    /// Copied into `licenses/`
    License,
}

/// One file to place in the package
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildArtifact {
    /// Unit that produced the file
    pub unit: String,
    pub kind: ArtifactKind,
    pub source: PathBuf,
    /// Destination relative to the package root
    pub destination: PathBuf,
}

/// A built project whose outputs are packaged
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackagingUnit {
    pub name: String,
    pub feature: Option<Feature>,
    /// Root the artifact layout is relative to
    pub output_root: PathBuf,
    pub layout: ArtifactLayout,
    /// Directory searched for license files
    pub license_root: PathBuf,
}

/// Packaging units for a configuration: sub-projects in catalog order, then
/// the main project
pub fn units(config: &BuildConfiguration, paths: &BuildPaths) -> Vec<PackagingUnit> {
    let mut units = Vec::new();

    for spec in features::enabled(config) {
        let (Some(sub), Some(source), Some(layout)) = (spec.sub_build, spec.source, spec.artifacts)
        else {
            continue;
        };
        let staged = paths.staging_root.join(source.dir);
        let output_root = match sub.kind {
            features::SubBuildKind::InSource => staged.clone(),
            features::SubBuildKind::OutOfTree => install_prefix(&paths.build_root, sub.project),
        };
        units.push(PackagingUnit {
            name: sub.project.to_string(),
            feature: Some(spec.feature),
            output_root,
            layout,
            license_root: staged,
        });
    }

    units.push(PackagingUnit {
        name: MAIN_PROJECT.to_string(),
        feature: None,
        output_root: paths.main_install_prefix(),
        layout: INSTALL_LAYOUT,
        license_root: paths.source_root.clone(),
    });

    units
}

/// Compile shell-style wildcards (`*` only) into one anchored regex
fn wildcard_regex(patterns: &[&str]) -> Regex {
    let alternatives: Vec<String> = patterns
        .iter()
        .map(|p| regex::escape(p).replace(r"\*", ".*"))
        .collect();
    Regex::new(&format!("^(?:{})$", alternatives.join("|")))
        .unwrap_or_else(|e| unreachable!("invalid wildcard pattern: {e}"))
}

const WINDOWS_LIBRARIES: &[&str] = &["*.lib"];
const WINDOWS_RUNTIME: &[&str] = &["*.dll"];
const LINUX_LIBRARIES: &[&str] = &["*.so", "*.so.*", "*.a"];
const MACOS_LIBRARIES: &[&str] = &["*.dylib", "*.a"];

/// Library and runtime patterns for a platform
fn binary_patterns(os: Os) -> (&'static [&'static str], &'static [&'static str]) {
    match os {
        Os::Windows => (WINDOWS_LIBRARIES, WINDOWS_RUNTIME),
        Os::Linux => (LINUX_LIBRARIES, &[]),
        Os::Macos => (MACOS_LIBRARIES, &[]),
    }
}

/// Files under `dir` whose names match `pattern`, sorted by path
fn matching_files(dir: &Path, pattern: &Regex, max_depth: usize) -> Vec<PathBuf> {
    if !dir.is_dir() {
        return Vec::new();
    }
    WalkDir::new(dir)
        .max_depth(max_depth)
        .sort_by_file_name()
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| !entry.file_type().is_dir())
        .filter(|entry| {
            entry
                .file_name()
                .to_str()
                .is_some_and(|name| pattern.is_match(name))
        })
        .map(walkdir::DirEntry::into_path)
        .collect()
}

fn flattened(dir: &str, path: &Path) -> PathBuf {
    let mut destination = PathBuf::from(dir);
    if let Some(name) = path.file_name() {
        destination.push(name);
    }
    destination
}

/// Collect the artifacts of one unit
pub fn collect(unit: &PackagingUnit, os: Os) -> Vec<BuildArtifact> {
    let mut artifacts = Vec::new();
    let artifact = |kind, source: PathBuf, destination: PathBuf| BuildArtifact {
        unit: unit.name.clone(),
        kind,
        source,
        destination,
    };

    let headers_root = unit.output_root.join(unit.layout.headers);
    for path in matching_files(&headers_root, &wildcard_regex(HEADER_PATTERNS), usize::MAX) {
        let relative = path.strip_prefix(&headers_root).unwrap_or(&path);
        let destination = Path::new("include").join(relative);
        artifacts.push(artifact(ArtifactKind::Header, path.clone(), destination));
    }

    let (library_patterns, runtime_patterns) = binary_patterns(os);
    let library_dir = if os == Os::Windows {
        unit.layout.windows_libraries
    } else {
        unit.layout.unix_libraries
    };

    let library_root = unit.output_root.join(library_dir);
    for path in matching_files(&library_root, &wildcard_regex(library_patterns), usize::MAX) {
        let destination = flattened("lib", &path);
        artifacts.push(artifact(ArtifactKind::Library, path, destination));
    }

    if !runtime_patterns.is_empty() {
        let runtime_root = unit.output_root.join(unit.layout.windows_runtime);
        for path in matching_files(&runtime_root, &wildcard_regex(runtime_patterns), usize::MAX) {
            let destination = flattened("bin", &path);
            artifacts.push(artifact(ArtifactKind::Runtime, path, destination));
        }
    }

    let licenses_dir = match unit.feature {
        Some(_) => Path::new("licenses").join(&unit.name),
        None => PathBuf::from("licenses"),
    };
    for path in matching_files(&unit.license_root, &wildcard_regex(LICENSE_PATTERNS), 1) {
        let destination = path
            .file_name()
            .map_or_else(|| licenses_dir.clone(), |name| licenses_dir.join(name));
        artifacts.push(artifact(ArtifactKind::License, path, destination));
    }

    artifacts
}

/// What a packaging run placed
#[derive(Debug, Default, Clone, Serialize)]
pub struct PackageReport {
    /// Files newly copied
    pub copied: Vec<BuildArtifact>,
    /// Files already present with identical content
    pub unchanged: Vec<BuildArtifact>,
    /// Load-order manifest, when one was written
    pub load_order: Option<PathBuf>,
}

impl PackageReport {
    /// Runtime binaries in package order
    pub fn runtime_binaries(&self) -> impl Iterator<Item = &BuildArtifact> {
        self.copied
            .iter()
            .chain(&self.unchanged)
            .filter(|a| a.kind == ArtifactKind::Runtime)
    }
}

/// Places artifacts into a package directory
#[derive(Debug, Clone)]
pub struct Packager {
    package_dir: PathBuf,
    os: Os,
}

impl Packager {
    pub fn new(package_dir: impl Into<PathBuf>, os: Os) -> Self {
        Self {
            package_dir: package_dir.into(),
            os,
        }
    }

    pub fn package_dir(&self) -> &Path {
        &self.package_dir
    }

    /// Copy one artifact, returning whether it was newly written
    pub fn place(&self, artifact: &BuildArtifact) -> Result<bool, PackageError> {
        let destination = self.package_dir.join(&artifact.destination);

        if destination.exists() {
            if filesystem::same_content(&artifact.source, &destination)? {
                return Ok(false);
            }
            return Err(PackageError::Conflict {
                unit: artifact.unit.clone(),
                path: artifact.destination.clone(),
            });
        }

        filesystem::copy_file(&artifact.source, &destination)?;
        Ok(true)
    }

    /// Package every unit in order
    ///
    /// On Windows a load-order manifest listing the runtime binaries is
    /// written next to them.
    pub fn package(
        &self,
        units: &[PackagingUnit],
        name: &str,
        version: VersionTriple,
    ) -> Result<PackageReport, PackageError> {
        let mut report = PackageReport::default();

        for unit in units {
            let artifacts = collect(unit, self.os);
            tracing::debug!("Packaging {} files from {}", artifacts.len(), unit.name);

            for artifact in artifacts {
                if self.place(&artifact)? {
                    report.copied.push(artifact);
                } else {
                    report.unchanged.push(artifact);
                }
            }
        }

        if self.os == Os::Windows {
            let runtimes: Vec<&BuildArtifact> = units
                .iter()
                .flat_map(|unit| {
                    report
                        .runtime_binaries()
                        .filter(move |a| a.unit == unit.name)
                })
                .collect();
            let load_order = self.write_load_order(name, version, &runtimes)?;
            report.load_order = Some(load_order);
        }

        tracing::info!(
            "Packaged {} new and {} unchanged files into {}",
            report.copied.len(),
            report.unchanged.len(),
            self.package_dir.display()
        );
        Ok(report)
    }

    fn write_load_order(
        &self,
        name: &str,
        version: VersionTriple,
        runtimes: &[&BuildArtifact],
    ) -> Result<PathBuf, PackageError> {
        let path = load_order_path(&self.package_dir, name, version);
        let mut content = String::new();
        for artifact in runtimes {
            if let Some(file) = artifact.destination.file_name() {
                content.push_str(&file.to_string_lossy());
                content.push('\n');
            }
        }
        filesystem::write_file(&path, &content)?;
        Ok(path)
    }
}

/// `bin/.load-order-<name>-<major>.<minor>.<patch>` under a package
pub fn load_order_path(package_dir: &Path, name: &str, version: VersionTriple) -> PathBuf {
    package_dir
        .join("bin")
        .join(format!("{MANIFEST_PREFIX}{name}-{version}"))
}
