//! Toolchain configuration
//!
//! Maps a [`BuildConfiguration`] to the CMake variables each project is
//! configured with, and renders them as a toolchain file. Rendering is the
//! only side effect here; nothing in this module runs a build.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use crate::config::defaults;
use crate::core::features::{self, SubBuild};
use crate::core::options::{BuildConfiguration, BuildType, Feature, Os, Runtime, Settings};
use crate::error::ToolchainError;
use crate::infra::filesystem::{self, to_forward_slashes};

/// Library name used when no QuantLib library file can be found
pub const QUANTLIB_FALLBACK_NAME: &str = "QuantLib";

/// Project name of the main library
pub const MAIN_PROJECT: &str = "esl";

/// CMake settings for one project
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolchainDescription {
    /// Project the description belongs to
    pub project: String,
    /// Plain variables (`set(NAME "value")`)
    pub variables: BTreeMap<String, String>,
    /// Forced cache entries, for switches the project declares with `option()`
    pub cache_variables: BTreeMap<String, String>,
    /// `CMAKE_MSVC_RUNTIME_LIBRARY`, set only for MSVC
    pub runtime_library: Option<String>,
}

fn on_off(value: bool) -> String {
    if value { "ON" } else { "OFF" }.to_string()
}

/// Value of `CMAKE_MSVC_RUNTIME_LIBRARY` for the target, if it uses MSVC
pub fn msvc_runtime_library(settings: &Settings) -> Option<String> {
    if !settings.is_msvc() {
        return None;
    }
    let base = "MultiThreaded$<$<CONFIG:Debug>:Debug>";
    Some(match settings.runtime {
        Runtime::Static => base.to_string(),
        Runtime::Dynamic => format!("{base}DLL"),
    })
}

fn library_extensions(os: Os) -> &'static [&'static str] {
    match os {
        Os::Windows => &["lib"],
        Os::Macos => &["a", "dylib"],
        Os::Linux => &["a", "so"],
    }
}

/// Library stem of a file name, if it carries a library extension of `os`.
///
/// The `lib` prefix is stripped on Unix. Versioned dylibs
/// (`libQuantLib.0.dylib`) lose their version components; versioned shared
/// objects (`.so.N`) are not candidates at all.
fn library_stem(name: &str, os: Os) -> Option<&str> {
    let (mut stem, extension) = name.rsplit_once('.')?;
    if !library_extensions(os).contains(&extension) {
        return None;
    }
    if os == Os::Macos && extension == "dylib" {
        while let Some((rest, version)) = stem.rsplit_once('.') {
            if version.is_empty() || !version.bytes().all(|b| b.is_ascii_digit()) {
                break;
            }
            stem = rest;
        }
    }
    Some(match os {
        Os::Windows => stem,
        _ => stem.strip_prefix("lib").unwrap_or(stem),
    })
}

/// MSVC runtime tag a QuantLib variant must carry (`QuantLib-x64-mt-s`),
/// `None` for the dynamic release runtime, which carries no tag
fn msvc_variant_tag(settings: &Settings) -> Option<&'static str> {
    let debug = settings.build_type == BuildType::Debug;
    match (settings.runtime, debug) {
        (Runtime::Static, false) => Some("s"),
        (Runtime::Static, true) => Some("sgd"),
        (Runtime::Dynamic, false) => None,
        (Runtime::Dynamic, true) => Some("gd"),
    }
}

fn matches_msvc_variant(stem: &str, wanted: Option<&str>) -> bool {
    let tag = stem.rsplit_once('-').map(|(_, tag)| tag);
    match wanted {
        Some(wanted) => tag == Some(wanted),
        None => !matches!(tag, Some("s" | "sgd" | "gd")),
    }
}

/// Name to link QuantLib by, discovered from the files in `lib_dir`.
///
/// Candidates start with `QuantLib` once reduced to their library stem. On
/// Windows the variant matching the runtime and build type is preferred;
/// otherwise, or when no variant matches, the first in sorted order wins.
/// Falls back to [`QUANTLIB_FALLBACK_NAME`].
pub fn quantlib_library_name(lib_dir: &Path, settings: &Settings) -> String {
    let Ok(entries) = std::fs::read_dir(lib_dir) else {
        return QUANTLIB_FALLBACK_NAME.to_string();
    };

    let names: Vec<String> = entries
        .filter_map(Result::ok)
        .filter(|entry| entry.path().is_file())
        .filter_map(|entry| entry.file_name().into_string().ok())
        .collect();
    let candidates: BTreeSet<&str> = names
        .iter()
        .filter_map(|name| library_stem(name, settings.os))
        .filter(|stem| stem.starts_with(QUANTLIB_FALLBACK_NAME))
        .collect();

    let preferred = if settings.os == Os::Windows {
        let wanted = msvc_variant_tag(settings);
        candidates
            .iter()
            .find(|stem| matches_msvc_variant(stem, wanted))
    } else {
        None
    };

    preferred
        .or_else(|| candidates.first())
        .map_or_else(|| QUANTLIB_FALLBACK_NAME.to_string(), |stem| (*stem).to_string())
}

/// Install prefix of an out-of-tree sub-project
pub fn install_prefix(build_root: &Path, project: &str) -> PathBuf {
    build_root.join(format!("{project}-install"))
}

/// Directory holding a project's toolchain file
pub fn project_dir(build_root: &Path, project: &str) -> PathBuf {
    build_root.join(project)
}

/// Describe the main project
///
/// QuantLib is located in `<deps_dir>/quantlib`; a missing package directory
/// is an error when QuantLib is enabled.
pub fn main_description(
    config: &BuildConfiguration,
    build_root: &Path,
    deps_dir: &Path,
) -> Result<ToolchainDescription, ToolchainError> {
    let mut variables = BTreeMap::new();

    for spec in features::FEATURES {
        variables.insert(
            spec.variable.to_string(),
            on_off(config.is_enabled(spec.feature)),
        );
    }

    variables.insert("BUILD_SHARED_LIBS".to_string(), on_off(config.is_shared()));
    if let Some(fpic) = config.fpic {
        variables.insert("CMAKE_POSITION_INDEPENDENT_CODE".to_string(), on_off(fpic));
    }
    variables.insert(
        "CMAKE_BUILD_TYPE".to_string(),
        config.settings.build_type.as_str().to_string(),
    );

    if config.is_enabled(Feature::WithQuantlib) {
        let package = deps_dir.join("quantlib");
        if !package.is_dir() {
            return Err(ToolchainError::MissingDependencyPackage {
                dependency: "quantlib".to_string(),
                path: package,
            });
        }
        let include_dir = package.join("include");
        let lib_dir = package.join("lib");

        variables.insert(
            "QUANTLIB_INCLUDE_DIR".to_string(),
            to_forward_slashes(&include_dir),
        );
        variables.insert("QUANTLIB_LIBRARY_DIR".to_string(), to_forward_slashes(&lib_dir));
        variables.insert(
            "QUANTLIB_LIBRARY_NAME".to_string(),
            quantlib_library_name(&lib_dir, &config.settings),
        );
    }

    if let Some(sub) = features::spec(Feature::WithOsre).sub_build {
        if config.is_enabled(Feature::WithOsre) {
            variables.insert(
                "CMAKE_PREFIX_PATH".to_string(),
                to_forward_slashes(&install_prefix(build_root, sub.project)),
            );
        }
    }

    Ok(ToolchainDescription {
        project: MAIN_PROJECT.to_string(),
        variables,
        cache_variables: BTreeMap::new(),
        runtime_library: msvc_runtime_library(&config.settings),
    })
}

/// Describe a sub-project, with its sub-targets switched off
pub fn sub_description(sub: &SubBuild, config: &BuildConfiguration) -> ToolchainDescription {
    let mut variables = BTreeMap::new();
    variables.insert(
        "CMAKE_BUILD_TYPE".to_string(),
        config.settings.build_type.as_str().to_string(),
    );
    if let Some(fpic) = config.fpic {
        variables.insert("CMAKE_POSITION_INDEPENDENT_CODE".to_string(), on_off(fpic));
    }

    ToolchainDescription {
        project: sub.project.to_string(),
        variables,
        cache_variables: sub
            .cache_variables
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect(),
        runtime_library: msvc_runtime_library(&config.settings),
    }
}

/// Descriptions for every project of a session: sub-projects in catalog
/// order, then the main project
pub fn describe_all(
    config: &BuildConfiguration,
    build_root: &Path,
    deps_dir: &Path,
) -> Result<Vec<ToolchainDescription>, ToolchainError> {
    let mut descriptions: Vec<_> = features::enabled(config)
        .filter_map(|spec| spec.sub_build)
        .map(|sub| sub_description(&sub, config))
        .collect();
    descriptions.push(main_description(config, build_root, deps_dir)?);
    Ok(descriptions)
}

fn quoted(value: &str) -> String {
    format!("\"{}\"", value.replace('\\', "/").replace('"', "\\\""))
}

impl ToolchainDescription {
    /// Render as a CMake toolchain file
    pub fn render(&self) -> String {
        let mut out = format!("# Generated by eslbuild for '{}'\n", self.project);

        for (name, value) in &self.variables {
            let _ = writeln!(out, "set({name} {})", quoted(value));
        }
        for (name, value) in &self.cache_variables {
            let _ = writeln!(out, "set({name} {} CACHE STRING \"\" FORCE)", quoted(value));
        }
        if let Some(runtime) = &self.runtime_library {
            let _ = writeln!(out, "set(CMAKE_MSVC_RUNTIME_LIBRARY {})", quoted(runtime));
        }

        out
    }

    /// Path of the toolchain file under `build_root`
    pub fn path(&self, build_root: &Path) -> PathBuf {
        project_dir(build_root, &self.project).join(defaults::TOOLCHAIN_FILE)
    }

    /// Write the toolchain file, returning its path
    pub fn write(&self, build_root: &Path) -> Result<PathBuf, ToolchainError> {
        let path = self.path(build_root);
        filesystem::write_file(&path, &self.render())?;
        tracing::debug!("Wrote toolchain for {} to {}", self.project, path.display());
        Ok(path)
    }
}
