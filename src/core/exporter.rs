//! Consumer metadata
//!
//! Describes how downstream projects link against the package: library
//! names, preprocessor defines and directories. The manifest is a pure
//! function of the configuration and resolved dependencies.

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use crate::config::defaults;
use crate::core::features;
use crate::core::options::{BuildConfiguration, BuildType, Feature, Runtime};
use crate::core::resolver::{Dependency, DependencyKind};
use crate::core::toolchain::MAIN_PROJECT;
use crate::core::version::VersionTriple;
use crate::error::PackageError;
use crate::infra::filesystem;

/// A library requirement consumers inherit
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExportedRequirement {
    pub name: String,
    pub constraint: String,
}

/// Metadata consumers need to link against the package
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PackageManifest {
    pub name: String,
    pub version: String,
    pub description: String,
    /// Libraries to link, main library first
    pub libs: Vec<String>,
    /// Preprocessor defines
    pub defines: Vec<String>,
    pub include_dirs: Vec<String>,
    pub lib_dirs: Vec<String>,
    pub bin_dirs: Vec<String>,
    /// Library dependencies consumers must also provide
    pub requires: Vec<ExportedRequirement>,
    /// Option values the package was built with
    pub options: BTreeMap<String, bool>,
    pub settings: BTreeMap<String, String>,
}

/// Library names to link: the main library, then feature libraries in
/// catalog order
pub fn libs(config: &BuildConfiguration) -> Vec<String> {
    std::iter::once(MAIN_PROJECT)
        .chain(features::enabled(config).flat_map(|spec| spec.libs.iter().copied()))
        .map(str::to_string)
        .collect()
}

/// Preprocessor defines: feature defines in catalog order, then the MSVC
/// runtime defines
pub fn defines(config: &BuildConfiguration) -> Vec<String> {
    let mut defines: Vec<String> = features::enabled(config)
        .filter_map(|spec| spec.define)
        .map(str::to_string)
        .collect();

    let settings = &config.settings;
    if settings.is_msvc() {
        if settings.build_type == BuildType::Debug {
            defines.push("_DEBUG".to_string());
        }
        defines.push("_MT".to_string());
        if settings.runtime == Runtime::Dynamic {
            defines.push("_DLL".to_string());
        }
    }

    defines
}

impl PackageManifest {
    /// Build the manifest for a configuration
    pub fn new(
        name: &str,
        version: VersionTriple,
        config: &BuildConfiguration,
        dependencies: &[Dependency],
    ) -> Self {
        let options = config
            .sources
            .keys()
            .map(|option| {
                let enabled = match option.as_str() {
                    "shared" => config.is_shared(),
                    "fpic" => config.fpic.unwrap_or(false),
                    other => Feature::from_name(other)
                        .is_some_and(|f| config.is_enabled(f)),
                };
                (option.clone(), enabled)
            })
            .collect();

        let settings = &config.settings;
        let settings = BTreeMap::from([
            ("os".to_string(), settings.os.to_string()),
            ("arch".to_string(), settings.arch.clone()),
            ("compiler".to_string(), settings.compiler.as_str().to_string()),
            ("runtime".to_string(), settings.runtime.as_str().to_string()),
            (
                "build_type".to_string(),
                settings.build_type.as_str().to_string(),
            ),
        ]);

        Self {
            name: name.to_string(),
            version: version.to_string(),
            description: defaults::DEFAULT_DESCRIPTION.to_string(),
            libs: libs(config),
            defines: defines(config),
            include_dirs: vec!["include".to_string()],
            lib_dirs: vec!["lib".to_string()],
            bin_dirs: if config.settings.is_windows() {
                vec!["bin".to_string()]
            } else {
                Vec::new()
            },
            requires: dependencies
                .iter()
                .filter(|d| d.kind == DependencyKind::Library)
                .map(|d| ExportedRequirement {
                    name: d.name.clone(),
                    constraint: d.constraint.clone(),
                })
                .collect(),
            options,
            settings,
        }
    }

    /// Replace the default description
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn to_json(&self) -> Result<String, PackageError> {
        serde_json::to_string_pretty(self).map_err(|e| PackageError::Serialize(e.to_string()))
    }

    /// Render a relocatable pkg-config file
    pub fn to_pkg_config(&self) -> String {
        let mut out = String::from("prefix=${pcfiledir}/../..\n");
        let include_dir = self.include_dirs.first().map_or("include", String::as_str);
        let lib_dir = self.lib_dirs.first().map_or("lib", String::as_str);
        let _ = writeln!(out, "includedir=${{prefix}}/{include_dir}");
        let _ = writeln!(out, "libdir=${{prefix}}/{lib_dir}");
        out.push('\n');
        let _ = writeln!(out, "Name: {}", self.name);
        let _ = writeln!(out, "Description: {}", self.description);
        let _ = writeln!(out, "Version: {}", self.version);

        let libs: Vec<String> = self.libs.iter().map(|l| format!("-l{l}")).collect();
        let _ = writeln!(out, "Libs: -L${{libdir}} {}", libs.join(" "));

        let mut cflags = vec!["-I${includedir}".to_string()];
        cflags.extend(self.defines.iter().map(|d| format!("-D{d}")));
        let _ = writeln!(out, "Cflags: {}", cflags.join(" "));

        out
    }

    /// Write `eslbuild-manifest.json` and `lib/pkgconfig/<name>.pc`
    pub fn write(&self, package_dir: &Path) -> Result<Vec<PathBuf>, PackageError> {
        let json_path = package_dir.join(defaults::MANIFEST_FILE);
        filesystem::write_file(&json_path, &self.to_json()?)?;

        let pc_path = package_dir
            .join("lib")
            .join("pkgconfig")
            .join(format!("{}.pc", self.name));
        filesystem::write_file(&pc_path, &self.to_pkg_config())?;

        tracing::info!("Wrote consumer metadata to {}", json_path.display());
        Ok(vec![json_path, pc_path])
    }
}
