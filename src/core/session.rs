//! Build session
//!
//! A [`Session`] is created once per invocation. It resolves the recipe's
//! options, dependencies and version up front and owns every path the
//! stages work in, then runs the requested stages strictly in order:
//! acquire, configure, build, package, export.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::core::acquire::{self, AcquireOptions, AcquireResult, Acquirer, SourceRequest};
use crate::core::builder::{BuildDriver, BuildPaths, BuildPlan, BuildReport, Tools};
use crate::core::exporter::PackageManifest;
use crate::core::options::{resolve_configuration, BuildConfiguration, Settings};
use crate::core::packager::{self, PackageReport, Packager};
use crate::core::recipe::{Layout, Recipe, TestPolicy};
use crate::core::resolver::{self, Dependency};
use crate::core::toolchain;
use crate::core::version::VersionTriple;
use crate::error::{EslbuildError, FilesystemError};
use crate::infra::filesystem;
use crate::infra::process::CommandRunner;

/// Command line adjustments applied on top of the recipe
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    /// Option values (`-o key=value`)
    pub options: BTreeMap<String, toml::Value>,
    /// Setting values (`-s key=value`)
    pub settings: BTreeMap<String, String>,
    /// Parallel job count
    pub jobs: Option<usize>,
    /// Downgrade test failures to warnings
    pub allow_test_failures: bool,
    /// Re-fetch sources that are already staged
    pub force_fetch: bool,
}

/// A unit of session work
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Acquire,
    Configure,
    Build,
    Package,
    Export,
}

impl Stage {
    /// Every stage in execution order
    pub const ALL: [Stage; 5] = [
        Stage::Acquire,
        Stage::Configure,
        Stage::Build,
        Stage::Package,
        Stage::Export,
    ];

    pub const fn name(self) -> &'static str {
        match self {
            Stage::Acquire => "acquire",
            Stage::Configure => "configure",
            Stage::Build => "build",
            Stage::Package => "package",
            Stage::Export => "export",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// What a session run produced
#[derive(Debug, Default)]
pub struct SessionReport {
    pub acquired: Option<AcquireResult>,
    /// Toolchain files written, in build order
    pub toolchains: Vec<PathBuf>,
    pub build: Option<BuildReport>,
    pub package: Option<PackageReport>,
    /// Consumer metadata files written
    pub metadata: Vec<PathBuf>,
}

/// Resolved state of one build session
#[derive(Debug)]
pub struct Session {
    recipe: Recipe,
    config: BuildConfiguration,
    dependencies: Vec<Dependency>,
    version: VersionTriple,
    paths: BuildPaths,
    package_dir: PathBuf,
    deps_dir: PathBuf,
    tools: Tools,
    test_policy: TestPolicy,
    acquire_options: AcquireOptions,
}

impl Session {
    /// Resolve a recipe into a session.
    ///
    /// Every configuration error surfaces here, before any directory is
    /// touched or process started.
    pub fn new(
        recipe_dir: &Path,
        recipe: Recipe,
        overrides: Overrides,
    ) -> Result<Self, EslbuildError> {
        let mut settings = recipe.settings.clone();
        settings.extend(overrides.settings);
        let settings = Settings::host()
            .with_overrides(settings.iter().map(|(k, v)| (k.as_str(), v.as_str())))?;

        let config = resolve_configuration(&recipe.options, &overrides.options, settings)?;
        let dependencies = resolver::resolve(&config)?;
        let version = recipe.version(recipe_dir)?;

        let test_policy = if overrides.allow_test_failures {
            TestPolicy::Warn
        } else {
            recipe.build.test_policy()?
        };

        let tools = Tools {
            cmake: recipe.build.cmake.clone(),
            ctest: recipe.build.ctest.clone(),
            jobs: overrides
                .jobs
                .filter(|j| *j > 0)
                .unwrap_or_else(|| recipe.build.jobs()),
        };

        let paths = BuildPaths {
            source_root: recipe_dir.to_path_buf(),
            build_root: recipe_dir.join(&recipe.layout.build_dir),
            staging_root: recipe_dir.join(&recipe.layout.staging_dir),
        };
        let package_dir = recipe_dir.join(&recipe.layout.package_dir);
        let deps_dir = recipe_dir.join(recipe.deps_dir());

        tracing::debug!(
            "Session for {} {version}: build={}, staging={}, package={}",
            recipe.package.name,
            paths.build_root.display(),
            paths.staging_root.display(),
            package_dir.display()
        );

        Ok(Self {
            recipe,
            config,
            dependencies,
            version,
            paths,
            package_dir,
            deps_dir,
            tools,
            test_policy,
            acquire_options: AcquireOptions {
                force: overrides.force_fetch,
            },
        })
    }

    pub fn name(&self) -> &str {
        &self.recipe.package.name
    }

    pub fn recipe(&self) -> &Recipe {
        &self.recipe
    }

    pub fn config(&self) -> &BuildConfiguration {
        &self.config
    }

    pub fn dependencies(&self) -> &[Dependency] {
        &self.dependencies
    }

    pub fn version(&self) -> VersionTriple {
        self.version
    }

    pub fn paths(&self) -> &BuildPaths {
        &self.paths
    }

    pub fn package_dir(&self) -> &Path {
        &self.package_dir
    }

    pub fn deps_dir(&self) -> &Path {
        &self.deps_dir
    }

    pub fn tools(&self) -> &Tools {
        &self.tools
    }

    /// Sources the enabled features need staged
    pub fn source_requests(&self) -> Vec<SourceRequest> {
        acquire::requests(&self.config)
    }

    /// Projects in build order
    pub fn build_plan(&self) -> BuildPlan {
        BuildPlan::new(&self.config, &self.paths)
    }

    /// Run the requested stages in execution order
    pub async fn run(
        &self,
        runner: &dyn CommandRunner,
        stages: &[Stage],
    ) -> Result<SessionReport, EslbuildError> {
        let mut report = SessionReport::default();

        for stage in Stage::ALL.into_iter().filter(|s| stages.contains(s)) {
            tracing::info!("Stage {stage} for {}", self.name());
            match stage {
                Stage::Acquire => report.acquired = Some(self.acquire().await?),
                Stage::Configure => report.toolchains = self.configure()?,
                Stage::Build => report.build = Some(self.build(runner)?),
                Stage::Package => report.package = Some(self.package()?),
                Stage::Export => report.metadata = self.export()?,
            }
        }

        Ok(report)
    }

    /// Stage the sources of enabled sub-projects
    pub async fn acquire(&self) -> Result<AcquireResult, EslbuildError> {
        let acquirer = Acquirer::new(&self.paths.staging_root, self.acquire_options);
        Ok(acquirer.acquire_all(&self.source_requests()).await?)
    }

    /// Write the toolchain file of every project
    pub fn configure(&self) -> Result<Vec<PathBuf>, EslbuildError> {
        let descriptions =
            toolchain::describe_all(&self.config, &self.paths.build_root, &self.deps_dir)?;
        let mut written = Vec::with_capacity(descriptions.len());
        for description in &descriptions {
            written.push(description.write(&self.paths.build_root)?);
        }
        Ok(written)
    }

    /// Drive every project through its build steps
    pub fn build(&self, runner: &dyn CommandRunner) -> Result<BuildReport, EslbuildError> {
        let mut plan = self.build_plan();
        let driver = BuildDriver::new(
            runner,
            self.tools.clone(),
            self.test_policy,
            self.paths.logs_dir(),
        );
        Ok(driver.run(&mut plan, &self.config)?)
    }

    /// Copy build outputs into the package layout
    pub fn package(&self) -> Result<PackageReport, EslbuildError> {
        let packager = Packager::new(&self.package_dir, self.config.settings.os);
        let units = packager::units(&self.config, &self.paths);
        Ok(packager.package(&units, self.name(), self.version)?)
    }

    /// Consumer metadata for this session
    pub fn manifest(&self) -> PackageManifest {
        let manifest =
            PackageManifest::new(self.name(), self.version, &self.config, &self.dependencies);
        match &self.recipe.package.description {
            Some(description) => manifest.with_description(description.as_str()),
            None => manifest,
        }
    }

    /// Write consumer metadata into the package
    pub fn export(&self) -> Result<Vec<PathBuf>, EslbuildError> {
        Ok(self.manifest().write(&self.package_dir)?)
    }
}

/// Remove the build and staging directories of a recipe, and its package
/// too when `all` is set
///
/// Only the layout is consulted; options are not resolved.
pub fn clean(
    recipe_dir: &Path,
    layout: &Layout,
    all: bool,
) -> Result<Vec<PathBuf>, FilesystemError> {
    let mut targets = vec![
        recipe_dir.join(&layout.staging_dir),
        recipe_dir.join(&layout.build_dir),
    ];
    if all {
        targets.push(recipe_dir.join(&layout.package_dir));
    }

    let mut removed = Vec::new();
    for target in targets {
        if target.exists() {
            filesystem::remove_dir_all(&target)?;
            tracing::debug!("Removed {}", target.display());
            removed.push(target);
        }
    }
    Ok(removed)
}
