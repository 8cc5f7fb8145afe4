//! Recipe (eslbuild.toml) parsing and validation
//!
//! The recipe names the package, overrides option defaults, pins target
//! settings and places the build, staging, package and dependency
//! directories. String values support environment variable substitution
//! using `${VAR}` syntax.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use crate::config::defaults;
use crate::core::version::{read_version_descriptor, VersionError, VersionTriple};
use crate::error::{EslbuildError, RecipeError};

/// The recipe file (eslbuild.toml)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Recipe {
    /// Package identity
    pub package: PackageSection,

    /// Option value overrides
    #[serde(default)]
    pub options: BTreeMap<String, toml::Value>,

    /// Target setting overrides
    #[serde(default)]
    pub settings: BTreeMap<String, String>,

    /// Directory layout
    #[serde(default)]
    pub layout: Layout,

    /// Build tool configuration
    #[serde(default)]
    pub build: BuildSection,
}

/// Package identity
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct PackageSection {
    /// Package name, also the prefix of the version descriptor identifiers
    pub name: String,

    /// Literal `MAJOR.MINOR.PATCH` version
    #[serde(default)]
    pub version: Option<String>,

    /// Version descriptor file, relative to the recipe
    #[serde(default)]
    pub version_file: Option<PathBuf>,

    /// SPDX license identifier
    #[serde(default)]
    pub license: Option<String>,

    /// One-line summary exported to consumers
    #[serde(default)]
    pub description: Option<String>,
}

/// Directory layout, relative to the recipe directory
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Layout {
    #[serde(default = "default_build_dir")]
    pub build_dir: PathBuf,

    #[serde(default = "default_staging_dir")]
    pub staging_dir: PathBuf,

    #[serde(default = "default_package_dir")]
    pub package_dir: PathBuf,

    #[serde(default = "default_deps_dir")]
    pub deps_dir: PathBuf,
}

fn default_build_dir() -> PathBuf {
    PathBuf::from(defaults::DEFAULT_BUILD_DIR)
}

fn default_staging_dir() -> PathBuf {
    PathBuf::from(defaults::DEFAULT_STAGING_DIR)
}

fn default_package_dir() -> PathBuf {
    PathBuf::from(defaults::DEFAULT_PACKAGE_DIR)
}

fn default_deps_dir() -> PathBuf {
    PathBuf::from(defaults::DEFAULT_DEPS_DIR)
}

impl Default for Layout {
    fn default() -> Self {
        Self {
            build_dir: default_build_dir(),
            staging_dir: default_staging_dir(),
            package_dir: default_package_dir(),
            deps_dir: default_deps_dir(),
        }
    }
}

/// What to do when the test suite fails
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestPolicy {
    /// Abort the session
    #[default]
    Fatal,
    /// Log a warning and continue to installation
    Warn,
}

impl TestPolicy {
    pub fn parse(value: &str) -> Result<Self, RecipeError> {
        match value {
            "fatal" => Ok(Self::Fatal),
            "warn" => Ok(Self::Warn),
            other => Err(RecipeError::InvalidTestPolicy {
                value: other.to_string(),
            }),
        }
    }
}

/// Build tool configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct BuildSection {
    /// Number of parallel jobs (defaults to the CPU count)
    #[serde(default)]
    pub jobs: Option<usize>,

    /// cmake executable
    #[serde(default = "default_cmake")]
    pub cmake: String,

    /// ctest executable
    #[serde(default = "default_ctest")]
    pub ctest: String,

    /// Test failure policy ("fatal" or "warn")
    #[serde(default = "default_test_failure")]
    pub test_failure: String,
}

fn default_cmake() -> String {
    defaults::DEFAULT_CMAKE.to_string()
}

fn default_ctest() -> String {
    defaults::DEFAULT_CTEST.to_string()
}

fn default_test_failure() -> String {
    "fatal".to_string()
}

impl Default for BuildSection {
    fn default() -> Self {
        Self {
            jobs: None,
            cmake: default_cmake(),
            ctest: default_ctest(),
            test_failure: default_test_failure(),
        }
    }
}

impl BuildSection {
    pub fn test_policy(&self) -> Result<TestPolicy, RecipeError> {
        TestPolicy::parse(&self.test_failure)
    }

    /// Parallel job count, falling back to the number of CPUs
    pub fn jobs(&self) -> usize {
        self.jobs.filter(|j| *j > 0).unwrap_or_else(num_cpus::get)
    }
}

fn env_var_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}")
            .unwrap_or_else(|e| unreachable!("invalid substitution regex: {e}"))
    })
}

/// Substitute environment variables in a string using `${VAR}` syntax.
///
/// Unset variables expand to the empty string. An unterminated `${` is an
/// error.
///
/// ```
/// use eslbuild::core::recipe::substitute_env_vars;
///
/// std::env::set_var("ESLBUILD_DOC_VAR", "hello");
/// let result = substitute_env_vars("prefix_${ESLBUILD_DOC_VAR}_suffix").unwrap();
/// assert_eq!(result, "prefix_hello_suffix");
/// std::env::remove_var("ESLBUILD_DOC_VAR");
/// ```
pub fn substitute_env_vars(input: &str) -> Result<String, String> {
    let substituted = env_var_regex().replace_all(input, |caps: &regex::Captures<'_>| {
        std::env::var(&caps[1]).unwrap_or_default()
    });

    if substituted.contains("${") {
        return Err(format!("unterminated or invalid variable reference in '{input}'"));
    }

    Ok(substituted.into_owned())
}

/// Recursively substitute environment variables in a TOML value
fn substitute_in_value(value: &mut toml::Value) -> Result<(), String> {
    match value {
        toml::Value::String(s) => {
            *s = substitute_env_vars(s)?;
        }
        toml::Value::Array(arr) => {
            for item in arr.iter_mut() {
                substitute_in_value(item)?;
            }
        }
        toml::Value::Table(table) => {
            for (_, v) in table.iter_mut() {
                substitute_in_value(v)?;
            }
        }
        _ => {}
    }
    Ok(())
}

impl Recipe {
    /// Load a recipe from a file, substituting environment variables
    pub fn load(path: &Path) -> Result<Self, RecipeError> {
        if !path.exists() {
            return Err(RecipeError::NotFound {
                path: path.to_path_buf(),
            });
        }

        let content = std::fs::read_to_string(path).map_err(|source| RecipeError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        tracing::debug!("Loading recipe from {}", path.display());
        Self::from_toml(&content)
    }

    /// Parse a recipe from TOML text, substituting environment variables
    pub fn from_toml(content: &str) -> Result<Self, RecipeError> {
        let mut value: toml::Value =
            toml::from_str(content).map_err(|source| RecipeError::Parse { source })?;
        substitute_in_value(&mut value).map_err(RecipeError::Substitution)?;

        let recipe: Self = value
            .try_into()
            .map_err(|source| RecipeError::Parse { source })?;
        recipe.validate()?;
        Ok(recipe)
    }

    fn validate(&self) -> Result<(), RecipeError> {
        match (&self.package.version, &self.package.version_file) {
            (None, None) => {
                return Err(RecipeError::MissingVersion {
                    name: self.package.name.clone(),
                })
            }
            (Some(_), Some(_)) => {
                return Err(RecipeError::AmbiguousVersion {
                    name: self.package.name.clone(),
                })
            }
            _ => {}
        }
        self.build.test_policy()?;
        Ok(())
    }

    /// Identifier prefix used in the version descriptor (`ESL` for `esl`)
    pub fn version_prefix(&self) -> String {
        self.package.name.to_ascii_uppercase().replace('-', "_")
    }

    /// Resolve the package version, reading the descriptor file if configured
    pub fn version(&self, recipe_dir: &Path) -> Result<VersionTriple, EslbuildError> {
        if let Some(file) = &self.package.version_file {
            return Ok(read_version_descriptor(
                &recipe_dir.join(file),
                &self.version_prefix(),
            )?);
        }

        let literal = self.package.version.as_deref().unwrap_or_default();
        let parsed = semver::Version::parse(literal).map_err(|e| VersionError::Malformed {
            reason: format!("'{literal}' is not a MAJOR.MINOR.PATCH version: {e}"),
        })?;
        Ok(VersionTriple::new(parsed.major, parsed.minor, parsed.patch))
    }

    /// Dependency directory, honouring the environment override
    pub fn deps_dir(&self) -> PathBuf {
        std::env::var_os(defaults::ENV_DEPS_DIR)
            .filter(|v| !v.is_empty())
            .map_or_else(|| self.layout.deps_dir.clone(), PathBuf::from)
    }
}
