//! Option model
//!
//! Typed build options and target settings for a recipe.
//! Implements option value resolution with priority: CLI > Recipe > Default.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::error::OptionError;

/// Feature toggles in declaration order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Feature {
    /// Python bindings
    WithPython,
    /// MPI support
    WithMpi,
    /// Build and run the test suite
    BuildTests,
    /// QuickFIX sub-project
    WithQuickfix,
    /// QuantLib dependency
    WithQuantlib,
    /// Open Source Risk Engine sub-project
    WithOsre,
}

impl Feature {
    /// All feature toggles in declaration order
    pub const ALL: [Feature; 6] = [
        Feature::WithPython,
        Feature::WithMpi,
        Feature::BuildTests,
        Feature::WithQuickfix,
        Feature::WithQuantlib,
        Feature::WithOsre,
    ];

    /// Option name as written in recipes and on the command line
    pub const fn name(self) -> &'static str {
        match self {
            Feature::WithPython => "with_python",
            Feature::WithMpi => "with_mpi",
            Feature::BuildTests => "build_tests",
            Feature::WithQuickfix => "with_quickfix",
            Feature::WithQuantlib => "with_quantlib",
            Feature::WithOsre => "with_osre",
        }
    }

    /// Look up a feature by option name
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.name() == name)
    }
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Library linkage mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Linkage {
    Static,
    Shared,
}

/// CMake build type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BuildType {
    Release,
    Debug,
    RelWithDebInfo,
    MinSizeRel,
}

impl BuildType {
    const VARIANTS: &'static [(&'static str, BuildType)] = &[
        ("Release", BuildType::Release),
        ("Debug", BuildType::Debug),
        ("RelWithDebInfo", BuildType::RelWithDebInfo),
        ("MinSizeRel", BuildType::MinSizeRel),
    ];

    /// Name understood by CMake (`CMAKE_BUILD_TYPE`, `--config`)
    pub const fn as_str(self) -> &'static str {
        match self {
            BuildType::Release => "Release",
            BuildType::Debug => "Debug",
            BuildType::RelWithDebInfo => "RelWithDebInfo",
            BuildType::MinSizeRel => "MinSizeRel",
        }
    }
}

/// Target operating system
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Os {
    Linux,
    Macos,
    Windows,
}

impl Os {
    const VARIANTS: &'static [(&'static str, Os)] = &[
        ("linux", Os::Linux),
        ("macos", Os::Macos),
        ("windows", Os::Windows),
    ];

    /// Operating system this binary was compiled for
    pub const fn current() -> Self {
        if cfg!(target_os = "windows") {
            Os::Windows
        } else if cfg!(target_os = "macos") {
            Os::Macos
        } else {
            Os::Linux
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Os::Linux => "linux",
            Os::Macos => "macos",
            Os::Windows => "windows",
        }
    }
}

impl fmt::Display for Os {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Compiler family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Compiler {
    Gcc,
    Clang,
    AppleClang,
    Msvc,
}

impl Compiler {
    const VARIANTS: &'static [(&'static str, Compiler)] = &[
        ("gcc", Compiler::Gcc),
        ("clang", Compiler::Clang),
        ("apple-clang", Compiler::AppleClang),
        ("msvc", Compiler::Msvc),
    ];

    /// Usual compiler for an operating system
    pub const fn default_for(os: Os) -> Self {
        match os {
            Os::Linux => Compiler::Gcc,
            Os::Macos => Compiler::AppleClang,
            Os::Windows => Compiler::Msvc,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Compiler::Gcc => "gcc",
            Compiler::Clang => "clang",
            Compiler::AppleClang => "apple-clang",
            Compiler::Msvc => "msvc",
        }
    }
}

/// Compiler runtime linkage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Runtime {
    Static,
    Dynamic,
}

impl Runtime {
    const VARIANTS: &'static [(&'static str, Runtime)] =
        &[("static", Runtime::Static), ("dynamic", Runtime::Dynamic)];

    pub const fn as_str(self) -> &'static str {
        match self {
            Runtime::Static => "static",
            Runtime::Dynamic => "dynamic",
        }
    }
}

fn parse_choice<T: Copy>(
    name: &str,
    value: &str,
    variants: &[(&'static str, T)],
) -> Result<T, OptionError> {
    variants
        .iter()
        .find(|(label, _)| label.eq_ignore_ascii_case(value))
        .map(|(_, v)| *v)
        .ok_or_else(|| OptionError::InvalidChoice {
            name: name.to_string(),
            value: value.to_string(),
            choices: variants.iter().map(|(label, _)| (*label).to_string()).collect(),
        })
}

/// Target platform and compiler identity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    pub os: Os,
    pub arch: String,
    pub compiler: Compiler,
    pub runtime: Runtime,
    pub build_type: BuildType,
}

impl Settings {
    /// Setting names accepted by [`Settings::with_overrides`]
    pub const KEYS: &'static [&'static str] = &["os", "arch", "compiler", "runtime", "build_type"];

    /// Settings describing the host
    pub fn host() -> Self {
        let os = Os::current();
        Self {
            os,
            arch: std::env::consts::ARCH.to_string(),
            compiler: Compiler::default_for(os),
            runtime: Runtime::Static,
            build_type: BuildType::Release,
        }
    }

    /// Apply `key = value` overrides.
    ///
    /// `os` is applied first; when it changes and no `compiler` is given, the
    /// compiler follows the new operating system's default.
    pub fn with_overrides<'a, I>(mut self, overrides: I) -> Result<Self, OptionError>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let overrides: BTreeMap<&str, &str> = overrides.into_iter().collect();

        for key in overrides.keys() {
            if !Self::KEYS.contains(key) {
                return Err(OptionError::Unknown {
                    name: (*key).to_string(),
                    known: Self::KEYS.iter().map(ToString::to_string).collect(),
                });
            }
        }

        if let Some(os) = overrides.get("os") {
            self.os = parse_choice("os", os, Os::VARIANTS)?;
            self.compiler = Compiler::default_for(self.os);
        }
        if let Some(arch) = overrides.get("arch") {
            if arch.is_empty() {
                return Err(OptionError::InvalidType {
                    name: "arch".to_string(),
                    expected: "non-empty string".to_string(),
                    got: "\"\"".to_string(),
                });
            }
            self.arch = (*arch).to_string();
        }
        if let Some(compiler) = overrides.get("compiler") {
            self.compiler = parse_choice("compiler", compiler, Compiler::VARIANTS)?;
        }
        if let Some(runtime) = overrides.get("runtime") {
            self.runtime = parse_choice("runtime", runtime, Runtime::VARIANTS)?;
        }
        if let Some(build_type) = overrides.get("build_type") {
            self.build_type = parse_choice("build_type", build_type, BuildType::VARIANTS)?;
        }

        Ok(self)
    }

    pub fn is_msvc(&self) -> bool {
        self.compiler == Compiler::Msvc
    }

    pub fn is_windows(&self) -> bool {
        self.os == Os::Windows
    }
}

/// Definition of a boolean recipe option
#[derive(Debug, Clone, PartialEq)]
pub struct OptionDefinition {
    /// Option name
    pub name: &'static str,
    /// Default value
    pub default: bool,
    /// Human readable description
    pub description: &'static str,
    /// Whether the option exists when targeting Windows
    pub on_windows: bool,
}

/// The closed option set of the ESL recipe
pub const OPTIONS: &[OptionDefinition] = &[
    OptionDefinition {
        name: "shared",
        default: false,
        description: "Build shared libraries",
        on_windows: true,
    },
    OptionDefinition {
        name: "fpic",
        default: true,
        description: "Build position independent code",
        on_windows: false,
    },
    OptionDefinition {
        name: "with_python",
        default: true,
        description: "Build the Python extension module",
        on_windows: true,
    },
    OptionDefinition {
        name: "with_mpi",
        default: false,
        description: "Enable distributed simulation over MPI",
        on_windows: true,
    },
    OptionDefinition {
        name: "build_tests",
        default: true,
        description: "Build and run the test suite",
        on_windows: true,
    },
    OptionDefinition {
        name: "with_quickfix",
        default: false,
        description: "Fetch and build QuickFIX",
        on_windows: true,
    },
    OptionDefinition {
        name: "with_quantlib",
        default: true,
        description: "Link against QuantLib",
        on_windows: true,
    },
    OptionDefinition {
        name: "with_osre",
        default: false,
        description: "Fetch and build the Open Source Risk Engine",
        on_windows: true,
    },
];

/// Look up an option definition by name
pub fn option_definition(name: &str) -> Option<&'static OptionDefinition> {
    OPTIONS.iter().find(|def| def.name == name)
}

/// Option value source for resolution priority
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptionSource {
    /// Value from CLI argument (highest priority)
    Cli,
    /// Value from the recipe's `[options]` table
    Recipe,
    /// Default value from option definition (lowest priority)
    Default,
}

/// Resolved option value with its source
#[derive(Debug, Clone)]
pub struct ResolvedOption {
    /// The resolved value
    pub value: toml::Value,
    /// Where the value came from
    pub source: OptionSource,
}

/// Resolve an option value with priority: CLI > Recipe > Default
pub fn resolve_option_value(
    definition: &OptionDefinition,
    cli_value: Option<&toml::Value>,
    recipe_value: Option<&toml::Value>,
) -> ResolvedOption {
    if let Some(value) = cli_value {
        ResolvedOption {
            value: value.clone(),
            source: OptionSource::Cli,
        }
    } else if let Some(value) = recipe_value {
        ResolvedOption {
            value: value.clone(),
            source: OptionSource::Recipe,
        }
    } else {
        ResolvedOption {
            value: toml::Value::Boolean(definition.default),
            source: OptionSource::Default,
        }
    }
}

/// Parse a `key=value` command line override.
///
/// `true`/`false` (any case) become booleans, everything else stays a string
/// so that type validation reports it against the option definition.
pub fn parse_override(input: &str) -> Result<(String, toml::Value), OptionError> {
    let (key, value) = input
        .split_once('=')
        .map(|(k, v)| (k.trim(), v.trim()))
        .filter(|(k, _)| !k.is_empty())
        .ok_or_else(|| OptionError::MalformedOverride {
            input: input.to_string(),
        })?;

    let value = if value.eq_ignore_ascii_case("true") {
        toml::Value::Boolean(true)
    } else if value.eq_ignore_ascii_case("false") {
        toml::Value::Boolean(false)
    } else {
        toml::Value::String(value.to_string())
    };

    Ok((key.to_string(), value))
}

/// The resolved, immutable configuration of one build
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildConfiguration {
    /// Library linkage
    pub linkage: Linkage,
    /// Position independent code (`None` when the platform has no such option)
    pub fpic: Option<bool>,
    /// Enabled feature toggles
    pub features: BTreeSet<Feature>,
    /// Target settings
    pub settings: Settings,
    /// Where each option value came from
    pub sources: BTreeMap<String, OptionSource>,
}

impl BuildConfiguration {
    pub fn is_enabled(&self, feature: Feature) -> bool {
        self.features.contains(&feature)
    }

    pub fn is_shared(&self) -> bool {
        self.linkage == Linkage::Shared
    }
}

fn check_known(values: &BTreeMap<String, toml::Value>) -> Result<(), OptionError> {
    for name in values.keys() {
        if option_definition(name).is_none() {
            return Err(OptionError::Unknown {
                name: name.clone(),
                known: OPTIONS.iter().map(|def| def.name.to_string()).collect(),
            });
        }
    }
    Ok(())
}

fn validate_bool(name: &str, value: &toml::Value) -> Result<bool, OptionError> {
    value.as_bool().ok_or_else(|| OptionError::InvalidType {
        name: name.to_string(),
        expected: "boolean".to_string(),
        got: format!("{value}"),
    })
}

/// Resolve recipe and command line option values into a [`BuildConfiguration`]
pub fn resolve_configuration(
    recipe_values: &BTreeMap<String, toml::Value>,
    cli_values: &BTreeMap<String, toml::Value>,
    settings: Settings,
) -> Result<BuildConfiguration, OptionError> {
    check_known(recipe_values)?;
    check_known(cli_values)?;

    let mut linkage = Linkage::Static;
    let mut fpic = None;
    let mut features = BTreeSet::new();
    let mut sources = BTreeMap::new();

    for def in OPTIONS {
        let cli_value = cli_values.get(def.name);
        let recipe_value = recipe_values.get(def.name);

        if settings.is_windows() && !def.on_windows {
            if cli_value.is_some() || recipe_value.is_some() {
                return Err(OptionError::NotAvailable {
                    name: def.name.to_string(),
                    os: settings.os.to_string(),
                });
            }
            continue;
        }

        let resolved = resolve_option_value(def, cli_value, recipe_value);
        let enabled = validate_bool(def.name, &resolved.value)?;
        sources.insert(def.name.to_string(), resolved.source);

        match def.name {
            "shared" => {
                linkage = if enabled {
                    Linkage::Shared
                } else {
                    Linkage::Static
                };
            }
            "fpic" => fpic = Some(enabled),
            name => {
                if let Some(feature) = Feature::from_name(name) {
                    if enabled {
                        features.insert(feature);
                    }
                }
            }
        }
    }

    tracing::debug!(
        "Resolved configuration: linkage={linkage:?}, fpic={fpic:?}, features={features:?}"
    );

    Ok(BuildConfiguration {
        linkage,
        fpic,
        features,
        settings,
        sources,
    })
}
