//! Feature catalog
//!
//! Every optional piece of work is described here, once, as data: the CMake
//! variable a toggle drives, the define it exports, what it requires, where its
//! sources come from, how its sub-project is built and where its artifacts
//! live. The resolver, acquisition, toolchain, builder, packager and exporter
//! all iterate this table instead of branching on individual toggles.

use crate::config::urls;
use crate::core::options::{BuildConfiguration, Feature};
use crate::core::resolver::DependencyKind;

/// A requirement on an external package
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Requirement {
    /// Package name
    pub name: &'static str,
    /// Semver requirement
    pub constraint: &'static str,
    /// Library or build tool
    pub kind: DependencyKind,
    /// Options forwarded to the dependency's own configuration
    pub options: &'static [(&'static str, &'static str)],
}

/// Sources fetched at build time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceSpec {
    /// Archive origin
    pub url: &'static str,
    /// Directory name under the staging root
    pub dir: &'static str,
    /// Optional SHA-256 pin for the archive
    pub sha256: Option<&'static str>,
}

/// How a sub-project is built
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubBuildKind {
    /// Configured and built inside its staged source tree
    InSource,
    /// Configured into its own build directory, then installed to a prefix
    OutOfTree,
}

/// A nested native build performed before the main project
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubBuild {
    /// Project name used for directories and logs
    pub project: &'static str,
    pub kind: SubBuildKind,
    /// Cache variables scoped to this sub-project
    pub cache_variables: &'static [(&'static str, &'static str)],
}

/// Where a unit leaves its headers and binaries, relative to its output root
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArtifactLayout {
    /// Header directory
    pub headers: &'static str,
    /// Static and shared libraries on Unix
    pub unix_libraries: &'static str,
    /// Static and import libraries on Windows
    pub windows_libraries: &'static str,
    /// DLLs on Windows
    pub windows_runtime: &'static str,
}

/// Layout of a CMake install prefix
pub const INSTALL_LAYOUT: ArtifactLayout = ArtifactLayout {
    headers: "include",
    unix_libraries: "lib",
    windows_libraries: "lib",
    windows_runtime: "bin",
};

/// Variant descriptor for one feature toggle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeatureSpec {
    pub feature: Feature,
    /// CMake variable receiving `ON`/`OFF`
    pub variable: &'static str,
    /// Preprocessor define exported to consumers when enabled
    pub define: Option<&'static str>,
    /// Libraries and tools required when enabled
    pub requires: &'static [Requirement],
    /// Sources staged when enabled
    pub source: Option<SourceSpec>,
    /// Sub-project built before the main project when enabled
    pub sub_build: Option<SubBuild>,
    /// Artifacts to package when enabled
    pub artifacts: Option<ArtifactLayout>,
    /// Library names exported to consumers when enabled
    pub libs: &'static [&'static str],
}

/// Switches that keep bundled QuantLib from building its extras
const QUANTLIB_EXTRAS_OFF: [(&str, &str); 6] = [
    ("QL_BUILD_BENCHMARK", "OFF"),
    ("QL_BUILD_EXAMPLES", "OFF"),
    ("QL_BUILD_TEST_SUITE", "OFF"),
    ("QL_INSTALL_BENCHMARK", "OFF"),
    ("QL_INSTALL_EXAMPLES", "OFF"),
    ("QL_INSTALL_TEST_SUITE", "OFF"),
];

const OSRE_CACHE_VARIABLES: [(&str, &str); 9] = [
    ("ORE_BUILD_DOC", "OFF"),
    ("ORE_BUILD_EXAMPLES", "OFF"),
    ("ORE_BUILD_TESTS", "OFF"),
    QUANTLIB_EXTRAS_OFF[0],
    QUANTLIB_EXTRAS_OFF[1],
    QUANTLIB_EXTRAS_OFF[2],
    QUANTLIB_EXTRAS_OFF[3],
    QUANTLIB_EXTRAS_OFF[4],
    QUANTLIB_EXTRAS_OFF[5],
];

/// Options forced onto statically linked C++ dependencies
const STATIC_RUNTIME: &[(&str, &str)] = &[
    ("runtime", "static"),
    ("runtime_link", "static"),
    ("shared", "false"),
];

/// All feature descriptors in declaration order
pub const FEATURES: &[FeatureSpec] = &[
    FeatureSpec {
        feature: Feature::WithPython,
        variable: "ESL_WITH_PYTHON",
        define: Some("ESL_WITH_PYTHON"),
        requires: &[],
        source: None,
        sub_build: None,
        artifacts: None,
        libs: &[],
    },
    FeatureSpec {
        feature: Feature::WithMpi,
        variable: "ESL_WITH_MPI",
        define: Some("ESL_WITH_MPI"),
        requires: &[Requirement {
            name: "openmpi",
            constraint: "=4.1.0",
            kind: DependencyKind::Library,
            options: &[],
        }],
        source: None,
        sub_build: None,
        artifacts: None,
        libs: &[],
    },
    FeatureSpec {
        feature: Feature::BuildTests,
        variable: "ESL_BUILD_TESTS",
        define: None,
        requires: &[],
        source: None,
        sub_build: None,
        artifacts: None,
        libs: &[],
    },
    FeatureSpec {
        feature: Feature::WithQuickfix,
        variable: "ESL_WITH_QUICKFIX",
        define: None,
        requires: &[
            Requirement {
                name: "autoconf",
                constraint: "=2.71",
                kind: DependencyKind::Tool,
                options: &[],
            },
            Requirement {
                name: "libtool",
                constraint: "=2.4.7",
                kind: DependencyKind::Tool,
                options: &[],
            },
        ],
        source: Some(SourceSpec {
            url: urls::QUICKFIX_ARCHIVE,
            dir: "quickfix",
            sha256: None,
        }),
        sub_build: Some(SubBuild {
            project: "quickfix",
            kind: SubBuildKind::InSource,
            cache_variables: &[("QUICKFIX_EXAMPLES", "OFF"), ("QUICKFIX_TESTS", "OFF")],
        }),
        artifacts: Some(ArtifactLayout {
            headers: "include",
            unix_libraries: "src/.libs",
            windows_libraries: "lib",
            windows_runtime: "lib",
        }),
        libs: &["quickfix"],
    },
    FeatureSpec {
        feature: Feature::WithQuantlib,
        variable: "ESL_WITH_QUANTLIB",
        define: Some("ESL_WITH_QUANTLIB"),
        requires: &[Requirement {
            name: "quantlib",
            constraint: ">=1.35",
            kind: DependencyKind::Library,
            options: STATIC_RUNTIME,
        }],
        source: None,
        sub_build: None,
        artifacts: None,
        libs: &[],
    },
    FeatureSpec {
        feature: Feature::WithOsre,
        variable: "ESL_WITH_OSRE",
        define: None,
        requires: &[],
        source: Some(SourceSpec {
            url: urls::OSRE_ARCHIVE,
            dir: "osre",
            sha256: None,
        }),
        sub_build: Some(SubBuild {
            project: "osre",
            kind: SubBuildKind::OutOfTree,
            cache_variables: &OSRE_CACHE_VARIABLES,
        }),
        artifacts: Some(INSTALL_LAYOUT),
        libs: &["OREAnalytics"],
    },
];

/// Descriptor for a feature
pub fn spec(feature: Feature) -> &'static FeatureSpec {
    // FEATURES is indexed in the same order as `Feature::ALL`
    &FEATURES[feature as usize]
}

/// Descriptors of the enabled features, in declaration order
pub fn enabled(config: &BuildConfiguration) -> impl Iterator<Item = &'static FeatureSpec> + '_ {
    FEATURES
        .iter()
        .filter(move |spec| config.is_enabled(spec.feature))
}
