//! Dependency resolution
//!
//! Turns a [`BuildConfiguration`] into the ordered list of external
//! dependencies.

use semver::VersionReq;
use serde::Serialize;
use std::collections::BTreeMap;

use crate::core::features::{self, Requirement};
use crate::core::options::{BuildConfiguration, Feature, Linkage, Runtime};
use crate::error::ResolverError;

/// Kind of dependency
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DependencyKind {
    /// Linked into the library
    Library,
    /// Needed only while building
    Tool,
}

/// A resolved external dependency
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Dependency {
    pub name: String,
    /// Semver requirement
    pub constraint: String,
    pub kind: DependencyKind,
    /// Options forwarded to the dependency's own configuration
    pub options: BTreeMap<String, String>,
    /// Toggle gating this dependency (`None` when mandatory)
    pub gate: Option<Feature>,
}

impl Dependency {
    fn from_requirement(req: &Requirement, gate: Option<Feature>) -> Result<Self, ResolverError> {
        VersionReq::parse(req.constraint).map_err(|e| ResolverError::InvalidConstraint {
            dependency: req.name.to_string(),
            constraint: req.constraint.to_string(),
            reason: e.to_string(),
        })?;

        Ok(Self {
            name: req.name.to_string(),
            constraint: req.constraint.to_string(),
            kind: req.kind,
            options: req
                .options
                .iter()
                .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                .collect(),
            gate,
        })
    }

    pub fn is_mandatory(&self) -> bool {
        self.gate.is_none()
    }
}

/// Dependencies required by every build
pub const MANDATORY: &[Requirement] = &[
    Requirement {
        name: "boost",
        constraint: ">=1.85",
        kind: DependencyKind::Library,
        options: &[
            ("multithreading", "true"),
            ("runtime", "static"),
            ("runtime_link", "static"),
            ("shared", "false"),
            ("without_python", "true"),
        ],
    },
    Requirement {
        name: "gsl",
        constraint: "=2.7",
        kind: DependencyKind::Library,
        options: &[],
    },
    Requirement {
        name: "cmake",
        constraint: "=3.22.6",
        kind: DependencyKind::Tool,
        options: &[],
    },
];

/// Reject configurations whose options contradict each other.
///
/// Runs before any filesystem or process work.
pub fn check_consistency(config: &BuildConfiguration) -> Result<(), ResolverError> {
    if config.is_enabled(Feature::WithOsre) && !config.is_enabled(Feature::WithQuantlib) {
        return Err(ResolverError::InconsistentConfiguration {
            option: Feature::WithOsre.name().to_string(),
            requirement: "with_quantlib=true".to_string(),
        });
    }

    if config.is_enabled(Feature::WithPython)
        && config.linkage == Linkage::Static
        && config.fpic == Some(false)
    {
        return Err(ResolverError::InconsistentConfiguration {
            option: Feature::WithPython.name().to_string(),
            requirement: "fpic=true when building static libraries".to_string(),
        });
    }

    if config.is_shared() && config.settings.is_msvc() && config.settings.runtime == Runtime::Static
    {
        return Err(ResolverError::InconsistentConfiguration {
            option: "shared".to_string(),
            requirement: "runtime=dynamic with msvc".to_string(),
        });
    }

    Ok(())
}

/// Resolve the ordered dependency list.
///
/// Mandatory dependencies come first, then feature-gated ones in the
/// declaration order of the feature catalog.
pub fn resolve(config: &BuildConfiguration) -> Result<Vec<Dependency>, ResolverError> {
    check_consistency(config)?;

    let mut dependencies = MANDATORY
        .iter()
        .map(|req| Dependency::from_requirement(req, None))
        .collect::<Result<Vec<_>, _>>()?;

    for spec in features::enabled(config) {
        for req in spec.requires {
            dependencies.push(Dependency::from_requirement(req, Some(spec.feature))?);
        }
    }

    tracing::debug!(
        "Resolved {} dependencies: {}",
        dependencies.len(),
        dependencies
            .iter()
            .map(|d| d.name.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    );

    Ok(dependencies)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::configuration;
    use proptest::prelude::*;

    fn config(pairs: &[(&str, bool)], os: &str) -> BuildConfiguration {
        configuration(pairs, &[("os", os)])
    }

    fn names(deps: &[Dependency]) -> Vec<&str> {
        deps.iter().map(|d| d.name.as_str()).collect()
    }

    #[test]
    fn test_default_dependencies() {
        let deps = resolve(&config(&[], "linux")).unwrap();
        assert_eq!(names(&deps), vec!["boost", "gsl", "cmake", "quantlib"]);

        let boost = &deps[0];
        assert!(boost.is_mandatory());
        assert_eq!(boost.constraint, ">=1.85");
        assert_eq!(boost.options["without_python"], "true");

        let quantlib = &deps[3];
        assert_eq!(quantlib.gate, Some(Feature::WithQuantlib));
        assert_eq!(quantlib.options["runtime"], "static");
    }

    #[test]
    fn test_mandatory_before_gated() {
        let deps = resolve(&config(
            &[("with_mpi", true), ("with_quickfix", true)],
            "linux",
        ))
        .unwrap();
        let first_gated = deps.iter().position(|d| !d.is_mandatory()).unwrap();
        assert!(deps[..first_gated].iter().all(Dependency::is_mandatory));
        assert!(deps[first_gated..].iter().all(|d| !d.is_mandatory()));
    }

    #[test]
    fn test_gated_in_declaration_order() {
        let deps = resolve(&config(
            &[("with_quickfix", true), ("with_mpi", true)],
            "linux",
        ))
        .unwrap();
        assert_eq!(
            names(&deps),
            vec!["boost", "gsl", "cmake", "openmpi", "autoconf", "libtool", "quantlib"]
        );
        assert_eq!(deps[4].kind, DependencyKind::Tool);
    }

    #[test]
    fn test_osre_without_quantlib_rejected() {
        let result = resolve(&config(
            &[("with_osre", true), ("with_quantlib", false)],
            "linux",
        ));
        assert_eq!(
            result.unwrap_err(),
            ResolverError::InconsistentConfiguration {
                option: "with_osre".to_string(),
                requirement: "with_quantlib=true".to_string(),
            }
        );
    }

    #[test]
    fn test_python_static_without_pic_rejected() {
        let result = resolve(&config(&[("fpic", false)], "linux"));
        assert!(matches!(
            result,
            Err(ResolverError::InconsistentConfiguration { option, .. }) if option == "with_python"
        ));

        // Shared libraries are position independent anyway
        assert!(resolve(&config(&[("fpic", false), ("shared", true)], "linux")).is_ok());
    }

    #[test]
    fn test_shared_with_static_msvc_runtime_rejected() {
        let result = resolve(&config(&[("shared", true)], "windows"));
        assert!(matches!(
            result,
            Err(ResolverError::InconsistentConfiguration { option, .. }) if option == "shared"
        ));
    }

    #[test]
    fn test_mandatory_constraints_are_valid() {
        for req in MANDATORY {
            assert!(VersionReq::parse(req.constraint).is_ok(), "{}", req.name);
        }
        for spec in features::FEATURES {
            for req in spec.requires {
                assert!(VersionReq::parse(req.constraint).is_ok(), "{}", req.name);
            }
        }
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// Identical configurations always resolve to identical lists
        #[test]
        fn prop_resolution_deterministic(
            mpi: bool,
            quickfix: bool,
            quantlib: bool,
            tests: bool,
        ) {
            let pairs = [
                ("with_mpi", mpi),
                ("with_quickfix", quickfix),
                ("with_quantlib", quantlib),
                ("build_tests", tests),
            ];
            let first = resolve(&config(&pairs, "linux")).unwrap();
            let second = resolve(&config(&pairs, "linux")).unwrap();
            prop_assert_eq!(first, second);
        }

        /// A gated dependency is present exactly when its toggle is on
        #[test]
        fn prop_gated_dependencies_follow_toggles(mpi: bool, quantlib: bool) {
            let deps = resolve(&config(
                &[("with_mpi", mpi), ("with_quantlib", quantlib)],
                "linux",
            ))
            .unwrap();
            prop_assert_eq!(deps.iter().any(|d| d.name == "openmpi"), mpi);
            prop_assert_eq!(deps.iter().any(|d| d.name == "quantlib"), quantlib);
        }
    }
}
