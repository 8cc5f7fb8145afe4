//! Test utilities shared by unit tests
//!
//! Configuration builders and proptest generators.

use std::collections::BTreeMap;

use crate::core::options::{resolve_configuration, BuildConfiguration, Settings};

/// Resolve a configuration from option toggles and setting overrides
pub fn configuration(options: &[(&str, bool)], settings: &[(&str, &str)]) -> BuildConfiguration {
    let cli = options
        .iter()
        .map(|(k, v)| ((*k).to_string(), toml::Value::Boolean(*v)))
        .collect();
    let settings = Settings::host()
        .with_overrides(settings.iter().copied())
        .expect("valid test settings");
    resolve_configuration(&BTreeMap::new(), &cli, settings).expect("valid test configuration")
}

pub mod generators {
    use proptest::prelude::*;

    use crate::core::options::Feature;

    /// Feature toggles that never contradict each other
    ///
    /// OSRE is only switched on together with QuantLib.
    pub fn consistent_toggles() -> impl Strategy<Value = Vec<(&'static str, bool)>> {
        proptest::collection::vec(any::<bool>(), Feature::ALL.len()).prop_map(|values| {
            let mut toggles: Vec<_> = Feature::ALL
                .iter()
                .zip(values)
                .map(|(feature, enabled)| (feature.name(), enabled))
                .collect();
            let quantlib = toggles
                .iter()
                .any(|(name, enabled)| *name == "with_quantlib" && *enabled);
            for (name, enabled) in &mut toggles {
                if *name == "with_osre" {
                    *enabled &= quantlib;
                }
            }
            toggles
        })
    }
}
