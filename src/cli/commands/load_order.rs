//! CLI command for `eslbuild load-order`
//!
//! Runs the platform preloader over the load-order manifests of a package,
//! opening each listed library for reading.

use anyhow::{bail, Context, Result};
use std::path::Path;

use crate::cli::output::{is_json, print_detail, print_info, print_json, print_success};
use crate::core::options::Settings;
use crate::core::preload::{manifests_in, open_for_read, preloader_for};

/// Execute the load-order command
pub async fn execute(dir: &Path, os: Option<&str>) -> Result<()> {
    let settings = match os {
        Some(os) => Settings::host().with_overrides([("os", os)])?,
        None => Settings::host(),
    };
    let preloader = preloader_for(settings.os, Box::new(open_for_read));

    let manifests = manifests_in(dir);
    if manifests.is_empty() {
        bail!("No load-order manifest found in {}", dir.display());
    }

    let mut results = Vec::new();
    for manifest in &manifests {
        let opened = preloader
            .preload(manifest)
            .with_context(|| format!("Load order check failed for {}", manifest.display()))?;
        results.push((manifest, opened));
    }

    if is_json() {
        print_json(&serde_json::json!({
            "status": "success",
            "preloader": preloader.name(),
            "manifests": results.iter().map(|(manifest, opened)| serde_json::json!({
                "manifest": manifest,
                "libraries": opened,
            })).collect::<Vec<_>>(),
        }));
        return Ok(());
    }

    print_info(&format!(
        "Using the {} preloader for {}",
        preloader.name(),
        settings.os
    ));
    for (manifest, opened) in &results {
        print_success(&format!(
            "{}: {} libraries",
            manifest.display(),
            opened.len()
        ));
        for library in opened {
            print_detail(&library.display().to_string());
        }
    }
    Ok(())
}
