//! CLI command for `eslbuild version`
//!
//! Prints the package version from the recipe or a version descriptor.

use anyhow::{Context, Result};
use std::path::Path;

use super::load_recipe;
use crate::cli::output::{is_json, is_quiet, print_json, verbosity};
use crate::core::version::read_version_descriptor;

/// Identifier prefix used when no recipe is available
const DEFAULT_PREFIX: &str = "ESL";

/// Build metadata of this binary
pub fn build_info() -> serde_json::Value {
    serde_json::json!({
        "version": env!("CARGO_PKG_VERSION"),
        "git_sha": option_env!("VERGEN_GIT_SHA"),
        "git_dirty": option_env!("VERGEN_GIT_DIRTY").map(|d| d == "true"),
        "target": option_env!("VERGEN_CARGO_TARGET_TRIPLE"),
        "built": option_env!("VERGEN_BUILD_TIMESTAMP"),
    })
}

/// Execute the version command
pub async fn execute(project_dir: &Path, file: Option<&Path>) -> Result<()> {
    let (name, version) = match file {
        Some(file) => {
            // A recipe is optional here; it only supplies the prefix
            let recipe = load_recipe(project_dir).ok();
            let prefix = recipe
                .as_ref()
                .map_or_else(|| DEFAULT_PREFIX.to_string(), |r| r.version_prefix());
            let name = recipe.map_or_else(|| "esl".to_string(), |r| r.package.name);
            let version = read_version_descriptor(file, &prefix)
                .with_context(|| format!("Failed to read version from {}", file.display()))?;
            (name, version)
        }
        None => {
            let recipe = load_recipe(project_dir)?;
            let version = recipe
                .version(project_dir)
                .context("Failed to determine package version")?;
            (recipe.package.name, version)
        }
    };

    if is_json() {
        print_json(&serde_json::json!({
            "name": name,
            "version": version.to_string(),
            "major": version.major,
            "minor": version.minor,
            "patch": version.patch,
            "eslbuild": build_info(),
        }));
        return Ok(());
    }

    if !is_quiet() {
        println!("{name} {version}");
        if verbosity() > 0 {
            let info = build_info();
            println!(
                "eslbuild {} ({} {})",
                env!("CARGO_PKG_VERSION"),
                info["git_sha"].as_str().unwrap_or("unknown"),
                info["target"].as_str().unwrap_or("unknown")
            );
        }
    }

    Ok(())
}
