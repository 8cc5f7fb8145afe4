//! CLI implementation for `eslbuild clean`
//!
//! Removes the build and staging directories, and the package with `--all`.

use anyhow::{Context, Result};
use std::path::Path;

use super::load_recipe;
use crate::cli::output::{is_json, print_detail, print_json, print_success};
use crate::core::session;

/// Execute the clean command
pub async fn execute(project_dir: &Path, all: bool) -> Result<()> {
    let recipe = load_recipe(project_dir)?;
    let removed = session::clean(project_dir, &recipe.layout, all)
        .with_context(|| "Failed to clean build artifacts")?;

    if is_json() {
        print_json(&serde_json::json!({ "status": "success", "removed": removed }));
        return Ok(());
    }

    if removed.is_empty() {
        print_success("Nothing to clean");
    } else {
        print_success("Cleaned build artifacts:");
        for dir in &removed {
            print_detail(&format!("Removed {}/", dir.display()));
        }
    }

    Ok(())
}
