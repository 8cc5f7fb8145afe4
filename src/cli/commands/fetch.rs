//! CLI command for `eslbuild fetch`
//!
//! Stages the sources of enabled sub-projects without building.

use anyhow::{Context, Result};
use std::path::Path;

use super::{open_session, ConfigArgs};
use crate::cli::output::{create_spinner, is_json, print_detail, print_json, print_success};
use crate::core::session::Stage;
use crate::infra::process::SystemRunner;

/// Execute the fetch command
pub async fn execute(project_dir: &Path, config: &ConfigArgs, force: bool) -> Result<()> {
    let mut overrides = config.overrides()?;
    overrides.force_fetch = force;
    let session = open_session(project_dir, overrides)?;

    if session.source_requests().is_empty() {
        if is_json() {
            print_json(&serde_json::json!({ "status": "success", "fetched": [], "skipped": [] }));
        } else {
            print_success("No optional sources enabled, nothing to fetch");
        }
        return Ok(());
    }

    let spinner = create_spinner("Fetching sources...");
    let report = session.run(&SystemRunner, &[Stage::Acquire]).await;
    spinner.finish_and_clear();
    let acquired = report
        .context("Failed to fetch sources")?
        .acquired
        .unwrap_or_default();

    if is_json() {
        let names = |staged: &[crate::core::acquire::StagedSource]| {
            staged.iter().map(|s| s.feature.clone()).collect::<Vec<_>>()
        };
        print_json(&serde_json::json!({
            "status": "success",
            "fetched": names(&acquired.fetched),
            "skipped": names(&acquired.skipped),
        }));
        return Ok(());
    }

    for staged in &acquired.fetched {
        print_success(&format!("Fetched {} into {}", staged.feature, staged.path.display()));
    }
    for staged in &acquired.skipped {
        print_detail(&format!("{} already staged at {}", staged.feature, staged.path.display()));
    }

    Ok(())
}
