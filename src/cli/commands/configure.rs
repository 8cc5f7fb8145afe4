//! CLI command for `eslbuild configure`
//!
//! Writes the toolchain file of every project without building.

use anyhow::{Context, Result};
use std::path::Path;

use super::{open_session, ConfigArgs};
use crate::cli::output::{is_json, print_detail, print_json, print_success};
use crate::core::session::Stage;
use crate::infra::process::SystemRunner;

/// Execute the configure command
pub async fn execute(project_dir: &Path, config: &ConfigArgs) -> Result<()> {
    let session = open_session(project_dir, config.overrides()?)?;
    let report = session
        .run(&SystemRunner, &[Stage::Configure])
        .await
        .context("Failed to write toolchain files")?;

    if is_json() {
        print_json(&serde_json::json!({
            "status": "success",
            "toolchains": report.toolchains,
        }));
        return Ok(());
    }

    print_success(&format!(
        "Configured {} project(s) for {} {}",
        report.toolchains.len(),
        session.name(),
        session.version()
    ));
    for path in &report.toolchains {
        print_detail(&path.display().to_string());
    }
    Ok(())
}
