//! Build command implementation
//!
//! Implements `eslbuild build`: fetch, configure, build, test, install and
//! package in one session.

use anyhow::{Context, Result};
use std::path::Path;

use super::{open_session, ConfigArgs};
use crate::cli::output::{
    create_spinner, is_json, is_quiet, print_detail, print_json, print_success, print_warning,
};
use crate::core::session::{Session, Stage};
use crate::infra::process::SystemRunner;

/// Build options
#[derive(Debug, Clone, Default)]
pub struct BuildOptions {
    /// Stop after the install step
    pub no_package: bool,
    /// Report test failures as warnings
    pub allow_test_failures: bool,
    /// Number of parallel jobs
    pub jobs: Option<usize>,
    /// Print the commands that would run
    pub dry_run: bool,
}

impl BuildOptions {
    /// Session stages for these options
    pub fn stages(&self) -> Vec<Stage> {
        Stage::ALL
            .into_iter()
            .filter(|stage| !self.no_package || !matches!(stage, Stage::Package | Stage::Export))
            .collect()
    }
}

/// Execute the build command
pub async fn execute(project_dir: &Path, config: &ConfigArgs, options: BuildOptions) -> Result<()> {
    let mut overrides = config.overrides()?;
    overrides.jobs = options.jobs;
    overrides.allow_test_failures = options.allow_test_failures;
    let session = open_session(project_dir, overrides)?;

    if options.dry_run {
        return dry_run(&session);
    }

    tracing::info!(
        "Building {} {} with {} jobs",
        session.name(),
        session.version(),
        session.tools().jobs
    );

    let spinner = create_spinner(&format!("Building {} {}...", session.name(), session.version()));
    let result = session.run(&SystemRunner, &options.stages()).await;
    spinner.finish_and_clear();
    let report = result.with_context(|| format!("Build of {} failed", session.name()))?;

    let test_failures = report
        .build
        .as_ref()
        .map(|b| b.test_failures.clone())
        .unwrap_or_default();

    if is_json() {
        print_json(&serde_json::json!({
            "status": if test_failures.is_empty() { "success" } else { "warning" },
            "name": session.name(),
            "version": session.version().to_string(),
            "build_order": report.build.as_ref().map(|b| {
                b.phases.iter().map(|(name, _)| name.clone()).collect::<Vec<_>>()
            }),
            "test_failures": test_failures,
            "package": report.package.as_ref().map(|_| session.package_dir()),
            "metadata": report.metadata,
        }));
        return Ok(());
    }

    for project in &test_failures {
        print_warning(&format!("Tests failed for {project}"));
    }

    print_success(&format!("Built {} {}", session.name(), session.version()));
    if let Some(build) = &report.build {
        for (project, phase) in &build.phases {
            print_detail(&format!("{project}: {phase}"));
        }
    }
    if let Some(package) = &report.package {
        print_detail(&format!(
            "Packaged {} files into {}",
            package.copied.len() + package.unchanged.len(),
            session.package_dir().display()
        ));
        if let Some(load_order) = &package.load_order {
            print_detail(&format!("Load order written to {}", load_order.display()));
        }
    }

    Ok(())
}

/// Print every command of the build plan without running anything
fn dry_run(session: &Session) -> Result<()> {
    let plan = session.build_plan();
    if let Err(e) = plan.preflight() {
        print_warning(&e.to_string());
    }

    let mut commands = Vec::new();
    for project in &plan.projects {
        for step in project.steps() {
            let invocation = project.invocation(step, session.tools(), session.config());
            commands.push((project.name.clone(), step, invocation));
        }
    }

    if is_json() {
        print_json(&serde_json::json!({
            "status": "success",
            "commands": commands.iter().map(|(project, step, invocation)| serde_json::json!({
                "project": project,
                "step": step.name(),
                "cwd": invocation.current_dir,
                "command": invocation.to_string(),
            })).collect::<Vec<_>>(),
        }));
        return Ok(());
    }
    if is_quiet() {
        return Ok(());
    }

    for (project, step, invocation) in &commands {
        println!("# {project} {step} (in {})", invocation.current_dir.display());
        println!("{invocation}");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stages_with_and_without_package() {
        assert_eq!(BuildOptions::default().stages(), Stage::ALL.to_vec());
        let options = BuildOptions {
            no_package: true,
            ..BuildOptions::default()
        };
        assert_eq!(
            options.stages(),
            vec![Stage::Acquire, Stage::Configure, Stage::Build]
        );
    }
}
