//! CLI command for `eslbuild plan`
//!
//! Shows what a build would do without touching the filesystem.

use anyhow::Result;
use std::path::Path;

use super::{open_session, ConfigArgs};
use crate::cli::output::{is_json, is_quiet, print_detail, print_info, print_json};
use crate::core::resolver::DependencyKind;

/// Execute the plan command
pub async fn execute(project_dir: &Path, config: &ConfigArgs) -> Result<()> {
    let session = open_session(project_dir, config.overrides()?)?;
    let manifest = session.manifest();
    let plan = session.build_plan();
    let sources = session.source_requests();
    let resolved = session.config();

    if is_json() {
        print_json(&serde_json::json!({
            "name": session.name(),
            "version": session.version().to_string(),
            "options": manifest.options.iter().map(|(name, value)| {
                (name.clone(), serde_json::json!({
                    "value": value,
                    "source": resolved.sources.get(name),
                }))
            }).collect::<serde_json::Map<_, _>>(),
            "settings": manifest.settings,
            "dependencies": session.dependencies(),
            "sources": sources.iter().map(|s| serde_json::json!({
                "feature": s.feature,
                "url": s.url,
                "path": session.paths().staging_root.join(&s.dir),
            })).collect::<Vec<_>>(),
            "build_order": plan.order(),
            "libs": manifest.libs,
            "defines": manifest.defines,
        }));
        return Ok(());
    }
    if is_quiet() {
        return Ok(());
    }

    let settings = &resolved.settings;
    print_info(&format!(
        "{} {} ({} {}, {}, {})",
        session.name(),
        session.version(),
        settings.os,
        settings.arch,
        settings.compiler.as_str(),
        settings.build_type.as_str()
    ));

    println!();
    println!("Options:");
    for (name, value) in &manifest.options {
        let source = resolved
            .sources
            .get(name)
            .map(|s| format!("{s:?}").to_lowercase())
            .unwrap_or_default();
        print_detail(&format!("{name} = {value} ({source})"));
    }

    println!();
    println!("Dependencies:");
    for dep in session.dependencies() {
        let kind = match dep.kind {
            DependencyKind::Library => "library",
            DependencyKind::Tool => "tool",
        };
        print_detail(&format!("{} {} [{kind}]", dep.name, dep.constraint));
    }

    if !sources.is_empty() {
        println!();
        println!("Sources:");
        for source in &sources {
            print_detail(&format!(
                "{}: {} -> {}",
                source.feature,
                source.url,
                session.paths().staging_root.join(&source.dir).display()
            ));
        }
    }

    println!();
    println!("Build order: {}", plan.order().join(" -> "));
    println!("Exports: libs [{}]", manifest.libs.join(", "));
    if !manifest.defines.is_empty() {
        print_detail(&format!("defines [{}]", manifest.defines.join(", ")));
    }

    Ok(())
}
