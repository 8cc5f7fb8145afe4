//! Integration tests for the nested build driver
//!
//! Drives whole sessions through a recording runner: sub-projects are built
//! before the main project, preconditions fail before any process starts,
//! and test failures follow the configured policy.

mod common;

use common::{TestProject, SAMPLE_RECIPE};
use eslbuild::core::builder::{Phase, Step};
use eslbuild::core::recipe::Recipe;
use eslbuild::core::session::{Overrides, Session, Stage};
use eslbuild::error::{BuildError, EslbuildError, ToolchainError};
use eslbuild::infra::process::{Invocation, RecordingRunner};
use std::collections::BTreeMap;

fn session(project: &TestProject, options: &[(&str, bool)], allow_test_failures: bool) -> Session {
    let recipe = Recipe::load(&project.path().join("eslbuild.toml")).unwrap();
    let overrides = Overrides {
        options: options
            .iter()
            .map(|(k, v)| ((*k).to_string(), toml::Value::Boolean(*v)))
            .collect::<BTreeMap<_, _>>(),
        jobs: Some(4),
        allow_test_failures,
        ..Overrides::default()
    };
    Session::new(&project.path(), recipe, overrides).unwrap()
}

/// Project and step of each recorded invocation
fn steps(calls: &[Invocation]) -> Vec<(String, &'static str)> {
    calls
        .iter()
        .map(|call| {
            let dir = call.current_dir.file_name().unwrap().to_string_lossy().to_string();
            let step = if call.program == "ctest" {
                "test"
            } else {
                match call.args[0].as_str() {
                    "-S" => "configure",
                    "--build" => "build",
                    "--install" => "install",
                    other => panic!("unexpected cmake argument {other}"),
                }
            };
            (dir, step)
        })
        .collect()
}

/// Project with staged QuickFIX and OSRE sources and a QuantLib package
fn full_project() -> TestProject {
    let project = TestProject::with_recipe(SAMPLE_RECIPE);
    project.create_file("build/staging/quickfix/CMakeLists.txt", "");
    project.create_file("build/staging/osre/CMakeLists.txt", "");
    project.create_file("deps/quantlib/lib/libQuantLib.a", "");
    project
}

#[tokio::test]
async fn test_sub_projects_build_before_main() {
    let project = full_project();
    let session = session(
        &project,
        &[("with_quickfix", true), ("with_quantlib", true), ("with_osre", true)],
        false,
    );
    let runner = RecordingRunner::new();

    let report = session
        .run(&runner, &[Stage::Configure, Stage::Build])
        .await
        .unwrap();

    let expected: Vec<(String, &str)> = vec![
        ("quickfix".into(), "configure"),
        ("quickfix".into(), "build"),
        ("osre".into(), "configure"),
        ("osre".into(), "build"),
        ("osre".into(), "install"),
        ("esl".into(), "configure"),
        ("esl".into(), "build"),
        ("esl".into(), "test"),
        ("esl".into(), "install"),
    ];
    assert_eq!(steps(&runner.calls()), expected);

    let build = report.build.unwrap();
    assert_eq!(
        build.phases,
        vec![
            ("quickfix".to_string(), Phase::Built),
            ("osre".to_string(), Phase::Installed),
            ("esl".to_string(), Phase::Installed),
        ]
    );

    // Every project got its own toolchain file
    for name in ["quickfix", "osre", "esl"] {
        assert!(project.file_exists(&format!("build/{name}/eslbuild_toolchain.cmake")));
    }
    let esl_toolchain = project.read_file("build/esl/eslbuild_toolchain.cmake");
    assert!(esl_toolchain.contains("set(QUANTLIB_LIBRARY_NAME \"QuantLib\")"));
    assert!(esl_toolchain.contains("set(ESL_WITH_OSRE \"ON\")"));
}

#[tokio::test]
async fn test_quickfix_builds_in_source() {
    let project = full_project();
    let session = session(&project, &[("with_quickfix", true)], false);
    let runner = RecordingRunner::new();

    session.run(&runner, &[Stage::Configure, Stage::Build]).await.unwrap();

    let calls = runner.calls();
    let staged = project.path().join("build/staging/quickfix");
    assert_eq!(calls[0].current_dir, staged);
    let staged = staged.to_string_lossy().to_string();
    assert!(calls[0].args.windows(2).any(|w| w[0] == "-S" && w[1] == staged));
    assert!(calls[0].args.windows(2).any(|w| w[0] == "-B" && w[1] == staged));
    // In-source builds are not installed
    assert!(!steps(&calls).contains(&("quickfix".to_string(), "install")));
}

#[tokio::test]
async fn test_missing_source_fails_before_any_process() {
    let project = TestProject::with_recipe(SAMPLE_RECIPE);
    let session = session(&project, &[("with_quickfix", true)], false);
    let runner = RecordingRunner::new();

    let result = session.run(&runner, &[Stage::Configure, Stage::Build]).await;

    match result {
        Err(EslbuildError::Build(BuildError::MissingSource { feature, path })) => {
            assert_eq!(feature, "with_quickfix");
            assert_eq!(path, project.path().join("build/staging/quickfix"));
        }
        other => panic!("Expected MissingSource, got {other:?}"),
    }
    assert!(runner.calls().is_empty());
}

#[tokio::test]
async fn test_missing_quantlib_package_fails_before_any_process() {
    let project = TestProject::with_recipe(SAMPLE_RECIPE);
    let session = session(&project, &[("with_quantlib", true)], false);
    let runner = RecordingRunner::new();

    let result = session.run(&runner, &[Stage::Configure, Stage::Build]).await;

    assert!(matches!(
        result,
        Err(EslbuildError::Toolchain(ToolchainError::MissingDependencyPackage { .. }))
    ));
    assert!(runner.calls().is_empty());
}

#[tokio::test]
async fn test_failed_build_stops_session() {
    let project = full_project();
    let session = session(&project, &[("with_quickfix", true)], false);
    let runner = RecordingRunner::new()
        .failing_when(|call| (call.args.first().map(String::as_str) == Some("--build")).then_some(2));

    let result = session.run(&runner, &Stage::ALL).await;

    match result {
        Err(EslbuildError::Build(BuildError::ProcessFailed { project, phase, status })) => {
            assert_eq!(project, "quickfix");
            assert_eq!(phase, Step::Build.to_string());
            assert_eq!(status, "exit code 2");
        }
        other => panic!("Expected ProcessFailed, got {other:?}"),
    }
    // Nothing after the failing step ran
    assert_eq!(runner.calls().len(), 2);
    assert!(!project.file_exists("package"));
    assert!(project.file_exists("build/logs/quickfix-build.log"));
}

#[tokio::test]
async fn test_test_failures_fatal_by_default() {
    let project = TestProject::with_recipe(SAMPLE_RECIPE);
    let session = session(&project, &[], false);
    let runner = RecordingRunner::new().failing_when(|call| (call.program == "ctest").then_some(8));

    let result = session.run(&runner, &[Stage::Configure, Stage::Build]).await;

    assert!(matches!(
        result,
        Err(EslbuildError::Build(BuildError::ProcessFailed { ref phase, .. })) if phase == "test"
    ));
    assert!(runner.calls().iter().all(|c| c.args.first().map(String::as_str) != Some("--install")));
}

#[tokio::test]
async fn test_test_failures_can_be_downgraded() {
    let project = TestProject::with_recipe(SAMPLE_RECIPE);
    let session = session(&project, &[], true);
    let runner = RecordingRunner::new().failing_when(|call| (call.program == "ctest").then_some(8));

    let report = session
        .run(&runner, &[Stage::Configure, Stage::Build])
        .await
        .unwrap();

    let build = report.build.unwrap();
    assert_eq!(build.test_failures, vec!["esl".to_string()]);
    assert_eq!(build.phases, vec![("esl".to_string(), Phase::Installed)]);
}

#[test]
fn test_dry_run_prints_commands_without_running() {
    let project = TestProject::with_recipe(SAMPLE_RECIPE);

    let output = project.run(&["--json", "build", "--dry-run", "-j", "3"]);

    assert!(output.status.success(), "stderr: {}", common::stderr(&output));
    let json: serde_json::Value = serde_json::from_str(&common::stdout(&output)).unwrap();
    let steps: Vec<(&str, &str)> = json["commands"]
        .as_array()
        .unwrap()
        .iter()
        .map(|c| (c["project"].as_str().unwrap(), c["step"].as_str().unwrap()))
        .collect();
    assert_eq!(
        steps,
        vec![
            ("esl", "configure"),
            ("esl", "build"),
            ("esl", "test"),
            ("esl", "install"),
        ]
    );
    assert!(json["commands"][1]["command"]
        .as_str()
        .unwrap()
        .contains("--parallel 3"));
    assert!(!project.file_exists("build"));
}
