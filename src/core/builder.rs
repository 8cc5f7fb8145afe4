//! Build orchestration logic
//!
//! Drives each project of a session through
//! `Unconfigured -> Configured -> Built -> (Tested) -> Installed`. Sub-projects
//! run in catalog order and the main project runs last. Every child process
//! gets its own working directory and output log.

use std::fmt;
use std::path::{Path, PathBuf};

use crate::core::features::{self, SubBuildKind};
use crate::core::options::{BuildConfiguration, Feature};
use crate::core::recipe::TestPolicy;
use crate::core::toolchain::{self, MAIN_PROJECT};
use crate::config::defaults;
use crate::error::BuildError;
use crate::infra::filesystem;
use crate::infra::process::{CommandRunner, Invocation, ProcessOutput};

/// Lifecycle state of one project
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Phase {
    Unconfigured,
    Configured,
    Built,
    Tested,
    Installed,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Phase::Unconfigured => "unconfigured",
            Phase::Configured => "configured",
            Phase::Built => "built",
            Phase::Tested => "tested",
            Phase::Installed => "installed",
        })
    }
}

/// A step that moves a project to the next phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Configure,
    Build,
    Test,
    Install,
}

impl Step {
    pub const fn name(self) -> &'static str {
        match self {
            Step::Configure => "configure",
            Step::Build => "build",
            Step::Test => "test",
            Step::Install => "install",
        }
    }

    /// Phases this step may start from
    const fn allowed_from(self) -> &'static [Phase] {
        match self {
            Step::Configure => &[Phase::Unconfigured],
            Step::Build => &[Phase::Configured],
            Step::Test => &[Phase::Built],
            Step::Install => &[Phase::Built, Phase::Tested],
        }
    }

    const fn target(self) -> Phase {
        match self {
            Step::Configure => Phase::Configured,
            Step::Build => Phase::Built,
            Step::Test => Phase::Tested,
            Step::Install => Phase::Installed,
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Build tools and parallelism
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tools {
    pub cmake: String,
    pub ctest: String,
    pub jobs: usize,
}

impl Default for Tools {
    fn default() -> Self {
        Self {
            cmake: defaults::DEFAULT_CMAKE.to_string(),
            ctest: defaults::DEFAULT_CTEST.to_string(),
            jobs: num_cpus::get(),
        }
    }
}

/// One project built during a session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectBuild {
    pub name: String,
    /// Feature that enabled this project (`None` for the main project)
    pub feature: Option<Feature>,
    pub kind: SubBuildKind,
    pub source_dir: PathBuf,
    pub build_dir: PathBuf,
    pub toolchain_file: PathBuf,
    /// Install prefix (`None` for in-source builds, which are not installed)
    pub install_prefix: Option<PathBuf>,
    pub run_tests: bool,
    phase: Phase,
}

impl ProjectBuild {
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Steps this project goes through, in order
    pub fn steps(&self) -> Vec<Step> {
        let mut steps = vec![Step::Configure, Step::Build];
        if self.run_tests {
            steps.push(Step::Test);
        }
        if self.install_prefix.is_some() {
            steps.push(Step::Install);
        }
        steps
    }

    /// Move to the phase after `step`, rejecting out-of-order requests
    pub fn advance(&mut self, step: Step) -> Result<Phase, BuildError> {
        if !step.allowed_from().contains(&self.phase) {
            return Err(BuildError::InvalidTransition {
                project: self.name.clone(),
                from: self.phase.to_string(),
                to: step.to_string(),
            });
        }
        self.phase = step.target();
        Ok(self.phase)
    }

    /// The process performing `step`
    pub fn invocation(&self, step: Step, tools: &Tools, config: &BuildConfiguration) -> Invocation {
        let build_type = config.settings.build_type.as_str();
        let build_dir = self.build_dir.to_string_lossy().to_string();

        match step {
            Step::Configure => {
                let mut invocation = Invocation::new(&tools.cmake, &self.build_dir).args([
                    "-S".to_string(),
                    self.source_dir.to_string_lossy().to_string(),
                    "-B".to_string(),
                    build_dir,
                    format!(
                        "-DCMAKE_TOOLCHAIN_FILE={}",
                        filesystem::to_forward_slashes(&self.toolchain_file)
                    ),
                    format!("-DCMAKE_BUILD_TYPE={build_type}"),
                ]);
                if let Some(prefix) = &self.install_prefix {
                    invocation = invocation.arg(format!(
                        "-DCMAKE_INSTALL_PREFIX={}",
                        filesystem::to_forward_slashes(prefix)
                    ));
                }
                invocation
            }
            Step::Build => Invocation::new(&tools.cmake, &self.build_dir).args([
                "--build".to_string(),
                build_dir,
                "--config".to_string(),
                build_type.to_string(),
                "--parallel".to_string(),
                tools.jobs.to_string(),
            ]),
            Step::Test => Invocation::new(&tools.ctest, &self.build_dir).args([
                "--test-dir".to_string(),
                build_dir,
                "-C".to_string(),
                build_type.to_string(),
                "--output-on-failure".to_string(),
                "--verbose".to_string(),
            ]),
            Step::Install => {
                let prefix = self
                    .install_prefix
                    .as_deref()
                    .map(filesystem::to_forward_slashes)
                    .unwrap_or_default();
                Invocation::new(&tools.cmake, &self.build_dir).args([
                    "--install".to_string(),
                    build_dir,
                    "--config".to_string(),
                    build_type.to_string(),
                    "--prefix".to_string(),
                    prefix,
                ])
            }
        }
    }
}

/// Directories a build plan is laid out in
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildPaths {
    /// Main project sources (the recipe directory)
    pub source_root: PathBuf,
    pub build_root: PathBuf,
    pub staging_root: PathBuf,
}

impl BuildPaths {
    /// Install prefix of the main project
    pub fn main_install_prefix(&self) -> PathBuf {
        self.build_root.join("install")
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.build_root.join("logs")
    }
}

/// The ordered projects of one session
#[derive(Debug, Clone)]
pub struct BuildPlan {
    pub projects: Vec<ProjectBuild>,
}

impl BuildPlan {
    /// Lay out the sub-projects of enabled features and the main project
    ///
    /// Sub-projects come first in catalog order, the main project last.
    pub fn new(config: &BuildConfiguration, paths: &BuildPaths) -> Self {
        let mut projects = Vec::new();

        for spec in features::enabled(config) {
            let (Some(sub), Some(source)) = (spec.sub_build, spec.source) else {
                continue;
            };
            let staged = paths.staging_root.join(source.dir);

            let (build_dir, install_prefix) = match sub.kind {
                SubBuildKind::InSource => (staged.clone(), None),
                SubBuildKind::OutOfTree => (
                    toolchain::project_dir(&paths.build_root, sub.project),
                    Some(toolchain::install_prefix(&paths.build_root, sub.project)),
                ),
            };

            projects.push(ProjectBuild {
                name: sub.project.to_string(),
                feature: Some(spec.feature),
                kind: sub.kind,
                source_dir: staged,
                build_dir,
                toolchain_file: toolchain::project_dir(&paths.build_root, sub.project)
                    .join(defaults::TOOLCHAIN_FILE),
                install_prefix,
                run_tests: false,
                phase: Phase::Unconfigured,
            });
        }

        projects.push(ProjectBuild {
            name: MAIN_PROJECT.to_string(),
            feature: None,
            kind: SubBuildKind::OutOfTree,
            source_dir: paths.source_root.clone(),
            build_dir: toolchain::project_dir(&paths.build_root, MAIN_PROJECT),
            toolchain_file: toolchain::project_dir(&paths.build_root, MAIN_PROJECT)
                .join(defaults::TOOLCHAIN_FILE),
            install_prefix: Some(paths.main_install_prefix()),
            run_tests: config.is_enabled(Feature::BuildTests),
            phase: Phase::Unconfigured,
        });

        Self { projects }
    }

    /// Project names in build order
    pub fn order(&self) -> Vec<&str> {
        self.projects.iter().map(|p| p.name.as_str()).collect()
    }

    /// Fail if any sub-project's staged sources are absent
    pub fn preflight(&self) -> Result<(), BuildError> {
        for project in &self.projects {
            if let Some(feature) = project.feature {
                if !project.source_dir.is_dir() {
                    return Err(BuildError::MissingSource {
                        feature: feature.name().to_string(),
                        path: project.source_dir.clone(),
                    });
                }
            }
        }
        Ok(())
    }
}

/// Outcome of driving a plan
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BuildReport {
    /// Final phase per project, in build order
    pub phases: Vec<(String, Phase)>,
    /// Projects whose tests failed under [`TestPolicy::Warn`]
    pub test_failures: Vec<String>,
}

/// Runs a [`BuildPlan`] through a [`CommandRunner`]
pub struct BuildDriver<'a> {
    runner: &'a dyn CommandRunner,
    tools: Tools,
    test_policy: TestPolicy,
    logs_dir: PathBuf,
}

impl<'a> BuildDriver<'a> {
    pub fn new(
        runner: &'a dyn CommandRunner,
        tools: Tools,
        test_policy: TestPolicy,
        logs_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            runner,
            tools,
            test_policy,
            logs_dir: logs_dir.into(),
        }
    }

    fn check_tools(&self, plan: &BuildPlan) -> Result<(), BuildError> {
        let mut tools = vec![self.tools.cmake.as_str()];
        if plan.projects.iter().any(|p| p.run_tests) {
            tools.push(self.tools.ctest.as_str());
        }
        for tool in tools {
            if !self.runner.locate(tool) {
                return Err(BuildError::ToolNotFound {
                    tool: tool.to_string(),
                });
            }
        }
        Ok(())
    }

    /// Build every project of the plan in order.
    ///
    /// Preconditions are checked before the first process starts. A failing
    /// step stops the run; phases already completed stay on disk.
    pub fn run(
        &self,
        plan: &mut BuildPlan,
        config: &BuildConfiguration,
    ) -> Result<BuildReport, BuildError> {
        plan.preflight()?;
        self.check_tools(plan)?;

        let mut report = BuildReport::default();

        for project in &mut plan.projects {
            tracing::info!("Building {}", project.name);
            filesystem::create_dir_all(&project.build_dir)?;

            for step in project.steps() {
                let invocation = project.invocation(step, &self.tools, config);
                let output = self.execute(project, step, &invocation)?;

                if !output.success {
                    if step == Step::Test && self.test_policy == TestPolicy::Warn {
                        tracing::warn!(
                            "Tests failed for {} ({}); continuing",
                            project.name,
                            output.status()
                        );
                        report.test_failures.push(project.name.clone());
                    } else {
                        return Err(BuildError::ProcessFailed {
                            project: project.name.clone(),
                            phase: step.to_string(),
                            status: output.status(),
                        });
                    }
                }

                project.advance(step)?;
            }

            report.phases.push((project.name.clone(), project.phase()));
        }

        Ok(report)
    }

    fn execute(
        &self,
        project: &ProjectBuild,
        step: Step,
        invocation: &Invocation,
    ) -> Result<ProcessOutput, BuildError> {
        tracing::debug!("{} {}: {invocation}", project.name, step);

        let output = self
            .runner
            .run(invocation)
            .map_err(|e| BuildError::Spawn {
                program: invocation.program.clone(),
                project: project.name.clone(),
                phase: step.to_string(),
                error: e.to_string(),
            })?;

        let log = self.log_path(&project.name, step);
        write_log(&log, invocation, &output)?;
        if !output.success {
            tracing::error!(
                "{step} of {} failed, see {}",
                project.name,
                log.display()
            );
        }

        Ok(output)
    }

    /// Log file for one step of one project
    pub fn log_path(&self, project: &str, step: Step) -> PathBuf {
        self.logs_dir.join(format!("{project}-{step}.log"))
    }
}

fn write_log(path: &Path, invocation: &Invocation, output: &ProcessOutput) -> Result<(), BuildError> {
    let content = format!(
        "$ {invocation}\n# cwd: {}\n# {}\n\n{}{}",
        invocation.current_dir.display(),
        output.status(),
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr),
    );
    filesystem::write_file(path, &content)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::configuration;
    use crate::infra::process::RecordingRunner;
    use tempfile::TempDir;

    fn config(pairs: &[(&str, bool)]) -> BuildConfiguration {
        configuration(pairs, &[("os", "linux")])
    }

    fn paths(root: &Path) -> BuildPaths {
        BuildPaths {
            source_root: root.to_path_buf(),
            build_root: root.join("build"),
            staging_root: root.join("build/staging"),
        }
    }

    fn tools() -> Tools {
        Tools {
            cmake: "cmake".to_string(),
            ctest: "ctest".to_string(),
            jobs: 2,
        }
    }

    // ============================================
    // Unit Tests - State Machine
    // ============================================

    #[test]
    fn test_phase_transitions_in_order() {
        let temp = TempDir::new().unwrap();
        let mut plan = BuildPlan::new(&config(&[]), &paths(temp.path()));
        let main = &mut plan.projects[0];

        assert_eq!(main.phase(), Phase::Unconfigured);
        assert_eq!(main.advance(Step::Configure).unwrap(), Phase::Configured);
        assert_eq!(main.advance(Step::Build).unwrap(), Phase::Built);
        assert_eq!(main.advance(Step::Test).unwrap(), Phase::Tested);
        assert_eq!(main.advance(Step::Install).unwrap(), Phase::Installed);
    }

    #[test]
    fn test_out_of_order_transition_rejected() {
        let temp = TempDir::new().unwrap();
        let mut plan = BuildPlan::new(&config(&[]), &paths(temp.path()));
        let main = &mut plan.projects[0];

        match main.advance(Step::Build).unwrap_err() {
            BuildError::InvalidTransition { project, from, to } => {
                assert_eq!(project, "esl");
                assert_eq!(from, "unconfigured");
                assert_eq!(to, "build");
            }
            e => panic!("Expected InvalidTransition, got {e:?}"),
        }
        assert_eq!(main.phase(), Phase::Unconfigured);
    }

    #[test]
    fn test_install_allowed_without_tests() {
        let temp = TempDir::new().unwrap();
        let mut plan =
            BuildPlan::new(&config(&[("build_tests", false)]), &paths(temp.path()));
        let main = &mut plan.projects[0];
        assert_eq!(
            main.steps(),
            vec![Step::Configure, Step::Build, Step::Install]
        );
        main.advance(Step::Configure).unwrap();
        main.advance(Step::Build).unwrap();
        assert!(main.advance(Step::Install).is_ok());
    }

    // ============================================
    // Unit Tests - Plan Layout
    // ============================================

    #[test]
    fn test_plan_order_subprojects_first() {
        let temp = TempDir::new().unwrap();
        let plan = BuildPlan::new(
            &config(&[("with_osre", true), ("with_quickfix", true)]),
            &paths(temp.path()),
        );
        assert_eq!(plan.order(), vec!["quickfix", "osre", "esl"]);

        let quickfix = &plan.projects[0];
        assert_eq!(quickfix.build_dir, quickfix.source_dir);
        assert_eq!(quickfix.install_prefix, None);
        assert_eq!(quickfix.steps(), vec![Step::Configure, Step::Build]);

        let osre = &plan.projects[1];
        assert_eq!(osre.build_dir, temp.path().join("build/osre"));
        assert_eq!(
            osre.install_prefix,
            Some(temp.path().join("build/osre-install"))
        );
        assert!(!osre.run_tests);
    }

    #[test]
    fn test_preflight_missing_source() {
        let temp = TempDir::new().unwrap();
        let plan =
            BuildPlan::new(&config(&[("with_quickfix", true)]), &paths(temp.path()));

        match plan.preflight().unwrap_err() {
            BuildError::MissingSource { feature, path } => {
                assert_eq!(feature, "with_quickfix");
                assert_eq!(path, temp.path().join("build/staging/quickfix"));
            }
            e => panic!("Expected MissingSource, got {e:?}"),
        }
    }

    #[test]
    fn test_test_invocation_flags() {
        let temp = TempDir::new().unwrap();
        let cfg = config(&[]);
        let plan = BuildPlan::new(&cfg, &paths(temp.path()));
        let invocation = plan.projects[0].invocation(Step::Test, &tools(), &cfg);

        assert_eq!(invocation.program, "ctest");
        assert!(invocation.args.contains(&"--output-on-failure".to_string()));
        assert!(invocation.args.contains(&"--verbose".to_string()));
        assert_eq!(invocation.current_dir, temp.path().join("build/esl"));
    }

    // ============================================
    // Unit Tests - Driver
    // ============================================

    #[test]
    fn test_driver_runs_all_steps_and_logs() {
        let temp = TempDir::new().unwrap();
        let cfg = config(&[]);
        let paths = paths(temp.path());
        let mut plan = BuildPlan::new(&cfg, &paths);
        let runner = RecordingRunner::new();

        let driver = BuildDriver::new(&runner, tools(), TestPolicy::Fatal, paths.logs_dir());
        let report = driver.run(&mut plan, &cfg).unwrap();

        assert_eq!(report.phases, vec![("esl".to_string(), Phase::Installed)]);
        assert_eq!(runner.calls().len(), 4);
        assert!(paths.logs_dir().join("esl-configure.log").is_file());
        assert!(paths.logs_dir().join("esl-install.log").is_file());
    }

    #[test]
    fn test_driver_test_failure_fatal() {
        let temp = TempDir::new().unwrap();
        let cfg = config(&[]);
        let paths = paths(temp.path());
        let mut plan = BuildPlan::new(&cfg, &paths);
        let runner = RecordingRunner::new().failing_when(|inv| (inv.program == "ctest").then_some(1));

        let driver = BuildDriver::new(&runner, tools(), TestPolicy::Fatal, paths.logs_dir());
        match driver.run(&mut plan, &cfg).unwrap_err() {
            BuildError::ProcessFailed { project, phase, .. } => {
                assert_eq!(project, "esl");
                assert_eq!(phase, "test");
            }
            e => panic!("Expected ProcessFailed, got {e:?}"),
        }
        assert_eq!(plan.projects[0].phase(), Phase::Built);
    }

    #[test]
    fn test_driver_test_failure_warn() {
        let temp = TempDir::new().unwrap();
        let cfg = config(&[]);
        let paths = paths(temp.path());
        let mut plan = BuildPlan::new(&cfg, &paths);
        let runner = RecordingRunner::new().failing_when(|inv| (inv.program == "ctest").then_some(1));

        let driver = BuildDriver::new(&runner, tools(), TestPolicy::Warn, paths.logs_dir());
        let report = driver.run(&mut plan, &cfg).unwrap();
        assert_eq!(report.test_failures, vec!["esl".to_string()]);
        assert_eq!(report.phases[0].1, Phase::Installed);
    }

    #[test]
    fn test_driver_missing_source_runs_nothing() {
        let temp = TempDir::new().unwrap();
        let cfg = config(&[("with_osre", true)]);
        let paths = paths(temp.path());
        let mut plan = BuildPlan::new(&cfg, &paths);
        let runner = RecordingRunner::new();

        let driver = BuildDriver::new(&runner, tools(), TestPolicy::Fatal, paths.logs_dir());
        assert!(matches!(
            driver.run(&mut plan, &cfg),
            Err(BuildError::MissingSource { .. })
        ));
        assert!(runner.calls().is_empty());
    }
}
