//! CLI command implementations
//!
//! Each command is implemented in its own submodule.

pub mod build;
pub mod clean;
pub mod configure;
pub mod fetch;
pub mod load_order;
pub mod plan;
pub mod version;

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use std::path::{Path, PathBuf};

use crate::config::defaults;
use crate::core::options::parse_override;
use crate::core::recipe::Recipe;
use crate::core::session::{Overrides, Session};
use crate::error::OptionError;

/// Option and setting overrides shared by the session commands
#[derive(Args, Debug, Clone, Default)]
pub struct ConfigArgs {
    /// Override a recipe option (e.g. -o with_osre=true)
    #[arg(short = 'o', long = "option", value_name = "KEY=VALUE")]
    pub options: Vec<String>,

    /// Override a target setting (e.g. -s build_type=Debug)
    #[arg(short = 's', long = "setting", value_name = "KEY=VALUE")]
    pub settings: Vec<String>,
}

impl ConfigArgs {
    /// Parse into session overrides
    pub fn overrides(&self) -> Result<Overrides, OptionError> {
        let options = self
            .options
            .iter()
            .map(|raw| parse_override(raw))
            .collect::<Result<_, _>>()?;

        let settings = self
            .settings
            .iter()
            .map(|raw| {
                raw.split_once('=')
                    .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
                    .filter(|(k, _)| !k.is_empty())
                    .ok_or_else(|| OptionError::MalformedOverride { input: raw.clone() })
            })
            .collect::<Result<_, _>>()?;

        Ok(Overrides {
            options,
            settings,
            ..Overrides::default()
        })
    }
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Show the resolved configuration, dependencies and build order
    Plan {
        #[command(flatten)]
        config: ConfigArgs,
    },

    /// Download and stage optional sub-project sources
    Fetch {
        #[command(flatten)]
        config: ConfigArgs,

        /// Re-download sources that are already staged
        #[arg(short, long)]
        force: bool,
    },

    /// Write toolchain files without building
    Configure {
        #[command(flatten)]
        config: ConfigArgs,
    },

    /// Fetch, configure, build, test and package
    Build {
        #[command(flatten)]
        config: ConfigArgs,

        /// Stop after the install step
        #[arg(long)]
        no_package: bool,

        /// Report test failures as warnings
        #[arg(long)]
        allow_test_failures: bool,

        /// Number of parallel jobs
        #[arg(short, long)]
        jobs: Option<usize>,

        /// Print the commands that would run
        #[arg(long)]
        dry_run: bool,
    },

    /// Remove build artifacts
    Clean {
        /// Also remove the package directory
        #[arg(long)]
        all: bool,
    },

    /// Print the package version
    Version {
        /// Read this version descriptor instead of the recipe's
        #[arg(long)]
        file: Option<PathBuf>,
    },

    /// Check the runtime library load order of a package
    LoadOrder {
        /// Directory holding the load-order manifests (usually `<package>/bin`)
        dir: PathBuf,

        /// Target operating system (defaults to the host)
        #[arg(long)]
        os: Option<String>,
    },
}

impl Commands {
    /// Execute the command
    pub async fn run(self, project_dir: &Path) -> Result<()> {
        match self {
            Self::Plan { config } => plan::execute(project_dir, &config).await,
            Self::Fetch { config, force } => fetch::execute(project_dir, &config, force).await,
            Self::Configure { config } => configure::execute(project_dir, &config).await,
            Self::Build {
                config,
                no_package,
                allow_test_failures,
                jobs,
                dry_run,
            } => {
                let options = build::BuildOptions {
                    no_package,
                    allow_test_failures,
                    jobs,
                    dry_run,
                };
                build::execute(project_dir, &config, options).await
            }
            Self::Clean { all } => clean::execute(project_dir, all).await,
            Self::Version { file } => version::execute(project_dir, file.as_deref()).await,
            Self::LoadOrder { dir, os } => load_order::execute(&dir, os.as_deref()).await,
        }
    }
}

/// Load `eslbuild.toml` from a project directory
pub fn load_recipe(project_dir: &Path) -> Result<Recipe> {
    let recipe_path = project_dir.join(defaults::RECIPE_FILE);
    Recipe::load(&recipe_path)
        .with_context(|| format!("Failed to load recipe from {}", recipe_path.display()))
}

/// Load the recipe and resolve a session from it
pub fn open_session(project_dir: &Path, overrides: Overrides) -> Result<Session> {
    let recipe = load_recipe(project_dir)?;
    Session::new(project_dir, recipe, overrides).context("Failed to resolve build configuration")
}
