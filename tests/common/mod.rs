//! Common test utilities and helpers
//!
//! This module provides shared utilities for integration tests.

#![allow(dead_code)]

use std::path::PathBuf;
use std::process::{Command, Output};
use tempfile::TempDir;

/// Test project context
///
/// Creates a temporary ESL source tree with a recipe and provides
/// utilities for setting up test scenarios.
pub struct TestProject {
    /// Temporary directory for the test project
    pub dir: TempDir,
}

impl TestProject {
    /// Create an empty project in a temporary directory
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("Failed to create temp directory"),
        }
    }

    /// Create a project with the given recipe
    pub fn with_recipe(recipe: &str) -> Self {
        let project = Self::new();
        project.create_file("eslbuild.toml", recipe);
        project.create_file("CMakeLists.txt", "project(esl CXX)\n");
        project
    }

    /// Get the path to the test project directory
    pub fn path(&self) -> PathBuf {
        self.dir.path().to_path_buf()
    }

    /// Create a file in the test project
    pub fn create_file(&self, name: &str, content: &str) {
        let path = self.dir.path().join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("Failed to create parent directories");
        }
        std::fs::write(path, content).expect("Failed to write file");
    }

    /// Create a directory in the test project
    pub fn create_dir(&self, name: &str) {
        let path = self.dir.path().join(name);
        std::fs::create_dir_all(path).expect("Failed to create directory");
    }

    /// Check if a file exists in the test project
    pub fn file_exists(&self, name: &str) -> bool {
        self.dir.path().join(name).exists()
    }

    /// Read a file from the test project
    pub fn read_file(&self, name: &str) -> String {
        std::fs::read_to_string(self.dir.path().join(name)).expect("Failed to read file")
    }

    /// Run the eslbuild binary in this project
    pub fn run(&self, args: &[&str]) -> Output {
        Command::new(env!("CARGO_BIN_EXE_eslbuild"))
            .current_dir(self.path())
            .env_remove("RUST_LOG")
            .env_remove("ESLBUILD_DEPS_DIR")
            .args(args)
            .output()
            .expect("Failed to execute eslbuild")
    }
}

impl Default for TestProject {
    fn default() -> Self {
        Self::new()
    }
}

/// Stdout of a finished command as text
pub fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).to_string()
}

/// Stderr of a finished command as text
pub fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).to_string()
}

/// Recipe targeting Linux without QuantLib, so no dependency packages are
/// needed
pub const SAMPLE_RECIPE: &str = r#"
[package]
name = "esl"
version = "0.2.0"
license = "Apache-2.0"

[options]
with_quantlib = false

[settings]
os = "linux"
arch = "x86_64"
build_type = "Release"
"#;

/// Recipe reading its version from the `version` descriptor
pub const VERSION_FILE_RECIPE: &str = r#"
[package]
name = "esl"
version_file = "version"

[settings]
os = "linux"
"#;

/// Version descriptor in the format of the ESL source tree
pub const VERSION_DESCRIPTOR: &str =
    "ESL_VERSION_MAJOR=1;\nESL_VERSION_MINOR=2;\nESL_VERSION_PATCH=3;\n";
