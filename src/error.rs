//! Error types for eslbuild
//!
//! Domain-specific error types using thiserror.

use std::path::PathBuf;
use thiserror::Error;

use crate::core::version::VersionError;
use crate::infra::archive::ArchiveError;

/// Recipe (eslbuild.toml) errors
#[derive(Error, Debug)]
pub enum RecipeError {
    /// Recipe file not found
    #[error("Recipe not found at '{path}'. Create an eslbuild.toml next to CMakeLists.txt.")]
    NotFound { path: PathBuf },

    /// Recipe could not be read
    #[error("Failed to read recipe '{path}'")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Recipe is not valid TOML or does not match the schema
    #[error("Failed to parse recipe: {source}")]
    Parse { source: toml::de::Error },

    /// Environment substitution failed
    #[error("Failed to substitute environment variables in recipe: {0}")]
    Substitution(String),

    /// Neither `version` nor `version_file` given
    #[error("Recipe for '{name}' must set either package.version or package.version_file")]
    MissingVersion { name: String },

    /// Both `version` and `version_file` given
    #[error("Recipe for '{name}' sets both package.version and package.version_file")]
    AmbiguousVersion { name: String },

    /// Unknown test failure policy
    #[error("Invalid build.test_failure '{value}': must be one of \"fatal\", \"warn\"")]
    InvalidTestPolicy { value: String },
}

/// Option validation errors
#[derive(Error, Debug, PartialEq)]
pub enum OptionError {
    /// Option name is not part of the recipe's option set
    #[error("Unknown option '{name}': must be one of {known:?}")]
    Unknown { name: String, known: Vec<String> },

    /// Invalid option type
    #[error("Option '{name}' has invalid type: expected {expected}, got {got}")]
    InvalidType {
        name: String,
        expected: String,
        got: String,
    },

    /// Invalid choice value
    #[error("Option '{name}' has invalid value '{value}': must be one of {choices:?}")]
    InvalidChoice {
        name: String,
        value: String,
        choices: Vec<String>,
    },

    /// Option does not exist on the target platform
    #[error("Option '{name}' is not available when targeting {os}")]
    NotAvailable { name: String, os: String },

    /// Malformed `key=value` override
    #[error("Malformed override '{input}': expected KEY=VALUE")]
    MalformedOverride { input: String },
}

/// Dependency resolution errors
#[derive(Error, Debug, PartialEq)]
pub enum ResolverError {
    /// Options contradict each other
    #[error("Inconsistent configuration: '{option}' requires {requirement}")]
    InconsistentConfiguration { option: String, requirement: String },

    /// Version constraint is not a valid semver requirement
    #[error("Invalid version constraint '{constraint}' for '{dependency}': {reason}")]
    InvalidConstraint {
        dependency: String,
        constraint: String,
        reason: String,
    },
}

/// Download errors
#[derive(Error, Debug)]
pub enum DownloadError {
    /// Network error
    #[error("Network error downloading '{url}': {error}")]
    NetworkError { url: String, error: String },

    /// Checksum verification failed
    #[error("Checksum verification failed for '{file}': expected {expected}, got {actual}")]
    ChecksumFailed {
        file: String,
        expected: String,
        actual: String,
    },

    /// IO error
    #[error("IO error for '{path}': {error}")]
    IoError { path: PathBuf, error: String },
}

/// Source acquisition errors
#[derive(Error, Debug)]
pub enum AcquireError {
    /// Archive could not be downloaded
    #[error("Failed to fetch sources for '{feature}' from {url}")]
    Download {
        feature: String,
        url: String,
        #[source]
        source: DownloadError,
    },

    /// Archive could not be extracted
    #[error("Failed to extract '{}' for '{feature}'", archive.display())]
    Extraction {
        feature: String,
        archive: PathBuf,
        #[source]
        source: ArchiveError,
    },

    /// Staging directory could not be prepared
    #[error("Failed to prepare staging directory for '{feature}'")]
    Staging {
        feature: String,
        #[source]
        source: FilesystemError,
    },
}

/// Filesystem errors
#[derive(Error, Debug)]
pub enum FilesystemError {
    /// Failed to create directory
    #[error("Failed to create directory '{path}': {error}")]
    CreateDir { path: PathBuf, error: String },

    /// Failed to remove directory
    #[error("Failed to remove directory '{path}': {error}")]
    RemoveDir { path: PathBuf, error: String },

    /// Failed to remove file
    #[error("Failed to remove file '{path}': {error}")]
    RemoveFile { path: PathBuf, error: String },

    /// Failed to write file
    #[error("Failed to write file '{path}': {error}")]
    WriteFile { path: PathBuf, error: String },

    /// Failed to read file
    #[error("Failed to read file '{path}': {error}")]
    ReadFile { path: PathBuf, error: String },

    /// Failed to copy file
    #[error("Failed to copy '{from}' to '{to}': {error}")]
    CopyFile {
        from: PathBuf,
        to: PathBuf,
        error: String,
    },

    /// Failed to rename
    #[error("Failed to move '{from}' to '{to}': {error}")]
    Rename {
        from: PathBuf,
        to: PathBuf,
        error: String,
    },
}

/// Toolchain generation errors
#[derive(Error, Debug)]
pub enum ToolchainError {
    /// An enabled dependency has no package directory
    #[error("Package for dependency '{dependency}' not found at '{}'", path.display())]
    MissingDependencyPackage { dependency: String, path: PathBuf },

    /// Toolchain file could not be written
    #[error(transparent)]
    Filesystem(#[from] FilesystemError),
}

/// Nested build errors
#[derive(Error, Debug)]
pub enum BuildError {
    /// A staged source directory is absent at build time
    #[error("Sources for '{feature}' not found at '{}'. Run 'eslbuild fetch' first.", path.display())]
    MissingSource { feature: String, path: PathBuf },

    /// A build phase exited unsuccessfully
    #[error("{phase} failed for '{project}': {status}")]
    ProcessFailed {
        project: String,
        phase: String,
        status: String,
    },

    /// A build phase could not be started
    #[error("Failed to start '{program}' for {phase} of '{project}': {error}")]
    Spawn {
        program: String,
        project: String,
        phase: String,
        error: String,
    },

    /// Phases were requested out of order
    #[error("Cannot {to} '{project}' while it is {from}")]
    InvalidTransition {
        project: String,
        from: String,
        to: String,
    },

    /// Required tool missing from PATH
    #[error("Tool '{tool}' not found in PATH")]
    ToolNotFound { tool: String },

    /// Build directory handling failed
    #[error(transparent)]
    Filesystem(#[from] FilesystemError),
}

/// Packaging errors
#[derive(Error, Debug)]
pub enum PackageError {
    /// Two units produce the same destination file with different content
    #[error("'{}' from '{unit}' conflicts with a file already in the package", path.display())]
    Conflict { unit: String, path: PathBuf },

    /// Filesystem failure while copying
    #[error(transparent)]
    Filesystem(#[from] FilesystemError),

    /// Manifest serialization failed
    #[error("Failed to serialize package manifest: {0}")]
    Serialize(String),
}

/// Runtime library preloading errors
#[derive(Error, Debug)]
pub enum PreloadError {
    /// The load-order manifest could not be read
    #[error("Failed to read load-order manifest '{}'", path.display())]
    Manifest {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A listed library could not be loaded
    #[error("Failed to load '{}'", path.display())]
    Load {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Top-level eslbuild error type
#[derive(Error, Debug)]
pub enum EslbuildError {
    /// Recipe error
    #[error("Recipe error: {0}")]
    Recipe(#[from] RecipeError),

    /// Option error
    #[error("Option error: {0}")]
    Option(#[from] OptionError),

    /// Resolver error
    #[error("Resolver error: {0}")]
    Resolver(#[from] ResolverError),

    /// Acquisition error
    #[error("Acquisition error: {0}")]
    Acquire(#[from] AcquireError),

    /// Toolchain error
    #[error("Toolchain error: {0}")]
    Toolchain(#[from] ToolchainError),

    /// Build error
    #[error("Build error: {0}")]
    Build(#[from] BuildError),

    /// Package error
    #[error("Package error: {0}")]
    Package(#[from] PackageError),

    /// Version descriptor error
    #[error("Version error: {0}")]
    Version(#[from] VersionError),

    /// Preload error
    #[error("Preload error: {0}")]
    Preload(#[from] PreloadError),

    /// Filesystem error
    #[error("Filesystem error: {0}")]
    Filesystem(#[from] FilesystemError),
}
