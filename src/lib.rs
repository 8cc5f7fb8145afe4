//! eslbuild - build orchestrator and packager for the Economic Simulation
//! Library
//!
//! Resolves a declarative recipe of build options into a build plan, stages
//! optional third-party sources, drives the nested CMake builds in
//! dependency order and assembles a platform-specific package with consumer
//! metadata.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - [`cli`] - Command-line interface parsing and output formatting
//! - [`core`] - Build logic: options, resolution, builds, packaging
//! - [`infra`] - Infrastructure layer (network, archives, filesystem, processes)
//! - [`config`] - Configuration and constants
//! - [`error`] - Error types and handling

pub mod cli;
pub mod config;
pub mod core;
pub mod error;
pub mod infra;

#[cfg(test)]
pub mod test_utils;
