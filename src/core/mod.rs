//! Core build logic
//!
//! Everything that decides what to build and how. Side effects go through
//! [`crate::infra`].
//!
//! # Submodules
//!
//! - [`recipe`] - Recipe (eslbuild.toml) parsing and validation
//! - [`options`] - Option model and configuration resolution
//! - [`features`] - Feature catalog: what each toggle gates
//! - [`resolver`] - Dependency resolution and project ordering
//! - [`acquire`] - Staging of optional third-party sources
//! - [`toolchain`] - Toolchain descriptions per project
//! - [`builder`] - Nested configure/build/test/install driver
//! - [`packager`] - Package layout assembly
//! - [`exporter`] - Consumer metadata
//! - [`version`] - Version descriptor parsing
//! - [`preload`] - Runtime library load order
//! - [`session`] - One build session, stage by stage

pub mod acquire;
pub mod builder;
pub mod exporter;
pub mod features;
pub mod options;
pub mod packager;
pub mod preload;
pub mod recipe;
pub mod resolver;
pub mod session;
pub mod toolchain;
pub mod version;
