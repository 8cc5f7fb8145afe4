//! Configuration constants
//!
//! - [`defaults`] - Default values for recipes and build sessions
//! - [`urls`] - Fixed origins of optional third-party sources

pub mod defaults;
pub mod urls;
