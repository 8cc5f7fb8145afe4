//! Version descriptor parsing
//!
//! The library's version lives in a plain text file of
//! `NAME = INTEGER;` assignments, for example:
//!
//! ```text
//! ESL_VERSION_MAJOR = 0;
//! ESL_VERSION_MINOR = 2;
//! ESL_VERSION_PATCH = 0;
//! ```

use regex::Regex;
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use thiserror::Error;

/// Version component identifiers, in triple order
const COMPONENTS: [&str; 3] = ["MAJOR", "MINOR", "PATCH"];

/// Errors reading a version descriptor
#[derive(Error, Debug)]
pub enum VersionError {
    /// The descriptor file could not be read
    #[error("Can not read version file '{}'", path.display())]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The descriptor content is not a complete version triple
    #[error("Malformed version descriptor: {reason}")]
    Malformed { reason: String },
}

/// A `(major, minor, patch)` version
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct VersionTriple {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
}

impl VersionTriple {
    pub const fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    pub fn as_tuple(self) -> (u64, u64, u64) {
        (self.major, self.minor, self.patch)
    }
}

impl fmt::Display for VersionTriple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

fn assignment_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^\s*([A-Za-z_][A-Za-z0-9_]*)\s*=\s*([^;]*?)\s*;\s*$")
            .unwrap_or_else(|e| unreachable!("invalid assignment regex: {e}"))
    })
}

fn malformed(reason: impl Into<String>) -> VersionError {
    VersionError::Malformed {
        reason: reason.into(),
    }
}

/// Parse descriptor text for identifiers `<prefix>_VERSION_{MAJOR,MINOR,PATCH}`.
///
/// Lines that assign other names are ignored; blank lines are skipped.
pub fn parse_version_descriptor(text: &str, prefix: &str) -> Result<VersionTriple, VersionError> {
    if text.trim().is_empty() {
        return Err(malformed("version descriptor is empty"));
    }

    let mut values: [Option<u64>; 3] = [None; 3];

    for (number, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }

        let captures = assignment_regex().captures(line).ok_or_else(|| {
            malformed(format!(
                "line {}: expected NAME = INTEGER; got '{}'",
                number + 1,
                line.trim()
            ))
        })?;

        let name = &captures[1];
        let Some(index) = COMPONENTS
            .iter()
            .position(|c| name == format!("{prefix}_VERSION_{c}"))
        else {
            continue;
        };

        let value = captures[2].parse::<u64>().map_err(|e| {
            malformed(format!(
                "line {}: {name} is not an integer ('{}'): {e}",
                number + 1,
                &captures[2]
            ))
        })?;

        if values[index].replace(value).is_some() {
            return Err(malformed(format!("{name} assigned more than once")));
        }
    }

    match values {
        [Some(major), Some(minor), Some(patch)] => Ok(VersionTriple::new(major, minor, patch)),
        _ => {
            let missing: Vec<String> = COMPONENTS
                .iter()
                .zip(values)
                .filter(|(_, v)| v.is_none())
                .map(|(c, _)| format!("{prefix}_VERSION_{c}"))
                .collect();
            Err(malformed(format!("missing {}", missing.join(", "))))
        }
    }
}

/// Read and parse a version descriptor file.
///
/// Read failures keep the underlying I/O error as their source.
pub fn read_version_descriptor(path: &Path, prefix: &str) -> Result<VersionTriple, VersionError> {
    let text = std::fs::read_to_string(path).map_err(|source| VersionError::Unreadable {
        path: path.to_path_buf(),
        source,
    })?;
    parse_version_descriptor(&text, prefix)
}
