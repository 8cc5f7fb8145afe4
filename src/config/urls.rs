//! Origins of optional third-party sources

/// QuickFIX source archive (master branch)
pub const QUICKFIX_ARCHIVE: &str = "https://github.com/quickfix/quickfix/archive/master.zip";

/// Open Source Risk Engine source archive (master branch)
pub const OSRE_ARCHIVE: &str =
    "https://github.com/OpenSourceRisk/Engine/archive/refs/heads/master.zip";
