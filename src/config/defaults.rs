//! Default configuration values

/// Recipe file name looked up in the project directory
pub const RECIPE_FILE: &str = "eslbuild.toml";

/// Default build directory (relative to the recipe)
pub const DEFAULT_BUILD_DIR: &str = "build";

/// Default staging directory for fetched sources (relative to the recipe)
pub const DEFAULT_STAGING_DIR: &str = "build/staging";

/// Default package output directory (relative to the recipe)
pub const DEFAULT_PACKAGE_DIR: &str = "package";

/// Default directory holding packaged dependencies (relative to the recipe)
pub const DEFAULT_DEPS_DIR: &str = "deps";

/// Environment variable overriding the dependency directory
pub const ENV_DEPS_DIR: &str = "ESLBUILD_DEPS_DIR";

/// Name of the generated toolchain file inside each project build directory
pub const TOOLCHAIN_FILE: &str = "eslbuild_toolchain.cmake";

/// Name of the consumer manifest written into the package
pub const MANIFEST_FILE: &str = "eslbuild-manifest.json";

/// Package description used when the recipe has none
pub const DEFAULT_DESCRIPTION: &str = "Economic Simulation Library";

/// Default cmake executable
pub const DEFAULT_CMAKE: &str = "cmake";

/// Default ctest executable
pub const DEFAULT_CTEST: &str = "ctest";

/// Timeout for a single archive download (in seconds)
pub const DOWNLOAD_TIMEOUT_SECS: u64 = 600;

/// Connect timeout for archive downloads (in seconds)
pub const CONNECT_TIMEOUT_SECS: u64 = 30;
