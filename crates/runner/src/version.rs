/// Git-derived version (includes tags like 0.1.0-beta.1, 0.1.0-rc.2, etc.)
pub const GIT_VERSION: &str = env!("GIT_VERSION");

/// Short git commit hash
pub const GIT_HASH: &str = env!("GIT_HASH");

/// Build date (UTC)
pub const BUILD_DATE: &str = env!("BUILD_DATE");

/// Build target triple
pub const BUILD_TARGET: &str = env!("BUILD_TARGET");

/// Version string for --version (compile-time)
pub const VERSION: &str =
    concat!(env!("GIT_VERSION"), " (", env!("GIT_HASH"), ")");

/// One-line version info for the startup log.
pub fn startup_banner() -> String {
    format!(
        "eventshape {} (commit {}, built {} for {})",
        GIT_VERSION, GIT_HASH, BUILD_DATE, BUILD_TARGET
    )
}
