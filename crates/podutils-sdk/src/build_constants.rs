/// Build constants for the pod utilities.
/// Values come from compile-time environment variables with defaults.

/// Source control information.
pub struct Source;

impl Source {
    /// The commit hash from which this binary was built.
    /// Set via the `PODUTILS_COMMIT_HASH` env var at compile time, or "N/A".
    pub const COMMIT_HASH: &'static str = match option_env!("PODUTILS_COMMIT_HASH") {
        Some(h) => h,
        None => "N/A",
    };
}

/// Package metadata shared by every pod utility binary.
#[derive(Debug, Clone)]
pub struct PodUtilsPackage;

impl PodUtilsPackage {
    /// The semantic version, pulled from `CARGO_PKG_VERSION`.
    pub const VERSION: &'static str = env!("CARGO_PKG_VERSION");

    /// The distribution name used in user agents and verdict metadata.
    pub const PACKAGE_NAME: &'static str = match option_env!("PODUTILS_PACKAGE_NAME") {
        Some(n) => n,
        None => "podutils",
    };

    /// `<name>/<version>` for HTTP user agents.
    pub fn user_agent() -> String {
        format!("{}/{}", Self::PACKAGE_NAME, Self::VERSION)
    }
}
