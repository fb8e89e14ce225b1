//! Version handling for knitvault
//!
//! Cargo versions below 1.0 are reported by the CLI with a `-dev` suffix so
//! that bug reports make it obvious a pre-release build was used.

/// Suffix appended to pre-1.0 versions
const DEV_SUFFIX: &str = "-dev";

/// Get the version string that should be reported by the CLI
///
/// While the crate is still at 0.x.y this returns e.g. `0.1.0-dev`.
/// Release builds (1.0.0 and later) report the plain Cargo version.
pub fn cli_version() -> String {
    let cargo_version = cargo_version();

    if cargo_version.starts_with("0.") {
        format!("{cargo_version}{DEV_SUFFIX}")
    } else {
        cargo_version.to_string()
    }
}

/// Get the Cargo package version (for internal use)
pub fn cargo_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_version() {
        let version = cli_version();
        assert!(
            version.ends_with(DEV_SUFFIX) || !version.starts_with("0."),
            "pre-1.0 versions should carry the dev suffix"
        );
        assert!(version.starts_with(cargo_version()));
    }

    #[test]
    fn test_cargo_version() {
        let version = cargo_version();
        assert!(!version.is_empty(), "Cargo version should not be empty");
    }
}
