//! CLI command builders for tests
//!
//! Provides pre-configured command builders with clean environments
//! to prevent log pollution and ensure consistent test execution.

use assert_cmd::Command;

/// Get a Command for the `docmind` binary with a clean environment.
///
/// This command is pre-configured with:
/// - `RUST_LOG=error` to suppress INFO/DEBUG logs in tests
/// - Clean environment to avoid interference from a developer's own settings
///
/// # Example
///
/// ```rust
/// use docmind_test_helpers::cli::docmind_command;
///
/// let output = docmind_command()
///     .arg("--help")
///     .assert()
///     .success();
/// ```
#[allow(deprecated)]
pub fn docmind_command() -> Command {
    let mut cmd = Command::cargo_bin("docmind").expect("failed to find docmind binary");
    cmd.env("RUST_LOG", "error");
    cmd.env_remove("DOCMIND_CONFIG");
    cmd.env_remove("DOCMIND_DATA_DIR");
    cmd
}

/// Get a Command for a specific binary with a clean environment.
///
/// # Arguments
///
/// * `bin_name` - Name of the binary (e.g., "docmind")
#[allow(deprecated)]
pub fn command_for(bin_name: &str) -> Command {
    let mut cmd = Command::cargo_bin(bin_name).unwrap_or_else(|_| panic!("failed to find {} binary", bin_name));
    cmd.env("RUST_LOG", "error");
    cmd.env_remove("DOCMIND_CONFIG");
    cmd.env_remove("DOCMIND_DATA_DIR");
    cmd
}
