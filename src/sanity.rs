//! Pre-flight sanity checks for the local host
//!
//! Before converging a real machine we verify:
//! - the host tools the local collaborators shell out to are present
//! - we run with root privileges (EUID 0)
//!
//! If any check fails, the program exits with a clear error message before a
//! single unit is diffed.

use std::process::Command;
use tracing::{debug, info, warn};

/// Result of environment verification
#[derive(Debug)]
pub struct SanityCheckResult {
    pub missing_binaries: Vec<String>,
    pub is_root: bool,
}

impl SanityCheckResult {
    /// Returns true if all checks passed
    pub fn is_ok(&self) -> bool {
        self.missing_binaries.is_empty() && self.is_root
    }
}

/// Binaries used by `LocalHost`
const REQUIRED_BINARIES: &[&str] = &[
    "dpkg-query", // installed versions
    "apt-cache",  // candidate versions
    "apt-get",    // install/upgrade
    "systemctl",  // services
    "curl",       // remote files
    "ip",         // interface addresses
    "runuser",    // commands run as the service user
];

/// Check if a binary is available in PATH
fn binary_exists(name: &str) -> bool {
    Command::new("which")
        .arg(name)
        .output()
        .map(|output| output.status.success())
        .unwrap_or(false)
}

fn is_running_as_root() -> bool {
    nix::unistd::geteuid().is_root()
}

/// Perform all sanity checks and return the result
pub fn verify_environment() -> SanityCheckResult {
    let missing = REQUIRED_BINARIES
        .iter()
        .filter(|binary| !binary_exists(binary))
        .map(|binary| binary.to_string())
        .collect();

    SanityCheckResult {
        missing_binaries: missing,
        is_root: is_running_as_root(),
    }
}

/// Map binary names to the Debian packages that ship them
fn get_package_for_binary(binary: &str) -> &'static str {
    match binary {
        "dpkg-query" => "dpkg",
        "apt-cache" | "apt-get" => "apt",
        "systemctl" => "systemd",
        "curl" => "curl",
        "ip" => "iproute2",
        "runuser" => "util-linux",
        _ => "unknown",
    }
}

/// Print what failed to stderr and exit
pub fn print_error_and_exit(result: &SanityCheckResult) -> ! {
    eprintln!();
    eprintln!("identity-converge: pre-flight check failed");
    eprintln!();

    if !result.is_root {
        eprintln!("ERROR: root privileges required");
        eprintln!("   Converging installs packages, writes /etc/keystone and controls services.");
        eprintln!("   Run as root, or use --dry-run to preview.");
        eprintln!();
    }

    if !result.missing_binaries.is_empty() {
        eprintln!("ERROR: missing required binaries");
        for binary in &result.missing_binaries {
            eprintln!("   - {} (package: {})", binary, get_package_for_binary(binary));
        }
        let mut packages: Vec<&str> = result
            .missing_binaries
            .iter()
            .map(|b| get_package_for_binary(b))
            .collect();
        packages.dedup();
        eprintln!();
        eprintln!("   Install with: apt-get install {}", packages.join(" "));
        eprintln!();
    }

    std::process::exit(1);
}

/// Skip root check (for development)
/// Set IDENTITY_CONVERGE_SKIP_ROOT_CHECK=1 to skip
pub fn should_skip_root_check() -> bool {
    std::env::var("IDENTITY_CONVERGE_SKIP_ROOT_CHECK")
        .map(|v| v == "1" || v.to_lowercase() == "true")
        .unwrap_or(false)
}

/// Verify the environment and exit if a check fails
pub fn run_preflight_checks() {
    debug!("Running pre-flight sanity checks");

    let mut result = verify_environment();
    if should_skip_root_check() {
        warn!("Root check skipped (IDENTITY_CONVERGE_SKIP_ROOT_CHECK=1)");
        result.is_root = true;
    }

    if !result.is_ok() {
        print_error_and_exit(&result);
    }

    info!("Pre-flight checks passed");
}
