//! Host collaborators
//!
//! The convergence engine never touches the operating system directly. Every
//! side effect goes through one of the narrow traits below, which are
//! implemented by [`system::LocalHost`] for a real machine and by
//! [`mock::MockHost`] for tests.
//!
//! Observation methods take `&self`; mutating methods take `&mut self` and
//! report whether they changed anything.

pub mod mock;
pub mod system;

use crate::cron::CronJob;
use crate::types::Ownership;
use std::fmt;
use strum::{Display, EnumString};
use thiserror::Error;

/// Failure reported by a host collaborator.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{operation} failed: {message}")]
pub struct HostError {
    pub operation: String,
    pub message: String,
}

impl HostError {
    pub fn new(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            message: message.into(),
        }
    }
}

pub type HostResult<T> = std::result::Result<T, HostError>;

/// Whether a mutating collaborator call changed the system.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Change {
    Changed,
    Unchanged,
}

impl Change {
    pub fn is_changed(self) -> bool {
        matches!(self, Self::Changed)
    }

    pub fn from_changed(changed: bool) -> Self {
        if changed { Self::Changed } else { Self::Unchanged }
    }
}

/// Kind of object found at a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathKind {
    File,
    Directory,
}

/// What the file system reports for an existing path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathState {
    pub kind: PathKind,
    pub ownership: Ownership,
    /// blake3 hex digest of the file content; `None` for directories
    pub content_hash: Option<String>,
}

/// Observed state of a system service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ServiceState {
    pub enabled: bool,
    pub running: bool,
}

/// Actions the process supervisor understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum ServiceAction {
    Enable,
    Disable,
    Start,
    Stop,
    Restart,
    Reload,
}

/// Address family used when resolving an interface address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum AddressFamily {
    #[default]
    Inet,
    Inet6,
}

/// A command line plus the identity it runs as.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CommandSpec {
    pub argv: Vec<String>,
    pub user: Option<String>,
    pub group: Option<String>,
}

impl CommandSpec {
    pub fn new<I, S>(argv: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            argv: argv.into_iter().map(Into::into).collect(),
            user: None,
            group: None,
        }
    }

    pub fn run_as(mut self, user: impl Into<String>, group: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self.group = Some(group.into());
        self
    }

    pub fn program(&self) -> &str {
        self.argv.first().map(String::as_str).unwrap_or_default()
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.argv.join(" "))
    }
}

/// Hex digest used for content comparison.
pub fn content_hash(content: &str) -> String {
    blake3::hash(content.as_bytes()).to_hex().to_string()
}

// ============================================================================
// Collaborator traits
// ============================================================================

pub trait PackageManager {
    /// Installed version, or `None` when the package is absent.
    fn installed_version(&self, name: &str) -> HostResult<Option<String>>;
    /// Version the package backend would install, or `None` if unknown.
    fn candidate_version(&self, name: &str) -> HostResult<Option<String>>;
    fn install_package(&mut self, name: &str) -> HostResult<()>;
    fn upgrade_package(&mut self, name: &str) -> HostResult<()>;
}

pub trait FileSystem {
    fn observe_path(&self, path: &str) -> HostResult<Option<PathState>>;
    fn write_file(&mut self, path: &str, content: &str, ownership: &Ownership) -> HostResult<Change>;
    fn ensure_directory(&mut self, path: &str, ownership: &Ownership) -> HostResult<Change>;
    fn delete_file(&mut self, path: &str) -> HostResult<Change>;

    fn path_exists(&self, path: &str) -> HostResult<bool> {
        Ok(self.observe_path(path)?.is_some())
    }
}

pub trait RemoteFetcher {
    /// Download `url` to `path` with the given ownership.
    fn fetch_remote_file(&mut self, url: &str, path: &str, ownership: &Ownership) -> HostResult<Change>;
}

pub trait CommandRunner {
    fn run_command(&mut self, command: &CommandSpec) -> HostResult<()>;
}

pub trait ServiceManager {
    fn observe_service(&self, name: &str) -> HostResult<ServiceState>;
    fn control_service(&mut self, name: &str, action: ServiceAction) -> HostResult<()>;
}

pub trait CronTab {
    fn observe_cron_job(&self, name: &str) -> HostResult<Option<CronJob>>;
    fn upsert_cron_job(&mut self, job: &CronJob) -> HostResult<Change>;
    fn delete_cron_job(&mut self, name: &str) -> HostResult<Change>;
}

pub trait InterfaceResolver {
    fn resolve_interface_address(&self, interface: &str, family: AddressFamily) -> HostResult<String>;
}

/// Everything the engine needs from one host.
pub trait Host:
    PackageManager + FileSystem + RemoteFetcher + CommandRunner + ServiceManager + CronTab + InterfaceResolver
{
}

impl<T> Host for T where
    T: PackageManager
        + FileSystem
        + RemoteFetcher
        + CommandRunner
        + ServiceManager
        + CronTab
        + InterfaceResolver
{
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_error_display() {
        let err = HostError::new("install keystone", "dpkg lock held");
        assert_eq!(err.to_string(), "install keystone failed: dpkg lock held");
    }

    #[test]
    fn test_command_spec() {
        let cmd = CommandSpec::new(["keystone-manage", "db_sync"]).run_as("keystone", "keystone");
        assert_eq!(cmd.program(), "keystone-manage");
        assert_eq!(cmd.to_string(), "keystone-manage db_sync");
        assert_eq!(cmd.user.as_deref(), Some("keystone"));
    }

    #[test]
    fn test_content_hash_is_stable() {
        assert_eq!(content_hash("a"), content_hash("a"));
        assert_ne!(content_hash("a"), content_hash("b"));
    }

    #[test]
    fn test_service_action_parse() {
        assert_eq!("restart".parse::<ServiceAction>().unwrap(), ServiceAction::Restart);
        assert_eq!(ServiceAction::Reload.to_string(), "reload");
    }
}
