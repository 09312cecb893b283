//! Collaborators for the local machine.
//!
//! Packages go through dpkg/apt, services through systemctl, scheduled jobs
//! through `/etc/cron.d`, remote files through curl. File system work is done
//! in-process. Every path can be re-rooted under a directory, which the tests
//! use to exercise the file system side without privileges.

use super::{
    AddressFamily, Change, CommandRunner, CommandSpec, CronTab, FileSystem, HostError, HostResult,
    InterfaceResolver, PackageManager, PathKind, PathState, RemoteFetcher, ServiceAction,
    ServiceManager, ServiceState,
};
use crate::cron::CronJob;
use crate::types::Ownership;
use nix::unistd::{Gid, Group, Uid, User};
use std::fs;
use std::os::unix::fs::{MetadataExt, PermissionsExt};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tracing::{debug, info, warn};

/// Directory holding one file per managed scheduled job.
pub const CRON_DIR: &str = "/etc/cron.d";

/// The machine this process runs on.
#[derive(Debug, Clone, Default)]
pub struct LocalHost {
    root: Option<PathBuf>,
}

impl LocalHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve every managed path below `root` instead of `/`.
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: Some(root.into()),
        }
    }

    fn resolve(&self, path: &str) -> PathBuf {
        match &self.root {
            Some(root) => root.join(path.trim_start_matches('/')),
            None => PathBuf::from(path),
        }
    }

    fn cron_path(&self, name: &str) -> PathBuf {
        self.resolve(&format!("{}/{}", CRON_DIR, name))
    }
}

// ============================================================================
// Process helpers
// ============================================================================

/// Run a program and return its stdout, failing on a non-zero exit.
fn capture(program: &str, args: &[&str]) -> HostResult<String> {
    debug!(program, ?args, "Running");
    let output = Command::new(program)
        .args(args)
        .env("DEBIAN_FRONTEND", "noninteractive")
        .stdin(Stdio::null())
        .output()
        .map_err(|e| HostError::new(program, e.to_string()))?;
    if output.status.success() {
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    } else {
        Err(HostError::new(
            format!("{} {}", program, args.join(" ")),
            format!(
                "exit code {}: {}",
                output.status.code().unwrap_or(-1),
                String::from_utf8_lossy(&output.stderr).trim()
            ),
        ))
    }
}

/// Run a program and report only whether it exited successfully.
fn succeeds(program: &str, args: &[&str]) -> HostResult<bool> {
    Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|status| status.success())
        .map_err(|e| HostError::new(program, e.to_string()))
}

fn io_error(operation: &str, path: &Path, err: std::io::Error) -> HostError {
    HostError::new(format!("{} {}", operation, path.display()), err.to_string())
}

// ============================================================================
// Ownership
// ============================================================================

fn lookup_ids(ownership: &Ownership) -> HostResult<(Uid, Gid)> {
    let operation = || format!("resolve {}:{}", ownership.owner, ownership.group);
    let user = User::from_name(&ownership.owner)
        .map_err(|e| HostError::new(operation(), e.to_string()))?
        .ok_or_else(|| HostError::new(operation(), format!("no user {}", ownership.owner)))?;
    let group = Group::from_name(&ownership.group)
        .map_err(|e| HostError::new(operation(), e.to_string()))?
        .ok_or_else(|| HostError::new(operation(), format!("no group {}", ownership.group)))?;
    Ok((user.uid, group.gid))
}

fn observed_ownership(meta: &fs::Metadata) -> Ownership {
    let owner = User::from_uid(Uid::from_raw(meta.uid()))
        .ok()
        .flatten()
        .map(|u| u.name)
        .unwrap_or_else(|| meta.uid().to_string());
    let group = Group::from_gid(Gid::from_raw(meta.gid()))
        .ok()
        .flatten()
        .map(|g| g.name)
        .unwrap_or_else(|| meta.gid().to_string());
    Ownership::new(owner, group, meta.mode() & 0o7777)
}

/// Apply owner, group and mode; true when anything differed.
fn apply_ownership(path: &Path, ownership: &Ownership) -> HostResult<bool> {
    let meta = fs::metadata(path).map_err(|e| io_error("stat", path, e))?;
    if observed_ownership(&meta) == *ownership {
        return Ok(false);
    }
    let (uid, gid) = lookup_ids(ownership)?;
    if meta.uid() != uid.as_raw() || meta.gid() != gid.as_raw() {
        nix::unistd::chown(path, Some(uid), Some(gid))
            .map_err(|e| HostError::new(format!("chown {}", path.display()), e.to_string()))?;
    }
    fs::set_permissions(path, fs::Permissions::from_mode(ownership.mode))
        .map_err(|e| io_error("chmod", path, e))?;
    Ok(true)
}

/// Replace `path` with `content` through a sibling temporary file.
fn replace_file(path: &Path, content: &[u8], ownership: &Ownership) -> HostResult<()> {
    let tmp = path.with_extension("converge-tmp");
    fs::write(&tmp, content).map_err(|e| io_error("write", &tmp, e))?;
    if let Err(e) = apply_ownership(&tmp, ownership) {
        discard(&tmp);
        return Err(e);
    }
    fs::rename(&tmp, path).map_err(|e| io_error("rename", path, e))
}

/// Remove a scratch file, logging rather than failing.
fn discard(path: &Path) {
    if let Err(e) = fs::remove_file(path) {
        warn!(path = %path.display(), error = %e, "Could not remove temporary file");
    }
}

// ============================================================================
// Collaborators
// ============================================================================

impl PackageManager for LocalHost {
    fn installed_version(&self, name: &str) -> HostResult<Option<String>> {
        let Ok(out) = capture("dpkg-query", &["-W", "-f=${Status} ${Version}", name]) else {
            return Ok(None);
        };
        Ok(parse_dpkg_status(&out))
    }

    fn candidate_version(&self, name: &str) -> HostResult<Option<String>> {
        let out = capture("apt-cache", &["policy", name])?;
        Ok(parse_apt_candidate(&out))
    }

    fn install_package(&mut self, name: &str) -> HostResult<()> {
        info!(package = name, "Installing package");
        capture("apt-get", &["install", "-y", "-q", name]).map(|_| ())
    }

    fn upgrade_package(&mut self, name: &str) -> HostResult<()> {
        info!(package = name, "Upgrading package");
        capture("apt-get", &["install", "-y", "-q", "--only-upgrade", name]).map(|_| ())
    }
}

/// Version from `dpkg-query -f '${Status} ${Version}'`, if fully installed.
fn parse_dpkg_status(out: &str) -> Option<String> {
    let rest = out.trim().strip_prefix("install ok installed")?;
    let version = rest.trim();
    (!version.is_empty()).then(|| version.to_string())
}

/// `Candidate:` line of `apt-cache policy`.
fn parse_apt_candidate(out: &str) -> Option<String> {
    out.lines()
        .find_map(|line| line.trim().strip_prefix("Candidate:"))
        .map(str::trim)
        .filter(|v| !v.is_empty() && *v != "(none)")
        .map(str::to_string)
}

impl FileSystem for LocalHost {
    fn observe_path(&self, path: &str) -> HostResult<Option<PathState>> {
        let real = self.resolve(path);
        let meta = match fs::metadata(&real) {
            Ok(meta) => meta,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(io_error("stat", &real, e)),
        };
        let (kind, content_hash) = if meta.is_dir() {
            (PathKind::Directory, None)
        } else {
            let bytes = fs::read(&real).map_err(|e| io_error("read", &real, e))?;
            (PathKind::File, Some(blake3::hash(&bytes).to_hex().to_string()))
        };
        Ok(Some(PathState {
            kind,
            ownership: observed_ownership(&meta),
            content_hash,
        }))
    }

    fn write_file(&mut self, path: &str, content: &str, ownership: &Ownership) -> HostResult<Change> {
        let real = self.resolve(path);
        if fs::read(&real).is_ok_and(|existing| existing == content.as_bytes()) {
            return apply_ownership(&real, ownership).map(Change::from_changed);
        }
        info!(path, "Writing file");
        replace_file(&real, content.as_bytes(), ownership)?;
        Ok(Change::Changed)
    }

    fn ensure_directory(&mut self, path: &str, ownership: &Ownership) -> HostResult<Change> {
        let real = self.resolve(path);
        let created = !real.is_dir();
        if created {
            info!(path, "Creating directory");
            fs::create_dir_all(&real).map_err(|e| io_error("mkdir", &real, e))?;
        }
        let fixed = apply_ownership(&real, ownership)?;
        Ok(Change::from_changed(created || fixed))
    }

    fn delete_file(&mut self, path: &str) -> HostResult<Change> {
        let real = self.resolve(path);
        match fs::remove_file(&real) {
            Ok(()) => {
                info!(path, "Deleted file");
                Ok(Change::Changed)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Change::Unchanged),
            Err(e) => Err(io_error("delete", &real, e)),
        }
    }
}

impl RemoteFetcher for LocalHost {
    fn fetch_remote_file(&mut self, url: &str, path: &str, ownership: &Ownership) -> HostResult<Change> {
        let real = self.resolve(path);
        let download = real.with_extension("download");
        let target = download.to_string_lossy().to_string();
        capture("curl", &["-fsSL", "-o", &target, url])?;
        let fetched = fs::read(&download).map_err(|e| io_error("read", &download, e));
        discard(&download);
        let fetched = fetched?;
        self.write_bytes(&real, &fetched, ownership)
    }
}

impl LocalHost {
    fn write_bytes(&self, real: &Path, content: &[u8], ownership: &Ownership) -> HostResult<Change> {
        if fs::read(real).is_ok_and(|existing| existing == content) {
            return apply_ownership(real, ownership).map(Change::from_changed);
        }
        replace_file(real, content, ownership)?;
        Ok(Change::Changed)
    }
}

impl CommandRunner for LocalHost {
    fn run_command(&mut self, command: &CommandSpec) -> HostResult<()> {
        let argv = command_line(command);
        info!(command = %command, user = ?command.user, "Running command");
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| HostError::new("run", "empty command"))?;
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        capture(program, &args).map(|_| ())
    }
}

/// Full argv, switching identity through `runuser` when a user is set.
fn command_line(command: &CommandSpec) -> Vec<String> {
    let mut argv = Vec::new();
    if let Some(user) = &command.user {
        argv.extend(["runuser".to_string(), "-u".to_string(), user.clone()]);
        if let Some(group) = &command.group {
            argv.extend(["-g".to_string(), group.clone()]);
        }
        argv.push("--".to_string());
    }
    argv.extend(command.argv.iter().cloned());
    argv
}

impl ServiceManager for LocalHost {
    fn observe_service(&self, name: &str) -> HostResult<ServiceState> {
        Ok(ServiceState {
            enabled: succeeds("systemctl", &["is-enabled", "--quiet", name])?,
            running: succeeds("systemctl", &["is-active", "--quiet", name])?,
        })
    }

    fn control_service(&mut self, name: &str, action: ServiceAction) -> HostResult<()> {
        info!(service = name, %action, "Controlling service");
        capture("systemctl", &[&action.to_string(), name]).map(|_| ())
    }
}

impl CronTab for LocalHost {
    fn observe_cron_job(&self, name: &str) -> HostResult<Option<CronJob>> {
        let path = self.cron_path(name);
        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(io_error("read", &path, e)),
        };
        Ok(text
            .lines()
            .map(str::trim)
            .find(|l| !l.is_empty() && !l.starts_with('#'))
            .and_then(|line| CronJob::from_line(name, line)))
    }

    fn upsert_cron_job(&mut self, job: &CronJob) -> HostResult<Change> {
        let path = self.cron_path(&job.name);
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).map_err(|e| io_error("mkdir", dir, e))?;
        }
        let content = format!("# Managed by identity-converge\n{}\n", job.to_line());
        if fs::read_to_string(&path).is_ok_and(|existing| existing == content) {
            return Ok(Change::Unchanged);
        }
        info!(job = %job.name, schedule = %job.schedule, "Scheduling job");
        fs::write(&path, content).map_err(|e| io_error("write", &path, e))?;
        fs::set_permissions(&path, fs::Permissions::from_mode(0o644))
            .map_err(|e| io_error("chmod", &path, e))?;
        Ok(Change::Changed)
    }

    fn delete_cron_job(&mut self, name: &str) -> HostResult<Change> {
        let path = self.cron_path(name);
        match fs::remove_file(&path) {
            Ok(()) => {
                info!(job = name, "Removed scheduled job");
                Ok(Change::Changed)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Change::Unchanged),
            Err(e) => Err(io_error("delete", &path, e)),
        }
    }
}

impl InterfaceResolver for LocalHost {
    fn resolve_interface_address(&self, interface: &str, family: AddressFamily) -> HostResult<String> {
        let flag = match family {
            AddressFamily::Inet => "-4",
            AddressFamily::Inet6 => "-6",
        };
        let out = capture("ip", &["-o", flag, "addr", "show", "dev", interface])?;
        parse_interface_address(&out, family).ok_or_else(|| {
            HostError::new(
                format!("resolve {}", interface),
                format!("no {} address", family),
            )
        })
    }
}

/// First address of `ip -o addr show` output, without the prefix length.
fn parse_interface_address(out: &str, family: AddressFamily) -> Option<String> {
    let keyword = family.to_string();
    out.lines().find_map(|line| {
        let mut tokens = line.split_whitespace();
        tokens.find(|t| *t == keyword)?;
        tokens.next()?.split('/').next().map(str::to_string)
    })
}
