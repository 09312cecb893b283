//! In-memory host for tests.
//!
//! Records every mutating call in order and keeps a tiny model of the machine
//! (packages, paths, services, cron jobs, interfaces) so a second run observes
//! what the first run applied. Any operation can be made to fail by key.

use super::{
    AddressFamily, Change, CommandRunner, CommandSpec, CronTab, FileSystem, HostError, HostResult,
    InterfaceResolver, PackageManager, PathKind, PathState, RemoteFetcher, ServiceAction,
    ServiceManager, ServiceState, content_hash,
};
use crate::cron::CronJob;
use crate::types::Ownership;
use std::collections::{BTreeMap, HashMap, HashSet};

/// One recorded mutating call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostCall {
    InstallPackage(String),
    UpgradePackage(String),
    WriteFile(String),
    EnsureDirectory(String),
    DeleteFile(String),
    FetchRemoteFile { url: String, path: String },
    RunCommand(String),
    ControlService { name: String, action: ServiceAction },
    UpsertCronJob(String),
    DeleteCronJob(String),
}

#[derive(Debug, Clone)]
struct MockPath {
    kind: PathKind,
    ownership: Ownership,
    content: Option<String>,
}

/// A test double for every host collaborator.
#[derive(Debug, Default)]
pub struct MockHost {
    /// Mutating calls in the order they were made.
    pub calls: Vec<HostCall>,
    installed: HashMap<String, String>,
    candidates: HashMap<String, String>,
    paths: BTreeMap<String, MockPath>,
    services: HashMap<String, ServiceState>,
    cron: BTreeMap<String, CronJob>,
    interfaces: HashMap<String, String>,
    remote: HashMap<String, String>,
    command_effects: HashMap<String, Vec<String>>,
    failures: HashSet<String>,
}

impl MockHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pretend a package is installed at `version`.
    pub fn add_installed_package(&mut self, name: &str, version: &str) {
        self.installed.insert(name.to_string(), version.to_string());
    }

    /// Version the package backend offers for `name`.
    pub fn set_candidate(&mut self, name: &str, version: &str) {
        self.candidates.insert(name.to_string(), version.to_string());
    }

    pub fn add_file(&mut self, path: &str, content: &str, ownership: Ownership) {
        self.paths.insert(
            path.to_string(),
            MockPath {
                kind: PathKind::File,
                ownership,
                content: Some(content.to_string()),
            },
        );
    }

    pub fn add_directory(&mut self, path: &str, ownership: Ownership) {
        self.paths.insert(
            path.to_string(),
            MockPath {
                kind: PathKind::Directory,
                ownership,
                content: None,
            },
        );
    }

    pub fn set_service(&mut self, name: &str, state: ServiceState) {
        self.services.insert(name.to_string(), state);
    }

    pub fn add_cron_job(&mut self, job: CronJob) {
        self.cron.insert(job.name.clone(), job);
    }

    pub fn add_interface(&mut self, name: &str, address: &str) {
        self.interfaces.insert(name.to_string(), address.to_string());
    }

    /// Content served for `url` by the remote fetcher.
    pub fn serve_url(&mut self, url: &str, content: &str) {
        self.remote.insert(url.to_string(), content.to_string());
    }

    /// Paths a command creates when it runs (e.g. key material from a setup step).
    pub fn set_command_effect(&mut self, command: &str, creates: &[&str]) {
        self.command_effects.insert(
            command.to_string(),
            creates.iter().map(|s| s.to_string()).collect(),
        );
    }

    /// Make the operation identified by `key` fail.
    ///
    /// Keys: `install:<pkg>`, `upgrade:<pkg>`, `write:<path>`, `mkdir:<path>`,
    /// `delete:<path>`, `fetch:<path>`, `run:<command line>`,
    /// `service:<name>:<action>`, `cron:<name>`.
    pub fn fail_on(&mut self, key: &str) {
        self.failures.insert(key.to_string());
    }

    /// Let a previously failing call succeed again.
    pub fn clear_failure(&mut self, key: &str) {
        self.failures.remove(key);
    }

    pub fn clear_calls(&mut self) {
        self.calls.clear();
    }

    /// Content of a file in the model.
    pub fn file_content(&self, path: &str) -> Option<&str> {
        self.paths.get(path).and_then(|p| p.content.as_deref())
    }

    pub fn has_path(&self, path: &str) -> bool {
        self.paths.contains_key(path)
    }

    pub fn cron_job(&self, name: &str) -> Option<&CronJob> {
        self.cron.get(name)
    }

    pub fn service_state(&self, name: &str) -> ServiceState {
        self.services.get(name).copied().unwrap_or_default()
    }

    /// Number of recorded calls matching `pred`.
    pub fn count_calls(&self, pred: impl Fn(&HostCall) -> bool) -> usize {
        self.calls.iter().filter(|c| pred(c)).count()
    }

    /// Number of times `name` received `action`.
    pub fn service_actions(&self, name: &str, action: ServiceAction) -> usize {
        self.count_calls(|c| {
            matches!(c, HostCall::ControlService { name: n, action: a } if n == name && *a == action)
        })
    }

    /// Number of times a command line was run.
    pub fn command_runs(&self, command: &str) -> usize {
        self.count_calls(|c| matches!(c, HostCall::RunCommand(cmd) if cmd == command))
    }

    fn check(&self, key: String) -> HostResult<()> {
        if self.failures.contains(&key) {
            return Err(HostError::new(key, "injected failure"));
        }
        Ok(())
    }
}

impl PackageManager for MockHost {
    fn installed_version(&self, name: &str) -> HostResult<Option<String>> {
        Ok(self.installed.get(name).cloned())
    }

    fn candidate_version(&self, name: &str) -> HostResult<Option<String>> {
        Ok(self.candidates.get(name).cloned())
    }

    fn install_package(&mut self, name: &str) -> HostResult<()> {
        self.calls.push(HostCall::InstallPackage(name.to_string()));
        self.check(format!("install:{}", name))?;
        let version = self.candidates.get(name).cloned().unwrap_or_else(|| "1.0".to_string());
        self.installed.insert(name.to_string(), version);
        Ok(())
    }

    fn upgrade_package(&mut self, name: &str) -> HostResult<()> {
        self.calls.push(HostCall::UpgradePackage(name.to_string()));
        self.check(format!("upgrade:{}", name))?;
        let version = self.candidates.get(name).cloned().unwrap_or_else(|| "1.0".to_string());
        self.installed.insert(name.to_string(), version);
        Ok(())
    }
}

impl FileSystem for MockHost {
    fn observe_path(&self, path: &str) -> HostResult<Option<PathState>> {
        Ok(self.paths.get(path).map(|p| PathState {
            kind: p.kind,
            ownership: p.ownership.clone(),
            content_hash: p.content.as_deref().map(content_hash),
        }))
    }

    fn write_file(&mut self, path: &str, content: &str, ownership: &Ownership) -> HostResult<Change> {
        self.calls.push(HostCall::WriteFile(path.to_string()));
        self.check(format!("write:{}", path))?;
        let unchanged = matches!(
            self.paths.get(path),
            Some(p) if p.content.as_deref() == Some(content) && &p.ownership == ownership
        );
        self.add_file(path, content, ownership.clone());
        Ok(Change::from_changed(!unchanged))
    }

    fn ensure_directory(&mut self, path: &str, ownership: &Ownership) -> HostResult<Change> {
        self.calls.push(HostCall::EnsureDirectory(path.to_string()));
        self.check(format!("mkdir:{}", path))?;
        let unchanged = matches!(
            self.paths.get(path),
            Some(p) if p.kind == PathKind::Directory && &p.ownership == ownership
        );
        self.add_directory(path, ownership.clone());
        Ok(Change::from_changed(!unchanged))
    }

    fn delete_file(&mut self, path: &str) -> HostResult<Change> {
        self.calls.push(HostCall::DeleteFile(path.to_string()));
        self.check(format!("delete:{}", path))?;
        Ok(Change::from_changed(self.paths.remove(path).is_some()))
    }
}

impl RemoteFetcher for MockHost {
    fn fetch_remote_file(&mut self, url: &str, path: &str, ownership: &Ownership) -> HostResult<Change> {
        self.calls.push(HostCall::FetchRemoteFile {
            url: url.to_string(),
            path: path.to_string(),
        });
        self.check(format!("fetch:{}", path))?;
        let content = self
            .remote
            .get(url)
            .cloned()
            .ok_or_else(|| HostError::new(format!("fetch {}", url), "404 Not Found"))?;
        let unchanged = matches!(
            self.paths.get(path),
            Some(p) if p.content.as_deref() == Some(content.as_str()) && &p.ownership == ownership
        );
        self.add_file(path, &content, ownership.clone());
        Ok(Change::from_changed(!unchanged))
    }
}

impl CommandRunner for MockHost {
    fn run_command(&mut self, command: &CommandSpec) -> HostResult<()> {
        let line = command.to_string();
        self.calls.push(HostCall::RunCommand(line.clone()));
        self.check(format!("run:{}", line))?;
        if let Some(created) = self.command_effects.get(&line).cloned() {
            let ownership = Ownership::new(
                command.user.clone().unwrap_or_else(|| "root".to_string()),
                command.group.clone().unwrap_or_else(|| "root".to_string()),
                0o640,
            );
            for path in created {
                self.add_file(&path, "", ownership.clone());
            }
        }
        Ok(())
    }
}

impl ServiceManager for MockHost {
    fn observe_service(&self, name: &str) -> HostResult<ServiceState> {
        Ok(self.service_state(name))
    }

    fn control_service(&mut self, name: &str, action: ServiceAction) -> HostResult<()> {
        self.calls.push(HostCall::ControlService {
            name: name.to_string(),
            action,
        });
        self.check(format!("service:{}:{}", name, action))?;
        let state = self.services.entry(name.to_string()).or_default();
        match action {
            ServiceAction::Enable => state.enabled = true,
            ServiceAction::Disable => state.enabled = false,
            ServiceAction::Stop => state.running = false,
            ServiceAction::Start | ServiceAction::Restart | ServiceAction::Reload => state.running = true,
        }
        Ok(())
    }
}

impl CronTab for MockHost {
    fn observe_cron_job(&self, name: &str) -> HostResult<Option<CronJob>> {
        Ok(self.cron.get(name).cloned())
    }

    fn upsert_cron_job(&mut self, job: &CronJob) -> HostResult<Change> {
        self.calls.push(HostCall::UpsertCronJob(job.name.clone()));
        self.check(format!("cron:{}", job.name))?;
        let previous = self.cron.insert(job.name.clone(), job.clone());
        Ok(Change::from_changed(previous.as_ref() != Some(job)))
    }

    fn delete_cron_job(&mut self, name: &str) -> HostResult<Change> {
        self.calls.push(HostCall::DeleteCronJob(name.to_string()));
        self.check(format!("cron:{}", name))?;
        Ok(Change::from_changed(self.cron.remove(name).is_some()))
    }
}

impl InterfaceResolver for MockHost {
    fn resolve_interface_address(&self, interface: &str, _family: AddressFamily) -> HostResult<String> {
        self.interfaces
            .get(interface)
            .cloned()
            .ok_or_else(|| HostError::new(format!("resolve {}", interface), "no such interface"))
    }
}
