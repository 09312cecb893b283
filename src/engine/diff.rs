//! Per-unit diff
//!
//! Compares one unit's desired state with what the host reports and returns
//! the ordered collaborator operations needed to close the gap.
//!
//! # Rules
//!
//! | Kind        | Observed                         | Plan |
//! |-------------|----------------------------------|------|
//! | Package     | absent                           | Install (created) |
//! | Package     | installed != candidate (upgrade) | Upgrade (updated) |
//! | Directory   | absent / owner, group, mode drift | EnsureDirectory |
//! | File        | absent / hash, owner, group, mode drift | WriteFile |
//! | File absent | present                          | DeleteFile (deleted) |
//! | RemoteFile  | absent                           | Fetch (created) |
//! | RemoteFile  | present, not create-if-missing   | Fetch (refresh) |
//! | Service     | enabled/running flags differ      | Enable/Disable, Start/Stop |
//! | Command     | enabled, trigger run, artifact missing, stamp stale | RunCommand, WriteFile (stamp) |
//! | Cron        | missing or different / stale      | Upsert / Delete |
//!
//! A `Refresh` plan cannot be decided by observation alone; the collaborator's
//! changed/unchanged answer decides the outcome.

use crate::cron::{CronDeclaration, CronJob};
use crate::graph::{CommandTrigger, CommandUnit, Desired, FileState, PackageAction};
use crate::host::{
    content_hash, Change, CommandSpec, Host, HostResult, PathKind, PathState, ServiceAction,
};
use crate::types::Ownership;
use std::fmt;

// ============================================================================
// Operations
// ============================================================================

/// One collaborator call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostOp {
    InstallPackage { name: String },
    UpgradePackage { name: String, from: String, to: String },
    EnsureDirectory { path: String, ownership: Ownership },
    WriteFile { path: String, content: String, ownership: Ownership },
    DeleteFile { path: String },
    FetchRemoteFile { url: String, path: String, ownership: Ownership },
    RunCommand { command: CommandSpec },
    ControlService { name: String, action: ServiceAction },
    UpsertCronJob { job: CronJob },
    DeleteCronJob { name: String },
}

impl fmt::Display for HostOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InstallPackage { name } => write!(f, "install {}", name),
            Self::UpgradePackage { name, from, to } => {
                write!(f, "upgrade {} {} -> {}", name, from, to)
            }
            Self::EnsureDirectory { path, ownership } => {
                write!(f, "ensure directory {} ({})", path, ownership)
            }
            Self::WriteFile { path, ownership, .. } => write!(f, "write {} ({})", path, ownership),
            Self::DeleteFile { path } => write!(f, "delete {}", path),
            Self::FetchRemoteFile { url, path, .. } => write!(f, "fetch {} -> {}", url, path),
            Self::RunCommand { command } => write!(f, "run `{}`", command),
            Self::ControlService { name, action } => write!(f, "{} {}", action, name),
            Self::UpsertCronJob { job } => write!(f, "schedule {} '{}'", job.name, job.schedule),
            Self::DeleteCronJob { name } => write!(f, "unschedule {}", name),
        }
    }
}

/// What applying a plan does to the unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanKind {
    Create,
    Update,
    Delete,
    /// Outcome depends on whether the collaborator reports a change
    Refresh,
}

/// Operations needed to converge one unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plan {
    pub kind: PlanKind,
    pub ops: Vec<HostOp>,
    /// Fields that drifted, for logging
    pub drift: Vec<&'static str>,
}

impl Plan {
    fn new(kind: PlanKind, op: HostOp) -> Self {
        Self {
            kind,
            ops: vec![op],
            drift: Vec::new(),
        }
    }

    fn with_drift(mut self, drift: Vec<&'static str>) -> Self {
        self.drift = drift;
        self
    }
}

// ============================================================================
// Diff
// ============================================================================

/// Observe the host and plan the operations for `desired`.
///
/// Returns `Ok(None)` when the unit is already converged. Observation
/// failures are collaborator failures of the unit.
pub fn diff_unit(desired: &Desired, host: &dyn Host) -> HostResult<Option<Plan>> {
    match desired {
        Desired::Package { name, action } => diff_package(name, *action, host),
        Desired::Directory { path, ownership } => {
            let plan = match host.observe_path(path)? {
                None => Some(Plan::new(
                    PlanKind::Create,
                    HostOp::EnsureDirectory {
                        path: path.clone(),
                        ownership: ownership.clone(),
                    },
                )),
                Some(observed) => {
                    let drift = drift(&observed, PathKind::Directory, ownership, None);
                    (!drift.is_empty()).then(|| {
                        Plan::new(
                            PlanKind::Update,
                            HostOp::EnsureDirectory {
                                path: path.clone(),
                                ownership: ownership.clone(),
                            },
                        )
                        .with_drift(drift)
                    })
                }
            };
            Ok(plan)
        }
        Desired::File { path, state } => diff_file(path, state, host),
        Desired::RemoteFile {
            path,
            url,
            ownership,
            create_if_missing,
        } => {
            let fetch = HostOp::FetchRemoteFile {
                url: url.clone(),
                path: path.clone(),
                ownership: ownership.clone(),
            };
            let plan = match host.observe_path(path)? {
                None => Some(Plan::new(PlanKind::Create, fetch)),
                Some(_) if *create_if_missing => None,
                Some(_) => Some(Plan::new(PlanKind::Refresh, fetch)),
            };
            Ok(plan)
        }
        Desired::Service {
            name,
            enabled,
            running,
        } => {
            let observed = host.observe_service(name)?;
            let mut ops = Vec::new();
            let mut drift = Vec::new();
            if observed.enabled != *enabled {
                drift.push("enabled");
                let action = if *enabled { ServiceAction::Enable } else { ServiceAction::Disable };
                ops.push(HostOp::ControlService {
                    name: name.clone(),
                    action,
                });
            }
            if observed.running != *running {
                drift.push("running");
                let action = if *running { ServiceAction::Start } else { ServiceAction::Stop };
                ops.push(HostOp::ControlService {
                    name: name.clone(),
                    action,
                });
            }
            Ok((!ops.is_empty()).then_some(Plan {
                kind: PlanKind::Update,
                ops,
                drift,
            }))
        }
        Desired::Command(command) => {
            if command.trigger == CommandTrigger::Nothing || !command_due(command, host)? {
                return Ok(None);
            }
            Ok(Some(run_plan(command)))
        }
        Desired::ScheduledJob(declaration) => diff_cron(declaration, host),
    }
}

/// True when a command's guards allow it to run: the feature is enabled, its
/// `creates` artifact does not exist yet and its stamp is missing or stale.
pub fn command_due(command: &CommandUnit, host: &dyn Host) -> HostResult<bool> {
    if !command.enabled {
        return Ok(false);
    }
    if let Some(artifact) = &command.creates {
        if host.path_exists(artifact)? {
            return Ok(false);
        }
    }
    match &command.stamp {
        Some(stamp) => {
            let current = host.observe_path(&stamp.path)?.and_then(|p| p.content_hash);
            Ok(current != Some(content_hash(&stamp.content)))
        }
        None => Ok(true),
    }
}

/// Run the command, then record its stamp.
pub fn run_plan(command: &CommandUnit) -> Plan {
    let mut plan = Plan::new(
        PlanKind::Update,
        HostOp::RunCommand {
            command: command.command.clone(),
        },
    );
    if let Some(stamp) = &command.stamp {
        plan.ops.push(HostOp::WriteFile {
            path: stamp.path.clone(),
            content: stamp.content.clone(),
            ownership: stamp.ownership.clone(),
        });
    }
    plan
}

fn diff_package(name: &str, action: PackageAction, host: &dyn Host) -> HostResult<Option<Plan>> {
    let Some(installed) = host.installed_version(name)? else {
        return Ok(Some(Plan::new(
            PlanKind::Create,
            HostOp::InstallPackage {
                name: name.to_string(),
            },
        )));
    };
    if action == PackageAction::Install {
        return Ok(None);
    }
    let plan = host
        .candidate_version(name)?
        .filter(|candidate| *candidate != installed)
        .map(|candidate| {
            Plan::new(
                PlanKind::Update,
                HostOp::UpgradePackage {
                    name: name.to_string(),
                    from: installed,
                    to: candidate,
                },
            )
            .with_drift(vec!["version"])
        });
    Ok(plan)
}

fn diff_file(path: &str, state: &FileState, host: &dyn Host) -> HostResult<Option<Plan>> {
    let observed = host.observe_path(path)?;
    let plan = match (state, observed) {
        (FileState::Absent, None) => None,
        (FileState::Absent, Some(_)) => Some(Plan::new(
            PlanKind::Delete,
            HostOp::DeleteFile {
                path: path.to_string(),
            },
        )),
        (FileState::Present { content, ownership }, observed) => {
            let write = HostOp::WriteFile {
                path: path.to_string(),
                content: content.clone(),
                ownership: ownership.clone(),
            };
            match observed {
                None => Some(Plan::new(PlanKind::Create, write)),
                Some(observed) => {
                    let hash = content_hash(content);
                    let drift = drift(&observed, PathKind::File, ownership, Some(&hash));
                    (!drift.is_empty()).then(|| Plan::new(PlanKind::Update, write).with_drift(drift))
                }
            }
        }
    };
    Ok(plan)
}

fn diff_cron(declaration: &CronDeclaration, host: &dyn Host) -> HostResult<Option<Plan>> {
    let observed = host.observe_cron_job(declaration.name())?;
    let plan = match (declaration, observed) {
        (CronDeclaration::Present(job), None) => Some(Plan::new(
            PlanKind::Create,
            HostOp::UpsertCronJob { job: job.clone() },
        )),
        (CronDeclaration::Present(job), Some(existing)) if existing != *job => Some(
            Plan::new(PlanKind::Update, HostOp::UpsertCronJob { job: job.clone() })
                .with_drift(vec!["schedule"]),
        ),
        (CronDeclaration::Present(_), Some(_)) => None,
        (CronDeclaration::Absent { name }, Some(_)) => Some(Plan::new(
            PlanKind::Delete,
            HostOp::DeleteCronJob { name: name.clone() },
        )),
        (CronDeclaration::Absent { .. }, None) => None,
    };
    Ok(plan)
}

/// Fields of an existing path that differ from the desired state.
fn drift(
    observed: &PathState,
    kind: PathKind,
    ownership: &Ownership,
    hash: Option<&str>,
) -> Vec<&'static str> {
    let mut fields = Vec::new();
    if observed.kind != kind {
        fields.push("kind");
    }
    if observed.ownership.owner != ownership.owner {
        fields.push("owner");
    }
    if observed.ownership.group != ownership.group {
        fields.push("group");
    }
    if observed.ownership.mode != ownership.mode {
        fields.push("mode");
    }
    if hash.is_some() && observed.content_hash.as_deref() != hash {
        fields.push("content");
    }
    fields
}

// ============================================================================
// Apply
// ============================================================================

/// Execute one operation. Calls that cannot report "unchanged" count as a
/// change once they succeed.
pub fn apply_op(op: &HostOp, host: &mut dyn Host) -> HostResult<Change> {
    match op {
        HostOp::InstallPackage { name } => host.install_package(name).map(|_| Change::Changed),
        HostOp::UpgradePackage { name, .. } => host.upgrade_package(name).map(|_| Change::Changed),
        HostOp::EnsureDirectory { path, ownership } => host.ensure_directory(path, ownership),
        HostOp::WriteFile {
            path,
            content,
            ownership,
        } => host.write_file(path, content, ownership),
        HostOp::DeleteFile { path } => host.delete_file(path),
        HostOp::FetchRemoteFile {
            url,
            path,
            ownership,
        } => host.fetch_remote_file(url, path, ownership),
        HostOp::RunCommand { command } => host.run_command(command).map(|_| Change::Changed),
        HostOp::ControlService { name, action } => {
            host.control_service(name, *action).map(|_| Change::Changed)
        }
        HostOp::UpsertCronJob { job } => host.upsert_cron_job(job),
        HostOp::DeleteCronJob { name } => host.delete_cron_job(name),
    }
}

/// Execute every operation of a plan in order, stopping at the first failure.
pub fn apply_plan(plan: &Plan, host: &mut dyn Host) -> HostResult<Change> {
    let mut changed = false;
    for op in &plan.ops {
        changed |= apply_op(op, host)?.is_changed();
    }
    Ok(Change::from_changed(changed))
}
