//! Resource graph
//!
//! The declared desired state of one run: a set of resource units plus the
//! typed edges between them. `depends_on` edges order application;
//! `notifies` edges trigger an action on another unit when the source unit
//! changed.
//!
//! Application order is a topological sort of the `depends_on` edges. Among
//! units whose predecessors are all placed, declaration order decides.

pub mod identity;

use crate::cron::CronDeclaration;
use crate::error::{ConvergeError, Result};
use crate::host::CommandSpec;
use crate::types::Ownership;
use std::collections::{HashMap, HashSet};
use std::fmt;
use strum::{Display, EnumString};

// ============================================================================
// Identity
// ============================================================================

/// Kind of resource a unit manages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum UnitKind {
    Package,
    Directory,
    File,
    RemoteFile,
    Service,
    Execute,
    Cron,
}

/// Unique unit identity, rendered as `kind[name]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UnitId(String);

impl UnitId {
    pub fn new(kind: UnitKind, name: &str) -> Self {
        Self(format!("{}[{}]", kind, name))
    }

    pub fn package(name: &str) -> Self {
        Self::new(UnitKind::Package, name)
    }

    pub fn directory(path: &str) -> Self {
        Self::new(UnitKind::Directory, path)
    }

    pub fn file(path: &str) -> Self {
        Self::new(UnitKind::File, path)
    }

    pub fn remote_file(path: &str) -> Self {
        Self::new(UnitKind::RemoteFile, path)
    }

    pub fn service(name: &str) -> Self {
        Self::new(UnitKind::Service, name)
    }

    pub fn execute(name: &str) -> Self {
        Self::new(UnitKind::Execute, name)
    }

    pub fn cron(name: &str) -> Self {
        Self::new(UnitKind::Cron, name)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Desired State
// ============================================================================

/// What "installed" means for a package unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum PackageAction {
    /// Present at any version
    Install,
    /// Present at the candidate version
    Upgrade,
}

/// Desired state of a content-producing file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileState {
    Present { content: String, ownership: Ownership },
    Absent,
}

/// When a one-shot command runs on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum CommandTrigger {
    /// Runs during its own turn when its guards allow
    Run,
    /// Runs only when notified
    Nothing,
}

/// A guarded one-shot command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandUnit {
    pub command: CommandSpec,
    pub trigger: CommandTrigger,
    /// Feature flag; a disabled command never runs
    pub enabled: bool,
    /// Artifact whose existence means the command has already done its work
    pub creates: Option<String>,
    /// Record of the last successful run
    pub stamp: Option<RunStamp>,
}

/// File written after a command succeeds. The command is due again whenever
/// the file is missing or holds different content, so a failed run is retried
/// and a changed input reruns it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunStamp {
    pub path: String,
    pub content: String,
    pub ownership: Ownership,
}

/// The desired state carried by a unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Desired {
    Package {
        name: String,
        action: PackageAction,
    },
    Directory {
        path: String,
        ownership: Ownership,
    },
    File {
        path: String,
        state: FileState,
    },
    RemoteFile {
        path: String,
        url: String,
        ownership: Ownership,
        /// Fetch only when the path does not exist yet
        create_if_missing: bool,
    },
    Service {
        name: String,
        enabled: bool,
        running: bool,
    },
    Command(CommandUnit),
    ScheduledJob(CronDeclaration),
}

impl Desired {
    pub fn kind(&self) -> UnitKind {
        match self {
            Self::Package { .. } => UnitKind::Package,
            Self::Directory { .. } => UnitKind::Directory,
            Self::File { .. } => UnitKind::File,
            Self::RemoteFile { .. } => UnitKind::RemoteFile,
            Self::Service { .. } => UnitKind::Service,
            Self::Command(_) => UnitKind::Execute,
            Self::ScheduledJob(_) => UnitKind::Cron,
        }
    }

    /// Short human description used by `plan`.
    pub fn summary(&self) -> String {
        match self {
            Self::Package { action, .. } => format!("{}", action),
            Self::Directory { ownership, .. } => format!("directory {}", ownership),
            Self::File {
                state: FileState::Present { content, ownership },
                ..
            } => format!("content {} bytes, {}", content.len(), ownership),
            Self::File {
                state: FileState::Absent,
                ..
            } => "absent".to_string(),
            Self::RemoteFile {
                url,
                create_if_missing,
                ..
            } => {
                if *create_if_missing {
                    format!("from {} (if missing)", url)
                } else {
                    format!("from {}", url)
                }
            }
            Self::Service { enabled, running, .. } => {
                format!("enabled={} running={}", enabled, running)
            }
            Self::Command(cmd) => {
                let mut text = format!("`{}` on {}", cmd.command, cmd.trigger);
                if !cmd.enabled {
                    text.push_str(", disabled");
                }
                if let Some(creates) = &cmd.creates {
                    text.push_str(&format!(", creates {}", creates));
                }
                if let Some(stamp) = &cmd.stamp {
                    text.push_str(&format!(", stamp {}", stamp.path));
                }
                text
            }
            Self::ScheduledJob(CronDeclaration::Present(job)) => {
                format!("'{}' {}", job.schedule, job.command)
            }
            Self::ScheduledJob(CronDeclaration::Absent { .. }) => "absent".to_string(),
        }
    }
}

// ============================================================================
// Edges
// ============================================================================

/// Action a notification requests from its target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum NotifyAction {
    Restart,
    Reload,
    Run,
}

impl NotifyAction {
    /// Unit kind this action can target.
    pub fn target_kind(&self) -> UnitKind {
        match self {
            Self::Restart | Self::Reload => UnitKind::Service,
            Self::Run => UnitKind::Execute,
        }
    }
}

/// When a notification fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum Timing {
    /// Before the engine moves on to the next unit
    Immediately,
    /// Once, after every unit has been processed
    Delayed,
}

/// A typed `notifies` edge.
///
/// A (target, action) pair fires at most once per run whatever the timing of
/// the edges requesting it. An immediate request wins over a delayed one.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Notification {
    pub target: UnitId,
    pub action: NotifyAction,
    pub timing: Timing,
}

// ============================================================================
// Units and Graph
// ============================================================================

/// One declared target-state item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceUnit {
    pub id: UnitId,
    pub desired: Desired,
    pub depends_on: Vec<UnitId>,
    pub notifies: Vec<Notification>,
}

impl ResourceUnit {
    /// Create a unit whose id is derived from its desired state.
    pub fn new(name: &str, desired: Desired) -> Self {
        Self {
            id: UnitId::new(desired.kind(), name),
            desired,
            depends_on: Vec::new(),
            notifies: Vec::new(),
        }
    }

    pub fn package(name: &str, action: PackageAction) -> Self {
        Self::new(
            name,
            Desired::Package {
                name: name.to_string(),
                action,
            },
        )
    }

    pub fn directory(path: &str, ownership: Ownership) -> Self {
        Self::new(
            path,
            Desired::Directory {
                path: path.to_string(),
                ownership,
            },
        )
    }

    pub fn file(path: &str, content: impl Into<String>, ownership: Ownership) -> Self {
        Self::new(
            path,
            Desired::File {
                path: path.to_string(),
                state: FileState::Present {
                    content: content.into(),
                    ownership,
                },
            },
        )
    }

    pub fn absent_file(path: &str) -> Self {
        Self::new(
            path,
            Desired::File {
                path: path.to_string(),
                state: FileState::Absent,
            },
        )
    }

    pub fn remote_file(path: &str, url: &str, ownership: Ownership, create_if_missing: bool) -> Self {
        Self::new(
            path,
            Desired::RemoteFile {
                path: path.to_string(),
                url: url.to_string(),
                ownership,
                create_if_missing,
            },
        )
    }

    pub fn service(name: &str, enabled: bool, running: bool) -> Self {
        Self::new(
            name,
            Desired::Service {
                name: name.to_string(),
                enabled,
                running,
            },
        )
    }

    pub fn command(name: &str, command: CommandUnit) -> Self {
        Self::new(name, Desired::Command(command))
    }

    pub fn cron(declaration: CronDeclaration) -> Self {
        let name = declaration.name().to_string();
        Self::new(&name, Desired::ScheduledJob(declaration))
    }

    /// Add a `depends_on` edge.
    pub fn after(mut self, predecessor: &UnitId) -> Self {
        if !self.depends_on.contains(predecessor) {
            self.depends_on.push(predecessor.clone());
        }
        self
    }

    /// Add a `notifies` edge.
    pub fn notify(mut self, target: &UnitId, action: NotifyAction, timing: Timing) -> Self {
        let edge = Notification {
            target: target.clone(),
            action,
            timing,
        };
        if !self.notifies.contains(&edge) {
            self.notifies.push(edge);
        }
        self
    }
}

/// Declared units in declaration order plus an id index.
#[derive(Debug, Clone, Default)]
pub struct ResourceGraph {
    units: Vec<ResourceUnit>,
    index: HashMap<UnitId, usize>,
}

impl ResourceGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a unit.
    ///
    /// # Errors
    ///
    /// `Graph` if a unit with the same id was already declared.
    pub fn add(&mut self, unit: ResourceUnit) -> Result<UnitId> {
        if self.index.contains_key(&unit.id) {
            return Err(ConvergeError::graph(format!("duplicate unit {}", unit.id)));
        }
        let id = unit.id.clone();
        self.index.insert(id.clone(), self.units.len());
        self.units.push(unit);
        Ok(id)
    }

    pub fn get(&self, id: &UnitId) -> Option<&ResourceUnit> {
        self.index.get(id).map(|&idx| &self.units[idx])
    }

    pub fn contains(&self, id: &UnitId) -> bool {
        self.index.contains_key(id)
    }

    /// Units in declaration order.
    pub fn units(&self) -> &[ResourceUnit] {
        &self.units
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    /// Check that every edge points at a declared unit of a compatible kind.
    pub fn validate(&self) -> Result<()> {
        for unit in &self.units {
            for dep in &unit.depends_on {
                if !self.contains(dep) {
                    return Err(ConvergeError::graph(format!(
                        "{} depends on undeclared unit {}",
                        unit.id, dep
                    )));
                }
            }
            for edge in &unit.notifies {
                let target = self.get(&edge.target).ok_or_else(|| {
                    ConvergeError::graph(format!(
                        "{} notifies undeclared unit {}",
                        unit.id, edge.target
                    ))
                })?;
                if target.desired.kind() != edge.action.target_kind() {
                    return Err(ConvergeError::graph(format!(
                        "{} cannot {} {}",
                        unit.id, edge.action, edge.target
                    )));
                }
            }
        }
        Ok(())
    }

    /// Units in application order: every predecessor before its dependents.
    ///
    /// # Errors
    ///
    /// `Graph` on an undeclared predecessor or a dependency cycle.
    pub fn order(&self) -> Result<Vec<&ResourceUnit>> {
        let mut visited = HashSet::new();
        let mut visiting = HashSet::new();
        let mut order = Vec::with_capacity(self.units.len());

        for idx in 0..self.units.len() {
            self.visit(idx, &mut visited, &mut visiting, &mut order)?;
        }

        Ok(order.into_iter().map(|idx| &self.units[idx]).collect())
    }

    /// Depth-first post-order walk over `depends_on` edges
    fn visit(
        &self,
        idx: usize,
        visited: &mut HashSet<usize>,
        visiting: &mut HashSet<usize>,
        order: &mut Vec<usize>,
    ) -> Result<()> {
        if visited.contains(&idx) {
            return Ok(());
        }
        if !visiting.insert(idx) {
            return Err(ConvergeError::graph(format!(
                "dependency cycle involving {}",
                self.units[idx].id
            )));
        }

        for dep in &self.units[idx].depends_on {
            let dep_idx = *self.index.get(dep).ok_or_else(|| {
                ConvergeError::graph(format!(
                    "{} depends on undeclared unit {}",
                    self.units[idx].id, dep
                ))
            })?;
            self.visit(dep_idx, visited, visiting, order)?;
        }

        visiting.remove(&idx);
        visited.insert(idx);
        order.push(idx);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn own() -> Ownership {
        Ownership::new("keystone", "keystone", 0o700)
    }

    fn ids(units: &[&ResourceUnit]) -> Vec<String> {
        units.iter().map(|u| u.id.to_string()).collect()
    }

    #[test]
    fn test_unit_id_format() {
        assert_eq!(UnitId::service("keystone").as_str(), "service[keystone]");
        assert_eq!(UnitId::remote_file("/a").as_str(), "remote_file[/a]");
        assert_eq!(
            ResourceUnit::directory("/etc/keystone", own()).id,
            UnitId::directory("/etc/keystone")
        );
    }

    #[test]
    fn test_order_respects_dependencies_over_declaration() {
        let mut graph = ResourceGraph::new();
        let pkg = UnitId::package("keystone");
        graph
            .add(ResourceUnit::directory("/etc/keystone", own()).after(&pkg))
            .unwrap();
        graph.add(ResourceUnit::package("keystone", PackageAction::Upgrade)).unwrap();
        graph.add(ResourceUnit::service("keystone", true, true)).unwrap();

        let order = graph.order().unwrap();
        assert_eq!(
            ids(&order),
            vec!["package[keystone]", "directory[/etc/keystone]", "service[keystone]"]
        );
    }

    #[test]
    fn test_independent_units_keep_declaration_order() {
        let mut graph = ResourceGraph::new();
        for name in ["c", "a", "b"] {
            graph.add(ResourceUnit::package(name, PackageAction::Install)).unwrap();
        }
        assert_eq!(
            ids(&graph.order().unwrap()),
            vec!["package[c]", "package[a]", "package[b]"]
        );
    }

    #[test]
    fn test_cycle_is_detected() {
        let mut graph = ResourceGraph::new();
        graph
            .add(ResourceUnit::package("a", PackageAction::Install).after(&UnitId::package("b")))
            .unwrap();
        graph
            .add(ResourceUnit::package("b", PackageAction::Install).after(&UnitId::package("a")))
            .unwrap();
        let err = graph.order().unwrap_err();
        assert!(err.to_string().contains("cycle"));
    }

    #[test]
    fn test_duplicate_unit_rejected() {
        let mut graph = ResourceGraph::new();
        graph.add(ResourceUnit::package("a", PackageAction::Install)).unwrap();
        assert!(graph.add(ResourceUnit::package("a", PackageAction::Upgrade)).is_err());
    }

    #[test]
    fn test_validate_checks_targets() {
        let mut graph = ResourceGraph::new();
        graph
            .add(ResourceUnit::directory("/d", own()).notify(
                &UnitId::service("missing"),
                NotifyAction::Restart,
                Timing::Delayed,
            ))
            .unwrap();
        assert!(graph.validate().is_err());

        let mut graph = ResourceGraph::new();
        graph.add(ResourceUnit::package("p", PackageAction::Install)).unwrap();
        graph
            .add(ResourceUnit::directory("/d", own()).notify(
                &UnitId::package("p"),
                NotifyAction::Restart,
                Timing::Delayed,
            ))
            .unwrap();
        let err = graph.validate().unwrap_err();
        assert!(err.to_string().contains("cannot restart"));
    }

    #[test]
    fn test_edges_are_not_duplicated() {
        let svc = UnitId::service("keystone");
        let unit = ResourceUnit::directory("/d", own())
            .notify(&svc, NotifyAction::Restart, Timing::Delayed)
            .notify(&svc, NotifyAction::Restart, Timing::Delayed)
            .after(&svc)
            .after(&svc);
        assert_eq!(unit.notifies.len(), 1);
        assert_eq!(unit.depends_on.len(), 1);
    }
}
