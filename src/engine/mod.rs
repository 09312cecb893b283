//! Convergence Engine
//!
//! Walks a [`ResourceGraph`] in dependency order, diffs each unit against the
//! host, applies only what differs and delivers notifications.
//!
//! # Design
//!
//! - **Unit-scoped failures**: a collaborator error fails its unit and skips
//!   the unit's dependents; independent units still converge
//! - **Notifications**: only units that changed notify. `Immediately` edges are
//!   delivered before the next unit is diffed, `Delayed` edges are collected
//!   and delivered once after the last unit
//! - **Dedup**: each (target, action) fires at most once per run, whatever the
//!   timing of its edges; later sources are appended to the existing
//!   notification and an immediate delivery absorbs a queued delayed one
//! - **Notified commands**: a command already run by a notification earlier in
//!   the pass is not run again in its own turn; its unit reports that run
//! - **Dry run**: diffs everything, calls no mutating collaborator and reports
//!   notifications as "would fire"
//! - **Fatal errors**: only graph errors (cycles, unknown targets) and state
//!   machine violations abort the run

pub mod diff;
pub mod report;

pub use diff::{HostOp, Plan, PlanKind};
pub use report::{NotificationOutcome, NotificationReport, RunReport, UnitOutcome, UnitReport};

use crate::error::Result;
use crate::graph::{Desired, Notification, NotifyAction, ResourceGraph, ResourceUnit, Timing, UnitId};
use crate::host::{Change, Host, ServiceAction};
use crate::unit_state::{UnitState, UnitTracker};
use std::collections::HashMap;
use tracing::{debug, error, info, warn};

/// Knobs for one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineOptions {
    pub dry_run: bool,
}

/// Converge `graph` against `host`.
///
/// # Errors
///
/// Only graph and state machine errors. Collaborator failures are reported in
/// the returned [`RunReport`].
pub fn converge_graph(
    graph: &ResourceGraph,
    host: &mut dyn Host,
    options: EngineOptions,
) -> Result<RunReport> {
    Engine::new(graph, host, options).run()
}

struct Engine<'g, 'h> {
    graph: &'g ResourceGraph,
    host: &'h mut dyn Host,
    options: EngineOptions,
    tracker: UnitTracker,
    report: RunReport,
    /// Notifications already delivered, by (target, action)
    delivered: HashMap<(UnitId, NotifyAction), usize>,
    delayed: Vec<NotificationReport>,
}

impl<'g, 'h> Engine<'g, 'h> {
    fn new(graph: &'g ResourceGraph, host: &'h mut dyn Host, options: EngineOptions) -> Self {
        Self {
            graph,
            host,
            options,
            tracker: UnitTracker::new(),
            report: RunReport {
                dry_run: options.dry_run,
                ..RunReport::default()
            },
            delivered: HashMap::new(),
            delayed: Vec::new(),
        }
    }

    fn run(mut self) -> Result<RunReport> {
        let graph = self.graph;
        let order = graph.order()?;
        for unit in graph.units() {
            self.tracker.declare(&unit.id);
        }

        info!(units = order.len(), dry_run = self.options.dry_run, "Starting convergence");
        for unit in order {
            self.converge_unit(unit)?;
        }
        self.deliver_delayed();

        let failures = self.report.failures();
        if failures.is_empty() {
            info!(changed = self.report.changed_units().len(), "Convergence finished");
        } else {
            error!(failed = failures.len(), "Convergence finished with failures");
        }
        Ok(self.report)
    }

    fn converge_unit(&mut self, unit: &'g ResourceUnit) -> Result<()> {
        if let Some(blocker) = self.tracker.blocker(&unit.depends_on) {
            let blocked_by = blocker.clone();
            warn!(unit = %unit.id, blocked_by = %blocked_by, "Skipping unit");
            self.tracker.transition(&unit.id, UnitState::Skipped)?;
            self.record(unit, UnitOutcome::Skipped { blocked_by }, Vec::new());
            return Ok(());
        }

        self.tracker.transition(&unit.id, UnitState::Diffing)?;
        if let Some(outcome) = self.notified_run(unit) {
            return self.settle_notified(unit, outcome);
        }
        let plan = match diff::diff_unit(&unit.desired, &*self.host) {
            Ok(Some(plan)) => plan,
            Ok(None) => {
                debug!(unit = %unit.id, "Unchanged");
                self.tracker.transition(&unit.id, UnitState::Unchanged)?;
                self.record(unit, UnitOutcome::Unchanged, Vec::new());
                return Ok(());
            }
            Err(e) => return self.fail(unit, e.to_string(), Vec::new()),
        };

        let operations: Vec<String> = plan.ops.iter().map(ToString::to_string).collect();
        if !plan.drift.is_empty() {
            debug!(unit = %unit.id, drift = ?plan.drift, "Drift detected");
        }
        self.tracker.transition(&unit.id, UnitState::Applying)?;

        let change = if self.options.dry_run {
            // A refresh can only be decided by the collaborator
            Change::from_changed(plan.kind != PlanKind::Refresh)
        } else {
            match diff::apply_plan(&plan, &mut *self.host) {
                Ok(change) => change,
                Err(e) => return self.fail(unit, e.to_string(), operations),
            }
        };

        let (state, outcome) = match (change, plan.kind) {
            (Change::Unchanged, _) => (UnitState::Unchanged, UnitOutcome::Unchanged),
            (Change::Changed, PlanKind::Create) => (UnitState::Applied, UnitOutcome::Created),
            (Change::Changed, PlanKind::Delete) => (UnitState::Deleted, UnitOutcome::Deleted),
            (Change::Changed, _) => (UnitState::Applied, UnitOutcome::Updated),
        };
        self.tracker.transition(&unit.id, state)?;

        if outcome.is_change() {
            info!(unit = %unit.id, outcome = %outcome, ops = ?operations, "Converged unit");
            self.record(unit, outcome, operations);
            self.notify(unit);
        } else {
            debug!(unit = %unit.id, "Collaborator reported no change");
            self.record(unit, outcome, operations);
        }
        Ok(())
    }

    /// Result of a run notification already delivered to a command unit this
    /// pass, if the command was actually attempted.
    fn notified_run(&self, unit: &ResourceUnit) -> Option<NotificationOutcome> {
        if !matches!(unit.desired, Desired::Command(_)) {
            return None;
        }
        let &idx = self.delivered.get(&(unit.id.clone(), NotifyAction::Run))?;
        match &self.report.notifications[idx].outcome {
            NotificationOutcome::Suppressed { .. } => None,
            outcome => Some(outcome.clone()),
        }
    }

    fn settle_notified(&mut self, unit: &'g ResourceUnit, outcome: NotificationOutcome) -> Result<()> {
        let operations: Vec<String> = match &unit.desired {
            Desired::Command(command) => diff::run_plan(command)
                .ops
                .iter()
                .map(|op| format!("{} (notified)", op))
                .collect(),
            _ => Vec::new(),
        };
        if let NotificationOutcome::Failed { reason } = outcome {
            return self.fail(unit, reason, operations);
        }
        debug!(unit = %unit.id, "Already run by notification");
        self.tracker.transition(&unit.id, UnitState::Applying)?;
        self.tracker.transition(&unit.id, UnitState::Applied)?;
        self.record(unit, UnitOutcome::Updated, operations);
        self.notify(unit);
        Ok(())
    }

    fn fail(&mut self, unit: &ResourceUnit, reason: String, operations: Vec<String>) -> Result<()> {
        error!(unit = %unit.id, reason = %reason, "Unit failed");
        self.tracker.transition(&unit.id, UnitState::Failed)?;
        self.record(unit, UnitOutcome::Failed { reason }, operations);
        Ok(())
    }

    fn record(&mut self, unit: &ResourceUnit, outcome: UnitOutcome, operations: Vec<String>) {
        self.report.units.push(UnitReport {
            id: unit.id.clone(),
            outcome,
            operations,
        });
    }

    // ========================================================================
    // Notifications
    // ========================================================================

    fn notify(&mut self, source: &ResourceUnit) {
        for edge in &source.notifies {
            match edge.timing {
                Timing::Immediately => self.notify_now(&source.id, edge),
                Timing::Delayed => self.queue_delayed(&source.id, edge),
            }
        }
    }

    fn notify_now(&mut self, source: &UnitId, edge: &Notification) {
        let key = (edge.target.clone(), edge.action);
        if let Some(&idx) = self.delivered.get(&key) {
            debug!(notified = %edge.target, action = %edge.action, source = %source, "Already notified");
            self.report.notifications[idx].sources.push(source.clone());
            return;
        }
        let mut sources = Vec::new();
        if let Some(pos) = self
            .delayed
            .iter()
            .position(|n| n.target == edge.target && n.action == edge.action)
        {
            debug!(notified = %edge.target, action = %edge.action, "Delayed notification delivered early");
            sources = self.delayed.remove(pos).sources;
        }
        sources.push(source.clone());

        let outcome = self.deliver(&edge.target, edge.action);
        self.delivered.insert(key, self.report.notifications.len());
        self.report.notifications.push(NotificationReport {
            target: edge.target.clone(),
            action: edge.action,
            timing: Timing::Immediately,
            sources,
            outcome,
        });
    }

    fn queue_delayed(&mut self, source: &UnitId, edge: &Notification) {
        if let Some(&idx) = self.delivered.get(&(edge.target.clone(), edge.action)) {
            debug!(notified = %edge.target, action = %edge.action, source = %source, "Already notified");
            self.report.notifications[idx].sources.push(source.clone());
            return;
        }
        if let Some(pending) = self
            .delayed
            .iter_mut()
            .find(|n| n.target == edge.target && n.action == edge.action)
        {
            pending.sources.push(source.clone());
            return;
        }
        debug!(notified = %edge.target, action = %edge.action, source = %source, "Queued delayed notification");
        self.delayed.push(NotificationReport {
            target: edge.target.clone(),
            action: edge.action,
            timing: Timing::Delayed,
            sources: vec![source.clone()],
            outcome: NotificationOutcome::WouldFire,
        });
    }

    fn deliver_delayed(&mut self) {
        let pending = std::mem::take(&mut self.delayed);
        for mut notification in pending {
            notification.outcome = self.deliver(&notification.target, notification.action);
            self.delivered.insert(
                (notification.target.clone(), notification.action),
                self.report.notifications.len(),
            );
            self.report.notifications.push(notification);
        }
    }

    /// Perform `action` on `target`.
    fn deliver(&mut self, target: &UnitId, action: NotifyAction) -> NotificationOutcome {
        let suppressed = |reason: &str| NotificationOutcome::Suppressed {
            reason: reason.to_string(),
        };
        match self.tracker.state(target) {
            Some(UnitState::Failed) => return suppressed("target failed"),
            Some(UnitState::Skipped) => return suppressed("target skipped"),
            _ => {}
        }
        let graph = self.graph;
        let Some(unit) = graph.get(target) else {
            return NotificationOutcome::Failed {
                reason: format!("undeclared target {}", target),
            };
        };

        let outcome = match (&unit.desired, action) {
            (Desired::Service { name, .. }, NotifyAction::Restart | NotifyAction::Reload) => {
                let service_action = if action == NotifyAction::Restart {
                    ServiceAction::Restart
                } else {
                    ServiceAction::Reload
                };
                if self.options.dry_run {
                    NotificationOutcome::WouldFire
                } else {
                    into_outcome(self.host.control_service(name, service_action))
                }
            }
            (Desired::Command(command), NotifyAction::Run) => {
                match diff::command_due(command, &*self.host) {
                    Err(e) => NotificationOutcome::Failed {
                        reason: e.to_string(),
                    },
                    Ok(false) => suppressed("guard holds"),
                    Ok(true) if self.options.dry_run => NotificationOutcome::WouldFire,
                    Ok(true) => into_outcome(diff::apply_plan(&diff::run_plan(command), &mut *self.host).map(|_| ())),
                }
            }
            _ => NotificationOutcome::Failed {
                reason: format!("cannot {} {}", action, target),
            },
        };

        match &outcome {
            NotificationOutcome::Failed { reason } => {
                error!(notified = %target, action = %action, reason = %reason, "Notification failed")
            }
            other => info!(notified = %target, action = %action, outcome = %other, "Notification"),
        }
        outcome
    }
}

fn into_outcome(result: crate::host::HostResult<()>) -> NotificationOutcome {
    match result {
        Ok(()) => NotificationOutcome::Fired,
        Err(e) => NotificationOutcome::Failed {
            reason: e.to_string(),
        },
    }
}
