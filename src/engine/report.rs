//! Run reports
//!
//! Every unit and every notification of a run ends up here, in the order the
//! engine processed them.

use crate::graph::{NotifyAction, Timing, UnitId};
use std::fmt;

/// Result of one unit in one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnitOutcome {
    Unchanged,
    Created,
    Updated,
    Deleted,
    /// Not diffed because a predecessor did not succeed
    Skipped { blocked_by: UnitId },
    Failed { reason: String },
}

impl UnitOutcome {
    pub fn is_change(&self) -> bool {
        matches!(self, Self::Created | Self::Updated | Self::Deleted)
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

impl fmt::Display for UnitOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unchanged => write!(f, "unchanged"),
            Self::Created => write!(f, "created"),
            Self::Updated => write!(f, "updated"),
            Self::Deleted => write!(f, "deleted"),
            Self::Skipped { blocked_by } => write!(f, "skipped (blocked by {})", blocked_by),
            Self::Failed { reason } => write!(f, "failed: {}", reason),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitReport {
    pub id: UnitId,
    pub outcome: UnitOutcome,
    /// Operations applied, or that would be applied in a dry run
    pub operations: Vec<String>,
}

/// What happened to a notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotificationOutcome {
    Fired,
    /// Dry run
    WouldFire,
    /// Not delivered; the target failed, was skipped, or its guards held
    Suppressed { reason: String },
    Failed { reason: String },
}

impl fmt::Display for NotificationOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fired => write!(f, "fired"),
            Self::WouldFire => write!(f, "would fire"),
            Self::Suppressed { reason } => write!(f, "suppressed: {}", reason),
            Self::Failed { reason } => write!(f, "failed: {}", reason),
        }
    }
}

/// One deduplicated notification and every unit that requested it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationReport {
    pub target: UnitId,
    pub action: NotifyAction,
    pub timing: Timing,
    pub sources: Vec<UnitId>,
    pub outcome: NotificationOutcome,
}

/// Composite result of one convergence run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    pub dry_run: bool,
    pub units: Vec<UnitReport>,
    pub notifications: Vec<NotificationReport>,
}

impl RunReport {
    pub fn outcome(&self, id: &UnitId) -> Option<&UnitOutcome> {
        self.units.iter().find(|u| &u.id == id).map(|u| &u.outcome)
    }

    pub fn notification(&self, target: &UnitId, action: NotifyAction) -> Option<&NotificationReport> {
        self.notifications
            .iter()
            .find(|n| &n.target == target && n.action == action)
    }

    /// Units that created, updated or deleted something.
    pub fn changed_units(&self) -> Vec<&UnitId> {
        self.units
            .iter()
            .filter(|u| u.outcome.is_change())
            .map(|u| &u.id)
            .collect()
    }

    /// Every failed unit and failed notification with its reason.
    pub fn failures(&self) -> Vec<(UnitId, String)> {
        let units = self.units.iter().filter_map(|u| match &u.outcome {
            UnitOutcome::Failed { reason } => Some((u.id.clone(), reason.clone())),
            _ => None,
        });
        let notifications = self.notifications.iter().filter_map(|n| match &n.outcome {
            NotificationOutcome::Failed { reason } => {
                Some((n.target.clone(), format!("{} notification: {}", n.action, reason)))
            }
            _ => None,
        });
        units.chain(notifications).collect()
    }

    pub fn is_success(&self) -> bool {
        self.failures().is_empty()
    }

    /// True when every unit converged without doing anything.
    pub fn all_unchanged(&self) -> bool {
        self.units.iter().all(|u| u.outcome == UnitOutcome::Unchanged)
    }

    pub fn count(&self, pred: impl Fn(&UnitOutcome) -> bool) -> usize {
        self.units.iter().filter(|u| pred(&u.outcome)).count()
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.dry_run {
            writeln!(f, "Dry run, nothing was changed")?;
        }
        for unit in &self.units {
            writeln!(f, "{}: {}", unit.id, unit.outcome)?;
            for op in &unit.operations {
                writeln!(f, "    {}", op)?;
            }
        }
        for n in &self.notifications {
            writeln!(f, "{} {} ({}): {}", n.action, n.target, n.timing, n.outcome)?;
        }
        write!(
            f,
            "{} units: {} changed, {} unchanged, {} skipped, {} failed",
            self.units.len(),
            self.count(UnitOutcome::is_change),
            self.count(|o| *o == UnitOutcome::Unchanged),
            self.count(|o| matches!(o, UnitOutcome::Skipped { .. })),
            self.count(UnitOutcome::is_failure),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report() -> RunReport {
        RunReport {
            dry_run: false,
            units: vec![
                UnitReport {
                    id: UnitId::package("keystone"),
                    outcome: UnitOutcome::Created,
                    operations: vec!["install keystone".into()],
                },
                UnitReport {
                    id: UnitId::file("/etc/keystone/keystone.conf"),
                    outcome: UnitOutcome::Failed {
                        reason: "disk full".into(),
                    },
                    operations: Vec::new(),
                },
                UnitReport {
                    id: UnitId::service("keystone"),
                    outcome: UnitOutcome::Skipped {
                        blocked_by: UnitId::file("/etc/keystone/keystone.conf"),
                    },
                    operations: Vec::new(),
                },
            ],
            notifications: Vec::new(),
        }
    }

    #[test]
    fn test_failures_are_aggregated() {
        let report = report();
        assert!(!report.is_success());
        assert_eq!(
            report.failures(),
            vec![(UnitId::file("/etc/keystone/keystone.conf"), "disk full".to_string())]
        );
        assert_eq!(report.changed_units(), vec![&UnitId::package("keystone")]);
    }

    #[test]
    fn test_skipped_is_not_failure() {
        let mut report = report();
        report.units.remove(1);
        assert!(report.is_success());
        assert!(!report.all_unchanged());
    }

    #[test]
    fn test_summary_line() {
        let text = report().to_string();
        assert!(text.ends_with("3 units: 1 changed, 0 unchanged, 1 skipped, 1 failed"));
        assert!(text.contains("    install keystone"));
    }
}
