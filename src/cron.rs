//! Periodic job reconciliation
//!
//! Declares the token-flush job when the token backend stores tokens in SQL and
//! declares its removal otherwise. Evaluated from scratch every run, so turning
//! the guard off removes a job created by an earlier run.

use crate::attributes::AttributeStore;
use crate::error::Result;
use crate::types::TokenBackend;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Name of the token flush job.
pub const TOKEN_FLUSH_JOB: &str = "token-flush";

/// Five-field recurrence expression.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CronSchedule {
    pub minute: String,
    pub hour: String,
    pub day: String,
    pub month: String,
    pub weekday: String,
}

impl CronSchedule {
    /// Parse `"m h dom mon dow"`; returns `None` unless exactly five fields.
    pub fn parse(expr: &str) -> Option<Self> {
        let fields: Vec<&str> = expr.split_whitespace().collect();
        match fields.as_slice() {
            [minute, hour, day, month, weekday] => Some(Self {
                minute: minute.to_string(),
                hour: hour.to_string(),
                day: day.to_string(),
                month: month.to_string(),
                weekday: weekday.to_string(),
            }),
            _ => None,
        }
    }
}

impl fmt::Display for CronSchedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {} {} {}",
            self.minute, self.hour, self.day, self.month, self.weekday
        )
    }
}

/// A scheduled job as the cron table stores it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CronJob {
    pub name: String,
    pub schedule: CronSchedule,
    pub user: String,
    pub command: String,
}

impl CronJob {
    /// One `/etc/cron.d` line: schedule, user, command.
    pub fn to_line(&self) -> String {
        format!("{} {} {}", self.schedule, self.user, self.command)
    }

    /// Parse a line produced by [`CronJob::to_line`].
    pub fn from_line(name: &str, line: &str) -> Option<Self> {
        let mut parts = line.split_whitespace();
        let fields: Vec<&str> = parts.by_ref().take(5).collect();
        let schedule = CronSchedule::parse(&fields.join(" "))?;
        let user = parts.next()?.to_string();
        let command = parts.collect::<Vec<_>>().join(" ");
        if command.is_empty() {
            return None;
        }
        Some(Self {
            name: name.to_string(),
            schedule,
            user,
            command,
        })
    }
}

/// Desired state of one scheduled job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CronDeclaration {
    Present(CronJob),
    Absent { name: String },
}

impl CronDeclaration {
    pub fn name(&self) -> &str {
        match self {
            Self::Present(job) => &job.name,
            Self::Absent { name } => name,
        }
    }
}

/// Declare the token flush job from the current attributes.
pub fn reconcile_token_flush(store: &AttributeStore) -> Result<CronDeclaration> {
    let backend: TokenBackend = store.choice("openstack.identity.token.backend", "any token backend")?;
    if !backend.is_sql() {
        return Ok(CronDeclaration::Absent {
            name: TOKEN_FLUSH_JOB.to_string(),
        });
    }

    let field = |name: &str| store.string(&format!("openstack.identity.token_flush_cron.{}", name));
    let schedule = CronSchedule {
        minute: field("minute")?,
        hour: field("hour")?,
        day: field("day")?,
        month: field("month")?,
        weekday: field("weekday")?,
    };
    let log_file = field("log_file")?;

    Ok(CronDeclaration::Present(CronJob {
        name: TOKEN_FLUSH_JOB.to_string(),
        schedule,
        user: store.string("openstack.identity.user")?,
        command: format!("keystone-manage token_flush > {} 2>&1", log_file),
    }))
}
