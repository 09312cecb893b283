//! identity-converge library
//!
//! Resolves layered attributes into a declared identity-server node (packages,
//! rendered configuration, directories, scheduled jobs, services) and
//! converges a host onto it idempotently.

pub mod attributes;
pub mod cli;
pub mod compute;
pub mod config_file;
pub mod converge;
pub mod cron;
pub mod engine;
pub mod error;
pub mod graph;
pub mod host;
pub mod logic;
pub mod manage;
pub mod render;
pub mod sanity;
pub mod types;
pub mod unit_state;

// Re-export main types for convenience
pub use attributes::{AttrValue, AttributeStore, KeyPath, Tier};
pub use compute::ComputedValues;
pub use config_file::{load_store, AttributeFile};
pub use converge::{converge, Declaration};
pub use cron::{CronDeclaration, CronJob, CronSchedule};
pub use engine::{converge_graph, EngineOptions, RunReport, UnitOutcome};
pub use error::{ConvergeError, Result};
pub use graph::{NotifyAction, ResourceGraph, ResourceUnit, Timing, UnitId};
pub use host::{Change, Host, HostError};
pub use render::{ConfigDocument, ConfigFile, RenderedFiles};
pub use unit_state::{UnitState, UnitTracker};
