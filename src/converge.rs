//! One convergence run, end to end.
//!
//! attributes → computed values → rendered documents → resource graph →
//! engine. Everything is rebuilt from the attribute store on every call.

use crate::attributes::AttributeStore;
use crate::compute::ComputedValues;
use crate::engine::{self, EngineOptions, RunReport};
use crate::error::Result;
use crate::graph::identity::declare_identity_server;
use crate::graph::ResourceGraph;
use crate::host::{Host, InterfaceResolver};
use crate::render::{self, RenderedFiles};
use tracing::info;

/// Everything declared for one run, before anything touches the host.
#[derive(Debug, Clone)]
pub struct Declaration {
    pub computed: ComputedValues,
    pub files: RenderedFiles,
    pub graph: ResourceGraph,
}

impl Declaration {
    /// Resolve, compute, render and declare.
    ///
    /// # Errors
    ///
    /// Attribute, guard and graph errors; all of them are fatal for the run.
    pub fn build(store: &AttributeStore, resolver: &dyn InterfaceResolver) -> Result<Self> {
        let computed = ComputedValues::derive(store, resolver)?;
        let files = render::render_all(store, &computed)?;
        let graph = declare_identity_server(store, &computed, &files)?;
        Ok(Self {
            computed,
            files,
            graph,
        })
    }

    /// Units in application order, one line each, with their edges.
    pub fn plan(&self) -> Result<Vec<String>> {
        let order = self.graph.order()?;
        Ok(order
            .iter()
            .enumerate()
            .map(|(idx, unit)| {
                let mut line = format!("{:>3}. {}: {}", idx + 1, unit.id, unit.desired.summary());
                if !unit.depends_on.is_empty() {
                    let deps: Vec<&str> = unit.depends_on.iter().map(|d| d.as_str()).collect();
                    line.push_str(&format!("\n       after {}", deps.join(", ")));
                }
                for edge in &unit.notifies {
                    line.push_str(&format!(
                        "\n       notifies {} {} ({})",
                        edge.action, edge.target, edge.timing
                    ));
                }
                line
            })
            .collect())
    }
}

/// Converge the identity server described by `store` onto `host`.
pub fn converge<H: Host>(store: &AttributeStore, host: &mut H, options: EngineOptions) -> Result<RunReport> {
    let declaration = Declaration::build(store, &*host)?;
    info!(units = declaration.graph.len(), "Declared resources");
    engine::converge_graph(&declaration.graph, host, options)
}
