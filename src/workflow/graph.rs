//! Dependency-graph execution.
//!
//! The linear executor covers the planner's output; this runner handles
//! explicit step graphs where independent branches fan out. All currently
//! ready steps run concurrently and are gathered together; a failed branch
//! is recorded and poisons only its dependents, never its siblings.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::tools::{ToolContext, ToolDispatch};

/// One node in a step graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphStep {
    pub id: String,
    pub tool: String,
    #[serde(default)]
    pub args: Value,
    #[serde(default)]
    pub depends_on: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "output", rename_all = "snake_case")]
pub enum BranchOutcome {
    Completed(String),
    Failed(String),
    /// A dependency failed or the graph could not make progress.
    Skipped(String),
}

/// Result of a graph run: per-step outcomes plus the compiled summary of
/// every completed branch, in input order.
#[derive(Debug, Clone, Serialize)]
pub struct GraphReport {
    pub outcomes: HashMap<String, BranchOutcome>,
    pub summary: String,
}

pub struct GraphRunner {
    tools: Arc<dyn ToolDispatch>,
}

impl GraphRunner {
    pub fn new(tools: Arc<dyn ToolDispatch>) -> Self {
        Self { tools }
    }

    pub async fn run(&self, steps: Vec<GraphStep>, ctx: &ToolContext) -> GraphReport {
        let mut outcomes: HashMap<String, BranchOutcome> = HashMap::new();

        loop {
            // Dependents of failed branches are skipped up front so they
            // don't stall the ready computation.
            for step in &steps {
                if outcomes.contains_key(&step.id) {
                    continue;
                }
                let blocked = step.depends_on.iter().any(|d| {
                    matches!(
                        outcomes.get(d),
                        Some(BranchOutcome::Failed(_)) | Some(BranchOutcome::Skipped(_))
                    )
                });
                if blocked {
                    outcomes.insert(
                        step.id.clone(),
                        BranchOutcome::Skipped("dependency failed".to_string()),
                    );
                }
            }

            let ready: Vec<&GraphStep> = steps
                .iter()
                .filter(|s| !outcomes.contains_key(&s.id))
                .filter(|s| {
                    s.depends_on
                        .iter()
                        .all(|d| matches!(outcomes.get(d), Some(BranchOutcome::Completed(_))))
                })
                .collect();

            if ready.is_empty() {
                // Anything still unvisited is part of a cycle or depends on
                // an unknown id.
                for step in &steps {
                    if !outcomes.contains_key(&step.id) {
                        warn!(step = %step.id, "Graph step unreachable");
                        outcomes.insert(
                            step.id.clone(),
                            BranchOutcome::Skipped("unsatisfiable dependencies".to_string()),
                        );
                    }
                }
                break;
            }

            let batch = join_all(ready.iter().map(|step| {
                let args = merge_dependency_results(step, &outcomes);
                let tools = self.tools.clone();
                async move {
                    let result = match tools.resolve(&step.tool) {
                        Some(kind) => tools.execute(kind, &args, ctx).await,
                        None => Err(crate::error::Error::Workflow(
                            crate::error::WorkflowError::UnknownTool {
                                name: step.tool.clone(),
                            },
                        )),
                    };
                    (step.id.clone(), result)
                }
            }))
            .await;

            for (id, result) in batch {
                match result {
                    Ok(output) => {
                        outcomes.insert(id, BranchOutcome::Completed(output));
                    }
                    Err(e) => {
                        warn!(step = %id, error = %e, "Graph branch failed");
                        outcomes.insert(id, BranchOutcome::Failed(e.to_string()));
                    }
                }
            }
        }

        let summary = steps
            .iter()
            .filter_map(|s| match outcomes.get(&s.id) {
                Some(BranchOutcome::Completed(output)) => Some(output.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n\n");

        info!(
            steps = steps.len(),
            completed = outcomes
                .values()
                .filter(|o| matches!(o, BranchOutcome::Completed(_)))
                .count(),
            "Graph run finished"
        );

        GraphReport { outcomes, summary }
    }
}

/// Inject completed dependency outputs into the step's args under
/// `dependency_results`, keyed by step id.
fn merge_dependency_results(
    step: &GraphStep,
    outcomes: &HashMap<String, BranchOutcome>,
) -> Value {
    if step.depends_on.is_empty() {
        return step.args.clone();
    }

    let mut merged = step.args.clone();
    let results: serde_json::Map<String, Value> = step
        .depends_on
        .iter()
        .filter_map(|d| match outcomes.get(d) {
            Some(BranchOutcome::Completed(output)) => {
                Some((d.clone(), Value::String(output.clone())))
            }
            _ => None,
        })
        .collect();

    if let Value::Object(ref mut map) = merged {
        map.insert("dependency_results".to_string(), json!(results));
    }
    merged
}
