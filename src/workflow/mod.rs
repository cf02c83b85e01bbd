//! Approval-gated workflow planning and execution.

mod executor;
mod graph;
mod planner;
mod replan;
mod store;
mod types;

pub use executor::WorkflowExecutor;
pub use graph::{BranchOutcome, GraphReport, GraphRunner, GraphStep};
pub use planner::{WorkflowPlanner, PREVIOUS_RESULT_PLACEHOLDER};
pub use replan::{KeywordReplanTrigger, ReplanTrigger};
pub use store::{InMemoryWorkflowStore, WorkflowStore};
pub use types::{StepStatus, WorkflowExecution, WorkflowStatus, WorkflowStep};
