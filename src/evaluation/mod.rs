#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

/// Built-in checks and their definition-file representation.
pub mod checks;
/// Job definition files loaded at run time.
pub mod definitions;
/// Cleaning, rewinding and grading checkouts.
pub mod evaluator;
/// Job specifications, the check interface and the dependency graph.
pub mod job;
/// Assignment to job resolution.
pub mod registry;
/// Per-checkout score aggregation and rendering.
pub mod report;
/// Shared result type.
pub mod results;

pub use checks::{CheckContext, CheckSpec};
pub use definitions::JobDefinitionFile;
pub use evaluator::{CodeEvaluator, EvaluationError, evaluate_code};
pub use job::{
    Check, CheckError, CheckOutcome, GraphError, JobGraph, JobId, JobPlan, JobSpec, RunError,
};
pub use registry::{Registry, RegistryError, StaticRegistry};
pub use report::{EvaluationReport, summary_table, write_evaluation_reports};
pub use results::EvaluationResult;
