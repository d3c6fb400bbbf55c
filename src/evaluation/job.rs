#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

use std::{
    fmt,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
};

use async_trait::async_trait;
use bon::Builder;
use futures::{FutureExt, future::BoxFuture};
use tracing::info;

use super::results::EvaluationResult;
use crate::{checkout::Checkout, forge::ForgeError};

/// Source of graph identities.
static NEXT_GRAPH: AtomicUsize = AtomicUsize::new(0);

/// Handle of a job inside a [`JobGraph`].
///
/// A handle is only valid for the graph that issued it; other graphs reject
/// it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JobId {
    /// Identity of the issuing graph.
    graph: usize,
    /// Position inside that graph.
    index: usize,
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.index)
    }
}

/// Immutable description of a gradeable criterion.
#[derive(Debug, Clone, PartialEq, Eq, Builder)]
#[builder(on(String, into))]
pub struct JobSpec {
    /// Display name, also the key results are reported under.
    name:          String,
    /// Multiplier applied to the clamped score.
    #[builder(default = 1)]
    weight:        u32,
    /// Upper bound for the raw score of one run.
    #[builder(default = 1)]
    max_run_score: u32,
    /// Jobs that run before this one, in order.
    #[builder(default)]
    depends_on:    Vec<JobId>,
}

impl JobSpec {
    /// Display name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Score multiplier.
    pub fn weight(&self) -> u32 {
        self.weight
    }

    /// Raw score cap.
    pub fn max_run_score(&self) -> u32 {
        self.max_run_score
    }

    /// Prerequisite jobs.
    pub fn depends_on(&self) -> &[JobId] {
        &self.depends_on
    }

    /// Weighted score achievable, `None` if it does not fit a `u32`.
    pub fn max_score(&self) -> Option<u32> {
        self.max_run_score.checked_mul(self.weight)
    }

    /// Turns the raw outcome of this job's check into a weighted result.
    ///
    /// Saturates for specs whose [`JobSpec::max_score`] overflows; a
    /// [`JobGraph`] never holds such a spec.
    pub fn score(&self, outcome: CheckOutcome) -> EvaluationResult {
        let clamped = outcome.score.min(self.max_run_score);
        let comment = match outcome.comment {
            Some(comment) if !comment.is_empty() => format!("{}: {}", self.name, comment),
            _ => String::new(),
        };

        EvaluationResult::new(
            self.name.clone(),
            clamped.saturating_mul(self.weight),
            self.max_run_score.saturating_mul(self.weight),
            comment,
        )
    }
}

/// What a single run of a check produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CheckOutcome {
    /// Raw, unweighted score.
    pub score:   u32,
    /// Human readable remark, if any.
    pub comment: Option<String>,
}

impl CheckOutcome {
    /// Creates an outcome.
    pub fn new(score: u32, comment: Option<String>) -> Self {
        Self { score, comment }
    }

    /// Score 1, no comment.
    pub fn passed() -> Self {
        Self::new(1, None)
    }

    /// Score 0 with a reason.
    pub fn failed(comment: impl Into<String>) -> Self {
        Self::new(0, Some(comment.into()))
    }

    /// Score 1 if `passed`, otherwise 0; no comment.
    pub fn from_bool(passed: bool) -> Self {
        Self::new(u32::from(passed), None)
    }

    /// Replaces the comment.
    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }
}

/// Errors a check raises instead of scoring.
///
/// These signal operator mistakes or broken infrastructure, never a poor
/// submission.
#[derive(thiserror::Error, Debug)]
pub enum CheckError {
    /// The checkout has no forge project registered under its name.
    #[error("no forge project is registered for checkout `{0}`")]
    MissingProject(String),
    /// The check needs the forge but none was configured.
    #[error("this check needs a forge connection, but none was configured")]
    NoForge,
    /// A forge call failed.
    #[error(transparent)]
    Forge(#[from] ForgeError),
    /// The checkout could not be prepared for the check.
    #[error(transparent)]
    Environment(#[from] anyhow::Error),
}

/// The behaviour of a job: one run against one checkout.
#[async_trait]
pub trait Check: Send + Sync {
    /// Runs the check and reports the raw score.
    async fn execute(&self, checkout: &Checkout) -> Result<CheckOutcome, CheckError>;
}

/// Structural problems when adding a job to a [`JobGraph`].
#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum GraphError {
    /// Weights start at 1.
    #[error("job `{0}` needs a weight of at least 1")]
    ZeroWeight(String),
    /// Caps start at 1.
    #[error("job `{0}` needs a max_run_score of at least 1")]
    ZeroCap(String),
    /// `max_run_score * weight` does not fit the score type.
    #[error("job `{0}` has a max_run_score times weight too large to score")]
    ScoreOverflow(String),
    /// A dependency that is not (yet) part of the graph.
    #[error("job `{name}` depends on {dependency}, which is not part of the graph")]
    UnknownDependency {
        /// The job being added.
        name:       String,
        /// The missing prerequisite.
        dependency: JobId,
    },
}

/// Fatal failures while running a job.
#[derive(thiserror::Error, Debug)]
pub enum RunError {
    /// The id does not belong to the graph.
    #[error("job {0} is not part of the graph")]
    UnknownJob(JobId),
    /// A check raised.
    #[error("job `{job}` failed")]
    Check {
        /// Name of the failing job.
        job:    String,
        /// What the check raised.
        #[source]
        source: CheckError,
    },
}

/// A job: its specification and its behaviour.
struct JobNode {
    /// Name, weighting and prerequisites.
    spec:  JobSpec,
    /// What running the job does.
    check: Arc<dyn Check>,
}

/// Jobs and their prerequisite edges.
///
/// A job can only depend on jobs added before it, so the graph never has
/// cycles.
pub struct JobGraph {
    /// Identity stamped into every [`JobId`] this graph issues.
    id:    usize,
    /// Jobs in insertion order; a [`JobId`] indexes into this.
    nodes: Vec<JobNode>,
}

impl Default for JobGraph {
    fn default() -> Self {
        Self {
            id:    NEXT_GRAPH.fetch_add(1, Ordering::Relaxed),
            nodes: Vec::new(),
        }
    }
}

impl JobGraph {
    /// Creates an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// The node behind `id`, if `id` was issued by this graph.
    fn node(&self, id: JobId) -> Option<&JobNode> {
        if id.graph == self.id {
            self.nodes.get(id.index)
        } else {
            None
        }
    }

    /// Adds a job.
    pub fn add(&mut self, spec: JobSpec, check: impl Check + 'static) -> Result<JobId, GraphError> {
        self.add_shared(spec, Arc::new(check))
    }

    /// Adds a job whose check is shared with other jobs.
    pub fn add_shared(&mut self, spec: JobSpec, check: Arc<dyn Check>) -> Result<JobId, GraphError> {
        if spec.weight == 0 {
            return Err(GraphError::ZeroWeight(spec.name));
        }
        if spec.max_run_score == 0 {
            return Err(GraphError::ZeroCap(spec.name));
        }
        if spec.max_score().is_none() {
            return Err(GraphError::ScoreOverflow(spec.name));
        }
        if let Some(dependency) = spec
            .depends_on
            .iter()
            .find(|dependency| self.node(**dependency).is_none())
        {
            return Err(GraphError::UnknownDependency {
                dependency: *dependency,
                name:       spec.name,
            });
        }

        self.nodes.push(JobNode { spec, check });
        Ok(JobId {
            graph: self.id,
            index: self.nodes.len() - 1,
        })
    }

    /// Specification of a job.
    pub fn spec(&self, id: JobId) -> Option<&JobSpec> {
        self.node(id).map(|node| &node.spec)
    }

    /// Number of jobs.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the graph has no jobs.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Runs a job against `checkout`.
    ///
    /// Prerequisites run first, recursively and in declaration order, every
    /// time they are reached. The returned list holds their flattened results
    /// followed by this job's own result.
    pub fn run<'a>(
        &'a self,
        id: JobId,
        checkout: &'a Checkout,
    ) -> BoxFuture<'a, Result<Vec<EvaluationResult>, RunError>> {
        async move {
            let node = self.node(id).ok_or(RunError::UnknownJob(id))?;

            let mut results = Vec::new();
            for dependency in &node.spec.depends_on {
                results.extend(self.run(*dependency, checkout).await?);
            }

            info!("Running {} on {}", node.spec.name, checkout.local_path().display());
            let outcome = node
                .check
                .execute(checkout)
                .await
                .map_err(|source| RunError::Check {
                    job: node.spec.name.clone(),
                    source,
                })?;
            results.push(node.spec.score(outcome));

            Ok(results)
        }
        .boxed()
    }
}

/// The jobs resolved for one assignment.
#[derive(Clone)]
pub struct JobPlan {
    /// All jobs the roots may reach.
    graph: Arc<JobGraph>,
    /// Top-level jobs, in run order.
    roots: Vec<JobId>,
}

impl JobPlan {
    /// Creates a plan.
    pub fn new(graph: Arc<JobGraph>, roots: Vec<JobId>) -> Self {
        Self { graph, roots }
    }

    /// The underlying graph.
    pub fn graph(&self) -> &JobGraph {
        &self.graph
    }

    /// Top-level jobs.
    pub fn roots(&self) -> &[JobId] {
        &self.roots
    }

    /// Names of the top-level jobs.
    pub fn root_names(&self) -> Vec<&str> {
        self.roots
            .iter()
            .filter_map(|id| self.graph.spec(*id))
            .map(JobSpec::name)
            .collect()
    }

    /// Runs every top-level job and concatenates their results.
    pub async fn run(&self, checkout: &Checkout) -> Result<Vec<EvaluationResult>, RunError> {
        let mut results = Vec::new();
        for root in &self.roots {
            results.extend(self.graph.run(*root, checkout).await?);
        }
        Ok(results)
    }
}
