#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

use std::{collections::BTreeMap, path::PathBuf, sync::Arc};

use super::{
    checks::{
        CMakeBuildCheck, CheckContext, CheckSpec, CiStatusCheck, CleanRepoCheck,
        DEFAULT_MAX_SOURCE_FILES, MakeTestCheck,
    },
    job::{CheckError, GraphError, JobGraph, JobId, JobPlan, JobSpec},
};

/// Failures resolving the jobs of an assignment.
///
/// All of these are operator mistakes and abort the whole run.
#[derive(thiserror::Error, Debug)]
pub enum RegistryError {
    /// No jobs were registered for the requested assignment.
    #[error("no jobs are defined for assignment {0}")]
    UnknownAssignment(u32),
    /// A definition file could not be read.
    #[error("could not read job definition file {}", path.display())]
    Read {
        /// Offending file.
        path:   PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// A definition file is not valid TOML or does not match the schema.
    #[error("could not parse job definition file {}", path.display())]
    Parse {
        /// Offending file.
        path:   PathBuf,
        /// Underlying parser error.
        #[source]
        source: toml::de::Error,
    },
    /// A definition file (with its includes) maps no assignment to jobs.
    #[error("job definition file {} defines no assignments", path.display())]
    NoAssignments {
        /// The file that was loaded.
        path: PathBuf,
    },
    /// A job table sets a key neither its kind nor any job understands.
    #[error("job `{job}` in {} sets unknown key `{key}`", path.display())]
    UnknownParameter {
        /// File containing the job.
        path: PathBuf,
        /// Job id.
        job:  String,
        /// The key as written.
        key:  String,
    },
    /// An `[assignments]` key is not a number.
    #[error("assignment `{key}` in {} is not a number", path.display())]
    InvalidAssignment {
        /// File containing the key.
        path: PathBuf,
        /// The key as written.
        key:  String,
    },
    /// A dependency or assignment names a job that is not defined.
    #[error("`{reference}`, referenced by {by}, is not a defined job")]
    UnknownJob {
        /// The missing job id.
        reference: String,
        /// Who referenced it.
        by:        String,
    },
    /// The same job id is defined twice.
    #[error("job `{0}` is defined more than once")]
    DuplicateJob(String),
    /// The dependencies of a job lead back to itself.
    #[error("job dependencies form a cycle through `{0}`")]
    Cycle(String),
    /// A job of a kind without a default name was given no name.
    #[error("job `{0}` needs a name")]
    MissingName(String),
    /// A job was rejected by the graph.
    #[error(transparent)]
    Graph(#[from] GraphError),
    /// A check could not be instantiated.
    #[error("could not set up job `{job}`")]
    Check {
        /// The job being set up.
        job:    String,
        /// Why the check could not be built.
        #[source]
        source: CheckError,
    },
}

/// Resolves the jobs to run for an assignment.
pub trait Registry: Send + Sync {
    /// The plan for `assignment`, or [`RegistryError::UnknownAssignment`].
    fn plan(&self, assignment: u32) -> Result<JobPlan, RegistryError>;

    /// Every assignment the registry knows, ascending.
    fn assignments(&self) -> Vec<u32>;
}

/// A registry backed by an in-memory table.
pub struct StaticRegistry {
    /// Every job any assignment may reach.
    graph:       Arc<JobGraph>,
    /// Assignment number to root jobs, in run order.
    assignments: BTreeMap<u32, Vec<JobId>>,
}

impl StaticRegistry {
    /// Creates a registry over `graph` with no assignments yet.
    pub fn new(graph: JobGraph) -> Self {
        Self::from_parts(Arc::new(graph), BTreeMap::new())
    }

    /// Creates a registry from a shared graph and a finished table.
    pub fn from_parts(graph: Arc<JobGraph>, assignments: BTreeMap<u32, Vec<JobId>>) -> Self {
        Self { graph, assignments }
    }

    /// Maps `assignment` to `roots`, replacing an earlier mapping.
    pub fn assign(mut self, assignment: u32, roots: Vec<JobId>) -> Self {
        self.assignments.insert(assignment, roots);
        self
    }

    /// The stock course table:
    /// 1 runs the clean repository check and the build,
    /// 2 runs the build, the tests (which build again) and the CI status.
    pub fn default_catalog(context: &CheckContext) -> Result<Self, RegistryError> {
        let settings = context.settings();
        let mut graph = JobGraph::new();

        let clean = graph.add(
            JobSpec::builder().name(CleanRepoCheck::NAME).build(),
            CleanRepoCheck::new(settings.clone(), DEFAULT_MAX_SOURCE_FILES),
        )?;
        let build = graph.add(
            JobSpec::builder().name(CMakeBuildCheck::NAME).build(),
            CMakeBuildCheck::new(settings.clone(), ""),
        )?;
        let test = graph.add(
            JobSpec::builder()
                .name(MakeTestCheck::NAME)
                .depends_on(vec![build])
                .build(),
            MakeTestCheck::new(settings.clone()),
        )?;
        let ci_check = CheckSpec::CiStatus { branch: None }
            .build(context)
            .map_err(|source| RegistryError::Check {
                job: CiStatusCheck::NAME.to_string(),
                source,
            })?;
        let ci = graph.add_shared(JobSpec::builder().name(CiStatusCheck::NAME).build(), ci_check)?;

        Ok(Self::new(graph)
            .assign(1, vec![clean, build])
            .assign(2, vec![build, test, ci]))
    }
}

impl Registry for StaticRegistry {
    fn plan(&self, assignment: u32) -> Result<JobPlan, RegistryError> {
        let roots = self
            .assignments
            .get(&assignment)
            .ok_or(RegistryError::UnknownAssignment(assignment))?;
        Ok(JobPlan::new(Arc::clone(&self.graph), roots.clone()))
    }

    fn assignments(&self) -> Vec<u32> {
        self.assignments.keys().copied().collect()
    }
}
