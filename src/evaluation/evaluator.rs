#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

use std::path::PathBuf;

use chrono::NaiveDate;
use itertools::Itertools;
use tracing::info;

use super::{
    job::{JobPlan, RunError},
    registry::{Registry, RegistryError},
    report::EvaluationReport,
};
use crate::{
    checkout::Checkout,
    git::{GitError, GitRepo},
};

/// Failures that abort the evaluation of a checkout.
#[derive(thiserror::Error, Debug)]
pub enum EvaluationError {
    /// The checkout could not be opened, cleaned or rewound.
    #[error("could not prepare checkout {}", path.display())]
    Checkout {
        /// Root of the checkout.
        path:   PathBuf,
        /// What went wrong.
        #[source]
        source: GitError,
    },
    /// A job raised instead of scoring.
    #[error(transparent)]
    Run(#[from] RunError),
    /// The jobs for the assignment could not be resolved.
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// Grades one checkout with one plan.
pub struct CodeEvaluator {
    /// Jobs to run.
    plan:     JobPlan,
    /// Checkout to grade.
    checkout: Checkout,
}

impl CodeEvaluator {
    /// Creates an evaluator.
    pub fn new(plan: JobPlan, checkout: Checkout) -> Self {
        Self { plan, checkout }
    }

    /// Cleans the checkout, rewinds it to the last commit on or before
    /// `cutoff` if one exists, and runs every job of the plan.
    pub async fn evaluate(&self, cutoff: Option<NaiveDate>) -> Result<EvaluationReport, EvaluationError> {
        self.prepare(cutoff)?;
        let results = self.plan.run(&self.checkout).await?;
        Ok(EvaluationReport::for_checkout(&self.checkout, results))
    }

    /// Brings the working copy into the state to grade.
    fn prepare(&self, cutoff: Option<NaiveDate>) -> Result<(), EvaluationError> {
        let path = self.checkout.local_path();
        let failed = |source: GitError| EvaluationError::Checkout {
            path: path.to_path_buf(),
            source,
        };

        let repo = GitRepo::open(path).map_err(failed)?;
        repo.clean().map_err(failed)?;

        let Some(cutoff) = cutoff else {
            return Ok(());
        };
        match repo.last_commit_before(cutoff).map_err(failed)? {
            Some(commit) => {
                info!("Evaluating {} at {commit} (last commit on or before {cutoff})", path.display());
                repo.checkout_detached(commit).map_err(failed)?;
                repo.clean().map_err(failed)?;
            }
            None => {
                info!("{} has no commit on or before {cutoff}, evaluating as is", path.display());
            }
        }

        Ok(())
    }
}

/// Evaluates every checkout, one after another, with the jobs `registry`
/// assigns to `assignment`.
pub async fn evaluate_code(
    registry: &dyn Registry,
    checkouts: &[Checkout],
    assignment: u32,
    cutoff: Option<NaiveDate>,
) -> Result<Vec<EvaluationReport>, EvaluationError> {
    let plan = registry.plan(assignment)?;
    info!("Evaluating assignment {assignment} with {}", plan.root_names().iter().join(", "));

    let mut reports = Vec::with_capacity(checkouts.len());
    for (index, checkout) in checkouts.iter().enumerate() {
        info!("[{}/{}] Evaluating {}", index + 1, checkouts.len(), checkout.name());
        let report = CodeEvaluator::new(plan.clone(), checkout.clone())
            .evaluate(cutoff)
            .await?;
        reports.push(report);
    }
    Ok(reports)
}
