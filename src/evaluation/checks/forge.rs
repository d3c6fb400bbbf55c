#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

use std::{collections::HashMap, fmt, sync::Arc};

use async_trait::async_trait;
use tracing::debug;

use crate::{
    checkout::Checkout,
    evaluation::job::{Check, CheckError, CheckOutcome},
    forge::Forge,
};

/// Pipeline status that counts as a pass.
const SUCCESS: &str = "success";

/// Passes if the latest CI pipeline on a branch succeeded.
pub struct CiStatusCheck {
    /// Forge to ask.
    forge:    Arc<dyn Forge>,
    /// Checkout name to project id.
    projects: HashMap<String, u64>,
    /// Branch whose pipelines are inspected.
    branch:   String,
}

impl fmt::Debug for CiStatusCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CiStatusCheck")
            .field("projects", &self.projects)
            .field("branch", &self.branch)
            .finish_non_exhaustive()
    }
}

impl CiStatusCheck {
    /// Default job name.
    pub const NAME: &'static str = "CI Status Check";

    /// Creates the check.
    pub fn new(forge: Arc<dyn Forge>, projects: HashMap<String, u64>, branch: impl Into<String>) -> Self {
        Self {
            forge,
            projects,
            branch: branch.into(),
        }
    }
}

#[async_trait]
impl Check for CiStatusCheck {
    async fn execute(&self, checkout: &Checkout) -> Result<CheckOutcome, CheckError> {
        let name = checkout.name();
        let project = *self
            .projects
            .get(&name)
            .ok_or_else(|| CheckError::MissingProject(name.clone()))?;

        let pipelines = self.forge.pipelines(project, &self.branch).await?;
        let Some(latest) = pipelines.first() else {
            return Ok(CheckOutcome::failed("No pipelines found"));
        };
        debug!(project, pipeline = latest.id, status = %latest.status, "latest pipeline");

        Ok(if latest.status == SUCCESS {
            CheckOutcome::passed()
        } else {
            CheckOutcome::failed(format!(
                "Latest pipeline on {} has status {}",
                self.branch, latest.status
            ))
        })
    }
}
