#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use tracing::{debug, info};

use super::{Diff, DiffReport, TOTAL_AUTHOR};
use crate::{
    git::{GitError, GitRepo},
    util::decode_lossy,
};

/// Collects the diffs of one checkout.
#[derive(Debug, Clone)]
pub struct DiffCreator {
    /// Root of the checkout.
    path:    PathBuf,
    /// Path, relative to the root, left out of the aggregate diff.
    exclude: Option<PathBuf>,
}

impl DiffCreator {
    /// Creates a creator for the checkout at `path`.
    pub fn new(path: impl Into<PathBuf>, exclude: Option<PathBuf>) -> Self {
        Self {
            path: path.into(),
            exclude,
        }
    }

    /// Diffs for the non-merge commits made from `since` through `until`.
    pub fn create(&self, since: NaiveDate, until: Option<NaiveDate>) -> Result<DiffReport, GitError> {
        let repo = GitRepo::open(&self.path)?;
        let commits = repo.commits_between(since, until)?;
        let Some(oldest) = commits.last() else {
            info!("No commits in {} since {since}", self.path.display());
            return Ok(DiffReport::new(&self.path, Vec::new()));
        };
        debug!("{} commits in {} since {since}", commits.len(), self.path.display());

        let total = repo.diff_workdir_against(oldest.id, self.exclude.as_deref())?;
        let mut diffs = vec![Diff {
            hexsha:  oldest.hexsha.clone(),
            author:  TOTAL_AUTHOR.to_string(),
            message: oldest.summary.clone(),
            patch:   decode_lossy(total, &format!("total diff of {}", self.path.display())),
        }];

        for commit in commits.iter().filter(|commit| commit.has_parent) {
            let Some(patch) = repo.diff_against_parent(commit.id)? else {
                continue;
            };
            diffs.push(Diff {
                hexsha:  commit.hexsha.clone(),
                author:  commit.author.clone(),
                message: commit.summary.clone(),
                patch:   decode_lossy(patch, &format!("diff of {}", commit.hexsha)),
            });
        }

        Ok(DiffReport::new(&self.path, diffs))
    }
}

/// Diff reports for every checkout, or none at all without a `since` date.
///
/// `exclude` is left out of the aggregate diffs, typically the build folder.
pub fn create_diffs(
    repo_paths: &[PathBuf],
    since: Option<NaiveDate>,
    until: Option<NaiveDate>,
    exclude: Option<&Path>,
) -> Result<Vec<DiffReport>, GitError> {
    let Some(since) = since else {
        return Ok(Vec::new());
    };

    repo_paths
        .iter()
        .map(|path| DiffCreator::new(path, exclude.map(Path::to_path_buf)).create(since, until))
        .collect()
}
