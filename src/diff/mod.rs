#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

/// Collecting diffs from a checkout's history.
pub mod creator;
/// Writing diff reports to disk.
pub mod report;

use std::path::{Path, PathBuf};

pub use creator::{DiffCreator, create_diffs};
pub use report::{render_html, write_diff_reports, write_inactive_summary};

/// Author recorded for the aggregate diff.
pub const TOTAL_AUTHOR: &str = "total";

/// One patch with the commit it belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diff {
    /// Commit hash; for the aggregate diff the oldest commit in range.
    pub hexsha:  String,
    /// Commit author, or [`TOTAL_AUTHOR`] for the aggregate diff.
    pub author:  String,
    /// First line of the commit message.
    pub message: String,
    /// Unified patch text.
    pub patch:   String,
}

impl Diff {
    /// Whether this is the aggregate diff over the whole range.
    pub fn is_total(&self) -> bool {
        self.author == TOTAL_AUTHOR
    }
}

/// All diffs of one checkout since a reference date.
///
/// If the list is not empty its first entry is the aggregate diff, followed by
/// one diff per commit, newest first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffReport {
    /// Root of the checkout.
    repo_path: PathBuf,
    /// Aggregate diff first, then per-commit diffs.
    diffs:     Vec<Diff>,
}

impl DiffReport {
    /// Creates a report.
    pub fn new(repo_path: impl Into<PathBuf>, diffs: Vec<Diff>) -> Self {
        Self {
            repo_path: repo_path.into(),
            diffs,
        }
    }

    /// Root of the checkout.
    pub fn repo_path(&self) -> &Path {
        &self.repo_path
    }

    /// All diffs.
    pub fn diffs(&self) -> &[Diff] {
        &self.diffs
    }

    /// False for checkouts without commits in range.
    pub fn has_diffs(&self) -> bool {
        !self.diffs.is_empty()
    }
}
