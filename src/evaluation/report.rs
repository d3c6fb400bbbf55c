#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

use std::{
    collections::HashSet,
    fmt::Write as _,
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tabled::{
    Table, Tabled,
    settings::{Panel, Style},
};
use tracing::info;

use super::results::EvaluationResult;
use crate::checkout::Checkout;

/// Scored outcome of all jobs for one checkout.
///
/// `score` and `max_score` sum over the *distinct* results: two results that
/// are equal in every field count once, although both stay listed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluationReport {
    /// Root of the evaluated working copy.
    repo_path: PathBuf,
    /// Browser URL of the forge project.
    url:       String,
    /// Total weighted score.
    score:     u32,
    /// Total weighted score achievable.
    max_score: u32,
    /// Every result in run order, duplicates included.
    results:   Vec<EvaluationResult>,
}

impl EvaluationReport {
    /// Builds a report and derives its totals from `results`.
    pub fn new(repo_path: impl Into<PathBuf>, url: impl Into<String>, results: Vec<EvaluationResult>) -> Self {
        let distinct: HashSet<&EvaluationResult> = results.iter().collect();
        let score = distinct
            .iter()
            .fold(0u32, |total, result| total.saturating_add(result.score()));
        let max_score = distinct
            .iter()
            .fold(0u32, |total, result| total.saturating_add(result.max_score()));

        Self {
            repo_path: repo_path.into(),
            url: url.into(),
            score,
            max_score,
            results,
        }
    }

    /// Builds the report of `checkout`.
    pub fn for_checkout(checkout: &Checkout, results: Vec<EvaluationResult>) -> Self {
        Self::new(checkout.local_path(), checkout.url(), results)
    }

    /// Root of the evaluated working copy.
    pub fn repo_path(&self) -> &Path {
        &self.repo_path
    }

    /// Browser URL of the forge project.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Total weighted score.
    pub fn score(&self) -> u32 {
        self.score
    }

    /// Total weighted score achievable.
    pub fn max_score(&self) -> u32 {
        self.max_score
    }

    /// All results in run order.
    pub fn results(&self) -> &[EvaluationResult] {
        &self.results
    }

    /// Renders every result as a table headed by the checkout folder.
    pub fn results_table(&self) -> String {
        Table::new(&self.results)
            .with(Panel::header(checkout_name(&self.repo_path)))
            .with(Style::modern())
            .to_string()
    }

    /// Pretty printed JSON.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("Failed to serialize evaluation report")
    }

    /// Parses a report written by [`EvaluationReport::to_json`].
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("Failed to parse evaluation report")
    }

    /// The student facing extract: totals and one bullet per comment.
    pub fn to_student_markdown(&self) -> String {
        let mut markdown = format!("Score: {}\n\nMax score: {}\n", self.score, self.max_score);

        let comments: Vec<&str> = self
            .results
            .iter()
            .map(EvaluationResult::comment)
            .filter(|comment| !comment.is_empty())
            .collect();
        if !comments.is_empty() {
            markdown.push('\n');
            for comment in comments {
                let _ = writeln!(markdown, "- {comment}");
            }
        }

        markdown
    }

    /// The full instructor report, embedding the JSON document.
    pub fn to_markdown(&self) -> Result<String> {
        Ok(format!(
            "# Homework Evaluation Report\n\n[Repo]({url})\n\nOverall: \
             {score}/{max_score}\n\n## Auto Evaluation\n\n```json\n{json}\n```\n\n## Manual \
             Evaluation\n\n## Student Feedback\n\n{students}",
            url = self.url,
            score = self.score,
            max_score = self.max_score,
            json = self.to_json()?,
            students = self.to_student_markdown(),
        ))
    }

    /// Writes `{base}.json`, `{base}.md` and `{base}_students.md` into the
    /// checkout.
    pub fn write(&self, base_name: &str) -> Result<()> {
        let base = self.repo_path.join(base_name);
        let outputs = [
            (base.with_extension("json"), self.to_json()?),
            (base.with_extension("md"), self.to_markdown()?),
            (self.repo_path.join(format!("{base_name}_students.md")), self.to_student_markdown()),
        ];

        for (path, contents) in outputs {
            fs::write(&path, contents)
                .with_context(|| format!("Failed to write {}", path.display()))?;
        }

        Ok(())
    }
}

/// Writes the three report files of every report.
pub fn write_evaluation_reports(reports: &[EvaluationReport], base_name: &str) -> Result<()> {
    for report in reports {
        report.write(base_name)?;
        info!("Wrote {base_name} reports to {}", report.repo_path.display());
    }
    Ok(())
}

/// Folder name of a checkout, or the whole path if it has none.
fn checkout_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// One line of the terminal overview.
#[derive(Tabled)]
struct SummaryRow {
    /// Checkout folder.
    #[tabled(rename = "Checkout")]
    checkout: String,
    /// Total score.
    #[tabled(rename = "Score")]
    score:    u32,
    /// Total achievable score.
    #[tabled(rename = "Max")]
    max:      u32,
}

/// Renders a one-row-per-checkout overview table.
pub fn summary_table(reports: &[EvaluationReport]) -> String {
    let rows: Vec<SummaryRow> = reports
        .iter()
        .map(|report| SummaryRow {
            checkout: checkout_name(&report.repo_path),
            score:    report.score,
            max:      report.max_score,
        })
        .collect();

    Table::new(rows)
        .with(Panel::header("Evaluation Overview"))
        .with(Style::modern())
        .to_string()
}
