#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

use serde::{Deserialize, Serialize};
use tabled::Tabled;

#[derive(Tabled, Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
/// The outcome of one job invocation against one checkout
pub struct EvaluationResult {
    #[tabled(rename = "Job")]
    /// * `name`: name of the job that produced this result
    name:      String,
    #[tabled(rename = "Score")]
    /// * `score`: weighted score achieved
    score:     u32,
    #[tabled(rename = "Max")]
    /// * `max_score`: weighted score achievable
    max_score: u32,
    #[tabled(rename = "Comment")]
    /// * `comment`: `"{name}: {remark}"`, or empty
    comment:   String,
}

impl EvaluationResult {
    /// Creates a result.
    pub fn new(name: impl Into<String>, score: u32, max_score: u32, comment: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            score,
            max_score,
            comment: comment.into(),
        }
    }

    /// Name of the job.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Weighted score achieved.
    pub fn score(&self) -> u32 {
        self.score
    }

    /// Weighted score achievable.
    pub fn max_score(&self) -> u32 {
        self.max_score
    }

    /// Comment, empty if the job had nothing to say.
    pub fn comment(&self) -> &str {
        &self.comment
    }
}
