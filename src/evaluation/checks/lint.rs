#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

use std::{fs, sync::LazyLock};

use async_trait::async_trait;
use regex::Regex;
use tracing::{debug, warn};

use super::{StepResult, run_step, tool};
use crate::{
    checkout::Checkout,
    config::Settings,
    evaluation::job::{Check, CheckError, CheckOutcome},
    util::{find_files, is_cpp, walk_files},
};

/// A `struct` keyword surrounded by whitespace.
static STRUCT_USAGE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\sstruct\s").expect("struct pattern is valid"));

/// Counts `struct` keyword usages in C/C++ source text.
pub fn count_struct_usages(source: &str) -> usize {
    STRUCT_USAGE.find_iter(source).count()
}

/// Runs clang-format in dry-run mode over the sources.
#[derive(Debug, Clone)]
pub struct ClangFormatCheck {
    /// Runtime configuration.
    settings:   Settings,
    /// Extensions of the files to check.
    extensions: Vec<String>,
}

impl ClangFormatCheck {
    /// Default job name.
    pub const NAME: &'static str = "Clang Format Check";

    /// Creates the check.
    pub fn new(settings: Settings, extensions: Vec<String>) -> Self {
        Self {
            settings,
            extensions,
        }
    }
}

#[async_trait]
impl Check for ClangFormatCheck {
    async fn execute(&self, checkout: &Checkout) -> Result<CheckOutcome, CheckError> {
        let root = checkout.local_path();
        let files = find_files(root, &self.extensions, &[self.settings.build_folder()]);
        if files.is_empty() {
            debug!("No files to format in {}", root.display());
            return Ok(CheckOutcome::passed());
        }

        let format = tool(&self.settings, "clang-format")
            .args(["--style=file", "--dry-run", "--Werror"])
            .args(&files)
            .current_dir(root);

        Ok(match run_step(format).await {
            StepResult::Aborted(comment) => CheckOutcome::failed(comment),
            StepResult::Finished(output) if !output.success() => {
                CheckOutcome::failed("Code is not formatted according to .clang-format")
            }
            StepResult::Finished(_) => CheckOutcome::passed(),
        })
    }
}

/// Fails if C/C++ sources use `struct` instead of classes.
#[derive(Debug, Clone)]
pub struct OopCheck {
    /// Runtime configuration.
    settings: Settings,
}

impl OopCheck {
    /// Default job name.
    pub const NAME: &'static str = "OOP Check";

    /// Creates the check.
    pub fn new(settings: Settings) -> Self {
        Self { settings }
    }
}

#[async_trait]
impl Check for OopCheck {
    async fn execute(&self, checkout: &Checkout) -> Result<CheckOutcome, CheckError> {
        let usages: usize = walk_files(checkout.local_path(), &[self.settings.build_folder()])
            .into_iter()
            .filter(|path| is_cpp(path))
            .map(|path| match fs::read(&path) {
                Ok(bytes) => count_struct_usages(&String::from_utf8_lossy(&bytes)),
                Err(err) => {
                    warn!("Could not read {}: {err}", path.display());
                    0
                }
            })
            .sum();

        Ok(if usages == 0 {
            CheckOutcome::passed()
        } else {
            CheckOutcome::failed(format!("Found {usages} struct usages"))
        })
    }
}
