#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

use std::{
    fs,
    path::{Path, PathBuf},
    sync::LazyLock,
};

use anyhow::Context;
use async_trait::async_trait;
use regex::Regex;
use tracing::{debug, warn};

use super::{StepResult, run_step, tool};
use crate::{
    checkout::Checkout,
    config::Settings,
    evaluation::job::{Check, CheckError, CheckOutcome},
    util::copy_dir_all,
};

/// Name of the CMake project file.
const CMAKE_LISTS: &str = "CMakeLists.txt";

/// Module folder name assumed when no module directory is configured.
const DEFAULT_MODULE_FOLDER: &str = "cmake";

/// Greedy over newlines, so the last percentage after `TOTAL` wins.
static TOTAL_COVERAGE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)TOTAL.*\s(\d*)%").expect("coverage pattern is valid"));

/// Extracts the total line coverage from a gcovr text report; 0 when the
/// report has no total.
pub fn parse_total_coverage(report: &str) -> u32 {
    TOTAL_COVERAGE
        .captures(report)
        .and_then(|captures| captures.get(1))
        .and_then(|percentage| percentage.as_str().parse().ok())
        .unwrap_or(0)
}

/// `{checkout}/{build_folder}`, created if missing.
fn build_folder(settings: &Settings, checkout: &Checkout) -> Result<PathBuf, CheckError> {
    let folder = checkout.local_path().join(settings.build_folder());
    fs::create_dir_all(&folder)
        .with_context(|| format!("Could not create build folder {}", folder.display()))?;
    Ok(folder)
}

/// Configures with CMake and compiles with make.
#[derive(Debug, Clone)]
pub struct CMakeBuildCheck {
    /// Runtime configuration.
    settings:      Settings,
    /// Extra options handed to cmake.
    cmake_options: String,
}

impl CMakeBuildCheck {
    /// Default job name.
    pub const NAME: &'static str = "CMake Build";

    /// Creates the check.
    pub fn new(settings: Settings, cmake_options: impl Into<String>) -> Self {
        Self {
            settings,
            cmake_options: cmake_options.into(),
        }
    }
}

#[async_trait]
impl Check for CMakeBuildCheck {
    async fn execute(&self, checkout: &Checkout) -> Result<CheckOutcome, CheckError> {
        let folder = build_folder(&self.settings, checkout)?;

        let configure = tool(&self.settings, "cmake")
            .args(self.cmake_options.split_whitespace())
            .arg("..")
            .current_dir(&folder);
        match run_step(configure).await {
            StepResult::Aborted(comment) => return Ok(CheckOutcome::failed(comment)),
            StepResult::Finished(output) if !output.success() => {
                return Ok(CheckOutcome::failed(format!(
                    "CMake step failed with option {}",
                    self.cmake_options
                )));
            }
            StepResult::Finished(_) => {}
        }

        let compile = tool(&self.settings, "make").current_dir(&folder);
        Ok(match run_step(compile).await {
            StepResult::Aborted(comment) => CheckOutcome::failed(comment),
            StepResult::Finished(output) if !output.success() => {
                CheckOutcome::failed("Make step failed")
            }
            StepResult::Finished(_) => CheckOutcome::passed(),
        })
    }
}

/// Runs `make test` in the build folder.
#[derive(Debug, Clone)]
pub struct MakeTestCheck {
    /// Runtime configuration.
    settings: Settings,
}

impl MakeTestCheck {
    /// Default job name.
    pub const NAME: &'static str = "Make Test";

    /// Creates the check.
    pub fn new(settings: Settings) -> Self {
        Self { settings }
    }
}

#[async_trait]
impl Check for MakeTestCheck {
    async fn execute(&self, checkout: &Checkout) -> Result<CheckOutcome, CheckError> {
        let folder = build_folder(&self.settings, checkout)?;
        let test = tool(&self.settings, "make").arg("test").current_dir(&folder);

        let output = match run_step(test).await {
            StepResult::Aborted(comment) => return Ok(CheckOutcome::failed(comment)),
            StepResult::Finished(output) => output,
        };

        // A failing run that printed nothing never got as far as ctest.
        if !output.success() && output.stdout.iter().all(u8::is_ascii_whitespace) {
            return Ok(CheckOutcome::failed("No tests registered"));
        }
        if output.combined_text().contains("No tests were found") {
            return Ok(CheckOutcome::failed("No tests were found"));
        }
        Ok(CheckOutcome::from_bool(output.success()))
    }
}

/// Measures line coverage with gcovr.
#[derive(Debug, Clone)]
pub struct CodeCoverageCheck {
    /// Runtime configuration.
    settings:     Settings,
    /// Coverage has to be strictly above this percentage.
    min_coverage: u32,
}

impl CodeCoverageCheck {
    /// Default job name.
    pub const NAME: &'static str = "Code Coverage";

    /// Creates the check.
    pub fn new(settings: Settings, min_coverage: u32) -> Self {
        Self {
            settings,
            min_coverage,
        }
    }
}

#[async_trait]
impl Check for CodeCoverageCheck {
    async fn execute(&self, checkout: &Checkout) -> Result<CheckOutcome, CheckError> {
        let folder = build_folder(&self.settings, checkout)?;
        let folder = std::path::absolute(&folder)
            .with_context(|| format!("Could not resolve {}", folder.display()))?;
        let report = folder.join("report.txt");

        let gcovr = tool(&self.settings, "gcovr")
            .arg("-o")
            .arg(&report)
            .current_dir(checkout.local_path());
        match run_step(gcovr).await {
            StepResult::Aborted(comment) => return Ok(CheckOutcome::failed(comment)),
            StepResult::Finished(output) if !output.success() => {
                return Ok(CheckOutcome::failed("Coverage failed"));
            }
            StepResult::Finished(_) => {}
        }

        let text = fs::read_to_string(&report).unwrap_or_else(|err| {
            warn!("Could not read coverage report {}: {err}", report.display());
            String::new()
        });
        let coverage = parse_total_coverage(&text);
        debug!(coverage, min = self.min_coverage, "parsed coverage");

        Ok(CheckOutcome::from_bool(coverage > self.min_coverage)
            .with_comment(format!("Code coverage: {coverage}%")))
    }
}

/// Writes the original contents back to a file when dropped.
struct RestoreOnDrop {
    /// File to restore.
    path:     PathBuf,
    /// Contents before modification.
    original: Vec<u8>,
}

impl Drop for RestoreOnDrop {
    fn drop(&mut self) {
        if let Err(err) = fs::write(&self.path, &self.original) {
            warn!("Could not restore {}: {err}", self.path.display());
        }
    }
}

/// Builds with clang-tidy enabled through an injected CMake module.
///
/// `CMakeLists.txt` is restored afterwards, whatever the build did.
#[derive(Debug, Clone)]
pub struct ClangTidyCheck {
    /// Runtime configuration.
    settings: Settings,
    /// The build that runs with clang-tidy enabled.
    build:    CMakeBuildCheck,
}

impl ClangTidyCheck {
    /// Default job name.
    pub const NAME: &'static str = "Clang Tidy Check";

    /// Creates the check.
    pub fn new(settings: Settings) -> Self {
        Self {
            build: CMakeBuildCheck::new(settings.clone(), ""),
            settings,
        }
    }

    /// Copies the module folder into the checkout and returns the folder name
    /// it is reachable under.
    fn install_modules(&self, root: &Path) -> Result<String, CheckError> {
        let Some(modules) = self.settings.cmake_module_dir() else {
            return Ok(DEFAULT_MODULE_FOLDER.to_string());
        };
        let folder = modules
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| DEFAULT_MODULE_FOLDER.to_string());

        copy_dir_all(modules, &root.join(&folder))?;
        Ok(folder)
    }
}

#[async_trait]
impl Check for ClangTidyCheck {
    async fn execute(&self, checkout: &Checkout) -> Result<CheckOutcome, CheckError> {
        let root = checkout.local_path();
        let module_folder = self.install_modules(root)?;

        let cmake_lists = root.join(CMAKE_LISTS);
        if !cmake_lists.exists() {
            return Ok(CheckOutcome::failed(format!("{CMAKE_LISTS} not found")));
        }

        let original = fs::read(&cmake_lists)
            .with_context(|| format!("Could not read {}", cmake_lists.display()))?;
        let restore = RestoreOnDrop {
            path:     cmake_lists.clone(),
            original: original.clone(),
        };

        let mut patched = original;
        patched.extend_from_slice(
            format!(
                "\nlist(APPEND CMAKE_MODULE_PATH \
                 ${{PROJECT_SOURCE_DIR}}/{module_folder})\ninclude(ClangTidy)\n"
            )
            .as_bytes(),
        );
        fs::write(&cmake_lists, patched)
            .with_context(|| format!("Could not write {}", cmake_lists.display()))?;

        let outcome = self.build.execute(checkout).await;
        drop(restore);
        outcome
    }
}
