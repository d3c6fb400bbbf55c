#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

/// CMake and make driven checks: build, test, coverage, clang-tidy.
pub mod cmake;
/// Operator supplied shell commands.
pub mod command;
/// Checks backed by the forge API.
pub mod forge;
/// Source level lints: formatting and OOP usage.
pub mod lint;
/// Repository hygiene.
pub mod repo;

use std::{collections::HashMap, fmt, sync::Arc};

use serde::Deserialize;
use tracing::warn;

pub use cmake::{ClangTidyCheck, CMakeBuildCheck, CodeCoverageCheck, MakeTestCheck, parse_total_coverage};
pub use command::CommandCheck;
pub use forge::CiStatusCheck;
pub use lint::{ClangFormatCheck, OopCheck};
pub use repo::CleanRepoCheck;

use super::job::{Check, CheckError};
use crate::{
    checkout::Checkout,
    config::Settings,
    forge::Forge,
    process::{Collected, Invocation, ProcessError},
    util::CPP_FILE_ENDINGS,
};

/// Coverage threshold used when none is configured.
pub const DEFAULT_MIN_COVERAGE: u32 = 75;

/// Source file ceiling used when none is configured.
pub const DEFAULT_MAX_SOURCE_FILES: usize = 100;

/// CMake options of the debug build coverage relies on.
pub const DEBUG_CMAKE_OPTIONS: &str = "-DCMAKE_BUILD_TYPE=Debug";

/// Everything a check may need besides the checkout itself.
#[derive(Clone, Default)]
pub struct CheckContext {
    /// Runtime configuration.
    settings: Settings,
    /// Checkout name to forge project id.
    projects: HashMap<String, u64>,
    /// Forge client, if one was configured.
    forge:    Option<Arc<dyn Forge>>,
}

impl fmt::Debug for CheckContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CheckContext")
            .field("settings", &self.settings)
            .field("projects", &self.projects)
            .field("forge", &self.forge.is_some())
            .finish()
    }
}

impl CheckContext {
    /// Creates a context without forge access.
    pub fn new(settings: Settings) -> Self {
        Self {
            settings,
            ..Self::default()
        }
    }

    /// Registers the forge projects of `checkouts` under their folder names.
    pub fn with_checkouts(mut self, checkouts: &[Checkout]) -> Self {
        self.projects.extend(
            checkouts
                .iter()
                .map(|checkout| (checkout.name(), checkout.project().id)),
        );
        self
    }

    /// Adds a forge client.
    pub fn with_forge(mut self, forge: Arc<dyn Forge>) -> Self {
        self.forge = Some(forge);
        self
    }

    /// Runtime configuration.
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// The forge client, or [`CheckError::NoForge`].
    pub fn forge(&self) -> Result<Arc<dyn Forge>, CheckError> {
        self.forge.clone().ok_or(CheckError::NoForge)
    }

    /// Checkout name to project id.
    pub fn projects(&self) -> &HashMap<String, u64> {
        &self.projects
    }
}

/// The built-in check kinds, as written in job definition files.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "check", rename_all = "kebab-case")]
pub enum CheckSpec {
    /// `cmake {options} ..` followed by `make`.
    CmakeBuild {
        /// Extra options passed to cmake.
        #[serde(default)]
        cmake_options: String,
    },
    /// `make test` on top of a build.
    MakeTest,
    /// clang-format dry run over the sources.
    ClangFormat {
        /// File extensions to check.
        #[serde(default = "default_extensions")]
        extensions: Vec<String>,
    },
    /// gcovr line coverage on top of a debug build.
    CodeCoverage {
        /// Coverage has to be strictly above this percentage.
        #[serde(default = "default_min_coverage")]
        min_coverage: u32,
    },
    /// A build with clang-tidy wired into the CMake configuration.
    ClangTidy,
    /// No build artifacts and no vendored sources.
    CleanRepo {
        /// Most C/C++ sources a checkout may hold.
        #[serde(default = "default_max_source_files")]
        max_source_files: usize,
    },
    /// No `struct` in C/C++ sources.
    Oop,
    /// Latest CI pipeline succeeded.
    CiStatus {
        /// Branch to look at; the configured default branch if unset.
        #[serde(default)]
        branch: Option<String>,
    },
    /// Any shell command; passes on exit status 0.
    Command {
        /// Command line handed to `sh -c`.
        command: String,
    },
}

/// Serde default for `CheckSpec::ClangFormat::extensions`.
fn default_extensions() -> Vec<String> {
    CPP_FILE_ENDINGS.iter().map(|ext| ext.to_string()).collect()
}

/// Serde default for `CheckSpec::CodeCoverage::min_coverage`.
fn default_min_coverage() -> u32 {
    DEFAULT_MIN_COVERAGE
}

/// Serde default for `CheckSpec::CleanRepo::max_source_files`.
fn default_max_source_files() -> usize {
    DEFAULT_MAX_SOURCE_FILES
}

impl CheckSpec {
    /// Job name used when a definition does not give one.
    pub fn default_name(&self) -> Option<&'static str> {
        match self {
            CheckSpec::CmakeBuild { .. } => Some(CMakeBuildCheck::NAME),
            CheckSpec::MakeTest => Some(MakeTestCheck::NAME),
            CheckSpec::ClangFormat { .. } => Some(ClangFormatCheck::NAME),
            CheckSpec::CodeCoverage { .. } => Some(CodeCoverageCheck::NAME),
            CheckSpec::ClangTidy => Some(ClangTidyCheck::NAME),
            CheckSpec::CleanRepo { .. } => Some(CleanRepoCheck::NAME),
            CheckSpec::Oop => Some(OopCheck::NAME),
            CheckSpec::CiStatus { .. } => Some(CiStatusCheck::NAME),
            CheckSpec::Command { .. } => None,
        }
    }

    /// Keys a job definition of this kind may set besides the common ones.
    pub fn parameters(&self) -> &'static [&'static str] {
        match self {
            CheckSpec::CmakeBuild { .. } => &["cmake_options"],
            CheckSpec::ClangFormat { .. } => &["extensions"],
            CheckSpec::CodeCoverage { .. } => &["min_coverage"],
            CheckSpec::CleanRepo { .. } => &["max_source_files"],
            CheckSpec::CiStatus { .. } => &["branch"],
            CheckSpec::Command { .. } => &["command"],
            CheckSpec::MakeTest | CheckSpec::ClangTidy | CheckSpec::Oop => &[],
        }
    }

    /// The prerequisite a kind brings along when a definition does not list
    /// its dependencies explicitly, keyed by a reserved job id.
    pub fn implicit_prerequisite(&self) -> Option<(&'static str, CheckSpec)> {
        match self {
            CheckSpec::MakeTest => Some(("builtin-cmake-build", CheckSpec::CmakeBuild {
                cmake_options: String::new(),
            })),
            CheckSpec::CodeCoverage { .. } => {
                Some(("builtin-cmake-build-debug", CheckSpec::CmakeBuild {
                    cmake_options: DEBUG_CMAKE_OPTIONS.to_string(),
                }))
            }
            _ => None,
        }
    }

    /// Instantiates the check.
    pub fn build(&self, context: &CheckContext) -> Result<Arc<dyn Check>, CheckError> {
        let settings = context.settings().clone();
        let check: Arc<dyn Check> = match self {
            CheckSpec::CmakeBuild { cmake_options } => {
                Arc::new(CMakeBuildCheck::new(settings, cmake_options.clone()))
            }
            CheckSpec::MakeTest => Arc::new(MakeTestCheck::new(settings)),
            CheckSpec::ClangFormat { extensions } => {
                Arc::new(ClangFormatCheck::new(settings, extensions.clone()))
            }
            CheckSpec::CodeCoverage { min_coverage } => {
                Arc::new(CodeCoverageCheck::new(settings, *min_coverage))
            }
            CheckSpec::ClangTidy => Arc::new(ClangTidyCheck::new(settings)),
            CheckSpec::CleanRepo { max_source_files } => {
                Arc::new(CleanRepoCheck::new(settings, *max_source_files))
            }
            CheckSpec::Oop => Arc::new(OopCheck::new(settings)),
            CheckSpec::CiStatus { branch } => {
                let branch = branch
                    .clone()
                    .unwrap_or_else(|| settings.default_branch().to_string());
                Arc::new(CiStatusCheck::new(context.forge()?, context.projects().clone(), branch))
            }
            CheckSpec::Command { command } => Arc::new(CommandCheck::new(settings, command.clone())),
        };
        Ok(check)
    }
}

/// An invocation of an external tool, looked up in the configured tool
/// folders first and bound to the command deadline.
pub(crate) fn tool(settings: &Settings, program: &str) -> Invocation {
    Invocation::new(program)
        .search_dirs(settings.tool_dirs().iter().cloned())
        .deadline(settings.command_timeout())
}

/// How an external step of a check ended.
pub(crate) enum StepResult {
    /// The process ran to completion, successfully or not.
    Finished(Collected),
    /// The process could not run or was killed; the payload is the comment
    /// to score 0 with.
    Aborted(String),
}

/// Runs one external step of a check, turning spawn failures and timeouts
/// into a comment instead of an error.
pub(crate) async fn run_step(invocation: Invocation) -> StepResult {
    match invocation.run().await {
        Ok(collected) => StepResult::Finished(collected),
        Err(err @ ProcessError::TimedOut { .. }) => {
            warn!("{err}");
            StepResult::Aborted(format!("`{}` timed out", program_of(&err)))
        }
        Err(err) => {
            warn!("{err}");
            StepResult::Aborted(err.to_string())
        }
    }
}

/// Program named in a process error.
fn program_of(err: &ProcessError) -> &str {
    match err {
        ProcessError::NotFound { program }
        | ProcessError::Spawn { program, .. }
        | ProcessError::TimedOut { program, .. }
        | ProcessError::Io { program, .. } => program,
    }
}
