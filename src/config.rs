#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

use std::{path::PathBuf, time::Duration};

/// Forge server used when `HWGRADER_FORGE_URL` is unset.
pub const DEFAULT_FORGE_URL: &str = "https://gitlab.lrz.de/";

/// Branch graded and pulled when `HWGRADER_DEFAULT_BRANCH` is unset.
pub const DEFAULT_BRANCH: &str = "master";

/// Build output folder created inside every checkout.
pub const DEFAULT_BUILD_FOLDER: &str = "hw_build";

/// Runtime configuration shared by the registry, the checks, the evaluator and
/// the diff reporter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Base URL of the forge server.
    forge_url:        String,
    /// Branch used for fetching and CI status lookups.
    default_branch:   String,
    /// Name of the build output folder inside a checkout.
    build_folder:     String,
    /// Directory with CMake modules injected by the structural-lint check.
    cmake_module_dir: Option<PathBuf>,
    /// Deadline applied to every external command, if any.
    command_timeout:  Option<Duration>,
    /// Pull through a token-authenticated URL instead of clone/pull.
    ci_mode:          bool,
    /// Folders searched for external tools before `PATH`.
    tool_dirs:        Vec<PathBuf>,
    /// CI runner enabled for newly created repositories.
    runner_id:        Option<u64>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            forge_url:        DEFAULT_FORGE_URL.to_string(),
            default_branch:   DEFAULT_BRANCH.to_string(),
            build_folder:     DEFAULT_BUILD_FOLDER.to_string(),
            cmake_module_dir: None,
            command_timeout:  None,
            ci_mode:          false,
            tool_dirs:        Vec::new(),
            runner_id:        None,
        }
    }
}

impl Settings {
    /// Reads the settings from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds settings from an arbitrary key lookup, falling back to the
    /// defaults for missing or blank values.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let read = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_owned())
                .filter(|value| !value.is_empty())
        };
        let defaults = Self::default();

        Self {
            forge_url:        read("HWGRADER_FORGE_URL").unwrap_or(defaults.forge_url),
            default_branch:   read("HWGRADER_DEFAULT_BRANCH").unwrap_or(defaults.default_branch),
            build_folder:     read("HWGRADER_BUILD_FOLDER").unwrap_or(defaults.build_folder),
            cmake_module_dir: read("HWGRADER_CMAKE_MODULE_DIR").map(PathBuf::from),
            command_timeout:  read_timeout_secs(read("HWGRADER_COMMAND_TIMEOUT_SECS")),
            ci_mode:          read("HWGRADER_CI_MODE").is_some(),
            tool_dirs:        read("HWGRADER_TOOL_PATH")
                .map(|paths| std::env::split_paths(&paths).collect())
                .unwrap_or_default(),
            runner_id:        read("HWGRADER_RUNNER_ID").and_then(|id| id.parse().ok()),
        }
    }

    /// Returns the forge base URL.
    pub fn forge_url(&self) -> &str {
        &self.forge_url
    }

    /// Returns the default branch.
    pub fn default_branch(&self) -> &str {
        &self.default_branch
    }

    /// Returns the build output folder name.
    pub fn build_folder(&self) -> &str {
        &self.build_folder
    }

    /// Returns the CMake module directory, if configured.
    pub fn cmake_module_dir(&self) -> Option<&PathBuf> {
        self.cmake_module_dir.as_ref()
    }

    /// Returns the external command deadline, if configured.
    pub fn command_timeout(&self) -> Option<Duration> {
        self.command_timeout
    }

    /// Whether fetching should use token-authenticated pulls.
    pub fn ci_mode(&self) -> bool {
        self.ci_mode
    }

    /// Folders searched for cmake, make, gcovr and clang-format before
    /// `PATH`.
    pub fn tool_dirs(&self) -> &[PathBuf] {
        &self.tool_dirs
    }

    /// CI runner to enable for new repositories, if any.
    pub fn runner_id(&self) -> Option<u64> {
        self.runner_id
    }

    /// Returns a copy with a different default branch.
    pub fn with_default_branch(mut self, branch: impl Into<String>) -> Self {
        self.default_branch = branch.into();
        self
    }

    /// Returns a copy with a different build folder.
    pub fn with_build_folder(mut self, build_folder: impl Into<String>) -> Self {
        self.build_folder = build_folder.into();
        self
    }

    /// Returns a copy with a CMake module directory.
    pub fn with_cmake_module_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cmake_module_dir = Some(dir.into());
        self
    }

    /// Returns a copy with a different command deadline.
    pub fn with_command_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.command_timeout = timeout;
        self
    }

    /// Returns a copy that enables `runner_id` for new repositories.
    pub fn with_runner_id(mut self, runner_id: u64) -> Self {
        self.runner_id = Some(runner_id);
        self
    }

    /// Returns a copy that looks for external tools in `dir` first.
    pub fn with_tool_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.tool_dirs.push(dir.into());
        self
    }
}

/// Parses a number of seconds into a `Duration`; unparsable or zero values
/// disable the deadline.
fn read_timeout_secs(value: Option<String>) -> Option<Duration> {
    value
        .and_then(|value| value.parse::<u64>().ok())
        .filter(|secs| *secs > 0)
        .map(Duration::from_secs)
}
