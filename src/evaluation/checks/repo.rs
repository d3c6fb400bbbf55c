#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

use std::path::{Component, Path};

use async_trait::async_trait;
use tracing::debug;

use crate::{
    checkout::Checkout,
    config::Settings,
    evaluation::job::{Check, CheckError, CheckOutcome},
    util::{is_cpp, walk_files},
};

/// File names CMake writes into a build tree.
const DIRTY_FILE_NAMES: &[&str] = &["CMakeCache.txt", "cmake_install.cmake"];

/// Extensions of generated make and dependency files.
const DIRTY_EXTENSIONS: &[&str] = &["make", "includecache"];

/// Whether a path relative to the checkout root points into a CMake build
/// tree.
pub fn is_build_artifact(relative: &Path) -> bool {
    let file_name = relative
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or_default();
    let extension = relative
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or_default();

    let in_build_dir = relative
        .parent()
        .into_iter()
        .flat_map(Path::components)
        .filter_map(|component| match component {
            Component::Normal(name) => name.to_str(),
            _ => None,
        })
        .any(|dir| dir == "CMakeFiles" || dir.ends_with(".dir"));

    DIRTY_FILE_NAMES.contains(&file_name) || DIRTY_EXTENSIONS.contains(&extension) || in_build_dir
}

/// Fails if build output or too many third party sources were committed.
#[derive(Debug, Clone)]
pub struct CleanRepoCheck {
    /// Runtime configuration.
    settings:         Settings,
    /// Most C/C++ sources a checkout may hold.
    max_source_files: usize,
}

impl CleanRepoCheck {
    /// Default job name.
    pub const NAME: &'static str = "Clean Repo Check";

    /// Creates the check.
    pub fn new(settings: Settings, max_source_files: usize) -> Self {
        Self {
            settings,
            max_source_files,
        }
    }
}

#[async_trait]
impl Check for CleanRepoCheck {
    async fn execute(&self, checkout: &Checkout) -> Result<CheckOutcome, CheckError> {
        let root = checkout.local_path();
        let files = walk_files(root, &[self.settings.build_folder()]);

        if let Some(artifact) = files
            .iter()
            .filter_map(|path| path.strip_prefix(root).ok())
            .find(|relative| is_build_artifact(relative))
        {
            debug!("Build artifact committed: {}", artifact.display());
            return Ok(CheckOutcome::failed("Build files committed"));
        }

        let sources = files.iter().filter(|path| is_cpp(path)).count();
        if sources > self.max_source_files {
            debug!(sources, max = self.max_source_files, "too many source files");
            return Ok(CheckOutcome::failed("Committed too many third party source files"));
        }

        Ok(CheckOutcome::passed())
    }
}
