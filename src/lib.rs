//! # hwgrader
//!
//! Course homework tooling on top of a GitLab forge: fetch every group's
//! repository, grade it with a battery of dependency-aware checks, and report
//! what changed since the previous homework.

#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

/// Checkout registry files and local working copies bound to forge projects
pub mod checkout;
/// Subcommand implementations shared by the binary
pub mod commands;
/// Explicit runtime configuration resolved once at startup
pub mod config;
/// Course administration: repositories, issues, members and starter files
pub mod course;
/// Per-commit and aggregate diffs since a reference date
pub mod diff;
/// For all things related to grading a checkout
pub mod evaluation;
/// Forge (GitLab) REST boundary
pub mod forge;
/// Local version-control operations
pub mod git;
/// Spawning external tools with optional deadlines
pub mod process;
/// Utility functions for convenience
pub mod util;

pub use checkout::{Checkout, RepoEntry};
pub use config::Settings;
