#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{
    config::Settings,
    forge::{Forge, ForgeProject},
    git,
};

/// One line of the checkout registry file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoEntry {
    /// Group name, used as the local folder name.
    pub name: String,
    /// Forge project id.
    pub id:   u64,
}

/// Reads the JSON checkout registry at `path`.
pub fn read_repo_entries(path: &Path) -> Result<Vec<RepoEntry>> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("Could not read checkout registry {}", path.display()))?;
    serde_json::from_str(&contents)
        .with_context(|| format!("Could not parse checkout registry {}", path.display()))
}

/// Writes `entries` as a pretty printed checkout registry to `path`, creating
/// its folder if needed.
pub fn write_repo_entries(path: &Path, entries: &[RepoEntry]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Could not create {}", parent.display()))?;
    }
    let json = serde_json::to_string_pretty(entries).context("Could not serialize checkout registry")?;
    fs::write(path, json + "\n")
        .with_context(|| format!("Could not write checkout registry {}", path.display()))
}

/// A local working copy bound to its forge project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Checkout {
    /// Root of the working copy.
    local_path: PathBuf,
    /// Project the working copy was fetched from.
    project:    ForgeProject,
}

impl Checkout {
    /// Binds `local_path` to `project`.
    pub fn new(local_path: impl Into<PathBuf>, project: ForgeProject) -> Self {
        Self {
            local_path: local_path.into(),
            project,
        }
    }

    /// Root of the working copy.
    pub fn local_path(&self) -> &Path {
        &self.local_path
    }

    /// The forge project.
    pub fn project(&self) -> &ForgeProject {
        &self.project
    }

    /// Name of the local folder, which is also the key used to find the
    /// forge project of a checkout.
    pub fn name(&self) -> String {
        self.local_path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// Browser URL of the project.
    pub fn url(&self) -> &str {
        &self.project.web_url
    }
}

/// Clones or updates every checkout listed in `entries` below `workspace`.
///
/// In CI mode the repositories are pulled through a token-authenticated URL;
/// otherwise existing checkouts are pulled and missing ones cloned.
pub async fn fetch_checkouts(
    workspace: &Path,
    entries: &[RepoEntry],
    forge: &dyn Forge,
    settings: &Settings,
    token: &str,
) -> Result<Vec<Checkout>> {
    let mut checkouts = Vec::with_capacity(entries.len());

    for entry in entries {
        let project = forge
            .project(entry.id)
            .await
            .with_context(|| format!("Could not look up project {} ({})", entry.id, entry.name))?;
        let local_path = workspace.join(&entry.name);

        let fetched = if settings.ci_mode() {
            info!("Pulling {} with CI credentials", entry.name);
            git::fetch_from(
                &local_path,
                &project.http_url_to_repo,
                settings.default_branch(),
                token,
            )
            .await
        } else if git::is_repo(&local_path) {
            info!("Pulling {}", entry.name);
            git::pull(&local_path, settings.default_branch()).await
        } else {
            info!("Cloning {}", entry.name);
            let url = if project.ssh_url_to_repo.is_empty() {
                &project.http_url_to_repo
            } else {
                &project.ssh_url_to_repo
            };
            git::clone(url, &local_path, settings.default_branch()).await
        };
        fetched.with_context(|| format!("Could not fetch {}", entry.name))?;

        checkouts.push(Checkout::new(local_path, project));
    }

    Ok(checkouts)
}
