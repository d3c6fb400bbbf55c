#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

use std::{
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::{Context, Result};
use bon::Builder;
use chrono::NaiveDate;
use tracing::{debug, info, warn};

use crate::{
    checkout::{Checkout, RepoEntry, fetch_checkouts, read_repo_entries},
    config::Settings,
    git,
    course::{
        HomeworkIssues, IssueFile, add_users, create_issues, for_each_repo, read_student_groups,
        upload_files,
    },
    diff::{create_diffs, write_diff_reports, write_inactive_summary},
    evaluation::{
        CheckContext, JobDefinitionFile, StaticRegistry, evaluate_code, summary_table,
        write_evaluation_reports,
    },
    forge::{Forge, GitLab, IssueState},
    util::copy_dir_all,
};

/// Creates the forge client for the configured server.
pub fn connect(settings: &Settings, token: &str) -> Result<Arc<dyn Forge>> {
    Ok(Arc::new(GitLab::new(settings.forge_url(), token)?))
}

/// Clones or pulls every repository listed in `repos_file` into `workspace`.
pub async fn fetch(
    settings: &Settings,
    forge: &dyn Forge,
    token: &str,
    workspace: &Path,
    repos_file: &Path,
) -> Result<Vec<Checkout>> {
    let entries = read_repo_entries(repos_file)?;
    info!("Fetching {} repositories into {}", entries.len(), workspace.display());
    fetch_checkouts(workspace, &entries, forge, settings, token).await
}

/// What `evaluate` should grade and report on.
#[derive(Debug, Clone, Builder)]
pub struct EvaluateOptions {
    /// Homework (assignment) number.
    homework: u32,
    /// Job definition file; the built-in table if unset.
    jobs:     Option<PathBuf>,
    /// Diffs cover commits from this day on; no diffs if unset.
    since:    Option<NaiveDate>,
    /// Grade the state at the end of this day and stop diffs there.
    until:    Option<NaiveDate>,
}

/// Resolves the registry: a job definition file if given, the built-in table
/// otherwise.
pub fn load_registry(jobs: Option<&Path>, context: &CheckContext) -> Result<StaticRegistry> {
    match jobs {
        Some(path) => {
            let definitions = JobDefinitionFile::load(path)?;
            info!("Using job definitions from {}", definitions.path().display());
            definitions
                .into_registry(context)
                .with_context(|| format!("Failed to set up jobs from {}", path.display()))
        }
        None => Ok(StaticRegistry::default_catalog(context)?),
    }
}

/// Grades every checkout, writes the evaluation reports, prints the summary
/// table, then writes the diff reports and the inactive summary.
pub async fn evaluate(
    settings: &Settings,
    forge: Arc<dyn Forge>,
    checkouts: &[Checkout],
    workspace: &Path,
    options: &EvaluateOptions,
) -> Result<()> {
    let context = CheckContext::new(settings.clone())
        .with_checkouts(checkouts)
        .with_forge(forge);
    let registry = load_registry(options.jobs.as_deref(), &context)?;

    let reports = evaluate_code(&registry, checkouts, options.homework, options.until)
        .await
        .with_context(|| format!("Failed to evaluate homework {}", options.homework))?;
    write_evaluation_reports(&reports, &format!("homework-{}-report", options.homework))?;
    for report in &reports {
        debug!("\n{}", report.results_table());
    }
    eprintln!("{}", summary_table(&reports));

    let repo_paths: Vec<PathBuf> = checkouts
        .iter()
        .map(|checkout| checkout.local_path().to_path_buf())
        .collect();
    let diffs = create_diffs(
        &repo_paths,
        options.since,
        options.until,
        Some(Path::new(settings.build_folder())),
    )
    .context("Failed to create diffs")?;
    write_diff_reports(&diffs, &format!("homework-{}-diff", options.homework))?;

    match options.since {
        Some(since) => {
            let summary = write_inactive_summary(&diffs, workspace, since)?;
            info!("Wrote {}", summary.display());
        }
        None => info!("No --since date given, skipping diffs"),
    }

    Ok(())
}

/// The text to post: the contents of `message` if it names a Markdown file,
/// otherwise `message` itself.
pub fn resolve_message(message: &str) -> Result<String> {
    let path = Path::new(message);
    if path.extension().is_some_and(|ext| ext == "md") && path.is_file() {
        fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
    } else {
        Ok(message.to_string())
    }
}

/// Adds `body` as a note to issue `issue` of every repository and optionally
/// closes or reopens it. Failures are reported per repository and the first
/// one is returned once all repositories were tried.
pub async fn comment(
    forge: &dyn Forge,
    entries: &[RepoEntry],
    issue: u64,
    body: &str,
    state: Option<IssueState>,
) -> Result<()> {
    for_each_repo(entries, &format!("comment on issue {issue}"), |entry| async move {
        forge.create_issue_note(entry.id, issue, body).await?;
        if let Some(state) = state {
            forge.set_issue_state(entry.id, issue, state).await?;
        }
        Ok(())
    })
    .await
}

/// Reads the repository list and comments on all of them.
pub async fn comment_all(
    forge: &dyn Forge,
    repos_file: &Path,
    issue: u64,
    message: &str,
    state: Option<IssueState>,
) -> Result<()> {
    let entries = read_repo_entries(repos_file)?;
    let body = resolve_message(message)?;
    comment(forge, &entries, issue, &body, state).await
}

/// Opens the issues of `issue_file` in every listed repository.
pub async fn create_issues_all(
    forge: &dyn Forge,
    repos_file: &Path,
    issue_file: &Path,
    homework: HomeworkIssues,
) -> Result<()> {
    let entries = read_repo_entries(repos_file)?;
    let issues = IssueFile::load(issue_file)?;
    let base = issue_file.parent().unwrap_or(Path::new("."));
    info!("Opening {} issues in {} repositories", issues.issues.len(), entries.len());
    create_issues(forge, &entries, &issues.issues, base, homework).await
}

/// Commits the files below `source` to every listed repository.
pub async fn upload_files_all(
    settings: &Settings,
    forge: &dyn Forge,
    repos_file: &Path,
    source: &Path,
) -> Result<()> {
    let entries = read_repo_entries(repos_file)?;
    upload_files(forge, settings, &entries, source).await
}

/// Adds the students of a group formation export to their repositories.
pub async fn add_users_all(forge: &dyn Forge, repos_file: &Path, groups_file: &Path) -> Result<()> {
    let entries = read_repo_entries(repos_file)?;
    let students = read_student_groups(groups_file)?;
    info!("Adding {} students to {} repositories", students.len(), entries.len());
    add_users(forge, &entries, &students).await
}

/// Copies `source` (if given) into every checkout, then commits everything
/// that changed and pushes it. Checkouts without changes are left alone.
pub async fn publish_changes(checkouts: &[Checkout], source: Option<&Path>, message: &str) -> Result<()> {
    let mut first_error = None;

    for checkout in checkouts {
        let outcome = async {
            if let Some(source) = source {
                copy_dir_all(source, checkout.local_path())?;
            }
            Ok::<_, anyhow::Error>(git::commit_and_push(checkout.local_path(), message).await?)
        }
        .await
        .with_context(|| format!("Failed to commit changes to {}", checkout.name()));

        match outcome {
            Ok(true) => info!("Pushed changes to {}", checkout.name()),
            Ok(false) => info!("Nothing to commit in {}", checkout.name()),
            Err(err) => {
                warn!("{err:#}");
                first_error.get_or_insert(err);
            }
        }
    }

    first_error.map_or(Ok(()), Err)
}
