#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! Setting up a course on the forge: one repository per group, starter
//! files, homework issues and group members.

use std::{
    collections::HashMap,
    fs,
    future::Future,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result, bail};
use bon::Builder;
use chrono::NaiveDate;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::{
    checkout::{RepoEntry, write_repo_entries},
    config::Settings,
    forge::{DEVELOPER_ACCESS, FileAction, Forge, NewIssue, NewProject},
    util::walk_files,
};

/// Choices in a group formation export that do not name a group.
const INVALID_GROUP_CHOICES: [&str; 2] = ["Not answered yet", "Choice"];

/// Header of the first name column of a group formation export.
const FIRST_NAME_COLUMN: &str = "First name";

/// Header of the surname column.
const SURNAME_COLUMN: &str = "Surname";

/// Header of the email column.
const EMAIL_COLUMN: &str = "Email address";

/// Header of the group choice column.
const CHOICE_COLUMN: &str = "Choice";

/// Runs `action` for every repository. Failures are logged and the first one
/// is returned once all repositories were tried.
pub(crate) async fn for_each_repo<'a, F, Fut>(
    entries: &'a [RepoEntry],
    what: &str,
    mut action: F,
) -> Result<()>
where
    F: FnMut(&'a RepoEntry) -> Fut,
    Fut: Future<Output = Result<()>>,
{
    let mut first_error = None;

    for entry in entries {
        match action(entry)
            .await
            .with_context(|| format!("Failed to {what} for {}", entry.name))
        {
            Ok(()) => info!("Done: {what} for {}", entry.name),
            Err(err) => {
                warn!("{err:#}");
                first_error.get_or_insert(err);
            }
        }
    }

    first_error.map_or(Ok(()), Err)
}

/// Commit actions creating every file below `source`, paths relative to it.
///
/// Files that are not valid UTF-8 cannot be sent as text and are skipped.
pub fn file_actions(source: &Path) -> Result<Vec<FileAction>> {
    if !source.is_dir() {
        bail!("{} is not a folder", source.display());
    }

    let mut files = walk_files(source, &[]);
    files.sort();

    let mut actions = Vec::with_capacity(files.len());
    for path in files {
        let Ok(relative) = path.strip_prefix(source) else {
            continue;
        };
        let file_path = relative
            .components()
            .map(|part| part.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        match fs::read_to_string(&path) {
            Ok(content) => actions.push(FileAction { file_path, content }),
            Err(err) => warn!("Skipping {}: {err}", path.display()),
        }
    }
    Ok(actions)
}

/// The repositories to create for a course.
#[derive(Debug, Clone, Builder)]
#[builder(on(String, into))]
pub struct RepoBatch {
    /// Repositories are named `{base_name}_{n}`.
    base_name: String,
    /// Group the repositories are created in.
    group_id:  u64,
    /// Number of repositories.
    #[builder(default = 1)]
    count:     u32,
    /// Folder committed as the initial contents, if any.
    source:    Option<PathBuf>,
}

/// Creates the repositories of `batch`: each gets the configured runner, the
/// starter files as its initial commit and a protected default branch.
pub async fn create_repos(forge: &dyn Forge, settings: &Settings, batch: &RepoBatch) -> Result<Vec<RepoEntry>> {
    let actions = match &batch.source {
        Some(source) => file_actions(source)?,
        None => Vec::new(),
    };
    let branch = settings.default_branch();

    let mut entries = Vec::with_capacity(batch.count as usize);
    for n in 1..=batch.count {
        let request = NewProject {
            name:                   format!("{}_{n}", batch.base_name),
            description:            format!("Homework Group {n}"),
            namespace_id:           batch.group_id,
            jobs_enabled:           true,
            approvals_before_merge: 1,
        };
        let project = forge
            .create_project(&request)
            .await
            .with_context(|| format!("Failed to create {}", request.name))?;
        info!("Created {} ({})", project.name, project.id);

        if let Some(runner) = settings.runner_id() {
            forge
                .enable_runner(project.id, runner)
                .await
                .with_context(|| format!("Failed to enable runner {runner} for {}", project.name))?;
        }
        if !actions.is_empty() {
            forge
                .create_commit(project.id, branch, "Initial commit", &actions)
                .await
                .with_context(|| format!("Failed to commit starter files to {}", project.name))?;
        }
        forge
            .protect_branch(project.id, branch)
            .await
            .with_context(|| format!("Failed to protect {branch} of {}", project.name))?;

        entries.push(RepoEntry {
            name: project.name,
            id:   project.id,
        });
    }

    Ok(entries)
}

/// Creates the repositories and writes their checkout registry to
/// `{registry_dir}/{group path}.json`, returning that path.
pub async fn create_repos_registry(
    forge: &dyn Forge,
    settings: &Settings,
    batch: &RepoBatch,
    registry_dir: &Path,
) -> Result<PathBuf> {
    let group = forge
        .group(batch.group_id)
        .await
        .with_context(|| format!("Failed to look up group {}", batch.group_id))?;
    let entries = create_repos(forge, settings, batch).await?;

    let path = registry_dir.join(format!("{}.json", group.path));
    write_repo_entries(&path, &entries)?;
    info!("Wrote {} repositories to {}", entries.len(), path.display());
    Ok(path)
}

/// Commits every file below `source` to the default branch of every
/// repository, with the message `Add {folder name}`.
pub async fn upload_files(
    forge: &dyn Forge,
    settings: &Settings,
    entries: &[RepoEntry],
    source: &Path,
) -> Result<()> {
    let actions = file_actions(source)?;
    if actions.is_empty() {
        warn!("No files to upload in {}", source.display());
        return Ok(());
    }
    let folder = source
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| source.display().to_string());
    let message = format!("Add {folder}");
    let branch = settings.default_branch();

    for_each_repo(entries, "upload files", |entry| {
        let (actions, message) = (&actions, &message);
        async move {
            forge.create_commit(entry.id, branch, message, actions).await?;
            Ok(())
        }
    })
    .await
}

/// One homework task as written in an issue file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct IssueTemplate {
    /// Issue title.
    pub title:         String,
    /// Markdown body.
    pub description:   String,
    /// Appended under a `## Documentation` heading, if set.
    #[serde(default)]
    pub documentation: Option<String>,
    /// Files uploaded with the issue. Each path, as written here, is replaced
    /// by the uploaded file's URL in the description.
    #[serde(default)]
    pub attachments:   Vec<PathBuf>,
}

/// An issue file: `[[issues]]` tables.
#[derive(Debug, Clone, Deserialize)]
pub struct IssueFile {
    /// The tasks, in the order they are opened.
    pub issues: Vec<IssueTemplate>,
}

impl IssueFile {
    /// Reads an issue file. Attachment paths are resolved relative to it.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read issue file {}", path.display()))?;
        let mut file: IssueFile = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse issue file {}", path.display()))?;

        let folder = path.parent().unwrap_or(Path::new("."));
        for issue in &mut file.issues {
            for attachment in &mut issue.attachments {
                if attachment.is_relative() {
                    *attachment = folder.join(&*attachment);
                }
            }
        }
        Ok(file)
    }
}

/// How the issues of one homework are labelled and scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HomeworkIssues {
    /// Homework number, used for the `homework::{n}` label.
    pub homework: u32,
    /// Due date of every issue, if any.
    pub due_date: Option<NaiveDate>,
}

/// Attachment read into memory.
struct Attachment {
    /// Path as it appears in the description.
    reference: String,
    /// File name sent to the forge.
    file_name: String,
    /// File contents.
    contents:  Vec<u8>,
}

/// Reads the attachments of `issue`, referenced relative to `base`.
fn read_attachments(issue: &IssueTemplate, base: &Path) -> Result<Vec<Attachment>> {
    issue
        .attachments
        .iter()
        .map(|path| {
            let contents = fs::read(path).with_context(|| format!("Failed to read attachment {}", path.display()))?;
            let reference = path.strip_prefix(base).unwrap_or(path).to_string_lossy().into_owned();
            let file_name = path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|| reference.clone());
            Ok(Attachment {
                reference,
                file_name,
                contents,
            })
        })
        .collect()
}

/// Opens every issue in every repository, labelled `homework::{n}`.
///
/// Attachments are uploaded to each repository and their paths in the
/// description, relative to `base` (the issue file's folder), are replaced by
/// the uploaded URLs.
pub async fn create_issues(
    forge: &dyn Forge,
    entries: &[RepoEntry],
    issues: &[IssueTemplate],
    base: &Path,
    homework: HomeworkIssues,
) -> Result<()> {
    let attachments = issues
        .iter()
        .map(|issue| read_attachments(issue, base))
        .collect::<Result<Vec<_>>>()?;
    let label = format!("homework::{}", homework.homework);

    for_each_repo(entries, "create issues", |entry| {
        let (attachments, label) = (&attachments, &label);
        async move {
            for (issue, files) in issues.iter().zip(attachments) {
                let mut description = issue.description.clone();
                for file in files {
                    let upload = forge
                        .upload_file(entry.id, &file.file_name, file.contents.clone())
                        .await?;
                    description = description.replace(&file.reference, &upload.url);
                }
                if let Some(documentation) = &issue.documentation {
                    description.push_str("\n## Documentation\n");
                    description.push_str(documentation);
                }

                forge
                    .create_issue(entry.id, &NewIssue {
                        title: issue.title.clone(),
                        description,
                        due_date: homework.due_date,
                        labels: vec![label.clone()],
                    })
                    .await?;
                debug!("Opened `{}` in {}", issue.title, entry.name);
            }
            Ok(())
        }
    })
    .await
}

/// A student's row of a group formation export.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StudentChoice {
    /// First name.
    pub first_name: String,
    /// Surname.
    pub surname:    String,
    /// Email address, used to find the forge account.
    pub email:      String,
    /// Chosen group number.
    pub group:      u32,
}

impl StudentChoice {
    /// Full name.
    pub fn name(&self) -> String {
        format!("{} {}", self.first_name, self.surname)
    }
}

/// Parses a group formation export: `,` or `;` separated with the columns
/// `First name`, `Surname`, `Email address` and `Choice`. Choices look like
/// `Group 3`; rows without a valid choice are skipped.
pub fn parse_student_groups(text: &str) -> Result<Vec<StudentChoice>> {
    /// Splits a row and strips blanks and quotes around each field.
    fn fields(line: &str) -> Vec<&str> {
        line.split([',', ';'])
            .map(|field| field.trim().trim_matches('"').trim())
            .collect()
    }

    let mut lines = text.lines().filter(|line| !line.trim().is_empty());
    let header = fields(lines.next().unwrap_or_default().trim_start_matches('\u{feff}'));
    let column = |name: &str| {
        header
            .iter()
            .position(|field| *field == name)
            .with_context(|| format!("Group formation file has no `{name}` column"))
    };
    let (first, last, email, choice) = (
        column(FIRST_NAME_COLUMN)?,
        column(SURNAME_COLUMN)?,
        column(EMAIL_COLUMN)?,
        column(CHOICE_COLUMN)?,
    );

    let mut students = Vec::new();
    for line in lines {
        let row = fields(line);
        let field = |index: usize| row.get(index).copied().unwrap_or_default();
        let chosen = field(choice);
        if chosen.is_empty() || INVALID_GROUP_CHOICES.contains(&chosen) {
            debug!("Skipping {} without a group", field(email));
            continue;
        }
        let Some(group) = chosen.split(' ').nth(1).and_then(|number| number.parse().ok()) else {
            warn!("Skipping {}: cannot read a group from `{chosen}`", field(email));
            continue;
        };

        students.push(StudentChoice {
            first_name: field(first).to_string(),
            surname: field(last).to_string(),
            email: field(email).to_string(),
            group,
        });
    }
    Ok(students)
}

/// Reads and parses a group formation export.
pub fn read_student_groups(path: &Path) -> Result<Vec<StudentChoice>> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read group formation file {}", path.display()))?;
    parse_student_groups(&text).with_context(|| format!("Failed to parse {}", path.display()))
}

/// Group number of a repository named `{base}_{n}`.
pub fn group_number(repo_name: &str) -> Option<u32> {
    repo_name.rsplit('_').next()?.parse().ok()
}

/// Adds every student as a developer to the repository of their group.
///
/// Students without a forge account or without a matching repository are
/// reported and skipped. Forge failures are reported per student and the first
/// one is returned once all students were tried.
pub async fn add_users(forge: &dyn Forge, entries: &[RepoEntry], students: &[StudentChoice]) -> Result<()> {
    let repos: HashMap<u32, &RepoEntry> = entries
        .iter()
        .filter_map(|entry| group_number(&entry.name).map(|group| (group, entry)))
        .collect();
    let mut first_error = None;

    for student in students {
        let Some(entry) = repos.get(&student.group) else {
            warn!("No repository for group {} of {}", student.group, student.name());
            continue;
        };

        let outcome = async {
            let users = forge.search_users(&student.email).await?;
            let Some(user) = users.first() else {
                warn!("No forge account for {} ({})", student.name(), student.email);
                return anyhow::Ok(());
            };
            forge.add_member(entry.id, user.id, DEVELOPER_ACCESS).await?;
            info!("Added {} to {}", user.username, entry.name);
            Ok(())
        }
        .await
        .with_context(|| format!("Failed to add {} to {}", student.name(), entry.name));

        if let Err(err) = outcome {
            warn!("{err:#}");
            first_error.get_or_insert(err);
        }
    }

    first_error.map_or(Ok(()), Err)
}
