#![allow(dead_code)]

use std::{
    collections::HashMap,
    fs,
    path::Path,
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
};

use async_trait::async_trait;
use chrono::NaiveDate;
use git2::{Commit, Oid, Repository, Signature, Time};
use hwgrader::{
    Checkout,
    evaluation::{Check, CheckError, CheckOutcome},
    forge::{
        FileAction, Forge, ForgeError, ForgeGroup, ForgeProject, ForgeUser, IssueState, NewIssue,
        NewProject, Pipeline, Upload,
    },
};

/// Noon UTC of the given day, as a unix timestamp.
pub fn noon(year: i32, month: u32, day: u32) -> i64 {
    NaiveDate::from_ymd_opt(year, month, day)
        .unwrap()
        .and_hms_opt(12, 0, 0)
        .unwrap()
        .and_utc()
        .timestamp()
}

/// Writes `files` into the working copy, stages them and commits at
/// `seconds` on top of HEAD.
pub fn commit_at(repo: &Repository, files: &[(&str, &str)], message: &str, seconds: i64) -> Oid {
    let root = repo.workdir().unwrap().to_path_buf();
    let mut index = repo.index().unwrap();
    for (path, contents) in files {
        let full = root.join(path);
        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&full, contents).unwrap();
        index.add_path(Path::new(path)).unwrap();
    }
    index.write().unwrap();
    let tree = repo.find_tree(index.write_tree().unwrap()).unwrap();

    let signature = Signature::new("Student", "student@example.com", &Time::new(seconds, 0)).unwrap();
    let parents: Vec<Commit<'_>> = repo
        .head()
        .ok()
        .and_then(|head| head.target())
        .map(|oid| repo.find_commit(oid).unwrap())
        .into_iter()
        .collect();
    let parents: Vec<&Commit<'_>> = parents.iter().collect();

    repo.commit(Some("HEAD"), &signature, &signature, message, &tree, &parents)
        .unwrap()
}

/// A checkout bound to a made up project.
pub fn checkout(path: &Path) -> Checkout {
    Checkout::new(path, ForgeProject::new(7, "group", "https://gitlab.example.com/course/group"))
}

/// A check with a fixed outcome that counts how often it ran.
#[derive(Clone)]
pub struct FixedCheck {
    pub outcome: CheckOutcome,
    pub runs:    Arc<AtomicUsize>,
}

impl FixedCheck {
    pub fn new(outcome: CheckOutcome) -> Self {
        Self {
            outcome,
            runs: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn runs(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Check for FixedCheck {
    async fn execute(&self, _checkout: &Checkout) -> Result<CheckOutcome, CheckError> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        Ok(self.outcome.clone())
    }
}

/// A check that always raises.
pub struct BrokenCheck;

#[async_trait]
impl Check for BrokenCheck {
    async fn execute(&self, _checkout: &Checkout) -> Result<CheckOutcome, CheckError> {
        Err(CheckError::NoForge)
    }
}

/// An in-memory forge.
#[derive(Default)]
pub struct FakeForge {
    /// Project id to pipelines, most recent first.
    pub pipelines:     HashMap<u64, Vec<Pipeline>>,
    /// Project ids whose calls fail.
    pub failing:       Vec<u64>,
    /// Notes posted, as (project, issue, body).
    pub notes:         Mutex<Vec<(u64, u64, String)>>,
    /// State changes applied, as (project, issue, state).
    pub state_changes: Mutex<Vec<(u64, u64, IssueState)>>,
    /// Registered users, by email.
    pub users:         HashMap<String, ForgeUser>,
    /// Projects created, in order; ids start at 100.
    pub created:       Mutex<Vec<NewProject>>,
    /// Runners enabled, as (project, runner).
    pub runners:       Mutex<Vec<(u64, u64)>>,
    /// Branches protected, as (project, branch).
    pub protected:     Mutex<Vec<(u64, String)>>,
    /// Commits made, as (project, branch, message, actions).
    pub commits:       Mutex<Vec<(u64, String, String, Vec<FileAction>)>>,
    /// Issues opened, as (project, issue).
    pub issues:        Mutex<Vec<(u64, NewIssue)>>,
    /// Files uploaded, as (project, file name, size).
    pub uploads:       Mutex<Vec<(u64, String, usize)>>,
    /// Members added, as (project, user, access level).
    pub members:       Mutex<Vec<(u64, u64, u32)>>,
}

impl FakeForge {
    pub fn with_pipeline(mut self, project: u64, status: &str) -> Self {
        let pipelines = self.pipelines.entry(project).or_default();
        let id = pipelines.len() as u64 + 1;
        pipelines.push(Pipeline {
            id,
            status:  status.to_string(),
            git_ref: "master".to_string(),
        });
        self
    }

    pub fn with_user(mut self, id: u64, email: &str) -> Self {
        self.users.insert(email.to_string(), ForgeUser {
            id,
            username: email.split('@').next().unwrap().to_string(),
            name: String::new(),
        });
        self
    }

    pub fn failing_for(mut self, project: u64) -> Self {
        self.failing.push(project);
        self
    }

    fn check(&self, project: u64) -> Result<(), ForgeError> {
        if self.failing.contains(&project) {
            Err(ForgeError::Status {
                url:    format!("projects/{project}"),
                status: 404,
                body:   "not found".to_string(),
            })
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl Forge for FakeForge {
    async fn project(&self, id: u64) -> Result<ForgeProject, ForgeError> {
        self.check(id)?;
        Ok(ForgeProject::new(id, format!("project-{id}"), format!("https://gitlab.example.com/{id}")))
    }

    async fn pipelines(&self, project_id: u64, _branch: &str) -> Result<Vec<Pipeline>, ForgeError> {
        self.check(project_id)?;
        Ok(self.pipelines.get(&project_id).cloned().unwrap_or_default())
    }

    async fn create_issue_note(
        &self,
        project_id: u64,
        issue_iid: u64,
        body: &str,
    ) -> Result<(), ForgeError> {
        self.check(project_id)?;
        self.notes
            .lock()
            .unwrap()
            .push((project_id, issue_iid, body.to_string()));
        Ok(())
    }

    async fn set_issue_state(
        &self,
        project_id: u64,
        issue_iid: u64,
        state: IssueState,
    ) -> Result<(), ForgeError> {
        self.check(project_id)?;
        self.state_changes
            .lock()
            .unwrap()
            .push((project_id, issue_iid, state));
        Ok(())
    }

    async fn group(&self, id: u64) -> Result<ForgeGroup, ForgeError> {
        Ok(ForgeGroup {
            id,
            path: format!("course-{id}"),
        })
    }

    async fn create_project(&self, project: &NewProject) -> Result<ForgeProject, ForgeError> {
        let mut created = self.created.lock().unwrap();
        let id = 100 + created.len() as u64;
        self.check(id)?;
        created.push(project.clone());
        Ok(ForgeProject::new(id, project.name.clone(), format!("https://gitlab.example.com/{id}")))
    }

    async fn enable_runner(&self, project_id: u64, runner_id: u64) -> Result<(), ForgeError> {
        self.check(project_id)?;
        self.runners.lock().unwrap().push((project_id, runner_id));
        Ok(())
    }

    async fn protect_branch(&self, project_id: u64, branch: &str) -> Result<(), ForgeError> {
        self.check(project_id)?;
        self.protected
            .lock()
            .unwrap()
            .push((project_id, branch.to_string()));
        Ok(())
    }

    async fn create_commit(
        &self,
        project_id: u64,
        branch: &str,
        message: &str,
        actions: &[FileAction],
    ) -> Result<(), ForgeError> {
        self.check(project_id)?;
        self.commits.lock().unwrap().push((
            project_id,
            branch.to_string(),
            message.to_string(),
            actions.to_vec(),
        ));
        Ok(())
    }

    async fn create_issue(&self, project_id: u64, issue: &NewIssue) -> Result<(), ForgeError> {
        self.check(project_id)?;
        self.issues.lock().unwrap().push((project_id, issue.clone()));
        Ok(())
    }

    async fn upload_file(
        &self,
        project_id: u64,
        file_name: &str,
        contents: Vec<u8>,
    ) -> Result<Upload, ForgeError> {
        self.check(project_id)?;
        self.uploads
            .lock()
            .unwrap()
            .push((project_id, file_name.to_string(), contents.len()));
        let url = format!("/uploads/{project_id}/{file_name}");
        Ok(Upload {
            markdown: format!("![{file_name}]({url})"),
            url,
        })
    }

    async fn search_users(&self, query: &str) -> Result<Vec<ForgeUser>, ForgeError> {
        Ok(self.users.get(query).cloned().into_iter().collect())
    }

    async fn add_member(
        &self,
        project_id: u64,
        user_id: u64,
        access_level: u32,
    ) -> Result<(), ForgeError> {
        self.check(project_id)?;
        self.members
            .lock()
            .unwrap()
            .push((project_id, user_id, access_level));
        Ok(())
    }
}
