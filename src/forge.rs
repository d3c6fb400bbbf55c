#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

use std::{fmt, str::FromStr};

use anyhow::Context;
use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::{
    Client, RequestBuilder, Response, StatusCode,
    multipart::{Form, Part},
};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use tracing::debug;

/// A project on the forge, as returned by the projects API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForgeProject {
    /// Numeric project id.
    pub id:               u64,
    /// Project name.
    pub name:             String,
    /// Browser URL of the project.
    #[serde(default)]
    pub web_url:          String,
    /// HTTPS clone URL.
    #[serde(default)]
    pub http_url_to_repo: String,
    /// SSH clone URL.
    #[serde(default)]
    pub ssh_url_to_repo:  String,
}

impl ForgeProject {
    /// Creates a project reference without clone URLs.
    pub fn new(id: u64, name: impl Into<String>, web_url: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            web_url: web_url.into(),
            http_url_to_repo: String::new(),
            ssh_url_to_repo: String::new(),
        }
    }
}

/// A CI pipeline run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pipeline {
    /// Pipeline id.
    pub id:      u64,
    /// Status string such as `success`, `failed` or `running`.
    pub status:  String,
    /// Branch or tag the pipeline ran for.
    #[serde(rename = "ref", default)]
    pub git_ref: String,
}

/// A group (namespace) on the forge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForgeGroup {
    /// Numeric group id.
    pub id:   u64,
    /// URL path segment of the group.
    pub path: String,
}

/// A user account on the forge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForgeUser {
    /// Numeric user id.
    pub id:       u64,
    /// Login name.
    pub username: String,
    /// Display name.
    #[serde(default)]
    pub name:     String,
}

/// A file uploaded to a project, referable from issues.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Upload {
    /// Project relative URL of the file.
    pub url:      String,
    /// Ready-made Markdown link or image.
    #[serde(default)]
    pub markdown: String,
}

/// Access level of a project member allowed to push to unprotected branches.
pub const DEVELOPER_ACCESS: u32 = 30;

/// Access level of a project maintainer.
pub const MAINTAINER_ACCESS: u32 = 40;

/// A project to create.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewProject {
    /// Project name.
    pub name:                   String,
    /// Project description.
    pub description:            String,
    /// Group the project is created in.
    pub namespace_id:           u64,
    /// Whether CI jobs run.
    pub jobs_enabled:           bool,
    /// Approvals a merge request needs.
    pub approvals_before_merge: u32,
}

/// An issue to open.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewIssue {
    /// Issue title.
    pub title:       String,
    /// Markdown body.
    pub description: String,
    /// Due date, if any.
    pub due_date:    Option<NaiveDate>,
    /// Labels to attach.
    pub labels:      Vec<String>,
}

/// A file created by a commit made through the API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileAction {
    /// Path inside the repository, `/` separated.
    pub file_path: String,
    /// Text contents.
    pub content:   String,
}

/// State transitions that can be applied to an issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssueState {
    /// Close the issue.
    Close,
    /// Reopen the issue.
    Reopen,
}

impl IssueState {
    /// The `state_event` value understood by the issues API.
    pub fn as_event(self) -> &'static str {
        match self {
            IssueState::Close => "close",
            IssueState::Reopen => "reopen",
        }
    }
}

impl fmt::Display for IssueState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_event())
    }
}

impl FromStr for IssueState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "close" => Ok(IssueState::Close),
            "reopen" => Ok(IssueState::Reopen),
            other => Err(format!("unknown issue state `{other}`, expected close or reopen")),
        }
    }
}

/// Failures talking to the forge.
#[derive(thiserror::Error, Debug)]
pub enum ForgeError {
    /// The request never produced a response.
    #[error("request to {url} failed")]
    Transport {
        /// Requested URL.
        url:    String,
        /// Underlying client error.
        #[source]
        source: reqwest::Error,
    },
    /// The server answered with a non-success status.
    #[error("{url} answered with HTTP {status}: {body}")]
    Status {
        /// Requested URL.
        url:    String,
        /// HTTP status code.
        status: u16,
        /// Response body, for diagnostics.
        body:   String,
    },
    /// The response body did not match the expected shape.
    #[error("could not decode the response from {url}")]
    Decode {
        /// Requested URL.
        url:    String,
        /// Underlying decoding error.
        #[source]
        source: reqwest::Error,
    },
}

/// The forge operations used by the grading workflow.
#[async_trait]
pub trait Forge: Send + Sync {
    /// Looks up a project by id.
    async fn project(&self, id: u64) -> Result<ForgeProject, ForgeError>;

    /// Lists pipelines for `branch`, most recent first.
    async fn pipelines(&self, project_id: u64, branch: &str) -> Result<Vec<Pipeline>, ForgeError>;

    /// Adds a note to an issue.
    async fn create_issue_note(
        &self,
        project_id: u64,
        issue_iid: u64,
        body: &str,
    ) -> Result<(), ForgeError>;

    /// Closes or reopens an issue.
    async fn set_issue_state(
        &self,
        project_id: u64,
        issue_iid: u64,
        state: IssueState,
    ) -> Result<(), ForgeError>;

    /// Looks up a group by id.
    async fn group(&self, id: u64) -> Result<ForgeGroup, ForgeError>;

    /// Creates a project.
    async fn create_project(&self, project: &NewProject) -> Result<ForgeProject, ForgeError>;

    /// Enables a shared or group runner for a project.
    async fn enable_runner(&self, project_id: u64, runner_id: u64) -> Result<(), ForgeError>;

    /// Lets only maintainers push to `branch` and developers merge into it.
    async fn protect_branch(&self, project_id: u64, branch: &str) -> Result<(), ForgeError>;

    /// Commits new files to `branch` in a single commit.
    async fn create_commit(
        &self,
        project_id: u64,
        branch: &str,
        message: &str,
        actions: &[FileAction],
    ) -> Result<(), ForgeError>;

    /// Opens an issue.
    async fn create_issue(&self, project_id: u64, issue: &NewIssue) -> Result<(), ForgeError>;

    /// Uploads a file that issues of the project can link to.
    async fn upload_file(
        &self,
        project_id: u64,
        file_name: &str,
        contents: Vec<u8>,
    ) -> Result<Upload, ForgeError>;

    /// Users whose name, username or public email matches `query`.
    async fn search_users(&self, query: &str) -> Result<Vec<ForgeUser>, ForgeError>;

    /// Adds a user to a project.
    async fn add_member(
        &self,
        project_id: u64,
        user_id: u64,
        access_level: u32,
    ) -> Result<(), ForgeError>;
}

/// GitLab v4 REST client authenticated with a private token.
#[derive(Clone)]
pub struct GitLab {
    /// Shared HTTP client.
    client:   Client,
    /// `{server}/api/v4`, without trailing slash.
    api_base: String,
    /// Private token sent with every request.
    token:    String,
}

impl fmt::Debug for GitLab {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GitLab")
            .field("api_base", &self.api_base)
            .finish_non_exhaustive()
    }
}

impl GitLab {
    /// Creates a client for the server at `server_url`.
    pub fn new(server_url: &str, token: impl Into<String>) -> anyhow::Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("hwgrader/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to construct HTTP client for the forge")?;

        Ok(Self {
            client,
            api_base: format!("{}/api/v4", server_url.trim_end_matches('/')),
            token: token.into(),
        })
    }

    /// Absolute URL of an API path.
    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.api_base, path.trim_start_matches('/'))
    }

    /// Sends a request and maps transport failures and error statuses.
    async fn send(&self, request: RequestBuilder, url: &str) -> Result<Response, ForgeError> {
        debug!(url, "forge request");
        let response = request
            .header("PRIVATE-TOKEN", &self.token)
            .send()
            .await
            .map_err(|source| ForgeError::Transport {
                url: url.to_string(),
                source,
            })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(ForgeError::Status {
            url: url.to_string(),
            status: status.as_u16(),
            body,
        })
    }

    /// Sends a GET request and decodes the JSON body.
    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T, ForgeError> {
        let url = self.endpoint(path);
        let response = self.send(self.client.get(&url).query(query), &url).await?;
        decode(response, url).await
    }

    /// Sends a POST request with a JSON body and decodes the JSON answer.
    async fn post_json<T: DeserializeOwned>(
        &self,
        path: &str,
        body: serde_json::Value,
    ) -> Result<T, ForgeError> {
        let url = self.endpoint(path);
        let response = self.send(self.client.post(&url).json(&body), &url).await?;
        decode(response, url).await
    }

    /// Sends a POST request with a JSON body, ignoring the answer.
    async fn post(&self, path: &str, body: serde_json::Value) -> Result<(), ForgeError> {
        let url = self.endpoint(path);
        self.send(self.client.post(&url).json(&body), &url).await.map(drop)
    }
}

/// Decodes a JSON response body.
async fn decode<T: DeserializeOwned>(response: Response, url: String) -> Result<T, ForgeError> {
    response
        .json()
        .await
        .map_err(|source| ForgeError::Decode { url, source })
}

/// JSON body of an issue creation request; labels go as a comma separated
/// list.
fn issue_body(issue: &NewIssue) -> serde_json::Value {
    let mut body = serde_json::json!({
        "title": issue.title,
        "description": issue.description,
        "labels": issue.labels.join(","),
    });
    if let Some(due_date) = issue.due_date {
        body["due_date"] = serde_json::json!(due_date.format("%Y-%m-%d").to_string());
    }
    body
}

/// JSON body of a commit that creates `actions` on `branch`.
fn commit_body(branch: &str, message: &str, actions: &[FileAction]) -> serde_json::Value {
    let actions: Vec<serde_json::Value> = actions
        .iter()
        .map(|action| {
            serde_json::json!({
                "action": "create",
                "file_path": action.file_path,
                "content": action.content,
            })
        })
        .collect();
    serde_json::json!({
        "branch": branch,
        "commit_message": message,
        "actions": actions,
    })
}

#[async_trait]
impl Forge for GitLab {
    async fn project(&self, id: u64) -> Result<ForgeProject, ForgeError> {
        self.get_json(&format!("projects/{id}"), &[]).await
    }

    async fn pipelines(&self, project_id: u64, branch: &str) -> Result<Vec<Pipeline>, ForgeError> {
        self.get_json(
            &format!("projects/{project_id}/pipelines"),
            &[("ref", branch), ("order_by", "id"), ("sort", "desc")],
        )
        .await
    }

    async fn create_issue_note(
        &self,
        project_id: u64,
        issue_iid: u64,
        body: &str,
    ) -> Result<(), ForgeError> {
        let url = self.endpoint(&format!("projects/{project_id}/issues/{issue_iid}/notes"));
        let request = self
            .client
            .post(&url)
            .json(&serde_json::json!({ "body": body }));
        self.send(request, &url).await.map(drop)
    }

    async fn set_issue_state(
        &self,
        project_id: u64,
        issue_iid: u64,
        state: IssueState,
    ) -> Result<(), ForgeError> {
        let url = self.endpoint(&format!("projects/{project_id}/issues/{issue_iid}"));
        let request = self
            .client
            .put(&url)
            .json(&serde_json::json!({ "state_event": state.as_event() }));
        self.send(request, &url).await.map(drop)
    }

    async fn group(&self, id: u64) -> Result<ForgeGroup, ForgeError> {
        self.get_json(&format!("groups/{id}"), &[]).await
    }

    async fn create_project(&self, project: &NewProject) -> Result<ForgeProject, ForgeError> {
        self.post_json(
            "projects",
            serde_json::json!({
                "name": project.name,
                "description": project.description,
                "namespace_id": project.namespace_id,
                "jobs_enabled": project.jobs_enabled,
                "approvals_before_merge": project.approvals_before_merge,
            }),
        )
        .await
    }

    async fn enable_runner(&self, project_id: u64, runner_id: u64) -> Result<(), ForgeError> {
        self.post(
            &format!("projects/{project_id}/runners"),
            serde_json::json!({ "runner_id": runner_id }),
        )
        .await
    }

    async fn protect_branch(&self, project_id: u64, branch: &str) -> Result<(), ForgeError> {
        // New projects come with a default rule for their first branch; it is
        // replaced rather than updated.
        let url = self.endpoint(&format!("projects/{project_id}/protected_branches/{branch}"));
        match self.send(self.client.delete(&url), &url).await {
            Ok(_) => {}
            Err(ForgeError::Status { status, .. }) if status == StatusCode::NOT_FOUND.as_u16() => {}
            Err(err) => return Err(err),
        }

        self.post(
            &format!("projects/{project_id}/protected_branches"),
            serde_json::json!({
                "name": branch,
                "push_access_level": MAINTAINER_ACCESS,
                "merge_access_level": DEVELOPER_ACCESS,
            }),
        )
        .await
    }

    async fn create_commit(
        &self,
        project_id: u64,
        branch: &str,
        message: &str,
        actions: &[FileAction],
    ) -> Result<(), ForgeError> {
        self.post(
            &format!("projects/{project_id}/repository/commits"),
            commit_body(branch, message, actions),
        )
        .await
    }

    async fn create_issue(&self, project_id: u64, issue: &NewIssue) -> Result<(), ForgeError> {
        self.post(&format!("projects/{project_id}/issues"), issue_body(issue))
            .await
    }

    async fn upload_file(
        &self,
        project_id: u64,
        file_name: &str,
        contents: Vec<u8>,
    ) -> Result<Upload, ForgeError> {
        let url = self.endpoint(&format!("projects/{project_id}/uploads"));
        let form = Form::new().part("file", Part::bytes(contents).file_name(file_name.to_string()));
        let response = self
            .send(self.client.post(&url).multipart(form), &url)
            .await?;
        decode(response, url).await
    }

    async fn search_users(&self, query: &str) -> Result<Vec<ForgeUser>, ForgeError> {
        self.get_json("users", &[("search", query)]).await
    }

    async fn add_member(
        &self,
        project_id: u64,
        user_id: u64,
        access_level: u32,
    ) -> Result<(), ForgeError> {
        self.post(
            &format!("projects/{project_id}/members"),
            serde_json::json!({ "user_id": user_id, "access_level": access_level }),
        )
        .await
    }
}
