#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! # hwgrader
//!
//! Fetches every group's homework repository from GitLab, grades it and
//! reports what changed since the last homework.
//!
//! Configuration is read from the environment (a `.env` file is honoured):
//! `HWGRADER_FORGE_URL`, `HWGRADER_DEFAULT_BRANCH`, `HWGRADER_BUILD_FOLDER`,
//! `HWGRADER_CMAKE_MODULE_DIR`, `HWGRADER_COMMAND_TIMEOUT_SECS`,
//! `HWGRADER_CI_MODE`, `HWGRADER_TOOL_PATH`, `HWGRADER_RUNNER_ID` and
//! `GITLAB_TOKEN`.

use std::path::PathBuf;

use anyhow::Result;
use bpaf::*;
use chrono::NaiveDate;
use dotenvy::dotenv;
use hwgrader::{
    Settings, commands,
    course::{self, HomeworkIssues, RepoBatch},
    forge::IssueState,
};
use tracing::{Level, metadata::LevelFilter};
use tracing_subscriber::{fmt, prelude::*, util::SubscriberInitExt};

/// Options every subcommand takes.
#[derive(Clone)]
struct Auth {
    /// GitLab access token.
    token:   String,
    /// Log debug output.
    verbose: bool,
}

/// Options shared by the subcommands working on a list of repositories.
#[derive(Clone)]
struct Common {
    /// Token and verbosity.
    auth:      Auth,
    /// Folder the repositories are checked out into.
    workspace: PathBuf,
    /// JSON file listing the repositories.
    repos:     PathBuf,
}

/// Top-level CLI commands.
#[derive(Clone)]
enum Cmd {
    /// Clone or pull all repositories
    Fetch {
        /// Shared options
        common: Common,
    },
    /// Fetch, grade and diff all repositories
    Evaluate {
        /// Homework number
        homework: u32,
        /// Job definition file
        jobs:     Option<PathBuf>,
        /// Diff start date
        since:    Option<NaiveDate>,
        /// Evaluation cutoff and diff end date
        until:    Option<NaiveDate>,
        /// Shared options
        common:   Common,
    },
    /// Comment on an issue in all repositories
    Comment {
        /// Issue number
        issue:   u64,
        /// Message text or Markdown file
        message: String,
        /// Issue state change
        state:   Option<IssueState>,
        /// Shared options
        common:  Common,
    },
    /// Create one repository per group
    CreateRepos {
        /// Repository name prefix
        name:     String,
        /// Group to create the repositories in
        group:    u64,
        /// Number of repositories
        count:    u32,
        /// Starter files
        source:   Option<PathBuf>,
        /// Folder the repository list is written to
        registry: PathBuf,
        /// Token and verbosity
        auth:     Auth,
    },
    /// Open homework issues in all repositories
    CreateIssues {
        /// Homework number
        homework: u32,
        /// Issue file
        issues:   PathBuf,
        /// Due date
        due:      Option<NaiveDate>,
        /// Shared options
        common:   Common,
    },
    /// Commit a folder to all repositories through the API
    UploadFiles {
        /// Folder to commit
        source: PathBuf,
        /// Shared options
        common: Common,
    },
    /// Commit and push local changes in all repositories
    CommitChanges {
        /// Commit message
        message: String,
        /// Folder copied into every checkout first
        source:  Option<PathBuf>,
        /// Shared options
        common:  Common,
    },
    /// Add students to the repositories of their groups
    AddUsers {
        /// Group formation export
        groups: PathBuf,
        /// Shared options
        common: Common,
    },
}

impl Cmd {
    /// The token and verbosity of any subcommand.
    fn auth(&self) -> &Auth {
        match self {
            Cmd::CreateRepos { auth, .. } => auth,
            Cmd::Fetch { common }
            | Cmd::Evaluate { common, .. }
            | Cmd::Comment { common, .. }
            | Cmd::CreateIssues { common, .. }
            | Cmd::UploadFiles { common, .. }
            | Cmd::CommitChanges { common, .. }
            | Cmd::AddUsers { common, .. } => &common.auth,
        }
    }
}

/// Parse the command line arguments and return a `Cmd` enum
fn options() -> Cmd {
    /// parses the options every subcommand takes
    fn auth() -> impl Parser<Auth> {
        let token = short('t')
            .long("token")
            .env("GITLAB_TOKEN")
            .help("GitLab access token")
            .argument::<String>("TOKEN");
        let verbose = long("verbose").help("Print debug output").switch();
        construct!(Auth { token, verbose })
    }

    /// parses the options of subcommands working on a repository list
    fn common() -> impl Parser<Common> {
        let auth = auth();
        let workspace = short('w')
            .long("workspace")
            .help("Folder to check the repositories out into")
            .argument::<PathBuf>("DIR")
            .fallback(PathBuf::from("workspace"));
        let repos = positional::<PathBuf>("REPOS").help("JSON file listing the repositories");
        construct!(Common {
            auth,
            workspace,
            repos
        })
    }

    /// parses a calendar date
    fn date(name: &'static str, help: &'static str) -> impl Parser<Option<NaiveDate>> {
        long(name).help(help).argument::<NaiveDate>("YYYY-MM-DD").optional()
    }

    let fetch = {
        let common = common();
        construct!(Cmd::Fetch { common })
            .to_options()
            .command("fetch")
            .help("Clone or pull all repositories")
    };

    let evaluate = {
        let homework = short('n')
            .long("homework")
            .help("Homework number")
            .argument::<u32>("N");
        let jobs = long("jobs")
            .help("TOML job definition file, the built-in jobs if omitted")
            .argument::<PathBuf>("FILE")
            .optional();
        let since = date("since", "Create diffs for commits from this day on");
        let until = date("until", "Grade the last commit made up to this day");
        let common = common();
        construct!(Cmd::Evaluate {
            homework,
            jobs,
            since,
            until,
            common
        })
        .to_options()
        .command("evaluate")
        .help("Fetch, grade and diff all repositories")
    };

    let comment = {
        let issue = short('i')
            .long("issue")
            .help("Issue number")
            .argument::<u64>("ISSUE");
        let message = short('m')
            .long("message")
            .help("Comment text, or a Markdown file to read it from")
            .argument::<String>("MESSAGE");
        let state = long("state")
            .help("Close or reopen the issue afterwards")
            .argument::<IssueState>("close|reopen")
            .optional();
        let common = common();
        construct!(Cmd::Comment {
            issue,
            message,
            state,
            common
        })
        .to_options()
        .command("comment")
        .help("Comment on an issue in all repositories")
    };

    let create_repos = {
        let name = long("name")
            .help("Repository name prefix, repositories are called NAME_1, NAME_2, ...")
            .argument::<String>("NAME");
        let group = long("group")
            .help("Id of the group to create the repositories in")
            .argument::<u64>("ID");
        let count = long("count")
            .help("Number of repositories")
            .argument::<u32>("N")
            .fallback(1);
        let source = long("source")
            .help("Folder committed as the initial contents")
            .argument::<PathBuf>("DIR")
            .optional();
        let registry = long("registry")
            .help("Folder the repository list is written to")
            .argument::<PathBuf>("DIR")
            .fallback(PathBuf::from("config"));
        let auth = auth();
        construct!(Cmd::CreateRepos {
            name,
            group,
            count,
            source,
            registry,
            auth
        })
        .to_options()
        .command("create-repos")
        .help("Create one repository per group")
    };

    let create_issues = {
        let homework = short('n')
            .long("homework")
            .help("Homework number, used for the homework::N label")
            .argument::<u32>("N");
        let issues = long("issues")
            .help("TOML file with [[issues]] tables")
            .argument::<PathBuf>("FILE");
        let due = date("due", "Due date of the issues");
        let common = common();
        construct!(Cmd::CreateIssues {
            homework,
            issues,
            due,
            common
        })
        .to_options()
        .command("create-issues")
        .help("Open homework issues in all repositories")
    };

    let upload_files = {
        let source = long("source")
            .help("Folder whose files are committed")
            .argument::<PathBuf>("DIR");
        let common = common();
        construct!(Cmd::UploadFiles { source, common })
            .to_options()
            .command("upload-files")
            .help("Commit a folder to all repositories through the API")
    };

    let commit_changes = {
        let message = short('m')
            .long("message")
            .help("Commit message")
            .argument::<String>("MESSAGE");
        let source = long("source")
            .help("Folder copied into every checkout before committing")
            .argument::<PathBuf>("DIR")
            .optional();
        let common = common();
        construct!(Cmd::CommitChanges {
            message,
            source,
            common
        })
        .to_options()
        .command("commit-changes")
        .help("Commit and push local changes in all repositories")
    };

    let add_users = {
        let groups = long("groups")
            .help("Group formation export (CSV)")
            .argument::<PathBuf>("FILE");
        let common = common();
        construct!(Cmd::AddUsers { groups, common })
            .to_options()
            .command("add-users")
            .help("Add students to the repositories of their groups")
    };

    construct!([
        fetch,
        evaluate,
        comment,
        create_repos,
        create_issues,
        upload_files,
        commit_changes,
        add_users
    ])
        .to_options()
        .descr("Homework grading on top of GitLab")
        .run()
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();

    let cmd = options();

    let level = if cmd.auth().verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let fmt = fmt::layer()
        .without_time()
        .with_file(false)
        .with_line_number(false);
    tracing_subscriber::registry()
        .with(fmt)
        .with(LevelFilter::from_level(level))
        .init();

    let settings = Settings::from_env();
    let token = cmd.auth().token.clone();
    let forge = commands::connect(&settings, &token)?;

    match cmd {
        Cmd::Fetch { common } => {
            commands::fetch(&settings, forge.as_ref(), &token, &common.workspace, &common.repos)
                .await?;
        }
        Cmd::Evaluate {
            homework,
            jobs,
            since,
            until,
            common,
        } => {
            let checkouts =
                commands::fetch(&settings, forge.as_ref(), &token, &common.workspace, &common.repos)
                    .await?;
            let options = commands::EvaluateOptions::builder()
                .homework(homework)
                .maybe_jobs(jobs)
                .maybe_since(since)
                .maybe_until(until)
                .build();
            commands::evaluate(&settings, forge, &checkouts, &common.workspace, &options).await?;
        }
        Cmd::Comment {
            issue,
            message,
            state,
            common,
        } => {
            commands::comment_all(forge.as_ref(), &common.repos, issue, &message, state).await?;
        }
        Cmd::CreateRepos {
            name,
            group,
            count,
            source,
            registry,
            ..
        } => {
            let batch = RepoBatch::builder()
                .base_name(name)
                .group_id(group)
                .count(count)
                .maybe_source(source)
                .build();
            course::create_repos_registry(forge.as_ref(), &settings, &batch, &registry).await?;
        }
        Cmd::CreateIssues {
            homework,
            issues,
            due,
            common,
        } => {
            let homework = HomeworkIssues {
                homework,
                due_date: due,
            };
            commands::create_issues_all(forge.as_ref(), &common.repos, &issues, homework).await?;
        }
        Cmd::UploadFiles { source, common } => {
            commands::upload_files_all(&settings, forge.as_ref(), &common.repos, &source).await?;
        }
        Cmd::CommitChanges {
            message,
            source,
            common,
        } => {
            let checkouts =
                commands::fetch(&settings, forge.as_ref(), &token, &common.workspace, &common.repos)
                    .await?;
            commands::publish_changes(&checkouts, source.as_deref(), &message).await?;
        }
        Cmd::AddUsers { groups, common } => {
            commands::add_users_all(forge.as_ref(), &common.repos, &groups).await?;
        }
    };

    Ok(())
}
