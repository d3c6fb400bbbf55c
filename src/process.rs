#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

use std::{
    env,
    ffi::{OsStr, OsString},
    path::PathBuf,
    process::{ExitStatus, Stdio},
    time::Duration,
};

use tokio::{process::Command, time::timeout};
use tracing::debug;
use which::{which, which_in};

/// Reasons an external command could not produce an exit status.
#[derive(thiserror::Error, Debug)]
pub enum ProcessError {
    /// The program is not installed or not on `PATH`.
    #[error("`{program}` not found")]
    NotFound {
        /// Program that was looked up.
        program: String,
    },
    /// The operating system refused to start the program.
    #[error("failed to spawn `{program}`")]
    Spawn {
        /// Program that failed to start.
        program: String,
        /// Underlying I/O error.
        #[source]
        source:  std::io::Error,
    },
    /// The program ran longer than its deadline and was killed.
    #[error("`{program}` timed out after {}s", limit.as_secs())]
    TimedOut {
        /// Program that was killed.
        program: String,
        /// Deadline that was exceeded.
        limit:   Duration,
    },
    /// Waiting on the program or reading its pipes failed.
    #[error("failed to collect output of `{program}`")]
    Io {
        /// Program whose output could not be read.
        program: String,
        /// Underlying I/O error.
        #[source]
        source:  std::io::Error,
    },
}

/// Captured result of a finished subprocess.
#[derive(Debug, Clone)]
pub struct Collected {
    /// Exit status returned by the process.
    pub status: ExitStatus,
    /// Contents written to stdout.
    pub stdout: Vec<u8>,
    /// Contents written to stderr.
    pub stderr: Vec<u8>,
}

impl Collected {
    /// Whether the process exited successfully.
    pub fn success(&self) -> bool {
        self.status.success()
    }

    /// Stdout decoded lossily.
    pub fn stdout_text(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    /// Stdout followed by stderr, decoded lossily.
    pub fn combined_text(&self) -> String {
        let mut text = self.stdout_text();
        text.push_str(&String::from_utf8_lossy(&self.stderr));
        text
    }
}

/// A single external command invocation.
#[derive(Debug, Clone)]
pub struct Invocation {
    /// Program name or path, resolved through `PATH`.
    program:  OsString,
    /// Arguments passed verbatim.
    args:     Vec<OsString>,
    /// Working directory, if different from the current one.
    cwd:      Option<PathBuf>,
    /// Folders searched for the program before `PATH`.
    search:   Vec<PathBuf>,
    /// Kill the process once this much time has passed.
    deadline: Option<Duration>,
}

impl Invocation {
    /// Creates an invocation of `program` without arguments.
    pub fn new(program: impl AsRef<OsStr>) -> Self {
        Self {
            program:  program.as_ref().to_os_string(),
            args:     Vec::new(),
            cwd:      None,
            search:   Vec::new(),
            deadline: None,
        }
    }

    /// Creates an invocation that runs `command` through `sh -c`.
    pub fn shell(command: &str) -> Self {
        Self::new("sh").arg("-c").arg(command)
    }

    /// Appends one argument.
    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_os_string());
        self
    }

    /// Appends several arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args
            .extend(args.into_iter().map(|arg| arg.as_ref().to_os_string()));
        self
    }

    /// Sets the working directory.
    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    /// Looks the program up in `dirs` before falling back to `PATH`.
    pub fn search_dirs(mut self, dirs: impl IntoIterator<Item = PathBuf>) -> Self {
        self.search.extend(dirs);
        self
    }

    /// Sets or clears the deadline.
    pub fn deadline(mut self, deadline: Option<Duration>) -> Self {
        self.deadline = deadline;
        self
    }

    /// Name of the program as given.
    pub fn program(&self) -> String {
        self.program.to_string_lossy().into_owned()
    }

    /// Resolves the program through the search folders and `PATH`.
    fn resolve(&self) -> Option<PathBuf> {
        if self.search.is_empty() {
            return which(&self.program).ok();
        }
        let path = env::var_os("PATH").unwrap_or_default();
        let dirs = self
            .search
            .iter()
            .cloned()
            .chain(env::split_paths(&path));
        let joined = env::join_paths(dirs).ok()?;
        let cwd = env::current_dir().ok()?;
        which_in(&self.program, Some(joined), cwd).ok()
    }

    /// Spawns the command, waits for it and collects stdout/stderr.
    ///
    /// A non-zero exit status is not an error; inspect
    /// [`Collected::success`].
    pub async fn run(self) -> Result<Collected, ProcessError> {
        let program = self.program();
        let resolved = self.resolve().ok_or_else(|| ProcessError::NotFound {
            program: program.clone(),
        })?;

        let mut cmd = Command::new(resolved);
        cmd.args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.cwd {
            cmd.current_dir(dir);
        }

        debug!(program = %program, args = ?self.args, cwd = ?self.cwd, "spawning process");
        let child = cmd.spawn().map_err(|source| ProcessError::Spawn {
            program: program.clone(),
            source,
        })?;

        let output = match self.deadline {
            Some(limit) => timeout(limit, child.wait_with_output())
                .await
                .map_err(|_| ProcessError::TimedOut {
                    program: program.clone(),
                    limit,
                })?,
            None => child.wait_with_output().await,
        }
        .map_err(|source| ProcessError::Io { program, source })?;

        Ok(Collected {
            status: output.status,
            stdout: output.stdout,
            stderr: output.stderr,
        })
    }
}
