//! Wrapped child process spawning and control.
//!
//! The child is spawned with all three standard streams piped, so every
//! stream end exists before the first byte can be written by the child.

use std::ffi::OsString;
use std::process::{ExitStatus, Stdio};

use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};

/// Error type for process spawning operations.
#[derive(thiserror::Error, Debug)]
pub enum SpawnError {
    /// No program was given.
    #[error("No command given to wrap")]
    EmptyCommand,
    /// The executable was not found.
    #[error("Executable not found: {0}")]
    NotFound(String),
    /// Permission denied when spawning.
    #[error("Permission denied: {0}")]
    PermissionDenied(String),
    /// A standard stream was not piped.
    #[error("Child {0} not available")]
    MissingPipe(&'static str),
    /// Other I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SpawnError {
    /// Create a `SpawnError` from an I/O error, classifying common cases.
    fn from_io(program: &str, err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound(program.to_string()),
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied(program.to_string()),
            _ => Self::Io(err),
        }
    }
}

/// Program and arguments of the wrapped command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    program: String,
    args: Vec<OsString>,
}

impl CommandSpec {
    /// Create a spec for `program` with no arguments.
    #[must_use]
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// Append arguments.
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Build a spec from a full command line (`program, args...`).
    ///
    /// # Errors
    ///
    /// Returns `SpawnError::EmptyCommand` if the command line is empty.
    pub fn from_argv<I, S>(argv: I) -> Result<Self, SpawnError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut argv = argv.into_iter().map(Into::into);
        let program = argv.next().ok_or(SpawnError::EmptyCommand)?;
        if program.is_empty() {
            return Err(SpawnError::EmptyCommand);
        }
        Ok(Self::new(program).args(argv))
    }

    #[must_use]
    pub fn program(&self) -> &str {
        &self.program
    }

    #[must_use]
    pub fn get_args(&self) -> &[OsString] {
        &self.args
    }
}

/// The child's standard stream ends, taken once at spawn time.
#[derive(Debug)]
pub struct ChildPipes {
    pub stdin: ChildStdin,
    pub stdout: ChildStdout,
    pub stderr: ChildStderr,
}

/// A running wrapped process.
#[derive(Debug)]
pub struct ChildProcess {
    child: Child,
    program: String,
}

impl ChildProcess {
    /// Spawn the command with piped stdin, stdout and stderr.
    ///
    /// # Errors
    ///
    /// Returns `SpawnError` if the process fails to spawn. If any pipe is
    /// missing after spawning, the child is killed and reaped first.
    pub async fn spawn(spec: &CommandSpec) -> Result<(Self, ChildPipes), SpawnError> {
        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let child = cmd
            .spawn()
            .map_err(|e| SpawnError::from_io(&spec.program, e))?;

        let mut process = Self {
            child,
            program: spec.program.clone(),
        };

        match process.take_pipes() {
            Ok(pipes) => {
                tracing::debug!(program = %process.program, pid = ?process.id(), "Spawned child");
                Ok((process, pipes))
            }
            Err(e) => {
                if let Err(kill_err) = process.kill().await {
                    tracing::warn!(error = %kill_err, "Failed to kill partially started child");
                }
                Err(e)
            }
        }
    }

    fn take_pipes(&mut self) -> Result<ChildPipes, SpawnError> {
        let stdin = self.child.stdin.take().ok_or(SpawnError::MissingPipe("stdin"))?;
        let stdout = self
            .child
            .stdout
            .take()
            .ok_or(SpawnError::MissingPipe("stdout"))?;
        let stderr = self
            .child
            .stderr
            .take()
            .ok_or(SpawnError::MissingPipe("stderr"))?;
        Ok(ChildPipes {
            stdin,
            stdout,
            stderr,
        })
    }

    /// Get the process ID, if still running.
    #[must_use]
    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }

    /// Program name the child was spawned from.
    #[must_use]
    pub fn program(&self) -> &str {
        &self.program
    }

    /// Wait for the process to exit and reap it.
    ///
    /// # Errors
    ///
    /// Returns an error if waiting fails.
    pub async fn wait(mut self) -> std::io::Result<ExitStatus> {
        self.child.wait().await
    }

    /// Forcefully kill the process and reap it.
    ///
    /// # Errors
    ///
    /// Returns an error if the kill signal cannot be sent.
    pub async fn kill(&mut self) -> std::io::Result<()> {
        self.child.kill().await
    }
}

/// Map a child's exit status to the exit code this process should use.
///
/// Signal deaths map to `128 + signal` on Unix.
#[must_use]
pub fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }

    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }

    1
}
