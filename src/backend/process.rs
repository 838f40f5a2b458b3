use std::fmt;
use std::process::Stdio;

use thiserror::Error;
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum SpawnError {
    #[error("Backend command is empty")]
    EmptyCommand,

    #[error("Failed to spawn backend `{command}`: {source}")]
    Spawn {
        command: String,
        source: std::io::Error,
    },

    #[error("Backend process has no {0} pipe")]
    MissingPipe(&'static str),
}

/// Executable and arguments used to launch the language-analysis backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl BackendCommand {
    /// Parses a whitespace-separated command line, e.g. `pyls -v`.
    pub fn parse(raw: &str) -> Result<Self, SpawnError> {
        let mut parts = raw.split_whitespace().map(str::to_string);
        let program = parts.next().ok_or(SpawnError::EmptyCommand)?;
        Ok(Self {
            program,
            args: parts.collect(),
        })
    }
}

impl fmt::Display for BackendCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// The pipes of a freshly spawned backend, handed to the stream bridge.
pub struct BackendIo {
    pub stdin: ChildStdin,
    pub stdout: ChildStdout,
}

/// A running backend process owned by exactly one connection.
pub struct BackendProcess {
    child: Child,
    terminated: bool,
}

impl BackendProcess {
    /// Spawns the backend with stdin and stdout piped.
    ///
    /// Stderr is discarded: whatever the backend prints there is not part of
    /// the stdio contract.
    pub fn spawn(command: &BackendCommand) -> Result<(Self, BackendIo), SpawnError> {
        info!("Spawning backend process: {}", command);

        let mut child = Command::new(&command.program)
            .args(&command.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| SpawnError::Spawn {
                command: command.to_string(),
                source,
            })?;

        let stdin = child.stdin.take().ok_or(SpawnError::MissingPipe("stdin"))?;
        let stdout = child.stdout.take().ok_or(SpawnError::MissingPipe("stdout"))?;
        debug!("Backend process started with pid {:?}", child.id());

        Ok((
            Self {
                child,
                terminated: false,
            },
            BackendIo { stdin, stdout },
        ))
    }

    /// Returns the OS pid, or None once the process has been reaped.
    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }

    /// Signals the backend to stop without waiting for it to exit.
    /// Safe to call more than once.
    pub fn terminate(&mut self) {
        if self.terminated {
            return;
        }
        self.terminated = true;

        if let Err(e) = self.child.start_kill() {
            debug!("Backend already gone before terminate: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_splits_program_and_args() {
        let command = BackendCommand::parse("pyls -v --log-file /tmp/x").unwrap();
        assert_eq!(command.program, "pyls");
        assert_eq!(command.args, vec!["-v", "--log-file", "/tmp/x"]);
    }

    #[test]
    fn parse_rejects_blank_command_line() {
        assert!(matches!(
            BackendCommand::parse("   "),
            Err(SpawnError::EmptyCommand)
        ));
    }

    #[test]
    fn display_round_trips_the_command_line() {
        let command = BackendCommand::parse("pyls -v").unwrap();
        assert_eq!(command.to_string(), "pyls -v");
    }

    #[tokio::test]
    async fn spawn_fails_for_missing_executable() {
        let command = BackendCommand::parse("/nonexistent/language-server").unwrap();
        assert!(matches!(
            BackendProcess::spawn(&command),
            Err(SpawnError::Spawn { .. })
        ));
    }

    #[tokio::test]
    async fn terminate_is_idempotent() {
        let command = BackendCommand::parse("cat").unwrap();
        let (mut process, _io) = BackendProcess::spawn(&command).unwrap();

        process.terminate();
        process.terminate();
    }
}
