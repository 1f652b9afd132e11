//! Launching and reaping the screen saver helper process.

use std::process::{Child, ChildStdout, Command, ExitStatus, Stdio};

use fahlock_config::{log_watch_debug, log_watch_info, log_watch_warn, HelperConfig};
use nix::errno::Errno;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;

use crate::error::{Error, Result};

/// Program and arguments for the helper.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HelperCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl HelperCommand {
    pub fn new(
        program: impl Into<String>,
        args: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// `xscreensaver-command -watch`
    pub fn xscreensaver() -> Self {
        Self::new("xscreensaver-command", ["-watch"])
    }
}

impl Default for HelperCommand {
    fn default() -> Self {
        Self::xscreensaver()
    }
}

impl From<&HelperConfig> for HelperCommand {
    fn from(config: &HelperConfig) -> Self {
        Self::new(config.program.clone(), config.args.iter().cloned())
    }
}

/// A running helper. Dropping it terminates and reaps the process.
#[derive(Debug)]
pub struct HelperProcess {
    child: Child,
    program: String,
}

impl HelperProcess {
    /// Start `command` with stdin from `/dev/null`, stdout on a pipe and
    /// stderr shared with us. Returns the read end of the pipe.
    pub fn spawn(command: &HelperCommand) -> Result<(Self, ChildStdout)> {
        let mut child = Command::new(&command.program)
            .args(&command.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|source| Error::Process {
                program: command.program.clone(),
                source,
            })?;

        let Some(stdout) = child.stdout.take() else {
            // Dropping the process terminates and reaps it.
            drop(Self {
                child,
                program: command.program.clone(),
            });
            return Err(Error::resource(
                "capture helper output",
                std::io::Error::new(std::io::ErrorKind::Other, "stdout was not piped"),
            ));
        };

        log_watch_info!(
            "Started screen saver helper",
            program = command.program.as_str(),
            pid = child.id()
        );
        Ok((
            Self {
                child,
                program: command.program.clone(),
            },
            stdout,
        ))
    }

    pub fn id(&self) -> u32 {
        self.child.id()
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Whether the process has exited (reaping it if so).
    pub fn has_exited(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(Some(_)))
    }

    /// Block until the process exits. Best effort; errors are only logged.
    pub fn reap(&mut self) -> Option<ExitStatus> {
        match self.child.wait() {
            Ok(status) => {
                log_watch_debug!(
                    "Reaped screen saver helper",
                    pid = self.child.id(),
                    status = tracing::field::display(status)
                );
                Some(status)
            }
            Err(e) => {
                log_watch_warn!(
                    "Failed to reap screen saver helper",
                    pid = self.child.id(),
                    error = tracing::field::display(e)
                );
                None
            }
        }
    }

    /// Send `SIGTERM` unless the process already exited, then reap it.
    ///
    /// Safe to call more than once; a reaped child is never signalled again.
    pub fn terminate(&mut self) {
        if self.has_exited() {
            return;
        }
        let pid = Pid::from_raw(self.child.id() as i32);
        match kill(pid, Signal::SIGTERM) {
            Ok(()) | Err(Errno::ESRCH) => {}
            Err(e) => log_watch_warn!(
                "Failed to signal screen saver helper",
                pid = self.child.id(),
                error = tracing::field::display(e)
            ),
        }
        self.reap();
    }
}

impl Drop for HelperProcess {
    fn drop(&mut self) {
        self.terminate();
    }
}
