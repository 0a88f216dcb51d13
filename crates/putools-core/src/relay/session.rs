//! Relay session
//!
//! Runs one command on a fresh PTY and proxies the invoking terminal to it.

use std::io::{self, Write};
use std::os::fd::{AsFd, BorrowedFd};

use nix::fcntl::{fcntl, FcntlArg, OFlag};
use portable_pty::{native_pty_system, Child, ExitStatus, MasterPty, PtyPair};

use crate::relay::command::RelayCommand;
use crate::relay::config::RelayConfig;
use crate::relay::error::RelayError;
use crate::relay::pump::Pump;
use crate::relay::raw_mode::RawModeGuard;
use crate::relay::winsize;

/// The invoking side of a relay: where keystrokes come from and output goes
///
/// The input descriptor is also the one whose attributes are switched to raw
/// mode, so it must refer to a terminal.
#[derive(Debug, Clone, Copy)]
pub struct Terminal<'fd> {
    input: BorrowedFd<'fd>,
    output: BorrowedFd<'fd>,
}

impl<'fd> Terminal<'fd> {
    /// Relay between arbitrary descriptors
    pub fn new(input: BorrowedFd<'fd>, output: BorrowedFd<'fd>) -> Self {
        Self { input, output }
    }
}

/// How the child ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayExit {
    /// Exit code (1 when killed by a signal)
    pub code: u32,
    /// Name of the terminating signal, if any
    pub signal: Option<String>,
}

impl RelayExit {
    /// Whether the child exited with code 0
    pub fn success(&self) -> bool {
        self.code == 0 && self.signal.is_none()
    }
}

impl From<ExitStatus> for RelayExit {
    fn from(status: ExitStatus) -> Self {
        Self {
            code: status.exit_code(),
            signal: status.signal().map(str::to_string),
        }
    }
}

/// Single-use relay session
pub struct Session {
    command: RelayCommand,
    config: RelayConfig,
}

impl Session {
    /// Create a session for `command` with default tuning
    pub fn new(command: RelayCommand) -> Self {
        Self {
            command,
            config: RelayConfig::default(),
        }
    }

    /// Replace the relay tuning
    pub fn with_config(mut self, config: RelayConfig) -> Self {
        self.config = config;
        self
    }

    /// Relay the process's own stdin/stdout to the command
    pub fn run(self) -> Result<RelayExit, RelayError> {
        let stdin = io::stdin();
        let stdout = io::stdout();
        // Anything still buffered must land before the child starts drawing.
        let _ = stdout.lock().flush();
        self.run_on(Terminal::new(stdin.as_fd(), stdout.as_fd()))
    }

    /// Relay `terminal` to the command
    ///
    /// The terminal's original attributes are back in place when this
    /// returns, whatever the outcome.
    pub fn run_on(self, terminal: Terminal<'_>) -> Result<RelayExit, RelayError> {
        // Allocated while the terminal is still cooked: an allocation
        // failure aborts, and an abort skips the guard's Drop.
        let mut buf = vec![0u8; self.config.buffer_len()];

        let guard = RawModeGuard::enter(terminal.input)?;
        let result = self.relay(terminal, &mut buf);
        let restored = guard.restore();

        match (result, restored) {
            (Ok(exit), restored) => restored.map(|()| exit),
            (Err(e), Err(restore_err)) => {
                tracing::warn!("Failed to restore terminal after relay error: {}", restore_err);
                Err(e)
            }
            (Err(e), Ok(())) => Err(e),
        }
    }

    fn relay(&self, terminal: Terminal<'_>, buf: &mut [u8]) -> Result<RelayExit, RelayError> {
        let size = winsize::terminal_size(terminal.output)
            .unwrap_or((self.config.fallback_rows, self.config.fallback_cols));

        let PtyPair { slave, master } = native_pty_system()
            .openpty(winsize::pty_size(size))
            .map_err(|e| RelayError::pty("openpty", e))?;

        let mut child = slave
            .spawn_command(self.command.to_builder())
            .map_err(|e| RelayError::ProcessSpawn {
                command: self.command.to_string(),
                source: e,
            })?;
        // The child holds its own copies; ours would keep the master from
        // ever seeing end-of-stream.
        drop(slave);

        tracing::debug!(
            "Spawned {} with PID {}",
            self.command.program,
            child.process_id().unwrap_or(0)
        );

        match self.pump(terminal, buf, master.as_ref(), child.as_mut()) {
            Ok(status) => {
                let exit = RelayExit::from(status);
                tracing::debug!("{} exited with code {}", self.command.program, exit.code);
                Ok(exit)
            }
            Err(e) => {
                tracing::debug!("relay failed, terminating {}: {}", self.command.program, e);
                terminate(child.as_mut());
                Err(e)
            }
        }
    }

    fn pump(
        &self,
        terminal: Terminal<'_>,
        buf: &mut [u8],
        master: &dyn MasterPty,
        child: &mut dyn Child,
    ) -> Result<ExitStatus, RelayError> {
        let raw_fd = master.as_raw_fd().ok_or_else(|| {
            RelayError::pty("master", anyhow::anyhow!("PTY master has no file descriptor"))
        })?;
        // SAFETY: `master` owns this descriptor and outlives the borrow,
        // which does not escape this function.
        let master_fd = unsafe { BorrowedFd::borrow_raw(raw_fd) };
        set_nonblocking(master_fd)?;

        Pump::new(terminal.input, terminal.output, master_fd, &self.config)
            .run(buf, child, master)
    }
}

fn set_nonblocking(fd: BorrowedFd<'_>) -> Result<(), RelayError> {
    let flags = fcntl(fd, FcntlArg::F_GETFL)
        .map_err(|e| RelayError::pty("fcntl(F_GETFL)", io::Error::from(e)))?;
    let flags = OFlag::from_bits_truncate(flags) | OFlag::O_NONBLOCK;
    fcntl(fd, FcntlArg::F_SETFL(flags))
        .map_err(|e| RelayError::pty("fcntl(F_SETFL)", io::Error::from(e)))?;
    Ok(())
}

/// Kill and reap a child that the relay is abandoning
fn terminate(child: &mut dyn Child) {
    if let Ok(Some(_)) = child.try_wait() {
        return;
    }
    if let Err(e) = child.kill() {
        tracing::debug!("Failed to kill child: {}", e);
    }
    if let Err(e) = child.wait() {
        tracing::debug!("Failed to reap child: {}", e);
    }
}
