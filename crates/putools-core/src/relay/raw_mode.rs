//! Scoped raw terminal mode
//!
//! [`RawModeGuard`] owns the terminal attributes captured on entry and puts
//! them back exactly once, either through [`RawModeGuard::restore`] or on drop.

use std::os::fd::{AsFd, BorrowedFd};

use nix::sys::termios::{self, SetArg, Termios};

use crate::relay::error::RelayError;

/// Holds a terminal in raw mode until restored or dropped
pub struct RawModeGuard<'fd> {
    fd: BorrowedFd<'fd>,
    original: Option<Termios>,
}

impl<'fd> RawModeGuard<'fd> {
    /// Capture the attributes of `fd` and switch it to raw mode
    ///
    /// On error the terminal is left exactly as it was.
    pub fn enter(fd: BorrowedFd<'fd>) -> Result<Self, RelayError> {
        let original =
            termios::tcgetattr(fd).map_err(|e| RelayError::terminal("tcgetattr", e))?;

        let mut raw = original.clone();
        termios::cfmakeraw(&mut raw);
        termios::tcsetattr(fd, SetArg::TCSANOW, &raw)
            .map_err(|e| RelayError::terminal("tcsetattr(raw)", e))?;

        tracing::debug!("terminal switched to raw mode");
        Ok(Self {
            fd,
            original: Some(original),
        })
    }

    /// Put the original attributes back and report failure
    pub fn restore(mut self) -> Result<(), RelayError> {
        self.restore_inner()
    }

    fn restore_inner(&mut self) -> Result<(), RelayError> {
        let Some(original) = self.original.take() else {
            return Ok(());
        };
        termios::tcsetattr(self.fd.as_fd(), SetArg::TCSADRAIN, &original)
            .map_err(|e| RelayError::terminal("tcsetattr(restore)", e))?;
        tracing::debug!("terminal attributes restored");
        Ok(())
    }
}

impl Drop for RawModeGuard<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.restore_inner() {
            tracing::warn!("{}", e);
        }
    }
}
