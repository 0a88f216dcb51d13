//! The relay loop
//!
//! One thread, one `poll(2)` over the user's input and the PTY master.
//! Bytes bound for the child are queued and written non-blocking; while that
//! queue is non-empty the user's input is not read, so a child that stops
//! reading its terminal never blocks its own output from reaching the user.

use std::io;
use std::os::fd::BorrowedFd;
use std::time::Instant;

use nix::errno::Errno;
use nix::poll::{poll, PollFd, PollFlags, PollTimeout};
use nix::unistd;
use portable_pty::{Child, ExitStatus, MasterPty};

use crate::relay::config::RelayConfig;
use crate::relay::error::{Direction, RelayError};
use crate::relay::winsize;

/// Flags that mean "a read will not block"
const READABLE: PollFlags = PollFlags::POLLIN
    .union(PollFlags::POLLHUP)
    .union(PollFlags::POLLERR);

/// Bidirectional copy loop between a terminal and a PTY master
pub(crate) struct Pump<'a> {
    input: BorrowedFd<'a>,
    output: BorrowedFd<'a>,
    master: BorrowedFd<'a>,
    config: &'a RelayConfig,
    to_child: Vec<u8>,
    input_open: bool,
    master_open: bool,
    to_child_errors: u32,
    to_user_errors: u32,
}

impl<'a> Pump<'a> {
    /// `master` must already be non-blocking
    pub(crate) fn new(
        input: BorrowedFd<'a>,
        output: BorrowedFd<'a>,
        master: BorrowedFd<'a>,
        config: &'a RelayConfig,
    ) -> Self {
        Self {
            input,
            output,
            master,
            config,
            to_child: Vec::new(),
            input_open: true,
            master_open: true,
            to_child_errors: 0,
            to_user_errors: 0,
        }
    }

    /// Relay until the child has exited and its output is drained
    ///
    /// `buf` bounds every single read from either side.
    pub(crate) fn run(
        mut self,
        buf: &mut [u8],
        child: &mut dyn Child,
        pty: &dyn MasterPty,
    ) -> Result<ExitStatus, RelayError> {
        let mut exited: Option<ExitStatus> = None;
        let mut last_size = winsize::terminal_size(self.output);
        let mut last_resize_check = Instant::now();

        while self.master_open {
            if exited.is_none() {
                exited = child
                    .try_wait()
                    .map_err(|e| RelayError::pty("try_wait", e))?;
                if let Some(status) = &exited {
                    tracing::debug!("child exited ({:?}), draining output", status);
                }
            }

            // After exit, only drain what is already buffered.
            let timeout = if exited.is_some() {
                PollTimeout::ZERO
            } else {
                PollTimeout::from(self.config.poll_timeout_ms())
            };
            let (input_events, master_events) = match self.wait(timeout, exited.is_none()) {
                Ok(events) => events,
                Err(Errno::EINTR) => continue,
                Err(e) => return Err(RelayError::pty("poll", io::Error::from(e))),
            };

            if exited.is_some() && !master_events.intersects(READABLE) {
                break;
            }

            if master_events.intersects(READABLE) {
                self.child_to_user(buf)?;
            }
            if master_events.contains(PollFlags::POLLOUT) {
                self.flush_to_child()?;
            }
            if input_events.contains(PollFlags::POLLNVAL) {
                tracing::warn!("terminal input descriptor is invalid, no longer forwarding input");
                self.input_open = false;
            } else if input_events.intersects(READABLE) {
                self.user_to_child(buf)?;
            }

            if exited.is_none() && last_resize_check.elapsed() >= self.config.poll_interval {
                last_resize_check = Instant::now();
                let size = winsize::terminal_size(self.output);
                if size != last_size {
                    if let Some(size) = size {
                        tracing::debug!("terminal resized to {}x{}", size.1, size.0);
                        if let Err(e) = pty.resize(winsize::pty_size(size)) {
                            tracing::debug!("PTY resize failed: {}", e);
                        }
                    }
                    last_size = size;
                }
            }
        }

        match exited {
            Some(status) => Ok(status),
            None => {
                tracing::debug!("PTY closed before child exit, waiting for child");
                child.wait().map_err(|e| RelayError::pty("wait", e))
            }
        }
    }

    /// Poll the master (and the input when accepted) once
    fn wait(
        &self,
        timeout: PollTimeout,
        accept_input: bool,
    ) -> nix::Result<(PollFlags, PollFlags)> {
        let mut master_interest = PollFlags::POLLIN;
        if !self.to_child.is_empty() {
            master_interest |= PollFlags::POLLOUT;
        }
        let poll_input = accept_input && self.input_open && self.to_child.is_empty();

        let mut fds = vec![PollFd::new(self.master, master_interest)];
        if poll_input {
            fds.push(PollFd::new(self.input, PollFlags::POLLIN));
        }
        poll(&mut fds, timeout)?;

        let master_events = fds[0].revents().unwrap_or(PollFlags::empty());
        let input_events = if poll_input {
            fds[1].revents().unwrap_or(PollFlags::empty())
        } else {
            PollFlags::empty()
        };
        Ok((input_events, master_events))
    }

    fn child_to_user(&mut self, buf: &mut [u8]) -> Result<(), RelayError> {
        match unistd::read(self.master, buf) {
            // EIO is how Linux reports a master whose slave side is gone
            Ok(0) | Err(Errno::EIO) => {
                tracing::debug!("PTY master reached end of stream");
                self.master_open = false;
                Ok(())
            }
            Ok(n) => match write_all(self.output, &buf[..n], self.config) {
                Ok(()) => {
                    self.to_user_errors = 0;
                    Ok(())
                }
                Err(e) => self.record_failure(Direction::ToUser, e),
            },
            Err(Errno::EINTR) | Err(Errno::EAGAIN) => Ok(()),
            Err(e) => self.record_failure(Direction::ToUser, e.into()),
        }
    }

    fn user_to_child(&mut self, buf: &mut [u8]) -> Result<(), RelayError> {
        match unistd::read(self.input, buf) {
            Ok(0) => {
                tracing::debug!("terminal input reached end of stream");
                self.input_open = false;
                Ok(())
            }
            Ok(n) => {
                self.to_child.extend_from_slice(&buf[..n]);
                self.flush_to_child()
            }
            Err(Errno::EINTR) | Err(Errno::EAGAIN) => Ok(()),
            Err(e) => self.record_failure(Direction::ToChild, e.into()),
        }
    }

    /// Write as much queued input to the master as it accepts right now
    fn flush_to_child(&mut self) -> Result<(), RelayError> {
        while !self.to_child.is_empty() {
            match unistd::write(self.master, &self.to_child) {
                Ok(n) => {
                    self.to_child.drain(..n);
                    self.to_child_errors = 0;
                }
                Err(Errno::EINTR) => continue,
                Err(Errno::EAGAIN) => break,
                Err(e) => return self.record_failure(Direction::ToChild, e.into()),
            }
        }
        Ok(())
    }

    /// Count a failure; give up once a direction fails too many times in a row
    fn record_failure(&mut self, direction: Direction, error: io::Error) -> Result<(), RelayError> {
        let count = match direction {
            Direction::ToChild => &mut self.to_child_errors,
            Direction::ToUser => &mut self.to_user_errors,
        };
        *count += 1;
        tracing::warn!("relay I/O error ({}), attempt {}: {}", direction, count, error);

        if *count >= self.config.max_io_errors.max(1) {
            return Err(RelayError::Io {
                direction,
                source: error,
            });
        }
        Ok(())
    }
}

/// Blocking write of the whole buffer, tolerating a non-blocking descriptor
fn write_all(fd: BorrowedFd<'_>, mut data: &[u8], config: &RelayConfig) -> io::Result<()> {
    while !data.is_empty() {
        match unistd::write(fd, data) {
            Ok(0) => return Err(io::ErrorKind::WriteZero.into()),
            Ok(n) => data = &data[n..],
            Err(Errno::EINTR) => continue,
            Err(Errno::EAGAIN) => {
                let mut fds = [PollFd::new(fd, PollFlags::POLLOUT)];
                match poll(&mut fds, PollTimeout::from(config.poll_timeout_ms())) {
                    Ok(_) | Err(Errno::EINTR) => continue,
                    Err(e) => return Err(e.into()),
                }
            }
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}
