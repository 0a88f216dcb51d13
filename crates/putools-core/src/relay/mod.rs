//! Interactive pseudo-terminal relay
//!
//! Runs a command on a PTY and proxies the invoking terminal to it, so
//! prompts, control characters and full-screen redraws behave as if the
//! command had been started directly in that terminal. The terminal is put
//! in raw mode for the duration of the session and always restored.

mod command;
mod config;
mod error;
mod pump;
mod raw_mode;
mod session;
mod winsize;


pub use command::RelayCommand;
pub use config::RelayConfig;
pub use error::{Direction, RelayError};
pub use raw_mode::RawModeGuard;
pub use session::{RelayExit, Session, Terminal};
