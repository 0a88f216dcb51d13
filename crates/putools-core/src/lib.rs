//! putools core library
//!
//! Home of the PTY relay used by the `putools` commands to run interactive
//! programs (ssh sessions, tunnels, shells) behind a pseudo-terminal.

pub mod relay;

pub use relay::{RelayCommand, RelayConfig, RelayError, RelayExit, Session, Terminal};
