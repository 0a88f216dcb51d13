use std::fmt;

use thiserror::Error;

/// Which way bytes were flowing when a relay I/O error happened
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// User terminal -> child
    ToChild,
    /// Child -> user terminal
    ToUser,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::ToChild => write!(f, "terminal -> child"),
            Direction::ToUser => write!(f, "child -> terminal"),
        }
    }
}

/// Error type for relay sessions
#[derive(Debug, Error)]
pub enum RelayError {
    /// The command has no program
    #[error("empty command")]
    EmptyCommand,

    /// Terminal attributes could not be read or changed
    #[error("terminal state: {context}: {source}")]
    TerminalState {
        context: &'static str,
        #[source]
        source: nix::Error,
    },

    /// The child process could not be launched
    #[error("failed to spawn {command}: {source}")]
    ProcessSpawn {
        command: String,
        #[source]
        source: anyhow::Error,
    },

    /// PTY allocation or child bookkeeping failed
    #[error("pty: {context}: {source}")]
    Pty {
        context: &'static str,
        #[source]
        source: anyhow::Error,
    },

    /// Sustained I/O failure in one relay direction
    #[error("relay I/O ({direction}): {source}")]
    Io {
        direction: Direction,
        #[source]
        source: std::io::Error,
    },
}

impl RelayError {
    pub(crate) fn terminal(context: &'static str, source: nix::Error) -> Self {
        Self::TerminalState { context, source }
    }

    pub(crate) fn pty(context: &'static str, source: impl Into<anyhow::Error>) -> Self {
        Self::Pty {
            context,
            source: source.into(),
        }
    }
}
