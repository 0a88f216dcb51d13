//! Command model for the relay
//!
//! A command is an executable plus already-tokenized arguments. Nothing here
//! interprets shell syntax.

use std::path::PathBuf;

use portable_pty::CommandBuilder;

use crate::relay::error::RelayError;

/// Command to run inside the relay
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayCommand {
    /// Executable name or path (resolved through `PATH` when bare)
    pub program: String,
    /// Arguments, in order
    pub args: Vec<String>,
    /// Environment overrides applied on top of the inherited environment
    pub env: Vec<(String, String)>,
    /// Working directory (current directory when unset)
    pub cwd: Option<PathBuf>,
}

impl RelayCommand {
    /// Create a command with no arguments
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
            cwd: None,
        }
    }

    /// Build a command from a token sequence (first token is the program)
    pub fn from_tokens<I, S>(tokens: I) -> Result<Self, RelayError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut tokens = tokens.into_iter().map(Into::into);
        let program = tokens
            .next()
            .filter(|p| !p.is_empty())
            .ok_or(RelayError::EmptyCommand)?;
        Ok(Self {
            program,
            args: tokens.collect(),
            env: Vec::new(),
            cwd: None,
        })
    }

    /// Build a command by splitting a string on whitespace
    ///
    /// Quotes and escapes are not interpreted: `sh -c "a b"` yields the
    /// tokens `sh`, `-c`, `"a`, `b"`. Use [`RelayCommand::from_tokens`]
    /// whenever the arguments can contain spaces.
    pub fn split_whitespace(cmd_str: &str) -> Result<Self, RelayError> {
        Self::from_tokens(cmd_str.split_whitespace())
    }

    /// Append one argument
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append several arguments
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Override one environment variable for the child
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Run the child in `dir` instead of the current directory
    pub fn cwd(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    /// The full argv, program first
    pub fn argv(&self) -> Vec<&str> {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect()
    }

    /// Translate into the PTY backend's command builder
    pub(crate) fn to_builder(&self) -> CommandBuilder {
        let mut cmd = CommandBuilder::new(&self.program);
        cmd.args(&self.args);
        for (key, value) in &self.env {
            cmd.env(key, value);
        }

        let cwd = self
            .cwd
            .clone()
            .or_else(|| std::env::current_dir().ok());
        if let Some(dir) = cwd {
            cmd.cwd(dir);
        }
        cmd
    }
}

impl std::fmt::Display for RelayCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.argv().join(" "))
    }
}
