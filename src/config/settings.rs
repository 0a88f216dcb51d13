use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use putools_core::RelayConfig;

/// Command line arguments
#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Power user tools: ssh sessions, tunnels and shells behind a PTY relay"
)]
pub struct Config {
    /// Enable debug mode
    #[arg(short, long, global = true)]
    pub debug: bool,

    /// Path to config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Maximum bytes relayed per read
    #[arg(long, global = true)]
    pub chunk_size: Option<usize>,

    /// Subcommand
    #[command(subcommand)]
    pub command: Command,
}

/// Subcommands
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Run a command interactively (the configured shell when none is given)
    Run {
        /// Environment override for the command, KEY=VALUE (repeatable)
        #[arg(short = 'e', long = "env", value_parser = parse_env_pair)]
        env: Vec<(String, String)>,

        /// The command and its arguments
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },
    /// Extended ssh command
    Ssh {
        /// Connection string, e.g. user@host
        connection: String,

        /// The port to connect to
        #[arg(short, long)]
        port: Option<u16>,

        /// Name of the key inside the ssh key directory
        #[arg(short, long)]
        identity: Option<String>,

        /// Force password authentication
        #[arg(short = 'f', long)]
        force_password_auth: bool,

        /// Do not check the host key (be careful)
        #[arg(short = 'k', long)]
        disable_host_key_checking: bool,

        /// Print the ssh command before running it
        #[arg(short, long)]
        verbose: bool,
    },
    /// Reverse tunnel: expose local LPORT as RPORT on the remote host
    Rtun {
        /// Connection string, e.g. user@host
        connection: String,
        /// Port opened on the remote host
        rport: u16,
        /// Local port the tunnel points to
        lport: u16,
    },
    /// Forward tunnel: reach remote RPORT through local LPORT
    Ftun {
        /// Connection string, e.g. user@host
        connection: String,
        /// Port on the remote host
        rport: u16,
        /// Local port to listen on
        lport: u16,
    },
}

impl Config {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Whether the built command should be echoed before running
    pub fn is_verbose(&self) -> bool {
        matches!(self.command, Command::Ssh { verbose: true, .. })
    }
}

/// Parse a `KEY=VALUE` pair
fn parse_env_pair(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected KEY=VALUE, got `{}`", s)),
    }
}

/// Application settings (from config file)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    /// Relay tuning
    #[serde(default)]
    pub relay: RelaySettings,

    /// `run` subcommand settings
    #[serde(default)]
    pub run: RunSettings,

    /// ssh settings
    #[serde(default)]
    pub ssh: SshSettings,
}

/// Relay tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelaySettings {
    /// Maximum bytes relayed per read
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Poll interval in milliseconds
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    /// Consecutive I/O failures tolerated per direction
    #[serde(default = "default_max_io_errors")]
    pub max_io_errors: u32,

    /// PTY rows when the terminal size is unknown
    #[serde(default = "default_fallback_rows")]
    pub fallback_rows: u16,

    /// PTY columns when the terminal size is unknown
    #[serde(default = "default_fallback_cols")]
    pub fallback_cols: u16,
}

fn default_chunk_size() -> usize {
    10240
}

fn default_poll_interval() -> u64 {
    50
}

fn default_max_io_errors() -> u32 {
    3
}

fn default_fallback_rows() -> u16 {
    24
}

fn default_fallback_cols() -> u16 {
    80
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            poll_interval_ms: default_poll_interval(),
            max_io_errors: default_max_io_errors(),
            fallback_rows: default_fallback_rows(),
            fallback_cols: default_fallback_cols(),
        }
    }
}

/// `run` subcommand settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSettings {
    /// Command used when `run` gets no arguments (split on whitespace)
    #[serde(default = "default_shell")]
    pub shell: String,
}

fn default_shell() -> String {
    "/bin/bash".to_string()
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            shell: default_shell(),
        }
    }
}

/// ssh settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SshSettings {
    /// ssh executable
    #[serde(default = "default_ssh_program")]
    pub program: String,

    /// Default port for `ssh`
    #[serde(default = "default_ssh_port")]
    pub port: u16,

    /// Directory that `--identity` names are resolved in (default: ~/.ssh)
    #[serde(default)]
    pub key_dir: Option<PathBuf>,
}

fn default_ssh_program() -> String {
    "ssh".to_string()
}

fn default_ssh_port() -> u16 {
    22
}

impl Default for SshSettings {
    fn default() -> Self {
        Self {
            program: default_ssh_program(),
            port: default_ssh_port(),
            key_dir: None,
        }
    }
}

impl SshSettings {
    /// Resolved key directory
    pub fn key_dir(&self) -> PathBuf {
        self.key_dir
            .clone()
            .or_else(|| dirs::home_dir().map(|p| p.join(".ssh")))
            .unwrap_or_else(|| PathBuf::from("~/.ssh"))
    }
}

impl Settings {
    /// Load settings from config file or use defaults
    pub fn load(path: Option<&PathBuf>) -> Result<Self> {
        // Try custom path first
        if let Some(p) = path {
            if p.exists() {
                return Self::read(p);
            }
            tracing::warn!("Config file {:?} not found, using defaults", p);
        }

        // Try default config locations
        let default_paths = [
            dirs::config_dir().map(|p| p.join("putools/config.toml")),
            dirs::home_dir().map(|p| p.join(".config/putools/config.toml")),
            dirs::home_dir().map(|p| p.join(".putools.toml")),
        ];

        for path in default_paths.iter().flatten() {
            if path.exists() {
                return Self::read(path);
            }
        }

        // Return defaults if no config file found
        Ok(Self::default())
    }

    fn read(path: &PathBuf) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        let settings = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;
        tracing::debug!("Loaded settings from {:?}", path);
        Ok(settings)
    }

    /// Merge CLI config into settings (CLI takes precedence)
    pub fn merge_cli(&mut self, cli: &Config) {
        if let Some(chunk_size) = cli.chunk_size {
            self.relay.chunk_size = chunk_size;
        }
    }

    /// Validate and normalize settings values
    ///
    /// Keeps the relay from spinning on a zero poll interval, reading
    /// byte-by-byte into nothing or allocating an unbounded read buffer.
    pub fn validate(&mut self) {
        const MIN_POLL_INTERVAL: u64 = 1;
        const MIN_CHUNK_SIZE: usize = 1;
        const MIN_IO_ERRORS: u32 = 1;

        if self.relay.poll_interval_ms < MIN_POLL_INTERVAL {
            self.relay.poll_interval_ms = MIN_POLL_INTERVAL;
        }
        self.relay.chunk_size = self
            .relay
            .chunk_size
            .clamp(MIN_CHUNK_SIZE, RelayConfig::MAX_CHUNK_SIZE);
        if self.relay.max_io_errors < MIN_IO_ERRORS {
            self.relay.max_io_errors = MIN_IO_ERRORS;
        }
        if self.relay.fallback_rows == 0 {
            self.relay.fallback_rows = default_fallback_rows();
        }
        if self.relay.fallback_cols == 0 {
            self.relay.fallback_cols = default_fallback_cols();
        }
    }

    /// Relay tuning for the core session
    pub fn relay_config(&self) -> RelayConfig {
        RelayConfig {
            chunk_size: self.relay.chunk_size,
            poll_interval: Duration::from_millis(self.relay.poll_interval_ms),
            max_io_errors: self.relay.max_io_errors,
            fallback_rows: self.relay.fallback_rows,
            fallback_cols: self.relay.fallback_cols,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.relay.chunk_size, 10240);
        assert_eq!(settings.relay.poll_interval_ms, 50);
        assert_eq!(settings.run.shell, "/bin/bash");
        assert_eq!(settings.ssh.program, "ssh");
        assert_eq!(settings.ssh.port, 22);
        assert_eq!(settings.relay_config(), RelayConfig::default());
    }

    #[test]
    fn test_parse_toml() {
        let toml = r#"
            [relay]
            chunk_size = 4096

            [run]
            shell = "/bin/zsh -l"

            [ssh]
            port = 2222
            key_dir = "/etc/keys"
        "#;

        let settings: Settings = toml::from_str(toml).expect("Should parse TOML");
        assert_eq!(settings.relay.chunk_size, 4096);
        assert_eq!(settings.relay.poll_interval_ms, 50);
        assert_eq!(settings.run.shell, "/bin/zsh -l");
        assert_eq!(settings.ssh.port, 2222);
        assert_eq!(settings.ssh.key_dir(), PathBuf::from("/etc/keys"));
    }

    #[test]
    fn test_load_from_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[ssh]\nprogram = \"/usr/bin/ssh\"\n").unwrap();

        let settings = Settings::load(Some(&path)).unwrap();
        assert_eq!(settings.ssh.program, "/usr/bin/ssh");
    }

    #[test]
    fn test_load_invalid_toml_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[relay\nchunk_size = ").unwrap();

        let err = Settings::load(Some(&path)).unwrap_err();
        assert!(err.to_string().contains("Failed to parse config file"));
    }

    #[test]
    fn test_load_without_any_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let home = dir.path().to_str().unwrap();
        let settings = temp_env::with_vars(
            [("HOME", Some(home)), ("XDG_CONFIG_HOME", Some(home))],
            || Settings::load(None).unwrap(),
        );
        assert_eq!(settings.relay.chunk_size, 10240);
    }

    #[test]
    fn test_validate_clamps() {
        let mut settings = Settings::default();
        settings.relay.chunk_size = 0;
        settings.relay.poll_interval_ms = 0;
        settings.relay.max_io_errors = 0;
        settings.relay.fallback_cols = 0;
        settings.validate();
        assert_eq!(settings.relay.chunk_size, 1);
        assert_eq!(settings.relay.poll_interval_ms, 1);
        assert_eq!(settings.relay.max_io_errors, 1);
        assert_eq!(settings.relay.fallback_cols, 80);
    }

    #[test]
    fn test_validate_caps_chunk_size() {
        let mut settings = Settings::default();
        settings.relay.chunk_size = 70_000_000_000_000;
        settings.validate();
        assert_eq!(settings.relay.chunk_size, 1024 * 1024);

        settings.relay.chunk_size = 64 * 1024;
        settings.validate();
        assert_eq!(settings.relay.chunk_size, 64 * 1024);
    }

    #[test]
    fn test_merge_cli() {
        let cli = Config::parse_from(["putools", "--chunk-size", "512", "run"]);
        let mut settings = Settings::default();
        settings.merge_cli(&cli);
        assert_eq!(settings.relay.chunk_size, 512);
    }

    #[test]
    fn test_parse_run_args() {
        let cli = Config::parse_from([
            "putools", "run", "-e", "A=1", "--env", "B=x=y", "--", "ls", "-la",
        ]);
        assert_eq!(
            cli.command,
            Command::Run {
                env: vec![
                    ("A".to_string(), "1".to_string()),
                    ("B".to_string(), "x=y".to_string())
                ],
                args: vec!["ls".to_string(), "-la".to_string()],
            }
        );
    }

    #[test]
    fn test_parse_env_pair_rejects_missing_equals() {
        assert!(parse_env_pair("NOVALUE").is_err());
        assert!(parse_env_pair("=x").is_err());
        assert_eq!(
            parse_env_pair("EMPTY=").unwrap(),
            ("EMPTY".to_string(), String::new())
        );
    }

    #[test]
    fn test_parse_ssh_flags() {
        let cli = Config::parse_from([
            "putools", "-d", "ssh", "-p", "2222", "-f", "-k", "-v", "me@box",
        ]);
        assert!(cli.debug);
        assert!(cli.is_verbose());
        assert_eq!(
            cli.command,
            Command::Ssh {
                connection: "me@box".to_string(),
                port: Some(2222),
                identity: None,
                force_password_auth: true,
                disable_host_key_checking: true,
                verbose: true,
            }
        );
    }

    #[test]
    fn test_parse_tunnel() {
        let cli = Config::parse_from(["putools", "rtun", "me@box", "8080", "3000"]);
        assert!(!cli.is_verbose());
        assert_eq!(
            cli.command,
            Command::Rtun {
                connection: "me@box".to_string(),
                rport: 8080,
                lport: 3000,
            }
        );
    }
}
