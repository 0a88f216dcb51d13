//! Subcommand dispatch
//!
//! Turns a parsed subcommand into the command the relay should run.

use anyhow::{Context, Result};
use putools_core::RelayCommand;

use crate::config::{Command, Settings};
use crate::ssh::{self, SshOptions};

/// Build the relay command for a subcommand
pub fn build(command: &Command, settings: &Settings) -> Result<RelayCommand> {
    match command {
        Command::Run { env, args } => {
            let cmd = if args.is_empty() {
                RelayCommand::split_whitespace(&settings.run.shell)
                    .with_context(|| format!("Invalid run.shell: {:?}", settings.run.shell))?
            } else {
                RelayCommand::from_tokens(args.iter().cloned())?
            };
            Ok(env
                .iter()
                .fold(cmd, |cmd, (key, value)| cmd.env(key, value)))
        }
        Command::Ssh {
            connection,
            port,
            identity,
            force_password_auth,
            disable_host_key_checking,
            verbose: _,
        } => {
            let opts = SshOptions {
                connection: connection.clone(),
                port: *port,
                identity: identity.clone(),
                force_password_auth: *force_password_auth,
                disable_host_key_checking: *disable_host_key_checking,
            };
            Ok(ssh::session(&settings.ssh, &opts))
        }
        Command::Rtun {
            connection,
            rport,
            lport,
        } => Ok(ssh::reverse_tunnel(&settings.ssh, connection, *rport, *lport)),
        Command::Ftun {
            connection,
            rport,
            lport,
        } => Ok(ssh::forward_tunnel(&settings.ssh, connection, *rport, *lport)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn run(args: &[&str], env: &[(&str, &str)]) -> Command {
        Command::Run {
            env: env
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            args: args.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn test_run_with_args() {
        let command = run(&["sh", "-c", "echo a b"], &[("X", "1")]);
        let cmd = build(&command, &Settings::default()).unwrap();
        assert_eq!(cmd.argv(), vec!["sh", "-c", "echo a b"]);
        assert_eq!(cmd.env, vec![("X".to_string(), "1".to_string())]);
    }

    #[test]
    fn test_run_defaults_to_shell() {
        let mut settings = Settings::default();
        settings.run.shell = "/bin/zsh -l".to_string();
        let cmd = build(&run(&[], &[]), &settings).unwrap();
        assert_eq!(cmd.argv(), vec!["/bin/zsh", "-l"]);
    }

    #[test]
    fn test_run_with_blank_shell_fails() {
        let mut settings = Settings::default();
        settings.run.shell = "  ".to_string();
        let err = build(&run(&[], &[]), &settings).unwrap_err();
        assert!(err.to_string().contains("Invalid run.shell"));
    }

    #[test]
    fn test_ssh() {
        let command = Command::Ssh {
            connection: "me@box".to_string(),
            port: Some(2022),
            identity: None,
            force_password_auth: false,
            disable_host_key_checking: false,
            verbose: true,
        };
        let cmd = build(&command, &Settings::default()).unwrap();
        assert_eq!(cmd.argv(), vec!["ssh", "-p", "2022", "me@box"]);
    }

    #[test]
    fn test_tunnels() {
        let settings = Settings::default();
        let rtun = Command::Rtun {
            connection: "box".to_string(),
            rport: 9000,
            lport: 8000,
        };
        let ftun = Command::Ftun {
            connection: "box".to_string(),
            rport: 9000,
            lport: 8000,
        };
        assert_eq!(
            build(&rtun, &settings).unwrap().to_string(),
            "ssh -4 -N -T -R 9000:localhost:8000 box"
        );
        assert_eq!(
            build(&ftun, &settings).unwrap().to_string(),
            "ssh -4 -N -T -L 8000:localhost:9000 box"
        );
    }
}
