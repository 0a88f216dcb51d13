//! ssh command construction
//!
//! Builds token lists for the ssh client; nothing is passed through a shell.

use putools_core::RelayCommand;

use crate::config::SshSettings;

/// Options for an interactive ssh session
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SshOptions {
    /// Connection string, e.g. user@host
    pub connection: String,
    /// Port (settings default when unset)
    pub port: Option<u16>,
    /// Key file name inside the key directory
    pub identity: Option<String>,
    /// Only offer password authentication
    pub force_password_auth: bool,
    /// Skip known_hosts verification
    pub disable_host_key_checking: bool,
}

/// Interactive ssh session
pub fn session(settings: &SshSettings, opts: &SshOptions) -> RelayCommand {
    let mut cmd = RelayCommand::new(&settings.program);

    if opts.force_password_auth {
        cmd = cmd.args([
            "-o",
            "PreferredAuthentications=password",
            "-o",
            "PubkeyAuthentication=no",
        ]);
    }
    if opts.disable_host_key_checking {
        cmd = cmd.args([
            "-o",
            "UserKnownHostsFile=/dev/null",
            "-o",
            "StrictHostKeyChecking=no",
        ]);
    }
    if let Some(identity) = &opts.identity {
        let key = settings.key_dir().join(identity);
        cmd = cmd.arg("-i").arg(key.to_string_lossy());
    }

    let port = opts.port.unwrap_or(settings.port);
    cmd.arg("-p").arg(port.to_string()).arg(&opts.connection)
}

/// Reverse tunnel: remote `rport` forwards to local `lport`
pub fn reverse_tunnel(
    settings: &SshSettings,
    connection: &str,
    rport: u16,
    lport: u16,
) -> RelayCommand {
    tunnel(settings, "-R", format!("{}:localhost:{}", rport, lport), connection)
}

/// Forward tunnel: local `lport` forwards to remote `rport`
pub fn forward_tunnel(
    settings: &SshSettings,
    connection: &str,
    rport: u16,
    lport: u16,
) -> RelayCommand {
    tunnel(settings, "-L", format!("{}:localhost:{}", lport, rport), connection)
}

fn tunnel(settings: &SshSettings, flag: &str, mapping: String, connection: &str) -> RelayCommand {
    RelayCommand::new(&settings.program)
        .args(["-4", "-N", "-T", flag])
        .arg(mapping)
        .arg(connection)
}
