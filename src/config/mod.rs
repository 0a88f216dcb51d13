mod settings;

pub use settings::{Command, Config, RelaySettings, RunSettings, Settings, SshSettings};
