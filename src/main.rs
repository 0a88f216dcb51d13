use anyhow::{Context, Result};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use putools::commands;
use putools::config::{Config, Settings};
use putools_core::Session;

fn main() -> Result<()> {
    // Parse CLI arguments
    let cli = Config::parse_args();

    // Setup logging
    setup_logging(cli.debug);

    // Load settings
    let mut settings = Settings::load(cli.config.as_ref())?;
    settings.merge_cli(&cli);
    settings.validate();

    let command = commands::build(&cli.command, &settings)?;
    if cli.is_verbose() {
        println!("RUNNING: {}", command);
    }
    tracing::debug!("Relaying {}", command);

    let exit = Session::new(command)
        .with_config(settings.relay_config())
        .run()
        .context("Relay session failed")?;

    if let Some(signal) = &exit.signal {
        tracing::debug!("Child terminated by signal {}", signal);
    }
    std::process::exit(i32::try_from(exit.code).unwrap_or(1));
}

fn setup_logging(debug: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if debug {
            EnvFilter::new("putools=debug,putools_core=debug")
        } else {
            EnvFilter::new("putools=info,putools_core=info")
        }
    });

    // stderr, so log lines never mix with relayed output
    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();
}
