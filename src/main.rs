use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use fluvius_consumption::app::{self, EXIT_USAGE};
use fluvius_consumption::auth::PasswordGrant;
use fluvius_consumption::config::{Cli, Config};

fn init_tracing() {
    let filter = EnvFilter::builder()
        .with_default_directive(
            "fluvius_consumption=info"
                .parse()
                .unwrap_or_else(|_| tracing::level_filters::LevelFilter::INFO.into()),
        )
        .from_env_lossy();

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing();

    let config = match Config::try_from(cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}", e);
            return Ok(ExitCode::from(EXIT_USAGE));
        }
    };

    println!("{}", "=".repeat(60));
    println!("FLUVIUS API - CONSUMPTION DATA");
    println!("{}", "=".repeat(60));

    let authenticator = PasswordGrant::new(config.oauth.clone());
    let code = app::run(&config, &authenticator, app::connect)?;
    Ok(ExitCode::from(code))
}
