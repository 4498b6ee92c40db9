//! azrm - Declarative Azure Resource Manager modules
//!
//! This is the main entry point for the azrm CLI.

mod cli;

use anyhow::Result;
use azrm::config::{Config, LogFormat, LoggingConfig};
use cli::commands::CommandContext;
use cli::{Cli, Commands};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // Parse command line arguments
    let cli = Cli::parse_args();

    // Load configuration
    let config = Config::load(cli.config.as_deref())?;

    // Initialize logging based on verbosity and configuration
    init_logging(cli.verbosity(), &config.logging);

    if cli.verbosity() >= 2 {
        eprintln!("azrm v{}", azrm::VERSION);
    }

    let mut ctx = CommandContext::new(&cli, config);

    let exit_code = match &cli.command {
        Commands::Run(args) => args.execute(&mut ctx).await?,
        Commands::List(args) => args.execute(&mut ctx).await?,
        Commands::Describe(args) => args.execute(&mut ctx).await?,
    };

    std::process::exit(exit_code);
}

/// Initialize logging. `RUST_LOG` wins, then `-v`, then the configured level.
/// Logs always go to stderr; stdout carries the result record.
fn init_logging(verbosity: u8, logging: &LoggingConfig) {
    let filter = match verbosity {
        0 => logging.level.as_str(),
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(filter))
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    match logging.format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .with(env_filter)
            .init(),
        LogFormat::Text => tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(verbosity >= 3),
            )
            .with(env_filter)
            .init(),
    }
}
