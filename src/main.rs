mod cli;
mod commands;

use clap::Parser;
use cli::{Cli, Commands};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

#[tokio::main(flavor = "current_thread")]
async fn main() -> miette::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose)?;

    match cli.command {
        Commands::New {
            package,
            prompts,
            defaults,
            dry_run,
        } => commands::new::run(package, prompts, defaults, dry_run, cli.verbose).await,
        Commands::Check { package } => commands::check::run(package).await,
    }
}

fn init_tracing(verbose: bool) -> miette::Result<()> {
    let fallback = if verbose { "warn,stamp=debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(fallback))
        .into_diagnostic()?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
    Ok(())
}
