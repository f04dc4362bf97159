//! Ragframe CLI - upload documents and ask questions against them

mod cli;
mod commands;

use clap::Parser;
use cli::{Cli, Commands};
use colored::Colorize;
use ragframe_foundation::RagConfig;
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // RUST_LOG wins over --verbose
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let rt = tokio::runtime::Runtime::new()?;
    if let Err(err) = rt.block_on(run_command_async(cli)) {
        eprintln!("{} {:#}", "error:".red().bold(), err);
        std::process::exit(1);
    }
    Ok(())
}

async fn run_command_async(cli: Cli) -> anyhow::Result<()> {
    let path = cli.config.as_deref().map(|p| p.to_string_lossy().into_owned());
    let config = RagConfig::load_with_env(path.as_deref())?;

    match cli.command {
        Commands::Upload { db, text, file, pdf } => {
            let source = commands::upload::Source::from_args(text, file, pdf)?;
            commands::upload::run(&config, db, source).await?;
        }
        Commands::Query(args) => {
            commands::query::run(&config, args).await?;
        }
    }

    Ok(())
}
