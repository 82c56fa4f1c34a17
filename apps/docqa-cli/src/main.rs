mod commands;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use commands::{handle_ask, handle_chat, handle_index, Cli, Commands};

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let ctx = commands::Context::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Index { rebuild, pdf_dir, index_dir } => {
            handle_index(&ctx, rebuild, pdf_dir, index_dir)?
        }
        Commands::Ask { question, k, show_context } => {
            handle_ask(&ctx, &question, k, show_context)?
        }
        Commands::Chat { show_context } => handle_chat(&ctx, show_context)?,
    }

    Ok(())
}
