//! Flowwatch CLI entrypoint.

use clap::Parser;
use std::path::PathBuf;

mod commands;
mod handlers;
mod logging;

use commands::{Commands, LogFormat};

#[derive(Parser)]
#[command(name = "flowwatch")]
#[command(author, version, about = "Live status of CI build flows", long_about = None)]
struct Cli {
    /// Configuration file
    #[arg(short, long, global = true, env = "FLOWWATCH_CONFIG", default_value = "flowwatch.yaml")]
    config: PathBuf,

    /// Log output format
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    logging::init(cli.log_format);

    match cli.command {
        Commands::Serve { listen } => handlers::serve(&cli.config, listen).await?,
        Commands::Validate { path } => handlers::validate(&path)?,
        Commands::Map { path, flow } => handlers::map(&path, &flow)?,
        Commands::Inspect { server, job, build } => {
            handlers::inspect(&cli.config, &server, &job, build).await?
        }
    }

    Ok(())
}
