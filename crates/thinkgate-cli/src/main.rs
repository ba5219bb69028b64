use std::path::PathBuf;

use clap::{Parser, Subcommand};
use thinkgate::config::Config;
use thinkgate_cli::commands::{LoadedCommand, QueryCommand, TrackedCommand, UnloadCommand};
use thinkgate_cli::error::CliResult;
use thinkgate_cli::output::OutputFormat;

#[derive(Parser)]
#[command(name = "thinkgate-cli")]
#[command(about = "Thinkgate CLI - query models and manage what the upstream has loaded")]
#[command(version)]
pub struct Cli {
    #[clap(long, short, global = true, help = "Output in JSON format")]
    pub json: bool,

    #[clap(long, short = 'c', global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    #[clap(long, global = true, help = "Upstream server, host:port or URL")]
    pub upstream: Option<String>,

    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    #[clap(about = "Send a prompt straight to the upstream, stripping reasoning")]
    Query(QueryCommand),

    #[clap(about = "List models currently loaded upstream")]
    Loaded,

    #[clap(about = "Unload a model from the upstream now")]
    Unload(UnloadCommand),

    #[clap(about = "Show the activity table of a running proxy")]
    Tracked(TrackedCommand),
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

async fn run() -> CliResult<()> {
    let cli = Cli::parse();

    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Table
    };

    let mut config = Config::load(cli.config.as_deref())?;
    config.apply_env_overrides();
    if let Some(upstream) = &cli.upstream {
        config.upstream.host = upstream.clone();
    }
    config.validate()?;

    match &cli.command {
        Command::Query(cmd) => cmd.execute(&config, format).await,
        Command::Loaded => LoadedCommand.execute(&config, format).await,
        Command::Unload(cmd) => cmd.execute(&config, format).await,
        Command::Tracked(cmd) => cmd.execute(&config, format).await,
    }
}
