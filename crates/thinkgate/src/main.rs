//! Thinkgate daemon - filtering proxy with idle model eviction

use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use thinkgate::config::Config;
use thinkgate::error::Result;
use thinkgate::proxy::ProxyServer;

/// Thinkgate - strips reasoning tags from local LLM output and unloads idle models
#[derive(Parser, Debug)]
#[command(name = "thinkgate")]
#[command(about = "A streaming proxy for local LLM servers that strips reasoning tags and unloads idle models")]
#[command(version)]
pub struct Cli {
    /// Path to config file
    #[arg(long, short = 'c')]
    pub config: Option<PathBuf>,

    /// Port to listen on (keeps the configured bind address)
    #[arg(long, short = 'p')]
    pub port: Option<u16>,

    /// Full listen address, e.g. 0.0.0.0:11435
    #[arg(long, conflicts_with = "port")]
    pub listen: Option<String>,

    /// Upstream server, host:port or URL
    #[arg(long)]
    pub upstream: Option<String>,

    /// Seconds without use before a model is unloaded
    #[arg(long, value_name = "SECS")]
    pub inactivity_timeout: Option<u64>,

    /// Seconds between eviction sweeps
    #[arg(long, value_name = "SECS")]
    pub sweep_interval: Option<u64>,

    /// Surface reasoning in the `thinking` field instead of discarding it
    #[arg(long)]
    pub show_thinking: bool,

    /// Never unload idle models
    #[arg(long)]
    pub no_evict: bool,
}

impl Cli {
    /// Apply command-line flags on top of file and environment settings
    fn apply(&self, config: &mut Config) {
        if let Some(listen) = &self.listen {
            config.proxy.listen_addr = listen.clone();
        } else if let Some(port) = self.port {
            let host = config
                .proxy
                .listen_addr
                .rsplit_once(':')
                .map(|(host, _)| host.to_string())
                .unwrap_or_else(|| "127.0.0.1".to_string());
            config.proxy.listen_addr = format!("{host}:{port}");
        }
        if let Some(upstream) = &self.upstream {
            config.upstream.host = upstream.clone();
        }
        if let Some(secs) = self.inactivity_timeout {
            config.lifecycle.inactivity_timeout_secs = secs;
        }
        if let Some(secs) = self.sweep_interval {
            config.lifecycle.sweep_interval_secs = secs;
        }
        if self.show_thinking {
            config.thinking.show_thinking = true;
        }
        if self.no_evict {
            config.lifecycle.enabled = false;
        }
    }
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    init_logging();

    let cli = Cli::parse();

    let mut config = Config::load(cli.config.as_deref())?;
    config.apply_env_overrides();
    cli.apply(&mut config);
    config.validate()?;
    tracing::debug!("Config loaded: {:?}", config);

    tracing::info!("Starting thinkgate daemon");
    ProxyServer::new(config).serve().await?;

    tracing::info!("Thinkgate daemon stopped");
    Ok(())
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,thinkgate=debug"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}
