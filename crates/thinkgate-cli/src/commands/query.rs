use clap::Parser;
use thinkgate::config::Config;

use crate::commands::{direct_manager, report_use};
use crate::error::CliResult;
use crate::output::OutputFormat;

#[derive(Parser)]
pub struct QueryCommand {
    #[clap(long, short, help = "Model to query")]
    pub model: String,

    #[clap(help = "Prompt text")]
    pub prompt: String,

    #[clap(long, help = "Print the model's reasoning as well as the answer")]
    pub show_thinking: bool,

    #[clap(
        long,
        help = "Proxy to report this use to (defaults to the configured listen address)"
    )]
    pub proxy: Option<String>,
}

impl QueryCommand {
    pub async fn execute(&self, config: &Config, format: OutputFormat) -> CliResult<()> {
        let proxy = self
            .proxy
            .clone()
            .unwrap_or_else(|| config.proxy.listen_addr.clone());
        report_use(&proxy, &self.model).await;

        let manager = direct_manager(config, self.show_thinking)?;
        let reply = manager.query(&self.model, &self.prompt).await?;

        match format {
            OutputFormat::Json => {
                println!("{}", serde_json::to_string_pretty(&reply)?);
            }
            OutputFormat::Table => {
                if let Some(thinking) = &reply.thinking {
                    println!("Thinking");
                    println!("========\n");
                    println!("{}\n", thinking.trim());
                    println!("Answer");
                    println!("======\n");
                }
                println!("{}", reply.response.trim());
            }
        }

        Ok(())
    }
}
