use clap::Parser;
use thinkgate::config::Config;

use crate::commands::direct_manager;
use crate::error::CliResult;
use crate::output::OutputFormat;

#[derive(Parser)]
pub struct UnloadCommand {
    #[clap(help = "Model to unload")]
    pub model: String,
}

impl UnloadCommand {
    pub async fn execute(&self, config: &Config, format: OutputFormat) -> CliResult<()> {
        let manager = direct_manager(config, false)?;
        manager.evict(&self.model).await?;

        match format {
            OutputFormat::Json => {
                let output = serde_json::json!({ "unloaded": self.model });
                println!("{}", serde_json::to_string_pretty(&output)?);
            }
            OutputFormat::Table => println!("Unloaded {}", self.model),
        }

        Ok(())
    }
}
