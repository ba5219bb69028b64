use comfy_table::{ContentArrangement, Table, presets::UTF8_FULL_CONDENSED};
use thinkgate::config::Config;
use thinkgate::upstream::{LoadedModel, OllamaClient};

use crate::error::CliResult;
use crate::output::{OutputFormat, format_size};

#[derive(Debug, Default, Clone, Copy)]
pub struct LoadedCommand;

impl LoadedCommand {
    pub async fn execute(&self, config: &Config, format: OutputFormat) -> CliResult<()> {
        let client = OllamaClient::new(&config.upstream)?;
        let models = client.loaded_models().await?;

        match format {
            OutputFormat::Json => {
                println!("{}", serde_json::to_string_pretty(&models)?);
            }
            OutputFormat::Table => {
                if models.is_empty() {
                    println!("No models loaded on {}", client.base_url());
                } else {
                    println!("{}", render_table(&models));
                }
            }
        }

        Ok(())
    }
}

fn render_table(models: &[LoadedModel]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(["Model", "Size", "VRAM", "Expires"]);

    for model in models {
        table.add_row([
            model.name.clone(),
            model.size.map(format_size).unwrap_or_else(|| "-".to_string()),
            model
                .size_vram
                .map(format_size)
                .unwrap_or_else(|| "-".to_string()),
            model.expires_at.clone().unwrap_or_else(|| "-".to_string()),
        ]);
    }

    table
}
