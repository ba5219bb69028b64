use clap::Parser;
use comfy_table::{ContentArrangement, Table, presets::UTF8_FULL_CONDENSED};
use thinkgate::admin::{MODELS_PATH, TrackedModels};
use thinkgate::config::Config;

use crate::commands::proxy_base;
use crate::error::{CliError, CliResult};
use crate::output::{OutputFormat, format_idle, format_timestamp};

#[derive(Parser)]
pub struct TrackedCommand {
    #[clap(
        long,
        help = "Address of a running proxy (defaults to the configured listen address)"
    )]
    pub proxy: Option<String>,
}

impl TrackedCommand {
    pub async fn execute(&self, config: &Config, format: OutputFormat) -> CliResult<()> {
        let proxy = self
            .proxy
            .clone()
            .unwrap_or_else(|| config.proxy.listen_addr.clone());
        let tracked = fetch_tracked(&proxy).await?;

        match format {
            OutputFormat::Json => {
                println!("{}", serde_json::to_string_pretty(&tracked)?);
            }
            OutputFormat::Table => {
                println!(
                    "Tracked models (unloaded after {} idle)",
                    format_idle(tracked.inactivity_timeout_secs)
                );
                println!("======================\n");

                if tracked.models.is_empty() {
                    println!("No models tracked");
                    return Ok(());
                }

                let mut table = Table::new();
                table
                    .load_preset(UTF8_FULL_CONDENSED)
                    .set_content_arrangement(ContentArrangement::Dynamic)
                    .set_header(["Model", "Last Used (UTC)", "Idle", "State"]);

                for model in &tracked.models {
                    let state = if model.evicting {
                        "evicting"
                    } else if model.idle_secs >= tracked.inactivity_timeout_secs {
                        "idle"
                    } else {
                        "active"
                    };
                    table.add_row([
                        model.model.clone(),
                        format_timestamp(&model.last_used_at),
                        format_idle(model.idle_secs),
                        state.to_string(),
                    ]);
                }

                println!("{table}");
            }
        }

        Ok(())
    }
}

/// Fetch the activity table from a running proxy at `addr` (host:port or URL)
pub async fn fetch_tracked(addr: &str) -> CliResult<TrackedModels> {
    let base = proxy_base(addr);
    let url = format!("{base}{MODELS_PATH}");

    let response = reqwest::get(&url)
        .await
        .map_err(|e| CliError(format!("Could not reach proxy at {base}: {e}")))?;
    if !response.status().is_success() {
        return Err(CliError(format!(
            "Proxy at {base} answered {}",
            response.status()
        )));
    }

    Ok(response.json().await?)
}
