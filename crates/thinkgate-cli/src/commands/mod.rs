pub mod loaded;
pub mod query;
pub mod tracked;
pub mod unload;

pub use loaded::LoadedCommand;
pub use query::QueryCommand;
pub use tracked::TrackedCommand;
pub use unload::UnloadCommand;

use std::sync::Arc;

use thinkgate::admin::{ACTIVITY_PATH, ModelUse};
use thinkgate::config::Config;
use thinkgate::lifecycle::ModelLifecycleManager;
use thinkgate::thinking::ThinkingFilter;
use thinkgate::upstream::OllamaClient;

use crate::error::CliResult;

/// A lifecycle manager talking straight to the upstream, without the proxy
pub(crate) fn direct_manager(config: &Config, show_thinking: bool) -> CliResult<ModelLifecycleManager> {
    let client = OllamaClient::new(&config.upstream)?;
    let filter = ThinkingFilter::new(&config.thinking)
        .with_show_thinking(show_thinking || config.thinking.show_thinking);

    Ok(ModelLifecycleManager::new(
        &config.lifecycle,
        Arc::new(client),
        filter,
    ))
}

/// Base URL of a proxy given as host:port or URL
pub(crate) fn proxy_base(addr: &str) -> String {
    if addr.contains("://") {
        addr.trim_end_matches('/').to_string()
    } else {
        format!("http://{addr}")
    }
}

/// Tell a running proxy that `model` is in use so its sweep does not unload
/// it. Returns false when no proxy accepted the report.
pub async fn report_use(addr: &str, model: &str) -> bool {
    let url = format!("{}{ACTIVITY_PATH}", proxy_base(addr));
    let reported = ModelUse {
        model: model.to_string(),
    };

    match reqwest::Client::new().post(&url).json(&reported).send().await {
        Ok(response) => response.status().is_success(),
        Err(_) => false,
    }
}
