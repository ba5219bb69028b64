//! Model usage tracking and idle eviction
//!
//! - [`ModelBackend`]: the upstream operations the manager depends on
//! - [`manager`]: activity table, sweep and eviction logic
//! - [`sweeper`]: the background loop that runs sweeps on an interval

pub mod manager;
pub mod sweeper;

use async_trait::async_trait;

use crate::error::Result;

pub use manager::{ActivitySnapshot, ModelLifecycleManager, QueryResponse, SweepReport};
pub use sweeper::SweeperHandle;

/// Upstream operations needed to track and evict models
///
/// Implemented by [`crate::upstream::OllamaClient`] for real traffic and by
/// [`crate::testing::MockBackend`] in tests.
#[async_trait]
pub trait ModelBackend: Send + Sync {
    /// Names of the models currently loaded upstream
    async fn list_loaded(&self) -> Result<Vec<String>>;

    /// Request that a model be released immediately
    async fn unload(&self, model: &str) -> Result<()>;

    /// One-shot, non-streaming generation
    async fn generate(&self, model: &str, prompt: &str) -> Result<String>;
}
