//! Test utilities for thinkgate - in-memory backend
//!
//! [`MockBackend`] stands in for the upstream server in lifecycle tests so
//! sweeps can run without HTTP and with full control over failures.

use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;

use crate::error::{Result, ThinkgateError};
use crate::lifecycle::ModelBackend;

type UnloadHook = Arc<dyn Fn(&str) + Send + Sync>;

#[derive(Default)]
struct MockState {
    loaded: Vec<String>,
    unloads: Vec<String>,
    reply: String,
    fail_listing: bool,
    fail_unloads: bool,
    on_unload: Option<UnloadHook>,
}

/// Scriptable [`ModelBackend`].
///
/// A successful unload removes the model from the loaded list, the way the
/// real server does.
#[derive(Default)]
pub struct MockBackend {
    state: Mutex<MockState>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_loaded(models: &[&str]) -> Self {
        let backend = Self::new();
        backend.set_loaded(models);
        backend
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        // A panicking test must not poison the others
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn set_loaded(&self, models: &[&str]) {
        self.state().loaded = models.iter().map(|m| m.to_string()).collect();
    }

    pub fn loaded(&self) -> Vec<String> {
        self.state().loaded.clone()
    }

    /// Models unloaded so far, in call order
    pub fn unloads(&self) -> Vec<String> {
        self.state().unloads.clone()
    }

    pub fn set_reply(&self, reply: &str) {
        self.state().reply = reply.to_string();
    }

    pub fn fail_listing(&self, fail: bool) {
        self.state().fail_listing = fail;
    }

    pub fn fail_unloads(&self, fail: bool) {
        self.state().fail_unloads = fail;
    }

    /// Run `hook` inside every unload call, before it completes
    pub fn on_unload(&self, hook: impl Fn(&str) + Send + Sync + 'static) {
        self.state().on_unload = Some(Arc::new(hook));
    }
}

#[async_trait]
impl ModelBackend for MockBackend {
    async fn list_loaded(&self) -> Result<Vec<String>> {
        let state = self.state();
        if state.fail_listing {
            return Err(ThinkgateError::Upstream("listing unavailable".to_string()));
        }
        Ok(state.loaded.clone())
    }

    async fn unload(&self, model: &str) -> Result<()> {
        let hook = self.state().on_unload.clone();
        if let Some(hook) = hook {
            hook(model);
        }

        let mut state = self.state();
        if state.fail_unloads {
            return Err(ThinkgateError::Upstream(format!("cannot unload {model}")));
        }
        state.loaded.retain(|m| m != model);
        state.unloads.push(model.to_string());
        Ok(())
    }

    async fn generate(&self, _model: &str, _prompt: &str) -> Result<String> {
        Ok(self.state().reply.clone())
    }
}
