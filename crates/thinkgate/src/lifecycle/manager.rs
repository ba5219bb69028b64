//! Per-model activity table and idle eviction
//!
//! Request paths record use; the sweep compares each loaded model's last use
//! against the inactivity timeout and asks the upstream to unload it.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::LifecycleConfig;
use crate::error::Result;
use crate::thinking::ThinkingFilter;

use super::ModelBackend;

/// Recency record for one tracked model
#[derive(Debug, Clone)]
pub struct ActivityRecord {
    /// Monotonic time of the last recorded use
    pub last_used: Instant,
    /// Wall-clock time of the last recorded use, for reporting
    pub last_used_at: DateTime<Utc>,
    /// Set while an unload request for this model is in flight
    pub evicting: bool,
}

impl ActivityRecord {
    fn new(at: Instant) -> Self {
        Self {
            last_used: at,
            last_used_at: Utc::now(),
            evicting: false,
        }
    }
}

/// Read-only view of a tracked model
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ActivitySnapshot {
    pub model: String,
    pub last_used_at: DateTime<Utc>,
    pub idle_secs: u64,
    pub evicting: bool,
}

/// What one sweep did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Models seen loaded upstream for the first time
    pub newly_tracked: Vec<String>,
    /// Records dropped because the model is no longer loaded
    pub dropped: Vec<String>,
    /// Models successfully unloaded
    pub evicted: Vec<String>,
    /// Models whose unload request failed (retried next sweep)
    pub failed: Vec<String>,
}

impl SweepReport {
    pub fn is_quiet(&self) -> bool {
        self.newly_tracked.is_empty()
            && self.dropped.is_empty()
            && self.evicted.is_empty()
            && self.failed.is_empty()
    }
}

/// Answer to a direct query
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QueryResponse {
    pub model: String,
    pub response: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thinking: Option<String>,
}

/// Tracks per-model recency and unloads models that sit idle too long.
///
/// The activity table is the one piece of state shared between request
/// handlers (which call [`record_use`](Self::record_use)) and the sweep
/// loop. Each entry is only ever touched through the map's shard locks, and
/// no lock is held across an upstream call.
pub struct ModelLifecycleManager {
    activity: DashMap<String, ActivityRecord>,
    backend: Arc<dyn ModelBackend>,
    filter: ThinkingFilter,
    inactivity_timeout: Duration,
    sweep_interval: Duration,
}

impl ModelLifecycleManager {
    pub fn new(
        config: &LifecycleConfig,
        backend: Arc<dyn ModelBackend>,
        filter: ThinkingFilter,
    ) -> Self {
        Self {
            activity: DashMap::new(),
            backend,
            filter,
            inactivity_timeout: config.inactivity_timeout(),
            sweep_interval: config.sweep_interval(),
        }
    }

    pub fn inactivity_timeout(&self) -> Duration {
        self.inactivity_timeout
    }

    pub fn sweep_interval(&self) -> Duration {
        self.sweep_interval
    }

    /// Mark a model as used now
    pub fn record_use(&self, model: &str) {
        self.record_use_at(model, Instant::now());
    }

    /// Mark a model as used at `at`.
    ///
    /// Clears any eviction in progress for the model, so the sweep that
    /// started it will leave the record in place.
    pub fn record_use_at(&self, model: &str, at: Instant) {
        let mut record = self
            .activity
            .entry(model.to_string())
            .or_insert_with(|| ActivityRecord::new(at));

        if at >= record.last_used {
            record.last_used = at;
            record.last_used_at = Utc::now();
        }
        if record.evicting {
            debug!(model, "Model used while its eviction was in flight");
            record.evicting = false;
        }
    }

    pub fn is_tracked(&self, model: &str) -> bool {
        self.activity.contains_key(model)
    }

    pub fn tracked_count(&self) -> usize {
        self.activity.len()
    }

    /// Snapshot of all tracked models, sorted by name
    pub fn tracked(&self) -> Vec<ActivitySnapshot> {
        let now = Instant::now();
        let mut snapshots: Vec<ActivitySnapshot> = self
            .activity
            .iter()
            .map(|entry| ActivitySnapshot {
                model: entry.key().clone(),
                last_used_at: entry.last_used_at,
                idle_secs: now.saturating_duration_since(entry.last_used).as_secs(),
                evicting: entry.evicting,
            })
            .collect();
        snapshots.sort_by(|a, b| a.model.cmp(&b.model));
        snapshots
    }

    /// Run one sweep against the current time
    pub async fn sweep(&self) -> Result<SweepReport> {
        self.sweep_at(Instant::now()).await
    }

    /// Run one sweep as if the current time were `now`.
    ///
    /// Reconciles the table with the upstream's loaded-model listing, then
    /// unloads every tracked model idle for at least the inactivity timeout.
    /// If the listing cannot be fetched the table is left untouched.
    pub async fn sweep_at(&self, now: Instant) -> Result<SweepReport> {
        let loaded: HashSet<String> = self.backend.list_loaded().await?.into_iter().collect();
        let mut report = SweepReport::default();

        self.activity.retain(|model, _| {
            let keep = loaded.contains(model);
            if !keep {
                report.dropped.push(model.clone());
            }
            keep
        });

        for model in &loaded {
            if !self.activity.contains_key(model) {
                self.activity
                    .entry(model.clone())
                    .or_insert_with(|| ActivityRecord::new(now));
                report.newly_tracked.push(model.clone());
            }
        }

        let mut idle: Vec<(String, Instant)> = self
            .activity
            .iter()
            .filter(|entry| {
                !entry.evicting
                    && now.saturating_duration_since(entry.last_used) >= self.inactivity_timeout
            })
            .map(|entry| (entry.key().clone(), entry.last_used))
            .collect();
        idle.sort_by(|a, b| a.0.cmp(&b.0));

        for (model, observed) in idle {
            match self.evict_idle(&model, observed).await {
                Ok(true) => report.evicted.push(model),
                Ok(false) => {}
                Err(e) => {
                    warn!(model = %model, error = %e, "Failed to unload idle model, will retry");
                    report.failed.push(model);
                }
            }
        }

        report.newly_tracked.sort();
        report.dropped.sort();
        Ok(report)
    }

    /// Unload a model regardless of its recency and forget it on success.
    ///
    /// On failure the record (if any) is kept so a later sweep can retry.
    pub async fn evict(&self, model: &str) -> Result<()> {
        info!(model, "Unloading model");
        self.backend.unload(model).await?;
        self.activity.remove(model);
        Ok(())
    }

    /// Unload a model the sweep found idle with `last_used == observed`.
    ///
    /// Returns `Ok(false)` if the model was used again before the unload was
    /// issued. A use that lands while the unload is in flight keeps the
    /// record alive.
    async fn evict_idle(&self, model: &str, observed: Instant) -> Result<bool> {
        {
            let Some(mut record) = self.activity.get_mut(model) else {
                return Ok(false);
            };
            if record.last_used != observed {
                return Ok(false);
            }
            record.evicting = true;
        }

        let idle_secs = Instant::now().saturating_duration_since(observed).as_secs();
        info!(model, idle_secs, "Unloading idle model");

        match self.backend.unload(model).await {
            Ok(()) => {
                let removed = self
                    .activity
                    .remove_if(model, |_, record| record.evicting && record.last_used == observed);
                if removed.is_none() {
                    debug!(model, "Model used during eviction, keeping its record");
                }
                Ok(true)
            }
            Err(e) => {
                if let Some(mut record) = self.activity.get_mut(model) {
                    record.evicting = false;
                }
                Err(e)
            }
        }
    }

    /// Direct, non-proxied generation.
    ///
    /// Records the use, and strips reasoning regions when the model matches
    /// a reasoning model pattern.
    pub async fn query(&self, model: &str, prompt: &str) -> Result<QueryResponse> {
        self.record_use(model);
        let raw = self.backend.generate(model, prompt).await?;

        if !self.filter.applies_to(model) {
            return Ok(QueryResponse {
                model: model.to_string(),
                response: raw,
                thinking: None,
            });
        }

        let stripped = self.filter.strip(&raw);
        Ok(QueryResponse {
            model: model.to_string(),
            response: stripped.visible,
            thinking: stripped.hidden.filter(|_| self.filter.show_thinking()),
        })
    }
}
