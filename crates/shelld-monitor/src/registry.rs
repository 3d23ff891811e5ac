//! Monitor (C8): one repeating sampler per monitor id, each capped at 1000
//! retained samples, plus a 5-minute system-wide stats snapshot.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use shelld_core::ids::MonitorId;
use shelld_core::{Result, ShelldError};
use sysinfo::System;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::warn;

use crate::sample::{sample_pid, MetricSelection, MonitorSample};

const HISTORY_CAP: usize = 1_000;
const DEFAULT_INTERVAL_MS: u64 = 1_000;
const SYSTEM_STATS_INTERVAL_SECS: u64 = 300;

struct MonitorHandle {
    pid: i32,
    history: Arc<RwLock<VecDeque<MonitorSample>>>,
    stop: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SystemStats {
    pub load_average_1: f64,
    pub load_average_5: f64,
    pub load_average_15: f64,
    pub total_memory_mib: u64,
    pub used_memory_mib: u64,
    pub free_memory_mib: u64,
    pub uptime_seconds: u64,
    pub active_monitor_count: usize,
    pub sampled_at: DateTime<Utc>,
}

pub struct MonitorRegistry {
    monitors: RwLock<HashMap<MonitorId, MonitorHandle>>,
    system_stats: RwLock<Option<SystemStats>>,
}

impl MonitorRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            monitors: RwLock::new(HashMap::new()),
            system_stats: RwLock::new(None),
        })
    }

    pub fn monitor_count(&self) -> usize {
        self.monitors.try_read().map(|m| m.len()).unwrap_or(0)
    }

    pub async fn create(
        self: &Arc<Self>,
        pid: i32,
        selection: MetricSelection,
        interval_ms: Option<u64>,
    ) -> MonitorId {
        let id = MonitorId::generate();
        let interval = Duration::from_millis(interval_ms.unwrap_or(DEFAULT_INTERVAL_MS));
        let history = Arc::new(RwLock::new(VecDeque::new()));
        let stop = Arc::new(AtomicBool::new(false));

        let history_for_task = history.clone();
        let stop_for_task = stop.clone();
        let id_for_task = id.clone();
        let task = tokio::spawn(async move {
            let mut system = System::new();
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                if stop_for_task.load(Ordering::SeqCst) {
                    break;
                }
                match sample_pid(&mut system, pid, selection) {
                    Some(sample) => {
                        let mut history = history_for_task.write().await;
                        history.push_back(sample);
                        if history.len() > HISTORY_CAP {
                            history.pop_front();
                        }
                    }
                    None => {
                        warn!(monitor_id = %id_for_task, pid, "sampler failed to read process; stopping");
                        break;
                    }
                }
            }
        });

        self.monitors.write().await.insert(
            id.clone(),
            MonitorHandle {
                pid,
                history,
                stop,
                task,
            },
        );
        id
    }

    pub async fn history(&self, monitor_id: &MonitorId) -> Result<Vec<MonitorSample>> {
        let monitors = self.monitors.read().await;
        let handle = monitors
            .get(monitor_id)
            .ok_or_else(|| ShelldError::not_found("monitor", monitor_id.to_string()))?;
        Ok(handle.history.read().await.iter().cloned().collect())
    }

    pub async fn stop(&self, monitor_id: &MonitorId) -> Result<()> {
        let mut monitors = self.monitors.write().await;
        let handle = monitors
            .remove(monitor_id)
            .ok_or_else(|| ShelldError::not_found("monitor", monitor_id.to_string()))?;
        handle.stop.store(true, Ordering::SeqCst);
        handle.task.abort();
        Ok(())
    }

    pub async fn list(&self) -> Vec<(MonitorId, i32)> {
        self.monitors
            .read()
            .await
            .iter()
            .map(|(id, h)| (id.clone(), h.pid))
            .collect()
    }

    pub fn latest_system_stats(&self) -> Option<SystemStats> {
        self.system_stats.try_read().ok().and_then(|g| g.clone())
    }

    /// Spawn the 5-minute system-stats sampler.
    pub fn spawn_system_stats_sampler(self: &Arc<Self>) -> JoinHandle<()> {
        let this = self.clone();
        tokio::spawn(async move {
            let mut system = System::new_all();
            let mut ticker = tokio::time::interval(Duration::from_secs(SYSTEM_STATS_INTERVAL_SECS));
            loop {
                ticker.tick().await;
                system.refresh_memory();
                let load = System::load_average();
                let stats = SystemStats {
                    load_average_1: load.one,
                    load_average_5: load.five,
                    load_average_15: load.fifteen,
                    total_memory_mib: system.total_memory() / (1024 * 1024),
                    used_memory_mib: system.used_memory() / (1024 * 1024),
                    free_memory_mib: system.free_memory() / (1024 * 1024),
                    uptime_seconds: System::uptime(),
                    active_monitor_count: this.monitor_count(),
                    sampled_at: Utc::now(),
                };
                *this.system_stats.write().await = Some(stats);
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_and_stop_roundtrip() {
        let registry = MonitorRegistry::new();
        let pid = std::process::id() as i32;
        let id = registry.create(pid, MetricSelection::all(), Some(20)).await;
        tokio::time::sleep(Duration::from_millis(80)).await;
        let history = registry.history(&id).await.unwrap();
        assert!(!history.is_empty());
        registry.stop(&id).await.unwrap();
        assert!(registry.history(&id).await.is_err());
    }

    #[tokio::test]
    async fn unknown_monitor_is_not_found() {
        let registry = MonitorRegistry::new();
        let bogus = MonitorId::generate();
        assert!(registry.history(&bogus).await.is_err());
        assert!(registry.stop(&bogus).await.is_err());
    }
}
