//! Process runtime statistics reported by `/ping`.

use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;
use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System};
use tokio::sync::Mutex;
use tracing::debug;

/// Resident and virtual memory of this process, in bytes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryUsage {
    pub rss: u64,
    pub virtual_memory: u64,
}

/// Point-in-time view of the process.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsSnapshot {
    /// Seconds since the process started
    pub uptime: f64,
    pub started_at: DateTime<Utc>,
    pub memory_usage: MemoryUsage,
}

/// Queryable process statistics.
pub struct RuntimeStats {
    started: Instant,
    started_at: DateTime<Utc>,
    pid: Option<Pid>,
    system: Mutex<System>,
}

impl RuntimeStats {
    pub fn new() -> Self {
        let pid = sysinfo::get_current_pid()
            .map_err(|e| debug!("Process id unavailable, memory stats disabled: {}", e))
            .ok();

        Self {
            started: Instant::now(),
            started_at: Utc::now(),
            pid,
            system: Mutex::new(System::new()),
        }
    }

    /// Seconds since start.
    pub fn uptime_secs(&self) -> f64 {
        self.started.elapsed().as_secs_f64()
    }

    /// Current memory usage. Zeroes when the process cannot be inspected.
    pub async fn memory(&self) -> MemoryUsage {
        let Some(pid) = self.pid else {
            return MemoryUsage::default();
        };

        let mut system = self.system.lock().await;
        system.refresh_processes_specifics(
            ProcessesToUpdate::Some(&[pid]),
            true,
            ProcessRefreshKind::nothing().with_memory(),
        );

        system
            .process(pid)
            .map(|process| MemoryUsage {
                rss: process.memory(),
                virtual_memory: process.virtual_memory(),
            })
            .unwrap_or_default()
    }

    pub async fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            uptime: self.uptime_secs(),
            started_at: self.started_at,
            memory_usage: self.memory().await,
        }
    }
}

impl Default for RuntimeStats {
    fn default() -> Self {
        Self::new()
    }
}
