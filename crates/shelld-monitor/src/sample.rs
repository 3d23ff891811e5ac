//! Per-PID sample collection. Linux reads `/proc/<pid>/io` for byte
//! counters; other platforms report zero for metrics `ps` can't surface.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sysinfo::{Pid, ProcessesToUpdate, System};

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct MetricSelection {
    pub cpu: bool,
    pub memory: bool,
    pub io: bool,
    pub network: bool,
}

impl MetricSelection {
    pub fn all() -> Self {
        Self {
            cpu: true,
            memory: true,
            io: true,
            network: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorSample {
    pub timestamp: DateTime<Utc>,
    pub cpu_percent: Option<f32>,
    pub memory_bytes: Option<u64>,
    pub io_read_bytes: Option<u64>,
    pub io_write_bytes: Option<u64>,
    pub network_bytes: Option<u64>,
}

/// Sample one pid via `sysinfo`, falling back to zeroed io/network fields on
/// platforms with no cheap per-process io accounting.
pub fn sample_pid(system: &mut System, pid: i32, selection: MetricSelection) -> Option<MonitorSample> {
    let sys_pid = Pid::from_u32(pid as u32);
    system.refresh_processes(ProcessesToUpdate::Some(&[sys_pid]), true);
    let process = system.process(sys_pid)?;

    let cpu_percent = selection.cpu.then(|| process.cpu_usage());
    let memory_bytes = selection.memory.then(|| process.memory());
    let (io_read_bytes, io_write_bytes) = if selection.io {
        read_proc_io(pid).unwrap_or((Some(0), Some(0)))
    } else {
        (None, None)
    };
    let network_bytes = selection.network.then_some(0);

    Some(MonitorSample {
        timestamp: Utc::now(),
        cpu_percent,
        memory_bytes,
        io_read_bytes,
        io_write_bytes,
        network_bytes,
    })
}

#[cfg(target_os = "linux")]
fn read_proc_io(pid: i32) -> Option<(Option<u64>, Option<u64>)> {
    let contents = std::fs::read_to_string(format!("/proc/{pid}/io")).ok()?;
    let mut read_bytes = None;
    let mut write_bytes = None;
    for line in contents.lines() {
        if let Some(v) = line.strip_prefix("read_bytes:") {
            read_bytes = v.trim().parse::<u64>().ok();
        } else if let Some(v) = line.strip_prefix("write_bytes:") {
            write_bytes = v.trim().parse::<u64>().ok();
        }
    }
    Some((read_bytes, write_bytes))
}

#[cfg(not(target_os = "linux"))]
fn read_proc_io(_pid: i32) -> Option<(Option<u64>, Option<u64>)> {
    Some((Some(0), Some(0)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn samples_current_process() {
        let mut system = System::new();
        let pid = std::process::id() as i32;
        let sample = sample_pid(&mut system, pid, MetricSelection::all());
        assert!(sample.is_some());
    }

    #[test]
    fn unselected_metrics_are_none() {
        let mut system = System::new();
        let pid = std::process::id() as i32;
        let sample = sample_pid(&mut system, pid, MetricSelection::default()).unwrap();
        assert!(sample.cpu_percent.is_none());
        assert!(sample.memory_bytes.is_none());
        assert!(sample.network_bytes.is_none());
    }
}
