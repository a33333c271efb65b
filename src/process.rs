//! Resource snapshots of the process under test.

use std::{
    fs,
    sync::{Mutex, PoisonError},
    time::Duration,
};

use sysinfo::{ProcessRefreshKind, ProcessesToUpdate, System};

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ProcessSnapshot {
    /// User + system CPU time consumed so far.
    pub cpu_time_secs: f64,
    pub thread_count: usize,
    pub resident_memory_bytes: u64,
    /// Size of the executable on disk, 0 if it cannot be resolved.
    pub binary_size_bytes: u64,
}

#[derive(thiserror::Error, Debug)]
pub enum ProcessSampleError {
    #[error("Empty process name")]
    EmptyName,
    #[error("Process '{0}' not found")]
    NotFound(String),
}

pub trait ProcessSampler: Send + Sync {
    fn sample(&self, name: &str) -> Result<ProcessSnapshot, ProcessSampleError>;
}

/// Figures derived from the snapshots taken around one trial.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ProcessUsage {
    /// CPU seconds burnt per wall-clock second; `None` without a "before" snapshot.
    pub cpu_per_sec: Option<f64>,
    pub thread_count: usize,
    pub resident_memory_bytes: u64,
}

impl ProcessUsage {
    pub fn between(
        before: Option<&ProcessSnapshot>,
        after: &ProcessSnapshot,
        elapsed: Duration,
    ) -> Self {
        let cpu_per_sec = before
            .filter(|_| !elapsed.is_zero())
            .map(|before| (after.cpu_time_secs - before.cpu_time_secs) / elapsed.as_secs_f64());
        Self {
            cpu_per_sec,
            thread_count: after.thread_count,
            resident_memory_bytes: after.resident_memory_bytes,
        }
    }
}

/// Samples through `sysinfo`. A process matches on an exact or case-insensitive
/// substring name match; the first match wins.
pub struct SysinfoSampler {
    system: Mutex<System>,
}

impl SysinfoSampler {
    pub fn new() -> Self {
        Self {
            system: Mutex::new(System::new()),
        }
    }
}

impl Default for SysinfoSampler {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessSampler for SysinfoSampler {
    fn sample(&self, name: &str) -> Result<ProcessSnapshot, ProcessSampleError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ProcessSampleError::EmptyName);
        }
        let needle = name.to_lowercase();
        let own_pid = sysinfo::get_current_pid().ok();

        let mut system = self.system.lock().unwrap_or_else(PoisonError::into_inner);
        system.refresh_processes_specifics(
            ProcessesToUpdate::All,
            true,
            ProcessRefreshKind::everything(),
        );

        let process = system
            .processes()
            .values()
            .filter(|p| Some(p.pid()) != own_pid)
            .find(|p| {
                let pname = p.name().to_string_lossy();
                pname == name || pname.to_lowercase().contains(&needle)
            })
            .ok_or_else(|| ProcessSampleError::NotFound(name.to_string()))?;

        let binary_size_bytes = process
            .exe()
            .and_then(|exe| fs::metadata(exe).ok())
            .map(|meta| meta.len())
            .unwrap_or(0);

        Ok(ProcessSnapshot {
            // reported in milliseconds
            cpu_time_secs: process.accumulated_cpu_time() as f64 / 1000.0,
            thread_count: process.tasks().map(|tasks| tasks.len()).unwrap_or(1).max(1),
            resident_memory_bytes: process.memory(),
            binary_size_bytes,
        })
    }
}
