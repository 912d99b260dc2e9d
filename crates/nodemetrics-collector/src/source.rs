use std::sync::{Mutex, PoisonError};

use nodemetrics_common::error::{MetricsError, Result};
use sysinfo::System;
use tokio::runtime::Handle;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemoryStats {
    pub total_bytes: u64,
    pub free_bytes: u64,
}

pub trait SampleSource: Send + Sync {
    fn hostname(&self) -> Result<String>;

    fn memory(&self) -> Result<MemoryStats>;

    fn task_count(&self) -> Result<u64>;

    fn thread_count(&self) -> Result<u64>;
}

pub struct SystemSource {
    system: Mutex<System>,
    runtime: Option<Handle>,
}

impl SystemSource {
    pub fn new() -> Self {
        Self::with_runtime(Handle::try_current().ok())
    }

    pub fn with_runtime(runtime: Option<Handle>) -> Self {
        Self {
            system: Mutex::new(System::new()),
            runtime,
        }
    }
}

impl Default for SystemSource {
    fn default() -> Self {
        Self::new()
    }
}

impl SampleSource for SystemSource {
    fn hostname(&self) -> Result<String> {
        System::host_name()
            .ok_or_else(|| MetricsError::SourceUnavailable("hostname".to_string()))
    }

    fn memory(&self) -> Result<MemoryStats> {
        if !sysinfo::IS_SUPPORTED_SYSTEM {
            return Err(MetricsError::SourceUnavailable(
                "host memory is not supported on this platform".to_string(),
            ));
        }

        let mut system = self.system.lock().unwrap_or_else(PoisonError::into_inner);
        system.refresh_memory();

        let total_bytes = system.total_memory();
        if total_bytes == 0 {
            return Err(MetricsError::SourceUnavailable(
                "host memory reported zero total".to_string(),
            ));
        }

        Ok(MemoryStats {
            total_bytes,
            free_bytes: system.free_memory(),
        })
    }

    fn task_count(&self) -> Result<u64> {
        let runtime = self.runtime.as_ref().ok_or_else(|| {
            MetricsError::SourceUnavailable("no tokio runtime attached".to_string())
        })?;
        Ok(runtime.metrics().num_alive_tasks() as u64)
    }

    fn thread_count(&self) -> Result<u64> {
        read_thread_count()
    }
}

#[cfg(target_os = "linux")]
fn read_thread_count() -> Result<u64> {
    let status = std::fs::read_to_string("/proc/self/status")?;
    parse_status_field(&status, "Threads:").ok_or_else(|| {
        MetricsError::SourceUnavailable("Threads missing from /proc/self/status".to_string())
    })
}

#[cfg(not(target_os = "linux"))]
fn read_thread_count() -> Result<u64> {
    Err(MetricsError::SourceUnavailable(
        "thread count is only read on linux".to_string(),
    ))
}

#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
fn parse_status_field(status: &str, field: &str) -> Option<u64> {
    status.lines().find_map(|line| {
        line.strip_prefix(field)?
            .split_whitespace()
            .next()
            .and_then(|value| value.parse::<u64>().ok())
    })
}
