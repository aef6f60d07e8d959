//! Resource usage of the orchestrating process
//!
//! Figures are taken from this process (not from inside the container) and
//! stand in for the cost of the workload. With concurrent requests, CPU time
//! of neighbouring requests is attributed to every one of them.

use std::time::Instant;

use serde::Serialize;

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Usage measured around one backend call
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ResourceUsage {
    /// Wall clock seconds
    pub duration: f64,
    pub cpu_percent: f64,
    pub memory_mb: f64,
}

/// Snapshot taken before a call; [`finish()`](Self::finish) yields the usage
#[derive(Debug, Clone, Copy)]
pub struct ResourceProbe {
    started: Instant,
    cpu_seconds: f64,
}

impl ResourceProbe {
    pub fn start() -> Self {
        Self {
            started: Instant::now(),
            cpu_seconds: process_cpu_seconds(),
        }
    }

    pub fn finish(&self) -> ResourceUsage {
        let duration = self.started.elapsed().as_secs_f64();
        let cpu = (process_cpu_seconds() - self.cpu_seconds).max(0.0);
        let cpu_percent = if duration > 0.0 {
            cpu / duration * 100.0
        } else {
            0.0
        };

        ResourceUsage {
            duration,
            cpu_percent,
            memory_mb: resident_memory_bytes() as f64 / BYTES_PER_MB,
        }
    }
}

fn rusage_self() -> Option<libc::rusage> {
    // SAFETY: getrusage only writes into the zeroed struct we pass
    unsafe {
        let mut usage: libc::rusage = std::mem::zeroed();
        (libc::getrusage(libc::RUSAGE_SELF, &mut usage) == 0).then_some(usage)
    }
}

/// User plus system CPU seconds consumed by this process
fn process_cpu_seconds() -> f64 {
    let Some(usage) = rusage_self() else {
        return 0.0;
    };
    let seconds = |tv: libc::timeval| tv.tv_sec as f64 + tv.tv_usec as f64 / 1_000_000.0;
    seconds(usage.ru_utime) + seconds(usage.ru_stime)
}

/// Resident set size in bytes
fn resident_memory_bytes() -> u64 {
    #[cfg(target_os = "linux")]
    {
        if let Ok(statm) = std::fs::read_to_string("/proc/self/statm")
            && let Some(pages) = statm
                .split_whitespace()
                .nth(1)
                .and_then(|s| s.parse::<u64>().ok())
        {
            return pages * page_size();
        }
    }

    // Peak RSS; kilobytes on Linux, bytes on macOS
    match rusage_self() {
        #[cfg(target_os = "macos")]
        Some(usage) => usage.ru_maxrss.max(0) as u64,
        #[cfg(not(target_os = "macos"))]
        Some(usage) => usage.ru_maxrss.max(0) as u64 * 1024,
        None => 0,
    }
}

#[cfg(target_os = "linux")]
fn page_size() -> u64 {
    // SAFETY: sysconf has no preconditions
    let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if size > 0 { size as u64 } else { 4096 }
}
