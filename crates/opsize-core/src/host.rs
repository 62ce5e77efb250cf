//! Host-wide CPU accounting.
//!
//! Container CPU usage is reported as a share of the host's total CPU
//! time over the same window, so every sample also needs the aggregate
//! counters of `/proc/stat` and the number of online CPUs.

use std::path::Path;

use opsize_common::error::{OpsizeError, Result};

/// Fields of the aggregate `cpu` line that count as busy or idle time:
/// user, nice, system, idle, iowait, irq, softirq.
const CPU_STAT_FIELDS: usize = 7;

const NANOS_PER_SEC_INT: u128 = 1_000_000_000;

/// Static properties of the host CPU set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostCpu {
    /// Number of online CPUs.
    pub online_cpus: u32,
    /// Kernel clock ticks per second (`USER_HZ`).
    pub clock_ticks: u64,
}

impl HostCpu {
    /// Queries the running kernel via `sysconf`.
    ///
    /// # Errors
    ///
    /// Returns an error if either value is unavailable.
    #[cfg(target_os = "linux")]
    pub fn detect() -> Result<Self> {
        use nix::unistd::{SysconfVar, sysconf};

        let query = |var: SysconfVar, name: &str| -> Result<u64> {
            sysconf(var)
                .ok()
                .flatten()
                .and_then(|v| u64::try_from(v).ok())
                .filter(|v| *v > 0)
                .ok_or_else(|| OpsizeError::Config {
                    message: format!("sysconf({name}) is unavailable"),
                })
        };

        let online = query(SysconfVar::_NPROCESSORS_ONLN, "_SC_NPROCESSORS_ONLN")?;
        let clock_ticks = query(SysconfVar::CLK_TCK, "_SC_CLK_TCK")?;
        let host = Self {
            online_cpus: u32::try_from(online).unwrap_or(u32::MAX),
            clock_ticks,
        };
        tracing::debug!(online_cpus = host.online_cpus, clock_ticks, "host CPU detected");
        Ok(host)
    }

    /// Stub for non-Linux platforms.
    ///
    /// # Errors
    ///
    /// Always returns an error; cgroup accounting requires Linux.
    #[cfg(not(target_os = "linux"))]
    pub fn detect() -> Result<Self> {
        Err(OpsizeError::Config {
            message: "Linux required for cgroup resource accounting".into(),
        })
    }
}

/// Reads the aggregate host CPU time from a `/proc/stat` formatted file.
///
/// # Errors
///
/// Returns an error if the file cannot be read or has no `cpu` line.
pub fn read_host_cpu_ns(proc_stat: &Path, clock_ticks: u64) -> Result<u64> {
    let content = std::fs::read_to_string(proc_stat).map_err(|e| OpsizeError::Io {
        path: proc_stat.to_path_buf(),
        source: e,
    })?;
    let ticks = parse_cpu_ticks(&content).ok_or_else(|| OpsizeError::CgroupRead {
        path: proc_stat.to_path_buf(),
        message: "no aggregate cpu line".into(),
    })?;
    Ok(ticks_to_ns(ticks, clock_ticks))
}

/// Sums the first seven counters of the aggregate `cpu` line.
fn parse_cpu_ticks(content: &str) -> Option<u64> {
    let line = content
        .lines()
        .find(|l| l.split_whitespace().next() == Some("cpu"))?;
    let fields: Vec<u64> = line
        .split_whitespace()
        .skip(1)
        .take(CPU_STAT_FIELDS)
        .map(str::parse)
        .collect::<std::result::Result<_, _>>()
        .ok()?;
    (fields.len() == CPU_STAT_FIELDS).then(|| fields.iter().sum())
}

fn ticks_to_ns(ticks: u64, clock_ticks: u64) -> u64 {
    let ns = u128::from(ticks) * NANOS_PER_SEC_INT / u128::from(clock_ticks.max(1));
    u64::try_from(ns).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    const PROC_STAT: &str = "\
cpu  100 20 30 400 5 6 7 8 0 0
cpu0 50 10 15 200 2 3 3 4 0 0
cpu1 50 10 15 200 3 3 4 4 0 0
intr 12345
";

    #[test]
    fn sums_first_seven_fields() {
        assert_eq!(parse_cpu_ticks(PROC_STAT), Some(568));
    }

    #[test]
    fn ignores_per_cpu_lines() {
        let content = "cpu0 1 1 1 1 1 1 1\ncpu  2 2 2 2 2 2 2\n";
        assert_eq!(parse_cpu_ticks(content), Some(14));
    }

    #[test]
    fn short_line_is_rejected() {
        assert_eq!(parse_cpu_ticks("cpu 1 2 3\n"), None);
        assert_eq!(parse_cpu_ticks("intr 1\n"), None);
    }

    #[test]
    fn converts_ticks_to_nanoseconds() {
        assert_eq!(ticks_to_ns(100, 100), 1_000_000_000);
        assert_eq!(ticks_to_ns(50, 100), 500_000_000);
    }

    #[test]
    fn reads_host_cpu_from_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("stat");
        std::fs::write(&path, PROC_STAT).expect("write");
        let ns = read_host_cpu_ns(&path, 100).expect("read");
        assert_eq!(ns, 5_680_000_000);
    }

    #[test]
    fn missing_file_is_io_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = read_host_cpu_ns(&dir.path().join("nope"), 100).unwrap_err();
        assert!(err.to_string().contains("I/O error"), "got: {err}");
    }
}
