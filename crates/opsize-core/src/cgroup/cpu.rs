//! CPU accounting via cgroups.
//!
//! Reads cumulative CPU time from `cpu.stat` (v2) or `cpuacct.usage` (v1).

use std::path::Path;

use opsize_common::error::{OpsizeError, Result};

/// Reads cumulative CPU time in nanoseconds from a v2 cgroup.
///
/// `cpu.stat` reports `usage_usec` in microseconds.
///
/// # Errors
///
/// Returns `NotFound` if the cgroup vanished, or an error if `usage_usec`
/// is missing.
pub fn read_usage_ns_v2(cgroup_dir: &Path) -> Result<u64> {
    let file = cgroup_dir.join("cpu.stat");
    let usec = super::read_keyed_value(&file, "usage_usec")?.ok_or_else(|| {
        OpsizeError::CgroupRead {
            path: file.clone(),
            message: "usage_usec missing".into(),
        }
    })?;
    Ok(usec.saturating_mul(1000))
}

/// Reads cumulative CPU time in nanoseconds from a v1 `cpuacct` cgroup.
///
/// # Errors
///
/// Returns `NotFound` if the cgroup vanished, or an error if the value
/// cannot be parsed.
pub fn read_usage_ns_v1(cgroup_dir: &Path) -> Result<u64> {
    super::read_single_value(&cgroup_dir.join("cpuacct.usage"))
}
