//! Memory accounting via cgroups.
//!
//! Reports the working set: current usage minus inactive page cache,
//! matching what `docker stats` shows.

use std::path::Path;

use opsize_common::error::Result;

/// Reads working-set memory in bytes from a v2 cgroup.
///
/// # Errors
///
/// Returns `NotFound` if the cgroup vanished, or an error if
/// `memory.current` cannot be parsed.
pub fn read_working_set_v2(cgroup_dir: &Path) -> Result<u64> {
    let usage = super::read_single_value(&cgroup_dir.join("memory.current"))?;
    let inactive = read_inactive(cgroup_dir, "inactive_file")?;
    Ok(usage.saturating_sub(inactive))
}

/// Reads working-set memory in bytes from a v1 `memory` cgroup.
///
/// # Errors
///
/// Returns `NotFound` if the cgroup vanished, or an error if
/// `memory.usage_in_bytes` cannot be parsed.
pub fn read_working_set_v1(cgroup_dir: &Path) -> Result<u64> {
    let usage = super::read_single_value(&cgroup_dir.join("memory.usage_in_bytes"))?;
    let inactive = read_inactive(cgroup_dir, "total_inactive_file")?;
    Ok(usage.saturating_sub(inactive))
}

/// Inactive file cache; a missing `memory.stat` counts as zero.
fn read_inactive(cgroup_dir: &Path, key: &str) -> Result<u64> {
    let stat = cgroup_dir.join("memory.stat");
    if !stat.exists() {
        return Ok(0);
    }
    Ok(super::read_keyed_value(&stat, key)?.unwrap_or(0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn v2_without_stat_reports_raw_usage() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("memory.current"), "1048576\n").expect("write");
        assert_eq!(read_working_set_v2(dir.path()).expect("read"), 1_048_576);
    }

    #[test]
    fn inactive_cache_never_underflows() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("memory.usage_in_bytes"), "100\n").expect("write");
        std::fs::write(dir.path().join("memory.stat"), "total_inactive_file 500\n").expect("write");
        assert_eq!(read_working_set_v1(dir.path()).expect("read"), 0);
    }
}
