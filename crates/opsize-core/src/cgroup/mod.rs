//! Cgroup resource accounting.
//!
//! Locates a container's cgroup under either the v2 unified hierarchy or
//! the v1 per-controller hierarchies at `/sys/fs/cgroup`, and reads its
//! cumulative CPU time and working-set memory.

pub mod cpu;
pub mod memory;

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use opsize_common::error::{OpsizeError, Result};
use opsize_common::types::ContainerId;

use crate::host::{self, HostCpu};
use crate::{CounterSource, RawCounters};

/// `ENODEV`, returned when reading a control file of a cgroup being removed.
const ENODEV: i32 = 19;

/// Which cgroup hierarchy the host mounts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CgroupLayout {
    /// Legacy per-controller hierarchies (`cpuacct/`, `memory/`).
    V1,
    /// Unified hierarchy.
    V2,
}

impl CgroupLayout {
    /// Detects the layout mounted at `root`.
    ///
    /// The unified hierarchy exposes `cgroup.controllers` at its root.
    #[must_use]
    pub fn detect(root: &Path) -> Self {
        if root.join("cgroup.controllers").exists() {
            Self::V2
        } else {
            Self::V1
        }
    }
}

/// Reads container counters from the cgroup filesystem.
#[derive(Debug, Clone)]
pub struct CgroupReader {
    root: PathBuf,
    layout: CgroupLayout,
    proc_stat: PathBuf,
    host: HostCpu,
}

impl CgroupReader {
    /// Creates a reader for the live system.
    ///
    /// # Errors
    ///
    /// Returns an error if the host CPU properties cannot be queried.
    pub fn detect() -> Result<Self> {
        let root = PathBuf::from(opsize_common::constants::CGROUP_ROOT);
        let layout = CgroupLayout::detect(&root);
        let host = HostCpu::detect()?;
        tracing::info!(root = %root.display(), ?layout, "cgroup hierarchy detected");
        Ok(Self::with_paths(
            root,
            layout,
            opsize_common::constants::PROC_STAT_PATH,
            host,
        ))
    }

    /// Creates a reader over explicit paths.
    #[must_use]
    pub fn with_paths(
        root: impl Into<PathBuf>,
        layout: CgroupLayout,
        proc_stat: impl Into<PathBuf>,
        host: HostCpu,
    ) -> Self {
        Self {
            root: root.into(),
            layout,
            proc_stat: proc_stat.into(),
            host,
        }
    }

    /// Returns the detected layout.
    #[must_use]
    pub const fn layout(&self) -> CgroupLayout {
        self.layout
    }

    /// Returns the first existing directory among the candidates.
    fn locate(candidates: Vec<PathBuf>, id: &ContainerId) -> Result<PathBuf> {
        candidates
            .into_iter()
            .find(|p| p.is_dir())
            .ok_or_else(|| OpsizeError::NotFound {
                kind: "cgroup",
                id: id.to_string(),
            })
    }

    fn v2_candidates(&self, id: &ContainerId) -> Vec<PathBuf> {
        vec![
            self.root
                .join("system.slice")
                .join(format!("docker-{id}.scope")),
            self.root.join("docker").join(id.as_str()),
        ]
    }

    fn v1_candidates(&self, controller: &str, id: &ContainerId) -> Vec<PathBuf> {
        let base = self.root.join(controller);
        vec![
            base.join("docker").join(id.as_str()),
            base.join("system.slice").join(format!("docker-{id}.scope")),
        ]
    }
}

impl CounterSource for CgroupReader {
    fn read(&self, id: &ContainerId) -> Result<RawCounters> {
        let (container_cpu_ns, memory_bytes) = match self.layout {
            CgroupLayout::V2 => {
                let dir = Self::locate(self.v2_candidates(id), id)?;
                (
                    cpu::read_usage_ns_v2(&dir)?,
                    memory::read_working_set_v2(&dir)?,
                )
            }
            CgroupLayout::V1 => {
                let cpu_dir = Self::locate(self.v1_candidates("cpuacct", id), id)?;
                let mem_dir = Self::locate(self.v1_candidates("memory", id), id)?;
                (
                    cpu::read_usage_ns_v1(&cpu_dir)?,
                    memory::read_working_set_v1(&mem_dir)?,
                )
            }
        };
        let host_cpu_ns = host::read_host_cpu_ns(&self.proc_stat, self.host.clock_ticks)?;
        Ok(RawCounters {
            container_cpu_ns,
            host_cpu_ns,
            memory_bytes,
            online_cpus: self.host.online_cpus,
        })
    }
}

/// Reads a control file, mapping a vanished cgroup to `NotFound`.
pub(crate) fn read_control_file(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).map_err(|e| {
        if e.kind() == ErrorKind::NotFound || e.raw_os_error() == Some(ENODEV) {
            OpsizeError::NotFound {
                kind: "cgroup",
                id: path.display().to_string(),
            }
        } else {
            OpsizeError::CgroupRead {
                path: path.to_path_buf(),
                message: e.to_string(),
            }
        }
    })
}

/// Parses a single-value control file such as `memory.current`.
pub(crate) fn read_single_value(path: &Path) -> Result<u64> {
    let content = read_control_file(path)?;
    content.trim().parse().map_err(|_| OpsizeError::CgroupRead {
        path: path.to_path_buf(),
        message: format!("expected an integer, got \"{}\"", content.trim()),
    })
}

/// Looks up a key in a flat-keyed file such as `cpu.stat` or `memory.stat`.
pub(crate) fn read_keyed_value(path: &Path, key: &str) -> Result<Option<u64>> {
    let content = read_control_file(path)?;
    Ok(content.lines().find_map(|line| {
        let mut parts = line.split_whitespace();
        (parts.next() == Some(key))
            .then(|| parts.next().and_then(|v| v.parse().ok()))
            .flatten()
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    const ID: &str = "4f7a";

    fn host() -> HostCpu {
        HostCpu {
            online_cpus: 4,
            clock_ticks: 100,
        }
    }

    fn write(path: &Path, content: &str) {
        std::fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
        std::fs::write(path, content).expect("write");
    }

    #[test]
    fn detects_unified_layout() {
        let dir = tempfile::tempdir().expect("tempdir");
        assert_eq!(CgroupLayout::detect(dir.path()), CgroupLayout::V1);
        write(&dir.path().join("cgroup.controllers"), "cpu memory\n");
        assert_eq!(CgroupLayout::detect(dir.path()), CgroupLayout::V2);
    }

    #[test]
    fn reads_v2_systemd_scope() {
        let dir = tempfile::tempdir().expect("tempdir");
        let scope = dir.path().join("system.slice").join(format!("docker-{ID}.scope"));
        write(&scope.join("cpu.stat"), "usage_usec 2500\nuser_usec 2000\n");
        write(&scope.join("memory.current"), "50000000\n");
        write(&scope.join("memory.stat"), "anon 1\ninactive_file 10000000\n");
        let stat = dir.path().join("stat");
        write(&stat, "cpu  1 1 1 1 1 1 1 0 0 0\n");

        let reader = CgroupReader::with_paths(dir.path(), CgroupLayout::V2, &stat, host());
        let counters = reader.read(&ContainerId::new(ID)).expect("read");
        assert_eq!(counters.container_cpu_ns, 2_500_000);
        assert_eq!(counters.memory_bytes, 40_000_000);
        assert_eq!(counters.host_cpu_ns, 70_000_000);
        assert_eq!(counters.online_cpus, 4);
    }

    #[test]
    fn reads_v1_controllers() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cpu = dir.path().join("cpuacct").join("docker").join(ID);
        let mem = dir.path().join("memory").join("docker").join(ID);
        write(&cpu.join("cpuacct.usage"), "123456\n");
        write(&mem.join("memory.usage_in_bytes"), "2000000\n");
        write(&mem.join("memory.stat"), "total_inactive_file 500000\n");
        let stat = dir.path().join("stat");
        write(&stat, "cpu  1 1 1 1 1 1 1\n");

        let reader = CgroupReader::with_paths(dir.path(), CgroupLayout::V1, &stat, host());
        let counters = reader.read(&ContainerId::new(ID)).expect("read");
        assert_eq!(counters.container_cpu_ns, 123_456);
        assert_eq!(counters.memory_bytes, 1_500_000);
    }

    #[test]
    fn missing_cgroup_is_not_found() {
        let dir = tempfile::tempdir().expect("tempdir");
        let reader =
            CgroupReader::with_paths(dir.path(), CgroupLayout::V2, dir.path().join("stat"), host());
        let err = reader.read(&ContainerId::new(ID)).unwrap_err();
        assert!(err.is_not_found(), "got: {err}");
    }

    #[test]
    fn vanished_control_file_is_not_found() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = read_single_value(&dir.path().join("memory.current")).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn garbage_value_is_read_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("memory.current");
        write(&path, "max\n");
        let err = read_single_value(&path).unwrap_err();
        assert!(!err.is_not_found());
        assert!(err.to_string().contains("expected an integer"), "got: {err}");
    }

    #[test]
    fn keyed_value_lookup() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("cpu.stat");
        write(&path, "usage_usec 10\nuser_usec 7\n");
        assert_eq!(read_keyed_value(&path, "user_usec").expect("read"), Some(7));
        assert_eq!(read_keyed_value(&path, "nr_periods").expect("read"), None);
    }
}
