//! # opsize-core
//!
//! Low-level resource accounting for profiled containers.
//!
//! This crate provides safe readers over:
//! - **Cgroups v1 and v2**: cumulative CPU time and working-set memory of a
//!   container, located from the runtime's container ID.
//! - **Host CPU time**: aggregate CPU time from `/proc/stat`, used to turn a
//!   container's CPU delta into a percentage.
//!
//! Everything the sampler needs is reached through the [`CounterSource`]
//! trait so that tests can substitute scripted counters.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod cgroup;
pub mod host;

use opsize_common::error::Result;
use opsize_common::types::ContainerId;

/// Raw cumulative counters captured at one instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawCounters {
    /// Cumulative CPU time consumed by the container, in nanoseconds.
    pub container_cpu_ns: u64,
    /// Cumulative CPU time of the whole host across all cores, in nanoseconds.
    pub host_cpu_ns: u64,
    /// Current working-set memory of the container, in bytes.
    pub memory_bytes: u64,
    /// Number of online host CPUs.
    pub online_cpus: u32,
}

/// Source of raw resource counters for a running container.
///
/// Implementations must return an error for which
/// [`OpsizeError::is_not_found`](opsize_common::error::OpsizeError::is_not_found)
/// holds when the container's accounting group does not exist.
pub trait CounterSource: Send + Sync {
    /// Reads the current counters of the given container.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the container's cgroup is absent, or
    /// `CgroupRead` if a counter file cannot be read or parsed.
    fn read(&self, id: &ContainerId) -> Result<RawCounters>;
}
