//! Container lifecycle management for profiling runs.
//!
//! Handles:
//! - **Backend**: the [`backend::ContainerRuntime`] seam and its Docker CLI adapter.
//! - **Lifecycle**: networks, side-services, operator launch, bounded waits, teardown.
//! - **Sampler**: concurrent cgroup polling while an operator runs.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod backend;
pub mod lifecycle;
pub mod network;
pub mod sampler;
pub mod service;
