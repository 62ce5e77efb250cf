//! # opsize-common
//!
//! Shared types, error definitions, run configuration, and constants
//! used across the entire opsize workspace.
//!
//! This crate is the leaf of the dependency graph; it depends on no other
//! internal crate and provides the primitives that the sampler, lifecycle
//! manager, and pipeline runner build upon.

pub mod config;
pub mod constants;
pub mod error;
pub mod types;
