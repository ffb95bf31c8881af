//! # Chime Core Kernel
//!
//! The `kernel` module provides the shared foundation the plugin engine's
//! components are built on: the [`ManagerComponent`](component::ManagerComponent)
//! lifecycle contract, per-component statistics, system-wide constants, and
//! the top-level error type.
//!
//! ## Key Responsibilities & Components:
//!
//! - **Component Lifecycle**: every manager-like component (plugin manager,
//!   dependency validator, service registry, message and communication buses)
//!   implements [`ManagerComponent`](component::ManagerComponent).
//! - **Statistics**: [`ComponentStats`](component::ComponentStats) tracks
//!   operation, error, and cache counters without requiring the component lock.
//! - **Core Constants**: system-wide constants via the `constants` submodule.
//! - **Error Handling**: the aggregated [`Error`](error::Error) enum and
//!   `Result` alias in the `error` submodule.
pub mod component;
pub mod constants;
pub mod error;

pub use component::{ComponentStats, ManagerComponent, StatsSnapshot};
pub use error::{Error, Result};
// Test module declaration
#[cfg(test)]
mod tests;
