//! # Architecture Abstraction Layer
//!
//! Provides a hardware abstraction boundary for the kernel tick and the
//! deferred engine run. Currently implements the Cortex-M4 port; host
//! builds (unit tests) compile without any port and drive
//! `kernel::tick()` / `kernel::run_pending()` directly.

#[cfg(all(target_arch = "arm", target_os = "none"))]
pub mod cortex_m4;
