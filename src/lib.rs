//! # EqPipe: Pipe Transfer Engine for EqOS
//!
//! Multi-writer/multi-reader pipes for ARM Cortex-M4 microcontrollers.
//! Writers and readers are coupled through a bounded byte reservoir, or
//! directly when a reader is already waiting, with every byte copy issued
//! as an asynchronous Move Operation.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────┐
//! │                    Application Tasks                    │
//! ├────────────────────────────────────────────────────────┤
//! │                 Kernel API (kernel.rs)                  │
//! │   init() · pipe_create() · pipe_put() · pipe_get()     │
//! ├────────────────────────────────────────────────────────┤
//! │              Engine Actor (engine.rs)                   │
//! │       NewWrite · NewRead · MoveComplete · Tick         │
//! ├──────────────┬────────────────────┬───────────────────┤
//! │  Scheduler   │   Direct Movers    │  Completion       │
//! │  process.rs  │   transfer.rs      │  ack.rs           │
//! ├──────────────┴────────────────────┴───────────────────┤
//! │  Reservoir · Move Ops · Stall Detectors · Wait Timers  │
//! ├────────────────────────────────────────────────────────┤
//! │            Arch Port (arch/cortex_m4.rs)                │
//! │              SysTick · PendSV                           │
//! └────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Request Lifecycle
//!
//! ```text
//!   Idle ──► Busy ──► SatisfiedTerminal ─┐
//!     │        │                          ├─► pending moves drain ─► Reply
//!     └────────┴────► ForcedTerminal ─────┘
//! ```
//!
//! - `AllOrTimeoutOnly` requests end `SatisfiedTerminal` only with every
//!   byte moved; a release before that is `ForcedTerminal`.
//! - `BestEffort` requests may be released early and still count as
//!   satisfied.
//! - Bytes reach readers in writer arrival order. Buffered bytes are never
//!   overtaken by the direct path.
//!
//! ## Memory Model
//!
//! - **No heap**: pipes, requests and moves live in fixed-size tables
//! - **No `alloc`**: `core` plus `heapless` collections
//! - **Borrowed payloads**: requests borrow caller memory; replies return it
//! - **Critical sections**: `critical_section::with()` for the pipe table

#![cfg_attr(not(test), no_std)]

pub mod config;
pub mod error;
pub mod wait;
pub mod request;
pub mod reservoir;
pub mod movedata;
pub mod stall;
pub mod pipe;
pub mod engine;
pub mod arch;
pub mod kernel;
pub mod sync;

pub use config::{ForcePolicy, PipeConfig};
pub use engine::{Engine, Event};
pub use error::PipeError;
pub use pipe::Pipe;
pub use request::{CompletionPolicy, Direction, Reply, RequestId, RequestOptions, RequestStatus};
pub use wait::{Timeout, WaitPolicy};
