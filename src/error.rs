//! # Errors
//!
//! Caller-visible failures of the pipe API. Flow control is not an error:
//! a request that cannot be served completes with a short transfer and a
//! terminal status instead. Broken internal invariants panic.

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PipeError {
    /// Every request slot of the pipe is occupied.
    #[error("no free request slot on pipe")]
    NoFreeSlot,
    /// The engine event queue cannot take another event.
    #[error("pipe event queue is full")]
    QueueFull,
    /// The kernel pipe table is full.
    #[error("no free pipe descriptor")]
    NoFreePipe,
    /// No pipe exists for this handle.
    #[error("unknown pipe handle {0}")]
    UnknownPipe(usize),
}
