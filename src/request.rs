//! # Pipe Requests
//!
//! Defines the per-participant bookkeeping for the pipe transfer engine.
//! Every task that sends to or receives from a pipe is represented by one
//! [`Request`], stored in the pipe's slot arena and named by a
//! [`RequestId`] (slot index plus generation).
//!
//! ## Status Machine
//!
//! ```text
//!   ┌──────┐   first bytes moved   ┌──────┐
//!   │ Idle │ ────────────────────► │ Busy │
//!   └──────┘                       └──────┘
//!      │                              │
//!      │  fully transferred           │  fully transferred /
//!      │  / forced release            │  forced release
//!      ▼                              ▼
//!   ┌──────────────────────────────────────┐
//!   │ SatisfiedTerminal | ForcedTerminal   │ ── pending == 0 ──► reply
//!   └──────────────────────────────────────┘
//! ```
//!
//! Once terminal, no new copies start for the request; in-flight copies
//! are drained and the reply is issued when the last one completes.

use crate::wait::{WaitPolicy, WaitState};

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

/// Handle naming a request slot and the generation that occupied it.
///
/// The generation changes every time a slot is released, so a stale handle
/// held by an in-flight move can never alias a recycled request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestId {
    index: u8,
    generation: u16,
}

impl RequestId {
    pub(crate) const fn new(index: usize, generation: u16) -> Self {
        Self {
            index: index as u8,
            generation,
        }
    }

    /// Slot index inside the pipe's request arena.
    #[inline]
    pub const fn index(&self) -> usize {
        self.index as usize
    }

    #[inline]
    pub const fn generation(&self) -> u16 {
        self.generation
    }
}

/// Which end of the pipe a request sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Writer,
    Reader,
}

// ---------------------------------------------------------------------------
// Status and policies
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestStatus {
    /// Admitted, nothing moved yet.
    Idle,
    /// Some bytes moved, more wanted.
    Busy,
    /// Released because its contract was met.
    SatisfiedTerminal,
    /// Released by the engine before its contract could be met.
    ForcedTerminal,
}

impl RequestStatus {
    #[inline]
    pub const fn is_terminal(self) -> bool {
        matches!(self, RequestStatus::SatisfiedTerminal | RequestStatus::ForcedTerminal)
    }
}

/// Transfer contract of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionPolicy {
    /// The full size must move before the request is released, unless the
    /// engine forcibly terminates it.
    AllOrTimeoutOnly,
    /// The request may be released as soon as it can make no further
    /// progress.
    BestEffort,
}

/// Caller-chosen parameters of a send or receive.
#[derive(Debug, Clone, Copy)]
pub struct RequestOptions {
    pub completion: CompletionPolicy,
    pub wait: WaitPolicy,
    /// Priority of the owning task; higher runs its copies first.
    pub priority: u8,
}

impl RequestOptions {
    pub const fn new(completion: CompletionPolicy, wait: WaitPolicy) -> Self {
        Self {
            completion,
            wait,
            priority: 0,
        }
    }

    pub const fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority;
        self
    }
}

// ---------------------------------------------------------------------------
// Caller memory
// ---------------------------------------------------------------------------

/// Caller memory a request moves bytes out of (writers) or into (readers).
/// Borrowed for as long as the request lives and handed back in the reply.
#[derive(Debug)]
pub enum Payload<'a> {
    Source(&'a [u8]),
    Sink(&'a mut [u8]),
}

impl<'a> Payload<'a> {
    pub fn len(&self) -> usize {
        match self {
            Payload::Source(data) => data.len(),
            Payload::Sink(buffer) => buffer.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ---------------------------------------------------------------------------
// Request
// ---------------------------------------------------------------------------

/// One writer or reader request.
#[derive(Debug)]
pub struct Request<'a> {
    pub id: RequestId,
    pub direction: Direction,
    pub status: RequestStatus,
    pub completion: CompletionPolicy,
    pub wait: WaitState,
    pub priority: u8,

    /// Bytes requested.
    pub total_size: usize,
    /// Bytes committed to moves so far. Never decreases, never exceeds
    /// `total_size`, and doubles as the cursor into the caller's memory.
    pub transferred_size: usize,
    /// Moves issued for this request that have not completed yet.
    pub pending_transfers: usize,

    /// True while the request sits in the pipe's writer or reader FIFO.
    pub listed: bool,

    pub(crate) payload: Payload<'a>,
}

impl<'a> Request<'a> {
    pub(crate) fn new(id: RequestId, payload: Payload<'a>, options: RequestOptions) -> Self {
        let direction = match payload {
            Payload::Source(_) => Direction::Writer,
            Payload::Sink(_) => Direction::Reader,
        };
        Self {
            id,
            direction,
            status: RequestStatus::Idle,
            completion: options.completion,
            wait: WaitState::new(options.wait),
            priority: options.priority,
            total_size: payload.len(),
            transferred_size: 0,
            pending_transfers: 0,
            listed: false,
            payload,
        }
    }

    /// Bytes still to move.
    #[inline]
    pub fn remaining(&self) -> usize {
        self.total_size - self.transferred_size
    }

    #[inline]
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    #[inline]
    pub fn is_complete(&self) -> bool {
        self.transferred_size == self.total_size
    }

    /// Commit `len` more bytes to a new in-flight move and return the
    /// offset in the caller's memory where they start.
    pub(crate) fn begin_transfer(&mut self, len: usize) -> usize {
        assert!(len <= self.remaining(), "transfer past the end of request {:?}", self.id);
        let offset = self.transferred_size;
        self.transferred_size += len;
        self.pending_transfers += 1;
        offset
    }

    /// Status a forced release ends in.
    pub(crate) fn forced_status(&self) -> RequestStatus {
        match self.completion {
            CompletionPolicy::BestEffort => RequestStatus::SatisfiedTerminal,
            CompletionPolicy::AllOrTimeoutOnly => RequestStatus::ForcedTerminal,
        }
    }

    /// The writer's source bytes, with the borrow's full lifetime.
    pub(crate) fn source(&self) -> &'a [u8] {
        match self.payload {
            Payload::Source(data) => data,
            Payload::Sink(_) => panic!("request {:?} is not a writer", self.id),
        }
    }

    pub(crate) fn sink_mut(&mut self) -> &mut [u8] {
        match &mut self.payload {
            Payload::Sink(buffer) => &mut buffer[..],
            Payload::Source(_) => panic!("request {:?} is not a reader", self.id),
        }
    }
}

// ---------------------------------------------------------------------------
// Reply
// ---------------------------------------------------------------------------

/// Final outcome of a request, returned to its owner together with the
/// memory it borrowed.
#[derive(Debug)]
pub struct Reply<'a> {
    pub id: RequestId,
    pub direction: Direction,
    pub status: RequestStatus,
    pub transferred_size: usize,
    pub payload: Payload<'a>,
}

impl<'a> Reply<'a> {
    /// Bytes that moved: the written prefix for writers, the received
    /// prefix for readers.
    pub fn data(&self) -> &[u8] {
        match &self.payload {
            Payload::Source(data) => &data[..self.transferred_size],
            Payload::Sink(buffer) => &buffer[..self.transferred_size],
        }
    }

    /// True when the full requested size moved.
    pub fn is_complete(&self) -> bool {
        self.transferred_size == self.payload.len()
    }

    /// Give the reader's buffer back to its owner.
    pub fn into_sink(self) -> Option<&'a mut [u8]> {
        match self.payload {
            Payload::Sink(buffer) => Some(buffer),
            Payload::Source(_) => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------
