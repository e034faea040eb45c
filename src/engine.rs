//! # Pipe Engine
//!
//! Single-threaded actor around one [`Pipe`]. Every mutation of the pipe
//! arrives as an [`Event`] and events are handled strictly one at a time,
//! which gives the pipe the serialization it relies on without any lock
//! of its own.
//!
//! ```text
//!   submit_write / submit_read ──► NewWrite / NewRead ──┐
//!   tick(now)                  ──► Tick                 ├──► events ──► step()
//!   copy engine (per leg)      ──► MoveComplete ────────┘                │
//!          ▲                                                              │
//!          └──────────── dispatch(): highest-priority move ◄─────────────┘
//! ```
//!
//! Pending events always go first; a move is only dispatched to the copy
//! engine once the event queue is empty.
//!
//! Submissions and ticks leave `2 * MAX_MOVES` queue entries free. The pipe
//! never has more than `MAX_MOVES` moves in flight, so every leg the copy
//! engine reports finds room.

use heapless::Deque;
use log::debug;

use crate::config::{PipeConfig, EVENT_QUEUE_DEPTH, MAX_MOVES};
use crate::error::PipeError;
use crate::movedata::{Leg, MoveOp};
use crate::pipe::Pipe;
use crate::request::{Payload, Reply, RequestId, RequestOptions};

/// Queue entries held back for completion legs.
const COMPLETION_RESERVE: usize = 2 * MAX_MOVES;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    NewWrite(RequestId),
    NewRead(RequestId),
    MoveComplete { op: MoveOp, leg: Leg },
    /// Kernel tick count advanced to the given value.
    Tick(u64),
}

pub struct Engine<'a> {
    pipe: Pipe<'a>,
    events: Deque<Event, EVENT_QUEUE_DEPTH>,
}

impl<'a> Engine<'a> {
    pub fn new(storage: &'a mut [u8], config: PipeConfig) -> Self {
        Self {
            pipe: Pipe::new(storage, config),
            events: Deque::new(),
        }
    }

    /// Queue a writer request. The id is valid immediately; the request
    /// is admitted when its event is handled.
    pub fn submit_write(&mut self, data: &'a [u8], options: RequestOptions) -> Result<RequestId, PipeError> {
        self.submit(Payload::Source(data), options)
    }

    /// Queue a reader request.
    pub fn submit_read(&mut self, buffer: &'a mut [u8], options: RequestOptions) -> Result<RequestId, PipeError> {
        self.submit(Payload::Sink(buffer), options)
    }

    fn submit(&mut self, payload: Payload<'a>, options: RequestOptions) -> Result<RequestId, PipeError> {
        if !self.has_room() {
            return Err(PipeError::QueueFull);
        }
        let event = match payload {
            Payload::Source(_) => Event::NewWrite,
            Payload::Sink(_) => Event::NewRead,
        };
        let id = self.pipe.reserve(payload, options)?;
        self.post(event(id))?;
        Ok(id)
    }

    /// Advance the pipe's clock. Back-to-back ticks collapse into one.
    pub fn tick(&mut self, now: u64) -> Result<(), PipeError> {
        if let Some(Event::Tick(pending)) = self.events.back_mut() {
            *pending = (*pending).max(now);
            return Ok(());
        }
        if !self.has_room() {
            return Err(PipeError::QueueFull);
        }
        self.post(Event::Tick(now))
    }

    /// Report one finished leg of a move taken with [`Engine::dispatch`].
    /// Always has room as long as each leg is reported once.
    pub fn complete(&mut self, op: MoveOp, leg: Leg) -> Result<(), PipeError> {
        self.post(Event::MoveComplete { op, leg })
    }

    /// Room for an event other than a completion.
    fn has_room(&self) -> bool {
        self.events.len() + COMPLETION_RESERVE < EVENT_QUEUE_DEPTH
    }

    fn post(&mut self, event: Event) -> Result<(), PipeError> {
        self.events.push_back(event).map_err(|_| PipeError::QueueFull)
    }

    /// Hand the highest-priority move to the copy engine and perform the
    /// copy. Its legs are not reported; the caller does that through
    /// [`Engine::complete`].
    pub fn dispatch(&mut self) -> Option<MoveOp> {
        let op = self.pipe.next_move()?;
        self.pipe.execute_move(&op);
        Some(op)
    }

    /// Handle one event, or dispatch one move if no event is pending.
    /// Returns false when there is nothing left to do.
    pub fn step(&mut self) -> bool {
        if let Some(event) = self.events.pop_front() {
            self.handle(event);
            return true;
        }
        let Some(op) = self.dispatch() else {
            return false;
        };
        // The queue is empty here, so both legs fit
        for leg in [Leg::Source, Leg::Destination] {
            if self.complete(op, leg).is_err() {
                panic!("engine: no room for move completion");
            }
        }
        true
    }

    /// Step until the pipe is quiescent. Returns the number of steps.
    pub fn run(&mut self) -> usize {
        let mut steps = 0;
        while self.step() {
            steps += 1;
        }
        steps
    }

    /// Handle queued events only, leaving moves with the copy engine.
    pub fn run_events(&mut self) -> usize {
        let mut handled = 0;
        while let Some(event) = self.events.pop_front() {
            self.handle(event);
            handled += 1;
        }
        handled
    }

    fn handle(&mut self, event: Event) {
        match event {
            Event::NewWrite(id) | Event::NewRead(id) => self.pipe.admit(id),
            Event::MoveComplete { op, leg } => self.pipe.on_move_complete(&op, leg),
            Event::Tick(now) => {
                debug!("engine: tick {}", now);
                self.pipe.expire_due(now);
            }
        }
    }

    pub fn take_reply(&mut self) -> Option<Reply<'a>> {
        self.pipe.take_reply()
    }

    pub fn pipe(&self) -> &Pipe<'a> {
        &self.pipe
    }

    pub fn pending_events(&self) -> usize {
        self.events.len()
    }
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------
