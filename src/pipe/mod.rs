//! # Pipe
//!
//! A pipe couples any number of writer requests with any number of reader
//! requests through one bounded [`Reservoir`]. This module holds the pipe's
//! state and request bookkeeping; the transfer engine itself is split into:
//!
//! - [`transfer`]: direct movers (`pipe_write`, `pipe_read`,
//!   `pipe_read_write`) that issue Move Operations
//! - [`process`]: the transfer scheduler loop with stall resolution
//! - [`ack`]: the copy primitive body and the completion handler
//!
//! ## Control Loop
//!
//! ```text
//!   submit_write / submit_read
//!          │
//!          ▼
//!   ┌─────────────┐  issue   ┌──────────────┐  copy   ┌──────────────┐
//!   │  process()  │ ───────► │ Direct Mover │ ──────► │ copy engine  │
//!   └─────────────┘          └──────────────┘         └──────────────┘
//!          ▲                                                 │
//!          │               on_move_complete (per leg)        │
//!          └─────────────────────────────────────────────────┘
//! ```
//!
//! The pipe never blocks. Every entry point runs to completion and leaves
//! further progress to later completion events.
//!
//! ## Storage
//!
//! - Requests live in a fixed slot arena (`[Slot; MAX_REQUESTS]`)
//! - Writer and reader FIFOs hold `RequestId`s in arrival order
//! - Issued moves wait in a priority heap until the copy engine takes them;
//!   every move counts against `MAX_MOVES` until both of its legs report
//! - Replies queue until the owner collects them. A slot is reused only
//!   after its reply has been taken

mod ack;
mod process;
mod transfer;

use heapless::binary_heap::{BinaryHeap, Max};
use heapless::{Deque, Vec};
use log::debug;

use crate::config::{PipeConfig, MAX_MOVES, MAX_REQUESTS};
use crate::error::PipeError;
use crate::movedata::{Leg, MoveKind, MoveOp};
use crate::request::{Direction, Payload, Reply, Request, RequestId, RequestOptions, RequestStatus};
use crate::reservoir::Reservoir;

// ---------------------------------------------------------------------------
// Slot arena
// ---------------------------------------------------------------------------

struct Slot<'a> {
    generation: u16,
    request: Option<Request<'a>>,
    /// Reply queued but not yet taken by the owner.
    reply_pending: bool,
}

impl<'a> Slot<'a> {
    const EMPTY: Self = Self {
        generation: 0,
        request: None,
        reply_pending: false,
    };

    fn is_free(&self) -> bool {
        self.request.is_none() && !self.reply_pending
    }
}

/// Legs still outstanding for one issued move.
#[derive(Debug, Clone, Copy)]
struct InFlight {
    seq: u32,
    source_done: bool,
    destination_done: bool,
}

// ---------------------------------------------------------------------------
// Pipe
// ---------------------------------------------------------------------------

pub struct Pipe<'a> {
    config: PipeConfig,
    slots: [Slot<'a>; MAX_REQUESTS],
    writers: Vec<RequestId, MAX_REQUESTS>,
    readers: Vec<RequestId, MAX_REQUESTS>,
    reservoir: Reservoir<'a>,
    moves: BinaryHeap<MoveOp, Max, MAX_MOVES>,
    in_flight: Vec<InFlight, MAX_MOVES>,
    replies: Deque<Reply<'a>, MAX_REQUESTS>,
    next_seq: u32,
}

impl<'a> Pipe<'a> {
    /// Create a pipe whose reservoir lives in `storage`.
    pub fn new(storage: &'a mut [u8], config: PipeConfig) -> Self {
        Self {
            config,
            slots: [Slot::EMPTY; MAX_REQUESTS],
            writers: Vec::new(),
            readers: Vec::new(),
            reservoir: Reservoir::new(storage),
            moves: BinaryHeap::new(),
            in_flight: Vec::new(),
            replies: Deque::new(),
            next_seq: 0,
        }
    }

    // --- Produced surface ---------------------------------------------------

    /// Submit a writer request and run the engine on it right away.
    pub fn submit_write(&mut self, data: &'a [u8], options: RequestOptions) -> Result<RequestId, PipeError> {
        let id = self.reserve(Payload::Source(data), options)?;
        self.admit(id);
        Ok(id)
    }

    /// Submit a reader request and run the engine on it right away.
    pub fn submit_read(&mut self, buffer: &'a mut [u8], options: RequestOptions) -> Result<RequestId, PipeError> {
        let id = self.reserve(Payload::Sink(buffer), options)?;
        self.admit(id);
        Ok(id)
    }

    /// Place a request in the arena without processing it. It stays
    /// `Idle` and unlisted until [`Pipe::admit`] runs.
    ///
    /// Fails with [`PipeError::NoFreeSlot`] while every slot holds a live
    /// request or an untaken reply.
    pub fn reserve(&mut self, payload: Payload<'a>, options: RequestOptions) -> Result<RequestId, PipeError> {
        let index = self
            .slots
            .iter()
            .position(Slot::is_free)
            .ok_or(PipeError::NoFreeSlot)?;
        let slot = &mut self.slots[index];
        let id = RequestId::new(index, slot.generation);
        slot.request = Some(Request::new(id, payload, options));
        Ok(id)
    }

    /// Run the scheduler with a reserved request as the unlisted
    /// participant, then queue it if it may still wait or release it if
    /// it may not.
    pub fn admit(&mut self, id: RequestId) {
        let Some(req) = self.request(id) else {
            return;
        };
        let direction = req.direction;
        debug!("pipe: admit {:?} {:?} size={}", direction, id, req.total_size);

        if req.total_size == 0 {
            self.satisfy(id);
            self.reply(id);
            return;
        }

        match direction {
            Direction::Writer => self.process(Some(id), None),
            Direction::Reader => self.process(None, Some(id)),
        }

        let Some(req) = self.request(id) else {
            return;
        };
        if req.is_terminal() {
            return;
        }
        if req.wait.may_wait() {
            let list = match direction {
                Direction::Writer => &mut self.writers,
                Direction::Reader => &mut self.readers,
            };
            // Cannot fail: one list entry per slot at most
            let _ = list.push(id);
            if let Some(req) = self.request_mut(id) {
                req.listed = true;
            }
        } else {
            self.terminate(id);
            self.process(None, None);
        }
    }

    /// Fire every deadline timer due at `now` and release the requests
    /// that can no longer complete.
    pub fn expire_due(&mut self, now: u64) {
        let mut fired: Vec<RequestId, MAX_REQUESTS> = Vec::new();
        for slot in self.slots.iter_mut() {
            if let Some(req) = slot.request.as_mut() {
                if !req.is_terminal() && req.wait.fire_if_due(now) {
                    let _ = fired.push(req.id);
                }
            }
        }
        for id in fired {
            self.resolve_expired(id);
        }
    }

    /// Take the oldest pending reply and free its slot.
    pub fn take_reply(&mut self) -> Option<Reply<'a>> {
        let reply = self.replies.pop_front()?;
        self.slots[reply.id.index()].reply_pending = false;
        Some(reply)
    }

    /// Take the highest-priority move waiting for the copy engine.
    pub fn next_move(&mut self) -> Option<MoveOp> {
        self.moves.pop()
    }

    // --- Observation ----------------------------------------------------------

    /// Look up a live request. Returns `None` once it has been replied to.
    pub fn request(&self, id: RequestId) -> Option<&Request<'a>> {
        self.slots
            .get(id.index())
            .filter(|slot| slot.generation == id.generation())
            .and_then(|slot| slot.request.as_ref())
    }

    pub fn reservoir(&self) -> &Reservoir<'a> {
        &self.reservoir
    }

    pub fn config(&self) -> &PipeConfig {
        &self.config
    }

    /// Writer FIFO in arrival order.
    pub fn writers(&self) -> &[RequestId] {
        &self.writers
    }

    /// Reader FIFO in arrival order.
    pub fn readers(&self) -> &[RequestId] {
        &self.readers
    }

    /// Moves issued but not yet taken by the copy engine.
    pub fn queued_moves(&self) -> usize {
        self.moves.len()
    }

    /// Moves issued and not yet fully reported, queued ones included.
    pub fn moves_in_flight(&self) -> usize {
        self.in_flight.len()
    }

    /// Replies waiting for their owner.
    pub fn pending_replies(&self) -> usize {
        self.replies.len()
    }

    // --- Request bookkeeping ------------------------------------------------

    pub(crate) fn request_mut(&mut self, id: RequestId) -> Option<&mut Request<'a>> {
        self.slots
            .get_mut(id.index())
            .filter(|slot| slot.generation == id.generation())
            .and_then(|slot| slot.request.as_mut())
    }

    /// Live request that the engine expects to exist.
    pub(crate) fn live(&self, id: RequestId) -> &Request<'a> {
        match self.request(id) {
            Some(req) => req,
            None => panic!("pipe: request {:?} used after release", id),
        }
    }

    pub(crate) fn live_mut(&mut self, id: RequestId) -> &mut Request<'a> {
        match self.request_mut(id) {
            Some(req) => req,
            None => panic!("pipe: request {:?} used after release", id),
        }
    }

    /// Remove a request from its FIFO. No-op for unlisted requests.
    fn delist(&mut self, id: RequestId) {
        let req = self.live_mut(id);
        if !req.listed {
            return;
        }
        req.listed = false;
        let list = match req.direction {
            Direction::Writer => &mut self.writers,
            Direction::Reader => &mut self.readers,
        };
        if let Some(pos) = list.iter().position(|queued| *queued == id) {
            list.remove(pos);
        }
    }

    /// Mark a request as having met its contract.
    fn satisfy(&mut self, id: RequestId) {
        let req = self.live_mut(id);
        req.status = RequestStatus::SatisfiedTerminal;
        req.wait.cancel_timer();
        self.delist(id);
    }

    /// Release a request that can never complete as asked. The reply goes
    /// out now if no move is in flight for it, else on its last completion.
    fn terminate(&mut self, id: RequestId) {
        let req = self.live_mut(id);
        req.status = req.forced_status();
        req.wait.cancel_timer();
        let pending = req.pending_transfers;
        debug!(
            "pipe: release {:?} as {:?} after {} of {} bytes",
            id, req.status, req.transferred_size, req.total_size
        );
        self.delist(id);
        if pending == 0 {
            self.reply(id);
        }
    }

    /// Hand a finished request back to its owner. The slot is recycled
    /// once the reply is taken.
    fn reply(&mut self, id: RequestId) {
        let slot = &mut self.slots[id.index()];
        let req = match slot.request.take() {
            Some(req) if req.id == id => req,
            _ => panic!("pipe: reply to unknown request {:?}", id),
        };
        assert!(req.is_terminal(), "pipe: reply to active request {:?}", id);
        assert_eq!(req.pending_transfers, 0, "pipe: reply with moves in flight");
        assert!(!req.listed, "pipe: reply to listed request {:?}", id);
        slot.generation = slot.generation.wrapping_add(1);
        slot.reply_pending = true;

        debug!("pipe: reply {:?} {:?} transferred={}", id, req.status, req.transferred_size);
        let reply = Reply {
            id,
            direction: req.direction,
            status: req.status,
            transferred_size: req.transferred_size,
            payload: req.payload,
        };
        // One reply per slot, and the slot stays taken until it is collected
        if self.replies.push_back(reply).is_err() {
            panic!("pipe: reply queue overflow");
        }
    }

    /// Handle a fired deadline timer.
    fn resolve_expired(&mut self, id: RequestId) {
        debug!("pipe: deadline expired for {:?}", id);
        self.process(None, None);

        let Some(req) = self.request(id) else {
            return;
        };
        if req.is_terminal() {
            return;
        }
        // A head with copies in flight is re-examined by the stall check
        // once they complete.
        let in_flight = req.pending_transfers > 0 || !self.reservoir.is_idle();
        if self.is_head(id) && in_flight {
            return;
        }
        self.terminate(id);
        self.process(None, None);
    }

    fn is_head(&self, id: RequestId) -> bool {
        self.writers.first() == Some(&id) || self.readers.first() == Some(&id)
    }

    /// Queue a move for the copy engine. Callers check for room first.
    fn issue(&mut self, kind: MoveKind, len: usize, priority: u8) {
        let op = MoveOp {
            kind,
            len,
            priority,
            seq: self.next_seq,
        };
        self.next_seq = self.next_seq.wrapping_add(1);
        log::trace!("pipe: issue {:?}", op);
        let tracked = InFlight {
            seq: op.seq,
            source_done: false,
            destination_done: false,
        };
        if self.in_flight.push(tracked).is_err() || self.moves.push(op).is_err() {
            panic!("pipe: move queue overflow");
        }
    }

    /// Record one reported leg. The move leaves the in-flight table once
    /// both legs are in.
    fn retire_leg(&mut self, op: &MoveOp, leg: Leg) {
        let Some(pos) = self.in_flight.iter().position(|entry| entry.seq == op.seq) else {
            panic!("pipe: move #{} {:?} leg not in flight", op.seq, leg);
        };
        let entry = &mut self.in_flight[pos];
        let done = match leg {
            Leg::Source => &mut entry.source_done,
            Leg::Destination => &mut entry.destination_done,
        };
        if *done {
            panic!("pipe: move #{} {:?} leg not in flight", op.seq, leg);
        }
        *done = true;
        if entry.source_done && entry.destination_done {
            self.in_flight.swap_remove(pos);
        }
    }

    /// Room for another move. Counts moves the copy engine already took
    /// until both their legs report.
    #[inline]
    fn can_issue(&self) -> bool {
        self.in_flight.len() < MAX_MOVES
    }
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::request::CompletionPolicy;
    use crate::wait::WaitPolicy;

    /// Run the copy engine until no move is left, completing both legs of
    /// each move in order.
    pub(crate) fn drain(pipe: &mut Pipe) {
        while let Some(op) = pipe.next_move() {
            pipe.execute_move(&op);
            pipe.on_move_complete(&op, Leg::Source);
            pipe.on_move_complete(&op, Leg::Destination);
        }
    }

    pub(crate) fn opts(completion: CompletionPolicy, wait: WaitPolicy) -> RequestOptions {
        RequestOptions::new(completion, wait)
    }

    #[test]
    fn test_reserve_uses_free_slots_and_fails_when_full() {
        let mut storage = [0u8; 8];
        let data = [0u8; 1];
        let mut pipe = Pipe::new(&mut storage, PipeConfig::new());
        for _ in 0..MAX_REQUESTS {
            assert!(pipe
                .reserve(Payload::Source(&data), opts(CompletionPolicy::BestEffort, WaitPolicy::Forever))
                .is_ok());
        }
        assert_eq!(
            pipe.reserve(Payload::Source(&data), opts(CompletionPolicy::BestEffort, WaitPolicy::Forever)),
            Err(PipeError::NoFreeSlot)
        );
    }

    #[test]
    fn test_generation_guards_recycled_slot() {
        let mut storage = [0u8; 8];
        let data = [1u8, 2];
        let mut pipe = Pipe::new(&mut storage, PipeConfig::new());

        let first = pipe
            .submit_write(&data, opts(CompletionPolicy::AllOrTimeoutOnly, WaitPolicy::NonBlocking))
            .unwrap();
        drain(&mut pipe);
        assert!(pipe.take_reply().is_some());
        assert!(pipe.request(first).is_none(), "Replied request must be gone");

        let second = pipe
            .submit_write(&data, opts(CompletionPolicy::AllOrTimeoutOnly, WaitPolicy::Forever))
            .unwrap();
        assert_eq!(first.index(), second.index(), "Slot is recycled");
        assert_ne!(first.generation(), second.generation());
        assert!(pipe.request(first).is_none(), "Stale handle must not alias");
        assert!(pipe.request(second).is_some());
    }

    #[test]
    fn test_zero_length_request_replied_at_admission() {
        let mut storage = [0u8; 8];
        let mut pipe = Pipe::new(&mut storage, PipeConfig::new());
        let id = pipe
            .submit_write(&[], opts(CompletionPolicy::AllOrTimeoutOnly, WaitPolicy::Forever))
            .unwrap();
        let reply = pipe.take_reply().expect("zero-length write completes at once");
        assert_eq!(reply.id, id);
        assert_eq!(reply.status, RequestStatus::SatisfiedTerminal);
        assert_eq!(reply.transferred_size, 0);
    }

    #[test]
    fn test_untaken_replies_hold_their_slots() {
        let mut storage = [0u8; 8];
        let options = opts(CompletionPolicy::BestEffort, WaitPolicy::NonBlocking);
        let mut pipe = Pipe::new(&mut storage, PipeConfig::new());
        for _ in 0..MAX_REQUESTS {
            pipe.submit_write(&[], options).unwrap();
        }
        assert_eq!(pipe.pending_replies(), MAX_REQUESTS);
        assert_eq!(pipe.submit_write(&[], options), Err(PipeError::NoFreeSlot));
        assert_eq!(pipe.pending_replies(), MAX_REQUESTS, "No reply is dropped");

        let first = pipe.take_reply().unwrap();
        let next = pipe.submit_write(&[], options).unwrap();
        assert_eq!(next.index(), first.id.index(), "Slot freed by taking its reply");
        assert_ne!(next, first.id);
        assert_eq!(core::iter::from_fn(|| pipe.take_reply()).count(), MAX_REQUESTS);
    }

    #[test]
    fn test_waiting_requests_are_listed_in_arrival_order() {
        let mut storage = [0u8; 8];
        let mut a = [0u8; 4];
        let mut b = [0u8; 4];
        let mut pipe = Pipe::new(&mut storage, PipeConfig::new());

        let ra = pipe
            .submit_read(&mut a, opts(CompletionPolicy::AllOrTimeoutOnly, WaitPolicy::Forever))
            .unwrap();
        let rb = pipe
            .submit_read(&mut b, opts(CompletionPolicy::AllOrTimeoutOnly, WaitPolicy::Timed { deadline: 50 }))
            .unwrap();

        assert_eq!(pipe.readers(), &[ra, rb]);
        assert!(pipe.request(ra).unwrap().listed);
        assert_eq!(pipe.request(rb).unwrap().status, RequestStatus::Idle);
        assert!(pipe.writers().is_empty());
    }

    #[test]
    fn test_non_blocking_request_never_listed() {
        let mut storage = [0u8; 8];
        let mut buffer = [0u8; 4];
        let mut pipe = Pipe::new(&mut storage, PipeConfig::new());
        let id = pipe
            .submit_read(&mut buffer, opts(CompletionPolicy::BestEffort, WaitPolicy::NonBlocking))
            .unwrap();

        assert!(pipe.readers().is_empty());
        let reply = pipe.take_reply().expect("non-blocking read is answered on admission");
        assert_eq!(reply.id, id);
        assert_eq!(reply.transferred_size, 0);
    }
}
