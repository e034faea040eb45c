//! Transfer scheduler.
//!
//! ```text
//!   ┌──────────────────────── pass ─────────────────────────┐
//!   │ heads = (first writer | unlisted, first reader | unlisted)
//!   │ no-go check per side (all-or-nothing feasibility)       │
//!   │   writer no-go → drain buffer / wait / force hand-off   │
//!   │   reader no-go → fill buffer  / wait / force hand-off   │
//!   │   otherwise    → read_write | read | write              │
//!   └──────────── repeat while bytes move or heads change ────┘
//!                              │ fixed point
//!                              ▼
//!                   stall detectors on the heads
//!                   (release → restart the loop)
//! ```

use log::debug;

use super::Pipe;
use crate::config::{ForcePolicy, MAX_PROCESS_PASSES};
use crate::request::RequestId;
use crate::stall;

type Heads = (Option<RequestId>, Option<RequestId>);

impl<'a> Pipe<'a> {
    /// Run the scheduler until no further synchronous progress is
    /// possible. At most one of `unlisted_writer` / `unlisted_reader` may
    /// be given: the request being admitted, which takes part only when
    /// its own FIFO is empty.
    pub(crate) fn process(&mut self, unlisted_writer: Option<RequestId>, unlisted_reader: Option<RequestId>) {
        assert!(
            unlisted_writer.is_none() || unlisted_reader.is_none(),
            "pipe: two unlisted participants"
        );

        for _ in 0..MAX_PROCESS_PASSES {
            let heads = self.heads(unlisted_writer, unlisted_reader);
            if heads == (None, None) {
                return;
            }

            let moved = self.advance(heads, unlisted_writer, unlisted_reader);
            let after = self.heads(unlisted_writer, unlisted_reader);
            if moved > 0 || after != heads {
                continue;
            }

            if !self.release_stalled(after) {
                return;
            }
        }
        panic!("pipe: scheduler did not settle");
    }

    fn heads(&self, unlisted_writer: Option<RequestId>, unlisted_reader: Option<RequestId>) -> Heads {
        (
            self.head(&self.writers, unlisted_writer),
            self.head(&self.readers, unlisted_reader),
        )
    }

    fn head(&self, list: &[RequestId], unlisted: Option<RequestId>) -> Option<RequestId> {
        if let Some(&first) = list.first() {
            return Some(first);
        }
        unlisted.filter(|id| self.request(*id).is_some_and(|req| !req.is_terminal()))
    }

    /// One scheduling decision for the current heads. Returns the bytes
    /// committed to new moves.
    fn advance(&mut self, heads: Heads, unlisted_writer: Option<RequestId>, unlisted_reader: Option<RequestId>) -> usize {
        let writer_no_go = heads.0.is_some_and(|w| self.writer_no_go(w, unlisted_reader));
        let reader_no_go = heads.1.is_some_and(|r| self.reader_no_go(r, unlisted_writer));
        assert!(!(writer_no_go && reader_no_go), "pipe: both sides no-go");

        match heads {
            (Some(writer), reader) if writer_no_go => {
                let Some(reader) = reader else {
                    return 0;
                };
                if !self.reservoir.is_empty() {
                    self.pipe_read(reader)
                } else if self.may_force(reader) {
                    self.force(writer, reader)
                } else {
                    0
                }
            }
            (writer, Some(reader)) if reader_no_go => {
                let Some(writer) = writer else {
                    return 0;
                };
                if !self.reservoir.is_full() {
                    self.pipe_write(writer)
                } else if self.may_force(writer) {
                    self.force(writer, reader)
                } else {
                    0
                }
            }
            (Some(writer), Some(reader)) => self.pipe_read_write(writer, reader),
            (None, Some(reader)) => self.pipe_read(reader),
            (Some(writer), None) => self.pipe_write(writer),
            (None, None) => 0,
        }
    }

    /// Whether a head writer must not partially commit because its full
    /// size is out of reach: buffer free space plus every reader's need.
    fn writer_no_go(&self, writer: RequestId, unlisted_reader: Option<RequestId>) -> bool {
        let req = self.live(writer);
        if !stall::all_or_nothing_applies(req) {
            return false;
        }
        let reachable = self.reservoir.free_space_total()
            + self.remaining_of(&self.readers)
            + self.unlisted_remaining(unlisted_reader);
        req.remaining() > reachable
    }

    /// Symmetric to `writer_no_go`: buffered data plus every writer's
    /// remaining bytes.
    fn reader_no_go(&self, reader: RequestId, unlisted_writer: Option<RequestId>) -> bool {
        let req = self.live(reader);
        if !stall::all_or_nothing_applies(req) {
            return false;
        }
        let reachable = self.reservoir.occupied_total()
            + self.remaining_of(&self.writers)
            + self.unlisted_remaining(unlisted_writer);
        req.remaining() > reachable
    }

    fn remaining_of(&self, list: &[RequestId]) -> usize {
        list.iter().map(|id| self.live(*id).remaining()).sum()
    }

    fn unlisted_remaining(&self, unlisted: Option<RequestId>) -> usize {
        unlisted
            .and_then(|id| self.request(id))
            .filter(|req| !req.listed && !req.is_terminal())
            .map_or(0, |req| req.remaining())
    }

    /// Whether progress may be pushed through a no-go request whose
    /// `peer` is waiting on the other side.
    fn may_force(&self, peer: RequestId) -> bool {
        match self.config.force_policy {
            ForcePolicy::Never => false,
            ForcePolicy::Always => true,
            ForcePolicy::WhenPeerCannotWait => stall::cannot_wait(self.live(peer)),
        }
    }

    /// Forced progress: drain buffered bytes, then hand off directly.
    /// Never spills writer bytes into the buffer.
    fn force(&mut self, writer: RequestId, reader: RequestId) -> usize {
        debug!("pipe: forcing transfer {:?} -> {:?}", writer, reader);
        let drained = if self.reservoir.occupied_total() > 0 {
            self.pipe_read(reader)
        } else {
            0
        };
        drained + self.hand_off(writer, reader)
    }

    /// Stall phase. Releases the heads that can provably never progress
    /// and reports whether any was released.
    fn release_stalled(&mut self, heads: Heads) -> bool {
        match heads {
            (Some(writer), None) => {
                if stall::writer_blocked(&self.reservoir, self.live(writer)) {
                    self.terminate(writer);
                    return true;
                }
                false
            }
            (None, Some(reader)) => {
                if stall::reader_blocked(&self.reservoir, self.live(reader)) {
                    self.terminate(reader);
                    return true;
                }
                false
            }
            (Some(writer), Some(reader)) => {
                let mut released = false;
                for id in [writer, reader] {
                    if self.expired_and_quiet(id) {
                        self.terminate(id);
                        released = true;
                    }
                }
                released
            }
            (None, None) => false,
        }
    }

    /// A head whose deadline fired and that nothing in flight can still
    /// help.
    fn expired_and_quiet(&self, id: RequestId) -> bool {
        let req = self.live(id);
        req.wait.is_deadline_expired() && req.pending_transfers == 0 && self.reservoir.is_idle()
    }
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------
