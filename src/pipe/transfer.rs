//! Direct movers: decide how many bytes can move in one topology and issue
//! the Move Operations for them.
//!
//! - `pipe_write`: writer → reservoir
//! - `pipe_read`: reservoir → reader
//! - `pipe_read_write`: reservoir → reader, then writer → reader directly,
//!   then writer → reservoir
//!
//! Movers advance `transferred_size` when a move is issued, not when it
//! completes, so the next decision already accounts for bytes in flight.

use log::trace;

use super::Pipe;
use crate::movedata::MoveKind;
use crate::request::{RequestId, RequestStatus};

/// A claim can be split in two by the reservoir wrap-around point.
const MAX_CLAIMS_PER_CALL: usize = 2;

impl<'a> Pipe<'a> {
    /// Move as much of the writer's remaining data into the reservoir as
    /// free space allows. Returns the number of bytes committed.
    pub(crate) fn pipe_write(&mut self, writer: RequestId) -> usize {
        let mut moved = 0;
        for _ in 0..MAX_CLAIMS_PER_CALL {
            let req = self.live(writer);
            let remaining = req.remaining();
            if req.is_terminal() || remaining == 0 || !self.can_issue() {
                break;
            }
            let Some(region) = self.reservoir.claim_write_region(remaining) else {
                break;
            };
            let req = self.live_mut(writer);
            let writer_offset = req.begin_transfer(region.len);
            let priority = req.priority;
            self.issue(
                MoveKind::WriterToBuffer {
                    writer,
                    writer_offset,
                    region,
                },
                region.len,
                priority,
            );
            moved += region.len;
        }
        self.settle(writer, moved);
        moved
    }

    /// Move as much committed reservoir data into the reader as it wants.
    /// Returns the number of bytes committed.
    pub(crate) fn pipe_read(&mut self, reader: RequestId) -> usize {
        let mut moved = 0;
        for _ in 0..MAX_CLAIMS_PER_CALL {
            let req = self.live(reader);
            let remaining = req.remaining();
            if req.is_terminal() || remaining == 0 || !self.can_issue() {
                break;
            }
            let Some(region) = self.reservoir.claim_read_region(remaining) else {
                break;
            };
            let req = self.live_mut(reader);
            let reader_offset = req.begin_transfer(region.len);
            let priority = req.priority;
            self.issue(
                MoveKind::BufferToReader {
                    region,
                    reader,
                    reader_offset,
                },
                region.len,
                priority,
            );
            moved += region.len;
        }
        self.settle(reader, moved);
        moved
    }

    /// Serve a reader from both the reservoir and a writer.
    ///
    /// 1. `t1`: drain buffered data into the reader first; it is older
    ///    than anything the writer still holds.
    /// 2. `t2`: hand the writer's bytes straight to the reader, bypassing
    ///    the reservoir, once no buffered byte could be overtaken.
    /// 3. `t3`: spill what the writer has left into free reservoir space.
    pub(crate) fn pipe_read_write(&mut self, writer: RequestId, reader: RequestId) -> usize {
        let t1 = if self.reservoir.occupied_total() > 0 {
            self.pipe_read(reader)
        } else {
            0
        };
        let t2 = self.hand_off(writer, reader);
        let t3 = self.pipe_write(writer);
        trace!("pipe: read_write {:?}->{:?} t1={} t2={} t3={}", writer, reader, t1, t2, t3);
        t1 + t2 + t3
    }

    /// Direct writer → reader move of `min(writer.remaining,
    /// reader.remaining)` bytes.
    ///
    /// Refused while the reservoir holds readable data or a reservoir
    /// write is still in flight, since those bytes precede the writer's.
    pub(crate) fn hand_off(&mut self, writer: RequestId, reader: RequestId) -> usize {
        if !self.reservoir.is_empty() || self.reservoir.pending_write_ops() > 0 || !self.can_issue() {
            return 0;
        }
        let w = self.live(writer);
        let r = self.live(reader);
        if w.is_terminal() || r.is_terminal() {
            return 0;
        }
        let size = w.remaining().min(r.remaining());
        if size == 0 {
            return 0;
        }
        let priority = w.priority.max(r.priority);

        let writer_offset = self.live_mut(writer).begin_transfer(size);
        let reader_offset = self.live_mut(reader).begin_transfer(size);
        self.issue(
            MoveKind::WriterToReaderDirect {
                writer,
                writer_offset,
                reader,
                reader_offset,
            },
            size,
            priority,
        );
        self.settle(writer, size);
        self.settle(reader, size);
        size
    }

    /// Update a request's status after a mover ran for it.
    fn settle(&mut self, id: RequestId, moved: usize) {
        let req = self.live_mut(id);
        if req.is_terminal() {
            return;
        }
        if req.is_complete() {
            self.satisfy(id);
        } else if moved > 0 {
            req.status = RequestStatus::Busy;
        }
    }
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use crate::config::PipeConfig;
    use crate::pipe::tests::{drain, opts};
    use crate::pipe::Pipe;
    use crate::request::{CompletionPolicy, Payload, RequestStatus};
    use crate::wait::WaitPolicy;

    #[test]
    fn test_pipe_write_splits_at_wrap_point() {
        let mut storage = [0u8; 8];
        let mut sink = [0u8; 6];
        let first = [0u8; 6];
        let data = [1u8, 2, 3, 4, 5];
        let mut pipe = Pipe::new(&mut storage, PipeConfig::new());

        // Move the reservoir cursors to offset 6
        pipe.submit_write(&first, opts(CompletionPolicy::BestEffort, WaitPolicy::Forever))
            .unwrap();
        drain(&mut pipe);
        pipe.submit_read(&mut sink, opts(CompletionPolicy::BestEffort, WaitPolicy::Forever))
            .unwrap();
        drain(&mut pipe);
        while pipe.take_reply().is_some() {}

        let id = pipe
            .reserve(Payload::Source(&data), opts(CompletionPolicy::AllOrTimeoutOnly, WaitPolicy::Forever))
            .unwrap();
        assert_eq!(pipe.pipe_write(id), 5);
        assert_eq!(pipe.queued_moves(), 2, "Wrap-around needs two moves");
        assert_eq!(pipe.request(id).unwrap().status, RequestStatus::SatisfiedTerminal);
        assert_eq!(pipe.request(id).unwrap().pending_transfers, 2);
    }

    #[test]
    fn test_pipe_write_partial_marks_busy() {
        let mut storage = [0u8; 4];
        let data = [7u8; 10];
        let mut pipe = Pipe::new(&mut storage, PipeConfig::new());
        let id = pipe
            .reserve(Payload::Source(&data), opts(CompletionPolicy::BestEffort, WaitPolicy::Forever))
            .unwrap();

        assert_eq!(pipe.pipe_write(id), 4);
        let req = pipe.request(id).unwrap();
        assert_eq!(req.status, RequestStatus::Busy);
        assert_eq!(req.transferred_size, 4);
        assert!(pipe.reservoir().is_full());
    }

    #[test]
    fn test_hand_off_refused_while_buffer_holds_data() {
        let mut storage = [0u8; 8];
        let early = [1u8; 3];
        let late = [2u8; 3];
        let mut buffer = [0u8; 3];
        let mut pipe = Pipe::new(&mut storage, PipeConfig::new());
        pipe.submit_write(&early, opts(CompletionPolicy::BestEffort, WaitPolicy::Forever))
            .unwrap();
        drain(&mut pipe);
        assert_eq!(pipe.reservoir().occupied_total(), 3);

        let w = pipe
            .reserve(Payload::Source(&late), opts(CompletionPolicy::BestEffort, WaitPolicy::Forever))
            .unwrap();
        let r = pipe
            .reserve(Payload::Sink(&mut buffer), opts(CompletionPolicy::BestEffort, WaitPolicy::Forever))
            .unwrap();
        assert_eq!(pipe.hand_off(w, r), 0, "Buffered bytes must not be overtaken");
    }

    #[test]
    fn test_read_write_three_way_split() {
        let mut storage = [0u8; 4];
        let early = [1u8, 2];
        let late = [3u8, 4, 5, 6, 7, 8, 9];
        let mut buffer = [0u8; 5];
        let mut pipe = Pipe::new(&mut storage, PipeConfig::new());
        pipe.submit_write(&early, opts(CompletionPolicy::BestEffort, WaitPolicy::Forever))
            .unwrap();
        drain(&mut pipe);
        while pipe.take_reply().is_some() {}

        let w = pipe
            .reserve(Payload::Source(&late), opts(CompletionPolicy::BestEffort, WaitPolicy::Forever))
            .unwrap();
        let r = pipe
            .reserve(Payload::Sink(&mut buffer), opts(CompletionPolicy::BestEffort, WaitPolicy::Forever))
            .unwrap();

        // t1 = 2 buffered, t2 = 3 direct, t3 = 2 spilled (free space is 2
        // until the drained region is released)
        assert_eq!(pipe.pipe_read_write(w, r), 7);
        assert_eq!(pipe.request(r).unwrap().status, RequestStatus::SatisfiedTerminal);
        let writer = pipe.request(w).unwrap();
        assert_eq!(writer.status, RequestStatus::Busy);
        assert_eq!(writer.transferred_size, 5);

        drain(&mut pipe);
        let reply = pipe.take_reply().expect("reader is answered once its moves land");
        assert_eq!(reply.id, r);
        assert_eq!(reply.data(), &[1, 2, 3, 4, 5]);
        assert_eq!(pipe.reservoir().occupied_total(), 2);
    }
}
