//! Copy primitive body and completion handler.
//!
//! The copy engine takes a [`MoveOp`] from [`Pipe::next_move`], performs it
//! with [`Pipe::execute_move`], and reports each of its two legs through
//! [`Pipe::on_move_complete`]. Legs may be reported in either order and
//! interleaved with other moves; every report re-runs the scheduler.

use log::trace;

use super::{Pipe, Slot};
use crate::movedata::{Endpoint, Leg, MoveKind, MoveOp};
use crate::request::RequestId;

impl<'a> Pipe<'a> {
    /// Copy the bytes of a dispatched move.
    pub fn execute_move(&mut self, op: &MoveOp) {
        let len = op.len;
        match op.kind {
            MoveKind::WriterToBuffer {
                writer,
                writer_offset,
                region,
            } => {
                let src = self.live(writer).source();
                self.reservoir
                    .region_mut(&region)
                    .copy_from_slice(&src[writer_offset..writer_offset + len]);
            }
            MoveKind::BufferToReader {
                region,
                reader,
                reader_offset,
            } => {
                let src = self.reservoir.region(&region);
                let dst = sink(&mut self.slots, reader);
                dst[reader_offset..reader_offset + len].copy_from_slice(src);
            }
            MoveKind::WriterToReaderDirect {
                writer,
                writer_offset,
                reader,
                reader_offset,
            } => {
                let src = self.live(writer).source();
                let dst = self.live_mut(reader).sink_mut();
                dst[reader_offset..reader_offset + len].copy_from_slice(&src[writer_offset..writer_offset + len]);
            }
        }
        trace!("pipe: copied {} bytes for move #{}", len, op.seq);
    }

    /// Completion of one leg of a move. Each leg is reported exactly once.
    pub fn on_move_complete(&mut self, op: &MoveOp, leg: Leg) {
        let endpoint = op.endpoint(leg);
        trace!("pipe: move #{} {:?} leg done at {:?}", op.seq, leg, endpoint);
        self.retire_leg(op, leg);
        match endpoint {
            Endpoint::WriteRegion(region) => self.reservoir.release_write_region(region.id),
            Endpoint::ReadRegion(region) => self.reservoir.release_read_region(region.id),
            Endpoint::Task(id) => self.complete_task_leg(id),
        }
        self.process(None, None);
    }

    fn complete_task_leg(&mut self, id: RequestId) {
        let req = self.live_mut(id);
        assert!(req.pending_transfers > 0, "pipe: completion underflow for {:?}", id);
        req.pending_transfers -= 1;
        if req.pending_transfers == 0 && req.is_terminal() {
            self.reply(id);
        }
    }
}

/// Reader buffer of a live request, borrowed apart from the reservoir.
fn sink<'s>(slots: &'s mut [Slot<'_>], id: RequestId) -> &'s mut [u8] {
    match slots.get_mut(id.index()) {
        Some(Slot {
            generation,
            request: Some(req),
            ..
        }) if *generation == id.generation() => req.sink_mut(),
        _ => panic!("pipe: request {:?} used after release", id),
    }
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use crate::config::PipeConfig;
    use crate::movedata::Leg;
    use crate::pipe::tests::opts;
    use crate::pipe::Pipe;
    use crate::request::{CompletionPolicy, RequestStatus};
    use crate::wait::WaitPolicy;

    #[test]
    fn test_buffer_data_visible_only_after_destination_leg() {
        let mut storage = [0u8; 8];
        let data = [1u8, 2, 3];
        let mut pipe = Pipe::new(&mut storage, PipeConfig::new());
        pipe.submit_write(&data, opts(CompletionPolicy::BestEffort, WaitPolicy::Forever))
            .unwrap();

        let op = pipe.next_move().unwrap();
        pipe.execute_move(&op);
        pipe.on_move_complete(&op, Leg::Source);
        assert_eq!(pipe.reservoir().occupied_total(), 0, "Region not released yet");
        assert!(pipe.take_reply().is_some(), "Writer leg done, writer replied");

        pipe.on_move_complete(&op, Leg::Destination);
        assert_eq!(pipe.reservoir().occupied_total(), 3);
        assert_eq!(pipe.reservoir().pending_write_ops(), 0);
    }

    #[test]
    fn test_completion_wakes_waiting_reader() {
        let mut storage = [0u8; 8];
        let mut buffer = [0u8; 3];
        let data = [4u8, 5, 6];
        let mut pipe = Pipe::new(&mut storage, PipeConfig::new());
        let r = pipe
            .submit_read(&mut buffer, opts(CompletionPolicy::AllOrTimeoutOnly, WaitPolicy::Forever))
            .unwrap();

        // Writer arrives with the reader already waiting: direct hand-off
        pipe.submit_write(&data, opts(CompletionPolicy::AllOrTimeoutOnly, WaitPolicy::Forever))
            .unwrap();
        assert_eq!(pipe.request(r).unwrap().status, RequestStatus::SatisfiedTerminal);
        assert_eq!(pipe.queued_moves(), 1);

        let op = pipe.next_move().unwrap();
        pipe.execute_move(&op);
        pipe.on_move_complete(&op, Leg::Destination);
        let reply = pipe.take_reply().expect("reader replied on its own leg");
        assert_eq!(reply.id, r);
        assert_eq!(reply.data(), &[4, 5, 6]);

        pipe.on_move_complete(&op, Leg::Source);
        assert!(pipe.take_reply().is_some());
        assert_eq!(pipe.reservoir().occupied_total(), 0, "Direct path bypassed the buffer");
    }

    #[test]
    #[should_panic(expected = "not in flight")]
    fn test_duplicate_completion_panics() {
        let mut storage = [0u8; 8];
        let data = [1u8];
        let mut pipe = Pipe::new(&mut storage, PipeConfig::new());
        pipe.submit_write(&data, opts(CompletionPolicy::BestEffort, WaitPolicy::Forever))
            .unwrap();
        let op = pipe.next_move().unwrap();
        pipe.execute_move(&op);
        pipe.on_move_complete(&op, Leg::Source);
        pipe.on_move_complete(&op, Leg::Source);
    }
}
