//! # Stall Detectors
//!
//! Pure predicates deciding whether a pending request can ever make
//! progress. A request is declared blocked only when **all** of these hold:
//!
//! 1. It cannot legally wait any longer: it is non-blocking, or it is
//!    best-effort and already moved some bytes, or its deadline fired.
//! 2. The reservoir has no claim in flight, so occupancy will not change
//!    on its own.
//! 3. Its remaining need strictly exceeds what the reservoir can supply
//!    (readers) or absorb (writers) right now.
//!
//! Any weaker test either releases requests that could still complete or
//! keeps requests waiting forever.

use crate::request::{CompletionPolicy, Request};
use crate::reservoir::Reservoir;

/// Condition 1: the request has no right to keep waiting.
pub fn cannot_wait(req: &Request) -> bool {
    req.wait.is_non_blocking()
        || (req.completion == CompletionPolicy::BestEffort && req.transferred_size > 0)
        || req.wait.is_deadline_expired()
}

/// True if a writer head can never make further progress.
pub fn writer_blocked(reservoir: &Reservoir, writer: &Request) -> bool {
    cannot_wait(writer)
        && reservoir.is_idle()
        && writer.remaining() > reservoir.free_space_total()
}

/// True if a reader head can never make further progress.
pub fn reader_blocked(reservoir: &Reservoir, reader: &Request) -> bool {
    cannot_wait(reader)
        && reservoir.is_idle()
        && reader.remaining() > reservoir.occupied_total()
}

/// Whether the all-or-nothing feasibility check governs this request.
///
/// Only requests that may be released before completing (non-blocking or
/// timed) are protected from partial commitment; a request waiting forever
/// will eventually receive the rest of its bytes.
pub fn all_or_nothing_applies(req: &Request) -> bool {
    req.completion == CompletionPolicy::AllOrTimeoutOnly
        && req.transferred_size == 0
        && !req.wait.is_forever()
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::{Payload, RequestId, RequestOptions};
    use crate::wait::WaitPolicy;

    fn writer<'a>(data: &'a [u8], completion: CompletionPolicy, wait: WaitPolicy) -> Request<'a> {
        Request::new(
            RequestId::new(0, 1),
            Payload::Source(data),
            RequestOptions::new(completion, wait),
        )
    }

    #[test]
    fn test_non_blocking_writer_blocked_on_full_buffer() {
        let mut storage = [0u8; 4];
        let res = Reservoir::new(&mut storage);
        let data = [0u8; 6];
        let w = writer(&data, CompletionPolicy::AllOrTimeoutOnly, WaitPolicy::NonBlocking);
        assert!(writer_blocked(&res, &w), "6 bytes can never fit in 4");

        let small = [0u8; 4];
        let w = writer(&small, CompletionPolicy::AllOrTimeoutOnly, WaitPolicy::NonBlocking);
        assert!(!writer_blocked(&res, &w), "4 bytes fit");
    }

    #[test]
    fn test_forever_writer_never_blocked() {
        let mut storage = [0u8; 4];
        let res = Reservoir::new(&mut storage);
        let data = [0u8; 6];
        let w = writer(&data, CompletionPolicy::AllOrTimeoutOnly, WaitPolicy::Forever);
        assert!(!writer_blocked(&res, &w));
    }

    #[test]
    fn test_best_effort_with_progress_cannot_wait() {
        let data = [0u8; 6];
        let mut w = writer(&data, CompletionPolicy::BestEffort, WaitPolicy::Forever);
        assert!(!cannot_wait(&w));
        w.transferred_size = 1;
        assert!(cannot_wait(&w));
    }

    #[test]
    fn test_expired_deadline_cannot_wait() {
        let data = [0u8; 6];
        let mut w = writer(&data, CompletionPolicy::AllOrTimeoutOnly, WaitPolicy::Timed { deadline: 5 });
        assert!(!cannot_wait(&w));
        w.wait.fire_if_due(5);
        assert!(cannot_wait(&w));
    }

    #[test]
    fn test_in_flight_claims_defer_stall() {
        let mut storage = [0u8; 4];
        let mut res = Reservoir::new(&mut storage);
        let claim = res.claim_write_region(4).unwrap();

        let mut buffer = [0u8; 2];
        let r = Request::new(
            RequestId::new(1, 1),
            Payload::Sink(&mut buffer),
            RequestOptions::new(CompletionPolicy::BestEffort, WaitPolicy::NonBlocking),
        );
        assert!(!reader_blocked(&res, &r), "A pending write may still feed the reader");

        res.release_write_region(claim.id);
        assert!(!reader_blocked(&res, &r), "Committed data satisfies the reader");
    }

    #[test]
    fn test_empty_buffer_blocks_non_blocking_reader() {
        let mut storage = [0u8; 4];
        let res = Reservoir::new(&mut storage);
        let mut buffer = [0u8; 2];
        let r = Request::new(
            RequestId::new(1, 1),
            Payload::Sink(&mut buffer),
            RequestOptions::new(CompletionPolicy::BestEffort, WaitPolicy::NonBlocking),
        );
        assert!(reader_blocked(&res, &r));
    }

    #[test]
    fn test_all_or_nothing_scope() {
        let data = [0u8; 6];
        let nb = writer(&data, CompletionPolicy::AllOrTimeoutOnly, WaitPolicy::NonBlocking);
        let timed = writer(&data, CompletionPolicy::AllOrTimeoutOnly, WaitPolicy::Timed { deadline: 9 });
        let forever = writer(&data, CompletionPolicy::AllOrTimeoutOnly, WaitPolicy::Forever);
        let loose = writer(&data, CompletionPolicy::BestEffort, WaitPolicy::NonBlocking);
        assert!(all_or_nothing_applies(&nb));
        assert!(all_or_nothing_applies(&timed));
        assert!(!all_or_nothing_applies(&forever));
        assert!(!all_or_nothing_applies(&loose));
    }
}
