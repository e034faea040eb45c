//! # Move Operations
//!
//! A Move Operation is one asynchronous byte copy issued by the pipe
//! engine. It is created by a mover, handed to the copy primitive, and
//! destroyed by the completion handler once both of its legs report done.
//!
//! Each operation carries exactly what its completion needs: the request(s)
//! whose pending counters it holds and the reservoir region it claimed.
//!
//! | Kind | Source leg | Destination leg |
//! |------|------------|-----------------|
//! | `WriterToBuffer` | writer task | reservoir (write region) |
//! | `BufferToReader` | reservoir (read region) | reader task |
//! | `WriterToReaderDirect` | writer task | reader task |

use core::cmp::Ordering;

use crate::request::RequestId;
use crate::reservoir::Region;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveKind {
    WriterToBuffer {
        writer: RequestId,
        writer_offset: usize,
        region: Region,
    },
    BufferToReader {
        region: Region,
        reader: RequestId,
        reader_offset: usize,
    },
    WriterToReaderDirect {
        writer: RequestId,
        writer_offset: usize,
        reader: RequestId,
        reader_offset: usize,
    },
}

/// Which side of a move reports completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Leg {
    Source,
    Destination,
}

/// What a completed leg was attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    /// A task-owned request; completion decrements its pending counter.
    Task(RequestId),
    /// A reservoir write region; completion commits the data.
    WriteRegion(Region),
    /// A reservoir read region; completion frees the space.
    ReadRegion(Region),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MoveOp {
    pub kind: MoveKind,
    pub len: usize,
    /// Higher of the involved task priorities.
    pub priority: u8,
    /// Issue order, used to keep equal-priority moves FIFO.
    pub seq: u32,
}

impl MoveOp {
    pub fn endpoint(&self, leg: Leg) -> Endpoint {
        match (self.kind, leg) {
            (MoveKind::WriterToBuffer { writer, .. }, Leg::Source) => Endpoint::Task(writer),
            (MoveKind::WriterToBuffer { region, .. }, Leg::Destination) => Endpoint::WriteRegion(region),
            (MoveKind::BufferToReader { region, .. }, Leg::Source) => Endpoint::ReadRegion(region),
            (MoveKind::BufferToReader { reader, .. }, Leg::Destination) => Endpoint::Task(reader),
            (MoveKind::WriterToReaderDirect { writer, .. }, Leg::Source) => Endpoint::Task(writer),
            (MoveKind::WriterToReaderDirect { reader, .. }, Leg::Destination) => Endpoint::Task(reader),
        }
    }
}

// Max-heap order: higher priority first, then the older move.
impl Ord for MoveOp {
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for MoveOp {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------
