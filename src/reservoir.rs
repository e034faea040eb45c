//! # Byte Reservoir
//!
//! The bounded ring buffer sitting between a pipe's writers and readers.
//! Space is handed out in contiguous *regions*: a writer claims free space,
//! an asynchronous copy fills it, and the region is released when the copy
//! completes. Readers claim and release committed data the same way.
//!
//! ## Accounting
//!
//! ```text
//!   storage:  [ free | read-claimed | committed | write-claimed | free ]
//!                     ^tail_release  ^read_pos   ^commit_pos     ^write_pos
//! ```
//!
//! Each claim is tracked by a *marker*. Releases may arrive in any order;
//! committed data (and free space) only grows across the leading run of
//! released markers, so bytes become visible to readers in exactly the
//! order they were claimed.
//!
//! A claim never crosses the end of the storage. A request that straddles
//! the wrap-around point therefore needs two claims.

use heapless::Deque;

use crate::config::MAX_MARKERS;

/// Identity of one claimed region, used to release it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegionId(u32);

/// A contiguous claimed extent of the reservoir.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    pub id: RegionId,
    pub offset: usize,
    pub len: usize,
}

#[derive(Debug, Clone, Copy)]
struct Marker {
    id: RegionId,
    len: usize,
    released: bool,
}

pub struct Reservoir<'a> {
    storage: &'a mut [u8],
    /// Next write claim starts here.
    write_pos: usize,
    /// Next read claim starts here.
    read_pos: usize,
    /// Space available to write claims.
    free: usize,
    /// Released data not yet claimed by a reader.
    committed: usize,
    write_markers: Deque<Marker, MAX_MARKERS>,
    read_markers: Deque<Marker, MAX_MARKERS>,
    next_id: u32,
}

impl<'a> Reservoir<'a> {
    pub fn new(storage: &'a mut [u8]) -> Self {
        let free = storage.len();
        Self {
            storage,
            write_pos: 0,
            read_pos: 0,
            free,
            committed: 0,
            write_markers: Deque::new(),
            read_markers: Deque::new(),
            next_id: 0,
        }
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.storage.len()
    }

    /// Space writers may still claim.
    #[inline]
    pub fn free_space_total(&self) -> usize {
        self.free
    }

    /// Data readers may still claim.
    #[inline]
    pub fn occupied_total(&self) -> usize {
        self.committed
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.committed == 0
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.free == 0
    }

    /// Write claims whose copy has not completed yet.
    #[inline]
    pub fn pending_write_ops(&self) -> usize {
        self.write_markers.len()
    }

    /// Read claims whose copy has not completed yet.
    #[inline]
    pub fn pending_read_ops(&self) -> usize {
        self.read_markers.len()
    }

    #[inline]
    pub fn is_idle(&self) -> bool {
        self.write_markers.is_empty() && self.read_markers.is_empty()
    }

    /// Claim up to `len` bytes of contiguous free space.
    ///
    /// Returns `None` when nothing can be claimed: no free space, `len` is
    /// zero, or every write marker is in use.
    pub fn claim_write_region(&mut self, len: usize) -> Option<Region> {
        let contiguous = self.capacity() - self.write_pos;
        let size = len.min(self.free).min(contiguous);
        let region = Self::claim(&mut self.write_markers, &mut self.next_id, self.write_pos, size)?;
        self.free -= size;
        self.write_pos = self.wrap(self.write_pos + size);
        Some(region)
    }

    /// Claim up to `len` bytes of contiguous committed data.
    pub fn claim_read_region(&mut self, len: usize) -> Option<Region> {
        let contiguous = self.capacity() - self.read_pos;
        let size = len.min(self.committed).min(contiguous);
        let region = Self::claim(&mut self.read_markers, &mut self.next_id, self.read_pos, size)?;
        self.committed -= size;
        self.read_pos = self.wrap(self.read_pos + size);
        Some(region)
    }

    /// Mark a write region as filled. Data becomes readable once every
    /// earlier write region is filled too.
    pub fn release_write_region(&mut self, id: RegionId) {
        let committed = Self::release(&mut self.write_markers, id);
        self.committed += committed;
    }

    /// Mark a read region as drained. Space becomes writable once every
    /// earlier read region is drained too.
    pub fn release_read_region(&mut self, id: RegionId) {
        let freed = Self::release(&mut self.read_markers, id);
        self.free += freed;
    }

    pub fn region(&self, region: &Region) -> &[u8] {
        &self.storage[region.offset..region.offset + region.len]
    }

    pub fn region_mut(&mut self, region: &Region) -> &mut [u8] {
        &mut self.storage[region.offset..region.offset + region.len]
    }

    fn claim(
        markers: &mut Deque<Marker, MAX_MARKERS>,
        next_id: &mut u32,
        offset: usize,
        size: usize,
    ) -> Option<Region> {
        if size == 0 || markers.is_full() {
            return None;
        }
        let id = RegionId(*next_id);
        *next_id = next_id.wrapping_add(1);
        // Cannot fail: fullness checked above
        let _ = markers.push_back(Marker { id, len: size, released: false });
        Some(Region { id, offset, len: size })
    }

    /// Flag `id` as released and retire the leading run of released
    /// markers, returning the number of bytes they cover.
    fn release(markers: &mut Deque<Marker, MAX_MARKERS>, id: RegionId) -> usize {
        let marker = markers
            .iter_mut()
            .find(|m| m.id == id && !m.released);
        match marker {
            Some(marker) => marker.released = true,
            None => panic!("release of unknown reservoir region {:?}", id),
        }

        let mut retired = 0;
        while let Some(front) = markers.front() {
            if !front.released {
                break;
            }
            retired += front.len;
            markers.pop_front();
        }
        retired
    }

    #[inline]
    fn wrap(&self, pos: usize) -> usize {
        if pos >= self.capacity() {
            pos - self.capacity()
        } else {
            pos
        }
    }
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------
