//! Emulated physical frame allocator.

use alloc::vec::Vec;

use crate::{AddressTranslator, FrameAllocator, PhysicalAddress, arch::PAGE_SIZE};

struct FramePool {
    /// Frames returned by `free_frame`, reused before carving new ones.
    free: Vec<PhysicalAddress>,
    /// Maximum number of frames that may be in use at once.
    limit: usize,
    in_use: usize,
    allocations: usize,
}

/// A frame allocator over the thread's emulated physical memory.
///
/// Fresh frames are carved from the emulated memory installed with
/// [`AddressTranslator::emulated`]; freed frames are recycled without being
/// cleared. A frame limit lets callers exercise out-of-memory paths.
pub struct EmulatedFrameAllocator {
    pool: spin::Mutex<FramePool>,
}

impl EmulatedFrameAllocator {
    /// Creates an allocator that hands out at most `limit` frames at a time.
    pub fn new(limit: usize) -> Self {
        Self {
            pool: spin::Mutex::new(FramePool {
                free: Vec::new(),
                limit,
                in_use: 0,
                allocations: 0,
            }),
        }
    }

    /// Returns the number of frames currently allocated.
    pub fn in_use(&self) -> usize {
        self.pool.lock().in_use
    }

    /// Returns the number of successful allocations since creation.
    pub fn allocations(&self) -> usize {
        self.pool.lock().allocations
    }

    /// Changes the number of frames that may be in use at once.
    pub fn set_limit(&self, limit: usize) {
        self.pool.lock().limit = limit;
    }
}

impl FrameAllocator for EmulatedFrameAllocator {
    fn allocate_frame(&self) -> Option<PhysicalAddress> {
        let mut pool = self.pool.lock();
        if pool.in_use >= pool.limit {
            return None;
        }

        let frame = match pool.free.pop() {
            Some(frame) => frame,
            None => PhysicalAddress::new(AddressTranslator::current().allocate(PAGE_SIZE, PAGE_SIZE)?),
        };
        pool.in_use += 1;
        pool.allocations += 1;
        Some(frame)
    }

    fn free_frame(&self, frame: PhysicalAddress) {
        let mut pool = self.pool.lock();
        assert!(pool.in_use > 0, "frame {} freed with none allocated", frame);
        debug_assert!(!pool.free.contains(&frame), "frame {} freed twice", frame);
        pool.in_use -= 1;
        pool.free.push(frame);
    }
}
