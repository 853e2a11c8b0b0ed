//! Software emulation implementation for testing and development.
//!
//! This module provides a software-emulated machine that can run on any host.
//! It models the pieces of hardware the virtual memory subsystem touches:
//! - A flat physical memory buffer, addressed from zero
//! - A 64-slot software-refilled TLB with random replacement
//! - A per-thread interrupt enable flag
//! - A frame allocator handing out page-sized blocks of the emulated memory

mod frame_allocator;
pub mod interrupts;
mod tlb;

use core::cell::UnsafeCell;

pub use frame_allocator::EmulatedFrameAllocator;
pub use tlb::SoftwareTlb;

/// Emulated memory for software simulation.
///
/// This provides a simulated physical memory space so frames can be zeroed,
/// copied and inspected without any support from the host OS.
pub struct EmulatedMemory {
    /// The underlying memory buffer.
    memory: Box<[UnsafeCell<u8>]>,
    /// Next allocation offset (simple bump allocator).
    next_alloc: core::sync::atomic::AtomicUsize,
}

impl EmulatedMemory {
    /// Creates a new zero-filled emulated memory region of the specified size.
    pub fn new(size: usize) -> Self {
        Self {
            memory: (0..size).map(|_| UnsafeCell::new(0)).collect(),
            next_alloc: core::sync::atomic::AtomicUsize::new(0),
        }
    }

    /// Allocates a block of memory from the emulated space.
    ///
    /// Returns the physical address of the allocated block, or None if
    /// there's not enough space.
    pub fn allocate(&self, size: usize, align: usize) -> Option<usize> {
        use core::sync::atomic::Ordering;

        loop {
            let current = self.next_alloc.load(Ordering::Relaxed);

            let aligned = (current + align - 1) & !(align - 1);
            let end = aligned + size;

            if end > self.memory.len() {
                return None;
            }

            if self
                .next_alloc
                .compare_exchange(current, end, Ordering::Relaxed, Ordering::Relaxed)
                .is_ok()
            {
                return Some(aligned);
            }
        }
    }

    /// Translates a physical address to a host pointer into the buffer.
    pub fn translate(&self, phys: usize) -> *mut u8 {
        assert!(phys < self.memory.len(), "physical address out of bounds");
        // SAFETY: The offset is in bounds, and every byte is an UnsafeCell so
        // writes through the returned pointer are permitted.
        unsafe { (self.memory.as_ptr() as *mut u8).add(phys) }
    }

    /// Translates a host pointer back to a physical address.
    pub fn ptr_to_phys(&self, ptr: *const u8) -> usize {
        let base = self.memory.as_ptr() as usize;
        let addr = ptr as usize;
        assert!(
            addr >= base && addr < base + self.memory.len(),
            "pointer not within emulated memory"
        );
        addr - base
    }

    /// Returns the size of the emulated memory region.
    pub fn size(&self) -> usize {
        self.memory.len()
    }
}
