//! The virtual memory manager.
//!
//! `VirtualMemory` ties address spaces to the two services they depend on: the
//! physical frame allocator and the TLB of the current execution unit. The
//! process lifecycle code and the trap dispatcher go through it; the address
//! space that is active is always passed in by the caller.

use crate::{
    AddressSpace, FaultKind, FrameAllocator, TranslationCache, VirtualAddress, VmError,
    arch::interrupts, fault,
};

/// Virtual memory services for one execution unit.
pub struct VirtualMemory<A, T> {
    frames: A,
    tlb: T,
}

impl<A, T> VirtualMemory<A, T>
where
    A: FrameAllocator,
    T: TranslationCache,
{
    /// Brings up the virtual memory subsystem.
    pub fn new(frames: A, tlb: T) -> Self {
        log::info!("virtual memory initialized");
        Self { frames, tlb }
    }

    pub fn frames(&self) -> &A {
        &self.frames
    }

    pub fn tlb(&self) -> &T {
        &self.tlb
    }

    /// Creates an empty address space for a new process.
    pub fn create_space(&self) -> Result<AddressSpace, VmError> {
        AddressSpace::new()
    }

    /// Duplicates `source` for a forked process.
    pub fn copy_space(&self, source: &AddressSpace) -> Result<AddressSpace, VmError> {
        source.copy(&self.frames)
    }

    /// Tears down an address space, freeing every frame it owns.
    ///
    /// The caller must make sure `space` is not active, or flush the TLB afterwards.
    pub fn destroy_space(&self, space: AddressSpace) {
        space.destroy(&self.frames);
    }

    /// Makes `space` the active address space by flushing every cached translation.
    ///
    /// Kernel threads have no address space; activating `None` leaves the TLB as is.
    pub fn activate(&self, space: Option<&AddressSpace>) {
        if space.is_none() {
            return;
        }
        self.flush_tlb();
    }

    /// Stops using `space`; flushes the TLB like [`activate`](Self::activate).
    pub fn deactivate(&self, space: Option<&AddressSpace>) {
        self.activate(space);
    }

    /// Ends the loading phase of `space` and reactivates it, so translations
    /// that were made writable for the loader are dropped.
    pub fn complete_load(&self, space: &mut AddressSpace) {
        space.complete_load();
        self.activate(Some(&*space));
    }

    /// Resolves a TLB fault taken while `space` was active.
    ///
    /// See [`handle_fault`](crate::handle_fault).
    pub fn fault(
        &self,
        space: Option<&mut AddressSpace>,
        kind: FaultKind,
        addr: VirtualAddress,
    ) -> Result<(), VmError> {
        fault::handle_fault(space, kind, addr, &self.frames, &self.tlb)
    }

    /// Requests invalidation of a translation on other execution units.
    ///
    /// # Panics
    ///
    /// Always; TLB shootdown is not supported.
    pub fn tlb_shootdown(&self, addr: VirtualAddress) -> ! {
        log::error!("TLB shootdown requested for {}", addr);
        panic!("TLB shootdown is not supported");
    }

    fn flush_tlb(&self) {
        interrupts::without_interrupts(|| self.tlb.invalidate_all());
        log::trace!("TLB flushed");
    }
}
