//! Address space management.
//!
//! This module provides the per-process address space: the regions a program
//! declared plus the page table recording which of their pages are resident.

use crate::{
    FrameAllocator, PageTable, PhysicalAddress, Region, RegionList, VirtualAddress, VmError,
    arch::{PAGE_SIZE, USER_STACK_PAGES, USER_STACK_TOP},
};

/// A user address space.
///
/// Each address space exclusively owns its regions, its page table, and every
/// frame that page table references. Frames are only returned to the allocator
/// by [`destroy`](Self::destroy).
pub struct AddressSpace {
    regions: RegionList,
    page_table: PageTable,
}

impl AddressSpace {
    /// Creates an address space with no regions and no resident pages.
    pub fn new() -> Result<Self, VmError> {
        let space = Self {
            regions: RegionList::new(),
            page_table: PageTable::new()?,
        };
        log::debug!("created address space");
        Ok(space)
    }

    /// Creates an independent duplicate of this address space.
    ///
    /// Regions are copied in order with every field, and every resident page is
    /// copied into a freshly allocated frame. If any allocation fails, everything
    /// allocated for the duplicate is freed before the error is returned; this
    /// address space is never modified.
    pub fn copy<A>(&self, frames: &A) -> Result<Self, VmError>
    where
        A: FrameAllocator + ?Sized,
    {
        let regions = self.regions.try_clone()?;
        let page_table = self.page_table.duplicate(frames)?;
        log::debug!(
            "copied address space: {} regions, {} resident pages",
            regions.len(),
            page_table.resident_pages()
        );
        Ok(Self {
            regions,
            page_table,
        })
    }

    /// Destroys this address space, returning every frame it owns to `frames`.
    pub fn destroy<A>(mut self, frames: &A)
    where
        A: FrameAllocator + ?Sized,
    {
        let freed = self.page_table.release(frames);
        log::debug!(
            "destroyed address space: {} regions, {} frames freed",
            self.regions.len(),
            freed
        );
    }

    /// Declares a region of `length` bytes starting at `base`.
    pub fn define_region(
        &mut self,
        base: VirtualAddress,
        length: usize,
        readable: bool,
        writable: bool,
        executable: bool,
    ) -> Result<(), VmError> {
        self.regions
            .define(Region::new(base, length, readable, writable, executable))
    }

    /// Declares the user stack and returns the initial stack pointer.
    ///
    /// The stack occupies the `USER_STACK_PAGES` pages directly below
    /// `USER_STACK_TOP` and is readable and writable but not executable.
    pub fn define_stack(&mut self) -> Result<VirtualAddress, VmError> {
        let length = USER_STACK_PAGES * PAGE_SIZE;
        let top = VirtualAddress::new(USER_STACK_TOP);
        self.define_region(top - length, length, true, true, false)?;
        Ok(top)
    }

    /// Makes every region writable while a program image is loaded into it.
    pub fn prepare_load(&mut self) {
        self.regions.begin_loading();
    }

    /// Restores the declared permissions after loading.
    ///
    /// Translations installed while loading may still grant write access; use
    /// [`VirtualMemory::complete_load`](crate::VirtualMemory::complete_load) to
    /// also flush them.
    pub fn complete_load(&mut self) {
        self.regions.end_loading();
    }

    /// Returns the physical address backing `addr`, if its page is resident.
    pub fn translate(&self, addr: VirtualAddress) -> Option<PhysicalAddress> {
        let frame = self.page_table.lookup(addr.page_number())?.address()?;
        Some(frame + addr.page_offset())
    }

    pub fn regions(&self) -> &RegionList {
        &self.regions
    }

    pub fn page_table(&self) -> &PageTable {
        &self.page_table
    }

    pub(crate) fn page_table_mut(&mut self) -> &mut PageTable {
        &mut self.page_table
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        AddressTranslator, EmulatedFrameAllocator, PageEntry, PageFlags, frame::frame_bytes_mut,
    };

    fn setup() {
        if AddressTranslator::try_current().is_none() {
            AddressTranslator::set_current(AddressTranslator::emulated(64 * PAGE_SIZE));
        }
    }

    /// Backs the page at `addr` with a fresh frame filled with `byte`.
    fn populate(space: &mut AddressSpace, frames: &EmulatedFrameAllocator, addr: usize, byte: u8) {
        let frame = frames.allocate_frame().unwrap();
        unsafe { frame_bytes_mut(frame).fill(byte) };
        let mut flags = PageFlags::empty();
        flags.set_valid(true);
        flags.set_dirty(true);
        space
            .page_table_mut()
            .insert(VirtualAddress::new(addr).page_number(), PageEntry::new(frame, flags))
            .unwrap();
    }

    #[test]
    fn new_space_is_empty() {
        let space = AddressSpace::new().unwrap();
        assert!(space.regions().is_empty());
        assert_eq!(space.page_table().leaf_tables(), 0);
    }

    #[test]
    fn define_stack_below_stack_top() {
        let mut space = AddressSpace::new().unwrap();
        let sp = space.define_stack().unwrap();
        assert_eq!(sp, VirtualAddress::new(USER_STACK_TOP));

        let stack = space
            .regions()
            .find_containing(VirtualAddress::new(USER_STACK_TOP - 1))
            .unwrap();
        assert_eq!(stack.base(), VirtualAddress::new(0x7FFF_0000));
        assert_eq!(stack.length(), 16 * PAGE_SIZE);
        assert!(stack.is_readable() && stack.is_writable() && !stack.is_executable());
        assert!(space.regions().find_containing(sp).is_none());
    }

    #[test]
    fn define_stack_twice_overlaps() {
        let mut space = AddressSpace::new().unwrap();
        space.define_stack().unwrap();
        assert_eq!(space.define_stack(), Err(VmError::RegionOverlap));
    }

    #[test]
    fn load_phase_toggles_every_region() {
        let mut space = AddressSpace::new().unwrap();
        space
            .define_region(VirtualAddress::new(0x0040_0000), 0x2000, true, false, true)
            .unwrap();
        space
            .define_region(VirtualAddress::new(0x1000_0000), 0x1000, true, true, false)
            .unwrap();

        space.prepare_load();
        assert!(space.regions().iter().all(|r| r.is_loading() && r.allows_write()));

        space.complete_load();
        assert!(space.regions().iter().all(|r| !r.is_loading()));
    }

    #[test]
    fn translate_adds_page_offset() {
        setup();
        let frames = EmulatedFrameAllocator::new(4);
        let mut space = AddressSpace::new().unwrap();
        populate(&mut space, &frames, 0x3000, 0);
        let frame = space.page_table().lookup(VirtualAddress::new(0x3000).page_number());

        assert_eq!(
            space.translate(VirtualAddress::new(0x3abc)),
            Some(frame.unwrap().address().unwrap() + 0xabc)
        );
        assert_eq!(space.translate(VirtualAddress::new(0x4000)), None);

        space.destroy(&frames);
    }

    #[test]
    fn copy_is_independent() {
        setup();
        let frames = EmulatedFrameAllocator::new(8);
        let mut space = AddressSpace::new().unwrap();
        space
            .define_region(VirtualAddress::new(0x1000), 0x2000, true, true, false)
            .unwrap();
        populate(&mut space, &frames, 0x1000, 0x11);

        let copy = space.copy(&frames).unwrap();
        assert!(copy.regions().iter().eq(space.regions().iter()));

        let original = space.translate(VirtualAddress::new(0x1000)).unwrap();
        let copied = copy.translate(VirtualAddress::new(0x1000)).unwrap();
        assert_ne!(original, copied);

        unsafe {
            frame_bytes_mut(copied)[0] = 0x22;
            assert_eq!(frame_bytes_mut(original)[0], 0x11);
        }

        copy.destroy(&frames);
        space.destroy(&frames);
        assert_eq!(frames.in_use(), 0);
    }

    #[test]
    fn failed_copy_leaves_no_frames_behind() {
        setup();
        let frames = EmulatedFrameAllocator::new(8);
        let mut space = AddressSpace::new().unwrap();
        space
            .define_region(VirtualAddress::new(0x1000), 0x3000, true, true, false)
            .unwrap();
        for addr in [0x1000, 0x2000, 0x3000] {
            populate(&mut space, &frames, addr, 0xEE);
        }

        frames.set_limit(5);
        assert_eq!(space.copy(&frames).err(), Some(VmError::OutOfMemory));
        assert_eq!(frames.in_use(), 3);
        assert_eq!(space.page_table().resident_pages(), 3);

        space.destroy(&frames);
        assert_eq!(frames.in_use(), 0);
    }

    #[test]
    fn destroy_empty_space() {
        setup();
        let frames = EmulatedFrameAllocator::new(1);
        AddressSpace::new().unwrap().destroy(&frames);
        assert_eq!(frames.allocations(), 0);
    }
}
