//! TLB miss and protection fault handling.
//!
//! The MMU traps whenever a translation is missing from the TLB or a write hits
//! a translation without the dirty bit. Misses inside a region are resolved here,
//! allocating and zeroing a frame the first time a page is touched.

use core::fmt;

use crate::{
    AddressSpace, FrameAllocator, PageEntry, PageFlags, PageNumber, TranslationCache,
    VirtualAddress, VmError, arch::interrupts, frame::zero_frame,
};

/// The reason the MMU trapped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultKind {
    /// A load missed in the TLB.
    Read,
    /// A store missed in the TLB.
    Write,
    /// A store hit a TLB entry without the dirty bit.
    ReadOnly,
}

impl TryFrom<u32> for FaultKind {
    type Error = u32;

    /// Decodes the trap code passed up by the exception dispatcher.
    fn try_from(code: u32) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(Self::Read),
            1 => Ok(Self::Write),
            2 => Ok(Self::ReadOnly),
            other => Err(other),
        }
    }
}

impl fmt::Display for FaultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Read => write!(f, "read"),
            Self::Write => write!(f, "write"),
            Self::ReadOnly => write!(f, "read-only"),
        }
    }
}

/// Resolves a fault taken at `addr` while `space` was active.
///
/// On success exactly one translation has been written to `tlb`. A page that is
/// already resident is refilled from the page table; a page touched for the
/// first time gets a zeroed frame from `frames`. The dirty bit of the installed
/// entry follows the containing region: set while the region is loading or if
/// it is writable.
///
/// # Errors
///
/// - [`VmError::ProtectionFault`] for a write to a read-only translation.
/// - [`VmError::InvalidAddress`] for the null address, when no address space is
///   active, or when no region contains `addr`. No frame is allocated.
/// - [`VmError::OutOfMemory`] if the frame or a page table leaf cannot be
///   allocated. The page table is left unchanged.
pub fn handle_fault<A, T>(
    space: Option<&mut AddressSpace>,
    kind: FaultKind,
    addr: VirtualAddress,
    frames: &A,
    tlb: &T,
) -> Result<(), VmError>
where
    A: FrameAllocator + ?Sized,
    T: TranslationCache + ?Sized,
{
    let result = resolve(space, kind, addr, frames, tlb);
    if let Err(err) = result {
        log::warn!("unresolved {} fault at {}: {}", kind, addr, err);
    }
    result
}

fn resolve<A, T>(
    space: Option<&mut AddressSpace>,
    kind: FaultKind,
    addr: VirtualAddress,
    frames: &A,
    tlb: &T,
) -> Result<(), VmError>
where
    A: FrameAllocator + ?Sized,
    T: TranslationCache + ?Sized,
{
    if kind == FaultKind::ReadOnly {
        return Err(VmError::ProtectionFault);
    }
    if addr.is_null() {
        return Err(VmError::InvalidAddress);
    }
    let space = space.ok_or(VmError::InvalidAddress)?;

    let region = space
        .regions()
        .find_containing(addr)
        .ok_or(VmError::InvalidAddress)?;
    let mut flags = PageFlags::empty();
    flags.set_valid(true);
    flags.set_dirty(region.allows_write());

    let page = addr.page_number();
    if let Some(frame) = space.page_table().lookup(page).and_then(PageEntry::address) {
        // Refills only update the TLB; the stored entry keeps the bits it was
        // created with.
        install(tlb, page, PageEntry::new(frame, flags));
        log::trace!("{} fault at {}: refilled from frame {}", kind, addr, frame);
        return Ok(());
    }

    let frame = frames.allocate_frame().ok_or(VmError::OutOfMemory)?;
    // SAFETY: The frame was just allocated and nothing maps it yet.
    unsafe { zero_frame(frame) };

    let entry = PageEntry::new(frame, flags);
    if let Err(err) = space.page_table_mut().insert(page, entry) {
        frames.free_frame(frame);
        return Err(err);
    }

    install(tlb, page, entry);
    log::trace!("{} fault at {}: mapped new frame {}", kind, addr, frame);
    Ok(())
}

fn install<T: TranslationCache + ?Sized>(tlb: &T, page: PageNumber, entry: PageEntry) {
    interrupts::without_interrupts(|| tlb.install(page, entry));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        AddressTranslator, EmulatedFrameAllocator, SoftwareTlb, arch::PAGE_SIZE,
        frame::frame_bytes_mut,
    };

    fn setup() {
        if AddressTranslator::try_current().is_none() {
            AddressTranslator::set_current(AddressTranslator::emulated(64 * PAGE_SIZE));
        }
    }

    fn addr(addr: usize) -> VirtualAddress {
        VirtualAddress::new(addr)
    }

    fn space_with_region(base: usize, length: usize, writable: bool) -> AddressSpace {
        let mut space = AddressSpace::new().unwrap();
        space
            .define_region(addr(base), length, true, writable, false)
            .unwrap();
        space
    }

    #[test]
    fn decodes_trap_codes() {
        assert_eq!(FaultKind::try_from(0), Ok(FaultKind::Read));
        assert_eq!(FaultKind::try_from(1), Ok(FaultKind::Write));
        assert_eq!(FaultKind::try_from(2), Ok(FaultKind::ReadOnly));
        assert_eq!(FaultKind::try_from(7), Err(7));
    }

    #[test]
    fn read_only_violation_is_a_protection_fault() {
        setup();
        let frames = EmulatedFrameAllocator::new(4);
        let tlb = SoftwareTlb::new();
        let mut space = space_with_region(0x1000, 0x1000, false);

        let result = handle_fault(Some(&mut space), FaultKind::ReadOnly, addr(0x1000), &frames, &tlb);
        assert_eq!(result, Err(VmError::ProtectionFault));
        assert_eq!(frames.allocations(), 0);
        assert_eq!(tlb.installs(), 0);
    }

    #[test]
    fn null_address_is_invalid_even_inside_a_region() {
        setup();
        let frames = EmulatedFrameAllocator::new(4);
        let tlb = SoftwareTlb::new();
        let mut space = space_with_region(0, 0x4000, true);

        for kind in [FaultKind::Read, FaultKind::Write] {
            let result = handle_fault(Some(&mut space), kind, addr(0), &frames, &tlb);
            assert_eq!(result, Err(VmError::InvalidAddress));
        }
        assert_eq!(frames.allocations(), 0);
    }

    #[test]
    fn no_address_space_is_invalid() {
        setup();
        let frames = EmulatedFrameAllocator::new(4);
        let tlb = SoftwareTlb::new();

        let result = handle_fault(None, FaultKind::Read, addr(0x1000), &frames, &tlb);
        assert_eq!(result, Err(VmError::InvalidAddress));
    }

    #[test]
    fn fault_outside_every_region_allocates_nothing() {
        setup();
        let frames = EmulatedFrameAllocator::new(4);
        let tlb = SoftwareTlb::new();
        let mut space = space_with_region(0x1000, 0x1000, true);

        let result = handle_fault(Some(&mut space), FaultKind::Read, addr(0x500), &frames, &tlb);
        assert_eq!(result, Err(VmError::InvalidAddress));
        assert_eq!(frames.allocations(), 0);
        assert_eq!(space.page_table().leaf_tables(), 0);
        assert_eq!(tlb.installs(), 0);
    }

    #[test]
    fn first_touch_maps_a_zeroed_frame() {
        setup();
        let frames = EmulatedFrameAllocator::new(4);
        let tlb = SoftwareTlb::new();
        let mut space = space_with_region(0x1000, 0x1000, true);

        // Leave garbage in a frame so the fault handler receives it recycled.
        let stale = frames.allocate_frame().unwrap();
        unsafe { frame_bytes_mut(stale).fill(0xAB) };
        frames.free_frame(stale);

        handle_fault(Some(&mut space), FaultKind::Write, addr(0x1000), &frames, &tlb).unwrap();

        let frame = space.translate(addr(0x1000)).unwrap();
        assert_eq!(frame, stale);
        unsafe { assert!(frame_bytes_mut(frame).iter().all(|&b| b == 0)) };

        space.destroy(&frames);
    }

    #[test]
    fn repeated_faults_reuse_the_frame() {
        setup();
        let frames = EmulatedFrameAllocator::new(4);
        let tlb = SoftwareTlb::new();
        let mut space = space_with_region(0x1000, 0x2000, true);

        handle_fault(Some(&mut space), FaultKind::Read, addr(0x1000), &frames, &tlb).unwrap();
        handle_fault(Some(&mut space), FaultKind::Write, addr(0x1ffc), &frames, &tlb).unwrap();

        assert_eq!(frames.allocations(), 1);
        assert_eq!(tlb.installs(), 2);
        assert_eq!(space.page_table().resident_pages(), 1);

        space.destroy(&frames);
    }

    #[test]
    fn write_fault_in_read_only_region_installs_clean_entry() {
        setup();
        let frames = EmulatedFrameAllocator::new(4);
        let tlb = SoftwareTlb::new();
        let mut space = space_with_region(0x1000, 0x1000, false);
        let page = addr(0x1000).page_number();

        handle_fault(Some(&mut space), FaultKind::Write, addr(0x1000), &frames, &tlb).unwrap();

        let entry = tlb.probe(page).unwrap();
        assert!(entry.is_valid());
        assert!(!entry.is_dirty());
        assert_eq!(space.page_table().lookup(page), Some(entry));

        space.destroy(&frames);
    }

    #[test]
    fn loading_region_installs_dirty_entry() {
        setup();
        let frames = EmulatedFrameAllocator::new(4);
        let tlb = SoftwareTlb::new();
        let mut space = space_with_region(0x1000, 0x1000, false);
        space.prepare_load();

        handle_fault(Some(&mut space), FaultKind::Write, addr(0x1000), &frames, &tlb).unwrap();

        let entry = tlb.probe(addr(0x1000).page_number()).unwrap();
        assert!(entry.is_valid());
        assert!(entry.is_dirty());

        space.destroy(&frames);
    }

    #[test]
    fn refill_recomputes_dirty_without_touching_page_table() {
        setup();
        let frames = EmulatedFrameAllocator::new(4);
        let tlb = SoftwareTlb::new();
        let mut space = space_with_region(0x1000, 0x1000, false);
        let page = addr(0x1000).page_number();

        space.prepare_load();
        handle_fault(Some(&mut space), FaultKind::Write, addr(0x1000), &frames, &tlb).unwrap();
        space.complete_load();
        handle_fault(Some(&mut space), FaultKind::Read, addr(0x1000), &frames, &tlb).unwrap();

        assert!(!tlb.probe(page).unwrap().is_dirty());
        assert!(space.page_table().lookup(page).unwrap().is_dirty());
        assert_eq!(frames.allocations(), 1);

        space.destroy(&frames);
    }

    #[test]
    fn out_of_frames_leaves_page_unmapped() {
        setup();
        let frames = EmulatedFrameAllocator::new(0);
        let tlb = SoftwareTlb::new();
        let mut space = space_with_region(0x1000, 0x1000, true);

        let result = handle_fault(Some(&mut space), FaultKind::Read, addr(0x1000), &frames, &tlb);
        assert_eq!(result, Err(VmError::OutOfMemory));
        assert_eq!(space.page_table().resident_pages(), 0);
        assert_eq!(tlb.installs(), 0);
    }

    #[test]
    fn copy_after_fault_duplicates_page() {
        setup();
        let frames = EmulatedFrameAllocator::new(4);
        let tlb = SoftwareTlb::new();
        let mut space = space_with_region(0x1000, 0x1000, true);
        let page = addr(0x1000).page_number();

        handle_fault(Some(&mut space), FaultKind::Write, addr(0x1000), &frames, &tlb).unwrap();
        let original = space.page_table().lookup(page).unwrap();
        assert!(original.is_valid() && original.is_dirty());
        let f1 = original.address().unwrap();
        unsafe { frame_bytes_mut(f1)[..4].copy_from_slice(b"fork") };

        let mut copy = space.copy(&frames).unwrap();
        let copied = copy.page_table().lookup(page).unwrap();
        let f2 = copied.address().unwrap();

        assert_ne!(f1, f2);
        assert_eq!(copied.flags(), original.flags());
        unsafe { assert_eq!(frame_bytes_mut(f1), frame_bytes_mut(f2)) };

        // Writes through the copy stay in the copy.
        handle_fault(Some(&mut copy), FaultKind::Write, addr(0x1000), &frames, &tlb).unwrap();
        unsafe {
            frame_bytes_mut(f2)[0] = b'F';
            assert_eq!(&frame_bytes_mut(f1)[..4], b"fork");
        }

        copy.destroy(&frames);
        space.destroy(&frames);
        assert_eq!(frames.in_use(), 0);
    }
}
