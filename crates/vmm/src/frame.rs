//! Physical frame allocation interface.
//!
//! Frames come from the kernel's physical memory allocator, which lives outside
//! this crate. Frame contents are reached through the direct map set up by
//! [`AddressTranslator`](crate::AddressTranslator).

use crate::{PhysicalAddress, VirtualAddress, arch::PAGE_SIZE};

/// Source of page-sized physical frames.
///
/// Frames handed out may hold stale data; callers zero or overwrite them.
pub trait FrameAllocator {
    /// Allocates one page-aligned frame, or returns None if memory is exhausted.
    fn allocate_frame(&self) -> Option<PhysicalAddress>;

    /// Returns a frame previously obtained from [`allocate_frame`](Self::allocate_frame).
    fn free_frame(&self, frame: PhysicalAddress);
}

impl<A: FrameAllocator + ?Sized> FrameAllocator for &A {
    fn allocate_frame(&self) -> Option<PhysicalAddress> {
        (**self).allocate_frame()
    }

    fn free_frame(&self, frame: PhysicalAddress) {
        (**self).free_frame(frame)
    }
}

/// Returns the contents of a frame through the direct map.
///
/// # Safety
///
/// The frame must be allocated, and no other reference to its contents may be
/// live for `'a`.
pub unsafe fn frame_bytes_mut<'a>(frame: PhysicalAddress) -> &'a mut [u8] {
    let ptr: *mut u8 = VirtualAddress::direct_mapped(frame).as_mut_ptr();
    // SAFETY: The direct map covers every frame with PAGE_SIZE bytes; exclusivity
    // is the caller's obligation.
    unsafe { core::slice::from_raw_parts_mut(ptr, PAGE_SIZE) }
}

/// Fills a frame with zeros.
///
/// # Safety
///
/// The frame must be allocated and not referenced elsewhere.
pub(crate) unsafe fn zero_frame(frame: PhysicalAddress) {
    let ptr: *mut u8 = VirtualAddress::direct_mapped(frame).as_mut_ptr();
    unsafe { ptr.write_bytes(0, PAGE_SIZE) };
}

/// Copies the full contents of `src` into `dst`.
///
/// # Safety
///
/// Both frames must be allocated and distinct, and `dst` must not be referenced elsewhere.
pub(crate) unsafe fn copy_frame(src: PhysicalAddress, dst: PhysicalAddress) {
    debug_assert_ne!(src, dst, "frame copied onto itself");
    let from: *mut u8 = VirtualAddress::direct_mapped(src).as_mut_ptr();
    let to: *mut u8 = VirtualAddress::direct_mapped(dst).as_mut_ptr();
    unsafe { core::ptr::copy_nonoverlapping(from as *const u8, to, PAGE_SIZE) };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::AddressTranslator;

    fn setup() {
        if AddressTranslator::try_current().is_none() {
            AddressTranslator::set_current(AddressTranslator::emulated(4 * PAGE_SIZE));
        }
    }

    #[test]
    fn zero_frame_clears_contents() {
        setup();
        let frame = PhysicalAddress::new(PAGE_SIZE);
        unsafe {
            frame_bytes_mut(frame).fill(0xFF);
            zero_frame(frame);
            assert!(frame_bytes_mut(frame).iter().all(|&b| b == 0));
        }
    }

    #[test]
    fn copy_frame_duplicates_contents() {
        setup();
        let src = PhysicalAddress::new(2 * PAGE_SIZE);
        let dst = PhysicalAddress::new(3 * PAGE_SIZE);
        unsafe {
            for (i, byte) in frame_bytes_mut(src).iter_mut().enumerate() {
                *byte = i as u8;
            }
            copy_frame(src, dst);
            assert_eq!(frame_bytes_mut(src), frame_bytes_mut(dst));
        }
    }
}
