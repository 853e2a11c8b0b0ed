//! x86_64 hardware backend.
//!
//! The page table geometry is shared with every backend; the hardware only
//! provides interrupt masking around TLB writes. The TLB itself and physical
//! frames are supplied by the kernel through [`TranslationCache`](crate::TranslationCache)
//! and [`FrameAllocator`](crate::FrameAllocator).

/// Interrupt masking for the current CPU.
pub mod interrupts {
    pub use ::x86_64::instructions::interrupts::{are_enabled, without_interrupts};
}
