//! Interface to the hardware translation cache.
//!
//! The target MMU has no page table walker: every translation it uses must be
//! written into its TLB by software. The fault handler refills it one entry at
//! a time and address space activation flushes it.

use crate::{PageEntry, PageNumber};

/// A hardware translation lookaside buffer that is filled by software.
///
/// Implementations only touch the TLB of the execution unit they run on.
/// Callers mask interrupts around every call so that a nested fault never
/// observes a half-written slot.
pub trait TranslationCache {
    /// Invalidates every slot.
    fn invalidate_all(&self);

    /// Writes `entry` as the translation for `page` into a slot of the
    /// hardware's choosing.
    fn install(&self, page: PageNumber, entry: PageEntry);
}

impl<T: TranslationCache + ?Sized> TranslationCache for &T {
    fn invalidate_all(&self) {
        (**self).invalidate_all()
    }

    fn install(&self, page: PageNumber, entry: PageEntry) {
        (**self).install(page, entry)
    }
}
