//! Emulated software-refilled TLB.

use core::sync::atomic::{AtomicUsize, Ordering};

use super::interrupts;
use crate::{PageEntry, PageNumber, TranslationCache, arch::TLB_ENTRIES};

/// One TLB slot: the page it translates (if any) and the entry for it.
#[derive(Debug, Clone, Copy)]
struct Slot {
    page: Option<PageNumber>,
    entry: PageEntry,
}

impl Slot {
    const INVALID: Self = Self {
        page: None,
        entry: PageEntry::EMPTY,
    };
}

struct Slots {
    slots: [Slot; TLB_ENTRIES],
    /// xorshift state for random replacement.
    seed: u32,
}

impl Slots {
    fn next_victim(&mut self) -> usize {
        let mut x = self.seed;
        x ^= x << 13;
        x ^= x >> 17;
        x ^= x << 5;
        self.seed = x;
        x as usize % TLB_ENTRIES
    }
}

/// A software model of a 64-slot TLB with random replacement.
///
/// Writing a page that is already cached reuses its slot, so no page is ever
/// present twice. Every write checks that interrupts are masked, which is what
/// the real hardware needs from its callers.
pub struct SoftwareTlb {
    inner: spin::Mutex<Slots>,
    installs: AtomicUsize,
    flushes: AtomicUsize,
}

impl SoftwareTlb {
    /// Creates a TLB with every slot invalid.
    pub const fn new() -> Self {
        Self {
            inner: spin::Mutex::new(Slots {
                slots: [Slot::INVALID; TLB_ENTRIES],
                seed: 0x2545_F491,
            }),
            installs: AtomicUsize::new(0),
            flushes: AtomicUsize::new(0),
        }
    }

    /// Returns the cached entry for `page`, if one is present.
    pub fn probe(&self, page: PageNumber) -> Option<PageEntry> {
        self.inner
            .lock()
            .slots
            .iter()
            .find(|slot| slot.page == Some(page))
            .map(|slot| slot.entry)
    }

    /// Returns the number of slots currently holding a translation.
    pub fn valid_entries(&self) -> usize {
        self.inner
            .lock()
            .slots
            .iter()
            .filter(|slot| slot.page.is_some())
            .count()
    }

    /// Returns the number of translations written since creation.
    pub fn installs(&self) -> usize {
        self.installs.load(Ordering::Relaxed)
    }

    /// Returns the number of full invalidations since creation.
    pub fn flushes(&self) -> usize {
        self.flushes.load(Ordering::Relaxed)
    }
}

impl Default for SoftwareTlb {
    fn default() -> Self {
        Self::new()
    }
}

impl TranslationCache for SoftwareTlb {
    fn invalidate_all(&self) {
        assert!(
            !interrupts::are_enabled(),
            "TLB flushed with interrupts enabled"
        );
        self.inner.lock().slots = [Slot::INVALID; TLB_ENTRIES];
        self.flushes.fetch_add(1, Ordering::Relaxed);
    }

    fn install(&self, page: PageNumber, entry: PageEntry) {
        assert!(
            !interrupts::are_enabled(),
            "TLB written with interrupts enabled"
        );
        let mut inner = self.inner.lock();
        let index = match inner.slots.iter().position(|slot| slot.page == Some(page)) {
            Some(index) => index,
            None => inner.next_victim(),
        };
        inner.slots[index] = Slot {
            page: Some(page),
            entry,
        };
        self.installs.fetch_add(1, Ordering::Relaxed);
    }
}
