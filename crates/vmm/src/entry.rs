//! Translation entry format.
//!
//! Page table leaves hold values in exactly the layout the TLB consumes, so a
//! refill copies the stored word straight into the hardware:
//! - Bits 0-8: Reserved (zero)
//! - Bit 9: Valid
//! - Bit 10: Dirty (the page may be written)
//! - Bits 12-31: Physical frame number

use core::fmt;

use crate::{FrameNumber, PhysicalAddress};

/// Flags carried by a translation entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageFlags(u32);

impl PageFlags {
    /// Valid bit (bit 9).
    const VALID: u32 = 1 << 9;

    /// Dirty bit (bit 10). On this MMU "dirty" means "writable".
    const DIRTY: u32 = 1 << 10;

    /// All flag bits this crate sets.
    const MASK: u32 = Self::VALID | Self::DIRTY;

    /// Creates empty flags (translation not valid, not writable).
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Creates flags from a raw value, discarding unknown bits.
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw & Self::MASK)
    }

    /// Returns the raw value of these flags.
    pub const fn to_raw(self) -> u32 {
        self.0
    }

    /// Returns whether the valid bit is set.
    pub fn is_valid(self) -> bool {
        (self.0 & Self::VALID) != 0
    }

    /// Sets or clears the valid bit.
    pub fn set_valid(&mut self, valid: bool) {
        if valid {
            self.0 |= Self::VALID;
        } else {
            self.0 &= !Self::VALID;
        }
    }

    /// Returns whether the dirty (writable) bit is set.
    pub fn is_dirty(self) -> bool {
        (self.0 & Self::DIRTY) != 0
    }

    /// Sets or clears the dirty (writable) bit.
    pub fn set_dirty(&mut self, dirty: bool) {
        if dirty {
            self.0 |= Self::DIRTY;
        } else {
            self.0 &= !Self::DIRTY;
        }
    }
}

impl Default for PageFlags {
    fn default() -> Self {
        Self::empty()
    }
}

/// A single translation entry: a physical frame plus its flags.
///
/// The all-zero entry is the unmapped sentinel stored in fresh leaf tables.
#[derive(Clone, Copy, PartialEq, Eq)]
#[repr(transparent)]
pub struct PageEntry(u32);

impl PageEntry {
    /// Physical frame mask (bits 12-31).
    const FRAME_MASK: u32 = 0xFFFF_F000;

    /// The unmapped sentinel.
    pub const EMPTY: Self = Self(0);

    /// Creates a new translation entry.
    ///
    /// The physical address must be page-aligned.
    pub fn new(address: PhysicalAddress, flags: PageFlags) -> Self {
        debug_assert!(
            address.is_aligned(crate::arch::PAGE_SIZE),
            "physical address must be page-aligned"
        );

        let frame_bits = address.as_usize() as u32 & Self::FRAME_MASK;
        Self(frame_bits | flags.to_raw())
    }

    /// Returns the physical address of the frame, or None if the entry is not valid.
    pub fn address(self) -> Option<PhysicalAddress> {
        if self.is_valid() {
            Some(PhysicalAddress::new((self.0 & Self::FRAME_MASK) as usize))
        } else {
            None
        }
    }

    /// Returns the frame number, or None if the entry is not valid.
    pub fn frame(self) -> Option<FrameNumber> {
        self.address().map(FrameNumber::from)
    }

    /// Returns the flags for this entry.
    pub fn flags(self) -> PageFlags {
        PageFlags::from_raw(self.0)
    }

    /// Sets the flags for this entry, preserving the frame.
    pub fn set_flags(&mut self, flags: PageFlags) {
        self.0 = (self.0 & Self::FRAME_MASK) | flags.to_raw();
    }

    /// Returns whether this entry maps a frame.
    pub fn is_valid(self) -> bool {
        self.flags().is_valid()
    }

    /// Returns whether this entry allows writes.
    pub fn is_dirty(self) -> bool {
        self.flags().is_dirty()
    }

    /// Returns the raw word in hardware format.
    pub const fn as_u32(self) -> u32 {
        self.0
    }

    /// Creates an entry from a raw hardware-format word.
    pub const fn from_u32(value: u32) -> Self {
        Self(value)
    }
}

impl Default for PageEntry {
    fn default() -> Self {
        Self::EMPTY
    }
}

impl fmt::Debug for PageEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PageEntry")
            .field("frame", &format_args!("{:#x}", self.0 & Self::FRAME_MASK))
            .field("valid", &self.is_valid())
            .field("dirty", &self.is_dirty())
            .finish()
    }
}
