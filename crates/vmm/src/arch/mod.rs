//! Architecture-specific implementations for virtual memory management.
//!
//! The page table geometry and translation entry format are fixed by the
//! software-refilled TLB this subsystem targets. What varies between backends is
//! how interrupts are masked around a TLB write and where the TLB and physical
//! memory come from.

// Use the x86_64 hardware backend when we're on x86_64 and not testing or emulating.
// NOTE: We DO include the module even during tests so that rust-analyzer can see it.
#[cfg(target_arch = "x86_64")]
mod x86_64;
#[cfg(all(target_arch = "x86_64", not(test), not(feature = "software-emulation")))]
pub use x86_64::*;

// Use software emulation ONLY when:
// - Running tests, OR
// - software-emulation feature is explicitly enabled
#[cfg(any(test, feature = "software-emulation"))]
mod software;
#[cfg(any(test, feature = "software-emulation"))]
pub use software::*;

/// Number of bits in a page offset.
pub const PAGE_SHIFT: usize = 12;

/// Page size in bytes (4 KiB).
pub const PAGE_SIZE: usize = 1 << PAGE_SHIFT;

/// Maximum number of bits in a virtual address.
pub const MAX_VIRTUAL_BITS: usize = 32;

/// Maximum number of bits in a physical address.
pub const MAX_PHYSICAL_BITS: usize = 32;

/// Number of page table levels (level 1 is the root, level 0 holds the leaf entries).
pub const PAGE_TABLE_LEVELS: usize = 2;

/// Number of index bits consumed by the leaf level.
pub const LEAF_INDEX_BITS: usize = 9;

/// Number of index bits consumed by the root level.
pub const ROOT_INDEX_BITS: usize = MAX_VIRTUAL_BITS - PAGE_SHIFT - LEAF_INDEX_BITS;

/// Entries in one second-level (leaf) table.
pub const LEAF_ENTRIES: usize = 1 << LEAF_INDEX_BITS;

/// Slots in the root table.
pub const ROOT_ENTRIES: usize = 1 << ROOT_INDEX_BITS;

/// Highest user address plus one; the user stack grows down from here.
pub const USER_STACK_TOP: usize = 0x8000_0000;

/// Size of the user stack region in pages.
pub const USER_STACK_PAGES: usize = 16;

/// Number of slots in the hardware TLB.
pub const TLB_ENTRIES: usize = 64;

/// Returns the page table index for a given virtual address at the specified level.
///
/// - Level 0: Bits 12-20 (entry within a leaf table)
/// - Level 1: Bits 21-31 (root slot)
#[inline]
pub const fn page_index(address: usize, level: usize) -> usize {
    match level {
        0 => (address >> PAGE_SHIFT) & (LEAF_ENTRIES - 1),
        1 => (address >> (PAGE_SHIFT + LEAF_INDEX_BITS)) & (ROOT_ENTRIES - 1),
        _ => panic!("level out of range for a two-level page table"),
    }
}

/// Validates a physical address.
///
/// Physical addresses must fit in the frame field of a translation entry.
#[inline]
pub const fn validate_physical(addr: usize) -> bool {
    (addr as u64) < (1u64 << MAX_PHYSICAL_BITS)
}

/// Validates a virtual address.
#[inline]
pub const fn validate_virtual(addr: usize) -> bool {
    (addr as u64) < (1u64 << MAX_VIRTUAL_BITS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn geometry_covers_address_space() {
        assert_eq!(ROOT_ENTRIES, 2048);
        assert_eq!(LEAF_ENTRIES, 512);
        assert_eq!(ROOT_ENTRIES * LEAF_ENTRIES * PAGE_SIZE, 1usize << MAX_VIRTUAL_BITS);
    }

    #[test]
    fn page_index_splits_address() {
        // 0x7FE0_3123: root 0x3FF, leaf 0x003, offset 0x123
        let addr = 0x7FE0_3123;
        assert_eq!(page_index(addr, 1), 0x3FF);
        assert_eq!(page_index(addr, 0), 0x003);
    }

    #[test]
    fn highest_page_uses_last_slots() {
        assert_eq!(page_index(0xFFFF_F000, 1), ROOT_ENTRIES - 1);
        assert_eq!(page_index(0xFFFF_F000, 0), LEAF_ENTRIES - 1);
    }

    #[test]
    fn address_validation() {
        assert!(validate_virtual(0xFFFF_FFFF));
        assert!(!validate_virtual(0x1_0000_0000));
        assert!(validate_physical(0));
        assert!(!validate_physical(0x1_0000_0000));
    }
}
