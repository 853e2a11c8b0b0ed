//! Address types for physical and virtual memory management.
//!
//! This module provides architecture-independent wrappers around physical and virtual
//! addresses, and the translator the kernel uses to reach physical frames through
//! its direct map.

use core::fmt;
use core::ops::{Add, Sub};

use crate::{FrameNumber, PageNumber, arch};

#[cfg(any(test, feature = "software-emulation"))]
use crate::arch::EmulatedMemory;

/// Address translator for converting between physical and kernel virtual addresses.
///
/// This enum supports two modes:
/// - Hardware: Uses a direct-map offset for translation (kernel mode)
/// - Emulated: Uses an emulated memory buffer for translation (testing mode)
pub enum AddressTranslator {
    /// Hardware translation using a direct-map offset.
    Hardware { direct_map_offset: usize },
    /// Emulated translation using a simulated memory region.
    #[cfg(any(test, feature = "software-emulation"))]
    Emulated(EmulatedMemory),
}

impl AddressTranslator {
    /// Creates a new hardware translator with the given direct-map offset.
    pub const fn hardware(direct_map_offset: usize) -> Self {
        Self::Hardware { direct_map_offset }
    }

    /// Creates a new emulated translator with the given memory size.
    #[cfg(any(test, feature = "software-emulation"))]
    pub fn emulated(size: usize) -> Self {
        Self::Emulated(EmulatedMemory::new(size))
    }

    /// Sets the global address translator.
    ///
    /// This function must be called exactly once during initialization.
    ///
    /// # Panics
    ///
    /// Panics if the translator has already been set.
    pub fn set_current(translator: AddressTranslator) {
        #[cfg(not(any(test, feature = "software-emulation")))]
        {
            if ADDRESS_TRANSLATOR.get().is_some() {
                panic!("address translator already set");
            }
            ADDRESS_TRANSLATOR.call_once(|| translator);
        }

        #[cfg(any(test, feature = "software-emulation"))]
        {
            ADDRESS_TRANSLATOR.with(|t| {
                if t.get().is_some() {
                    panic!("address translator already set");
                }
                t.call_once(|| translator);
            });
        }
    }

    /// Returns a reference to the current global address translator.
    ///
    /// # Panics
    ///
    /// Panics if the translator has not been set yet.
    pub fn current() -> &'static AddressTranslator {
        #[cfg(not(any(test, feature = "software-emulation")))]
        {
            ADDRESS_TRANSLATOR.get().expect(
                "address translator not set; call AddressTranslator::set_current during initialization",
            )
        }

        #[cfg(any(test, feature = "software-emulation"))]
        {
            ADDRESS_TRANSLATOR.with(|t| {
                // SAFETY: Each thread has its own translator, it is never replaced once
                // set, and it lives as long as the thread.
                unsafe { &*(t.get().expect(
                    "address translator not set; call AddressTranslator::set_current during initialization",
                ) as *const AddressTranslator) }
            })
        }
    }

    /// Returns a reference to the current address translator if it has been set.
    #[cfg(any(test, feature = "software-emulation"))]
    pub fn try_current() -> Option<&'static AddressTranslator> {
        ADDRESS_TRANSLATOR.with(|t| {
            t.get().map(|translator| {
                // SAFETY: Same reasoning as current().
                unsafe { &*(translator as *const AddressTranslator) }
            })
        })
    }

    /// Translates a physical address to a kernel virtual address.
    pub fn phys_to_virt(&self, phys: usize) -> usize {
        match self {
            Self::Hardware { direct_map_offset } => phys.wrapping_add(*direct_map_offset),
            #[cfg(any(test, feature = "software-emulation"))]
            Self::Emulated(mem) => mem.translate(phys) as usize,
        }
    }

    /// Translates a kernel virtual address to a physical address.
    pub fn virt_to_phys(&self, virt: usize) -> usize {
        match self {
            Self::Hardware { direct_map_offset } => virt.wrapping_sub(*direct_map_offset),
            #[cfg(any(test, feature = "software-emulation"))]
            Self::Emulated(mem) => mem.ptr_to_phys(virt as *const u8),
        }
    }

    /// Allocates memory from the emulated space (test mode only).
    ///
    /// Returns the physical address of the allocated block, or None if
    /// there's not enough space.
    #[cfg(any(test, feature = "software-emulation"))]
    pub fn allocate(&self, size: usize, align: usize) -> Option<usize> {
        match self {
            Self::Hardware { .. } => {
                panic!("cannot allocate from hardware translator")
            }
            Self::Emulated(mem) => mem.allocate(size, align),
        }
    }
}

/// Global address translator.
///
/// This is initialized once during kernel initialization (with Hardware variant).
/// In test/software-emulation mode, this is thread-local to allow each test to have its own
/// emulated memory space.
#[cfg(not(any(test, feature = "software-emulation")))]
static ADDRESS_TRANSLATOR: spin::Once<AddressTranslator> = spin::Once::new();

#[cfg(any(test, feature = "software-emulation"))]
std::thread_local! {
    static ADDRESS_TRANSLATOR: spin::Once<AddressTranslator> = spin::Once::new();
}

/// Macro to define common address type functionality.
///
/// This macro generates the basic structure and methods common to both physical
/// and virtual address types, reducing code duplication.
macro_rules! impl_address_common {
    ($name:ident, $doc:expr) => {
        #[doc = $doc]
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        #[repr(transparent)]
        pub struct $name(usize);

        impl $name {
            /// Returns the raw address value.
            #[inline]
            pub const fn as_usize(self) -> usize {
                self.0
            }

            /// Checks if the address is aligned to the given alignment.
            ///
            /// # Panics
            ///
            /// Panics if `align` is not a power of two.
            #[inline]
            pub const fn is_aligned(self, align: usize) -> bool {
                assert!(align.is_power_of_two(), "alignment must be a power of two");
                self.0 & (align - 1) == 0
            }

            /// Aligns the address down to the given alignment.
            ///
            /// # Panics
            ///
            /// Panics if `align` is not a power of two.
            #[inline]
            pub const fn align_down(self, align: usize) -> Self {
                assert!(align.is_power_of_two(), "alignment must be a power of two");
                Self(self.0 & !(align - 1))
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({:#x})", stringify!($name), self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{:#x}", self.0)
            }
        }

        impl Add<usize> for $name {
            type Output = Self;

            #[inline]
            fn add(self, rhs: usize) -> Self::Output {
                Self::new(self.0 + rhs)
            }
        }

        impl Sub<usize> for $name {
            type Output = Self;

            #[inline]
            fn sub(self, rhs: usize) -> Self::Output {
                Self::new(self.0 - rhs)
            }
        }

        impl Sub<$name> for $name {
            type Output = usize;

            #[inline]
            fn sub(self, rhs: $name) -> Self::Output {
                self.0 - rhs.0
            }
        }
    };
}

impl_address_common!(
    PhysicalAddress,
    "A physical memory address.\n\n\
     Physical addresses must fit in the frame field of a translation entry."
);

impl PhysicalAddress {
    /// Creates a new physical address.
    ///
    /// # Panics
    ///
    /// Panics if the address exceeds the architecture's maximum physical address width.
    #[inline]
    pub const fn new(addr: usize) -> Self {
        assert!(
            arch::validate_physical(addr),
            "physical address exceeds maximum width"
        );
        Self(addr)
    }

    /// Returns the corresponding frame number for this physical address.
    #[inline]
    pub fn frame_number(self) -> FrameNumber {
        FrameNumber::from(self)
    }
}

impl_address_common!(
    VirtualAddress,
    "A virtual memory address.\n\n\
     User addresses are what faults report and regions describe; kernel addresses\n\
     reach physical frames through the direct map."
);

impl VirtualAddress {
    /// Creates a new virtual address.
    ///
    /// # Panics
    ///
    /// Panics if the address does not fit the architecture's virtual address width.
    #[inline]
    pub const fn new(addr: usize) -> Self {
        assert!(
            arch::validate_virtual(addr),
            "virtual address exceeds maximum width"
        );
        Self(addr)
    }

    /// Creates a kernel virtual address from a physical address using the direct map.
    ///
    /// # Panics
    ///
    /// Panics if the address translator has not been set via [`AddressTranslator::set_current`].
    #[inline]
    pub fn direct_mapped(phys: PhysicalAddress) -> Self {
        // Kernel pointers are not held to the user address width: on a 64-bit
        // kernel the direct map lives far above it, and in emulation this is a
        // host pointer.
        Self(AddressTranslator::current().phys_to_virt(phys.as_usize()))
    }

    /// Returns true if this is the null address.
    #[inline]
    pub const fn is_null(self) -> bool {
        self.0 == 0
    }

    /// Converts the address to a mutable pointer.
    #[inline]
    pub const fn as_mut_ptr<T>(self) -> *mut T {
        self.0 as *mut T
    }

    /// Returns the offset within the page.
    #[inline]
    pub const fn page_offset(self) -> usize {
        self.0 & (arch::PAGE_SIZE - 1)
    }

    /// Returns the page table index at the specified level.
    #[inline]
    pub const fn page_index(self, level: usize) -> usize {
        arch::page_index(self.0, level)
    }

    /// Gets the corresponding page number for this virtual address.
    #[inline]
    pub fn page_number(self) -> PageNumber {
        PageNumber::from(self)
    }
}
