//! Error types for virtual memory operations.

use core::fmt;

/// Kernel errno for an exhausted allocation.
pub const ENOMEM: i32 = 3;

/// Kernel errno for a bad user address.
pub const EFAULT: i32 = 6;

/// Kernel errno for an invalid argument.
pub const EINVAL: i32 = 8;

/// Errors that can occur while managing an address space or resolving a fault.
///
/// None of these are retried internally; the caller (the trap dispatcher or the
/// process lifecycle code) decides what happens to the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VmError {
    /// A physical frame or page table allocation failed.
    OutOfMemory,
    /// The address is null, outside every region, or has no address space.
    InvalidAddress,
    /// A write hit a translation that is marked read-only.
    ProtectionFault,
    /// A new region would overlap an existing one.
    RegionOverlap,
}

impl VmError {
    /// Returns the errno the syscall layer reports for this error.
    pub const fn errno(self) -> i32 {
        match self {
            Self::OutOfMemory => ENOMEM,
            Self::InvalidAddress | Self::ProtectionFault => EFAULT,
            Self::RegionOverlap => EINVAL,
        }
    }
}

impl From<core::alloc::AllocError> for VmError {
    fn from(_: core::alloc::AllocError) -> Self {
        Self::OutOfMemory
    }
}

impl fmt::Display for VmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OutOfMemory => write!(f, "out of memory"),
            Self::InvalidAddress => write!(f, "invalid address"),
            Self::ProtectionFault => write!(f, "write to read-only page"),
            Self::RegionOverlap => write!(f, "region overlaps an existing region"),
        }
    }
}
