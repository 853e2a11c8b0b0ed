#![cfg_attr(not(any(test, feature = "software-emulation")), no_std)]
#![feature(allocator_api)]

//! # Polaris Virtual Memory Manager (VMM)
//!
//! The Polaris Virtual Memory Manager is the user virtual memory subsystem of the
//! Polaris kernel, built for an MMU whose TLB is refilled by software. It provides:
//!
//! - Per-process address spaces made of regions with uniform permissions.
//! - A sparse two-level page table holding entries in the TLB's native format.
//! - A TLB fault handler that maps zeroed frames on first touch.
//! - Deep copies of address spaces for fork.
//! - Software emulation of the MMU, TLB and physical memory for testing in
//!   non-kernel environments.

extern crate alloc;

mod address;
mod address_space;
mod arch;
mod entry;
mod error;
mod fault;
mod frame;
mod numbers;
mod page_table;
mod region;
mod tlb;
mod vm;

pub use address::{AddressTranslator, PhysicalAddress, VirtualAddress};
pub use address_space::AddressSpace;
pub use entry::{PageEntry, PageFlags};
pub use error::{EFAULT, EINVAL, ENOMEM, VmError};
pub use fault::{FaultKind, handle_fault};
pub use frame::{FrameAllocator, frame_bytes_mut};
pub use numbers::{FrameNumber, PageNumber};
pub use page_table::PageTable;
pub use region::{Region, RegionList};
pub use tlb::TranslationCache;
pub use vm::VirtualMemory;

pub use arch::{
    LEAF_ENTRIES, PAGE_SHIFT, PAGE_SIZE, ROOT_ENTRIES, TLB_ENTRIES, USER_STACK_PAGES,
    USER_STACK_TOP,
};

#[cfg(any(test, feature = "software-emulation"))]
pub use arch::{EmulatedFrameAllocator, SoftwareTlb};
