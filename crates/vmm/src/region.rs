//! Virtual memory regions.
//!
//! An address space is a handful of regions (text, data, heap, stack), each a
//! contiguous range of user addresses with one set of permissions. Faults are
//! only resolved for addresses that fall inside a region.

use alloc::vec::Vec;

use crate::{VirtualAddress, VmError};

/// A contiguous range of virtual memory with uniform permissions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    base: VirtualAddress,
    length: usize,
    readable: bool,
    writable: bool,
    executable: bool,
    /// Set while a loader populates the region; forces it writable.
    loading: bool,
}

impl Region {
    /// Creates a new region that is not being loaded.
    pub const fn new(
        base: VirtualAddress,
        length: usize,
        readable: bool,
        writable: bool,
        executable: bool,
    ) -> Self {
        Self {
            base,
            length,
            readable,
            writable,
            executable,
            loading: false,
        }
    }

    /// Returns the first address of this region.
    pub const fn base(&self) -> VirtualAddress {
        self.base
    }

    /// Returns the length of this region in bytes.
    pub const fn length(&self) -> usize {
        self.length
    }

    /// Returns the address one past the end of this region.
    ///
    /// Saturates at the top of the address space.
    pub const fn end(&self) -> usize {
        self.base.as_usize().saturating_add(self.length)
    }

    pub const fn is_readable(&self) -> bool {
        self.readable
    }

    pub const fn is_writable(&self) -> bool {
        self.writable
    }

    pub const fn is_executable(&self) -> bool {
        self.executable
    }

    pub const fn is_loading(&self) -> bool {
        self.loading
    }

    /// Returns whether pages of this region may currently be written, taking the
    /// loading phase into account.
    pub const fn allows_write(&self) -> bool {
        self.loading || self.writable
    }

    /// Returns true if `addr` lies in `[base, base + length)`.
    pub const fn contains(&self, addr: VirtualAddress) -> bool {
        addr.as_usize() >= self.base.as_usize()
            && addr.as_usize() - self.base.as_usize() < self.length
    }

    /// Returns true if this region shares at least one address with `other`.
    pub const fn overlaps(&self, other: &Region) -> bool {
        self.length != 0
            && other.length != 0
            && self.base.as_usize() < other.end()
            && other.base.as_usize() < self.end()
    }
}

/// The ordered set of regions belonging to one address space.
///
/// Insertion order is preserved so copies iterate identically.
#[derive(Debug, Default)]
pub struct RegionList {
    regions: Vec<Region>,
}

impl RegionList {
    /// Creates an empty region list.
    pub const fn new() -> Self {
        Self {
            regions: Vec::new(),
        }
    }

    /// Appends a region.
    ///
    /// Fails with [`VmError::RegionOverlap`] if the region shares any address
    /// with an existing one, and with [`VmError::OutOfMemory`] if the record
    /// cannot be stored. The list is unchanged on failure.
    pub fn define(&mut self, region: Region) -> Result<(), VmError> {
        if let Some(existing) = self.regions.iter().find(|r| r.overlaps(&region)) {
            log::warn!(
                "region {}+{:#x} overlaps {}+{:#x}",
                region.base(),
                region.length(),
                existing.base(),
                existing.length()
            );
            return Err(VmError::RegionOverlap);
        }

        self.regions
            .try_reserve(1)
            .map_err(|_| VmError::OutOfMemory)?;
        self.regions.push(region);
        Ok(())
    }

    /// Returns the region containing `addr`, if any.
    pub fn find_containing(&self, addr: VirtualAddress) -> Option<&Region> {
        self.regions.iter().find(|region| region.contains(addr))
    }

    /// Marks every region as being loaded, making all of them writable.
    pub fn begin_loading(&mut self) {
        for region in &mut self.regions {
            region.loading = true;
        }
    }

    /// Ends the loading phase; declared permissions apply again.
    pub fn end_loading(&mut self) {
        for region in &mut self.regions {
            region.loading = false;
        }
    }

    /// Duplicates the list, preserving order and every field.
    pub fn try_clone(&self) -> Result<Self, VmError> {
        let mut regions = Vec::new();
        regions
            .try_reserve_exact(self.regions.len())
            .map_err(|_| VmError::OutOfMemory)?;
        regions.extend_from_slice(&self.regions);
        Ok(Self { regions })
    }

    pub fn iter(&self) -> impl Iterator<Item = &Region> {
        self.regions.iter()
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }
}
