//! Two-level software page table.
//!
//! This module provides the `PageTable` type, the per-address-space record of which
//! virtual pages are backed by which physical frames. The TLB never reads it
//! directly; the fault handler copies entries out of it on every refill.

use alloc::{boxed::Box, vec::Vec};

use crate::{
    FrameAllocator, PageEntry, PageNumber, VmError,
    arch::{LEAF_ENTRIES, ROOT_ENTRIES},
    frame::copy_frame,
};

/// A second-level table: one entry per page in a 2 MiB span.
type LeafTable = [PageEntry; LEAF_ENTRIES];

/// Allocates a leaf table with every entry unmapped.
fn alloc_leaf_table() -> Result<Box<LeafTable>, VmError> {
    Ok(Box::try_new([PageEntry::EMPTY; LEAF_ENTRIES])?)
}

/// A sparse two-level page table.
///
/// The root holds one optional leaf table per 2 MiB of address space. Leaf tables
/// are allocated the first time an entry in their span is inserted and are only
/// freed when the whole table is released, so an absent leaf table (nothing was
/// ever mapped there) is distinct from an unmapped entry inside a present one.
pub struct PageTable {
    roots: Box<[Option<Box<LeafTable>>]>,
}

impl PageTable {
    /// Creates a page table with every leaf table absent.
    pub fn new() -> Result<Self, VmError> {
        let mut roots = Vec::new();
        roots
            .try_reserve_exact(ROOT_ENTRIES)
            .map_err(|_| VmError::OutOfMemory)?;
        roots.resize_with(ROOT_ENTRIES, || None);

        Ok(Self {
            roots: roots.into_boxed_slice(),
        })
    }

    /// Looks up the entry for a virtual page.
    ///
    /// Returns None if no leaf table covers the page. Otherwise returns the stored
    /// entry, which is [`PageEntry::EMPTY`] if the page was never mapped.
    pub fn lookup(&self, page: PageNumber) -> Option<PageEntry> {
        let leaf = self.roots[page.index(1)].as_ref()?;
        Some(leaf[page.index(0)])
    }

    /// Stores the entry for a virtual page, allocating its leaf table if needed.
    ///
    /// Fails with [`VmError::OutOfMemory`] if the leaf table cannot be allocated,
    /// in which case the page table is unchanged.
    pub fn insert(&mut self, page: PageNumber, entry: PageEntry) -> Result<(), VmError> {
        let slot = &mut self.roots[page.index(1)];
        if slot.is_none() {
            *slot = Some(alloc_leaf_table()?);
        }
        if let Some(leaf) = slot {
            leaf[page.index(0)] = entry;
        }
        Ok(())
    }

    /// Returns true if a leaf table covers `page`.
    pub fn has_leaf_table(&self, page: PageNumber) -> bool {
        self.roots[page.index(1)].is_some()
    }

    /// Returns an iterator over every valid entry and the page it maps.
    pub fn iter(&self) -> impl Iterator<Item = (PageNumber, PageEntry)> + '_ {
        self.roots
            .iter()
            .enumerate()
            .filter_map(|(root, leaf)| leaf.as_ref().map(|leaf| (root, leaf)))
            .flat_map(|(root, leaf)| {
                leaf.iter()
                    .enumerate()
                    .filter(|(_, entry)| entry.is_valid())
                    .map(move |(index, entry)| (PageNumber::from_indices(root, index), *entry))
            })
    }

    /// Returns the number of pages backed by a frame.
    pub fn resident_pages(&self) -> usize {
        self.iter().count()
    }

    /// Returns the number of leaf tables allocated.
    pub fn leaf_tables(&self) -> usize {
        self.roots.iter().filter(|leaf| leaf.is_some()).count()
    }

    /// Builds an independent copy of this table.
    ///
    /// Every present leaf table is duplicated, and every valid entry gets a fresh
    /// frame holding a copy of the original frame's contents, with the same flags.
    /// On failure everything allocated for the copy is released again and this
    /// table is left untouched.
    pub(crate) fn duplicate<A>(&self, frames: &A) -> Result<Self, VmError>
    where
        A: FrameAllocator + ?Sized,
    {
        let mut copy = Self::new()?;
        if let Err(err) = copy.copy_entries_from(self, frames) {
            let released = copy.release(frames);
            log::warn!("page table copy failed: {}; released {} frames", err, released);
            return Err(err);
        }
        Ok(copy)
    }

    fn copy_entries_from<A>(&mut self, source: &Self, frames: &A) -> Result<(), VmError>
    where
        A: FrameAllocator + ?Sized,
    {
        for (slot, source_leaf) in self.roots.iter_mut().zip(source.roots.iter()) {
            let Some(source_leaf) = source_leaf else {
                continue;
            };

            // The leaf goes in before it is filled so a failure part way through
            // still releases the frames already copied into it.
            let leaf = slot.insert(alloc_leaf_table()?);
            for (dst, src) in leaf.iter_mut().zip(source_leaf.iter()) {
                let Some(src_frame) = src.address() else {
                    continue;
                };
                let frame = frames.allocate_frame().ok_or(VmError::OutOfMemory)?;
                // SAFETY: `src_frame` is owned by the source table and `frame` was
                // just allocated, so they are distinct and nothing else uses `frame`.
                unsafe { copy_frame(src_frame, frame) };
                *dst = PageEntry::new(frame, src.flags());
            }
        }
        Ok(())
    }

    /// Frees every mapped frame and every leaf table, returning the number of
    /// frames freed. The table is left with every leaf table absent.
    pub(crate) fn release<A>(&mut self, frames: &A) -> usize
    where
        A: FrameAllocator + ?Sized,
    {
        let mut freed = 0;
        for slot in self.roots.iter_mut() {
            let Some(leaf) = slot.take() else {
                continue;
            };
            for frame in leaf.iter().filter_map(|entry| entry.address()) {
                frames.free_frame(frame);
                freed += 1;
            }
        }
        freed
    }
}

impl Drop for PageTable {
    fn drop(&mut self) {
        let resident = self.resident_pages();
        if resident != 0 {
            log::warn!("page table dropped with {} resident pages; frames leaked", resident);
        }
    }
}
