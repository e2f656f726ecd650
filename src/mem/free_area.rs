//! Free areas: one free list and one buddy bitmap per zone type and order.

use super::{Bitmap, PageFlags, PageList};
use core::fmt;

/// The number of independent memory pools.
pub const NR_ZONE_TYPES: usize = 2;

/// An independent pool of pages with its own free areas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum ZoneType {
    /// Memory for ordinary allocations.
    General = 0,
    /// Memory below the low-memory limit, for devices that can only
    /// address the bottom of physical memory.
    LowMem = 1,
}

impl ZoneType {
    /// Every zone type, in index order.
    pub const ALL: [ZoneType; NR_ZONE_TYPES] = [ZoneType::General, ZoneType::LowMem];

    /// The index of this zone type in the free area arrays.
    pub const fn index(self) -> usize {
        self as usize
    }

    /// A short human readable name.
    pub const fn name(self) -> &'static str {
        match self {
            ZoneType::General => "General",
            ZoneType::LowMem => "LowMem",
        }
    }

    /// The zone type a page with the given flags is filed under.
    pub fn for_flags(flags: PageFlags) -> Self {
        if flags.contains(PageFlags::LOW_MEM) {
            ZoneType::LowMem
        } else {
            ZoneType::General
        }
    }
}

impl fmt::Display for ZoneType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The free blocks of one order in one zone type.
#[derive(Debug)]
pub struct FreeArea {
    pub(crate) list: PageList,
    pub(crate) map: Bitmap,
    pub(crate) count: usize,
}

impl FreeArea {
    /// Create an empty free area that tracks its buddy pairs in `map`.
    pub fn new(map: Bitmap) -> Self {
        Self {
            list: PageList::new(),
            map,
            count: 0,
        }
    }

    /// The number of free blocks in this area.
    pub fn count(&self) -> usize {
        self.count
    }

    /// The list of free blocks.
    pub fn list(&self) -> &PageList {
        &self.list
    }

    /// The buddy-pair bitmap.
    pub fn map(&self) -> &Bitmap {
        &self.map
    }
}
