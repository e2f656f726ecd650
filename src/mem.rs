//! Physical page allocation.

mod bitmap;
mod buddy;
mod free_area;
mod gfp;
mod page;
mod page_list;
mod reclaim;
mod report;
pub mod swap;
mod task;
mod watermark;

#[cfg(test)]
mod testing;

pub use bitmap::Bitmap;
pub use buddy::PageAllocator;
pub use free_area::{FreeArea, ZoneType, NR_ZONE_TYPES};
pub use gfp::{GfpFlags, Priority};
pub use page::{MemMap, Page, PageFlags};
pub use page_list::{Iter, PageList, NIL};
pub use reclaim::{NoReclaim, Reclaim};
pub use report::{FreeAreaReport, ZoneReport};
pub use task::{Task, TaskFlags};
pub use watermark::{Level, Watermarks};

use crate::unit::{self, KIB, MIB};
use core::fmt;
use displaydoc_lite::displaydoc;

/// The shift that converts between byte addresses and page numbers.
pub const PAGE_SHIFT: usize = 12;

/// The size of a single page in memory.
///
/// This is also the size of an order-0 block.
pub const PAGE_SIZE: usize = 4 * KIB;

/// The number of orders the free area arrays have room for.
///
/// A [`Config`] may use fewer, but never more.
pub const MAX_ORDER: usize = 10;

/// Result for every page allocation operation.
pub type Result<T, E = Error> = core::result::Result<T, E>;

displaydoc! {
    /// Any error that can happen while initializing the allocator or allocating pages.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum Error {
        /// memory region is too small to hold the page table and bitmaps.
        RegionTooSmall,
        /// the end of a memory region was before its start.
        InvalidRegion,
        /// the allocator configuration is invalid.
        InvalidConfig,
        /// tried to allocate an order that exceeded the maximum order.
        OrderTooLarge,
        /// tried to allocate, but there was no free memory left.
        NoMemoryAvailable,
        /// the address is outside of the managed memory.
        AddressOutOfRange,
    }
}

/// Calculates the number of bytes inside a block of the given `order`.
pub const fn size_for_order(order: usize) -> usize {
    PAGE_SIZE << order
}

/// Aligns the given `addr` upwards to `align`.
///
/// `align` must be a power of two.
pub const fn align_up(addr: usize, align: usize) -> usize {
    (addr + align - 1) & !(align - 1)
}

/// Aligns the given `addr` downwards to `align`.
///
/// `align` must be a power of two.
pub const fn align_down(addr: usize, align: usize) -> usize {
    addr & !(align - 1)
}

/// The physical address of a page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct PhysAddr(usize);

impl PhysAddr {
    /// Wraps a raw address.
    pub const fn new(addr: usize) -> Self {
        Self(addr)
    }

    /// Returns the raw address.
    pub const fn as_usize(self) -> usize {
        self.0
    }

    /// Returns the address as a raw pointer.
    pub const fn as_mut_ptr<T>(self) -> *mut T {
        self.0 as *mut T
    }

    /// Returns the address `count` bytes after this one.
    pub const fn add(self, count: usize) -> Self {
        Self(self.0 + count)
    }

    /// Checks if this address lies on a page boundary.
    pub const fn is_page_aligned(self) -> bool {
        self.0 & (PAGE_SIZE - 1) == 0
    }
}

impl fmt::Display for PhysAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Runtime parameters of a [`PageAllocator`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    /// The number of orders in use. Blocks range from order `0` up to
    /// `max_order - 1`.
    pub max_order: usize,
    /// Pages below this address belong to the restricted low-memory pool.
    pub low_mem_limit: usize,
    /// `log2` of the number of swap slots read ahead on a swap-in.
    pub page_cluster: usize,
}

impl Config {
    /// Checks that this configuration can be used for an allocator.
    pub fn validate(&self) -> Result<()> {
        if self.max_order == 0 || self.max_order > MAX_ORDER {
            return Err(Error::InvalidConfig);
        }

        if self.page_cluster >= usize::BITS as usize {
            return Err(Error::InvalidConfig);
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_order: MAX_ORDER,
            low_mem_limit: 16 * MIB,
            page_cluster: 4,
        }
    }
}

/// Statistics for a memory allocator.
#[derive(Debug, Clone)]
pub struct AllocStats {
    /// The name of the allocator that collected these stats.
    pub name: &'static str,
    /// The number of bytes that are currently allocated.
    pub allocated: usize,
    /// The number of bytes that are left for allocation.
    pub free: usize,
    /// The total number of bytes that this allocator has available for allocation.
    pub total: usize,
}

impl AllocStats {
    /// Create a new [`AllocStats`] instance for the given allocator name.
    pub const fn with_name(name: &'static str) -> Self {
        Self {
            name,
            free: 0,
            allocated: 0,
            total: 0,
        }
    }
}

impl fmt::Display for AllocStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.name)?;
        self.name.chars().try_for_each(|_| write!(f, "~"))?;
        writeln!(f, "\nAllocated: {}", unit::bytes(self.allocated))?;
        writeln!(f, "Free: {}", unit::bytes(self.free))?;
        writeln!(f, "Total: {}", unit::bytes(self.total))?;
        self.name.chars().try_for_each(|_| write!(f, "~"))?;
        writeln!(f)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_validation() {
        assert_eq!(Config::default().validate(), Ok(()));

        let zero = Config {
            max_order: 0,
            ..Config::default()
        };
        assert_eq!(zero.validate(), Err(Error::InvalidConfig));

        let huge = Config {
            max_order: MAX_ORDER + 1,
            ..Config::default()
        };
        assert_eq!(huge.validate(), Err(Error::InvalidConfig));
    }

    #[test]
    fn alignment_helpers() {
        assert_eq!(align_up(0x1001, PAGE_SIZE), 0x2000);
        assert_eq!(align_up(0x2000, PAGE_SIZE), 0x2000);
        assert_eq!(align_down(0x2fff, PAGE_SIZE), 0x2000);
        assert_eq!(size_for_order(0), PAGE_SIZE);
        assert_eq!(size_for_order(3), 8 * PAGE_SIZE);
        assert!(PhysAddr::new(0x3000).is_page_aligned());
        assert!(!PhysAddr::new(0x3008).is_page_aligned());
    }

    #[test]
    fn stats_display() {
        let stats = AllocStats {
            allocated: 8 * KIB,
            free: 4 * KIB,
            total: 12 * KIB,
            ..AllocStats::with_name("Pages")
        };

        let out = stats.to_string();
        assert!(out.starts_with("Pages\n~~~~~\n"));
        assert!(out.contains("Allocated: 8.00 KiB"));
        assert!(out.contains("Free: 4.00 KiB"));
        assert!(out.contains("Total: 12.00 KiB"));
    }

    #[test]
    fn error_messages() {
        assert!(Error::OrderTooLarge
            .to_string()
            .contains("exceeded the maximum order"));
        assert!(Error::NoMemoryAvailable
            .to_string()
            .contains("no free memory left"));
    }
}
