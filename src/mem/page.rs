//! Page descriptors and the table that holds one descriptor for every page.

use super::{PhysAddr, NIL, PAGE_SHIFT};
use bitflags::bitflags;
use core::{
    fmt,
    sync::atomic::{AtomicU32, AtomicUsize, Ordering},
};

bitflags! {
    /// Per-page state bits.
    pub struct PageFlags: u32 {
        /// The page is never handed out by the allocator, it holds firmware,
        /// the kernel image or allocator metadata.
        const RESERVED = 1 << 0;
        /// The page lies below the low-memory limit and belongs to the
        /// restricted pool.
        const LOW_MEM = 1 << 1;
    }
}

/// The descriptor of a single page of physical memory.
///
/// The list links are only meaningful while the page heads a free block,
/// either on one of the allocator's free lists or on a task's deferred list.
pub struct Page {
    count: AtomicUsize,
    flags: AtomicU32,
    order: AtomicUsize,
    next: AtomicUsize,
    prev: AtomicUsize,
}

impl Page {
    /// Create the descriptor of a page that is not yet usable.
    pub(crate) fn reserved(low_mem: bool) -> Self {
        let mut flags = PageFlags::RESERVED;
        flags.set(PageFlags::LOW_MEM, low_mem);

        Self {
            count: AtomicUsize::new(0),
            flags: AtomicU32::new(flags.bits()),
            order: AtomicUsize::new(0),
            next: AtomicUsize::new(NIL),
            prev: AtomicUsize::new(NIL),
        }
    }

    /// The reference count of this page. Zero means free.
    pub fn count(&self) -> usize {
        self.count.load(Ordering::Acquire)
    }

    pub(crate) fn set_count(&self, count: usize) {
        self.count.store(count, Ordering::Release);
    }

    /// Take another reference to this page.
    pub fn get(&self) {
        self.count.fetch_add(1, Ordering::AcqRel);
    }

    /// Drop a reference and return whether it was the last one.
    pub(crate) fn put_testzero(&self) -> bool {
        let old = self.count.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(old != 0, "freeing a page that is already free");
        old == 1
    }

    /// The flags of this page.
    pub fn flags(&self) -> PageFlags {
        PageFlags::from_bits_truncate(self.flags.load(Ordering::Acquire))
    }

    pub(crate) fn clear_flags(&self, flags: PageFlags) {
        self.flags.fetch_and(!flags.bits(), Ordering::AcqRel);
    }

    /// Checks if this page is excluded from allocation.
    pub fn is_reserved(&self) -> bool {
        self.flags().contains(PageFlags::RESERVED)
    }

    /// Checks if this page belongs to the restricted low-memory pool.
    pub fn is_low_mem(&self) -> bool {
        self.flags().contains(PageFlags::LOW_MEM)
    }

    /// The order of the block this page heads, if it is free.
    pub fn order(&self) -> usize {
        self.order.load(Ordering::Relaxed)
    }

    pub(crate) fn set_order(&self, order: usize) {
        self.order.store(order, Ordering::Relaxed);
    }

    pub(crate) fn next(&self) -> usize {
        self.next.load(Ordering::Relaxed)
    }

    pub(crate) fn set_next(&self, next: usize) {
        self.next.store(next, Ordering::Relaxed);
    }

    pub(crate) fn prev(&self) -> usize {
        self.prev.load(Ordering::Relaxed)
    }

    pub(crate) fn set_prev(&self, prev: usize) {
        self.prev.store(prev, Ordering::Relaxed);
    }
}

impl fmt::Debug for Page {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Page")
            .field("count", &self.count())
            .field("flags", &self.flags())
            .field("order", &self.order())
            .finish()
    }
}

/// The table of page descriptors, indexed by map number.
///
/// A map number is the index of a page counted from the first page of the
/// managed memory.
#[derive(Debug, Clone, Copy)]
pub struct MemMap {
    pages: &'static [Page],
    base: usize,
}

impl MemMap {
    pub(crate) fn new(pages: &'static [Page], base: usize) -> Self {
        Self { pages, base }
    }

    /// All descriptors.
    pub fn pages(&self) -> &'static [Page] {
        self.pages
    }

    /// The number of pages in the table.
    pub fn len(&self) -> usize {
        self.pages.len()
    }

    /// Checks if the table holds no pages.
    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    /// The address of the first page.
    pub fn base(&self) -> PhysAddr {
        PhysAddr::new(self.base)
    }

    /// The address right after the last page.
    pub fn end(&self) -> PhysAddr {
        PhysAddr::new(self.base + (self.pages.len() << PAGE_SHIFT))
    }

    /// Converts an address into the map number of the page containing it.
    pub fn map_nr(&self, addr: PhysAddr) -> Option<usize> {
        let nr = addr.as_usize().checked_sub(self.base)? >> PAGE_SHIFT;
        if nr < self.pages.len() {
            Some(nr)
        } else {
            None
        }
    }

    /// The address of the page with the given map number.
    pub fn addr_of(&self, map_nr: usize) -> PhysAddr {
        debug_assert!(map_nr < self.pages.len());
        PhysAddr::new(self.base + (map_nr << PAGE_SHIFT))
    }

    /// The descriptor of the page containing `addr`.
    pub fn get(&self, addr: PhysAddr) -> Option<&'static Page> {
        self.map_nr(addr).map(|nr| &self.pages[nr])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mem::PAGE_SIZE;

    fn table(count: usize) -> &'static [Page] {
        let pages = (0..count).map(|i| Page::reserved(i < 2)).collect::<Vec<_>>();
        Box::leak(pages.into_boxed_slice())
    }

    #[test]
    fn reserved_descriptor() {
        let page = Page::reserved(true);
        assert!(page.is_reserved());
        assert!(page.is_low_mem());
        assert_eq!(page.count(), 0);
        assert_eq!(page.next(), NIL);
        assert_eq!(page.prev(), NIL);

        page.clear_flags(PageFlags::RESERVED);
        assert!(!page.is_reserved());
        assert!(page.is_low_mem());
    }

    #[test]
    fn reference_counting() {
        let page = Page::reserved(false);
        page.set_count(1);
        page.get();
        assert_eq!(page.count(), 2);
        assert!(!page.put_testzero());
        assert!(page.put_testzero());
        assert_eq!(page.count(), 0);
    }

    #[test]
    fn map_numbers() {
        let map = MemMap::new(table(4), 0x10_0000);

        assert_eq!(map.len(), 4);
        assert_eq!(map.base(), PhysAddr::new(0x10_0000));
        assert_eq!(map.end(), PhysAddr::new(0x10_0000 + 4 * PAGE_SIZE));
        assert_eq!(map.map_nr(PhysAddr::new(0x10_0000)), Some(0));
        assert_eq!(map.map_nr(PhysAddr::new(0x10_2fff)), Some(2));
        assert_eq!(map.map_nr(PhysAddr::new(0x10_4000)), None);
        assert_eq!(map.map_nr(PhysAddr::new(0x0f_f000)), None);
        assert_eq!(map.addr_of(3), PhysAddr::new(0x10_3000));

        assert!(map.get(PhysAddr::new(0x10_1000)).unwrap().is_low_mem());
        assert!(!map.get(PhysAddr::new(0x10_3000)).unwrap().is_low_mem());
    }
}
