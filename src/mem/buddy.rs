//! Implementation of a Buddy Allocator that is responsible for allocating
//! physical memory in blocks of `2^order` pages.
//!
//! Every zone type has one free list per order. Next to the lists, every order
//! has a bitmap with one bit per pair of buddies, which is flipped whenever
//! one half of the pair is put on, or taken off, the free list. When a block
//! is freed and flipping its pair bit clears it, the buddy was free too and
//! both are merged into one block of the next order.

use super::{
    align_down, align_up, report::FreeAreaReport, size_for_order, swap, AllocStats, Bitmap,
    Config, Error, FreeArea, GfpFlags, Level, MemMap, Page, PageFlags, PhysAddr, Priority,
    Reclaim, Result, Task, Watermarks, ZoneType, MAX_ORDER, NR_ZONE_TYPES, PAGE_SHIFT,
    PAGE_SIZE,
};
use crate::unit;
use core::{
    array, mem, ptr, slice,
    sync::atomic::{AtomicUsize, Ordering},
};
use log::{debug, info, warn};
use spin::Mutex;

/// Trace records for single split and merge steps, only with the `logging` feature.
macro_rules! trace_block {
    ($($args:tt)+) => {
        #[cfg(feature = "logging")]
        log::trace!($($args)+);
    };
}

/// The free areas of every zone type, indexed by zone type and order.
pub(crate) type FreeAreas = [[FreeArea; MAX_ORDER]; NR_ZONE_TYPES];

/// The central structure that is responsible for allocating
/// physical pages using the buddy allocation algorithm.
///
/// There is one instance for the lifetime of the system. It is created by
/// [`free_area_init`](Self::free_area_init) and passed around by reference.
pub struct PageAllocator<R> {
    mem_map: MemMap,
    free_area: Mutex<FreeAreas>,
    /// Only changed with `free_area` locked, read without it.
    nr_free_pages: AtomicUsize,
    managed_pages: AtomicUsize,
    watermarks: Watermarks,
    config: Config,
    metadata_end: PhysAddr,
    reclaim: R,
}

impl<R: Reclaim> PageAllocator<R> {
    /// Set up the allocator for `memory`.
    ///
    /// The page descriptor table and the buddy bitmaps are carved from the
    /// start of `memory`. Every page, including the ones holding the
    /// metadata, starts out reserved; usable pages are handed over with
    /// [`release_boot_memory`](Self::release_boot_memory).
    ///
    /// Map numbers count from the largest block boundary at or below
    /// `memory`, so a block that is aligned by map number is aligned in
    /// physical memory too. The pages between that boundary and `memory` get
    /// descriptors that stay reserved forever.
    ///
    /// Returns the allocator and the address of the first byte after the
    /// last bitmap.
    pub fn free_area_init(
        memory: &'static mut [u8],
        config: Config,
        reclaim: R,
    ) -> Result<(Self, PhysAddr)> {
        config.validate()?;

        let start = memory.as_ptr() as usize;
        let end = start
            .checked_add(memory.len())
            .ok_or(Error::InvalidRegion)?;

        let base = start
            .checked_add(PAGE_SIZE - 1)
            .map(|addr| align_down(addr, PAGE_SIZE))
            .ok_or(Error::RegionTooSmall)?;
        let end = align_down(end, PAGE_SIZE);
        if end.saturating_sub(base) < PAGE_SIZE {
            return Err(Error::RegionTooSmall);
        }

        let origin = align_down(base, size_for_order(config.max_order - 1));
        let nr_pages = (end - origin) >> PAGE_SHIFT;
        let usable_pages = (end - base) >> PAGE_SHIFT;

        // the descriptor table comes first, followed by the bitmaps of every
        // zone type, each with one bitmap per order
        let map_end = align_up(
            base + nr_pages * mem::size_of::<Page>(),
            mem::align_of::<usize>(),
        );
        let words_per_zone = (0..config.max_order)
            .map(|order| Bitmap::words_for(nr_pages, order))
            .sum::<usize>();
        let nr_words = words_per_zone * NR_ZONE_TYPES;
        let metadata_end = map_end + nr_words * mem::size_of::<usize>();
        if metadata_end > end {
            return Err(Error::RegionTooSmall);
        }

        let (_, memory) = memory.split_at_mut(base - start);
        let (map_bytes, memory) = memory.split_at_mut(map_end - base);
        let (bitmap_bytes, _) = memory.split_at_mut(metadata_end - map_end);

        debug_assert!(mem::align_of::<Page>() <= PAGE_SIZE);
        let pages_ptr = map_bytes.as_mut_ptr().cast::<Page>();
        for nr in 0..nr_pages {
            let low_mem = origin + (nr << PAGE_SHIFT) < config.low_mem_limit;

            // SAFETY
            // `map_bytes` starts on a page boundary and has room for
            // `nr_pages` descriptors.
            unsafe { ptr::write(pages_ptr.add(nr), Page::reserved(low_mem)) };
        }

        // SAFETY
        // Every descriptor was initialized above, and the bytes are borrowed
        // exclusively for `'static`.
        let pages: &'static [Page] = unsafe { slice::from_raw_parts(pages_ptr, nr_pages) };

        // SAFETY
        // `map_end` is word aligned, `bitmap_bytes` holds exactly `nr_words`
        // words, and any bit pattern is a valid `usize`.
        let mut words: &'static mut [usize] = unsafe {
            slice::from_raw_parts_mut(bitmap_bytes.as_mut_ptr().cast::<usize>(), nr_words)
        };

        let free_area: FreeAreas = array::from_fn(|_| {
            array::from_fn(|order| {
                if order < config.max_order {
                    let len = Bitmap::words_for(nr_pages, order);
                    let (map, rest) = mem::take(&mut words).split_at_mut(len);
                    words = rest;
                    FreeArea::new(Bitmap::new(map))
                } else {
                    FreeArea::new(Bitmap::empty())
                }
            })
        });

        let watermarks = Watermarks::for_total(usable_pages);

        debug!(
            "Page table at {:#x}..{:#x}, {} bitmap words up to {:#x}",
            base, map_end, nr_words, metadata_end
        );
        info!(
            "Managing {} pages ({}) at {:#x}, watermarks min {} low {} high {}",
            usable_pages,
            unit::bytes(usable_pages * PAGE_SIZE),
            base,
            watermarks.min,
            watermarks.low,
            watermarks.high,
        );

        let allocator = Self {
            mem_map: MemMap::new(pages, origin),
            free_area: Mutex::new(free_area),
            nr_free_pages: AtomicUsize::new(0),
            managed_pages: AtomicUsize::new(0),
            watermarks,
            config,
            metadata_end: PhysAddr::new(metadata_end),
            reclaim,
        };

        Ok((allocator, PhysAddr::new(metadata_end)))
    }

    /// Make every whole page in `start..end` available for allocation.
    ///
    /// Pages are un-reserved one by one and freed, so the free areas build up
    /// through the normal coalescing path. Pages overlapping the allocator
    /// metadata, pages in front of the memory given to
    /// [`free_area_init`](Self::free_area_init) and pages that were already
    /// released are skipped.
    ///
    /// Returns the number of pages released.
    pub fn release_boot_memory(
        &self,
        task: &mut Task,
        start: PhysAddr,
        end: PhysAddr,
    ) -> Result<usize> {
        if end < start {
            return Err(Error::InvalidRegion);
        }

        if start < self.mem_map.base() || end > self.mem_map.end() {
            return Err(Error::AddressOutOfRange);
        }

        let first = align_up(start.max(self.metadata_end).as_usize(), PAGE_SIZE);
        let last = align_down(end.as_usize(), PAGE_SIZE);

        let mut released = 0;
        for addr in (first..last).step_by(PAGE_SIZE).map(PhysAddr::new) {
            let page = match self.mem_map.get(addr) {
                Some(page) if page.is_reserved() => page,
                _ => continue,
            };

            page.clear_flags(PageFlags::RESERVED);
            page.set_count(1);
            self.managed_pages.fetch_add(1, Ordering::Relaxed);
            self.free_pages(task, addr, 0);
            released += 1;
        }

        debug!("Released {} boot pages in {}..{}", released, start, end);
        Ok(released)
    }

    /// Allocates a block of `2^order` pages.
    ///
    /// The block is aligned to its own size, counted from the first managed
    /// page, and its head page has a reference count of one.
    ///
    /// If free memory is short and `gfp` allows blocking, the calling task
    /// runs one synchronous reclaim pass before the free lists are searched.
    pub fn allocate_pages(&self, task: &mut Task, order: usize, gfp: GfpFlags) -> Result<PhysAddr> {
        if order >= self.config.max_order {
            return Err(Error::OrderTooLarge);
        }

        // a task that is already reclaiming goes straight to the free lists,
        // otherwise reclaim would recurse
        if !task.is_reclaiming() {
            self.balance(task, order, gfp)?;
        }

        let map_nr = if gfp.zone_type() == ZoneType::General {
            self.rmqueue(order, ZoneType::General)
        } else {
            None
        };

        map_nr
            .or_else(|| self.rmqueue(order, ZoneType::LowMem))
            .map(|nr| self.mem_map.addr_of(nr))
            .ok_or(Error::NoMemoryAvailable)
    }

    /// Allocates a single page.
    pub fn get_free_page(&self, task: &mut Task, gfp: GfpFlags) -> Result<PhysAddr> {
        self.allocate_pages(task, 0, gfp)
    }

    /// Allocates a block of `2^order` pages from the low-memory pool.
    pub fn get_dma_pages(&self, task: &mut Task, gfp: GfpFlags, order: usize) -> Result<PhysAddr> {
        self.allocate_pages(task, order, gfp | GfpFlags::DMA)
    }

    /// Allocates a single page and fills it with zeros.
    pub fn get_zeroed_page(&self, task: &mut Task, gfp: GfpFlags) -> Result<PhysAddr> {
        let addr = self.allocate_pages(task, 0, gfp)?;

        // SAFETY
        // The page lies inside the memory handed to `free_area_init`, and it
        // was just allocated, so nobody else is using it.
        unsafe { ptr::write_bytes(addr.as_mut_ptr::<u8>(), 0, PAGE_SIZE) };

        Ok(addr)
    }

    /// Returns a block of `2^order` pages that was allocated with the same order.
    ///
    /// Reserved pages are ignored. The block is only freed once the reference
    /// count of its head page drops to zero. While `task` is reclaiming, the
    /// block is parked on its deferred list instead.
    pub fn free_pages(&self, task: &mut Task, addr: PhysAddr, order: usize) {
        debug_assert!(order < self.config.max_order, "invalid order given to free_pages");

        let map_nr = match self.mem_map.map_nr(addr) {
            Some(nr) => nr,
            None => {
                warn!("Tried to free {} which is not managed memory", addr);
                return;
            }
        };

        let pages = self.mem_map.pages();
        let page = &pages[map_nr];
        if page.is_reserved() || !page.put_testzero() {
            return;
        }

        if task.should_defer(order) {
            task.defer(pages, map_nr, order);
            return;
        }

        self.free_pages_ok(map_nr, order, ZoneType::for_flags(page.flags()));
    }

    /// Returns a single page.
    pub fn free_page(&self, task: &mut Task, addr: PhysAddr) {
        self.free_pages(task, addr, 0)
    }

    /// Refile every page parked on the deferred list of `task`.
    ///
    /// The oldest page is freed first so the newest ends up at the front of
    /// its free list.
    pub fn drain_local_pages(&self, task: &mut Task) {
        if task.nr_local_pages == 0 && task.local_pages.is_empty() {
            return;
        }

        let pages = self.mem_map.pages();
        let mut expected = task.nr_local_pages;

        debug!(
            "Refiling {} deferred pages after an order {} reclaim",
            expected,
            task.allocation_order()
        );

        while let Some(nr) = task.local_pages.pop_tail(pages) {
            if expected == 0 {
                panic!("local_pages list corrupted");
            }
            expected -= 1;

            let page = &pages[nr];
            self.free_pages_ok(nr, page.order(), ZoneType::for_flags(page.flags()));
        }

        if expected != 0 {
            panic!("local_pages list corrupted");
        }

        task.nr_local_pages = 0;
    }

    /// Snapshot of the free areas for diagnostics.
    pub fn show_free_areas(&self) -> FreeAreaReport {
        let report = {
            let areas = self.free_area.lock();
            FreeAreaReport::collect(
                &areas,
                self.config.max_order,
                self.nr_free_pages(),
                self.watermarks,
            )
        };

        info!("{}", report);
        report
    }

    /// Statistics in the common allocator format.
    pub fn stats(&self) -> AllocStats {
        let total = self.managed_pages.load(Ordering::Relaxed) * PAGE_SIZE;
        let free = self.nr_free_pages() * PAGE_SIZE;

        AllocStats {
            total,
            free,
            allocated: total.saturating_sub(free),
            ..AllocStats::with_name("Page Allocator")
        }
    }

    /// Read the swap slots around `entry` ahead of time, using the configured
    /// cluster size.
    pub fn swapin_readahead<C: swap::SwapCache>(&self, cache: &C, entry: swap::SwapEntry) -> usize {
        swap::swapin_readahead(cache, entry, self.config.page_cluster)
    }

    /// The number of free pages over both zone types.
    pub fn nr_free_pages(&self) -> usize {
        self.nr_free_pages.load(Ordering::Acquire)
    }

    /// The free page thresholds.
    pub fn watermarks(&self) -> Watermarks {
        self.watermarks
    }

    /// The configuration this allocator was set up with.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The page descriptor table.
    pub fn mem_map(&self) -> &MemMap {
        &self.mem_map
    }

    /// The descriptor of the page containing `addr`.
    pub fn page(&self, addr: PhysAddr) -> Option<&'static Page> {
        self.mem_map.get(addr)
    }

    /// The number of pages covered by the descriptor table.
    pub fn total_pages(&self) -> usize {
        self.mem_map.len()
    }

    /// The first address after the allocator metadata.
    pub fn metadata_end(&self) -> PhysAddr {
        self.metadata_end
    }

    /// The reclaim collaborator.
    pub fn reclaimer(&self) -> &R {
        &self.reclaim
    }

    /// Check free memory against the watermarks and reclaim if required.
    fn balance(&self, task: &mut Task, order: usize, gfp: GfpFlags) -> Result<()> {
        if self.watermarks.level(self.nr_free_pages()) == Level::AboveLow {
            return Ok(());
        }

        self.reclaim.wakeup_kswapd();

        // the daemon may already have freed something
        let level = self.watermarks.level(self.nr_free_pages());
        if level != Level::AtOrBelowMin || !gfp.may_block() {
            return Ok(());
        }

        warn!(
            "Only {} free pages left, reclaiming for an order {} allocation",
            self.nr_free_pages(),
            order
        );

        task.enter_reclaim(order);
        let freed = self.reclaim.try_to_free_pages(self, task, gfp);
        task.leave_reclaim();

        self.drain_local_pages(task);

        if self.nr_free_pages() > self.watermarks.high {
            return Ok(());
        }

        if !freed && gfp.priority() == Priority::Normal {
            warn!(
                "Order {} allocation failed, reclaim made no progress",
                order
            );
            return Err(Error::NoMemoryAvailable);
        }

        Ok(())
    }

    /// Take a block of `order` from the free areas of `zone`, splitting a
    /// larger block if needed.
    fn rmqueue(&self, order: usize, zone: ZoneType) -> Option<usize> {
        let pages = self.mem_map.pages();
        let top = self.config.max_order - 1;

        let mut free_area = self.free_area.lock();
        let areas = &mut free_area[zone.index()];

        for new_order in order..self.config.max_order {
            let area = &mut areas[new_order];
            let map_nr = match area.list.pop_head(pages) {
                Some(nr) => nr,
                None => continue,
            };

            // the top order has no buddies to merge with
            if new_order < top {
                area.map.toggle(map_nr >> (1 + new_order));
            }
            area.count -= 1;
            self.nr_free_pages
                .fetch_sub(1 << order, Ordering::AcqRel);

            let map_nr = Self::expand(pages, areas, map_nr, order, new_order);
            pages[map_nr].set_count(1);
            return Some(map_nr);
        }

        None
    }

    /// Split the block at `map_nr` from order `high` down to `low`.
    ///
    /// At every step the upper half goes onto the free list one order below
    /// and the lower half is split further. Returns the block that is left.
    fn expand(
        pages: &[Page],
        areas: &mut [FreeArea; MAX_ORDER],
        map_nr: usize,
        low: usize,
        mut high: usize,
    ) -> usize {
        while high > low {
            high -= 1;

            //  +-- `map_nr`, kept and split further
            //  v
            //  +----------------+----------------+
            //  |   lower half   |   upper half   |
            //  +----------------+----------------+
            //                   ^
            //                   +-- `buddy`, goes onto the free list of `high`
            let buddy = map_nr + (1 << high);
            trace_block!("Splitting order {} block {} off {}", high, buddy, map_nr);

            let area = &mut areas[high];
            area.map.toggle(map_nr >> (1 + high));
            pages[buddy].set_order(high);
            area.list.push_head(pages, buddy);
            area.count += 1;
        }

        map_nr
    }

    /// Put the block at `map_nr` back onto the free areas of `zone`, merging
    /// it with its buddy for as long as the buddy is free.
    fn free_pages_ok(&self, map_nr: usize, order: usize, zone: ZoneType) {
        let pages = self.mem_map.pages();
        let top = self.config.max_order - 1;

        let mut free_area = self.free_area.lock();
        let areas = &mut free_area[zone.index()];

        let mut map_nr = map_nr & !((1 << order) - 1);
        let mut index = map_nr >> (1 + order);
        let mut current = order;

        while current < top {
            // the bit was clear, so the buddy is still in use
            if !areas[current].map.toggle(index) {
                break;
            }

            let buddy = map_nr ^ (1 << current);
            trace_block!("Merging order {} block {} with {}", current, map_nr, buddy);

            let area = &mut areas[current];
            area.list.remove(pages, buddy);
            area.count -= 1;

            current += 1;
            index >>= 1;
            map_nr &= !((1 << current) - 1);
        }

        pages[map_nr].set_order(current);
        let area = &mut areas[current];
        area.list.push_head(pages, map_nr);
        area.count += 1;

        self.nr_free_pages
            .fetch_add(1 << order, Ordering::AcqRel);
    }

    /// Verifies the list bookkeeping and the bitmap parity of every free area.
    #[cfg(test)]
    pub(crate) fn check_free_areas(&self) {
        let pages = self.mem_map.pages();
        let nr_pages = pages.len();
        let top = self.config.max_order - 1;
        let areas = self.free_area.lock();

        let mut listed = 0;
        for zone in ZoneType::ALL.iter().copied() {
            for order in 0..self.config.max_order {
                let area = &areas[zone.index()][order];
                assert_eq!(area.count, area.list.len(), "{} order {}", zone, order);

                let mut free = vec![false; nr_pages];
                for nr in area.list.iter(pages) {
                    let page = &pages[nr];
                    assert_eq!(page.count(), 0, "free page {} is in use", nr);
                    assert!(!page.is_reserved(), "reserved page {} is free", nr);
                    assert_eq!(page.order(), order);
                    assert_eq!(ZoneType::for_flags(page.flags()), zone);
                    assert_eq!(nr % (1 << order), 0, "block {} is misaligned", nr);
                    free[nr] = true;
                    listed += 1 << order;
                }

                if order == top {
                    continue;
                }

                let pairs = (nr_pages + (2 << order) - 1) >> (order + 1);
                for pair in 0..pairs {
                    let lower = pair << (order + 1);
                    let upper = lower + (1 << order);
                    let lower_free = free[lower];
                    let upper_free = upper < nr_pages && free[upper];

                    assert!(
                        !(lower_free && upper_free),
                        "buddies {} and {} are both free at order {}",
                        lower,
                        upper,
                        order
                    );
                    assert_eq!(
                        area.map.get(pair),
                        lower_free ^ upper_free,
                        "{} order {} pair {} has the wrong parity",
                        zone,
                        order,
                        pair
                    );
                }
            }
        }

        assert_eq!(listed, self.nr_free_pages(), "free page counter is off");
    }

    /// The number of set bits in every bitmap, zone type by zone type.
    #[cfg(test)]
    pub(crate) fn bitmap_ones(&self) -> Vec<usize> {
        let areas = self.free_area.lock();
        areas
            .iter()
            .flat_map(|zone| zone.iter().map(|area| area.map.count_ones()))
            .collect()
    }
}
