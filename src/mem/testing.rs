//! Helpers for tests that need physical memory to manage.

use super::{
    size_for_order, Config, GfpFlags, PageAllocator, PhysAddr, Reclaim, Result, Task, MAX_ORDER,
    PAGE_SIZE,
};
use spin::Mutex;
use std::{
    alloc::{self, Layout},
    slice,
    sync::atomic::{AtomicBool, AtomicUsize, Ordering},
};

/// Leaks `pages` zeroed pages, aligned to the largest block size.
pub fn memory(pages: usize) -> &'static mut [u8] {
    let layout = Layout::from_size_align(pages * PAGE_SIZE, size_for_order(MAX_ORDER - 1)).unwrap();
    unsafe {
        let ptr = alloc::alloc_zeroed(layout);
        assert!(!ptr.is_null(), "host allocation failed");
        slice::from_raw_parts_mut(ptr, layout.size())
    }
}

/// A configuration with `max_order` orders and no low-memory pool.
pub fn config(max_order: usize) -> Config {
    Config {
        max_order,
        low_mem_limit: 0,
        ..Config::default()
    }
}

/// An allocator over `pages` fresh pages, all of them still reserved.
pub fn allocator<R: Reclaim>(pages: usize, config: Config, reclaim: R) -> PageAllocator<R> {
    allocator_in(memory(pages), config, reclaim)
}

/// An allocator over `memory`, all of it still reserved.
pub fn allocator_in<R: Reclaim>(
    memory: &'static mut [u8],
    config: Config,
    reclaim: R,
) -> PageAllocator<R> {
    PageAllocator::free_area_init(memory, config, reclaim)
        .unwrap()
        .0
}

/// Releases the pages with map numbers `first..last`.
pub fn release<R: Reclaim>(alloc: &PageAllocator<R>, first: usize, last: usize) -> usize {
    let base = alloc.mem_map().base();
    alloc
        .release_boot_memory(
            &mut Task::new(),
            base.add(first * PAGE_SIZE),
            base.add(last * PAGE_SIZE),
        )
        .unwrap()
}

/// A reclaimer that frees a prepared list of pages and records what it saw.
#[derive(Default)]
pub struct Victims {
    pages: Mutex<Vec<(PhysAddr, usize)>>,
    calls: AtomicUsize,
    wakeups: AtomicUsize,
    free_during_reclaim: AtomicUsize,
    local_during_reclaim: AtomicUsize,
    allocate: AtomicBool,
    nested: Mutex<Option<Result<PhysAddr>>>,
}

impl Victims {
    /// The blocks freed by the next reclaim pass.
    pub fn set_victims(&self, victims: impl IntoIterator<Item = (PhysAddr, usize)>) {
        self.pages.lock().extend(victims);
    }

    /// Allocate a page from inside every reclaim pass.
    pub fn allocate_while_reclaiming(&self) {
        self.allocate.store(true, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn wakeups(&self) -> usize {
        self.wakeups.load(Ordering::SeqCst)
    }

    /// The free page counter right before the last pass returned.
    pub fn free_during_reclaim(&self) -> usize {
        self.free_during_reclaim.load(Ordering::SeqCst)
    }

    /// The deferred pages of the task right before the last pass returned.
    pub fn local_during_reclaim(&self) -> usize {
        self.local_during_reclaim.load(Ordering::SeqCst)
    }

    /// The result of the last allocation made from inside reclaim.
    pub fn nested_result(&self) -> Option<Result<PhysAddr>> {
        *self.nested.lock()
    }
}

impl Reclaim for Victims {
    fn try_to_free_pages(&self, pages: &PageAllocator<Self>, task: &mut Task, _: GfpFlags) -> bool {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if self.allocate.load(Ordering::SeqCst) {
            let result = pages.allocate_pages(task, 0, GfpFlags::GFP_KERNEL);
            *self.nested.lock() = Some(result);
        }

        let victims = core::mem::take(&mut *self.pages.lock());
        for &(addr, order) in &victims {
            pages.free_pages(task, addr, order);
        }

        self.free_during_reclaim
            .store(pages.nr_free_pages(), Ordering::SeqCst);
        self.local_during_reclaim
            .store(task.nr_local_pages(), Ordering::SeqCst);

        !victims.is_empty()
    }

    fn wakeup_kswapd(&self) {
        self.wakeups.fetch_add(1, Ordering::SeqCst);
    }
}
