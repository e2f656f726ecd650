//! Per-task reclaim state.
//!
//! A task that enters reclaim from inside the allocator must not feed pages
//! back into the global free lists while it is still reclaiming. Its frees are
//! parked on a task-local list and refiled by the allocator once the reclaim
//! routine returns. The list belongs to the task alone and needs no locking.

use super::{Page, PageList};
use bitflags::bitflags;

bitflags! {
    /// Reclaim related state of a task.
    pub struct TaskFlags: u32 {
        /// The task is inside a reclaim pass. Allocations skip the
        /// watermark checks so reclaim never recurses.
        const MEMALLOC = 0x0000_0800;
        /// Frees of this task go to its deferred list.
        const FREE_PAGES = 0x0000_2000;
    }
}

/// The allocator-relevant part of a task control block.
#[derive(Debug)]
pub struct Task {
    pub(crate) flags: TaskFlags,
    pub(crate) local_pages: PageList,
    pub(crate) nr_local_pages: usize,
    pub(crate) allocation_order: usize,
}

impl Task {
    /// Create the state of a task that is not reclaiming.
    pub const fn new() -> Self {
        Self {
            flags: TaskFlags::empty(),
            local_pages: PageList::new(),
            nr_local_pages: 0,
            allocation_order: 0,
        }
    }

    /// The current reclaim flags.
    pub fn flags(&self) -> TaskFlags {
        self.flags
    }

    /// Checks if this task is inside a reclaim pass.
    pub fn is_reclaiming(&self) -> bool {
        self.flags.contains(TaskFlags::MEMALLOC)
    }

    /// The number of pages parked on the deferred list.
    pub fn nr_local_pages(&self) -> usize {
        self.nr_local_pages
    }

    /// The order of the allocation that started the current or last reclaim.
    pub fn allocation_order(&self) -> usize {
        self.allocation_order
    }

    /// Park the frees of this task on its deferred list outside of an
    /// allocation, like a background reclaim daemon freeing a batch of pages.
    ///
    /// The owner refiles the pages with
    /// [`drain_local_pages`](super::PageAllocator::drain_local_pages) and
    /// ends the diversion with [`stop_diverting`](Self::stop_diverting).
    pub fn divert_frees(&mut self) {
        self.flags.insert(TaskFlags::FREE_PAGES);
    }

    /// Send the frees of this task to the free lists again.
    pub fn stop_diverting(&mut self) {
        self.flags.remove(TaskFlags::FREE_PAGES);
    }

    pub(crate) fn enter_reclaim(&mut self, order: usize) {
        self.flags
            .insert(TaskFlags::MEMALLOC | TaskFlags::FREE_PAGES);
        self.allocation_order = order;
    }

    pub(crate) fn leave_reclaim(&mut self) {
        self.flags
            .remove(TaskFlags::MEMALLOC | TaskFlags::FREE_PAGES);
    }

    /// Decides whether a free of `order` must be parked on the deferred list.
    ///
    /// Multi-page frees go straight to the free lists once the task already
    /// holds parked pages, unless it is still inside the allocator. Only a
    /// task that diverts its frees through
    /// [`divert_frees`](Self::divert_frees) is ever outside of it.
    pub(crate) fn should_defer(&self, order: usize) -> bool {
        if !self.flags.contains(TaskFlags::FREE_PAGES) {
            return false;
        }

        !(order > 0 && self.nr_local_pages > 0 && !self.is_reclaiming())
    }

    /// Park the block headed by page `nr`.
    pub(crate) fn defer(&mut self, pages: &[Page], nr: usize, order: usize) {
        pages[nr].set_order(order);
        self.local_pages.push_head(pages, nr);
        self.nr_local_pages += 1;
    }
}

impl Default for Task {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reclaim_flags() {
        let mut task = Task::new();
        assert!(!task.is_reclaiming());
        assert!(!task.should_defer(0));

        task.enter_reclaim(3);
        assert!(task.is_reclaiming());
        assert!(task.flags().contains(TaskFlags::FREE_PAGES));
        assert_eq!(task.allocation_order(), 3);

        task.leave_reclaim();
        assert_eq!(task.flags(), TaskFlags::empty());
        assert_eq!(task.allocation_order(), 3);
    }

    #[test]
    fn defer_decision() {
        let pages = (0..4).map(|_| Page::reserved(false)).collect::<Vec<_>>();
        let mut task = Task::new();
        task.divert_frees();

        assert!(task.should_defer(0));
        assert!(task.should_defer(2));

        task.defer(&pages, 1, 0);
        assert_eq!(task.nr_local_pages(), 1);
        assert!(task.should_defer(0));
        assert!(!task.should_defer(1));

        task.flags.insert(TaskFlags::MEMALLOC);
        assert!(task.should_defer(1));
    }

    #[test]
    fn diverting_outside_of_reclaim() {
        let mut task = Task::new();
        task.divert_frees();
        assert_eq!(task.flags(), TaskFlags::FREE_PAGES);
        assert!(!task.is_reclaiming());

        task.enter_reclaim(1);
        task.leave_reclaim();
        assert!(!task.should_defer(0));

        task.divert_frees();
        task.stop_diverting();
        assert_eq!(task.flags(), TaskFlags::empty());
    }
}
