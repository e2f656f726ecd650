//! Collaborators that free memory when the allocator runs short.

use super::{GfpFlags, PageAllocator, Task};

/// The memory reclaim machinery the allocator calls into.
pub trait Reclaim: Sized {
    /// Try to free memory by other means, like writing back dirty data or
    /// dropping caches.
    ///
    /// Called without the allocator lock held and may block. Pages freed
    /// through `pages` with the same `task` are parked on the task's deferred
    /// list and refiled once this returns.
    ///
    /// Returns whether any progress was made.
    fn try_to_free_pages(&self, pages: &PageAllocator<Self>, task: &mut Task, gfp: GfpFlags)
        -> bool;

    /// Signal the background reclaim daemon, if it is waiting, that free
    /// memory is getting low. Must not block.
    fn wakeup_kswapd(&self);
}

/// Reclaim that never frees anything, for use before the rest of memory
/// management is up.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoReclaim;

impl Reclaim for NoReclaim {
    fn try_to_free_pages(&self, _: &PageAllocator<Self>, _: &mut Task, _: GfpFlags) -> bool {
        false
    }

    fn wakeup_kswapd(&self) {}
}
