//! Swap-in read-ahead.
//!
//! When a page has to be read back from swap, the slots around it are likely
//! to be needed soon as well. Reading the whole cluster in one go turns many
//! small reads into one sequential one.

use core::fmt;

/// A swap slot, encoded the way it is stored in a non-present page table entry.
///
/// Bit 0 stays clear, bits 1 to 6 hold the swap device and the offset starts
/// at bit 8.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct SwapEntry(usize);

impl SwapEntry {
    /// Create the entry for slot `offset` on swap device `ty`.
    pub const fn new(ty: usize, offset: usize) -> Self {
        Self(((ty & 0x3f) << 1) | (offset << 8))
    }

    /// Interpret a raw page table entry as a swap entry.
    pub const fn from_raw(raw: usize) -> Self {
        Self(raw)
    }

    /// The raw encoded value.
    pub const fn raw(self) -> usize {
        self.0
    }

    /// The swap device.
    pub const fn ty(self) -> usize {
        (self.0 >> 1) & 0x3f
    }

    /// The slot on the swap device.
    pub const fn offset(self) -> usize {
        self.0 >> 8
    }
}

impl fmt::Debug for SwapEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SwapEntry")
            .field("ty", &self.ty())
            .field("offset", &self.offset())
            .finish()
    }
}

/// The swap cache and swap device bookkeeping needed for read-ahead.
pub trait SwapCache {
    /// The first offset past the end of swap device `ty`.
    fn max_offset(&self, ty: usize) -> usize;

    /// Checks whether the slot holds a swapped out page.
    fn slot_in_use(&self, entry: SwapEntry) -> bool;

    /// Start reading the slot into the swap cache without waiting for it.
    fn read_swap_cache_async(&self, entry: SwapEntry);
}

/// Issue reads for the cluster of `2^page_cluster` slots around `entry`.
///
/// Offset 0 holds the swap header and is never read. Free slots are skipped,
/// and the cluster is cut off at the end of the device.
///
/// Returns the number of reads issued.
pub fn swapin_readahead<C: SwapCache>(cache: &C, entry: SwapEntry, page_cluster: usize) -> usize {
    let cluster = 1 << page_cluster;
    let ty = entry.ty();
    let first = entry.offset() & !(cluster - 1);
    let last = first.saturating_add(cluster).min(cache.max_offset(ty));

    let mut issued = 0;
    for offset in first.max(1)..last {
        let slot = SwapEntry::new(ty, offset);
        if !cache.slot_in_use(slot) {
            continue;
        }

        cache.read_swap_cache_async(slot);
        issued += 1;
    }

    issued
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    struct Device {
        size: usize,
        free: Vec<usize>,
        reads: RefCell<Vec<usize>>,
    }

    impl Device {
        fn new(size: usize, free: &[usize]) -> Self {
            Self {
                size,
                free: free.to_vec(),
                reads: RefCell::new(Vec::new()),
            }
        }
    }

    impl SwapCache for Device {
        fn max_offset(&self, ty: usize) -> usize {
            assert_eq!(ty, 2);
            self.size
        }

        fn slot_in_use(&self, entry: SwapEntry) -> bool {
            !self.free.contains(&entry.offset())
        }

        fn read_swap_cache_async(&self, entry: SwapEntry) {
            self.reads.borrow_mut().push(entry.offset());
        }
    }

    #[test]
    fn entry_encoding() {
        let entry = SwapEntry::new(5, 0x1234);
        assert_eq!(entry.ty(), 5);
        assert_eq!(entry.offset(), 0x1234);
        assert_eq!(entry.raw() & 1, 0);
        assert_eq!(SwapEntry::from_raw(entry.raw()), entry);
    }

    #[test]
    fn reads_the_aligned_cluster() {
        let device = Device::new(64, &[19]);
        let issued = swapin_readahead(&device, SwapEntry::new(2, 21), 3);

        assert_eq!(issued, 7);
        assert_eq!(*device.reads.borrow(), [16, 17, 18, 20, 21, 22, 23]);
    }

    #[test]
    fn skips_the_header_slot() {
        let device = Device::new(64, &[]);
        let issued = swapin_readahead(&device, SwapEntry::new(2, 2), 2);

        assert_eq!(issued, 3);
        assert_eq!(*device.reads.borrow(), [1, 2, 3]);
    }

    #[test]
    fn stops_at_the_end_of_the_device() {
        let device = Device::new(20, &[]);
        let issued = swapin_readahead(&device, SwapEntry::new(2, 17), 4);

        assert_eq!(issued, 4);
        assert_eq!(*device.reads.borrow(), [16, 17, 18, 19]);
    }
}
