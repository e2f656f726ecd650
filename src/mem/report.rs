//! Snapshot of the free areas for diagnostics.

use super::{buddy::FreeAreas, Watermarks, ZoneType, MAX_ORDER, NR_ZONE_TYPES};
use crate::unit::PageKb;
use core::fmt;

/// The number of free blocks at every order of one zone type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ZoneReport {
    zone: ZoneType,
    counts: [usize; MAX_ORDER],
    max_order: usize,
}

impl ZoneReport {
    /// The zone type this report describes.
    pub fn zone(&self) -> ZoneType {
        self.zone
    }

    /// The number of free blocks, indexed by order.
    pub fn counts(&self) -> &[usize] {
        &self.counts[..self.max_order]
    }

    /// The number of free pages in this zone type.
    pub fn free_pages(&self) -> usize {
        self.counts()
            .iter()
            .enumerate()
            .map(|(order, count)| count << order)
            .sum()
    }
}

impl fmt::Display for ZoneReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:", self.zone)?;
        for (order, count) in self.counts().iter().enumerate() {
            write!(f, " {}*{}", count, PageKb(1 << order))?;
        }
        write!(f, " = {}", PageKb(self.free_pages()))
    }
}

/// A consistent view of every free area, taken under the allocator lock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FreeAreaReport {
    zones: [ZoneReport; NR_ZONE_TYPES],
    nr_free_pages: usize,
    watermarks: Watermarks,
}

impl FreeAreaReport {
    pub(crate) fn collect(
        areas: &FreeAreas,
        max_order: usize,
        nr_free_pages: usize,
        watermarks: Watermarks,
    ) -> Self {
        let zone = |zone: ZoneType| {
            let mut counts = [0; MAX_ORDER];
            for (count, area) in counts.iter_mut().zip(&areas[zone.index()]) {
                *count = area.count();
            }

            ZoneReport {
                zone,
                counts,
                max_order,
            }
        };

        Self {
            zones: [zone(ZoneType::General), zone(ZoneType::LowMem)],
            nr_free_pages,
            watermarks,
        }
    }

    /// The report of a single zone type.
    pub fn zone(&self, zone: ZoneType) -> &ZoneReport {
        &self.zones[zone.index()]
    }

    /// The value of the free page counter.
    pub fn nr_free_pages(&self) -> usize {
        self.nr_free_pages
    }

    /// The number of pages on all free lists together.
    ///
    /// Always equal to [`nr_free_pages`](Self::nr_free_pages).
    pub fn listed_pages(&self) -> usize {
        self.zones.iter().map(ZoneReport::free_pages).sum()
    }

    /// The watermarks at the time of the snapshot.
    pub fn watermarks(&self) -> Watermarks {
        self.watermarks
    }
}

impl fmt::Display for FreeAreaReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Free pages: {} ( min {} low {} high {} )",
            PageKb(self.nr_free_pages),
            self.watermarks.min,
            self.watermarks.low,
            self.watermarks.high,
        )?;

        for zone in &self.zones {
            writeln!(f, "{}", zone)?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mem::{testing, GfpFlags, NoReclaim, Task};

    fn zone(counts: &[usize]) -> ZoneReport {
        let mut report = ZoneReport {
            zone: ZoneType::General,
            counts: [0; MAX_ORDER],
            max_order: counts.len(),
        };
        report.counts[..counts.len()].copy_from_slice(counts);
        report
    }

    #[test]
    fn zone_totals() {
        let report = zone(&[3, 1, 0, 2]);
        assert_eq!(report.free_pages(), 3 + 2 + 16);
        assert_eq!(report.counts(), [3, 1, 0, 2]);
        assert_eq!(
            report.to_string(),
            "General: 3*4kB 1*8kB 0*16kB 2*32kB = 84kB"
        );
    }

    #[test]
    fn allocator_dump() {
        let alloc = testing::allocator(64, testing::config(4), NoReclaim);
        testing::release(&alloc, 8, 16);
        alloc
            .allocate_pages(&mut Task::new(), 0, GfpFlags::GFP_ATOMIC)
            .unwrap();

        let report = alloc.show_free_areas();
        assert_eq!(report.nr_free_pages(), 7);
        assert_eq!(report.listed_pages(), 7);
        assert_eq!(
            report.to_string(),
            "Free pages: 28kB ( min 10 low 20 high 30 )\n\
             General: 1*4kB 1*8kB 1*16kB 0*32kB = 28kB\n\
             LowMem: 0*4kB 0*8kB 0*16kB 0*32kB = 0kB\n"
        );
    }
}
