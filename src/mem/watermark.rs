//! Free page thresholds that drive reclaim.

/// The smallest `min` watermark.
const MIN_FREE_PAGES: usize = 10;
/// The largest `min` watermark.
const MAX_MIN_FREE_PAGES: usize = 256;

/// Free page thresholds.
///
/// Below `low` the background reclaim daemon is woken, at or below `min`
/// blocking callers reclaim synchronously, and above `high` a reclaim pass
/// counts as successful.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Watermarks {
    pub min: usize,
    pub low: usize,
    pub high: usize,
}

/// Where a free page count stands relative to the watermarks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    /// More than `low` pages are free.
    AboveLow,
    /// More than `min`, but at most `low` pages are free.
    AboveMin,
    /// At most `min` pages are free.
    AtOrBelowMin,
}

impl Watermarks {
    /// Computes the watermarks for a machine with `total_pages` pages.
    ///
    /// `min` is 1/128th of memory, clamped to `10..=256` pages.
    pub fn for_total(total_pages: usize) -> Self {
        let min = (total_pages >> 7).max(MIN_FREE_PAGES).min(MAX_MIN_FREE_PAGES);

        Self {
            min,
            low: min * 2,
            high: min * 3,
        }
    }

    /// Classifies `free` pages against these watermarks.
    pub fn level(&self, free: usize) -> Level {
        if free > self.low {
            Level::AboveLow
        } else if free > self.min {
            Level::AboveMin
        } else {
            Level::AtOrBelowMin
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamped_to_bounds() {
        assert_eq!(
            Watermarks::for_total(64),
            Watermarks {
                min: 10,
                low: 20,
                high: 30
            }
        );
        assert_eq!(Watermarks::for_total(1 << 20).min, 256);
    }

    #[test]
    fn scales_with_memory() {
        let wm = Watermarks::for_total(16384);
        assert_eq!(wm.min, 128);
        assert_eq!(wm.low, 256);
        assert_eq!(wm.high, 384);
    }

    #[test]
    fn levels() {
        let wm = Watermarks::for_total(0);
        assert_eq!(wm.level(21), Level::AboveLow);
        assert_eq!(wm.level(20), Level::AboveMin);
        assert_eq!(wm.level(11), Level::AboveMin);
        assert_eq!(wm.level(10), Level::AtOrBelowMin);
        assert_eq!(wm.level(0), Level::AtOrBelowMin);
    }
}
