//! Allocation request flags.

use super::ZoneType;
use bitflags::bitflags;

bitflags! {
    /// Describes how an allocation may be satisfied.
    pub struct GfpFlags: u32 {
        /// The caller may block while memory is reclaimed.
        const WAIT = 1 << 0;
        /// Low priority request.
        const LOW = 1 << 1;
        /// Medium priority request, may proceed after a reclaim without progress.
        const MED = 1 << 2;
        /// High priority request, may proceed after a reclaim without progress.
        const HIGH = 1 << 3;
        /// The reclaim routine may start I/O.
        const IO = 1 << 4;
        /// The memory must come from the restricted low-memory pool.
        const DMA = 1 << 7;

        /// Interrupt handlers and other callers that must not sleep.
        const GFP_ATOMIC = Self::HIGH.bits;
        /// Buffer cache allocations.
        const GFP_BUFFER = Self::LOW.bits | Self::WAIT.bits;
        /// Allocations on behalf of user space.
        const GFP_USER = Self::LOW.bits | Self::WAIT.bits | Self::IO.bits;
        /// Ordinary kernel allocations.
        const GFP_KERNEL = Self::MED.bits | Self::WAIT.bits | Self::IO.bits;
        /// Network filesystem allocations that must not fail easily.
        const GFP_NFS = Self::HIGH.bits | Self::WAIT.bits | Self::IO.bits;
        /// Restricted pool modifier.
        const GFP_DMA = Self::DMA.bits;
    }
}

/// How hard an allocation may push after reclaim made no progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Priority {
    /// Fail if reclaim made no progress and memory is still short.
    Normal,
    /// Proceed to the free lists even if reclaim made no progress.
    Medium,
    /// Proceed to the free lists even if reclaim made no progress.
    High,
}

impl GfpFlags {
    /// The emergency level of this request. `HIGH` wins over `MED`.
    pub fn priority(self) -> Priority {
        if self.contains(GfpFlags::HIGH) {
            Priority::High
        } else if self.contains(GfpFlags::MED) {
            Priority::Medium
        } else {
            Priority::Normal
        }
    }

    /// Whether the caller is willing to block for reclaim.
    pub fn may_block(self) -> bool {
        self.contains(GfpFlags::WAIT)
    }

    /// The zone type the request prefers.
    ///
    /// General requests fall back to the low-memory pool, restricted
    /// requests never use the general pool.
    pub fn zone_type(self) -> ZoneType {
        if self.contains(GfpFlags::DMA) {
            ZoneType::LowMem
        } else {
            ZoneType::General
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priorities() {
        assert_eq!(GfpFlags::GFP_ATOMIC.priority(), Priority::High);
        assert_eq!(GfpFlags::GFP_NFS.priority(), Priority::High);
        assert_eq!(GfpFlags::GFP_KERNEL.priority(), Priority::Medium);
        assert_eq!(GfpFlags::GFP_USER.priority(), Priority::Normal);
        assert_eq!(GfpFlags::GFP_BUFFER.priority(), Priority::Normal);
        assert_eq!((GfpFlags::MED | GfpFlags::HIGH).priority(), Priority::High);
    }

    #[test]
    fn blocking() {
        assert!(!GfpFlags::GFP_ATOMIC.may_block());
        assert!(GfpFlags::GFP_KERNEL.may_block());
        assert!(GfpFlags::GFP_USER.may_block());
    }

    #[test]
    fn zone_types() {
        assert_eq!(GfpFlags::GFP_KERNEL.zone_type(), ZoneType::General);
        assert_eq!(
            (GfpFlags::GFP_ATOMIC | GfpFlags::GFP_DMA).zone_type(),
            ZoneType::LowMem
        );
    }
}
