//! Utilities for working with raw byte units.

use core::fmt;

/// `1 KiB`
pub const KIB: usize = 1 << 10;
/// `1 MiB`
pub const MIB: usize = 1 << 20;
/// `1 GiB`
pub const GIB: usize = 1 << 30;

/// Wrapper around raw byte that pretty-prints
/// them using the [`Display`](core::fmt::Display)
/// implementation.
#[derive(Debug, Clone, Copy)]
pub struct ByteUnit(pub usize);

impl fmt::Display for ByteUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let count = self.0 as f32;

        match self.0 {
            0..=1023 => write!(f, "{} B", self.0),
            n if n < MIB => write!(f, "{:.2} KiB", count / KIB as f32),
            n if n < GIB => write!(f, "{:.2} MiB", count / MIB as f32),
            _ => write!(f, "{:.2} GiB", count / GIB as f32),
        }
    }
}

/// Wraps `bytes` into a [`ByteUnit`] for printing.
pub fn bytes(bytes: usize) -> ByteUnit {
    ByteUnit(bytes)
}

/// Formats a number of pages the way the free area dump does, as whole kilobytes.
#[derive(Debug, Clone, Copy)]
pub struct PageKb(pub usize);

impl fmt::Display for PageKb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}kB", self.0 * (crate::mem::PAGE_SIZE / KIB))
    }
}
