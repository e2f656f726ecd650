//! A binary buddy allocator for physical memory pages.
//!
//! Memory is handed out in blocks of `2^order` pages from two independent
//! pools, the general pool and a restricted low-memory pool. Every pool keeps
//! one free list and one buddy-pair bitmap per order, and freed blocks are
//! merged with their buddies as long as the bitmap says the buddy is free.
//!
//! The entry point is [`free_area_init`](mem::PageAllocator::free_area_init),
//! which carves the page descriptors and the bitmaps out of the memory it is
//! given and returns the allocator.
#![deny(rust_2018_idioms, rustdoc::broken_intra_doc_links)]
#![cfg_attr(not(test), no_std)]

#[cfg(not(target_has_atomic = "ptr"))]
compile_error!("the page allocator requires pointer sized atomics");

pub mod mem;
pub mod unit;

pub use mem::{
    Config, Error, GfpFlags, PageAllocator, PhysAddr, Priority, Reclaim, Result, Task, ZoneType,
};
