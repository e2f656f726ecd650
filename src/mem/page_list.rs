//! Intrusive doubly linked list of pages.
//!
//! The links live inside the [`Page`] descriptors, so a page can be on at
//! most one list at a time. Nodes are addressed by their map number.

use super::Page;
use core::iter::FusedIterator;

/// The link value that marks the end of a list.
pub const NIL: usize = usize::MAX;

/// A doubly linked list of pages threaded through their descriptors.
#[derive(Debug, Clone, Copy)]
pub struct PageList {
    head: usize,
    tail: usize,
    len: usize,
}

impl PageList {
    /// Create a new, empty list.
    pub const fn new() -> Self {
        Self {
            head: NIL,
            tail: NIL,
            len: 0,
        }
    }

    /// Returns whether this list is empty.
    pub fn is_empty(&self) -> bool {
        self.head == NIL
    }

    /// The number of pages on this list.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Push page `nr` to the front of the list.
    pub fn push_head(&mut self, pages: &[Page], nr: usize) {
        let page = &pages[nr];
        page.set_prev(NIL);
        page.set_next(self.head);

        if self.head == NIL {
            debug_assert!(self.tail == NIL);
            debug_assert!(self.len == 0);
            self.tail = nr;
        } else {
            pages[self.head].set_prev(nr);
        }

        self.head = nr;
        self.len += 1;
    }

    /// Removes the first page from this list.
    pub fn pop_head(&mut self, pages: &[Page]) -> Option<usize> {
        let nr = self.head;
        if nr == NIL {
            return None;
        }

        self.remove(pages, nr);
        Some(nr)
    }

    /// Removes the last page from this list.
    pub fn pop_tail(&mut self, pages: &[Page]) -> Option<usize> {
        let nr = self.tail;
        if nr == NIL {
            return None;
        }

        self.remove(pages, nr);
        Some(nr)
    }

    /// Unlink page `nr`, which must be on this list.
    pub fn remove(&mut self, pages: &[Page], nr: usize) {
        debug_assert!(self.len > 0, "removing a page from an empty list");

        let page = &pages[nr];
        let next = page.next();
        let prev = page.prev();

        if prev == NIL {
            debug_assert!(self.head == nr);
            self.head = next;
        } else {
            pages[prev].set_next(next);
        }

        if next == NIL {
            debug_assert!(self.tail == nr);
            self.tail = prev;
        } else {
            pages[next].set_prev(prev);
        }

        page.set_next(NIL);
        page.set_prev(NIL);
        self.len -= 1;
    }

    /// Returns an iterator over the map numbers on this list, front to back.
    pub fn iter<'a>(&self, pages: &'a [Page]) -> Iter<'a> {
        Iter {
            pages,
            cursor: self.head,
        }
    }
}

impl Default for PageList {
    fn default() -> Self {
        Self::new()
    }
}

/// Iterator over the map numbers of a [`PageList`].
pub struct Iter<'a> {
    pages: &'a [Page],
    cursor: usize,
}

impl Iterator for Iter<'_> {
    type Item = usize;

    fn next(&mut self) -> Option<Self::Item> {
        if self.cursor == NIL {
            None
        } else {
            let nr = self.cursor;
            self.cursor = self.pages[nr].next();
            Some(nr)
        }
    }
}

impl FusedIterator for Iter<'_> {}
