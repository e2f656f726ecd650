//! Buddy-pair bitmap.
//!
//! Each bit covers one pair of buddies at one order and holds the parity of
//! the pair: it is flipped whenever either half is taken off or put onto the
//! free list. A set bit therefore means exactly one half is free.

/// The number of bits stored in one word of the bitmap.
const WORD_BITS: usize = usize::BITS as usize;

/// A bitmap with one bit per buddy pair, stored in memory carved from the
/// managed region.
#[derive(Debug)]
pub struct Bitmap {
    words: &'static mut [usize],
}

impl Bitmap {
    /// Create a bitmap without any storage.
    pub fn empty() -> Self {
        Self { words: &mut [] }
    }

    /// Wrap `words` as a bitmap and clear every bit.
    pub fn new(words: &'static mut [usize]) -> Self {
        words.iter_mut().for_each(|word| *word = 0);
        Self { words }
    }

    /// The number of words needed for the pairs of `order` over `pages` pages.
    ///
    /// This rounds up to whole words and adds one spare word, so the pair
    /// index of the last page is always in range.
    pub const fn words_for(pages: usize, order: usize) -> usize {
        let pair_pages = 1 << (order + 1);
        let bits = (pages + pair_pages - 1) / pair_pages;
        (bits + WORD_BITS - 1) / WORD_BITS + 1
    }

    /// The number of bits this bitmap holds.
    pub fn bits(&self) -> usize {
        self.words.len() * WORD_BITS
    }

    /// Returns the bit at `index`.
    pub fn get(&self, index: usize) -> bool {
        let (word, mask) = Self::locate(index);
        self.words[word] & mask != 0
    }

    /// Flips the bit at `index` and returns its previous value.
    pub fn toggle(&mut self, index: usize) -> bool {
        let (word, mask) = Self::locate(index);
        let old = self.words[word] & mask != 0;
        self.words[word] ^= mask;
        old
    }

    /// Counts the set bits.
    pub fn count_ones(&self) -> usize {
        self.words.iter().map(|word| word.count_ones() as usize).sum()
    }

    fn locate(index: usize) -> (usize, usize) {
        (index / WORD_BITS, 1 << (index % WORD_BITS))
    }
}
