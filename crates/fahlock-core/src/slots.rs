//! Growable bit set of slot ids.

use std::collections::TryReserveError;

const WORD_BITS: u32 = u64::BITS;

/// Set of slot ids stored one bit per id.
///
/// Storage grows to cover the highest id inserted; new words start empty.
/// Iteration is always in ascending id order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SlotSet {
    words: Vec<u64>,
    len: usize,
}

impl SlotSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `false` if `slot` was already present.
    pub fn insert(&mut self, slot: u32) -> bool {
        let (word, _) = Self::locate(slot);
        if self.words.len() <= word {
            self.words.resize(word + 1, 0);
        }
        self.set(slot)
    }

    /// Like [`insert`](Self::insert), but reports allocation failure instead
    /// of aborting.
    pub fn try_insert(&mut self, slot: u32) -> Result<bool, TryReserveError> {
        let (word, _) = Self::locate(slot);
        if self.words.len() <= word {
            self.words.try_reserve(word + 1 - self.words.len())?;
            self.words.resize(word + 1, 0);
        }
        Ok(self.set(slot))
    }

    fn set(&mut self, slot: u32) -> bool {
        let (word, mask) = Self::locate(slot);
        let fresh = self.words[word] & mask == 0;
        if fresh {
            self.words[word] |= mask;
            self.len += 1;
        }
        fresh
    }

    pub fn contains(&self, slot: u32) -> bool {
        let (word, mask) = Self::locate(slot);
        self.words.get(word).is_some_and(|w| w & mask != 0)
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn iter(&self) -> Iter<'_> {
        Iter {
            words: &self.words,
            index: 0,
            current: self.words.first().copied().unwrap_or(0),
        }
    }

    fn locate(slot: u32) -> (usize, u64) {
        ((slot / WORD_BITS) as usize, 1u64 << (slot % WORD_BITS))
    }
}

impl Extend<u32> for SlotSet {
    fn extend<I: IntoIterator<Item = u32>>(&mut self, iter: I) {
        for slot in iter {
            self.insert(slot);
        }
    }
}

impl FromIterator<u32> for SlotSet {
    fn from_iter<I: IntoIterator<Item = u32>>(iter: I) -> Self {
        let mut set = SlotSet::new();
        set.extend(iter);
        set
    }
}

impl<'a> IntoIterator for &'a SlotSet {
    type Item = u32;
    type IntoIter = Iter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Ascending iterator over a [`SlotSet`].
pub struct Iter<'a> {
    words: &'a [u64],
    index: usize,
    current: u64,
}

impl Iterator for Iter<'_> {
    type Item = u32;

    fn next(&mut self) -> Option<u32> {
        while self.current == 0 {
            self.index += 1;
            self.current = *self.words.get(self.index)?;
        }
        let bit = self.current.trailing_zeros();
        self.current &= self.current - 1;
        Some(self.index as u32 * WORD_BITS + bit)
    }
}
