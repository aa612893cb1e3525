/// Set of hovered feature positions, backed by a bitset.
///
/// Ordering contract:
/// - Iteration yields positions in ascending order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HoverSet {
    words: Vec<u64>,
    len: usize,
}

/// Result of replacing the hovered set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HoverDelta {
    /// Newly hovered positions.
    pub entered: Vec<usize>,
    /// Positions no longer hovered.
    pub left: Vec<usize>,
}

impl HoverDelta {
    pub fn is_empty(&self) -> bool {
        self.entered.is_empty() && self.left.is_empty()
    }
}

impl HoverSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_positions(positions: impl IntoIterator<Item = usize>) -> Self {
        let mut set = Self::new();
        for p in positions {
            set.insert(p);
        }
        set
    }

    pub fn clear(&mut self) {
        self.words.clear();
        self.len = 0;
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn contains(&self, position: usize) -> bool {
        let (word, bit) = word_bit(position);
        self.words
            .get(word)
            .is_some_and(|w| (w & (1u64 << bit)) != 0)
    }

    /// Returns `true` if the set changed.
    pub fn insert(&mut self, position: usize) -> bool {
        let (word, bit) = word_bit(position);
        if self.words.len() <= word {
            self.words.resize(word + 1, 0);
        }
        let mask = 1u64 << bit;
        let w = &mut self.words[word];
        if (*w & mask) != 0 {
            return false;
        }
        *w |= mask;
        self.len += 1;
        true
    }

    /// Returns `true` if the set changed.
    pub fn remove(&mut self, position: usize) -> bool {
        let (word, bit) = word_bit(position);
        let Some(w) = self.words.get_mut(word) else {
            return false;
        };
        let mask = 1u64 << bit;
        if (*w & mask) == 0 {
            return false;
        }
        *w &= !mask;
        self.len -= 1;
        true
    }

    /// Set difference: positions in `self` but not in `other`, ascending.
    pub fn diff(&self, other: &Self) -> Vec<usize> {
        self.iter().filter(|p| !other.contains(*p)).collect()
    }

    /// Replaces the set with `next` and reports what changed.
    pub fn replace(&mut self, next: HoverSet) -> HoverDelta {
        let delta = HoverDelta {
            entered: next.diff(self),
            left: self.diff(&next),
        };
        *self = next;
        delta
    }

    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        HoverIter {
            words: &self.words,
            word_index: 0,
            current_word: 0,
            base: 0,
        }
    }
}

fn word_bit(position: usize) -> (usize, u32) {
    (position / 64, (position % 64) as u32)
}

struct HoverIter<'a> {
    words: &'a [u64],
    word_index: usize,
    current_word: u64,
    base: usize,
}

impl<'a> Iterator for HoverIter<'a> {
    type Item = usize;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.current_word != 0 {
                let tz = self.current_word.trailing_zeros();
                self.current_word &= !(1u64 << tz);
                return Some(self.base + tz as usize);
            }

            let w = *self.words.get(self.word_index)?;
            self.current_word = w;
            self.base = self.word_index * 64;
            self.word_index += 1;
        }
    }
}
