//! Character k-gram shingling with a shared vocabulary

use crate::{Result, invalid};
use ndarray::Array1;
use std::collections::{BTreeSet, HashMap};

/// Turns text into k-gram features over a vocabulary grown by [`fit`].
///
/// The same fitted shingler must be used for every document of a corpus so
/// that feature indices are comparable. Shingles never seen during fitting
/// are silently skipped at featurization time.
///
/// [`fit`]: Shingler::fit
#[derive(Debug, Clone)]
pub struct Shingler {
    shingle_size: usize,
    vocabulary: HashMap<String, usize>,
}

impl Shingler {
    /// Create a shingler producing k-grams of `shingle_size` characters.
    pub fn new(shingle_size: usize) -> Result<Self> {
        if shingle_size == 0 {
            return Err(invalid("shingle_size", "must be at least 1"));
        }
        Ok(Self {
            shingle_size,
            vocabulary: HashMap::new(),
        })
    }

    pub fn shingle_size(&self) -> usize {
        self.shingle_size
    }

    /// Number of distinct shingles seen so far.
    pub fn vocabulary_len(&self) -> usize {
        self.vocabulary.len()
    }

    /// Register every shingle of `text` in the shared vocabulary.
    pub fn fit(&mut self, text: &str) {
        let next = self.vocabulary.len();
        let mut added = 0;
        for shingle in shingles(text, self.shingle_size) {
            if !self.vocabulary.contains_key(&shingle) {
                self.vocabulary.insert(shingle, next + added);
                added += 1;
            }
        }
    }

    /// The set of vocabulary indices present in `text` (for MinHash).
    pub fn indices(&self, text: &str) -> BTreeSet<usize> {
        shingles(text, self.shingle_size)
            .filter_map(|s| self.vocabulary.get(&s).copied())
            .collect()
    }

    /// Shingle counts of `text` as a dense vector (for SuperBit).
    pub fn vector(&self, text: &str) -> Array1<f64> {
        let mut counts = Array1::zeros(self.vocabulary.len());
        for shingle in shingles(text, self.shingle_size) {
            if let Some(&idx) = self.vocabulary.get(&shingle) {
                counts[idx] += 1.0;
            }
        }
        counts
    }
}

fn shingles(text: &str, size: usize) -> impl Iterator<Item = String> + '_ {
    let chars: Vec<char> = text.chars().collect();
    let count = chars.len().saturating_sub(size.saturating_sub(1));
    (0..count).map(move |i| chars[i..i + size].iter().collect())
}
