//! MinHash signatures with per-stage banding

use crate::{LshFamily, Result, Shingler, invalid};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::BTreeSet;

/// Signature rows combined into each stage's bucket.
const ROWS_PER_BAND: usize = 4;

const FNV_OFFSET: u64 = 0xcbf29ce484222325;
const FNV_PRIME: u64 = 0x100000001b3;

/// Min-wise hashing over sets of feature indices.
///
/// The signature holds `stages * 4` min-hash rows; each stage folds its band
/// of rows into a bucket in `[0, partitions)`. Sets with high Jaccard
/// similarity agree on many rows and therefore collide in at least one stage
/// with high probability.
#[derive(Debug, Clone)]
pub struct MinHash {
    stages: usize,
    partitions: usize,
    coefficients: Vec<(u64, u64)>,
}

impl MinHash {
    /// Create a family with `stages` hash tables of `partitions` buckets.
    ///
    /// `seed` fixes the hash coefficients for reproducible bucketing.
    pub fn new(stages: usize, partitions: usize, seed: Option<u64>) -> Result<Self> {
        if stages == 0 {
            return Err(invalid("stages", "must be at least 1"));
        }
        if partitions == 0 {
            return Err(invalid("partitions", "must be at least 1"));
        }
        let mut rng = match seed {
            Some(s) => StdRng::seed_from_u64(s),
            None => StdRng::from_os_rng(),
        };
        let coefficients = (0..stages * ROWS_PER_BAND)
            .map(|_| (rng.random::<u64>() | 1, rng.random::<u64>()))
            .collect();
        Ok(Self {
            stages,
            partitions,
            coefficients,
        })
    }

    /// The min-hash signature of a set, one row per coefficient pair.
    ///
    /// The empty set maps to an all-`u64::MAX` signature.
    pub fn signature(&self, set: &BTreeSet<usize>) -> Vec<u64> {
        self.coefficients
            .iter()
            .map(|&(a, b)| {
                set.iter()
                    .map(|&x| a.wrapping_mul(x as u64).wrapping_add(b))
                    .min()
                    .unwrap_or(u64::MAX)
            })
            .collect()
    }
}

impl LshFamily<BTreeSet<usize>> for MinHash {
    fn stages(&self) -> usize {
        self.stages
    }

    fn partitions(&self) -> usize {
        self.partitions
    }

    fn hash(&self, set: &BTreeSet<usize>) -> Vec<usize> {
        let signature = self.signature(set);
        signature
            .chunks(ROWS_PER_BAND)
            .map(|band| {
                let folded = band
                    .iter()
                    .fold(FNV_OFFSET, |acc, &row| {
                        acc.wrapping_mul(FNV_PRIME) ^ row
                    });
                (folded % self.partitions as u64) as usize
            })
            .collect()
    }
}

/// A fitted [`Shingler`] combined with a [`MinHash`] family, bucketing plain
/// text documents directly.
#[derive(Debug, Clone)]
pub struct ShingleMinHash {
    shingler: Shingler,
    family: MinHash,
}

impl ShingleMinHash {
    /// Fit a shingler on `corpus` and wire it to a MinHash family.
    pub fn fit<S: AsRef<str>>(
        shingle_size: usize,
        stages: usize,
        partitions: usize,
        corpus: &[S],
        seed: Option<u64>,
    ) -> Result<Self> {
        let mut shingler = Shingler::new(shingle_size)?;
        for doc in corpus {
            shingler.fit(doc.as_ref());
        }
        let family = MinHash::new(stages, partitions, seed)?;
        Ok(Self { shingler, family })
    }

    pub fn shingler(&self) -> &Shingler {
        &self.shingler
    }
}

impl LshFamily<String> for ShingleMinHash {
    fn stages(&self) -> usize {
        self.family.stages()
    }

    fn partitions(&self) -> usize {
        self.family.partitions()
    }

    fn hash(&self, text: &String) -> Vec<usize> {
        self.family.hash(&self.shingler.indices(text))
    }
}
