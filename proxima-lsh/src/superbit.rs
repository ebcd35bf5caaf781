//! SuperBit hyperplane hashing for cosine-similar vectors

use crate::{LshFamily, Result, Shingler, invalid};
use ndarray::{Array1, ArrayView1};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;

/// Sign bits contributed to each stage's bucket.
const BITS_PER_STAGE: usize = 8;

/// Random-hyperplane hashing with batch orthogonalization.
///
/// Hyperplanes are drawn from a Gaussian and orthonormalized in batches of up
/// to `dim` via modified Gram-Schmidt, which lowers the variance of the
/// cosine estimate compared to independent planes. The signature is the sign
/// bit of each projection; each stage packs its band of 8 bits into a bucket
/// in `[0, partitions)`.
#[derive(Debug, Clone)]
pub struct SuperBit {
    dim: usize,
    stages: usize,
    partitions: usize,
    hyperplanes: Vec<Array1<f64>>,
}

impl SuperBit {
    /// Create a family for `dim`-dimensional vectors.
    pub fn new(dim: usize, stages: usize, partitions: usize, seed: Option<u64>) -> Result<Self> {
        if dim == 0 {
            return Err(invalid("dim", "must be at least 1"));
        }
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
        let total = stages * BITS_PER_STAGE;
        let mut hyperplanes: Vec<Array1<f64>> = Vec::with_capacity(total);
        while hyperplanes.len() < total {
            let batch_len = (total - hyperplanes.len()).min(dim);
            let batch_start = hyperplanes.len();
            for i in 0..batch_len {
                // redraw until the plane survives orthogonalization
                loop {
                    let mut v: Array1<f64> =
                        Array1::from_iter((0..dim).map(|_| rng.sample::<f64, _>(StandardNormal)));
                    for prev in &hyperplanes[batch_start..batch_start + i] {
                        let proj = v.dot(prev);
                        v = v - prev * proj;
                    }
                    let norm = v.dot(&v).sqrt();
                    if norm > 1e-9 {
                        hyperplanes.push(v / norm);
                        break;
                    }
                }
            }
        }
        Ok(Self {
            dim,
            stages,
            partitions,
            hyperplanes,
        })
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    /// One sign bit per hyperplane.
    pub fn signature(&self, vector: &[f64]) -> Vec<bool> {
        let v = ArrayView1::from(vector);
        self.hyperplanes.iter().map(|h| v.dot(h) >= 0.0).collect()
    }
}

impl LshFamily<[f64]> for SuperBit {
    fn stages(&self) -> usize {
        self.stages
    }

    fn partitions(&self) -> usize {
        self.partitions
    }

    fn hash(&self, vector: &[f64]) -> Vec<usize> {
        let signature = self.signature(vector);
        signature
            .chunks(BITS_PER_STAGE)
            .map(|band| {
                let byte = band
                    .iter()
                    .fold(0u64, |acc, &bit| (acc << 1) | u64::from(bit));
                // spread the byte before reducing so nearby codes do not
                // alias into nearby buckets
                let mixed = byte.wrapping_mul(0x9e3779b97f4a7c15);
                (mixed % self.partitions as u64) as usize
            })
            .collect()
    }
}

/// A fitted [`Shingler`] combined with a [`SuperBit`] family, bucketing plain
/// text documents by the cosine of their shingle-count vectors.
#[derive(Debug, Clone)]
pub struct ShingleSuperBit {
    shingler: Shingler,
    family: SuperBit,
}

impl ShingleSuperBit {
    /// Fit a shingler on `corpus` and wire it to a SuperBit family sized to
    /// the resulting vocabulary.
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
        let family = SuperBit::new(shingler.vocabulary_len().max(1), stages, partitions, seed)?;
        Ok(Self { shingler, family })
    }

    pub fn shingler(&self) -> &Shingler {
        &self.shingler
    }
}

impl LshFamily<String> for ShingleSuperBit {
    fn stages(&self) -> usize {
        self.family.stages()
    }

    fn partitions(&self) -> usize {
        self.family.partitions()
    }

    fn hash(&self, text: &String) -> Vec<usize> {
        let vector = self.shingler.vector(text);
        let mut padded = vector.to_vec();
        padded.resize(self.family.dim(), 0.0);
        self.family.hash(&padded)
    }
}
