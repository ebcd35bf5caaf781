//! Locality-Sensitive Hashing for Proxima
//!
//! This crate provides the hashing collaborators used by Proxima's
//! LSH-partitioning graph builder:
//!
//! - **Shingling**: character k-gram extraction with a shared, fitted vocabulary
//! - **MinHash**: banded min-wise signatures for Jaccard-similar sets
//! - **SuperBit**: batch-orthogonalized random hyperplanes for cosine-similar vectors
//!
//! All families implement [`LshFamily`]: for every input they produce one
//! bucket per stage, so similar inputs collide in at least one stage with
//! high probability.

mod minhash;
mod shingle;
mod superbit;

pub use minhash::{MinHash, ShingleMinHash};
pub use shingle::Shingler;
pub use superbit::{ShingleSuperBit, SuperBit};

/// Errors that can occur while configuring a hash family
#[derive(Debug, thiserror::Error)]
pub enum LshError {
    #[error("invalid parameter {name}: {reason}")]
    InvalidParameter { name: &'static str, reason: String },
}

pub type Result<T> = std::result::Result<T, LshError>;

pub(crate) fn invalid(name: &'static str, reason: impl Into<String>) -> LshError {
    LshError::InvalidParameter {
        name,
        reason: reason.into(),
    }
}

/// A family of locality-sensitive hash functions.
///
/// An implementation bins a value once per stage (independent hash table),
/// returning a bucket index in `[0, partitions)` for each. Similar values
/// share a bucket in at least one stage with high probability; that is the
/// only guarantee callers may rely on.
pub trait LshFamily<V: ?Sized> {
    /// Number of independent hash tables.
    fn stages(&self) -> usize;

    /// Number of buckets per stage.
    fn partitions(&self) -> usize;

    /// Bucket the value: one index per stage, each in `[0, partitions)`.
    fn hash(&self, value: &V) -> Vec<usize>;
}
