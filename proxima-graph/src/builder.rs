//! The builder capability and shared configuration plumbing

use crate::{Graph, GraphError, Item, Result, Similarity};
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Optional progress sink.
///
/// Builders invoke it at well-known checkpoints (per NN-Descent iteration,
/// per LSH bucket) with free-form key/value data. Never required for
/// correctness.
pub type Callback = Arc<dyn Fn(&HashMap<&'static str, Value>) + Send + Sync>;

/// Capability shared by every graph builder.
///
/// Given a list of items, the builder returns a graph over exactly those
/// items whose neighbor lists all have capacity `k`, reference no absent
/// owner and contain no self-edges. The LSH-partitioning builder drives any
/// other builder through this trait, one bucket at a time.
pub trait GraphBuilder<T>: Send + Sync {
    /// Build a k-NN graph over `items` with the given similarity.
    fn build_with(
        &self,
        items: Vec<Item<T>>,
        k: usize,
        similarity: Arc<dyn Similarity<T>>,
    ) -> Result<Graph<T>>;

    /// Similarity evaluations performed by the most recent build.
    fn computed_similarities(&self) -> u64 {
        0
    }
}

pub(crate) fn invalid(name: &'static str, reason: impl Into<String>) -> GraphError {
    GraphError::InvalidParameter {
        name,
        reason: reason.into(),
    }
}

pub(crate) fn validate_k(k: usize) -> Result<()> {
    if k == 0 {
        return Err(invalid("k", "must be at least 1"));
    }
    Ok(())
}

/// `rho` lives in (0, 1].
pub(crate) fn validate_rho(rho: f64) -> Result<()> {
    if !(rho > 0.0 && rho <= 1.0) {
        return Err(invalid("rho", format!("{rho} is outside (0, 1]")));
    }
    Ok(())
}

/// `delta` lives in (0, 1), both ends open.
pub(crate) fn validate_delta(delta: f64) -> Result<()> {
    if !(delta > 0.0 && delta < 1.0) {
        return Err(invalid("delta", format!("{delta} is outside (0, 1)")));
    }
    Ok(())
}

/// Reject duplicate ids in builder input before any work starts.
pub(crate) fn check_distinct_ids<T>(items: &[Item<T>]) -> Result<()> {
    let mut seen = std::collections::HashSet::with_capacity(items.len());
    for item in items {
        if !seen.insert(item.id) {
            return Err(GraphError::DuplicateItem(item.id));
        }
    }
    Ok(())
}

pub(crate) fn make_rng(seed: Option<u64>) -> StdRng {
    match seed {
        Some(s) => StdRng::seed_from_u64(s),
        None => StdRng::from_os_rng(),
    }
}
