//! NN-Descent: iterative local-join graph refinement
//!
//! Starts from a random graph and repeatedly joins each item's fresh
//! neighbors against its neighborhood, letting good edges propagate until
//! the change rate drops below `delta * n * k`. The threaded variant shards
//! the per-item work across a rayon pool and serializes neighbor-list
//! updates with one mutex per list, so both variants uphold the same
//! invariants even though exact iteration counts may differ.

use crate::brute::{BruteForce, BruteParams};
use crate::builder::{
    Callback, check_distinct_ids, invalid, make_rng, validate_delta, validate_k, validate_rho,
};
use crate::{Graph, GraphBuilder, Item, ItemId, Neighbor, NeighborList, Result, Similarity};
use rand::Rng;
use rand::rngs::StdRng;
use rayon::prelude::*;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};

/// Configuration for [`NnDescent`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NnDescentParams {
    /// Neighbor list capacity
    pub k: usize,
    /// Sampling rate in (0, 1]: each iteration joins `floor(rho * k)` fresh
    /// neighbors per item
    pub rho: f64,
    /// Early-termination rate in (0, 1): stop once an iteration changes at
    /// most `delta * n * k` list entries
    pub delta: f64,
    /// Hard iteration cap
    pub max_iterations: usize,
    /// Worker count; 0 uses every available core, 1 stays on the calling
    /// thread
    pub threads: usize,
    /// Fixes the random sampling for reproducible builds
    pub seed: Option<u64>,
}

impl Default for NnDescentParams {
    fn default() -> Self {
        Self {
            k: 10,
            rho: 0.5,
            delta: 0.001,
            max_iterations: 10,
            threads: 1,
            seed: None,
        }
    }
}

/// Approximate k-NN graph builder by local-join refinement.
pub struct NnDescent<T> {
    params: NnDescentParams,
    similarity: Arc<dyn Similarity<T>>,
    callback: Option<Callback>,
    computed: AtomicU64,
}

impl<T: Send + Sync> NnDescent<T> {
    pub fn new(params: NnDescentParams, similarity: Arc<dyn Similarity<T>>) -> Result<Self> {
        validate_k(params.k)?;
        validate_rho(params.rho)?;
        validate_delta(params.delta)?;
        if params.max_iterations == 0 {
            return Err(invalid("max_iterations", "must be at least 1"));
        }
        Ok(Self {
            params,
            similarity,
            callback: None,
            computed: AtomicU64::new(0),
        })
    }

    pub fn with_callback(mut self, callback: Callback) -> Self {
        self.callback = Some(callback);
        self
    }

    /// Build with this builder's own `k` and similarity.
    pub fn build(&self, items: Vec<Item<T>>) -> Result<Graph<T>> {
        self.build_with(items, self.params.k, Arc::clone(&self.similarity))
    }

    /// One refinement round. Returns the number of neighbor-list changes.
    #[allow(clippy::too_many_arguments)]
    fn iteration(
        &self,
        pool: Option<&rayon::ThreadPool>,
        rng: &mut StdRng,
        values: &[T],
        similarity: &dyn Similarity<T>,
        nls: &[Mutex<NeighborList>],
        processed: &[AtomicBool],
        rho_k: usize,
    ) -> usize {
        let n = values.len();
        let seed = self.params.seed;

        // partition every list into already-joined neighbors and a sample of
        // fresh ones; the sample is marked joined for the next round
        let split_one = |v: usize, rng: &mut StdRng| -> (Vec<usize>, Vec<usize>) {
            let mut joined = Vec::new();
            let mut fresh = Vec::new();
            for neighbor in lock(&nls[v]).iter() {
                let u = neighbor.id as usize;
                if processed[u].load(Ordering::Relaxed) {
                    joined.push(u);
                } else {
                    fresh.push(u);
                }
            }
            sample_down(&mut fresh, rho_k, rng);
            for &u in &fresh {
                processed[u].store(true, Ordering::Relaxed);
            }
            (joined, fresh)
        };
        let (mut old_lists, mut new_lists): (Vec<Vec<usize>>, Vec<Vec<usize>>) = match pool {
            None => (0..n).map(|v| split_one(v, rng)).unzip(),
            Some(pool) => pool.install(|| {
                (0..n)
                    .into_par_iter()
                    .map_init(
                        || {
                            let worker = rayon::current_thread_index().unwrap_or(0) as u64;
                            make_rng(seed.map(|s| s.wrapping_add(worker + 1)))
                        },
                        |rng, v| split_one(v, rng),
                    )
                    .unzip()
            }),
        };

        // reverse mappings: who lists v among their old / new neighbors
        let mut old_rev: Vec<Vec<usize>> = vec![Vec::new(); n];
        let mut new_rev: Vec<Vec<usize>> = vec![Vec::new(); n];
        for v in 0..n {
            for &u in &old_lists[v] {
                old_rev[u].push(v);
            }
            for &u in &new_lists[v] {
                new_rev[u].push(v);
            }
        }

        // extend both directions with a sample of the reverse neighbors
        for v in 0..n {
            let mut extra = std::mem::take(&mut old_rev[v]);
            sample_down(&mut extra, rho_k, rng);
            for u in extra {
                if u != v && !old_lists[v].contains(&u) {
                    old_lists[v].push(u);
                }
            }
            let mut extra = std::mem::take(&mut new_rev[v]);
            sample_down(&mut extra, rho_k, rng);
            for u in extra {
                if u != v && !new_lists[v].contains(&u) {
                    new_lists[v].push(u);
                }
            }
        }

        // local join: every fresh neighbor of v against new[u1] and old[v].
        // Indexing the fresh side by u1 rather than v is the historical
        // behavior of this algorithm's reference implementation and is kept
        // for reproducibility of iteration counts.
        let computed = AtomicU64::new(0);
        let changes = AtomicUsize::new(0);
        let join_one = |v: usize| {
            let mut local_computed = 0u64;
            let mut local_changes = 0usize;
            for &u1 in &new_lists[v] {
                for &u2 in new_lists[u1].iter().chain(old_lists[v].iter()) {
                    if u1 == u2 {
                        continue;
                    }
                    let s = similarity.similarity(&values[u1], &values[u2]);
                    local_computed += 1;
                    local_changes +=
                        usize::from(lock(&nls[u1]).insert(Neighbor::new(u2 as ItemId, s)));
                    local_changes +=
                        usize::from(lock(&nls[u2]).insert(Neighbor::new(u1 as ItemId, s)));
                }
            }
            computed.fetch_add(local_computed, Ordering::Relaxed);
            changes.fetch_add(local_changes, Ordering::Relaxed);
        };
        match pool {
            None => (0..n).for_each(join_one),
            Some(pool) => pool.install(|| (0..n).into_par_iter().for_each(join_one)),
        }

        self.computed
            .fetch_add(computed.load(Ordering::Relaxed), Ordering::Relaxed);
        changes.load(Ordering::Relaxed)
    }
}

impl<T: Send + Sync> GraphBuilder<T> for NnDescent<T> {
    fn build_with(
        &self,
        items: Vec<Item<T>>,
        k: usize,
        similarity: Arc<dyn Similarity<T>>,
    ) -> Result<Graph<T>> {
        validate_k(k)?;
        check_distinct_ids(&items)?;
        self.computed.store(0, Ordering::Relaxed);

        let n = items.len();
        if n <= k + 1 {
            // too few items to sample from: exact pairwise
            let brute = BruteForce::new(
                BruteParams {
                    k,
                    threads: 1,
                    ..Default::default()
                },
                Arc::clone(&similarity),
            )?;
            let graph = brute.build_with(items, k, similarity)?;
            self.computed
                .store(brute.computed_similarities(), Ordering::Relaxed);
            return Ok(graph);
        }

        let (ids, values): (Vec<ItemId>, Vec<T>) =
            items.into_iter().map(|it| (it.id, it.value)).unzip();
        let mut rng = make_rng(self.params.seed);
        let rho_k = (self.params.rho * k as f64).floor() as usize;

        // internal lists are keyed by dense index and start as k random
        // neighbors with their true similarities
        let nls: Vec<Mutex<NeighborList>> =
            (0..n).map(|_| Mutex::new(NeighborList::new(k))).collect();
        let mut computed = 0u64;
        for v in 0..n {
            let mut nl = lock(&nls[v]);
            let mut taken = 0;
            for u in rand::seq::index::sample(&mut rng, n, k + 1) {
                if u == v {
                    continue;
                }
                if taken == k {
                    break;
                }
                let s = similarity.similarity(&values[v], &values[u]);
                computed += 1;
                nl.insert(Neighbor::new(u as ItemId, s));
                taken += 1;
            }
        }
        self.computed.fetch_add(computed, Ordering::Relaxed);

        let processed: Vec<AtomicBool> = (0..n).map(|_| AtomicBool::new(false)).collect();
        let pool = match self.params.threads {
            1 => None,
            t => Some(
                rayon::ThreadPoolBuilder::new()
                    .num_threads(t)
                    .build()
                    .map_err(|e| invalid("threads", e.to_string()))?,
            ),
        };
        let termination = self.params.delta * n as f64 * k as f64;

        for iteration in 0..self.params.max_iterations {
            let changes = self.iteration(
                pool.as_ref(),
                &mut rng,
                &values,
                similarity.as_ref(),
                &nls,
                &processed,
                rho_k,
            );
            tracing::debug!(iteration, changes, "nn-descent iteration complete");
            if let Some(callback) = &self.callback {
                let mut data = HashMap::new();
                data.insert("builder", serde_json::json!("nn-descent"));
                data.insert("iteration", serde_json::json!(iteration));
                data.insert("changes", serde_json::json!(changes));
                data.insert(
                    "computed_similarities",
                    serde_json::json!(self.computed_similarities()),
                );
                callback(&data);
            }
            if changes as f64 <= termination {
                break;
            }
        }

        // remap dense indices back to caller ids
        let mut graph = Graph::new(k, similarity)?;
        for ((v, value), slot) in values.into_iter().enumerate().zip(nls) {
            let internal = slot.into_inner().unwrap_or_else(|e| e.into_inner());
            let mut nl = NeighborList::new(k);
            for neighbor in internal.iter() {
                nl.insert(Neighbor::new(ids[neighbor.id as usize], neighbor.similarity));
            }
            graph.put(Item::new(ids[v], value), nl);
        }
        Ok(graph)
    }

    fn computed_similarities(&self) -> u64 {
        self.computed.load(Ordering::Relaxed)
    }
}

fn lock(slot: &Mutex<NeighborList>) -> MutexGuard<'_, NeighborList> {
    slot.lock().unwrap_or_else(|e| e.into_inner())
}

/// Shrink `list` to `target` entries by random deletion.
fn sample_down(list: &mut Vec<usize>, target: usize, rng: &mut StdRng) {
    while list.len() > target {
        let at = rng.random_range(0..list.len());
        list.swap_remove(at);
    }
}
