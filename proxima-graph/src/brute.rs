//! Exact graph construction by pairwise evaluation
//!
//! The parallel path tiles the lower triangle of the n x n pair matrix into
//! square blocks, maps each block to a partial set of neighbor lists on a
//! rayon pool, and merges the partials in a single aggregation pass. Because
//! neighbor-list insertion is associative and idempotent, merging overlapping
//! partials yields the same top-k as a single sequential sweep.

use crate::builder::{Callback, check_distinct_ids, invalid, validate_k};
use crate::{Graph, GraphBuilder, Item, ItemId, Neighbor, NeighborList, Result, Similarity};
use rayon::prelude::*;
use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Configuration for [`BruteForce`]
#[derive(Debug, Clone)]
pub struct BruteParams {
    /// Neighbor list capacity
    pub k: usize,
    /// Side length of the square blocks handed to workers
    pub block_size: usize,
    /// Worker count; 0 uses every available core, 1 stays on the calling
    /// thread
    pub threads: usize,
}

impl Default for BruteParams {
    fn default() -> Self {
        Self {
            k: 10,
            block_size: 1000,
            threads: 0,
        }
    }
}

/// Exact k-NN graph builder.
///
/// Evaluates every unordered pair once; the result is the mathematically
/// exact k-NN graph for the supplied similarity. Used directly for small
/// collections and as the default inner builder of the LSH partitioner.
pub struct BruteForce<T> {
    params: BruteParams,
    similarity: Arc<dyn Similarity<T>>,
    callback: Option<Callback>,
    computed: AtomicU64,
}

impl<T: Send + Sync> BruteForce<T> {
    pub fn new(params: BruteParams, similarity: Arc<dyn Similarity<T>>) -> Result<Self> {
        validate_k(params.k)?;
        if params.block_size == 0 {
            return Err(invalid("block_size", "must be at least 1"));
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

    /// Similarities for one block of the lower triangle.
    ///
    /// Block `(row, col)` covers items `row*b..` against `col*b..`; the
    /// diagonal blocks restrict themselves to `i > j` so every unordered
    /// pair is evaluated exactly once across all blocks.
    fn block_partial(
        &self,
        values: &[T],
        similarity: &dyn Similarity<T>,
        k: usize,
        row: usize,
        col: usize,
    ) -> HashMap<usize, NeighborList> {
        let b = self.params.block_size;
        let n = values.len();
        let row_range = row * b..((row + 1) * b).min(n);
        let col_range = col * b..((col + 1) * b).min(n);

        let mut partial: HashMap<usize, NeighborList> = HashMap::new();
        let mut computed = 0u64;
        for i in row_range {
            for j in col_range.clone() {
                if row == col && j >= i {
                    break;
                }
                let s = similarity.similarity(&values[i], &values[j]);
                computed += 1;
                partial
                    .entry(i)
                    .or_insert_with(|| NeighborList::new(k))
                    .insert(Neighbor::new(j as ItemId, s));
                partial
                    .entry(j)
                    .or_insert_with(|| NeighborList::new(k))
                    .insert(Neighbor::new(i as ItemId, s));
            }
        }
        self.computed.fetch_add(computed, Ordering::Relaxed);
        partial
    }
}

impl<T: Send + Sync> GraphBuilder<T> for BruteForce<T> {
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
        let (ids, values): (Vec<ItemId>, Vec<T>) =
            items.into_iter().map(|it| (it.id, it.value)).unzip();

        let b = self.params.block_size;
        let blocks: Vec<(usize, usize)> = (0..n.div_ceil(b))
            .flat_map(|row| (0..=row).map(move |col| (row, col)))
            .collect();

        // each partial keys neighbor lists by dense index; remapped to real
        // ids during aggregation
        let partials: Vec<Option<HashMap<usize, NeighborList>>> = if self.params.threads == 1 {
            blocks
                .iter()
                .map(|&(row, col)| {
                    Some(self.block_partial(&values, similarity.as_ref(), k, row, col))
                })
                .collect()
        } else {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(self.params.threads)
                .build()
                .map_err(|e| invalid("threads", e.to_string()))?;
            pool.install(|| {
                blocks
                    .par_iter()
                    .map(|&(row, col)| {
                        catch_unwind(AssertUnwindSafe(|| {
                            self.block_partial(&values, similarity.as_ref(), k, row, col)
                        }))
                        .map_err(|_| {
                            tracing::error!(row, col, "brute-force worker failed; block discarded");
                        })
                        .ok()
                    })
                    .collect()
            })
        };

        let mut graph = Graph::new(k, similarity)?;
        for (id, value) in ids.iter().zip(values) {
            graph.put(Item::new(*id, value), NeighborList::new(k));
        }
        for partial in partials.into_iter().flatten() {
            for (idx, nl) in partial {
                if let Some(target) = graph.lists.get_mut(&ids[idx]) {
                    for neighbor in nl.iter() {
                        target.insert(Neighbor::new(ids[neighbor.id as usize], neighbor.similarity));
                    }
                }
            }
        }

        if let Some(callback) = &self.callback {
            let mut data = HashMap::new();
            data.insert("builder", serde_json::json!("brute"));
            data.insert("nodes", serde_json::json!(n));
            data.insert(
                "computed_similarities",
                serde_json::json!(self.computed_similarities()),
            );
            callback(&data);
        }

        Ok(graph)
    }

    fn computed_similarities(&self) -> u64 {
        self.computed.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn abs_sim() -> Arc<dyn Similarity<i64>> {
        Arc::new(|a: &i64, b: &i64| 1.0 / (1.0 + (a - b).abs() as f64))
    }

    fn items(values: &[i64]) -> Vec<Item<i64>> {
        values
            .iter()
            .enumerate()
            .map(|(i, &v)| Item::new(i as ItemId, v))
            .collect()
    }

    #[test]
    fn test_exact_graph_small() {
        let builder = BruteForce::new(
            BruteParams {
                k: 3,
                threads: 1,
                ..Default::default()
            },
            abs_sim(),
        )
        .unwrap();
        let graph = builder.build(items(&[0, 10, 20, 30, 40])).unwrap();

        // item 0 -> [10, 20, 30]
        let nl: Vec<Neighbor> = graph.get(0).unwrap().iter().copied().collect();
        assert_eq!(nl[0].id, 1);
        assert!((nl[0].similarity - 1.0 / 11.0).abs() < 1e-12);
        assert_eq!(nl[1].id, 2);
        assert!((nl[1].similarity - 1.0 / 21.0).abs() < 1e-12);
        assert_eq!(nl[2].id, 3);
        assert!((nl[2].similarity - 1.0 / 31.0).abs() < 1e-12);

        // item 40 mirrors by symmetry
        let nl: Vec<ItemId> = graph.get(4).unwrap().ids().collect();
        assert_eq!(nl, vec![3, 2, 1]);

        // every unordered pair evaluated once
        assert_eq!(builder.computed_similarities(), 10);
    }

    #[test]
    fn test_no_self_edges_and_capacity() {
        let builder = BruteForce::new(
            BruteParams {
                k: 4,
                threads: 1,
                ..Default::default()
            },
            abs_sim(),
        )
        .unwrap();
        let values: Vec<i64> = (0..20).map(|i| i * 7).collect();
        let graph = builder.build(items(&values)).unwrap();

        for (id, nl) in graph.iter() {
            assert!(!nl.contains(id), "self edge on {id}");
            assert_eq!(nl.capacity(), 4);
            assert_eq!(nl.len(), 4);
        }
    }

    #[test]
    fn test_parallel_blocks_match_sequential() {
        use rand::Rng;
        // wide value range keeps all pairwise differences distinct, so the
        // exact top-k is unique and insertion order cannot matter
        let mut rng = crate::builder::make_rng(Some(404));
        let values: Vec<i64> = (0..120).map(|_| rng.random_range(0..1i64 << 40)).collect();

        let sequential = BruteForce::new(
            BruteParams {
                k: 5,
                threads: 1,
                ..Default::default()
            },
            abs_sim(),
        )
        .unwrap()
        .build(items(&values))
        .unwrap();

        // small blocks force a multi-block decomposition
        let parallel = BruteForce::new(
            BruteParams {
                k: 5,
                block_size: 16,
                threads: 4,
            },
            abs_sim(),
        )
        .unwrap()
        .build(items(&values))
        .unwrap();

        for id in sequential.ids() {
            let a: Vec<ItemId> = sequential.get(id).unwrap().ids().collect();
            let b: Vec<ItemId> = parallel.get(id).unwrap().ids().collect();
            assert_eq!(a, b, "neighbor lists diverge for item {id}");
        }
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let builder = BruteForce::new(BruteParams::default(), abs_sim()).unwrap();
        let result = builder.build(vec![Item::new(1, 5), Item::new(1, 6)]);
        assert!(matches!(result, Err(crate::GraphError::DuplicateItem(1))));
    }

    #[test]
    fn test_single_item_graph() {
        let builder = BruteForce::new(BruteParams::default(), abs_sim()).unwrap();
        let graph = builder.build(vec![Item::new(9, 5)]).unwrap();
        assert_eq!(graph.len(), 1);
        assert_eq!(graph.get(9).map(|nl| nl.len()), Some(0));
    }
}
