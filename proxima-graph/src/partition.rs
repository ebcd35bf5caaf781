//! LSH-partitioned graph construction
//!
//! Items are bucketed per stage by a locality-sensitive hash family; an
//! inner builder runs on every non-empty bucket and the per-bucket neighbor
//! lists are merged by insertion, which keeps only improvements. The merged
//! graph is conservative: an item's final list is always drawn from the
//! lists the inner builder produced for that item across its buckets.

use crate::brute::{BruteForce, BruteParams};
use crate::builder::{Callback, check_distinct_ids, validate_k};
use crate::{Graph, GraphBuilder, Item, NeighborList, Result, Similarity};
use proxima_lsh::LshFamily;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Approximate k-NN graph builder over LSH buckets.
///
/// The number of stages and partitions is carried by the hash family; the
/// inner builder defaults to exact brute force and can be replaced by any
/// other [`GraphBuilder`], including a nested partitioner.
pub struct Partitioning<T, H> {
    k: usize,
    family: H,
    inner: Box<dyn GraphBuilder<T>>,
    similarity: Arc<dyn Similarity<T>>,
    callback: Option<Callback>,
    computed: AtomicU64,
    speedup_bits: AtomicU64,
}

impl<T, H> Partitioning<T, H>
where
    T: Clone + Send + Sync + 'static,
    H: LshFamily<T> + Send + Sync,
{
    pub fn new(k: usize, family: H, similarity: Arc<dyn Similarity<T>>) -> Result<Self> {
        validate_k(k)?;
        let inner = Box::new(BruteForce::new(
            BruteParams {
                k,
                ..Default::default()
            },
            Arc::clone(&similarity),
        )?);
        Ok(Self {
            k,
            family,
            inner,
            similarity,
            callback: None,
            computed: AtomicU64::new(0),
            speedup_bits: AtomicU64::new(1.0f64.to_bits()),
        })
    }

    /// Replace the per-bucket builder.
    pub fn with_inner(mut self, inner: Box<dyn GraphBuilder<T>>) -> Self {
        self.inner = inner;
        self
    }

    pub fn with_callback(mut self, callback: Callback) -> Self {
        self.callback = Some(callback);
        self
    }

    /// Build with this builder's own `k` and similarity.
    pub fn build(&self, items: Vec<Item<T>>) -> Result<Graph<T>> {
        self.build_with(items, self.k, Arc::clone(&self.similarity))
    }

    /// `n / average bucket size` of the most recent build: the factor by
    /// which the pair space shrank compared to a full pairwise pass.
    pub fn estimated_speedup(&self) -> f64 {
        f64::from_bits(self.speedup_bits.load(Ordering::Relaxed))
    }
}

impl<T, H> GraphBuilder<T> for Partitioning<T, H>
where
    T: Clone + Send + Sync + 'static,
    H: LshFamily<T> + Send + Sync,
{
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
        // one hash per item, reused across stages
        let stage_buckets: Vec<Vec<usize>> = items
            .iter()
            .map(|item| self.family.hash(&item.value))
            .collect();

        let mut graph = Graph::new(k, similarity.clone())?;
        for item in &items {
            graph.put(item.clone(), NeighborList::new(k));
        }

        let mut bucket_count = 0usize;
        let mut bucket_total = 0usize;
        for stage in 0..self.family.stages() {
            let mut buckets: HashMap<usize, Vec<Item<T>>> = HashMap::new();
            for (item, hashes) in items.iter().zip(&stage_buckets) {
                buckets.entry(hashes[stage]).or_default().push(item.clone());
            }

            let mut occupied: Vec<usize> = buckets.keys().copied().collect();
            occupied.sort_unstable();
            for bucket in occupied {
                let members = buckets.remove(&bucket).unwrap_or_default();
                let size = members.len();
                if size < 2 {
                    continue;
                }
                bucket_count += 1;
                bucket_total += size;

                let sub = self.inner.build_with(members, k, Arc::clone(&similarity))?;
                self.computed
                    .fetch_add(self.inner.computed_similarities(), Ordering::Relaxed);
                for (id, nl) in sub.iter() {
                    if let Some(target) = graph.lists.get_mut(&id) {
                        for neighbor in nl.iter() {
                            target.insert(*neighbor);
                        }
                    }
                }

                tracing::debug!(stage, bucket, size, "bucket merged");
                if let Some(callback) = &self.callback {
                    let mut data = HashMap::new();
                    data.insert("builder", serde_json::json!("partitioning"));
                    data.insert("stage", serde_json::json!(stage));
                    data.insert("bucket", serde_json::json!(bucket));
                    data.insert("size", serde_json::json!(size));
                    callback(&data);
                }
            }
        }

        let speedup = if bucket_count == 0 {
            1.0
        } else {
            n as f64 / (bucket_total as f64 / bucket_count as f64)
        };
        self.speedup_bits.store(speedup.to_bits(), Ordering::Relaxed);
        Ok(graph)
    }

    fn computed_similarities(&self) -> u64 {
        self.computed.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ItemId;
    use std::collections::{HashMap, HashSet};

    fn abs_sim() -> Arc<dyn Similarity<i64>> {
        Arc::new(|a: &i64, b: &i64| 1.0 / (1.0 + (a - b).abs() as f64))
    }

    /// Deterministic stand-in for a real LSH family.
    struct ModuloFamily {
        stages: usize,
        partitions: usize,
    }

    impl LshFamily<i64> for ModuloFamily {
        fn stages(&self) -> usize {
            self.stages
        }

        fn partitions(&self) -> usize {
            self.partitions
        }

        fn hash(&self, value: &i64) -> Vec<usize> {
            (0..self.stages)
                .map(|s| ((*value >> (2 * s)) as usize) % self.partitions)
                .collect()
        }
    }

    fn items(values: &[i64]) -> Vec<Item<i64>> {
        values
            .iter()
            .enumerate()
            .map(|(i, &v)| Item::new(i as ItemId, v))
            .collect()
    }

    #[test]
    fn test_all_items_present_with_invariants() {
        let values: Vec<i64> = (0..80).map(|i| i * 3).collect();
        let family = ModuloFamily {
            stages: 3,
            partitions: 4,
        };
        let builder = Partitioning::new(4, family, abs_sim()).unwrap();
        let graph = builder.build(items(&values)).unwrap();

        assert_eq!(graph.len(), 80);
        for (id, nl) in graph.iter() {
            assert_eq!(nl.capacity(), 4);
            assert!(!nl.contains(id), "self edge on {id}");
        }
        assert!(builder.computed_similarities() > 0);
        assert!(builder.estimated_speedup() > 1.0);
    }

    #[test]
    fn test_merge_is_conservative() {
        let values: Vec<i64> = (0..60).map(|i| i * 5 + (i % 7)).collect();
        let all = items(&values);
        let family = ModuloFamily {
            stages: 2,
            partitions: 3,
        };

        let builder = Partitioning::new(3, family, abs_sim()).unwrap();
        let graph = builder.build(all.clone()).unwrap();

        // replay the bucketing by hand and collect, per item, the union of
        // neighbor ids the inner builder could have produced
        let family = ModuloFamily {
            stages: 2,
            partitions: 3,
        };
        let mut union: HashMap<ItemId, HashSet<ItemId>> = HashMap::new();
        for stage in 0..family.stages() {
            let mut buckets: HashMap<usize, Vec<Item<i64>>> = HashMap::new();
            for item in &all {
                buckets
                    .entry(family.hash(&item.value)[stage])
                    .or_default()
                    .push(item.clone());
            }
            for members in buckets.into_values() {
                if members.len() < 2 {
                    continue;
                }
                let sub = BruteForce::new(
                    BruteParams {
                        k: 3,
                        threads: 1,
                        ..Default::default()
                    },
                    abs_sim(),
                )
                .unwrap()
                .build(members)
                .unwrap();
                for (id, nl) in sub.iter() {
                    union.entry(id).or_default().extend(nl.ids());
                }
            }
        }

        for (id, nl) in graph.iter() {
            let allowed = union.get(&id).cloned().unwrap_or_default();
            for neighbor in nl.iter() {
                assert!(
                    allowed.contains(&neighbor.id),
                    "item {id} gained neighbor {} from outside its buckets",
                    neighbor.id
                );
            }
        }
    }

    #[test]
    fn test_nested_inner_builder() {
        use crate::nndescent::{NnDescent, NnDescentParams};

        let values: Vec<i64> = (0..90).map(|i| i * 11).collect();
        let family = ModuloFamily {
            stages: 2,
            partitions: 2,
        };
        let inner = NnDescent::new(
            NnDescentParams {
                k: 4,
                seed: Some(3),
                ..Default::default()
            },
            abs_sim(),
        )
        .unwrap();
        let builder = Partitioning::new(4, family, abs_sim())
            .unwrap()
            .with_inner(Box::new(inner));
        let graph = builder.build(items(&values)).unwrap();

        assert_eq!(graph.len(), 90);
        for (id, nl) in graph.iter() {
            assert!(nl.len() <= 4);
            assert!(!nl.contains(id));
        }
    }

    #[test]
    fn test_singleton_buckets_are_skipped() {
        // partitions > n: most buckets hold a single item
        let family = ModuloFamily {
            stages: 1,
            partitions: 64,
        };
        let builder = Partitioning::new(2, family, abs_sim()).unwrap();
        let graph = builder.build(items(&[1, 2, 3])).unwrap();
        assert_eq!(graph.len(), 3);
    }
}
