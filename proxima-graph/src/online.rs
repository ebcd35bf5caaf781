//! Online graph maintenance
//!
//! Incremental insertion and removal with a bounded update radius: a new
//! item finds its own neighbor list with a graph-navigated search, then a
//! shallow BFS around the landing zone gives nearby lists the chance to
//! adopt it. Removal repairs the orphaned lists from BFS-gathered
//! replacement candidates. With a window size set, the graph keeps only the
//! most recently added items, evicting the oldest on every fast add.

use crate::search::SearchParams;
use crate::stats::SimScope;
use crate::{Graph, GraphError, Item, ItemId, Neighbor, NeighborList, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Knobs for [`Graph::fast_add`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddParams {
    /// BFS levels expanded from the new item's neighbors when updating
    /// nearby lists
    pub update_depth: usize,
    /// Parameters of the neighbor-locating search
    pub search: SearchParams,
}

impl Default for AddParams {
    fn default() -> Self {
        Self {
            update_depth: 2,
            search: SearchParams::default(),
        }
    }
}

/// Knobs for [`Graph::fast_remove`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoveParams {
    /// BFS levels expanded when gathering replacement candidates
    pub update_depth: usize,
}

impl Default for RemoveParams {
    fn default() -> Self {
        Self { update_depth: 2 }
    }
}

impl<T: Send + Sync> Graph<T> {
    /// Insert an item exhaustively: its similarity to every resident item is
    /// evaluated and both endpoints of every edge get an insertion attempt.
    ///
    /// Fails with [`GraphError::DuplicateItem`] (leaving the graph untouched)
    /// when the id is already resident.
    pub fn add(&mut self, item: Item<T>) -> Result<()> {
        if self.payloads.contains_key(&item.id) {
            return Err(GraphError::DuplicateItem(item.id));
        }

        let scored: Vec<(ItemId, f64)> = self
            .payloads
            .iter()
            .map(|(id, payload)| {
                self.stats.record_similarity(SimScope::Add);
                (*id, self.similarity.similarity(&item.value, payload))
            })
            .collect();

        let mut nl = NeighborList::new(self.k);
        for (id, s) in scored {
            nl.insert(Neighbor::new(id, s));
            if let Some(other) = self.lists.get_mut(&id) {
                other.insert(Neighbor::new(item.id, s));
            }
        }

        self.register(item, nl);
        Ok(())
    }

    /// Insert an item approximately: a graph-navigated search locates its
    /// neighbor list, then every item within `update_depth` BFS levels of
    /// those neighbors gets one chance to adopt the newcomer.
    ///
    /// With a window size set, the oldest resident item is evicted first.
    pub fn fast_add(&mut self, item: Item<T>, params: &AddParams) -> Result<()> {
        if self.payloads.contains_key(&item.id) {
            return Err(GraphError::DuplicateItem(item.id));
        }
        params.search.validate()?;

        while self.window_size > 0 && self.payloads.len() >= self.window_size {
            let Some(oldest) = self
                .sequences
                .iter()
                .min_by_key(|(_, sequence)| **sequence)
                .map(|(id, _)| *id)
            else {
                break;
            };
            self.fast_remove(
                oldest,
                &RemoveParams {
                    update_depth: params.update_depth,
                },
            )?;
        }

        let nl = self.search_scoped(&item.value, self.k, &params.search, SimScope::Add)?;

        let starting: HashSet<ItemId> = nl.ids().collect();
        let touched = self.find_neighbors(&starting, params.update_depth);
        let scored: Vec<(ItemId, f64)> = touched
            .iter()
            .filter(|&&id| id != item.id)
            .filter_map(|&id| {
                let payload = self.payloads.get(&id)?;
                self.stats.record_similarity(SimScope::Add);
                Some((id, self.similarity.similarity(&item.value, payload)))
            })
            .collect();
        for (id, s) in scored {
            if let Some(other) = self.lists.get_mut(&id) {
                other.insert(Neighbor::new(item.id, s));
            }
        }

        self.register(item, nl);
        Ok(())
    }

    /// Remove an item and repair every list that referenced it.
    ///
    /// Replacement candidates come from a BFS of `update_depth` levels
    /// around the removed item and the orphaned lists.
    pub fn fast_remove(&mut self, id: ItemId, params: &RemoveParams) -> Result<()> {
        if !self.payloads.contains_key(&id) {
            return Err(GraphError::NotFound(id));
        }

        let mut orphaned: Vec<ItemId> = Vec::new();
        for (owner, nl) in self.lists.iter_mut() {
            if nl.remove(id) {
                orphaned.push(*owner);
            }
        }

        let mut starting: HashSet<ItemId> = orphaned.iter().copied().collect();
        starting.insert(id);
        let mut candidates = self.find_neighbors(&starting, params.update_depth);
        candidates.remove(&id);

        for owner in orphaned {
            let Some(owner_payload) = self.payloads.get(&owner) else {
                continue;
            };
            let scored: Vec<Neighbor> = candidates
                .iter()
                .filter(|&&candidate| candidate != owner)
                .filter_map(|&candidate| {
                    let payload = self.payloads.get(&candidate)?;
                    self.stats.record_similarity(SimScope::Remove);
                    Some(Neighbor::new(
                        candidate,
                        self.similarity.similarity(owner_payload, payload),
                    ))
                })
                .collect();
            if let Some(nl) = self.lists.get_mut(&owner) {
                for neighbor in scored {
                    nl.insert(neighbor);
                }
            }
        }

        self.payloads.remove(&id);
        self.lists.remove(&id);
        self.sequences.remove(&id);
        Ok(())
    }

    /// Store the item, stamping it with the next sequence number.
    fn register(&mut self, item: Item<T>, nl: NeighborList) {
        self.sequences.insert(item.id, self.current_sequence);
        self.current_sequence += 1;
        self.payloads.insert(item.id, item.value);
        self.lists.insert(item.id, nl);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Similarity;
    use crate::brute::{BruteForce, BruteParams};
    use std::sync::Arc;

    fn abs_sim() -> Arc<dyn Similarity<i64>> {
        Arc::new(|a: &i64, b: &i64| 1.0 / (1.0 + (a - b).abs() as f64))
    }

    fn built_graph(values: &[i64], k: usize) -> Graph<i64> {
        let items: Vec<Item<i64>> = values
            .iter()
            .enumerate()
            .map(|(i, &v)| Item::new(i as ItemId, v))
            .collect();
        BruteForce::new(
            BruteParams {
                k,
                threads: 1,
                ..Default::default()
            },
            abs_sim(),
        )
        .unwrap()
        .build(items)
        .unwrap()
    }

    #[test]
    fn test_add_links_both_directions() {
        let mut graph = built_graph(&[0, 10, 20, 30], 2);
        graph.add(Item::new(100, 11)).unwrap();

        // the newcomer knows its neighbors
        let nl: Vec<ItemId> = graph.get(100).unwrap().ids().collect();
        assert_eq!(nl[0], 1, "10 is the closest item to 11");

        // and its closest neighbor adopted it
        assert!(graph.get(1).unwrap().contains(100));
        assert_eq!(graph.stats().add_similarities(), 4);
    }

    #[test]
    fn test_add_duplicate_fails_without_mutation() {
        let mut graph = built_graph(&[0, 10, 20], 2);
        let before = graph.len();
        let result = graph.add(Item::new(1, 99));
        assert!(matches!(result, Err(GraphError::DuplicateItem(1))));
        assert_eq!(graph.len(), before);
        assert_eq!(graph.payload(1), Some(&10));
    }

    #[test]
    fn test_fast_add_small_graph_matches_exhaustive_shape() {
        // with n <= k the locating search degrades to an exact scan, so the
        // landing list is deterministic
        let mut graph = built_graph(&[0, 10, 20], 3);
        graph.fast_add(Item::new(200, 21), &AddParams::default()).unwrap();

        assert!(graph.contains(200));
        let nl = graph.get(200).unwrap();
        assert!(nl.len() <= 3);
        assert_eq!(nl.ids().next(), Some(2), "21 lands next to 20");
        assert!(!nl.contains(200), "no self edge");

        // nearby lists adopted the newcomer
        assert!(graph.get(2).unwrap().contains(200));
    }

    #[test]
    fn test_fast_add_duplicate_fails() {
        let mut graph = built_graph(&[0, 10, 20], 2);
        let result = graph.fast_add(Item::new(2, 99), &AddParams::default());
        assert!(matches!(result, Err(GraphError::DuplicateItem(2))));
    }

    #[test]
    fn test_fast_remove_leaves_no_dangling_references() {
        let mut graph = built_graph(&(0..30).map(|i| i * 4).collect::<Vec<_>>(), 5);
        graph.fast_remove(7, &RemoveParams::default()).unwrap();

        assert!(!graph.contains(7));
        for (_, nl) in graph.iter() {
            assert!(!nl.contains(7), "dangling reference to removed item");
        }
        assert!(graph.stats().remove_similarities() > 0);
    }

    #[test]
    fn test_fast_remove_repairs_orphaned_lists() {
        let mut graph = built_graph(&(0..30).map(|i| i * 4).collect::<Vec<_>>(), 5);
        let orphans: Vec<ItemId> = graph
            .iter()
            .filter(|(_, nl)| nl.contains(7))
            .map(|(id, _)| id)
            .collect();
        assert!(!orphans.is_empty());

        graph.fast_remove(7, &RemoveParams::default()).unwrap();

        for id in orphans {
            // repaired back to capacity from nearby candidates
            assert_eq!(graph.get(id).unwrap().len(), 5);
        }
    }

    #[test]
    fn test_fast_remove_absent_is_an_error() {
        let mut graph = built_graph(&[0, 10], 1);
        assert!(matches!(
            graph.fast_remove(42, &RemoveParams::default()),
            Err(GraphError::NotFound(42))
        ));
    }

    #[test]
    fn test_sliding_window_keeps_last_w_items() {
        let mut graph: Graph<i64> = Graph::new(2, abs_sim()).unwrap();
        graph.set_window_size(3);

        for i in 0..10u64 {
            graph
                .fast_add(Item::new(i, i as i64 * 5), &AddParams::default())
                .unwrap();
            assert!(graph.len() <= 3);
        }

        let mut resident: Vec<ItemId> = graph.ids().collect();
        resident.sort_unstable();
        assert_eq!(resident, vec![7, 8, 9]);
    }

    #[test]
    fn test_window_disabled_keeps_everything() {
        let mut graph: Graph<i64> = Graph::new(2, abs_sim()).unwrap();
        for i in 0..6u64 {
            graph
                .fast_add(Item::new(i, i as i64), &AddParams::default())
                .unwrap();
        }
        assert_eq!(graph.len(), 6);
    }
}
