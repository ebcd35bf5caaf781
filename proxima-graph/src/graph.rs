//! The graph container: one bounded neighbor list per item

use crate::{GraphError, Item, ItemId, NeighborList, Result, Similarity, Stats};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// A directed k-NN graph over items of type `T`.
///
/// Every resident item owns a [`NeighborList`] of capacity `k`. A neighbor id
/// may reference an item that is not resident (this happens for graphs merged
/// from LSH partitions); lookups of such ids return `None` and traversals
/// treat them as partition boundaries, never as errors.
///
/// The container itself is not synchronized: builders coordinate their own
/// workers and hand back a finished graph.
pub struct Graph<T> {
    pub(crate) k: usize,
    pub(crate) similarity: Arc<dyn Similarity<T>>,
    pub(crate) payloads: HashMap<ItemId, T>,
    pub(crate) lists: HashMap<ItemId, NeighborList>,
    pub(crate) window_size: usize,
    pub(crate) current_sequence: u64,
    pub(crate) sequences: HashMap<ItemId, u64>,
    pub(crate) stats: Stats,
}

impl<T> Graph<T> {
    /// Create an empty graph whose neighbor lists hold up to `k` entries.
    pub fn new(k: usize, similarity: Arc<dyn Similarity<T>>) -> Result<Self> {
        if k == 0 {
            return Err(GraphError::InvalidParameter {
                name: "k",
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(Self {
            k,
            similarity,
            payloads: HashMap::new(),
            lists: HashMap::new(),
            window_size: 0,
            current_sequence: 0,
            sequences: HashMap::new(),
            stats: Stats::default(),
        })
    }

    /// Neighbor list capacity shared by every item.
    pub fn k(&self) -> usize {
        self.k
    }

    /// Number of resident items.
    pub fn len(&self) -> usize {
        self.payloads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payloads.is_empty()
    }

    pub fn contains(&self, id: ItemId) -> bool {
        self.payloads.contains_key(&id)
    }

    /// The neighbor list of `id`, or `None` when the item is not resident.
    ///
    /// Absence is a cross-partition marker, never an error.
    pub fn get(&self, id: ItemId) -> Option<&NeighborList> {
        self.lists.get(&id)
    }

    /// The payload of `id`, if resident.
    pub fn payload(&self, id: ItemId) -> Option<&T> {
        self.payloads.get(&id)
    }

    /// Store an item together with its neighbor list, replacing any previous
    /// entry for the same id.
    pub fn put(&mut self, item: Item<T>, neighbors: NeighborList) {
        self.payloads.insert(item.id, item.value);
        self.lists.insert(item.id, neighbors);
    }

    /// Ids of all resident items, in no particular order.
    pub fn ids(&self) -> impl Iterator<Item = ItemId> + '_ {
        self.payloads.keys().copied()
    }

    /// All `(id, neighbor list)` entries, in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = (ItemId, &NeighborList)> {
        self.lists.iter().map(|(id, nl)| (*id, nl))
    }

    /// Drop every edge whose similarity is below `threshold`.
    pub fn prune(&mut self, threshold: f64) {
        for nl in self.lists.values_mut() {
            nl.prune(threshold);
        }
    }

    /// Number of retained items when sliding-window eviction is active
    /// (0 disables the window).
    pub fn window_size(&self) -> usize {
        self.window_size
    }

    pub fn set_window_size(&mut self, window_size: usize) {
        self.window_size = window_size;
    }

    /// Counters accumulated by searches and online maintenance.
    pub fn stats(&self) -> &Stats {
        &self.stats
    }
}

impl<T: Clone> Clone for Graph<T> {
    /// Deep copy: payloads and neighbor lists are cloned, counters start
    /// fresh.
    fn clone(&self) -> Self {
        Self {
            k: self.k,
            similarity: Arc::clone(&self.similarity),
            payloads: self.payloads.clone(),
            lists: self.lists.clone(),
            window_size: self.window_size,
            current_sequence: self.current_sequence,
            sequences: self.sequences.clone(),
            stats: Stats::default(),
        }
    }
}

impl<T> fmt::Debug for Graph<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Graph")
            .field("k", &self.k)
            .field("items", &self.payloads.len())
            .field("window_size", &self.window_size)
            .field("current_sequence", &self.current_sequence)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Neighbor;

    fn int_graph(k: usize) -> Graph<i64> {
        Graph::new(k, Arc::new(|a: &i64, b: &i64| 1.0 / (1.0 + (a - b).abs() as f64))).unwrap()
    }

    #[test]
    fn test_rejects_zero_k() {
        let result = Graph::new(0, Arc::new(|_: &i64, _: &i64| 0.0));
        assert!(matches!(
            result,
            Err(GraphError::InvalidParameter { name: "k", .. })
        ));
    }

    #[test]
    fn test_put_get_contains() {
        let mut graph = int_graph(3);
        assert!(graph.is_empty());
        assert!(graph.get(1).is_none());

        let mut nl = NeighborList::new(3);
        nl.insert(Neighbor::new(2, 0.5));
        graph.put(Item::new(1, 10), nl);

        assert_eq!(graph.len(), 1);
        assert!(graph.contains(1));
        assert_eq!(graph.payload(1), Some(&10));
        assert_eq!(graph.get(1).map(|nl| nl.len()), Some(1));
        // absent key is a marker, not an error
        assert!(graph.get(2).is_none());
    }

    #[test]
    fn test_clone_is_deep() {
        let mut graph = int_graph(2);
        let mut nl = NeighborList::new(2);
        nl.insert(Neighbor::new(2, 0.9));
        graph.put(Item::new(1, 10), nl);

        let mut copy = graph.clone();
        copy.put(Item::new(3, 30), NeighborList::new(2));
        copy.prune(1.0);

        assert_eq!(graph.len(), 1);
        assert_eq!(graph.get(1).map(|nl| nl.len()), Some(1));
        assert_eq!(copy.len(), 2);
        assert_eq!(copy.get(1).map(|nl| nl.len()), Some(0));
    }

    #[test]
    fn test_prune_threshold() {
        let mut graph = int_graph(4);
        let mut a = NeighborList::new(4);
        a.insert(Neighbor::new(2, 0.9));
        a.insert(Neighbor::new(3, 0.1));
        let mut b = NeighborList::new(4);
        b.insert(Neighbor::new(1, 0.5));
        b.insert(Neighbor::new(3, 0.05));
        graph.put(Item::new(1, 10), a);
        graph.put(Item::new(2, 20), b);

        graph.prune(0.2);

        let remaining: usize = graph.iter().map(|(_, nl)| nl.len()).sum();
        assert_eq!(remaining, 2);
    }
}
