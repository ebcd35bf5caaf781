//! Connectivity analysis over neighbor-list edges
//!
//! Edges into non-resident items (partition boundaries) are skipped by every
//! traversal here; they are markers, not errors.

use crate::{Graph, Item, ItemId};
use std::collections::{HashMap, HashSet};

impl<T> Graph<T> {
    /// Items reachable from `starting` through at most `depth` levels of
    /// neighbor-list edges. The starting items themselves are included.
    pub fn find_neighbors(&self, starting: &HashSet<ItemId>, depth: usize) -> HashSet<ItemId> {
        let mut reached: HashSet<ItemId> = starting.clone();
        let mut frontier: Vec<ItemId> = starting.iter().copied().collect();
        for _ in 0..depth {
            let mut next = Vec::new();
            for id in frontier {
                if let Some(nl) = self.lists.get(&id) {
                    for neighbor in nl.iter() {
                        if reached.insert(neighbor.id) {
                            next.push(neighbor.id);
                        }
                    }
                }
            }
            if next.is_empty() {
                break;
            }
            frontier = next;
        }
        reached
    }
}

impl<T: Clone> Graph<T> {
    /// Split the graph into weakly connected components: edges are treated
    /// as undirected and each component becomes its own deep-copied graph.
    pub fn connected_components(&self) -> Vec<Graph<T>> {
        let mut undirected: HashMap<ItemId, Vec<ItemId>> = HashMap::new();
        for (owner, nl) in &self.lists {
            for neighbor in nl.iter() {
                if self.payloads.contains_key(&neighbor.id) {
                    undirected.entry(*owner).or_default().push(neighbor.id);
                    undirected.entry(neighbor.id).or_default().push(*owner);
                }
            }
        }

        let mut ids: Vec<ItemId> = self.payloads.keys().copied().collect();
        ids.sort_unstable();

        let mut assigned: HashSet<ItemId> = HashSet::new();
        let mut components = Vec::new();
        for &root in &ids {
            if assigned.contains(&root) {
                continue;
            }
            let mut members = Vec::new();
            let mut queue = vec![root];
            assigned.insert(root);
            while let Some(id) = queue.pop() {
                members.push(id);
                if let Some(adjacent) = undirected.get(&id) {
                    for &other in adjacent {
                        if assigned.insert(other) {
                            queue.push(other);
                        }
                    }
                }
            }
            components.push(self.subgraph(&members));
        }
        components
    }

    /// Tarjan's strongly connected components, with an explicit stack in
    /// place of recursion. Each component becomes its own deep-copied graph.
    pub fn strongly_connected_components(&self) -> Vec<Graph<T>> {
        let mut ids: Vec<ItemId> = self.payloads.keys().copied().collect();
        ids.sort_unstable();
        let position: HashMap<ItemId, usize> =
            ids.iter().enumerate().map(|(i, id)| (*id, i)).collect();
        let n = ids.len();

        // resident successors only, as dense indices
        let successors: Vec<Vec<usize>> = ids
            .iter()
            .map(|id| match self.lists.get(id) {
                Some(nl) => nl
                    .iter()
                    .filter_map(|neighbor| position.get(&neighbor.id).copied())
                    .collect(),
                None => Vec::new(),
            })
            .collect();

        let mut discovery = vec![usize::MAX; n];
        let mut low = vec![0usize; n];
        let mut on_stack = vec![false; n];
        let mut stack: Vec<usize> = Vec::new();
        let mut next_discovery = 0usize;
        let mut components = Vec::new();

        for root in 0..n {
            if discovery[root] != usize::MAX {
                continue;
            }
            let mut frames: Vec<(usize, usize)> = vec![(root, 0)];
            while let Some(&mut (v, ref mut cursor)) = frames.last_mut() {
                if *cursor == 0 {
                    discovery[v] = next_discovery;
                    low[v] = next_discovery;
                    next_discovery += 1;
                    stack.push(v);
                    on_stack[v] = true;
                }
                if *cursor < successors[v].len() {
                    let w = successors[v][*cursor];
                    *cursor += 1;
                    if discovery[w] == usize::MAX {
                        frames.push((w, 0));
                    } else if on_stack[w] {
                        low[v] = low[v].min(discovery[w]);
                    }
                } else {
                    frames.pop();
                    if let Some(&(parent, _)) = frames.last() {
                        low[parent] = low[parent].min(low[v]);
                    }
                    if low[v] == discovery[v] {
                        let mut members = Vec::new();
                        loop {
                            let Some(w) = stack.pop() else { break };
                            on_stack[w] = false;
                            members.push(ids[w]);
                            if w == v {
                                break;
                            }
                        }
                        components.push(self.subgraph(&members));
                    }
                }
            }
        }
        components
    }

    /// Deep copy restricted to `members` (payloads and lists cloned as-is).
    fn subgraph(&self, members: &[ItemId]) -> Graph<T> {
        let mut sub = Graph {
            k: self.k,
            similarity: std::sync::Arc::clone(&self.similarity),
            payloads: HashMap::new(),
            lists: HashMap::new(),
            window_size: self.window_size,
            current_sequence: self.current_sequence,
            sequences: HashMap::new(),
            stats: crate::Stats::default(),
        };
        for &id in members {
            if let (Some(payload), Some(nl)) = (self.payloads.get(&id), self.lists.get(&id)) {
                sub.put(Item::new(id, payload.clone()), nl.clone());
            }
            if let Some(sequence) = self.sequences.get(&id) {
                sub.sequences.insert(id, *sequence);
            }
        }
        sub
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Neighbor, NeighborList, Similarity};
    use std::sync::Arc;

    fn flat_sim() -> Arc<dyn Similarity<i64>> {
        Arc::new(|_: &i64, _: &i64| 1.0)
    }

    /// Build a graph from explicit directed edges.
    fn directed(k: usize, nodes: &[ItemId], edges: &[(ItemId, ItemId)]) -> Graph<i64> {
        let mut graph = Graph::new(k, flat_sim()).unwrap();
        for &id in nodes {
            let mut nl = NeighborList::new(k);
            for &(from, to) in edges {
                if from == id {
                    nl.insert(Neighbor::new(to, 0.5));
                }
            }
            graph.put(Item::new(id, id as i64), nl);
        }
        graph
    }

    #[test]
    fn test_find_neighbors_depth_bounds() {
        // chain 1 -> 2 -> 3 -> 4
        let graph = directed(2, &[1, 2, 3, 4], &[(1, 2), (2, 3), (3, 4)]);
        let start: HashSet<ItemId> = [1].into_iter().collect();

        assert_eq!(graph.find_neighbors(&start, 0), start);
        let depth1 = graph.find_neighbors(&start, 1);
        assert_eq!(depth1, [1, 2].into_iter().collect());
        let depth3 = graph.find_neighbors(&start, 3);
        assert_eq!(depth3, [1, 2, 3, 4].into_iter().collect());
    }

    #[test]
    fn test_find_neighbors_skips_missing_lists() {
        let graph = directed(2, &[1, 2], &[(1, 9), (1, 2)]);
        let start: HashSet<ItemId> = [1].into_iter().collect();
        let reached = graph.find_neighbors(&start, 2);
        // 9 is reachable as an id even though it is not resident
        assert!(reached.contains(&9));
        assert!(reached.contains(&2));
    }

    #[test]
    fn test_two_weak_components() {
        // 1 <-> 2 and 3 <-> 4
        let graph = directed(2, &[1, 2, 3, 4], &[(1, 2), (2, 1), (3, 4), (4, 3)]);
        let components = graph.connected_components();

        assert_eq!(components.len(), 2);
        let mut sizes: Vec<usize> = components.iter().map(|c| c.len()).collect();
        sizes.sort_unstable();
        assert_eq!(sizes, vec![2, 2]);
    }

    #[test]
    fn test_one_directed_edge_still_weakly_connects() {
        let graph = directed(2, &[1, 2, 3], &[(1, 2)]);
        let components = graph.connected_components();
        let mut sizes: Vec<usize> = components.iter().map(|c| c.len()).collect();
        sizes.sort_unstable();
        assert_eq!(sizes, vec![1, 2]);
    }

    #[test]
    fn test_tarjan_components() {
        // cycle 1 -> 2 -> 3 -> 1, plus 4 -> 3
        let graph = directed(2, &[1, 2, 3, 4], &[(1, 2), (2, 3), (3, 1), (4, 3)]);
        let components = graph.strongly_connected_components();

        assert_eq!(components.len(), 2);
        let mut sizes: Vec<usize> = components.iter().map(|c| c.len()).collect();
        sizes.sort_unstable();
        assert_eq!(sizes, vec![1, 3]);

        let cycle = components.iter().find(|c| c.len() == 3).unwrap();
        for id in [1, 2, 3] {
            assert!(cycle.contains(id));
        }
        let single = components.iter().find(|c| c.len() == 1).unwrap();
        assert!(single.contains(4));
    }

    #[test]
    fn test_tarjan_tolerates_cross_partition_edges() {
        // 2's list points at a non-resident id
        let graph = directed(2, &[1, 2], &[(1, 2), (2, 1), (2, 77)]);
        let components = graph.strongly_connected_components();
        assert_eq!(components.len(), 1);
        assert_eq!(components[0].len(), 2);
    }

    #[test]
    fn test_subgraphs_are_deep_copies() {
        let graph = directed(2, &[1, 2], &[(1, 2), (2, 1)]);
        let mut components = graph.connected_components();
        let component = components.pop().unwrap();
        assert_eq!(component.k(), graph.k());
        assert!(component.get(1).unwrap().contains(2));
    }
}
