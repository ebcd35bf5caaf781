//! Graph-navigated approximate search
//!
//! GNNS-style hill climbing: restart from a random item, greedily adopt the
//! first better candidate among a few random long jumps and the current
//! item's neighbors, and keep restarting until the similarity budget runs
//! out. The answer is the best `count` items seen anywhere along the way.

use crate::builder::{invalid, make_rng};
use crate::stats::SimScope;
use crate::{Graph, ItemId, Neighbor, NeighborList, Result};
use rand::Rng;
use rand::rngs::StdRng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Knobs for [`Graph::search`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchParams {
    /// Target cost reduction over an exhaustive scan; the similarity budget
    /// is `floor(n / speedup)`. Must be greater than 1.
    pub speedup: f64,
    /// Random unvisited items probed before the neighbors at each descent
    /// step
    pub long_jumps: usize,
    /// Seed filter: a restart whose similarity is below
    /// `best_so_far / expansion` is abandoned immediately. Must be greater
    /// than 1.
    pub expansion: f64,
    /// Fixes restart and jump choices for reproducible searches
    pub seed: Option<u64>,
}

impl Default for SearchParams {
    fn default() -> Self {
        Self {
            speedup: 4.0,
            long_jumps: 2,
            expansion: 1.2,
            seed: None,
        }
    }
}

impl SearchParams {
    pub(crate) fn validate(&self) -> Result<()> {
        if !(self.speedup > 1.0) {
            return Err(invalid("speedup", format!("{} is not above 1", self.speedup)));
        }
        if !(self.expansion > 1.0) {
            return Err(invalid(
                "expansion",
                format!("{} is not above 1", self.expansion),
            ));
        }
        Ok(())
    }
}

impl<T: Send + Sync> Graph<T> {
    /// Approximate the `count` most similar resident items to `query`.
    ///
    /// Spends at most `floor(n / speedup)` similarity evaluations; with a
    /// budget (or `count`) covering the whole graph it degrades to an exact
    /// exhaustive scan. Never fails on a degraded graph: exhausting the
    /// budget returns the best-effort result.
    pub fn search(&self, query: &T, count: usize, params: &SearchParams) -> Result<NeighborList> {
        self.search_scoped(query, count, params, SimScope::Search)
    }

    pub(crate) fn search_scoped(
        &self,
        query: &T,
        count: usize,
        params: &SearchParams,
        scope: SimScope,
    ) -> Result<NeighborList> {
        params.validate()?;
        if count == 0 {
            return Err(invalid("count", "must be at least 1"));
        }

        let n = self.payloads.len();
        if n == 0 {
            return Ok(NeighborList::new(count));
        }
        let budget = (n as f64 / params.speedup).floor() as usize;
        if count >= n || budget >= n {
            return Ok(self.search_exhaustive(query, count, scope));
        }

        let mut ids: Vec<ItemId> = self.payloads.keys().copied().collect();
        ids.sort_unstable();
        let mut rng = make_rng(params.seed);
        let mut visited: HashMap<ItemId, f64> = HashMap::new();
        let mut used = 0usize;
        let mut global_best = 0.0f64;

        'outer: while used < budget && visited.len() < n {
            let Some(start) = random_unvisited(&mut rng, &ids, &visited) else {
                break;
            };
            self.stats.record_restart();
            let mut cur = start;
            let Some(mut s) = self.eval(query, cur, scope) else {
                break;
            };
            used += 1;
            visited.insert(cur, s);
            if global_best > 0.0 && s < global_best / params.expansion {
                // poor seed; a descent from here is unlikely to pay off
                continue;
            }

            loop {
                let mut improved = false;

                for _ in 0..params.long_jumps {
                    if used >= budget {
                        break 'outer;
                    }
                    let Some(jump) = random_unvisited(&mut rng, &ids, &visited) else {
                        break;
                    };
                    let Some(jump_sim) = self.eval(query, jump, scope) else {
                        break;
                    };
                    used += 1;
                    visited.insert(jump, jump_sim);
                    if jump_sim > s {
                        cur = jump;
                        s = jump_sim;
                        improved = true;
                        break;
                    }
                }

                if !improved {
                    let Some(nl) = self.lists.get(&cur) else {
                        // partition boundary: nothing to descend through
                        self.stats.record_cross_partition_restart();
                        break;
                    };
                    let mut dead = false;
                    for neighbor in nl.iter() {
                        if visited.contains_key(&neighbor.id) {
                            continue;
                        }
                        if used >= budget {
                            break 'outer;
                        }
                        let Some(neighbor_sim) = self.eval(query, neighbor.id, scope) else {
                            dead = true;
                            break;
                        };
                        used += 1;
                        visited.insert(neighbor.id, neighbor_sim);
                        if neighbor_sim > s {
                            cur = neighbor.id;
                            s = neighbor_sim;
                            improved = true;
                            break;
                        }
                    }
                    if dead {
                        self.stats.record_cross_partition_restart();
                        break;
                    }
                }

                if !improved {
                    break;
                }
            }

            if s > global_best {
                global_best = s;
            }
        }

        let mut result = NeighborList::new(count);
        for (id, s) in visited {
            result.insert(Neighbor::new(id, s));
        }
        Ok(result)
    }

    fn search_exhaustive(&self, query: &T, count: usize, scope: SimScope) -> NeighborList {
        let scored: Vec<Neighbor> = self
            .payloads
            .par_iter()
            .map(|(id, payload)| {
                self.stats.record_similarity(scope);
                Neighbor::new(*id, self.similarity.similarity(query, payload))
            })
            .collect();
        let mut result = NeighborList::new(count);
        for neighbor in scored {
            result.insert(neighbor);
        }
        result
    }

    /// Similarity of `query` to a resident item, charged to `scope`.
    /// `None` marks a cross-partition id.
    fn eval(&self, query: &T, id: ItemId, scope: SimScope) -> Option<f64> {
        let payload = self.payloads.get(&id)?;
        self.stats.record_similarity(scope);
        Some(self.similarity.similarity(query, payload))
    }
}

fn random_unvisited(
    rng: &mut StdRng,
    ids: &[ItemId],
    visited: &HashMap<ItemId, f64>,
) -> Option<ItemId> {
    if visited.len() >= ids.len() {
        return None;
    }
    for _ in 0..16 {
        let candidate = ids[rng.random_range(0..ids.len())];
        if !visited.contains_key(&candidate) {
            return Some(candidate);
        }
    }
    // densely visited: walk from a random offset instead of rejecting forever
    let start = rng.random_range(0..ids.len());
    (0..ids.len())
        .map(|offset| ids[(start + offset) % ids.len()])
        .find(|candidate| !visited.contains_key(candidate))
}
