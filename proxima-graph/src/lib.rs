//! Approximate k-NN Graphs for Proxima
//!
//! This crate builds, queries and maintains directed graphs in which every
//! item points at (approximately) its k most similar peers, for any payload
//! type and any user-supplied similarity function.
//!
//! # Features
//!
//! - **Builders**: exact block-parallel brute force, NN-Descent local-join
//!   refinement, and LSH bucketing that delegates to any inner builder
//! - **Search**: GNNS-style hill climbing with random restarts under a
//!   strict similarity budget
//! - **Maintenance**: online insertion and removal with a bounded update
//!   radius, plus sliding-window eviction
//! - **Analysis**: pruning, weakly/strongly connected components, bounded
//!   BFS and GEXF export
//!
//! # Example
//!
//! ```rust
//! use proxima_graph::{BruteForce, BruteParams, Item, SearchParams};
//! use std::sync::Arc;
//!
//! # fn example() -> proxima_graph::Result<()> {
//! let items: Vec<Item<i64>> = (0..100).map(|i| Item::new(i, i as i64 * 3)).collect();
//! let builder = BruteForce::new(
//!     BruteParams { k: 5, ..Default::default() },
//!     Arc::new(|a: &i64, b: &i64| 1.0 / (1.0 + (a - b).abs() as f64)),
//! )?;
//! let graph = builder.build(items)?;
//!
//! let nearest = graph.search(&151, 3, &SearchParams::default())?;
//! # let _ = nearest;
//! # Ok(())
//! # }
//! ```

mod brute;
mod builder;
mod components;
mod export;
mod graph;
mod neighbors;
mod nndescent;
mod online;
mod partition;
mod search;
mod similarity;
mod stats;
mod types;

pub use brute::{BruteForce, BruteParams};
pub use builder::{Callback, GraphBuilder};
pub use graph::Graph;
pub use neighbors::NeighborList;
pub use nndescent::{NnDescent, NnDescentParams};
pub use online::{AddParams, RemoveParams};
pub use partition::Partitioning;
pub use search::SearchParams;
pub use similarity::Similarity;
pub use stats::Stats;
pub use types::{Item, ItemId, Neighbor};

/// Errors that can occur while configuring or mutating a graph
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    #[error("invalid parameter {name}: {reason}")]
    InvalidParameter { name: &'static str, reason: String },

    #[error("item {0} is already in the graph")]
    DuplicateItem(ItemId),

    #[error("item {0} is not in the graph")]
    NotFound(ItemId),
}

pub type Result<T> = std::result::Result<T, GraphError>;
