//! Item and neighbor definitions

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::hash::{Hash, Hasher};

/// Stable identity of an item within a graph
pub type ItemId = u64;

/// An opaque payload paired with its stable identity.
///
/// Equality and hashing are by identity alone; the payload is only ever
/// inspected by the similarity function.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Item<T> {
    /// Unique id within a graph
    pub id: ItemId,
    /// The user payload
    pub value: T,
}

impl<T> Item<T> {
    pub fn new(id: ItemId, value: T) -> Self {
        Self { id, value }
    }
}

impl<T> PartialEq for Item<T> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl<T> Eq for Item<T> {}

impl<T> Hash for Item<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

/// One directed edge endpoint: a neighbor id plus the cached similarity.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Neighbor {
    /// Id of the referenced item
    pub id: ItemId,
    /// Similarity between the owning item and the referenced item
    pub similarity: f64,
}

impl Neighbor {
    pub fn new(id: ItemId, similarity: f64) -> Self {
        Self { id, similarity }
    }
}

impl PartialEq for Neighbor {
    fn eq(&self, other: &Self) -> bool {
        // equality is by referenced item; the cached similarity is not part of it
        self.id == other.id
    }
}

impl Eq for Neighbor {}

impl PartialOrd for Neighbor {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Neighbor {
    fn cmp(&self, other: &Self) -> Ordering {
        // Higher similarity sorts first; ties break by id so the order is total
        other
            .similarity
            .partial_cmp(&self.similarity)
            .unwrap_or(Ordering::Equal)
            .then_with(|| self.id.cmp(&other.id))
    }
}
