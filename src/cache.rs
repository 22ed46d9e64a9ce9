use std::sync::Arc;

use ahash::AHashMap;
use parking_lot::RwLock;

/// Which endpoint of an edge type the adjacency is keyed by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Orientation {
    /// Source node -> targets.
    Forward,
    /// Target node -> sources.
    Reverse,
}

/// Compressed neighbor lists of one edge type in one orientation.
///
/// Each entry is `(neighbor, edge position)`, sorted by neighbor then edge
/// position so iteration order never depends on the input row order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Adjacency {
    offsets: Vec<usize>,
    entries: Vec<(usize, usize)>,
}

impl Adjacency {
    pub fn build(node_count: usize, pairs: &[(usize, usize)], orientation: Orientation) -> Self {
        let mut degree = vec![0usize; node_count + 1];
        for &(s, t) in pairs {
            let from = match orientation {
                Orientation::Forward => s,
                Orientation::Reverse => t,
            };
            if from < node_count {
                degree[from + 1] += 1;
            }
        }
        for i in 1..degree.len() {
            degree[i] += degree[i - 1];
        }
        let offsets = degree;
        let mut cursor = offsets.clone();
        let mut entries = vec![(0usize, 0usize); offsets[node_count]];
        for (pos, &(s, t)) in pairs.iter().enumerate() {
            let (from, to) = match orientation {
                Orientation::Forward => (s, t),
                Orientation::Reverse => (t, s),
            };
            if from < node_count {
                entries[cursor[from]] = (to, pos);
                cursor[from] += 1;
            }
        }
        for n in 0..node_count {
            entries[offsets[n]..offsets[n + 1]].sort_unstable();
        }
        Self { offsets, entries }
    }

    pub fn node_count(&self) -> usize {
        self.offsets.len().saturating_sub(1)
    }

    pub fn edge_count(&self) -> usize {
        self.entries.len()
    }

    pub fn neighbors(&self, node: usize) -> &[(usize, usize)] {
        if node >= self.node_count() {
            return &[];
        }
        &self.entries[self.offsets[node]..self.offsets[node + 1]]
    }
}

/// Memoised adjacency per `(edge type position, orientation)`.
///
/// Snapshots never change, so entries are never invalidated; one cache
/// belongs to one snapshot.
#[derive(Debug, Default)]
pub struct AdjacencyCache {
    inner: RwLock<AHashMap<(usize, Orientation), Arc<Adjacency>>>,
}

impl AdjacencyCache {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(AHashMap::new()),
        }
    }

    pub fn get(&self, edge_type: usize, orientation: Orientation) -> Option<Arc<Adjacency>> {
        self.inner.read().get(&(edge_type, orientation)).cloned()
    }

    pub fn insert(&self, edge_type: usize, orientation: Orientation, value: Arc<Adjacency>) {
        self.inner.write().insert((edge_type, orientation), value);
    }

    /// Returns the cached adjacency or builds and stores it.
    ///
    /// Two threads racing on the same key may both build; the first stored
    /// value wins and both get it.
    pub fn get_or_build<F>(
        &self,
        edge_type: usize,
        orientation: Orientation,
        build: F,
    ) -> Arc<Adjacency>
    where
        F: FnOnce() -> Adjacency,
    {
        if let Some(hit) = self.get(edge_type, orientation) {
            return hit;
        }
        let built = Arc::new(build());
        Arc::clone(
            self.inner
                .write()
                .entry((edge_type, orientation))
                .or_insert(built),
        )
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }

    pub fn clear(&self) {
        self.inner.write().clear();
    }
}
