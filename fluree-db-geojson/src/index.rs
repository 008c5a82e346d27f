//! Packed, read-only R-tree over feature envelopes.
//!
//! Built once per load with Sort-Tile-Recursive (STR) bulk packing: entries
//! are sorted by envelope center x, cut into vertical slices, sorted by
//! center y within each slice, and grouped into leaves of
//! [`NODE_CAPACITY`]. Upper levels pack the level below the same way until
//! a single root remains.
//!
//! Nodes are stored level by level in flat vectors; a node's children are a
//! contiguous range of the level below (or of the entry array for leaves),
//! so the tree has no per-node allocation and no pointers.
//!
//! ```text
//! levels[h-1]   [root]
//!                  │ children 0..k
//! levels[h-2]   [n0 n1 .. nk]
//!                  ⋮
//! levels[0]     [leaf0 leaf1 ...]      each leaf: entries start..end
//! entries       [(env, T) (env, T) ...]
//! ```

use crate::envelope::Envelope;
use serde::Serialize;
use std::cmp::Ordering;

/// Maximum children per node.
pub const NODE_CAPACITY: usize = 16;

#[derive(Debug, Clone, Copy)]
struct Node {
    envelope: Envelope,
    /// Child range in the level below, or in `entries` for leaves.
    start: usize,
    end: usize,
}

/// Shape of a built index.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IndexStats {
    /// Indexed entries.
    pub entries: usize,
    /// Levels including the leaf level; 0 when empty.
    pub height: usize,
    /// Nodes across all levels.
    pub node_count: usize,
    pub capacity: usize,
}

/// Work done by one query.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IndexQueryStats {
    /// Nodes whose envelope intersected the query and were descended into.
    pub nodes_visited: usize,
    /// Leaf entries whose envelope was tested.
    pub entries_tested: usize,
    /// Entries returned.
    pub matches: usize,
}

/// Immutable spatial index mapping envelopes to payloads.
#[derive(Debug, Clone)]
pub struct SpatialIndex<T> {
    entries: Vec<(Envelope, T)>,
    /// `levels[0]` are leaves, the last level holds the single root.
    levels: Vec<Vec<Node>>,
}

impl<T> Default for SpatialIndex<T> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            levels: Vec::new(),
        }
    }
}

impl<T> SpatialIndex<T> {
    /// Bulk-build from `(envelope, payload)` pairs.
    ///
    /// Entries with an invalid envelope can never match a query and are
    /// dropped.
    pub fn build(entries: impl IntoIterator<Item = (Envelope, T)>) -> Self {
        let mut entries: Vec<(Envelope, T)> = entries
            .into_iter()
            .filter(|(env, _)| env.is_valid())
            .collect();
        if entries.is_empty() {
            return Self::default();
        }

        let mut leaves = Vec::with_capacity(entries.len().div_ceil(NODE_CAPACITY));
        str_pack(&mut entries, |(env, _)| *env, |start, end, group| {
            leaves.push(Node {
                envelope: union(group.iter().map(|(env, _)| env)),
                start,
                end,
            });
        });

        let mut levels = vec![leaves];
        while let Some(below) = levels.last_mut().filter(|level| level.len() > 1) {
            let mut parents = Vec::with_capacity(below.len().div_ceil(NODE_CAPACITY));
            str_pack(below, |node| node.envelope, |start, end, group| {
                parents.push(Node {
                    envelope: union(group.iter().map(|node| &node.envelope)),
                    start,
                    end,
                });
            });
            levels.push(parents);
        }

        let index = Self { entries, levels };
        let stats = index.stats();
        tracing::debug!(
            entries = stats.entries,
            height = stats.height,
            nodes = stats.node_count,
            "spatial index built"
        );
        index
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Bounds of every indexed entry; invalid when empty.
    pub fn envelope(&self) -> Envelope {
        self.root()
            .map(|root| root.envelope)
            .unwrap_or_else(Envelope::invalid)
    }

    pub fn stats(&self) -> IndexStats {
        IndexStats {
            entries: self.entries.len(),
            height: self.levels.len(),
            node_count: self.levels.iter().map(Vec::len).sum(),
            capacity: NODE_CAPACITY,
        }
    }

    /// All entries, in packed order.
    pub fn iter(&self) -> impl Iterator<Item = (&Envelope, &T)> {
        self.entries.iter().map(|(env, value)| (env, value))
    }

    /// Payloads whose envelope intersects `bbox` (closed intervals).
    ///
    /// Result order is unspecified.
    pub fn query(&self, bbox: &Envelope) -> Vec<&T> {
        self.query_with_stats(bbox).0
    }

    /// [`Self::query`] plus traversal counters.
    pub fn query_with_stats(&self, bbox: &Envelope) -> (Vec<&T>, IndexQueryStats) {
        let mut stats = IndexQueryStats::default();
        let mut out = Vec::new();
        if !bbox.is_valid() || self.levels.is_empty() {
            return (out, stats);
        }

        let root_level = self.levels.len() - 1;
        let mut stack: Vec<(usize, usize)> = vec![(root_level, 0)];
        while let Some((level, idx)) = stack.pop() {
            let node = &self.levels[level][idx];
            if !node.envelope.intersects(bbox) {
                continue;
            }
            stats.nodes_visited += 1;
            if level == 0 {
                for (env, value) in &self.entries[node.start..node.end] {
                    stats.entries_tested += 1;
                    if env.intersects(bbox) {
                        out.push(value);
                    }
                }
            } else {
                stack.extend((node.start..node.end).map(|child| (level - 1, child)));
            }
        }
        stats.matches = out.len();
        (out, stats)
    }

    fn root(&self) -> Option<&Node> {
        self.levels.last().and_then(|level| level.first())
    }
}

/// Reorder `items` in STR order and report each group of up to
/// [`NODE_CAPACITY`] consecutive items as `(start, end, group)`.
fn str_pack<I, E, G>(items: &mut [I], envelope_of: E, mut on_group: G)
where
    E: Fn(&I) -> Envelope,
    G: FnMut(usize, usize, &[I]),
{
    let leaf_count = items.len().div_ceil(NODE_CAPACITY);
    let slice_count = (leaf_count as f64).sqrt().ceil() as usize;
    let slice_len = slice_count.max(1) * NODE_CAPACITY;

    items.sort_by(|a, b| cmp_center(envelope_of(a).center().0, envelope_of(b).center().0));
    let mut start = 0;
    for slice in items.chunks_mut(slice_len) {
        slice.sort_by(|a, b| cmp_center(envelope_of(a).center().1, envelope_of(b).center().1));
        for group in slice.chunks(NODE_CAPACITY) {
            on_group(start, start + group.len(), group);
            start += group.len();
        }
    }
}

fn cmp_center(a: f64, b: f64) -> Ordering {
    a.total_cmp(&b)
}

fn union<'a>(envelopes: impl Iterator<Item = &'a Envelope>) -> Envelope {
    envelopes.fold(Envelope::invalid(), |mut acc, env| {
        acc.expand_to_include(env);
        acc
    })
}
