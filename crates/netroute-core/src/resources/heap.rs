//! Indexed max-heap with removal by handle
//!
//! Entries are `(key, NodeId)` pairs kept in a binary heap array. A side table
//! indexed by arena slot records each handle's position, so a key can be
//! changed or an entry removed in `O(log n)` without scanning.

use std::cmp::Ordering;
use crate::resources::arena::NodeId;

/// Heap ordering for a worker: larger unmet demand first, then higher priority
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeapKey {
    /// Estimated extra budget the worker could use
    pub extra: i64,
    /// Scheduling priority
    pub priority: i32,
}

impl Ord for HeapKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.extra
            .cmp(&other.extra)
            .then(self.priority.cmp(&other.priority))
    }
}

impl PartialOrd for HeapKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Binary max-heap addressable by [`NodeId`]
pub struct KeyedHeap<K: Ord> {
    entries: Vec<(K, NodeId)>,
    positions: Vec<Option<usize>>,
}

impl<K: Ord + Copy> Default for KeyedHeap<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Ord + Copy> KeyedHeap<K> {
    /// Create an empty heap
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            positions: Vec::new(),
        }
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if the heap has no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether `id` is in the heap
    pub fn contains(&self, id: NodeId) -> bool {
        self.position(id).is_some()
    }

    /// Largest entry
    pub fn peek(&self) -> Option<(NodeId, K)> {
        self.entries.first().map(|&(key, id)| (id, key))
    }

    /// Insert `id`. Panics if it is already present.
    pub fn insert(&mut self, id: NodeId, key: K) {
        assert!(!self.contains(id), "{} inserted into heap twice", id);
        if self.positions.len() <= id.slot() {
            self.positions.resize(id.slot() + 1, None);
        }
        self.entries.push((key, id));
        let pos = self.entries.len() - 1;
        self.positions[id.slot()] = Some(pos);
        self.sift_up(pos);
    }

    /// Change the key of a present entry. Returns false if `id` is absent.
    pub fn update(&mut self, id: NodeId, key: K) -> bool {
        let Some(pos) = self.position(id) else {
            return false;
        };
        let old = self.entries[pos].0;
        self.entries[pos].0 = key;
        match key.cmp(&old) {
            Ordering::Greater => self.sift_up(pos),
            Ordering::Less => self.sift_down(pos),
            Ordering::Equal => {}
        }
        true
    }

    /// Remove `id`, returning its key
    pub fn remove(&mut self, id: NodeId) -> Option<K> {
        let pos = self.position(id)?;
        let last = self.entries.len() - 1;
        self.swap(pos, last);
        let (key, removed) = self.entries.pop()?;
        self.positions[removed.slot()] = None;
        if pos < self.entries.len() {
            self.sift_down(pos);
            self.sift_up(pos);
        }
        Some(key)
    }

    /// Remove and return the largest entry
    pub fn pop(&mut self) -> Option<(NodeId, K)> {
        let (id, _) = self.peek()?;
        self.remove(id).map(|key| (id, key))
    }

    fn position(&self, id: NodeId) -> Option<usize> {
        let pos = (*self.positions.get(id.slot())?)?;
        (self.entries[pos].1 == id).then_some(pos)
    }

    fn swap(&mut self, a: usize, b: usize) {
        if a == b {
            return;
        }
        self.entries.swap(a, b);
        self.positions[self.entries[a].1.slot()] = Some(a);
        self.positions[self.entries[b].1.slot()] = Some(b);
    }

    fn sift_up(&mut self, mut pos: usize) {
        while pos > 0 {
            let parent = (pos - 1) / 2;
            if self.entries[pos].0 <= self.entries[parent].0 {
                break;
            }
            self.swap(pos, parent);
            pos = parent;
        }
    }

    fn sift_down(&mut self, mut pos: usize) {
        let len = self.entries.len();
        loop {
            let left = 2 * pos + 1;
            let right = left + 1;
            let mut largest = pos;
            if left < len && self.entries[left].0 > self.entries[largest].0 {
                largest = left;
            }
            if right < len && self.entries[right].0 > self.entries[largest].0 {
                largest = right;
            }
            if largest == pos {
                break;
            }
            self.swap(pos, largest);
            pos = largest;
        }
    }
}
