//! Slot arena with generation-checked handles
//!
//! Removed slots are reused. A stale [`NodeId`] (slot reused or empty) simply
//! misses on lookup, which is how late messages from a departed worker are
//! ignored.

use std::fmt;

/// Stable handle to an arena slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId {
    slot: u32,
    generation: u32,
}

impl NodeId {
    /// Slot index, used to address side tables
    pub fn slot(&self) -> usize {
        self.slot as usize
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node#{}.{}", self.slot, self.generation)
    }
}

struct Slot<T> {
    generation: u32,
    value: Option<T>,
}

/// Arena of values addressed by [`NodeId`]
pub struct NodeArena<T> {
    slots: Vec<Slot<T>>,
    free: Vec<u32>,
    len: usize,
}

impl<T> Default for NodeArena<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> NodeArena<T> {
    /// Create an empty arena
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            len: 0,
        }
    }

    /// Store a value built from its own handle
    pub fn insert_with(&mut self, make: impl FnOnce(NodeId) -> T) -> NodeId {
        let slot = match self.free.pop() {
            Some(slot) => slot,
            None => {
                self.slots.push(Slot { generation: 0, value: None });
                (self.slots.len() - 1) as u32
            }
        };
        let entry = &mut self.slots[slot as usize];
        let id = NodeId { slot, generation: entry.generation };
        entry.value = Some(make(id));
        self.len += 1;
        id
    }

    /// Value behind a live handle
    pub fn get(&self, id: NodeId) -> Option<&T> {
        self.slots
            .get(id.slot())
            .filter(|entry| entry.generation == id.generation)
            .and_then(|entry| entry.value.as_ref())
    }

    /// Mutable value behind a live handle
    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut T> {
        self.slots
            .get_mut(id.slot())
            .filter(|entry| entry.generation == id.generation)
            .and_then(|entry| entry.value.as_mut())
    }

    /// Remove the value behind a live handle
    pub fn remove(&mut self, id: NodeId) -> Option<T> {
        let entry = self.slots.get_mut(id.slot())?;
        if entry.generation != id.generation {
            return None;
        }
        let value = entry.value.take()?;
        entry.generation = entry.generation.wrapping_add(1);
        self.free.push(id.slot);
        self.len -= 1;
        Some(value)
    }

    /// Number of live values
    pub fn len(&self) -> usize {
        self.len
    }

    /// True if no values are stored
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stale_handle_misses_after_reuse() {
        let mut arena = NodeArena::new();
        let first = arena.insert_with(|_| "a");
        assert_eq!(arena.remove(first), Some("a"));

        let second = arena.insert_with(|_| "b");
        assert_eq!(first.slot(), second.slot());
        assert_eq!(arena.get(first), None);
        assert_eq!(arena.get(second), Some(&"b"));
        assert_eq!(arena.remove(first), None);
        assert_eq!(arena.len(), 1);
    }
}
