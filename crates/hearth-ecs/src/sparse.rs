//! Sparse-set component storage.
//!
//! One [`SparseSet`] per component type. The sparse side maps an entity
//! index to a position in the packed dense arrays, so membership checks are
//! O(1) and iteration walks contiguous memory. Whether an entity "has" a
//! component is answered by [`SparseSet::contains`]; there is no type-erased
//! lookup anywhere.
//!
//! Iteration order is insertion order, perturbed only by removals
//! (swap-remove). Given the same sequence of inserts and removes the order
//! is identical on every run.

use crate::entity::EntityId;

#[derive(Debug, Clone)]
pub struct SparseSet<T> {
    sparse: Vec<Option<u32>>,
    dense: Vec<EntityId>,
    values: Vec<T>,
}

impl<T> Default for SparseSet<T> {
    fn default() -> Self {
        Self {
            sparse: Vec::new(),
            dense: Vec::new(),
            values: Vec::new(),
        }
    }
}

impl<T> SparseSet<T> {
    pub fn new() -> Self {
        Self::default()
    }

    fn position(&self, entity: EntityId) -> Option<usize> {
        let pos = (*self.sparse.get(entity.index() as usize)?)? as usize;
        (self.dense[pos] == entity).then_some(pos)
    }

    /// Insert or overwrite. Returns the previous value for this exact handle.
    pub fn insert(&mut self, entity: EntityId, value: T) -> Option<T> {
        let idx = entity.index() as usize;
        if idx >= self.sparse.len() {
            self.sparse.resize(idx + 1, None);
        }
        if let Some(pos) = self.sparse[idx] {
            let pos = pos as usize;
            let previous_owner = self.dense[pos];
            self.dense[pos] = entity;
            let old = std::mem::replace(&mut self.values[pos], value);
            // A leftover row from an older generation is dropped, not returned.
            return (previous_owner == entity).then_some(old);
        }
        self.sparse[idx] = Some(self.dense.len() as u32);
        self.dense.push(entity);
        self.values.push(value);
        None
    }

    pub fn remove(&mut self, entity: EntityId) -> Option<T> {
        let pos = self.position(entity)?;
        self.sparse[entity.index() as usize] = None;
        self.dense.swap_remove(pos);
        let value = self.values.swap_remove(pos);
        if let Some(&moved) = self.dense.get(pos) {
            self.sparse[moved.index() as usize] = Some(pos as u32);
        }
        Some(value)
    }

    pub fn get(&self, entity: EntityId) -> Option<&T> {
        self.position(entity).map(|pos| &self.values[pos])
    }

    pub fn get_mut(&mut self, entity: EntityId) -> Option<&mut T> {
        self.position(entity).map(move |pos| &mut self.values[pos])
    }

    pub fn contains(&self, entity: EntityId) -> bool {
        self.position(entity).is_some()
    }

    pub fn len(&self) -> usize {
        self.dense.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dense.is_empty()
    }

    /// Entities holding this component, in iteration order.
    pub fn entities(&self) -> &[EntityId] {
        &self.dense
    }

    pub fn iter(&self) -> impl Iterator<Item = (EntityId, &T)> + '_ {
        self.dense.iter().copied().zip(self.values.iter())
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (EntityId, &mut T)> + '_ {
        self.dense.iter().copied().zip(self.values.iter_mut())
    }

    pub fn clear(&mut self) {
        self.sparse.clear();
        self.dense.clear();
        self.values.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn e(index: u32) -> EntityId {
        EntityId::new(index, 0)
    }

    #[test]
    fn insert_get_and_overwrite() {
        let mut set = SparseSet::new();
        assert_eq!(set.insert(e(3), "a"), None);
        assert_eq!(set.get(e(3)), Some(&"a"));
        assert_eq!(set.insert(e(3), "b"), Some("a"));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn remove_keeps_other_rows_addressable() {
        let mut set = SparseSet::new();
        for i in 0..5 {
            set.insert(e(i), i * 10);
        }
        assert_eq!(set.remove(e(1)), Some(10));
        assert!(!set.contains(e(1)));
        for i in [0, 2, 3, 4] {
            assert_eq!(set.get(e(i)), Some(&(i * 10)));
        }
        assert_eq!(set.len(), 4);
    }

    #[test]
    fn stale_generation_does_not_resolve() {
        let mut set = SparseSet::new();
        set.insert(EntityId::new(0, 0), 1.0f32);
        assert!(set.get(EntityId::new(0, 1)).is_none());
        assert!(set.remove(EntityId::new(0, 1)).is_none());
    }

    #[test]
    fn newer_generation_replaces_leftover_row() {
        let mut set = SparseSet::new();
        set.insert(EntityId::new(2, 0), 'x');
        assert_eq!(set.insert(EntityId::new(2, 1), 'y'), None);
        assert_eq!(set.get(EntityId::new(2, 1)), Some(&'y'));
        assert!(set.get(EntityId::new(2, 0)).is_none());
    }

    #[test]
    fn iter_mut_updates_in_place() {
        let mut set = SparseSet::new();
        set.insert(e(0), 1);
        set.insert(e(9), 2);
        for (_, v) in set.iter_mut() {
            *v *= 3;
        }
        let collected: Vec<_> = set.iter().map(|(id, v)| (id.index(), *v)).collect();
        assert_eq!(collected, vec![(0, 3), (9, 6)]);
    }
}
