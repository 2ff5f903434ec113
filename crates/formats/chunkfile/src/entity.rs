//! Typed `u32` handles and the arenas they index.

use crate::error::{Error, Result};

/// A typed `u32` handle into an arena.
pub trait EntityRef: Copy + Eq + std::hash::Hash + std::fmt::Debug {
    fn new(index: u32) -> Self;
    fn index(self) -> u32;
}

/// Define a typed handle (a newtype over `u32`).
///
/// ```ignore
/// define_entity!(ObjectId);
/// ```
#[macro_export]
macro_rules! define_entity {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug, serde::Serialize, serde::Deserialize)]
        pub struct $name(u32);

        impl $crate::entity::EntityRef for $name {
            fn new(index: u32) -> Self {
                Self(index)
            }
            fn index(self) -> u32 {
                self.0
            }
        }
    };
}

/// Arena holding every object a scene owns, addressed by handle.
///
/// Arena order is insertion order and says nothing about the tree; walk
/// order comes from the scene's root and child lists. Objects are never
/// removed, so a handle stays valid for the life of its map.
#[derive(Debug, Clone)]
pub struct PrimaryMap<K: EntityRef, V> {
    elems: Vec<V>,
    _phantom: std::marker::PhantomData<K>,
}

impl<K: EntityRef, V> Default for PrimaryMap<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: EntityRef, V> PrimaryMap<K, V> {
    pub fn new() -> Self {
        Self {
            elems: Vec::new(),
            _phantom: std::marker::PhantomData,
        }
    }

    pub fn push(&mut self, value: V) -> K {
        let key = K::new(self.elems.len() as u32);
        self.elems.push(value);
        key
    }

    pub fn get(&self, key: K) -> Option<&V> {
        self.elems.get(key.index() as usize)
    }

    pub fn get_mut(&mut self, key: K) -> Option<&mut V> {
        self.elems.get_mut(key.index() as usize)
    }

    pub fn len(&self) -> usize {
        self.elems.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elems.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (K, &V)> {
        self.elems
            .iter()
            .enumerate()
            .map(|(i, v)| (K::new(i as u32), v))
    }
}

impl<K: EntityRef, V> std::ops::Index<K> for PrimaryMap<K, V> {
    type Output = V;
    fn index(&self, key: K) -> &V {
        &self.elems[key.index() as usize]
    }
}

impl<K: EntityRef, V> std::ops::IndexMut<K> for PrimaryMap<K, V> {
    fn index_mut(&mut self, key: K) -> &mut V {
        &mut self.elems[key.index() as usize]
    }
}

/// Sparse storage keyed by externally supplied handles.
///
/// Grows on demand; absent keys read as `None`.
#[derive(Debug, Clone)]
pub struct SparseMap<K: EntityRef, V> {
    elems: Vec<Option<V>>,
    _phantom: std::marker::PhantomData<K>,
}

impl<K: EntityRef, V> Default for SparseMap<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: EntityRef, V> SparseMap<K, V> {
    pub fn new() -> Self {
        Self {
            elems: Vec::new(),
            _phantom: std::marker::PhantomData,
        }
    }

    /// Make room for every index up to and including `key`.
    pub fn ensure_capacity(&mut self, key: K) {
        let idx = key.index() as usize;
        if idx >= self.elems.len() {
            self.elems.resize_with(idx + 1, || None);
        }
    }

    /// Number of addressable indices (occupied or not).
    pub fn capacity(&self) -> usize {
        self.elems.len()
    }

    pub fn insert(&mut self, key: K, value: V) -> Option<V> {
        self.ensure_capacity(key);
        self.elems[key.index() as usize].replace(value)
    }

    pub fn get(&self, key: K) -> Option<&V> {
        self.elems
            .get(key.index() as usize)
            .and_then(|v| v.as_ref())
    }

    /// Get an entry, or create it with `make` (growing as needed).
    pub fn get_or_insert_with(&mut self, key: K, make: impl FnOnce() -> V) -> &mut V {
        self.ensure_capacity(key);
        self.elems[key.index() as usize].get_or_insert_with(make)
    }

    /// Like `get`, but an absent entry is a dangling reference.
    pub fn resolve(&self, key: K, context: &'static str) -> Result<&V> {
        self.get(key).ok_or(Error::DanglingReference {
            context,
            index: key.index(),
            limit: self.elems.len() as u32,
        })
    }

    /// Occupied entries in increasing key order.
    pub fn iter(&self) -> impl Iterator<Item = (K, &V)> {
        self.elems
            .iter()
            .enumerate()
            .filter_map(|(i, v)| v.as_ref().map(|v| (K::new(i as u32), v)))
    }

    /// Number of occupied entries.
    pub fn count(&self) -> usize {
        self.elems.iter().filter(|v| v.is_some()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    define_entity!(TestId);

    #[test]
    fn primary_map_handles_are_dense() {
        let mut map: PrimaryMap<TestId, &str> = PrimaryMap::new();
        let a = map.push("a");
        let b = map.push("b");
        assert_eq!((a.index(), b.index()), (0, 1));
        assert_eq!(map[b], "b");
        assert_eq!(map.iter().map(|(k, _)| k).collect::<Vec<_>>(), [a, b]);
    }

    #[test]
    fn sparse_map_grows_on_insert() {
        let mut map: SparseMap<TestId, u8> = SparseMap::new();
        assert!(map.get(TestId::new(5)).is_none());
        map.insert(TestId::new(5), 1);
        assert_eq!(map.capacity(), 6);
        assert_eq!(map.count(), 1);
        map.ensure_capacity(TestId::new(2));
        assert_eq!(map.capacity(), 6);
        assert_eq!(map.iter().map(|(k, v)| (k.index(), *v)).collect::<Vec<_>>(), [(5, 1)]);
        assert!(matches!(
            map.resolve(TestId::new(3), "test"),
            Err(Error::DanglingReference { index: 3, limit: 6, .. })
        ));
    }
}
