//! Index bookkeeping for transforms and priors
//!
//! The root of a parameter tree owns one [`IndexRegistry`] per kind of
//! property (constraints, priors). It maps each property to the set of flat
//! positions it governs. Every other node sees the registry through a
//! [`RegistryView`], a window `[offset, offset + size)` that translates
//! positions to and from the node's own 0-based index space.

use std::cell::RefCell;
use std::collections::BTreeSet;
use std::rc::Rc;

/// Mapping from a property to the flat positions it governs.
///
/// Keys iterate in first-insertion order. Keys whose index set becomes empty
/// are dropped.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexRegistry<K> {
    entries: Vec<(K, BTreeSet<usize>)>,
}

impl<K> Default for IndexRegistry<K> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}

impl<K: Clone + PartialEq> IndexRegistry<K> {
    pub fn new() -> Self {
        Self::default()
    }

    fn position(&self, key: &K) -> Option<usize> {
        self.entries.iter().position(|(k, _)| k == key)
    }

    /// Register `indices` under `key`, merging with what is already there.
    pub fn add<I>(&mut self, key: K, indices: I)
    where
        I: IntoIterator<Item = usize>,
    {
        let mut indices = indices.into_iter().peekable();
        if indices.peek().is_none() {
            return;
        }
        match self.position(&key) {
            Some(pos) => self.entries[pos].1.extend(indices),
            None => self.entries.push((key, indices.collect())),
        }
    }

    /// Remove `indices` from `key` and return the ones that were present.
    pub fn remove<I>(&mut self, key: &K, indices: I) -> Vec<usize>
    where
        I: IntoIterator<Item = usize>,
    {
        let Some(pos) = self.position(key) else {
            return Vec::new();
        };

        let set = &mut self.entries[pos].1;
        let mut removed: Vec<usize> = indices.into_iter().filter(|i| set.remove(i)).collect();
        if set.is_empty() {
            self.entries.remove(pos);
        }
        removed.sort_unstable();
        removed.dedup();
        removed
    }

    /// Sorted positions governed by `key`.
    pub fn indices(&self, key: &K) -> Vec<usize> {
        self.position(key)
            .map(|pos| self.entries[pos].1.iter().copied().collect())
            .unwrap_or_default()
    }

    /// All registered keys.
    pub fn keys(&self) -> Vec<K> {
        self.entries.iter().map(|(k, _)| k.clone()).collect()
    }

    /// Keys governing position `index`.
    pub fn keys_at(&self, index: usize) -> Vec<K> {
        self.entries
            .iter()
            .filter(|(_, set)| set.contains(&index))
            .map(|(k, _)| k.clone())
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&K, &BTreeSet<usize>)> {
        self.entries.iter().map(|(k, set)| (k, set))
    }

    /// Number of registered keys.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Total number of registered positions over all keys.
    pub fn size(&self) -> usize {
        self.entries.iter().map(|(_, set)| set.len()).sum()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Make room for `amount` positions inserted at `start`.
    pub fn shift_right(&mut self, start: usize, amount: usize) {
        if amount == 0 {
            return;
        }
        for (_, set) in self.entries.iter_mut() {
            *set = set
                .iter()
                .map(|&i| if i >= start { i + amount } else { i })
                .collect();
        }
    }

    /// Drop positions in `[start, start + amount)` and close the gap.
    pub fn shift_left(&mut self, start: usize, amount: usize) {
        if amount == 0 {
            return;
        }
        let end = start + amount;
        for (_, set) in self.entries.iter_mut() {
            *set = set
                .iter()
                .filter(|&&i| i < start || i >= end)
                .map(|&i| if i >= end { i - amount } else { i })
                .collect();
        }
        self.entries.retain(|(_, set)| !set.is_empty());
    }

    /// Merge every entry of `other`, shifted by `offset`.
    pub fn update(&mut self, other: &IndexRegistry<K>, offset: usize) {
        for (key, set) in other.iter() {
            self.add(key.clone(), set.iter().map(|&i| i + offset));
        }
    }

    /// Copy of the entries inside `[start, start + len)`, translated to start at 0.
    pub fn restricted(&self, start: usize, len: usize) -> IndexRegistry<K> {
        let mut out = IndexRegistry::new();
        for (key, set) in self.iter() {
            out.add(key.clone(), set.range(start..start + len).map(|&i| i - start));
        }
        out
    }
}

/// A node's window onto its root's registry.
#[derive(Debug)]
pub struct RegistryView<K> {
    registry: Rc<RefCell<IndexRegistry<K>>>,
    offset: usize,
    size: usize,
}

impl<K> Clone for RegistryView<K> {
    fn clone(&self) -> Self {
        Self {
            registry: Rc::clone(&self.registry),
            offset: self.offset,
            size: self.size,
        }
    }
}

impl<K: Clone + PartialEq> RegistryView<K> {
    pub fn new(registry: Rc<RefCell<IndexRegistry<K>>>, offset: usize, size: usize) -> Self {
        Self {
            registry,
            offset,
            size,
        }
    }

    /// A view over a fresh registry it owns alone.
    pub fn owned(registry: IndexRegistry<K>, size: usize) -> Self {
        Self::new(Rc::new(RefCell::new(registry)), 0, size)
    }

    /// Offset of the window inside the root registry.
    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub(crate) fn registry(&self) -> &Rc<RefCell<IndexRegistry<K>>> {
        &self.registry
    }

    /// Whether both views write into the same root registry.
    pub fn shares_registry(&self, other: &RegistryView<K>) -> bool {
        Rc::ptr_eq(&self.registry, &other.registry)
    }

    /// Register local `indices` under `key`. Positions outside the window are ignored.
    pub fn add<I>(&self, key: K, indices: I)
    where
        I: IntoIterator<Item = usize>,
    {
        let (offset, size) = (self.offset, self.size);
        self.registry
            .borrow_mut()
            .add(key, indices.into_iter().filter(|&i| i < size).map(|i| i + offset));
    }

    /// Remove local `indices` from `key`, returning the removed local positions.
    pub fn remove<I>(&self, key: &K, indices: I) -> Vec<usize>
    where
        I: IntoIterator<Item = usize>,
    {
        let (offset, size) = (self.offset, self.size);
        self.registry
            .borrow_mut()
            .remove(key, indices.into_iter().filter(|&i| i < size).map(|i| i + offset))
            .into_iter()
            .map(|i| i - offset)
            .collect()
    }

    /// Local positions governed by `key`.
    pub fn indices(&self, key: &K) -> Vec<usize> {
        let registry = self.registry.borrow();
        registry
            .indices(key)
            .into_iter()
            .filter(|&i| i >= self.offset && i < self.offset + self.size)
            .map(|i| i - self.offset)
            .collect()
    }

    /// Local positions governed by any key matching `predicate`.
    pub fn indices_where<P>(&self, predicate: P) -> Vec<usize>
    where
        P: Fn(&K) -> bool,
    {
        let mut out: Vec<usize> = self
            .entries()
            .into_iter()
            .filter(|(key, _)| predicate(key))
            .flat_map(|(_, local)| local)
            .collect();
        out.sort_unstable();
        out.dedup();
        out
    }

    /// Keys with at least one position inside the window.
    pub fn keys(&self) -> Vec<K> {
        self.entries().into_iter().map(|(k, _)| k).collect()
    }

    /// Keys governing local position `index`.
    pub fn keys_at(&self, index: usize) -> Vec<K> {
        if index >= self.size {
            return Vec::new();
        }
        self.registry.borrow().keys_at(index + self.offset)
    }

    /// `(key, local positions)` pairs inside the window.
    pub fn entries(&self) -> Vec<(K, Vec<usize>)> {
        let registry = self.registry.borrow();
        registry
            .iter()
            .filter_map(|(key, set)| {
                let local: Vec<usize> = set
                    .range(self.offset..self.offset + self.size)
                    .map(|&i| i - self.offset)
                    .collect();
                (!local.is_empty()).then(|| (key.clone(), local))
            })
            .collect()
    }

    /// Number of registered positions inside the window.
    pub fn count(&self) -> usize {
        self.entries().iter().map(|(_, local)| local.len()).sum()
    }

    /// Copy of the window as a standalone registry.
    pub fn to_registry(&self) -> IndexRegistry<K> {
        self.registry.borrow().restricted(self.offset, self.size)
    }
}
