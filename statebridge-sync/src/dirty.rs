//! Dirty tracking.
//!
//! Every operation takes the set's lock once, so a periodic flush and a
//! forced flush racing on the same id see it exactly once between them.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Set of entity ids waiting to be propagated.
#[derive(Debug)]
pub struct DirtySet<K> {
    ids: Mutex<BTreeSet<K>>,
}

impl<K: Ord + Clone> DirtySet<K> {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self {
            ids: Mutex::new(BTreeSet::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, BTreeSet<K>> {
        self.ids.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Marks `id` dirty. Returns false if it already was.
    pub fn mark(&self, id: K) -> bool {
        self.lock().insert(id)
    }

    /// Marks every id in `ids` dirty. Returns how many were newly marked.
    pub fn mark_all(&self, ids: impl IntoIterator<Item = K>) -> usize {
        let mut set = self.lock();
        ids.into_iter().filter(|id| set.insert(id.clone())).count()
    }

    /// Whether `id` is waiting to be published.
    #[must_use]
    pub fn is_dirty(&self, id: &K) -> bool {
        self.lock().contains(id)
    }

    /// Clears `id` if dirty. Returns whether it was; only one concurrent
    /// caller ever gets true.
    pub fn take(&self, id: &K) -> bool {
        self.lock().remove(id)
    }

    /// Clears and returns every dirty id in order.
    pub fn drain(&self) -> Vec<K> {
        std::mem::take(&mut *self.lock()).into_iter().collect()
    }

    /// Ordered copy of the dirty ids.
    pub fn ids(&self) -> Vec<K> {
        self.lock().iter().cloned().collect()
    }

    /// Number of dirty ids.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Returns true if nothing is dirty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Forgets every dirty id without publishing.
    pub fn clear(&self) {
        self.lock().clear();
    }
}

impl<K: Ord + Clone> Default for DirtySet<K> {
    fn default() -> Self {
        Self::new()
    }
}

/// Dirty child ids grouped by parent, e.g. message ids per session.
///
/// A parent can be dirty with no child ids, meaning its whole child list
/// changed.
#[derive(Debug)]
pub struct NestedDirtySet<P, C> {
    parents: Mutex<BTreeMap<P, BTreeSet<C>>>,
}

impl<P: Ord + Clone, C: Ord + Clone> NestedDirtySet<P, C> {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self {
            parents: Mutex::new(BTreeMap::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<P, BTreeSet<C>>> {
        self.parents.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Marks one child dirty. Returns false if it already was.
    pub fn mark(&self, parent: P, child: C) -> bool {
        self.lock().entry(parent).or_default().insert(child)
    }

    /// Marks the parent dirty without naming a child.
    pub fn mark_parent(&self, parent: P) {
        self.lock().entry(parent).or_default();
    }

    /// Marks the parent and every given child dirty.
    pub fn mark_all(&self, parent: P, children: impl IntoIterator<Item = C>) {
        self.lock().entry(parent).or_default().extend(children);
    }

    /// Whether the parent has any pending change.
    #[must_use]
    pub fn is_dirty(&self, parent: &P) -> bool {
        self.lock().contains_key(parent)
    }

    /// Whether this particular child is dirty.
    #[must_use]
    pub fn is_child_dirty(&self, parent: &P, child: &C) -> bool {
        self.lock().get(parent).is_some_and(|c| c.contains(child))
    }

    /// Clears the parent and returns its dirty children, or `None` if the
    /// parent was clean.
    pub fn take(&self, parent: &P) -> Option<Vec<C>> {
        self.lock()
            .remove(parent)
            .map(|children| children.into_iter().collect())
    }

    /// Clears everything, returning dirty children per parent in order.
    pub fn drain(&self) -> Vec<(P, Vec<C>)> {
        std::mem::take(&mut *self.lock())
            .into_iter()
            .map(|(parent, children)| (parent, children.into_iter().collect()))
            .collect()
    }

    /// Number of dirty parents.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Number of dirty children across all parents.
    pub fn child_count(&self) -> usize {
        self.lock().values().map(BTreeSet::len).sum()
    }

    /// Returns true if no parent is dirty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Forgets every dirty parent and child.
    pub fn clear(&self) {
        self.lock().clear();
    }
}

impl<P: Ord + Clone, C: Ord + Clone> Default for NestedDirtySet<P, C> {
    fn default() -> Self {
        Self::new()
    }
}
