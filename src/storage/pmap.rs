//! Immutable ordered map with copy-on-write updates.
//!
//! Every `add`/`remove` rebuilds only the nodes on the search path (plus at
//! most two per rebalancing rotation) and shares every other subtree with the
//! map it was derived from. Old map values are never affected.

use crate::storage::cursor::{Cursor, Iter};
use std::borrow::Borrow;
use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

pub(crate) type Link<K, V> = Option<Arc<Node<K, V>>>;

pub(crate) struct Node<K, V> {
    pub(crate) key: K,
    pub(crate) value: V,
    pub(crate) height: u8,
    pub(crate) left: Link<K, V>,
    pub(crate) right: Link<K, V>,
}

pub struct PMap<K, V> {
    pub(crate) root: Link<K, V>,
    len: usize,
}

impl<K, V> PMap<K, V> {
    pub fn new() -> Self {
        Self { root: None, len: 0 }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn iter(&self) -> Iter<'_, K, V> {
        Iter::new(self.root.as_deref(), self.len)
    }

    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.iter().map(|(k, _)| k)
    }

    pub fn values(&self) -> impl Iterator<Item = &V> {
        self.iter().map(|(_, v)| v)
    }

    /// Cursor at the smallest key, or `None` for an empty map.
    pub fn first(&self) -> Option<Cursor<K, V>> {
        Cursor::first(self.root.as_ref())
    }

    /// True when both maps are the same tree value (not merely equal).
    pub fn ptr_eq(&self, other: &Self) -> bool {
        match (&self.root, &other.root) {
            (None, None) => true,
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl<K: Ord, V> PMap<K, V> {
    pub fn lookup<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        let mut link = self.root.as_deref();
        while let Some(node) = link {
            match key.cmp(node.key.borrow()) {
                Ordering::Less => link = node.left.as_deref(),
                Ordering::Greater => link = node.right.as_deref(),
                Ordering::Equal => return Some(&node.value),
            }
        }
        None
    }

    pub fn contains<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        self.lookup(key).is_some()
    }

    /// Cursor at the first entry whose key is `>= key`.
    pub fn position_at<Q>(&self, key: &Q) -> Option<Cursor<K, V>>
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        Cursor::lower_bound(self.root.as_ref(), key)
    }

    /// Borrowing iterator over entries with key `>= key`.
    pub fn range_from<Q>(&self, key: &Q) -> Iter<'_, K, V>
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        Iter::lower_bound(self.root.as_deref(), key)
    }
}

impl<K: Ord + Clone, V: Clone> PMap<K, V> {
    pub fn add(&self, key: K, value: V) -> Self {
        let (root, inserted) = insert(&self.root, key, value);
        Self {
            root: Some(root),
            len: if inserted { self.len + 1 } else { self.len },
        }
    }

    /// Removing an absent key returns a map sharing this map's tree.
    pub fn remove<Q>(&self, key: &Q) -> Self
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        match remove(&self.root, key) {
            Some(root) => Self {
                root,
                len: self.len - 1,
            },
            None => self.clone(),
        }
    }
}

impl<K, V> Clone for PMap<K, V> {
    fn clone(&self) -> Self {
        Self {
            root: self.root.clone(),
            len: self.len,
        }
    }
}

impl<K, V> Default for PMap<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: fmt::Debug, V: fmt::Debug> fmt::Debug for PMap<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

impl<K: PartialEq, V: PartialEq> PartialEq for PMap<K, V> {
    fn eq(&self, other: &Self) -> bool {
        if self.ptr_eq(other) {
            return true;
        }
        self.len == other.len && self.iter().eq(other.iter())
    }
}

impl<K: Eq, V: Eq> Eq for PMap<K, V> {}

impl<K: Ord + Clone, V: Clone> FromIterator<(K, V)> for PMap<K, V> {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        iter.into_iter()
            .fold(PMap::new(), |map, (k, v)| map.add(k, v))
    }
}

impl<'a, K, V> IntoIterator for &'a PMap<K, V> {
    type Item = (&'a K, &'a V);
    type IntoIter = Iter<'a, K, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

fn height<K, V>(link: &Link<K, V>) -> u8 {
    link.as_ref().map_or(0, |n| n.height)
}

fn node<K, V>(key: K, value: V, left: Link<K, V>, right: Link<K, V>) -> Arc<Node<K, V>> {
    let height = height(&left).max(height(&right)) + 1;
    Arc::new(Node {
        key,
        value,
        height,
        left,
        right,
    })
}

/// Builds a node from possibly unbalanced children (heights differing by at
/// most two), rotating once or twice to restore the AVL bound.
fn balance<K: Clone, V: Clone>(
    key: K,
    value: V,
    left: Link<K, V>,
    right: Link<K, V>,
) -> Arc<Node<K, V>> {
    let hl = height(&left);
    let hr = height(&right);
    if hl > hr + 1 {
        if let Some(l) = left.as_deref() {
            if height(&l.left) >= height(&l.right) {
                let lowered = node(key, value, l.right.clone(), right);
                return node(
                    l.key.clone(),
                    l.value.clone(),
                    l.left.clone(),
                    Some(lowered),
                );
            }
            if let Some(lr) = l.right.as_deref() {
                let new_left = node(
                    l.key.clone(),
                    l.value.clone(),
                    l.left.clone(),
                    lr.left.clone(),
                );
                let new_right = node(key, value, lr.right.clone(), right);
                return node(
                    lr.key.clone(),
                    lr.value.clone(),
                    Some(new_left),
                    Some(new_right),
                );
            }
        }
    } else if hr > hl + 1
        && let Some(r) = right.as_deref()
    {
        if height(&r.right) >= height(&r.left) {
            let lowered = node(key, value, left, r.left.clone());
            return node(
                r.key.clone(),
                r.value.clone(),
                Some(lowered),
                r.right.clone(),
            );
        }
        if let Some(rl) = r.left.as_deref() {
            let new_left = node(key, value, left, rl.left.clone());
            let new_right = node(
                r.key.clone(),
                r.value.clone(),
                rl.right.clone(),
                r.right.clone(),
            );
            return node(
                rl.key.clone(),
                rl.value.clone(),
                Some(new_left),
                Some(new_right),
            );
        }
    }
    node(key, value, left, right)
}

/// Returns the new subtree and whether the key was not present before.
fn insert<K: Ord + Clone, V: Clone>(
    link: &Link<K, V>,
    key: K,
    value: V,
) -> (Arc<Node<K, V>>, bool) {
    let Some(n) = link else {
        return (node(key, value, None, None), true);
    };
    match key.cmp(&n.key) {
        Ordering::Less => {
            let (left, inserted) = insert(&n.left, key, value);
            (
                balance(n.key.clone(), n.value.clone(), Some(left), n.right.clone()),
                inserted,
            )
        }
        Ordering::Greater => {
            let (right, inserted) = insert(&n.right, key, value);
            (
                balance(n.key.clone(), n.value.clone(), n.left.clone(), Some(right)),
                inserted,
            )
        }
        Ordering::Equal => (
            Arc::new(Node {
                key,
                value,
                height: n.height,
                left: n.left.clone(),
                right: n.right.clone(),
            }),
            false,
        ),
    }
}

/// `None` when the key is absent; otherwise the rebuilt subtree.
fn remove<K, V, Q>(link: &Link<K, V>, key: &Q) -> Option<Link<K, V>>
where
    K: Ord + Clone + Borrow<Q>,
    V: Clone,
    Q: Ord + ?Sized,
{
    let n = link.as_ref()?;
    match key.cmp(n.key.borrow()) {
        Ordering::Less => {
            let left = remove(&n.left, key)?;
            Some(Some(balance(
                n.key.clone(),
                n.value.clone(),
                left,
                n.right.clone(),
            )))
        }
        Ordering::Greater => {
            let right = remove(&n.right, key)?;
            Some(Some(balance(
                n.key.clone(),
                n.value.clone(),
                n.left.clone(),
                right,
            )))
        }
        Ordering::Equal => Some(join(n)),
    }
}

fn join<K: Clone, V: Clone>(n: &Node<K, V>) -> Link<K, V> {
    match (&n.left, &n.right) {
        (None, right) => right.clone(),
        (left, None) => left.clone(),
        (left, Some(right)) => {
            let (key, value, rest) = take_min(right);
            Some(balance(key, value, left.clone(), rest))
        }
    }
}

fn take_min<K: Clone, V: Clone>(n: &Node<K, V>) -> (K, V, Link<K, V>) {
    match n.left.as_deref() {
        None => (n.key.clone(), n.value.clone(), n.right.clone()),
        Some(left) => {
            let (key, value, rest) = take_min(left);
            (
                key,
                value,
                Some(balance(n.key.clone(), n.value.clone(), rest, n.right.clone())),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Link, Node, PMap};
    use proptest::prelude::*;
    use std::collections::{BTreeMap, HashSet};
    use std::sync::Arc;

    fn sequential(n: i64) -> PMap<i64, i64> {
        (0..n).map(|k| (k, k * 10)).collect()
    }

    fn check_avl(link: &Link<i64, i64>) -> u8 {
        let Some(n) = link else { return 0 };
        if let Some(l) = &n.left {
            assert!(l.key < n.key, "left child out of order");
        }
        if let Some(r) = &n.right {
            assert!(r.key > n.key, "right child out of order");
        }
        let hl = check_avl(&n.left);
        let hr = check_avl(&n.right);
        assert!(hl.abs_diff(hr) <= 1, "unbalanced at {}", n.key);
        assert_eq!(n.height, hl.max(hr) + 1, "stale height at {}", n.key);
        n.height
    }

    fn node_ptrs(link: &Link<i64, i64>, out: &mut HashSet<*const Node<i64, i64>>) {
        if let Some(n) = link {
            out.insert(Arc::as_ptr(n));
            node_ptrs(&n.left, out);
            node_ptrs(&n.right, out);
        }
    }

    fn fresh_nodes(old: &PMap<i64, i64>, new: &PMap<i64, i64>) -> usize {
        let mut before = HashSet::new();
        node_ptrs(&old.root, &mut before);
        let mut after = HashSet::new();
        node_ptrs(&new.root, &mut after);
        after.difference(&before).count()
    }

    #[test]
    fn add_lookup_replace() {
        let map = PMap::new().add(2, "b").add(1, "a").add(3, "c");
        assert_eq!(map.len(), 3);
        assert_eq!(map.lookup(&1), Some(&"a"));
        assert_eq!(map.lookup(&4), None);

        let replaced = map.add(2, "B");
        assert_eq!(replaced.len(), 3);
        assert_eq!(replaced.lookup(&2), Some(&"B"));
        assert_eq!(map.lookup(&2), Some(&"b"), "older value is untouched");
    }

    #[test]
    fn remove_absent_key_is_a_no_op() {
        let map = sequential(10);
        let same = map.remove(&99);
        assert!(same.ptr_eq(&map));
        assert_eq!(same.len(), 10);

        let empty: PMap<i64, i64> = PMap::new();
        assert!(empty.remove(&1).is_empty());
    }

    #[test]
    fn remove_keeps_older_versions_readable() {
        let map = sequential(100);
        let fewer = (0..100).step_by(2).fold(map.clone(), |m, k| m.remove(&k));
        assert_eq!(fewer.len(), 50);
        assert!(!fewer.contains(&10));
        assert!(fewer.contains(&11));
        assert_eq!(map.len(), 100);
        assert!(map.contains(&10));
        check_avl(&fewer.root);
    }

    #[test]
    fn string_keys_lookup_by_str() {
        let map: PMap<String, u32> = PMap::new().add("users".to_string(), 1);
        assert_eq!(map.lookup("users"), Some(&1));
        assert!(!map.contains("orders"));
    }

    #[test]
    fn add_shares_every_subtree_off_the_search_path() {
        // 1023 sequential inserts give a perfect tree of height 10.
        let map = sequential(1023);
        assert_eq!(check_avl(&map.root), 10);

        let grown = map.add(5000, 0);
        let old_root = map.root.as_ref().expect("root");
        let new_root = grown.root.as_ref().expect("root");
        assert_eq!(old_root.key, new_root.key);
        assert!(!Arc::ptr_eq(old_root, new_root));
        let old_left = old_root.left.as_ref().expect("left");
        let new_left = new_root.left.as_ref().expect("left");
        assert!(Arc::ptr_eq(old_left, new_left), "left half is shared");
        assert!(fresh_nodes(&map, &grown) <= usize::from(old_root.height) + 1);
    }

    #[test]
    fn remove_shares_every_subtree_off_the_search_path() {
        let map = sequential(1023);
        let shrunk = map.remove(&1022);
        let old_root = map.root.as_ref().expect("root");
        let new_root = shrunk.root.as_ref().expect("root");
        assert!(Arc::ptr_eq(
            old_root.left.as_ref().expect("left"),
            new_root.left.as_ref().expect("left")
        ));
        assert!(fresh_nodes(&map, &shrunk) <= usize::from(old_root.height) + 2);
    }

    #[test]
    fn equality_is_structural() {
        let a = sequential(20);
        let b: PMap<i64, i64> = (0..20).rev().map(|k| (k, k * 10)).collect();
        assert_eq!(a, b);
        assert_ne!(a, b.add(3, 0));
    }

    proptest! {
        #[test]
        fn matches_btreemap_model(ops in prop::collection::vec((any::<bool>(), 0i64..64, any::<i64>()), 0..200)) {
            let mut model = BTreeMap::new();
            let mut map = PMap::new();
            for (is_add, key, value) in ops {
                if is_add {
                    model.insert(key, value);
                    map = map.add(key, value);
                } else {
                    model.remove(&key);
                    map = map.remove(&key);
                }
                prop_assert_eq!(map.len(), model.len());
            }
            check_avl(&map.root);
            let ours: Vec<(i64, i64)> = map.iter().map(|(k, v)| (*k, *v)).collect();
            let theirs: Vec<(i64, i64)> = model.into_iter().collect();
            prop_assert_eq!(ours, theirs);
        }
    }
}
