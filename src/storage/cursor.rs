use crate::storage::pmap::{Link, Node};
use std::borrow::Borrow;
use std::sync::Arc;

/// A position in one immutable [`crate::storage::PMap`] value.
///
/// The cursor owns references to the nodes it walks, so it stays valid after
/// the map it came from is dropped or replaced, and stepping it never
/// invalidates the cursor it was stepped from.
pub struct Cursor<K, V> {
    current: Arc<Node<K, V>>,
    // Ancestors still to be visited, nearest on top.
    pending: Vec<Arc<Node<K, V>>>,
}

impl<K, V> Cursor<K, V> {
    pub(crate) fn first(root: Option<&Arc<Node<K, V>>>) -> Option<Self> {
        let mut pending = Vec::new();
        push_left_spine(&mut pending, root.cloned());
        Self::from_stack(pending)
    }

    pub(crate) fn lower_bound<Q>(root: Option<&Arc<Node<K, V>>>, key: &Q) -> Option<Self>
    where
        K: Ord + Borrow<Q>,
        Q: Ord + ?Sized,
    {
        let mut pending = Vec::new();
        let mut link = root.cloned();
        while let Some(n) = link {
            if n.key.borrow() >= key {
                link = n.left.clone();
                pending.push(n);
            } else {
                link = n.right.clone();
            }
        }
        Self::from_stack(pending)
    }

    fn from_stack(mut pending: Vec<Arc<Node<K, V>>>) -> Option<Self> {
        let current = pending.pop()?;
        Some(Self { current, pending })
    }

    pub fn key(&self) -> &K {
        &self.current.key
    }

    pub fn value(&self) -> &V {
        &self.current.value
    }

    /// The following entry in ascending key order.
    pub fn next(&self) -> Option<Self> {
        let mut pending = self.pending.clone();
        push_left_spine(&mut pending, self.current.right.clone());
        Self::from_stack(pending)
    }
}

impl<K, V> Clone for Cursor<K, V> {
    fn clone(&self) -> Self {
        Self {
            current: Arc::clone(&self.current),
            pending: self.pending.clone(),
        }
    }
}

fn push_left_spine<K, V>(stack: &mut Vec<Arc<Node<K, V>>>, mut link: Link<K, V>) {
    while let Some(n) = link {
        link = n.left.clone();
        stack.push(n);
    }
}

/// Borrowing in-order iterator; cheaper than stepping a [`Cursor`].
pub struct Iter<'a, K, V> {
    stack: Vec<&'a Node<K, V>>,
    remaining: Option<usize>,
}

impl<'a, K, V> Iter<'a, K, V> {
    pub(crate) fn new(root: Option<&'a Node<K, V>>, len: usize) -> Self {
        let mut iter = Self {
            stack: Vec::new(),
            remaining: Some(len),
        };
        iter.push_left(root);
        iter
    }

    pub(crate) fn lower_bound<Q>(root: Option<&'a Node<K, V>>, key: &Q) -> Self
    where
        K: Ord + Borrow<Q>,
        Q: Ord + ?Sized,
    {
        let mut stack = Vec::new();
        let mut link = root;
        while let Some(n) = link {
            if n.key.borrow() >= key {
                stack.push(n);
                link = n.left.as_deref();
            } else {
                link = n.right.as_deref();
            }
        }
        Self {
            stack,
            remaining: None,
        }
    }

    fn push_left(&mut self, mut link: Option<&'a Node<K, V>>) {
        while let Some(n) = link {
            self.stack.push(n);
            link = n.left.as_deref();
        }
    }
}

impl<'a, K, V> Iterator for Iter<'a, K, V> {
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        let n = self.stack.pop()?;
        self.push_left(n.right.as_deref());
        if let Some(remaining) = self.remaining.as_mut() {
            *remaining = remaining.saturating_sub(1);
        }
        Some((&n.key, &n.value))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        match self.remaining {
            Some(n) => (n, Some(n)),
            None => (0, None),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::storage::PMap;

    fn collect_from(mut cursor: Option<crate::storage::Cursor<i64, &'static str>>) -> Vec<i64> {
        let mut out = Vec::new();
        while let Some(c) = cursor {
            out.push(*c.key());
            cursor = c.next();
        }
        out
    }

    #[test]
    fn cursor_walks_in_ascending_order() {
        let map = [5, 1, 9, 3, 7]
            .into_iter()
            .fold(PMap::new(), |m, k| m.add(k, "v"));
        assert_eq!(collect_from(map.first()), vec![1, 3, 5, 7, 9]);
        assert!(PMap::<i64, &str>::new().first().is_none());
    }

    #[test]
    fn position_at_finds_first_key_not_below_target() {
        let map = [10, 20, 30, 40]
            .into_iter()
            .fold(PMap::new(), |m, k| m.add(k, "v"));
        assert_eq!(collect_from(map.position_at(&20)), vec![20, 30, 40]);
        assert_eq!(collect_from(map.position_at(&21)), vec![30, 40]);
        assert_eq!(collect_from(map.position_at(&0)), vec![10, 20, 30, 40]);
        assert!(map.position_at(&41).is_none());
        let from: Vec<i64> = map.range_from(&25).map(|(k, _)| *k).collect();
        assert_eq!(from, vec![30, 40]);
    }

    #[test]
    fn cursor_is_unaffected_by_later_updates() {
        let map = (0..50).fold(PMap::new(), |m, k| m.add(k, "old"));
        let cursor = map.position_at(&10).expect("cursor");
        let changed = (0..50).fold(map.clone(), |m, k| m.remove(&k)).add(10, "new");
        drop(map);
        assert_eq!(*cursor.value(), "old");
        assert_eq!(collect_from(Some(cursor.clone())), (10..50).collect::<Vec<_>>());
        // Restartable: stepping did not consume the original position.
        assert_eq!(*cursor.key(), 10);
        assert_eq!(changed.lookup(&10), Some(&"new"));
    }

    #[test]
    fn iter_reports_exact_length() {
        let map = (0..7).fold(PMap::new(), |m, k| m.add(k, "v"));
        let mut iter = map.iter();
        assert_eq!(iter.size_hint(), (7, Some(7)));
        iter.next();
        assert_eq!(iter.size_hint(), (6, Some(6)));
    }
}
