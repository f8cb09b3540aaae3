#![forbid(unsafe_code)]

//! Multi-key associative trie.
//!
//! Values are addressed by a fixed-length tuple of ordered keys. Each key
//! position is a ternary search tree whose `equal` links lead into the tree
//! for the next position, so a stored tuple is exactly one path of
//! `key_arity` matched nodes. Lookups may leave positions unspecified
//! (`None`) to match every key at that position.

use std::cmp::Ordering;
use std::fmt;

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TrieError {
    #[error("key arity must be at least 1")]
    ZeroArity,
    #[error("expected {expected} keys but got {found}")]
    ArityMismatch { expected: usize, found: usize },
}

type Link<K, V> = Option<Box<Node<K, V>>>;

struct Node<K, V> {
    key: K,
    value: Option<V>,
    lesser: Link<K, V>,
    equal: Link<K, V>,
    greater: Link<K, V>,
}

impl<K, V> Node<K, V> {
    fn new(key: K) -> Self {
        Self {
            key,
            value: None,
            lesser: None,
            equal: None,
            greater: None,
        }
    }

    /// Neither holds a value nor leads to one through the next key position.
    fn is_dead(&self) -> bool {
        self.value.is_none() && self.equal.is_none()
    }
}

/// Pending work for the explicit-stack traversals. Sorted inserts degrade a
/// position's tree into a chain as long as the key count, so no walk
/// recurses along `lesser`/`greater`.
enum Step<'a, K, V> {
    Enter(&'a Link<K, V>, usize),
    Visit(&'a Node<K, V>, usize),
}

pub struct KeyedTrie<K, V> {
    key_arity: usize,
    len: usize,
    root: Link<K, V>,
}

/// Free a subtree node by node instead of through nested `Box` drops.
fn release<K, V>(link: Link<K, V>) {
    let mut pending: Vec<Box<Node<K, V>>> = link.into_iter().collect();
    while let Some(mut node) = pending.pop() {
        pending.extend(node.lesser.take());
        pending.extend(node.equal.take());
        pending.extend(node.greater.take());
    }
}

impl<K, V> Drop for KeyedTrie<K, V> {
    fn drop(&mut self) {
        release(self.root.take());
    }
}

impl<K: Clone, V: Clone> Clone for KeyedTrie<K, V> {
    fn clone(&self) -> Self {
        // Pre-order with children visited greater-first; reversed, that is a
        // post-order in which every node follows its lesser, equal and
        // greater subtrees.
        let mut order: Vec<&Node<K, V>> = Vec::new();
        let mut pending: Vec<&Node<K, V>> = self.root.as_deref().into_iter().collect();
        while let Some(node) = pending.pop() {
            order.push(node);
            pending.extend(node.lesser.as_deref());
            pending.extend(node.equal.as_deref());
            pending.extend(node.greater.as_deref());
        }

        let mut built: Vec<Box<Node<K, V>>> = Vec::with_capacity(order.len());
        for node in order.into_iter().rev() {
            let greater = node.greater.as_ref().and_then(|_| built.pop());
            let equal = node.equal.as_ref().and_then(|_| built.pop());
            let lesser = node.lesser.as_ref().and_then(|_| built.pop());
            built.push(Box::new(Node {
                key: node.key.clone(),
                value: node.value.clone(),
                lesser,
                equal,
                greater,
            }));
        }

        Self {
            key_arity: self.key_arity,
            len: self.len,
            root: built.pop(),
        }
    }
}

impl<K, V> fmt::Debug for KeyedTrie<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyedTrie")
            .field("key_arity", &self.key_arity)
            .field("len", &self.len)
            .finish_non_exhaustive()
    }
}

impl<K: Ord + Clone, V> KeyedTrie<K, V> {
    pub fn new(key_arity: usize) -> Result<Self, TrieError> {
        if key_arity == 0 {
            return Err(TrieError::ZeroArity);
        }
        Ok(Self {
            key_arity,
            len: 0,
            root: None,
        })
    }

    #[must_use]
    pub fn key_arity(&self) -> usize {
        self.key_arity
    }

    /// Number of distinct key tuples currently holding a value.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn check_arity(&self, found: usize) -> Result<(), TrieError> {
        if found != self.key_arity {
            return Err(TrieError::ArityMismatch {
                expected: self.key_arity,
                found,
            });
        }
        Ok(())
    }

    /// Store `value` under `keys`, returning the value it replaced.
    pub fn insert(&mut self, value: V, keys: &[K]) -> Result<Option<V>, TrieError> {
        self.check_arity(keys.len())?;

        let last = keys.len() - 1;
        let mut pos = 0;
        let mut link = &mut self.root;
        loop {
            let key = &keys[pos];
            let node: &mut Node<K, V> = link.get_or_insert_with(|| Box::new(Node::new(key.clone())));
            match key.cmp(&node.key) {
                Ordering::Less => link = &mut node.lesser,
                Ordering::Greater => link = &mut node.greater,
                Ordering::Equal if pos == last => {
                    let previous = node.value.replace(value);
                    if previous.is_none() {
                        self.len += 1;
                    }
                    return Ok(previous);
                }
                Ordering::Equal => {
                    pos += 1;
                    link = &mut node.equal;
                }
            }
        }
    }

    /// All values whose tuple matches `keys`, in key order.
    ///
    /// `None` at a position is a wildcard matching every key there.
    pub fn find(&self, keys: &[Option<K>]) -> Result<Vec<&V>, TrieError> {
        self.check_arity(keys.len())?;
        let mut out = Vec::new();
        Self::collect(&self.root, keys, &mut out);
        Ok(out)
    }

    fn collect<'a>(root: &'a Link<K, V>, keys: &[Option<K>], out: &mut Vec<&'a V>) {
        let last = keys.len() - 1;
        let mut pending = vec![Step::Enter(root, 0)];
        while let Some(step) = pending.pop() {
            match step {
                Step::Enter(link, pos) => {
                    let Some(node) = link.as_deref() else {
                        continue;
                    };
                    match &keys[pos] {
                        Some(key) => match key.cmp(&node.key) {
                            Ordering::Less => pending.push(Step::Enter(&node.lesser, pos)),
                            Ordering::Greater => pending.push(Step::Enter(&node.greater, pos)),
                            Ordering::Equal => pending.push(Step::Visit(node, pos)),
                        },
                        None => {
                            pending.push(Step::Enter(&node.greater, pos));
                            pending.push(Step::Visit(node, pos));
                            pending.push(Step::Enter(&node.lesser, pos));
                        }
                    }
                }
                Step::Visit(node, pos) if pos == last => out.extend(node.value.as_ref()),
                Step::Visit(node, pos) => pending.push(Step::Enter(&node.equal, pos + 1)),
            }
        }
    }

    /// Exact lookup.
    pub fn get(&self, keys: &[K]) -> Result<Option<&V>, TrieError> {
        self.check_arity(keys.len())?;

        let last = keys.len() - 1;
        let mut pos = 0;
        let mut link = &self.root;
        while let Some(node) = link.as_deref() {
            match keys[pos].cmp(&node.key) {
                Ordering::Less => link = &node.lesser,
                Ordering::Greater => link = &node.greater,
                Ordering::Equal if pos == last => return Ok(node.value.as_ref()),
                Ordering::Equal => {
                    pos += 1;
                    link = &node.equal;
                }
            }
        }
        Ok(None)
    }

    pub fn contains(&self, keys: &[Option<K>]) -> Result<bool, TrieError> {
        Ok(!self.find(keys)?.is_empty())
    }

    /// Clear the value stored under `keys` and prune nodes left without any
    /// value beneath them.
    pub fn remove(&mut self, keys: &[K]) -> Result<Option<V>, TrieError> {
        self.check_arity(keys.len())?;
        let removed = Self::remove_at(&mut self.root, keys, 0);
        if removed.is_some() {
            self.len -= 1;
        }
        Ok(removed)
    }

    /// Siblings at one position are reached by looping; only the `equal`
    /// hop recurses, so depth is bounded by the key arity.
    fn remove_at(mut link: &mut Link<K, V>, keys: &[K], pos: usize) -> Option<V> {
        loop {
            let ordering = keys[pos].cmp(&link.as_ref()?.key);
            match ordering {
                Ordering::Less => link = &mut link.as_mut()?.lesser,
                Ordering::Greater => link = &mut link.as_mut()?.greater,
                Ordering::Equal => break,
            }
        }
        let node = link.as_mut()?;
        let removed = if pos + 1 == keys.len() {
            node.value.take()
        } else {
            Self::remove_at(&mut node.equal, keys, pos + 1)
        };
        if removed.is_some() && node.is_dead() {
            Self::unlink(link);
        }
        removed
    }

    /// Replace the node in `link` by its siblings, keeping search order:
    /// everything in `lesser` sorts before everything in `greater`, so the
    /// greater subtree hangs off the rightmost node of the lesser one.
    fn unlink(link: &mut Link<K, V>) {
        let Some(mut node) = link.take() else {
            return;
        };
        *link = match (node.lesser.take(), node.greater.take()) {
            (None, None) => None,
            (Some(lesser), None) => Some(lesser),
            (None, Some(greater)) => Some(greater),
            (Some(mut lesser), Some(greater)) => {
                let mut slot = &mut lesser.greater;
                while let Some(next) = slot {
                    slot = &mut next.greater;
                }
                *slot = Some(greater);
                Some(lesser)
            }
        };
    }

    pub fn remove_all(&mut self) {
        release(self.root.take());
        self.len = 0;
    }

    /// Every stored tuple with its value, in key order.
    #[must_use]
    pub fn entries(&self) -> Vec<(Vec<K>, &V)> {
        let mut out = Vec::with_capacity(self.len);
        let mut prefix = Vec::with_capacity(self.key_arity);
        Self::walk(&self.root, &mut prefix, &mut out);
        out
    }

    fn walk<'a>(root: &'a Link<K, V>, prefix: &mut Vec<K>, out: &mut Vec<(Vec<K>, &'a V)>) {
        let mut pending = vec![Step::Enter(root, 0)];
        while let Some(step) = pending.pop() {
            match step {
                Step::Enter(link, depth) => {
                    if let Some(node) = link.as_deref() {
                        pending.push(Step::Enter(&node.greater, depth));
                        pending.push(Step::Visit(node, depth));
                        pending.push(Step::Enter(&node.lesser, depth));
                    }
                }
                Step::Visit(node, depth) => {
                    prefix.truncate(depth);
                    prefix.push(node.key.clone());
                    if let Some(value) = &node.value {
                        out.push((prefix.clone(), value));
                    }
                    pending.push(Step::Enter(&node.equal, depth + 1));
                }
            }
        }
    }

    #[cfg(test)]
    fn node_count(&self) -> usize {
        let mut count = 0;
        let mut pending: Vec<&Node<K, V>> = self.root.as_deref().into_iter().collect();
        while let Some(node) = pending.pop() {
            count += 1;
            pending.extend(node.lesser.as_deref());
            pending.extend(node.equal.as_deref());
            pending.extend(node.greater.as_deref());
        }
        count
    }
}

#[cfg(test)]
mod tests {
    use super::{KeyedTrie, Link, Node, TrieError};

    /// The shape `0..n` inserted in ascending order produces: one `greater`
    /// chain. Built directly so the test does not pay the quadratic insert.
    fn ascending_chain(n: u32) -> KeyedTrie<u32, u32> {
        let mut trie = KeyedTrie::new(1).expect("arity 1");
        let mut link: Link<u32, u32> = None;
        for k in (0..n).rev() {
            let mut node = Node::new(k);
            node.value = Some(k);
            node.greater = link;
            link = Some(Box::new(node));
        }
        trie.root = link;
        trie.len = n as usize;
        trie
    }

    fn names() -> KeyedTrie<String, i32> {
        let mut trie = KeyedTrie::new(2).expect("arity 2");
        for (first, last, value) in [
            ("Bob", "Smith", 123),
            ("Alice", "Smith", 7),
            ("Bob", "Jones", 42),
            ("Carol", "Adams", 9),
        ] {
            trie.insert(value, &[first.to_owned(), last.to_owned()])
                .expect("insert");
        }
        trie
    }

    fn key(first: Option<&str>, last: Option<&str>) -> Vec<Option<String>> {
        vec![first.map(str::to_owned), last.map(str::to_owned)]
    }

    #[test]
    fn wildcard_lookup_then_remove_empties_trie() {
        let mut trie = KeyedTrie::new(2).expect("arity 2");
        let bob = ["Bob".to_owned(), "Smith".to_owned()];
        trie.insert(123, &bob).expect("insert");

        assert_eq!(trie.find(&key(None, Some("Smith"))).expect("find"), vec![&123]);

        assert_eq!(trie.remove(&bob).expect("remove"), Some(123));
        assert!(trie.find(&key(None, Some("Smith"))).expect("find").is_empty());
        assert_eq!(trie.len(), 0);
        assert!(trie.is_empty());
    }

    #[test]
    fn find_discriminates_per_position() {
        let trie = names();
        assert_eq!(trie.find(&key(Some("Bob"), None)).expect("find"), vec![&42, &123]);
        assert_eq!(trie.find(&key(None, Some("Smith"))).expect("find"), vec![&7, &123]);
        assert_eq!(trie.find(&key(None, None)).expect("find").len(), 4);
        assert!(trie.find(&key(Some("Dave"), None)).expect("find").is_empty());
        assert!(trie.contains(&key(Some("Carol"), Some("Adams"))).expect("contains"));
        assert!(!trie.contains(&key(Some("Carol"), Some("Smith"))).expect("contains"));
    }

    #[test]
    fn insert_overwrites_existing_tuple() {
        let mut trie = names();
        let previous = trie
            .insert(500, &["Bob".to_owned(), "Smith".to_owned()])
            .expect("upsert");
        assert_eq!(previous, Some(123));
        assert_eq!(trie.len(), 4);
        assert_eq!(
            trie.get(&["Bob".to_owned(), "Smith".to_owned()]).expect("get"),
            Some(&500)
        );
    }

    #[test]
    fn arity_mismatch_is_rejected() {
        let mut trie: KeyedTrie<i32, i32> = KeyedTrie::new(3).expect("arity 3");
        assert_eq!(
            trie.insert(1, &[1, 2]),
            Err(TrieError::ArityMismatch {
                expected: 3,
                found: 2
            })
        );
        assert!(trie.find(&[Some(1)]).is_err());
        assert!(trie.remove(&[1, 2, 3, 4]).is_err());
        assert_eq!(
            KeyedTrie::<i32, i32>::new(0).expect_err("zero arity"),
            TrieError::ZeroArity
        );
    }

    #[test]
    fn removing_absent_tuple_keeps_count() {
        let mut trie = names();
        assert_eq!(
            trie.remove(&["Zed".to_owned(), "Smith".to_owned()]).expect("remove"),
            None
        );
        assert_eq!(trie.len(), 4);
    }

    #[test]
    fn remove_prunes_dead_nodes_and_keeps_siblings() {
        let mut trie: KeyedTrie<i32, &str> = KeyedTrie::new(2).expect("arity 2");
        for (a, b, v) in [(5, 1, "a"), (3, 1, "b"), (8, 1, "c"), (4, 2, "d"), (7, 9, "e")] {
            trie.insert(v, &[a, b]).expect("insert");
        }
        let before = trie.node_count();

        // 5 is the root of the first position with both lesser and greater subtrees.
        assert_eq!(trie.remove(&[5, 1]).expect("remove"), Some("a"));
        assert!(trie.node_count() < before);
        let remaining: Vec<_> = trie
            .entries()
            .into_iter()
            .map(|(keys, v)| (keys, *v))
            .collect();
        assert_eq!(
            remaining,
            vec![
                (vec![3, 1], "b"),
                (vec![4, 2], "d"),
                (vec![7, 9], "e"),
                (vec![8, 1], "c"),
            ]
        );
        for (keys, v) in remaining {
            assert_eq!(trie.get(&keys).expect("get"), Some(&v));
        }
    }

    #[test]
    fn removing_everything_frees_all_nodes() {
        let mut trie = names();
        for (keys, _) in names().entries() {
            trie.remove(&keys).expect("remove");
        }
        assert_eq!(trie.len(), 0);
        assert_eq!(trie.node_count(), 0);
    }

    #[test]
    fn remove_all_resets() {
        let mut trie = names();
        trie.remove_all();
        assert!(trie.is_empty());
        assert!(trie.entries().is_empty());
        trie.insert(1, &["x".to_owned(), "y".to_owned()]).expect("insert");
        assert_eq!(trie.len(), 1);
    }

    #[test]
    fn single_key_trie_behaves_like_ordered_map() {
        let mut trie = KeyedTrie::new(1).expect("arity 1");
        for k in [10, 2, 7, 2] {
            trie.insert(k * 10, &[k]).expect("insert");
        }
        assert_eq!(trie.len(), 3);
        assert_eq!(trie.find(&[None]).expect("find"), vec![&20, &70, &100]);
        assert_eq!(trie.get(&[7]).expect("get"), Some(&70));
    }

    #[test]
    fn ascending_chain_matches_sorted_inserts() {
        let mut inserted = KeyedTrie::new(1).expect("arity 1");
        for k in 0..500_u32 {
            inserted.insert(k, &[k]).expect("insert");
        }
        let chain = ascending_chain(500);
        assert_eq!(inserted.node_count(), chain.node_count());
        assert_eq!(inserted.entries(), chain.entries());
    }

    #[test]
    fn long_sorted_chains_do_not_exhaust_the_stack() {
        let n = 200_000_u32;
        let mut trie = ascending_chain(n);

        assert_eq!(trie.find(&[None]).expect("find").len(), n as usize);
        assert_eq!(trie.entries().len(), n as usize);
        assert_eq!(trie.get(&[n - 1]).expect("get"), Some(&(n - 1)));

        let copy = trie.clone();
        assert_eq!(copy.len(), trie.len());
        assert_eq!(copy.get(&[n / 2]).expect("get"), Some(&(n / 2)));

        assert_eq!(trie.remove(&[n - 1]).expect("remove"), Some(n - 1));
        assert_eq!(trie.remove(&[n / 2]).expect("remove"), Some(n / 2));
        assert_eq!(trie.len(), n as usize - 2);
        assert_eq!(trie.get(&[n / 2 + 1]).expect("get"), Some(&(n / 2 + 1)));

        drop(copy);
        trie.remove_all();
        assert!(trie.is_empty());

        let deep = ascending_chain(n);
        drop(deep);
    }
}
