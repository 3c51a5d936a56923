use crate::utils::Slab;

use std::cmp::Ordering;
use std::fmt;

/// Stable handle to a node stored in a [`FibHeap`].
///
/// A handle stays valid until its node is extracted or deleted. The serial
/// number makes a handle to a removed node fail lookups even after its arena
/// slot has been reused by a newer node.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct NodeId {
    index: usize,
    serial: u64,
}

/// Errors reported by [`FibHeap::decrease_key`].
///
/// Both variants hand the rejected key back to the caller, and in both cases
/// the heap is left exactly as it was.
pub enum HeapError<K> {
    /// The new key does not compare strictly less than the current one.
    NotDecreased(K),
    /// The handle does not refer to a node held by this heap.
    StaleHandle(K),
}

impl<K> HeapError<K> {
    /// Returns the key that was rejected.
    pub fn into_key(self) -> K {
        match self {
            HeapError::NotDecreased(key) | HeapError::StaleHandle(key) => key,
        }
    }
}

impl<K> fmt::Debug for HeapError<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HeapError::NotDecreased(_) => f.write_str("NotDecreased(..)"),
            HeapError::StaleHandle(_) => f.write_str("StaleHandle(..)"),
        }
    }
}

impl<K> fmt::Display for HeapError<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HeapError::NotDecreased(_) => {
                f.write_str("new key does not compare less than the current key")
            }
            HeapError::StaleHandle(_) => f.write_str("node handle is not held by this heap"),
        }
    }
}

impl<K> std::error::Error for HeapError<K> {}

struct Node<K> {
    key: K,
    serial: u64,

    /// Set by `delete`: the node compares below every other key.
    minus_infinity: bool,

    parent: Option<usize>,
    child: Option<usize>,

    /// Sibling ring. A lone node points at itself.
    left: usize,
    right: usize,

    degree: usize,
    mark: bool,
}

/// A mergeable priority queue with O(1) amortized insert and decrease-key.
///
/// Nodes live in an arena and are linked through indices: the root list and
/// every child list are circular doubly linked rings threaded through the
/// `left`/`right` fields. Ordering comes from a caller-supplied comparator;
/// along every parent to child edge the parent never compares greater than
/// the child.
///
/// # Examples
///
/// ```
/// use vigil::heap::FibHeap;
///
/// let mut heap = FibHeap::new();
/// let a = heap.insert(30);
/// heap.insert(10);
/// heap.insert(20);
///
/// heap.decrease_key(a, 5).unwrap();
/// assert_eq!(heap.extract_min(), Some(5));
/// assert_eq!(heap.extract_min(), Some(10));
/// assert_eq!(heap.len(), 1);
/// ```
pub struct FibHeap<K, C = fn(&K, &K) -> Ordering> {
    nodes: Slab<Node<K>>,
    min: Option<usize>,
    compare: C,
    next_serial: u64,
}

impl<K: Ord> FibHeap<K> {
    /// Creates an empty heap ordered by `K`'s [`Ord`] implementation.
    pub fn new() -> Self {
        Self::with_comparator(<K as Ord>::cmp)
    }
}

impl<K: Ord> Default for FibHeap<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, C> FibHeap<K, C>
where
    C: Fn(&K, &K) -> Ordering,
{
    /// Creates an empty heap ordered by `compare`.
    pub fn with_comparator(compare: C) -> Self {
        Self {
            nodes: Slab::new(16),
            min: None,
            compare,
            next_serial: 0,
        }
    }

    /// Number of nodes currently held.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.min.is_none()
    }

    /// Returns `true` if `id` refers to a node held by this heap.
    pub fn contains(&self, id: NodeId) -> bool {
        self.resolve(id).is_some()
    }

    /// Returns the key of the node behind `id`.
    pub fn get(&self, id: NodeId) -> Option<&K> {
        self.resolve(id).map(|index| &self.nodes[index].key)
    }

    /// Peeks at the smallest key.
    pub fn minimum(&self) -> Option<&K> {
        self.min.map(|index| &self.nodes[index].key)
    }

    /// Handle of the node holding the smallest key.
    pub fn min_id(&self) -> Option<NodeId> {
        self.min.map(|index| self.handle(index))
    }

    /// Adds `key` to the root ring and returns a handle to its node.
    pub fn insert(&mut self, key: K) -> NodeId {
        let serial = self.next_serial;
        self.next_serial += 1;

        let index = self.nodes.insert(Node {
            key,
            serial,
            minus_infinity: false,
            parent: None,
            child: None,
            left: 0,
            right: 0,
            degree: 0,
            mark: false,
        });
        self.nodes[index].left = index;
        self.nodes[index].right = index;

        self.add_root(index);

        NodeId { index, serial }
    }

    /// Removes the smallest key and returns it.
    ///
    /// The children of the removed node are promoted to the root ring and
    /// the roots are consolidated so that no two share a degree.
    pub fn extract_min(&mut self) -> Option<K> {
        let z = self.min?;

        while let Some(child) = self.nodes[z].child {
            self.detach_child(child, z);
            self.splice_after(z, child);
        }

        let next = self.nodes[z].right;
        self.unlink(z);

        if next == z {
            self.min = None;
        } else {
            self.min = Some(next);
            self.consolidate();
        }

        Some(self.nodes.remove(z).key)
    }

    /// Lowers the key of `id` to `key`.
    ///
    /// Fails without touching the heap unless `key` compares strictly less
    /// than the node's current key.
    pub fn decrease_key(&mut self, id: NodeId, key: K) -> Result<(), HeapError<K>> {
        let Some(x) = self.resolve(id) else {
            return Err(HeapError::StaleHandle(key));
        };

        let node = &self.nodes[x];
        if node.minus_infinity || (self.compare)(&key, &node.key) != Ordering::Less {
            return Err(HeapError::NotDecreased(key));
        }

        self.nodes[x].key = key;
        self.restore_after_decrease(x);

        Ok(())
    }

    /// Removes the node behind `id` and returns its key.
    ///
    /// The node is first decreased to minus infinity, which makes it the
    /// minimum, and then extracted.
    pub fn delete(&mut self, id: NodeId) -> Option<K> {
        let x = self.resolve(id)?;

        self.nodes[x].minus_infinity = true;
        self.restore_after_decrease(x);

        debug_assert_eq!(self.min, Some(x));
        self.extract_min()
    }

    fn resolve(&self, id: NodeId) -> Option<usize> {
        self.nodes
            .get(id.index)
            .filter(|node| node.serial == id.serial)
            .map(|_| id.index)
    }

    fn handle(&self, index: usize) -> NodeId {
        NodeId {
            index,
            serial: self.nodes[index].serial,
        }
    }

    fn less(&self, a: usize, b: usize) -> bool {
        let (a, b) = (&self.nodes[a], &self.nodes[b]);

        match (a.minus_infinity, b.minus_infinity) {
            (true, false) => true,
            (_, true) => false,
            (false, false) => (self.compare)(&a.key, &b.key) == Ordering::Less,
        }
    }

    fn add_root(&mut self, index: usize) {
        match self.min {
            None => self.min = Some(index),
            Some(min) => {
                self.splice_after(min, index);
                if self.less(index, min) {
                    self.min = Some(index);
                }
            }
        }
    }

    /// Cuts `x` from its parent if the heap property broke, then cascades.
    fn restore_after_decrease(&mut self, x: usize) {
        if let Some(parent) = self.nodes[x].parent {
            if self.less(x, parent) {
                self.cut(x, parent);
                self.cascading_cut(parent);
            }
        }

        if let Some(min) = self.min {
            if self.less(x, min) {
                self.min = Some(x);
            }
        }
    }

    /// Moves `x` from the child ring of `parent` into the root ring.
    fn cut(&mut self, x: usize, parent: usize) {
        self.detach_child(x, parent);

        // Any node with a parent implies a non-empty root ring.
        let min = self.min.unwrap_or(x);
        self.splice_after(min, x);
    }

    fn cascading_cut(&mut self, mut y: usize) {
        while let Some(z) = self.nodes[y].parent {
            if !self.nodes[y].mark {
                self.nodes[y].mark = true;
                return;
            }

            self.cut(y, z);
            y = z;
        }
    }

    /// Unlinks `x` from the child ring of `parent`, leaving `x` a lone ring.
    fn detach_child(&mut self, x: usize, parent: usize) {
        if self.nodes[x].right == x {
            self.nodes[parent].child = None;
        } else {
            if self.nodes[parent].child == Some(x) {
                self.nodes[parent].child = Some(self.nodes[x].right);
            }
            self.unlink(x);
        }

        let p = &mut self.nodes[parent];
        p.degree -= 1;

        let node = &mut self.nodes[x];
        node.parent = None;
        node.mark = false;
    }

    fn consolidate(&mut self) {
        let Some(start) = self.min else {
            return;
        };

        let mut roots = Vec::new();
        let mut cursor = start;
        loop {
            roots.push(cursor);
            cursor = self.nodes[cursor].right;
            if cursor == start {
                break;
            }
        }

        let mut buckets: Vec<Option<usize>> = vec![None; usize::BITS as usize + 1];

        for w in roots {
            let mut x = w;
            let mut degree = self.nodes[x].degree;

            loop {
                if degree >= buckets.len() {
                    buckets.resize(degree + 1, None);
                }

                let Some(mut y) = buckets[degree].take() else {
                    break;
                };

                if self.less(y, x) {
                    std::mem::swap(&mut x, &mut y);
                }

                self.link(y, x);
                degree += 1;
            }

            buckets[degree] = Some(x);
        }

        self.min = None;
        for root in buckets.into_iter().flatten() {
            match self.min {
                Some(min) if !self.less(root, min) => {}
                _ => self.min = Some(root),
            }
        }
    }

    /// Makes root `y` a child of root `x`.
    fn link(&mut self, y: usize, x: usize) {
        self.unlink(y);

        match self.nodes[x].child {
            None => self.nodes[x].child = Some(y),
            Some(child) => self.splice_after(child, y),
        }

        let node = &mut self.nodes[y];
        node.parent = Some(x);
        node.mark = false;

        self.nodes[x].degree += 1;
    }

    /// Inserts lone node `x` into the ring right after `anchor`.
    fn splice_after(&mut self, anchor: usize, x: usize) {
        let right = self.nodes[anchor].right;

        self.nodes[x].left = anchor;
        self.nodes[x].right = right;
        self.nodes[anchor].right = x;
        self.nodes[right].left = x;
    }

    /// Removes `x` from whatever ring it is in, leaving it a lone ring.
    fn unlink(&mut self, x: usize) {
        let (left, right) = (self.nodes[x].left, self.nodes[x].right);

        self.nodes[left].right = right;
        self.nodes[right].left = left;

        self.nodes[x].left = x;
        self.nodes[x].right = x;
    }
}

#[cfg(test)]
impl<K, C> FibHeap<K, C>
where
    C: Fn(&K, &K) -> Ordering,
{
    /// Walks every ring and checks structure, heap order, and node count.
    fn check_invariants(&self) {
        let Some(min) = self.min else {
            assert_eq!(self.len(), 0);
            return;
        };

        let mut seen = 0;
        let mut stack = vec![(min, None::<usize>)];

        while let Some((start, parent)) = stack.pop() {
            let mut cursor = start;
            let mut siblings = 0;
            loop {
                let node = &self.nodes[cursor];
                assert_eq!(self.nodes[node.right].left, cursor, "broken ring");
                assert_eq!(node.parent, parent, "wrong parent link");

                match parent {
                    Some(p) => assert!(!self.less(cursor, p), "heap order violated"),
                    None => assert!(!self.less(cursor, min), "stale minimum"),
                }

                if let Some(child) = node.child {
                    let mut degree = 0;
                    let mut c = child;
                    loop {
                        degree += 1;
                        c = self.nodes[c].right;
                        if c == child {
                            break;
                        }
                    }
                    assert_eq!(degree, node.degree, "degree mismatch");
                    stack.push((child, Some(cursor)));
                } else {
                    assert_eq!(node.degree, 0);
                }

                seen += 1;
                siblings += 1;
                assert!(siblings <= self.len(), "ring does not close");

                cursor = node.right;
                if cursor == start {
                    break;
                }
            }
        }

        assert_eq!(seen, self.len(), "node count mismatch");
    }

    /// Structural fingerprint used to prove a failed call changed nothing.
    #[allow(clippy::type_complexity)]
    fn fingerprint(&self) -> Vec<(usize, Option<usize>, Option<usize>, usize, usize, usize, bool)> {
        let mut out = Vec::new();
        let mut index = 0;
        let mut found = 0;
        while found < self.len() {
            if let Some(n) = self.nodes.get(index) {
                out.push((index, n.parent, n.child, n.left, n.right, n.degree, n.mark));
                found += 1;
            }
            index += 1;
        }
        out
    }
}
