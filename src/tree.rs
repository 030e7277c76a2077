use crate::vecs::{AllocFailed, NodeVec};

use arrayvec::ArrayVec;
use std::{
    cmp::Ordering,
    fmt,
    fmt::Debug,
    iter::FusedIterator,
    mem,
};

/// Default node byte budget, a cache-line multiple.
pub const DEFAULT_NODE_SIZE: usize = 512;

/// Maximum tree height supported by iterators. Any tree with minimum degree
/// two or more stays far below this for every realistic key count.
pub const MAX_DEPTH: usize = 64;

/// Error returned by tree construction or by a failed insertion.
#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum Error {
    /// The node byte budget cannot hold an internal node of minimum degree 2.
    #[error("node size {node_size} cannot hold minimum degree 2 for {key_size}-byte keys")]
    NodeSizeTooSmall {
        /// Requested node byte budget.
        node_size: usize,
        /// Size of the key type in bytes.
        key_size: usize,
    },
    /// The allocator could not supply a node block.
    #[error("node allocation failed")]
    AllocationFailed,
}

impl From<AllocFailed> for Error {
    fn from(_: AllocFailed) -> Self {
        Error::AllocationFailed
    }
}

/// Three-way comparison supplied once per tree at construction. Must be a
/// consistent total order with no side effects.
pub trait Comparator<K> {
    /// Compare `a` with `b`.
    fn cmp(&self, a: &K, b: &K) -> Ordering;
}

/// Default comparator: the natural order of the key type.
#[derive(Debug, Default, Clone, Copy)]
pub struct NaturalOrder;

impl<K: Ord> Comparator<K> for NaturalOrder {
    fn cmp(&self, a: &K, b: &K) -> Ordering {
        a.cmp(b)
    }
}

/// Node layout descriptor: minimum degree and the two allocation size
/// classes, fixed for the tree's lifetime. Computed once at construction,
/// never recomputed per access.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Layout {
    /// Minimum degree: every non-root node holds at least `t - 1` keys.
    pub t: usize,
    /// Maximum keys per node, `2 * t - 1`.
    pub n: usize,
    /// Bytes of a leaf node block (key array only).
    pub leaf_bytes: usize,
    /// Bytes of an internal node block (key array plus child array).
    pub internal_bytes: usize,
}

impl Layout {
    /// Largest `t` such that `2t - 1` keys and `2t` child references fit the
    /// byte budget. Fails when even `t = 2` does not fit.
    fn compute<K>(node_size: usize) -> Result<Self, Error> {
        let key_size = mem::size_of::<K>();
        let child_size = mem::size_of::<Node<K>>();
        let avail = node_size.saturating_sub(child_size);
        let t = (avail / (key_size + child_size) + 1) / 2;
        if t < 2 {
            return Err(Error::NodeSizeTooSmall {
                node_size,
                key_size,
            });
        }
        let n = 2 * t - 1;
        Ok(Self {
            t,
            n,
            leaf_bytes: n * key_size,
            internal_bytes: n * key_size + (n + 1) * child_size,
        })
    }
}

/// Live key and node counters.
#[derive(Debug, Clone, Copy)]
struct Counts {
    keys: usize,
    nodes: usize,
}

/// Order-preserving B-tree index over keys compared by `C`.
///
/// Keys may carry payload fields beyond the ordering field: [`BTreeIndex::put`]
/// on a duplicate returns a reference to the stored key so non-ordering fields
/// can be updated in place, and [`BTreeIndex::get`] returns the stored key.
///
/// General guide to implementation:
///
/// The index owns a root `Node` plus a [`Layout`] descriptor computed once at
/// construction from the key size and a node byte budget. A `Node` is either
/// a `Leaf` (key array only) or `Internal` (key array plus child array), so
/// leaves pay nothing for child references.
///
/// All algorithms are single-pass and non-recursive. Insertion splits a full
/// child before descending into it; deletion tops a child up to the minimum
/// degree before descending, so neither ever needs to walk back up the tree.
/// Iteration keeps an explicit stack of node positions bounded by
/// [`MAX_DEPTH`].
///
/// Node key and child arrays are raw allocations (see `vecs`) whose capacity
/// lives in the layout descriptor rather than in each node, so node teardown
/// is explicit: merges and the `Drop` sweep free every array exactly once.
pub struct BTreeIndex<K, C = NaturalOrder> {
    root: Node<K>,
    layout: Layout,
    counts: Counts,
    cmp: C,
}

impl<K: Ord> BTreeIndex<K, NaturalOrder> {
    /// New index with natural key order and the default node byte budget.
    pub fn new() -> Result<Self, Error> {
        Self::with_config(NaturalOrder, DEFAULT_NODE_SIZE)
    }

    /// New index with natural key order and the given node byte budget.
    pub fn with_node_size(node_size: usize) -> Result<Self, Error> {
        Self::with_config(NaturalOrder, node_size)
    }
}

impl<K, C> BTreeIndex<K, C> {
    /// Number of live keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.counts.keys
    }

    /// Is the index empty?
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.counts.keys == 0
    }

    /// Number of live nodes, counting the root.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.counts.nodes
    }

    /// The layout descriptor computed at construction.
    #[must_use]
    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    /// Ascending iterator over all stored keys.
    #[must_use]
    pub fn iter(&self) -> Iter<'_, K> {
        let mut x = Iter::new();
        x.push_min(&self.root);
        x
    }
}

impl<K, C: Comparator<K>> BTreeIndex<K, C> {
    /// New index with the given comparator and the default node byte budget.
    pub fn with_comparator(cmp: C) -> Result<Self, Error> {
        Self::with_config(cmp, DEFAULT_NODE_SIZE)
    }

    /// New index with the given comparator and node byte budget. The budget
    /// determines the minimum degree once; construction fails if it cannot
    /// hold degree 2. The root starts as a single empty leaf.
    pub fn with_config(cmp: C, node_size: usize) -> Result<Self, Error> {
        let layout = Layout::compute::<K>(node_size)?;
        let keys = NodeVec::try_new(layout.n)?;
        Ok(Self {
            root: Node::Leaf(LeafNode { keys }),
            layout,
            counts: Counts { keys: 0, nodes: 1 },
            cmp,
        })
    }

    /// Get a reference to the stored key comparing equal to `key`.
    pub fn get(&self, key: &K) -> Option<&K> {
        let cmp = &self.cmp;
        let mut cur = &self.root;
        loop {
            match cur {
                Node::Leaf(leaf) => {
                    return match leaf.keys.search(|k| cmp.cmp(k, key)) {
                        Ok(i) => Some(leaf.keys.ix(i)),
                        Err(_) => None,
                    };
                }
                Node::Internal(nl) => match nl.keys.search(|k| cmp.cmp(k, key)) {
                    Ok(i) => return Some(nl.keys.ix(i)),
                    Err(i) => cur = nl.children.ix(i),
                },
            }
        }
    }

    /// Get a mutable reference to the stored key comparing equal to `key`.
    /// The ordering fields must not be changed through the reference.
    pub fn get_mut(&mut self, key: &K) -> Option<&mut K> {
        let cmp = &self.cmp;
        let mut cur = &mut self.root;
        loop {
            let node = cur;
            match node {
                Node::Leaf(leaf) => {
                    return match leaf.keys.search(|k| cmp.cmp(k, key)) {
                        Ok(i) => Some(leaf.keys.ixm(i)),
                        Err(_) => None,
                    };
                }
                Node::Internal(nl) => match nl.keys.search(|k| cmp.cmp(k, key)) {
                    Ok(i) => return Some(nl.keys.ixm(i)),
                    Err(i) => cur = nl.children.ixm(i),
                },
            }
        }
    }

    /// Does the index hold a key comparing equal to `key`?
    pub fn contains(&self, key: &K) -> bool {
        self.get(key).is_some()
    }

    /// Insert `key`, or find the stored duplicate. Returns a reference to the
    /// stored key and whether an insertion took place; on a duplicate the key
    /// count is unchanged and the reference permits in-place update of
    /// non-ordering payload fields.
    ///
    /// Single top-down pass: full nodes on the descent path are split before
    /// they are entered, so the final leaf always has room and a failed
    /// allocation never leaves a node half written.
    pub fn put(&mut self, key: K) -> Result<(&mut K, bool), Error> {
        let lay = self.layout;
        if self.root.key_count() == lay.n {
            self.split_root()?;
        }
        let cmp = &self.cmp;
        let mut cur = &mut self.root;
        loop {
            let node = cur;
            match node {
                Node::Leaf(leaf) => {
                    return match leaf.keys.search(|k| cmp.cmp(k, &key)) {
                        Ok(i) => Ok((leaf.keys.ixm(i), false)),
                        Err(i) => {
                            // Look-ahead splitting guarantees room here.
                            unsafe {
                                leaf.keys.insert(i, key);
                            }
                            self.counts.keys += 1;
                            Ok((leaf.keys.ixm(i), true))
                        }
                    };
                }
                Node::Internal(nl) => match nl.keys.search(|k| cmp.cmp(k, &key)) {
                    Ok(i) => return Ok((nl.keys.ixm(i), false)),
                    Err(mut i) => {
                        if nl.children.ix(i).key_count() == lay.n {
                            Self::split_child(nl, i, &lay, &mut self.counts)?;
                            // Re-locate against the promoted median.
                            match cmp.cmp(&key, nl.keys.ix(i)) {
                                Ordering::Less => {}
                                Ordering::Greater => i += 1,
                                Ordering::Equal => return Ok((nl.keys.ixm(i), false)),
                            }
                        }
                        cur = nl.children.ixm(i);
                    }
                },
            }
        }
    }

    /// Remove the stored key comparing equal to `key` and return it, or
    /// `None` if absent.
    ///
    /// Single top-down pass: a minimal child on the descent path is topped up
    /// by borrowing from a sibling (left preferred) or merging (left
    /// preferred) before it is entered. A key found in an internal node is
    /// replaced by its in-order predecessor or successor, or pulled down into
    /// a merged child when both adjacent children are minimal.
    pub fn del(&mut self, key: &K) -> Option<K> {
        let lay = self.layout;
        let cmp = &self.cmp;
        let counts = &mut self.counts;
        let mut removed = None;
        let mut cur = &mut self.root;
        loop {
            let node = cur;
            match node {
                Node::Leaf(leaf) => {
                    if let Ok(i) = leaf.keys.search(|k| cmp.cmp(k, key)) {
                        removed = Some(leaf.keys.remove(i));
                    }
                    break;
                }
                Node::Internal(nl) => match nl.keys.search(|k| cmp.cmp(k, key)) {
                    Ok(i) => {
                        if nl.children.ix(i).key_count() >= lay.t {
                            let pred = Self::extract_max(nl.children.ixm(i), &lay, counts);
                            removed = Some(mem::replace(nl.keys.ixm(i), pred));
                        } else if nl.children.ix(i + 1).key_count() >= lay.t {
                            let succ = Self::extract_min(nl.children.ixm(i + 1), &lay, counts);
                            removed = Some(mem::replace(nl.keys.ixm(i), succ));
                        } else {
                            // Both neighbours minimal: pull the key down into
                            // the merged child and retry there.
                            Self::merge_children(nl, i, &lay, counts);
                            cur = nl.children.ixm(i);
                            continue;
                        }
                        break;
                    }
                    Err(i) => {
                        let i = if nl.children.ix(i).key_count() < lay.t {
                            Self::reinforce(nl, i, &lay, counts)
                        } else {
                            i
                        };
                        cur = nl.children.ixm(i);
                    }
                },
            }
        }
        if removed.is_some() {
            counts.keys -= 1;
        }
        self.collapse_root();
        removed
    }

    /// Iterator positioned at the first stored key not less than `key`.
    #[must_use]
    pub fn lower_bound(&self, key: &K) -> Iter<'_, K> {
        let cmp = &self.cmp;
        let mut x = Iter::new();
        let mut cur = &self.root;
        loop {
            match cur {
                Node::Leaf(leaf) => {
                    let i = match leaf.keys.search(|k| cmp.cmp(k, key)) {
                        Ok(i) | Err(i) => i,
                    };
                    x.stack.push(Frame { node: cur, ix: i });
                    return x;
                }
                Node::Internal(nl) => match nl.keys.search(|k| cmp.cmp(k, key)) {
                    Ok(i) => {
                        x.stack.push(Frame { node: cur, ix: i });
                        return x;
                    }
                    Err(i) => {
                        x.stack.push(Frame { node: cur, ix: i });
                        cur = nl.children.ix(i);
                    }
                },
            }
        }
    }

    /// Bracketing stored keys for `key`: both sides equal to the stored key
    /// when present, otherwise the greatest key below and the least key above.
    pub fn interval(&self, key: &K) -> (Option<&K>, Option<&K>) {
        let cmp = &self.cmp;
        let (mut lower, mut upper) = (None, None);
        let mut cur = &self.root;
        loop {
            let keys = match cur {
                Node::Leaf(leaf) => &leaf.keys,
                Node::Internal(nl) => &nl.keys,
            };
            let i = match keys.search(|k| cmp.cmp(k, key)) {
                Ok(i) => return (Some(keys.ix(i)), Some(keys.ix(i))),
                Err(i) => i,
            };
            if i > 0 {
                lower = Some(keys.ix(i - 1));
            }
            if i < keys.len() {
                upper = Some(keys.ix(i));
            }
            match cur {
                Node::Leaf(_) => return (lower, upper),
                Node::Internal(nl) => cur = nl.children.ix(i),
            }
        }
    }

    /// Split a full root, growing the tree by one level. Afterwards the root
    /// has one key and two children, so it cannot need splitting again during
    /// the insertion in progress.
    fn split_root(&mut self) -> Result<(), Error> {
        let lay = self.layout;
        let mut keys = NodeVec::try_new(lay.n)?;
        let mut children = match NodeVec::try_new(lay.n + 1) {
            Ok(v) => v,
            Err(e) => {
                keys.free(lay.n);
                return Err(e.into());
            }
        };
        let (med, right) = match self.root.split(&lay) {
            Ok(x) => x,
            Err(e) => {
                keys.free(lay.n);
                children.free(lay.n + 1);
                return Err(e);
            }
        };
        self.counts.nodes += 2;
        unsafe {
            keys.push(med);
        }
        let mut nl = Box::new(InternalNode { keys, children });
        let old = mem::replace(&mut self.root, Node::placeholder());
        unsafe {
            nl.children.push(old);
            nl.children.push(right);
        }
        self.root = Node::Internal(nl);
        Ok(())
    }

    /// Split the full child `i` of `nl`, promoting its median key into `nl`.
    /// `nl` is never full here: the caller split it one level up if needed.
    fn split_child(
        nl: &mut InternalNode<K>,
        i: usize,
        lay: &Layout,
        counts: &mut Counts,
    ) -> Result<(), Error> {
        let (med, right) = nl.children.ixm(i).split(lay)?;
        counts.nodes += 1;
        unsafe {
            nl.keys.insert(i, med);
            nl.children.insert(i + 1, right);
        }
        Ok(())
    }

    /// Top up the minimal child `i` of `nl` to at least `t` keys before
    /// descent: borrow from a sibling with a spare key (left preferred), else
    /// merge with a sibling (left preferred). Returns the index of the child
    /// now covering the same key range.
    fn reinforce(nl: &mut InternalNode<K>, i: usize, lay: &Layout, counts: &mut Counts) -> usize {
        if i > 0 && nl.children.ix(i - 1).key_count() >= lay.t {
            Self::rotate_right(nl, i - 1);
            i
        } else if i < nl.keys.len() && nl.children.ix(i + 1).key_count() >= lay.t {
            Self::rotate_left(nl, i);
            i
        } else if i > 0 {
            Self::merge_children(nl, i - 1, lay, counts);
            i - 1
        } else {
            Self::merge_children(nl, i, lay, counts);
            i
        }
    }

    /// Rotate the highest key of `children[sep]` through separator `sep` into
    /// the front of `children[sep + 1]`, moving one child across for internal
    /// siblings.
    fn rotate_right(nl: &mut InternalNode<K>, sep: usize) {
        let (a, b) = nl.children.split_at_mut(sep + 1);
        match (&mut a[sep], &mut b[0]) {
            (Node::Leaf(left), Node::Leaf(right)) => {
                let up = left.keys.pop().unwrap();
                let down = mem::replace(nl.keys.ixm(sep), up);
                unsafe {
                    right.keys.insert(0, down);
                }
            }
            (Node::Internal(left), Node::Internal(right)) => {
                let up = left.keys.pop().unwrap();
                let down = mem::replace(nl.keys.ixm(sep), up);
                unsafe {
                    right.keys.insert(0, down);
                    right.children.insert(0, left.children.pop().unwrap());
                }
            }
            _ => unreachable!("sibling nodes have the same kind"),
        }
    }

    /// Rotate the lowest key of `children[sep + 1]` through separator `sep`
    /// onto the back of `children[sep]`.
    fn rotate_left(nl: &mut InternalNode<K>, sep: usize) {
        let (a, b) = nl.children.split_at_mut(sep + 1);
        match (&mut a[sep], &mut b[0]) {
            (Node::Leaf(left), Node::Leaf(right)) => {
                let up = right.keys.remove(0);
                let down = mem::replace(nl.keys.ixm(sep), up);
                unsafe {
                    left.keys.push(down);
                }
            }
            (Node::Internal(left), Node::Internal(right)) => {
                let up = right.keys.remove(0);
                let down = mem::replace(nl.keys.ixm(sep), up);
                unsafe {
                    left.keys.push(down);
                    left.children.push(right.children.remove(0));
                }
            }
            _ => unreachable!("sibling nodes have the same kind"),
        }
    }

    /// Merge `children[i]`, separator key `i` and `children[i + 1]` into
    /// `children[i]`, releasing the right node. Both children hold `t - 1`
    /// keys, so the merged node holds exactly `2t - 1`.
    fn merge_children(nl: &mut InternalNode<K>, i: usize, lay: &Layout, counts: &mut Counts) {
        let sep = nl.keys.remove(i);
        let right = nl.children.remove(i + 1);
        match (nl.children.ixm(i), right) {
            (Node::Leaf(left), Node::Leaf(mut right)) => {
                unsafe {
                    left.keys.push(sep);
                    left.keys.append_from(&mut right.keys);
                }
                right.keys.free(lay.n);
            }
            (Node::Internal(left), Node::Internal(mut right)) => {
                unsafe {
                    left.keys.push(sep);
                    left.keys.append_from(&mut right.keys);
                    left.children.append_from(&mut right.children);
                }
                right.keys.free(lay.n);
                right.children.free(lay.n + 1);
            }
            _ => unreachable!("sibling nodes have the same kind"),
        }
        counts.nodes -= 1;
    }

    /// Remove and return the greatest key of the subtree at `cur`. The caller
    /// guarantees the subtree root holds at least `t` keys.
    fn extract_max(mut cur: &mut Node<K>, lay: &Layout, counts: &mut Counts) -> K {
        loop {
            let node = cur;
            match node {
                Node::Leaf(leaf) => return leaf.keys.pop().unwrap(),
                Node::Internal(nl) => {
                    let last = nl.children.len() - 1;
                    let i = if nl.children.ix(last).key_count() < lay.t {
                        Self::reinforce(nl, last, lay, counts)
                    } else {
                        last
                    };
                    cur = nl.children.ixm(i);
                }
            }
        }
    }

    /// Remove and return the least key of the subtree at `cur`. The caller
    /// guarantees the subtree root holds at least `t` keys.
    fn extract_min(mut cur: &mut Node<K>, lay: &Layout, counts: &mut Counts) -> K {
        loop {
            let node = cur;
            match node {
                Node::Leaf(leaf) => return leaf.keys.remove(0),
                Node::Internal(nl) => {
                    let i = if nl.children.ix(0).key_count() < lay.t {
                        Self::reinforce(nl, 0, lay, counts)
                    } else {
                        0
                    };
                    cur = nl.children.ixm(i);
                }
            }
        }
    }

    /// An internal root emptied by a merge has exactly one child; that child
    /// becomes the root and the tree height shrinks by one.
    fn collapse_root(&mut self) {
        let lay = self.layout;
        if matches!(&self.root, Node::Internal(nl) if nl.keys.is_empty()) {
            let old = mem::replace(&mut self.root, Node::placeholder());
            if let Node::Internal(mut nl) = old {
                self.root = nl.children.pop().unwrap();
                nl.keys.free(lay.n);
                nl.children.free(lay.n + 1);
                self.counts.nodes -= 1;
            }
        }
    }
} // End impl BTreeIndex

impl<K, C> Drop for BTreeIndex<K, C> {
    fn drop(&mut self) {
        // Post-order sweep with a local scratch stack: each node is freed
        // once, and the stack is released once when the sweep completes.
        let lay = self.layout;
        let root = mem::replace(&mut self.root, Node::placeholder());
        let mut stack = vec![root];
        while let Some(node) = stack.pop() {
            match node {
                Node::Leaf(mut leaf) => leaf.keys.free(lay.n),
                Node::Internal(mut nl) => {
                    while let Some(child) = nl.children.pop() {
                        stack.push(child);
                    }
                    nl.keys.free(lay.n);
                    nl.children.free(lay.n + 1);
                }
            }
        }
    }
}

impl<K: Debug, C> Debug for BTreeIndex<K, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

impl<K: PartialEq, C> PartialEq for BTreeIndex<K, C> {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len() && self.iter().zip(other.iter()).all(|(a, b)| a == b)
    }
}
impl<K: Eq, C> Eq for BTreeIndex<K, C> {}

impl<'a, K, C> IntoIterator for &'a BTreeIndex<K, C> {
    type Item = &'a K;
    type IntoIter = Iter<'a, K>;
    fn into_iter(self) -> Iter<'a, K> {
        self.iter()
    }
}

enum Node<K> {
    Leaf(LeafNode<K>),
    Internal(InternalRef<K>),
}

/* Boxing the internal node keeps the Node enum at leaf size */
type InternalRef<K> = Box<InternalNode<K>>;

struct LeafNode<K> {
    keys: NodeVec<K>,
}

struct InternalNode<K> {
    keys: NodeVec<K>,
    children: NodeVec<Node<K>>,
}

impl<K> Node<K> {
    /// Empty leaf with no allocation, used to plug a slot that is about to be
    /// overwritten.
    fn placeholder() -> Self {
        Node::Leaf(LeafNode {
            keys: NodeVec::default(),
        })
    }

    fn key_count(&self) -> usize {
        match self {
            Node::Leaf(leaf) => leaf.keys.len(),
            Node::Internal(nl) => nl.keys.len(),
        }
    }

    /// Split a full node: the new right sibling takes the `t - 1` highest
    /// keys (and for internal nodes the `t` highest children), the median key
    /// is returned for promotion. Sibling arrays are allocated before
    /// anything moves, so a failed allocation leaves the node untouched.
    fn split(&mut self, lay: &Layout) -> Result<(K, Node<K>), Error> {
        match self {
            Node::Leaf(leaf) => {
                let mut rkeys = NodeVec::try_new(lay.n)?;
                unsafe {
                    leaf.keys.split_into(lay.t, &mut rkeys);
                }
                let med = leaf.keys.pop().unwrap();
                Ok((med, Node::Leaf(LeafNode { keys: rkeys })))
            }
            Node::Internal(nl) => {
                let mut rkeys = NodeVec::try_new(lay.n)?;
                let mut rchildren = match NodeVec::try_new(lay.n + 1) {
                    Ok(v) => v,
                    Err(e) => {
                        rkeys.free(lay.n);
                        return Err(e.into());
                    }
                };
                unsafe {
                    nl.keys.split_into(lay.t, &mut rkeys);
                    nl.children.split_into(lay.t, &mut rchildren);
                }
                let med = nl.keys.pop().unwrap();
                Ok((
                    med,
                    Node::Internal(Box::new(InternalNode {
                        keys: rkeys,
                        children: rchildren,
                    })),
                ))
            }
        }
    }
}

#[derive(Clone, Copy)]
struct Frame<'a, K> {
    node: &'a Node<K>,
    ix: usize,
}

/// Ascending iterator over stored keys, returned by [`BTreeIndex::iter`] and
/// [`BTreeIndex::lower_bound`].
///
/// Walks the tree through an explicit stack of node positions capped at
/// [`MAX_DEPTH`] frames instead of recursing, so traversal depth is bounded
/// regardless of key count.
pub struct Iter<'a, K> {
    stack: ArrayVec<Frame<'a, K>, MAX_DEPTH>,
}

impl<'a, K> Iter<'a, K> {
    fn new() -> Self {
        Self {
            stack: ArrayVec::new(),
        }
    }

    /// Push the path to the least key of the subtree at `node`.
    fn push_min(&mut self, mut node: &'a Node<K>) {
        loop {
            self.stack.push(Frame { node, ix: 0 });
            match node {
                Node::Leaf(_) => return,
                Node::Internal(nl) => node = nl.children.ix(0),
            }
        }
    }
}

impl<'a, K> Iterator for Iter<'a, K> {
    type Item = &'a K;

    fn next(&mut self) -> Option<&'a K> {
        loop {
            let top = self.stack.last_mut()?;
            let (node, i) = (top.node, top.ix);
            match node {
                Node::Leaf(leaf) => {
                    if i < leaf.keys.len() {
                        top.ix += 1;
                        return Some(leaf.keys.ix(i));
                    }
                    self.stack.pop();
                }
                Node::Internal(nl) => {
                    if i < nl.keys.len() {
                        top.ix += 1;
                        let key = nl.keys.ix(i);
                        self.push_min(nl.children.ix(i + 1));
                        return Some(key);
                    }
                    self.stack.pop();
                }
            }
        }
    }
}

impl<K> FusedIterator for Iter<'_, K> {}

#[cfg(feature = "serde")]
use serde::{
    de::{SeqAccess, Visitor},
    ser::SerializeSeq,
    Deserialize, Deserializer, Serialize,
};

#[cfg(feature = "serde")]
impl<K, C> Serialize for BTreeIndex<K, C>
where
    K: Serialize,
{
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let mut seq = serializer.serialize_seq(Some(self.len()))?;
        for k in self {
            seq.serialize_element(k)?;
        }
        seq.end()
    }
}

#[cfg(feature = "serde")]
struct IndexVisitor<K, C> {
    marker: std::marker::PhantomData<fn() -> BTreeIndex<K, C>>,
}

#[cfg(feature = "serde")]
impl<'de, K, C> Visitor<'de> for IndexVisitor<K, C>
where
    K: Deserialize<'de>,
    C: Comparator<K> + Default,
{
    type Value = BTreeIndex<K, C>;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("BTreeIndex key sequence")
    }

    fn visit_seq<A>(self, mut access: A) -> Result<Self::Value, A::Error>
    where
        A: SeqAccess<'de>,
    {
        use serde::de::Error as _;
        let mut index = BTreeIndex::with_comparator(C::default()).map_err(A::Error::custom)?;
        while let Some(k) = access.next_element()? {
            index.put(k).map_err(A::Error::custom)?;
        }
        Ok(index)
    }
}

#[cfg(feature = "serde")]
impl<'de, K, C> Deserialize<'de> for BTreeIndex<K, C>
where
    K: Deserialize<'de>,
    C: Comparator<K> + Default,
{
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_seq(IndexVisitor {
            marker: std::marker::PhantomData,
        })
    }
}

#[cfg(test)]
impl<K, C: Comparator<K>> BTreeIndex<K, C> {
    /// Verify balance, occupancy, key ordering and the live counters,
    /// panicking on any violation.
    pub(crate) fn check(&self) {
        let lay = self.layout;
        let mut keys = 0usize;
        let mut nodes = 0usize;
        let mut leaf_depth = None;
        let mut stack: Vec<(&Node<K>, usize, Option<&K>, Option<&K>)> =
            vec![(&self.root, 0, None, None)];
        while let Some((node, depth, lo, hi)) = stack.pop() {
            nodes += 1;
            let node_keys = match node {
                Node::Leaf(leaf) => &leaf.keys,
                Node::Internal(nl) => &nl.keys,
            };
            keys += node_keys.len();
            assert!(node_keys.len() <= lay.n);
            if depth > 0 {
                assert!(
                    node_keys.len() >= lay.t - 1,
                    "non-root node below minimum occupancy"
                );
            }
            for w in 0..node_keys.len() {
                if w > 0 {
                    assert_eq!(
                        self.cmp.cmp(node_keys.ix(w - 1), node_keys.ix(w)),
                        Ordering::Less
                    );
                }
                if let Some(lo) = lo {
                    assert_eq!(self.cmp.cmp(lo, node_keys.ix(w)), Ordering::Less);
                }
                if let Some(hi) = hi {
                    assert_eq!(self.cmp.cmp(node_keys.ix(w), hi), Ordering::Less);
                }
            }
            match node {
                Node::Leaf(_) => match leaf_depth {
                    None => leaf_depth = Some(depth),
                    Some(d) => assert_eq!(d, depth, "leaves at differing depths"),
                },
                Node::Internal(nl) => {
                    assert_eq!(nl.children.len(), nl.keys.len() + 1);
                    for ci in 0..nl.children.len() {
                        let clo = if ci == 0 { lo } else { Some(nl.keys.ix(ci - 1)) };
                        let chi = if ci == nl.keys.len() {
                            hi
                        } else {
                            Some(nl.keys.ix(ci))
                        };
                        stack.push((nl.children.ix(ci), depth + 1, clo, chi));
                    }
                }
            }
        }
        assert_eq!(keys, self.counts.keys);
        assert_eq!(nodes, self.counts.nodes);
    }
}
