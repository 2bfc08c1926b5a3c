//! An intrusive AVL tree.
//#![no_std]

// Conventions used in comments:
// - The height of a node `x` is denoted `h(x)`. Leaves have height 0 and a missing child is
//   treated as having height -1.
// - The parent of a node `x` is denoted `p(x)`.
// - The balance difference of a node `x` is `|h(left(x)) - h(right(x))|`.
//
// The fundamental invariants of an AVL tree are:
// 1. Every balance difference is 0 or 1.
// 2. Every cached height equals `1 + max(h(left), h(right))`.
//
// Duplicates are allowed. An item equal to an existing one is always inserted to its right, so
// in-order traversal yields a non-decreasing sequence and the tree behaves as a multiset.
//
// Every mutation touches the heights of a single root-ward path only, so restoring (1) and (2) is
// a matter of walking that path bottom-up and rotating wherever a difference of 2 appears.

#[cfg(feature = "alloc")]
extern crate alloc;

use core::{
    borrow::Borrow, cell::UnsafeCell, cmp::Ordering, fmt, marker::PhantomPinned, mem, ops::Not,
    pin::Pin, ptr::NonNull,
};

use cordyceps::Linked;

mod balance;
mod debug;
pub mod error;
mod iter;
#[cfg(feature = "alloc")]
mod multiset;

#[cfg(any(test, feature = "model"))]
pub mod model;


pub use error::{AvlError, Result};
pub use iter::Iter;
#[cfg(feature = "alloc")]
pub use multiset::{AvlMultiset, MultisetIter};

pub trait TreeNode<L>: Linked<L> {
    type Key: Ord;

    fn key(&self) -> &Self::Key;
}

/// An intrusive AVL tree.
///
/// The tree does not allocate. Items are handed over through [`Linked::Handle`]s, which are
/// converted back when an item leaves the tree, so the owner of a handle decides where node
/// memory lives.
///
/// Items with equal keys may coexist; see [`AvlTree::insert`].
pub struct AvlTree<T>
where
    T: TreeNode<Links<T>> + ?Sized,
{
    root: Link<T>,
    len: usize,
}

/// Links embedded in every item of an [`AvlTree`].
pub struct Links<T: ?Sized> {
    inner: UnsafeCell<LinksInner<T>>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Dir {
    Left = 0,
    Right = 1,
}

impl Not for Dir {
    type Output = Dir;

    fn not(self) -> Self::Output {
        match self {
            Dir::Left => Dir::Right,
            Dir::Right => Dir::Left,
        }
    }
}

#[repr(C)]
struct LinksInner<T: ?Sized> {
    parent: Link<T>,
    children: [Link<T>; 2],
    height: i8,
    _unpin: PhantomPinned,
}

type Link<T> = Option<NonNull<T>>;

impl<T> AvlTree<T>
where
    T: TreeNode<Links<T>> + ?Sized,
{
    /// Returns a new empty tree.
    pub const fn new() -> AvlTree<T> {
        AvlTree { root: None, len: 0 }
    }

    /// Returns `true` if the tree contains no elements.
    pub const fn is_empty(&self) -> bool {
        let empty = self.len() == 0;

        if cfg!(debug_assertions) {
            // Can't use assert_eq!() in const fn.
            assert!(empty == self.root.is_none());
        }

        empty
    }

    /// Returns the number of elements in the tree, counting duplicates.
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Returns the height of the tree.
    ///
    /// A tree with a single element has height 0. An empty tree also reports 0.
    pub fn height(&self) -> usize {
        match self.root {
            // Heights are never negative for present nodes.
            Some(root) => unsafe { self.links(root).height() as usize },
            None => 0,
        }
    }

    /// Returns an iterator over the elements of the tree in ascending order.
    pub fn iter(&self) -> Iter<'_, T> {
        Iter::new(self)
    }

    #[doc(hidden)]
    pub fn assert_invariants(&self) {
        let Some(root) = self.root else {
            assert_eq!(self.len, 0, "empty tree must have length 0");
            return;
        };

        unsafe {
            assert!(self.links(root).is_root(), "root must not have a parent");

            let count = self.assert_invariants_at(root);
            assert_eq!(count, self.len, "length must match the number of reachable nodes");
        }

        // In-order traversal must be non-decreasing.
        let mut iter = self.iter();
        if let Some(mut prev) = iter.next() {
            for cur in iter {
                assert!(prev.key() <= cur.key(), "in-order traversal must be sorted");
                prev = cur;
            }
        }
    }

    // Checks the local invariants of every node in the subtree rooted at `node`, returning the
    // number of nodes in the subtree.
    unsafe fn assert_invariants_at(&self, node: NonNull<T>) -> usize {
        unsafe {
            let links = self.links(node);
            let mut count = 1;

            for dir in [Dir::Left, Dir::Right] {
                if let Some(child) = links.child(dir) {
                    // Ensure child's parent link points to this node.
                    let parent = self
                        .links(child)
                        .parent()
                        .expect("child parent pointer not set");
                    assert_eq!(node, parent);

                    // Ensure the local ordering holds.
                    match dir {
                        Dir::Left => assert!(child.as_ref().key() <= node.as_ref().key()),
                        Dir::Right => assert!(child.as_ref().key() >= node.as_ref().key()),
                    }

                    count += self.assert_invariants_at(child);
                }
            }

            let left_height = self.height_of(links.left());
            let right_height = self.height_of(links.right());

            // Ensure the cached height is correct.
            assert_eq!(links.height(), 1 + left_height.max(right_height));

            // Ensure the node is balanced.
            assert!(left_height.abs_diff(right_height) <= 1);

            if links.is_leaf() {
                assert_eq!(links.height(), 0);
            }

            count
        }
    }

    /// Returns a reference to a node whose key is equal to `key`.
    ///
    /// If several nodes match, any one of them may be returned.
    pub fn get<Q>(&self, key: &Q) -> Option<Pin<&T>>
    where
        T::Key: Borrow<Q> + Ord,
        Q: Ord + ?Sized,
    {
        let ptr = self.get_raw(key)?;
        unsafe { Some(Pin::new_unchecked(ptr.as_ref())) }
    }

    /// Returns `true` if the tree contains a node whose key is equal to `key`.
    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        T::Key: Borrow<Q> + Ord,
        Q: Ord + ?Sized,
    {
        self.get_raw(key).is_some()
    }

    fn get_raw<Q>(&self, key: &Q) -> Link<T>
    where
        T::Key: Borrow<Q> + Ord,
        Q: Ord + ?Sized,
    {
        let mut opt_cur = self.root;

        loop {
            let cur = opt_cur?;

            unsafe {
                match key.cmp(cur.as_ref().key().borrow()) {
                    Ordering::Less => opt_cur = self.links(cur).left(),
                    Ordering::Equal => return Some(cur),
                    Ordering::Greater => opt_cur = self.links(cur).right(),
                }
            }
        }
    }

    /// Returns the minimum element of the tree.
    pub fn first(&self) -> Option<Pin<&T>> {
        let root = self.root?;

        unsafe {
            let (first, _) = self.min_in_subtree(root);
            Some(Pin::new_unchecked(first.as_ref()))
        }
    }

    /// Returns the maximum element of the tree.
    pub fn last(&self) -> Option<Pin<&T>> {
        let root = self.root?;

        unsafe {
            let (last, _) = self.max_in_subtree(root);
            Some(Pin::new_unchecked(last.as_ref()))
        }
    }

    /// Removes and returns the minimum element of the tree.
    pub fn pop_first(&mut self) -> Option<T::Handle> {
        let root = self.root?;

        unsafe {
            let (first, _) = self.min_in_subtree(root);
            Some(self.remove_at(first))
        }
    }

    /// Removes and returns the maximum element of the tree.
    pub fn pop_last(&mut self) -> Option<T::Handle> {
        let root = self.root?;

        unsafe {
            let (last, _) = self.max_in_subtree(root);
            Some(self.remove_at(last))
        }
    }

    #[inline]
    unsafe fn maybe_set_parent(&mut self, opt_node: Link<T>, parent: Link<T>) {
        let Some(node) = opt_node else {
            return;
        };

        unsafe { self.links_mut(node).set_parent(parent) };
    }

    #[inline]
    unsafe fn replace_child_or_set_root(
        &mut self,
        parent: Link<T>,
        old_child: NonNull<T>,
        new_child: Link<T>,
    ) {
        match parent {
            Some(parent) => unsafe { self.replace_child(parent, old_child, new_child) },
            None => self.root = new_child,
        }
    }

    // Replaces the child pointer of `parent` pointing at `old_child` with `new_child`.
    //
    // `new_child`'s parent pointer is not updated.
    //
    // # Safety
    //
    // The caller must ensure that the following conditions hold:
    // - `old_child` is a child node of `parent`.
    // - `new_child` is not a child node of `parent`.
    unsafe fn replace_child(
        &mut self,
        parent: NonNull<T>,
        old_child: NonNull<T>,
        new_child: Link<T>,
    ) {
        unsafe {
            let dir = self.which_child(parent, old_child);

            if let Some(new_child) = new_child {
                debug_assert_ne!(
                    self.links(parent).child(!dir),
                    Some(new_child),
                    "`new_child` must not be a child of `parent`"
                );
            }

            self.links_mut(parent).set_child(dir, new_child);
        }
    }

    /// Inserts an item into the tree.
    ///
    /// An item whose key equals the key of an item already in the tree is placed to the right of
    /// it, so both are kept.
    ///
    /// This operation completes in _O(log(n))_ time.
    pub fn insert(&mut self, item: T::Handle) {
        let ptr = T::into_ptr(item);

        unsafe { self.links_mut(ptr).clear() };

        let Some(root) = self.root else {
            // Tree is empty. Set `item` as the root and return.
            self.root = Some(ptr);
            self.len += 1;
            return;
        };

        let mut parent = root;

        // Descend the tree, looking for a free slot.
        loop {
            let ordering = unsafe { ptr.as_ref().key().cmp(parent.as_ref().key()) };

            let dir = match ordering {
                Ordering::Less => Dir::Left,
                Ordering::Equal | Ordering::Greater => Dir::Right,
            };

            unsafe {
                match self.links(parent).child(dir) {
                    // Descend.
                    Some(child) => parent = child,

                    // Set `item` as child.
                    None => {
                        self.links_mut(parent).set_child(dir, Some(ptr));
                        self.links_mut(ptr).set_parent(Some(parent));
                        break;
                    }
                }
            }
        }

        // Only the heights along the path from `parent` to the root may have changed.
        unsafe { self.rebalance_from(Some(parent)) };

        self.len += 1;
    }

    /// Removes one item whose key is equal to `key`, returning it.
    ///
    /// Returns `None`, leaving the tree unchanged, if no item matches.
    ///
    /// This operation completes in _O(log(n))_ time.
    pub fn remove<Q>(&mut self, key: &Q) -> Option<T::Handle>
    where
        T::Key: Borrow<Q> + Ord,
        Q: Ord + ?Sized,
    {
        let node = self.get_raw(key)?;
        Some(unsafe { self.remove_at(node) })
    }

    // Returns the minimum node in the subtree.
    //
    // If the subtree root is not the minimum, also returns the minimum node's parent.
    #[inline]
    unsafe fn min_in_subtree(&self, root: NonNull<T>) -> (NonNull<T>, Link<T>) {
        unsafe { self.extreme_in_subtree(root, Dir::Left) }
    }

    // Returns the maximum node in the subtree.
    //
    // If the subtree root is not the maximum, also returns the maximum node's parent.
    #[inline]
    unsafe fn max_in_subtree(&self, root: NonNull<T>) -> (NonNull<T>, Link<T>) {
        unsafe { self.extreme_in_subtree(root, Dir::Right) }
    }

    #[inline]
    unsafe fn extreme_in_subtree(&self, root: NonNull<T>, dir: Dir) -> (NonNull<T>, Link<T>) {
        let mut parent = None;
        let mut cur = root;

        while let Some(child) = unsafe { self.links(cur).child(dir) } {
            parent = Some(cur);
            cur = child;
        }

        (cur, parent)
    }

    // Removes `node` from the tree and returns ownership of it.
    //
    // # Safety
    //
    // The caller must ensure that `node` is an element of `self`, and not any other tree.
    pub(crate) unsafe fn remove_at(&mut self, node: NonNull<T>) -> T::Handle {
        // There are three possible cases:
        //
        // 1. `node` has a left child.
        //
        //    In this case `node`'s predecessor[^1] is unlinked, its left child (if any) elevated
        //    into its place, and the predecessor then assumes `node`'s place and height. Heights
        //    may have changed from the predecessor's former parent upwards.
        //
        //    When the predecessor is `node`'s left child itself, it keeps its own left subtree and
        //    only its new position needs rebalancing.
        //
        // 2. `node` has only a right child.
        //
        //    In this case the right child is elevated into `node`'s place. The child is a leaf, since
        //    `node` was balanced, and the heights of all of its ancestors may have changed.
        //
        // 3. `node` is a leaf.
        //
        //    In this case `node` is detached. Its parent may have become a leaf or lopsided.
        //
        // In all cases, exactly one path towards the root needs to be walked.
        //
        // [^1]: The predecessor of a node `a` is the greatest node in `a`'s left subtree.

        unsafe {
            let parent = self.links(node).parent();
            let left = self.links(node).left();
            let right = self.links(node).right();

            let rebalance_start = match (left, right) {
                (Some(left), _) => {
                    let (predecessor, predecessor_parent) = self.max_in_subtree(left);

                    let start = match predecessor_parent {
                        Some(predecessor_parent) => {
                            // Elevate the predecessor's left child to replace it.
                            let predecessor_left = self.links(predecessor).left();
                            self.replace_child(predecessor_parent, predecessor, predecessor_left);
                            self.maybe_set_parent(predecessor_left, Some(predecessor_parent));

                            self.links_mut(predecessor).set_left(Some(left));
                            self.links_mut(left).set_parent(Some(predecessor));

                            predecessor_parent
                        }

                        // The predecessor is `left`, which has no right child.
                        None => predecessor,
                    };

                    self.replace_child_or_set_root(parent, node, Some(predecessor));

                    // Transfer the position and height of `node` to `predecessor`.
                    let node_height = self.links(node).height();

                    self.links_mut(predecessor).set_parent(parent);
                    self.links_mut(predecessor).set_right(right);
                    self.links_mut(predecessor).set_height(node_height);
                    self.maybe_set_parent(right, Some(predecessor));

                    Some(start)
                }

                (None, Some(right)) => {
                    self.replace_child_or_set_root(parent, node, Some(right));
                    self.links_mut(right).set_parent(parent);

                    Some(right)
                }

                (None, None) => {
                    self.replace_child_or_set_root(parent, node, None);

                    parent
                }
            };

            self.links_mut(node).clear();
            self.rebalance_from(rebalance_start);

            self.len -= 1;

            T::from_ptr(node)
        }
    }

    /// Clears the tree, removing all elements.
    pub fn clear(&mut self) {
        let mut opt_cur = self.root;

        while let Some(cur) = opt_cur {
            unsafe {
                // Descend to the minimum node.
                let (cur, parent) = self.min_in_subtree(cur);
                let parent = parent.or_else(|| self.links(cur).parent());

                let right = self.links(cur).right();

                // Elevate the node's right child (which may be None).
                self.replace_child_or_set_root(parent, cur, right);
                self.maybe_set_parent(right, parent);

                // Drop the node.
                self.links_mut(cur).clear();
                drop(T::from_ptr(cur));
                self.len -= 1;

                // If the node had no right child, climb to the parent. If the node had no parent,
                // the tree is empty.
                opt_cur = right.or(parent);
            }
        }

        debug_assert!(self.root.is_none());
        debug_assert_eq!(self.len(), 0);
    }

    // Support methods ========================================================

    #[inline]
    unsafe fn links<'a>(&self, node: NonNull<T>) -> &'a Links<T> {
        unsafe { T::links(node).as_ref() }
    }

    #[inline]
    unsafe fn links_mut<'a>(&mut self, node: NonNull<T>) -> &'a mut Links<T> {
        unsafe { T::links(node).as_mut() }
    }

    /// Returns the height of the pointed-to subtree, or -1 if it is empty.
    #[inline]
    unsafe fn height_of(&self, node: Link<T>) -> i8 {
        node.map(|n| unsafe { self.links(n).height() }).unwrap_or(-1)
    }

    /// Recomputes the cached height of `node` from its children.
    #[inline]
    unsafe fn update_height(&mut self, node: NonNull<T>) {
        unsafe {
            let left_height = self.height_of(self.links(node).left());
            let right_height = self.height_of(self.links(node).right());

            let height = left_height.max(right_height).checked_add(1).unwrap();
            self.links_mut(node).set_height(height);
        }
    }

    pub(crate) unsafe fn which_child(&self, parent: NonNull<T>, child: NonNull<T>) -> Dir {
        unsafe {
            if self.links(parent).left() == Some(child) {
                Dir::Left
            } else {
                debug_assert_eq!(
                    self.links(parent).right(),
                    Some(child),
                    "`child` must be a child of `parent`"
                );
                Dir::Right
            }
        }
    }
}

impl<T> Default for AvlTree<T>
where
    T: TreeNode<Links<T>> + ?Sized,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Drop for AvlTree<T>
where
    T: TreeNode<Links<T>> + ?Sized,
{
    fn drop(&mut self) {
        self.clear();
    }
}

impl<'tree, T> IntoIterator for &'tree AvlTree<T>
where
    T: TreeNode<Links<T>> + ?Sized,
{
    type Item = &'tree T;
    type IntoIter = Iter<'tree, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<T: ?Sized> Links<T> {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            inner: UnsafeCell::new(LinksInner {
                parent: None,
                children: [None; 2],
                height: 0,
                _unpin: PhantomPinned,
            }),
        }
    }

    #[inline]
    fn is_leaf(&self) -> bool {
        self.left().is_none() && self.right().is_none()
    }

    #[inline]
    fn is_root(&self) -> bool {
        self.parent().is_none()
    }

    #[inline]
    fn height(&self) -> i8 {
        unsafe { (*self.inner.get()).height }
    }

    #[inline]
    fn parent(&self) -> Link<T> {
        unsafe { (*self.inner.get()).parent }
    }

    #[inline]
    fn child(&self, dir: Dir) -> Link<T> {
        unsafe { (*self.inner.get()).children[dir as usize] }
    }

    #[inline]
    fn left(&self) -> Link<T> {
        self.child(Dir::Left)
    }

    #[inline]
    fn right(&self) -> Link<T> {
        self.child(Dir::Right)
    }

    #[inline]
    fn set_parent(&mut self, parent: Link<T>) -> Link<T> {
        mem::replace(&mut self.inner.get_mut().parent, parent)
    }

    #[inline]
    fn set_child(&mut self, dir: Dir, child: Link<T>) -> Link<T> {
        mem::replace(&mut self.inner.get_mut().children[dir as usize], child)
    }

    #[inline]
    fn set_left(&mut self, left: Link<T>) -> Link<T> {
        self.set_child(Dir::Left, left)
    }

    #[inline]
    fn set_right(&mut self, right: Link<T>) -> Link<T> {
        self.set_child(Dir::Right, right)
    }

    #[inline]
    fn set_height(&mut self, height: i8) {
        self.inner.get_mut().height = height;
    }

    // Resets the links to those of a detached leaf.
    #[inline]
    fn clear(&mut self) {
        let inner = self.inner.get_mut();
        inner.parent = None;
        inner.children = [None; 2];
        inner.height = 0;
    }
}

impl<T: ?Sized> Default for Links<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: ?Sized> fmt::Debug for Links<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Links")
            .field("parent", &self.parent())
            .field("left", &self.left())
            .field("right", &self.right())
            .field("height", &self.height())
            .finish()
    }
}
