use alloc::boxed::Box;
use core::{borrow::Borrow, fmt, iter::FusedIterator, marker::PhantomPinned, ptr::NonNull};

use cordyceps::Linked;

use crate::{AvlError, AvlTree, Iter, Links, Result, TreeNode};

/// An ordered multiset based on an [AVL tree].
///
/// Equal values are stored as distinct elements and counted individually.
///
/// [AVL tree]: https://en.wikipedia.org/wiki/AVL_tree
pub struct AvlMultiset<T: Ord> {
    tree: AvlTree<MultisetNode<T>>,
}

struct MultisetNode<T> {
    links: Links<MultisetNode<T>>,
    value: T,
    _unpin: PhantomPinned,
}

impl<T> MultisetNode<T> {
    fn new(value: T) -> Box<Self> {
        Box::new(MultisetNode {
            links: Links::new(),
            value,
            _unpin: PhantomPinned,
        })
    }
}

unsafe impl<T> Linked<Links<MultisetNode<T>>> for MultisetNode<T> {
    type Handle = Box<Self>;

    fn into_ptr(r: Self::Handle) -> NonNull<Self> {
        Box::leak(r).into()
    }

    unsafe fn from_ptr(ptr: NonNull<Self>) -> Self::Handle {
        unsafe { Box::from_raw(ptr.as_ptr()) }
    }

    unsafe fn links(ptr: NonNull<Self>) -> NonNull<Links<MultisetNode<T>>> {
        let ptr = ptr.as_ptr();
        unsafe { NonNull::new_unchecked(core::ptr::addr_of_mut!((*ptr).links)) }
    }
}

impl<T: Ord> TreeNode<Links<MultisetNode<T>>> for MultisetNode<T> {
    type Key = T;

    fn key(&self) -> &Self::Key {
        &self.value
    }
}

// SAFETY: The multiset exclusively owns every node reachable from its tree, and shared access only
// ever reads through the links.
unsafe impl<T: Ord + Send> Send for AvlMultiset<T> {}
unsafe impl<T: Ord + Sync> Sync for AvlMultiset<T> {}

impl<T: Ord> AvlMultiset<T> {
    /// Creates a new, empty `AvlMultiset`.
    pub const fn new() -> Self {
        Self {
            tree: AvlTree::new(),
        }
    }

    /// Returns `true` if the multiset contains no elements.
    pub const fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }

    /// Returns the number of elements in the multiset, counting duplicates.
    pub const fn len(&self) -> usize {
        self.tree.len()
    }

    /// Returns the height of the underlying tree.
    ///
    /// Both an empty multiset and a multiset with one element have height 0.
    pub fn height(&self) -> usize {
        self.tree.height()
    }

    /// Adds a value to the multiset.
    ///
    /// If equal values are already present, the new value is kept alongside them.
    pub fn insert(&mut self, value: T) {
        self.tree.insert(MultisetNode::new(value));
    }

    /// Adds a value coming from a source that may not have one.
    ///
    /// # Errors
    ///
    /// Returns [`AvlError::InvalidValue`] if `value` is `None`. The multiset is left unchanged.
    pub fn try_insert(&mut self, value: Option<T>) -> Result<()> {
        let Some(value) = value else {
            tracing::debug!(len = self.len(), "rejected absent value");
            return Err(AvlError::InvalidValue);
        };

        self.insert(value);
        Ok(())
    }

    /// Returns `true` if the multiset contains at least one value equal to `value`.
    #[inline]
    pub fn contains<Q>(&self, value: &Q) -> bool
    where
        T: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        self.tree.contains_key(value)
    }

    /// Returns a reference to a value equal to `value`.
    #[inline]
    pub fn get<Q>(&self, value: &Q) -> Option<&T>
    where
        T: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        self.tree.get(value).map(|node| &node.get_ref().value)
    }

    /// Removes one value equal to `value` and returns it.
    ///
    /// Returns `None` if no such value is present.
    #[inline]
    pub fn remove<Q>(&mut self, value: &Q) -> Option<T>
    where
        T: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        self.tree.remove(value).map(|node| node.value)
    }

    /// Returns the minimum value in the multiset.
    #[inline]
    pub fn first(&self) -> Option<&T> {
        self.tree.first().map(|node| &node.get_ref().value)
    }

    /// Removes and returns the minimum value in the multiset.
    #[inline]
    pub fn pop_first(&mut self) -> Option<T> {
        self.tree.pop_first().map(|node| node.value)
    }

    /// Returns the maximum value in the multiset.
    #[inline]
    pub fn last(&self) -> Option<&T> {
        self.tree.last().map(|node| &node.get_ref().value)
    }

    /// Removes and returns the maximum value in the multiset.
    #[inline]
    pub fn pop_last(&mut self) -> Option<T> {
        self.tree.pop_last().map(|node| node.value)
    }

    /// Returns an iterator over the values in ascending order.
    pub fn iter(&self) -> MultisetIter<'_, T> {
        MultisetIter {
            inner: self.tree.iter(),
        }
    }

    /// Clears the multiset, removing all elements.
    #[inline]
    pub fn clear(&mut self) {
        self.tree.clear();
    }

    #[doc(hidden)]
    pub fn assert_invariants(&self) {
        self.tree.assert_invariants();
    }
}

impl<T: Ord> Default for AvlMultiset<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Ord + fmt::Debug> fmt::Debug for AvlMultiset<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

impl<T: Ord> Extend<T> for AvlMultiset<T> {
    fn extend<I: IntoIterator<Item = T>>(&mut self, iter: I) {
        for value in iter {
            self.insert(value);
        }
    }
}

impl<T: Ord> FromIterator<T> for AvlMultiset<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let mut multiset = AvlMultiset::new();
        multiset.extend(iter);
        multiset
    }
}

impl<'a, T: Ord> IntoIterator for &'a AvlMultiset<T> {
    type Item = &'a T;
    type IntoIter = MultisetIter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// An iterator over the values of an [`AvlMultiset`] in ascending order.
pub struct MultisetIter<'a, T: Ord> {
    inner: Iter<'a, MultisetNode<T>>,
}

impl<'a, T: Ord> Iterator for MultisetIter<'a, T> {
    type Item = &'a T;

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|node| &node.value)
    }

    #[inline]
    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<'a, T: Ord> ExactSizeIterator for MultisetIter<'a, T> {}

impl<'a, T: Ord> FusedIterator for MultisetIter<'a, T> {}
