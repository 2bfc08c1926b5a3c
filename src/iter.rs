use core::iter::FusedIterator;

use crate::{AvlTree, Dir, Link, Links, TreeNode};

enum Step {
    // Entering a new subtree at its root.
    Descend,
    // The left subtree of the current node has been exhausted.
    Yield,
    // The current node was just yielded.
    Yielded,
    // The subtree rooted at the current node has been exhausted.
    Ascend,
}

/// An in-order iterator over the elements of an [`AvlTree`].
///
/// Traversal uses the parent links, so the iterator needs no stack.
pub struct Iter<'tree, T: TreeNode<Links<T>> + ?Sized> {
    tree: &'tree AvlTree<T>,

    front_cur: Link<T>,
    front_step: Step,

    len: usize,
}

impl<'tree, T: TreeNode<Links<T>> + ?Sized> Iter<'tree, T> {
    pub(crate) fn new(tree: &'tree AvlTree<T>) -> Self {
        Iter {
            tree,

            front_cur: tree.root,
            front_step: Step::Descend,
            len: tree.len(),
        }
    }
}

impl<'tree, T: TreeNode<Links<T>> + ?Sized> Iterator for Iter<'tree, T> {
    type Item = &'tree T;

    fn next(&mut self) -> Option<Self::Item> {
        if self.len == 0 {
            return None;
        }

        let mut cur = self.front_cur?;

        loop {
            match self.front_step {
                Step::Descend => {
                    // Upon entering a new subtree, find the minimum element.
                    let (min, _) = unsafe { self.tree.min_in_subtree(cur) };
                    cur = min;

                    // Once the minimum is found, its (empty) left subtree has been exhausted.
                    self.front_step = Step::Yield;
                }

                Step::Yield => {
                    // Save off the iterator state and return the node.
                    self.front_cur = Some(cur);
                    self.front_step = Step::Yielded;
                    self.len -= 1;

                    return Some(unsafe { cur.as_ref() });
                }

                Step::Yielded => match unsafe { self.tree.links(cur).right() } {
                    // If the right subtree is not empty, go there.
                    Some(right) => {
                        cur = right;
                        self.front_step = Step::Descend;
                    }

                    None => self.front_step = Step::Ascend,
                },

                Step::Ascend => {
                    // Leaving a left subtree means the parent is next; leaving a right subtree
                    // means the parent's subtree is exhausted as well.
                    let parent = unsafe { self.tree.links(cur).parent() }?;

                    self.front_step = match unsafe { self.tree.which_child(parent, cur) } {
                        Dir::Left => Step::Yield,
                        Dir::Right => Step::Ascend,
                    };

                    cur = parent;
                }
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.len, Some(self.len))
    }
}

impl<'tree, T: TreeNode<Links<T>> + ?Sized> ExactSizeIterator for Iter<'tree, T> {}

impl<'tree, T: TreeNode<Links<T>> + ?Sized> FusedIterator for Iter<'tree, T> {}
