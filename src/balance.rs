use core::ptr::NonNull;

use crate::{AvlTree, Dir, Link, Links, TreeNode};

/// The height difference between the two subtrees of a node.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) struct Balance {
    /// The absolute difference between the subtree heights.
    pub(crate) diff: u8,
    /// The side of the taller subtree. Equal heights report `Dir::Left`.
    pub(crate) taller: Dir,
}

/// The four rotation shapes.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum Rotation {
    Left,
    Right,
    LeftRight,
    RightLeft,
}

impl Rotation {
    // Picks the rotation for a node whose `taller` subtree exceeds the other by 2, given the
    // balance of the root of that taller subtree.
    fn select(taller: Dir, child: Balance) -> Rotation {
        // The grandchild on the outer side is at least as tall as the inner one.
        let outer = child.diff == 0 || child.taller == taller;

        match (taller, outer) {
            (Dir::Left, true) => Rotation::Right,
            (Dir::Right, true) => Rotation::Left,
            (Dir::Left, false) => Rotation::LeftRight,
            (Dir::Right, false) => Rotation::RightLeft,
        }
    }
}

impl<T> AvlTree<T>
where
    T: TreeNode<Links<T>> + ?Sized,
{
    /// Returns the balance of `node`, computed from the cached heights of its children.
    pub(crate) unsafe fn balance(&self, node: NonNull<T>) -> Balance {
        unsafe {
            let left_height = self.height_of(self.links(node).left());
            let right_height = self.height_of(self.links(node).right());

            Balance {
                diff: left_height.abs_diff(right_height),
                taller: if left_height >= right_height {
                    Dir::Left
                } else {
                    Dir::Right
                },
            }
        }
    }

    // Walks from `start` up to the root, refreshing heights and rotating every node whose
    // subtrees differ in height by 2. The last node visited becomes the root.
    //
    // Invariants:
    // - Every node off the path from `start` to the root has a correct height and balance.
    // - Every balance difference on the path is at most 2.
    pub(crate) unsafe fn rebalance_from(&mut self, start: Link<T>) {
        let mut opt_cur = start;

        while let Some(cur) = opt_cur {
            unsafe {
                self.update_height(cur);

                let balance = self.balance(cur);
                assert!(
                    balance.diff <= 2,
                    "height difference of {} found during rebalance; heights are corrupt",
                    balance.diff,
                );

                let top = if balance.diff == 2 {
                    self.rotate(cur, balance.taller)
                } else {
                    cur
                };

                match self.links(top).parent() {
                    Some(parent) => opt_cur = Some(parent),
                    None => {
                        self.root = Some(top);
                        opt_cur = None;
                    }
                }
            }
        }
    }

    // Restores the balance of `node`, whose `taller` subtree is 2 higher than the other one.
    //
    // Returns the new root of the subtree.
    unsafe fn rotate(&mut self, node: NonNull<T>, taller: Dir) -> NonNull<T> {
        unsafe {
            let child = self
                .links(node)
                .child(taller)
                .expect("taller subtree must not be empty");

            let rotation = Rotation::select(taller, self.balance(child));

            let top = match rotation {
                Rotation::Left => self.rotate_left(node),
                Rotation::Right => self.rotate_right(node),
                Rotation::LeftRight => self.rotate_left_right(node),
                Rotation::RightLeft => self.rotate_right_left(node),
            };

            let height = self.links(top).height();
            tracing::trace!(?rotation, height, "rotated unbalanced subtree");

            top
        }
    }

    /// Lifts the right child of `node` into its place.
    pub(crate) unsafe fn rotate_left(&mut self, node: NonNull<T>) -> NonNull<T> {
        unsafe { self.rotate_toward(node, Dir::Left) }
    }

    /// Lifts the left child of `node` into its place.
    pub(crate) unsafe fn rotate_right(&mut self, node: NonNull<T>) -> NonNull<T> {
        unsafe { self.rotate_toward(node, Dir::Right) }
    }

    /// Lifts the right child of the left child of `node` into its place.
    pub(crate) unsafe fn rotate_left_right(&mut self, node: NonNull<T>) -> NonNull<T> {
        unsafe {
            let left = self.links(node).left().expect("left child must exist");
            self.rotate_left(left);
            self.rotate_right(node)
        }
    }

    /// Lifts the left child of the right child of `node` into its place.
    pub(crate) unsafe fn rotate_right_left(&mut self, node: NonNull<T>) -> NonNull<T> {
        unsafe {
            let right = self.links(node).right().expect("right child must exist");
            self.rotate_right(right);
            self.rotate_left(node)
        }
    }

    // Performs a single rotation, moving `down` down towards `dir` and its `!dir` child up.
    //
    // The heights of `down` and the lifted node are updated; the heights of their ancestors are
    // not.
    unsafe fn rotate_toward(&mut self, down: NonNull<T>, dir: Dir) -> NonNull<T> {
        unsafe {
            let up = self
                .links(down)
                .child(!dir)
                .expect("rotated node must have a child to lift");

            // - `down` becomes the `dir` child of `up`.
            // - `across` goes from the `dir` child of `up` to the `!dir` child of `down`.
            let across = self.links(up).child(dir);
            self.links_mut(down).set_child(!dir, across);
            self.maybe_set_parent(across, Some(down));

            self.links_mut(up).set_child(dir, Some(down));
            let parent = self.links_mut(down).set_parent(Some(up));
            self.links_mut(up).set_parent(parent);

            self.replace_child_or_set_root(parent, down, Some(up));

            // `down` is now below `up`, so it must be updated first.
            self.update_height(down);
            self.update_height(up);

            up
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TestNode;

    fn build(keys: &[u32]) -> AvlTree<TestNode> {
        let mut tree = AvlTree::new();

        for &key in keys {
            tree.insert(TestNode::new(key));
            tree.assert_invariants();
        }

        tree
    }

    fn root_key(tree: &AvlTree<TestNode>) -> u32 {
        unsafe { tree.root.expect("tree must not be empty").as_ref().key }
    }

    fn keys(tree: &AvlTree<TestNode>) -> Vec<u32> {
        tree.iter().map(|node| node.key).collect()
    }

    #[test]
    fn select_rotation() {
        let balanced = Balance {
            diff: 0,
            taller: Dir::Left,
        };
        let left_heavy = Balance {
            diff: 1,
            taller: Dir::Left,
        };
        let right_heavy = Balance {
            diff: 1,
            taller: Dir::Right,
        };

        assert_eq!(Rotation::select(Dir::Left, left_heavy), Rotation::Right);
        assert_eq!(Rotation::select(Dir::Left, balanced), Rotation::Right);
        assert_eq!(Rotation::select(Dir::Left, right_heavy), Rotation::LeftRight);

        assert_eq!(Rotation::select(Dir::Right, right_heavy), Rotation::Left);
        assert_eq!(Rotation::select(Dir::Right, balanced), Rotation::Left);
        assert_eq!(Rotation::select(Dir::Right, left_heavy), Rotation::RightLeft);
    }

    #[test]
    fn single_left_rotation() {
        let tree = build(&[1, 2, 3]);
        assert_eq!(root_key(&tree), 2);
        assert_eq!(tree.height(), 1);
        assert_eq!(keys(&tree), [1, 2, 3]);
    }

    #[test]
    fn single_right_rotation() {
        let tree = build(&[3, 2, 1]);
        assert_eq!(root_key(&tree), 2);
        assert_eq!(tree.height(), 1);
        assert_eq!(keys(&tree), [1, 2, 3]);
    }

    #[test]
    fn left_right_rotation() {
        let tree = build(&[3, 1, 2]);
        assert_eq!(root_key(&tree), 2);
        assert_eq!(tree.height(), 1);
        assert_eq!(keys(&tree), [1, 2, 3]);
    }

    #[test]
    fn right_left_rotation() {
        let tree = build(&[1, 3, 2]);
        assert_eq!(root_key(&tree), 2);
        assert_eq!(tree.height(), 1);
        assert_eq!(keys(&tree), [1, 2, 3]);
    }

    #[test]
    fn rotation_below_root_relinks_parent() {
        // 4's right subtree 5 -> 6 -> 7 rotates below the root.
        let tree = build(&[4, 2, 5, 6, 7]);
        assert_eq!(root_key(&tree), 4);
        assert_eq!(tree.height(), 2);
        assert_eq!(keys(&tree), [2, 4, 5, 6, 7]);
    }

    #[test]
    fn balance_of_nodes() {
        let mut tree = build(&[2, 1]);

        unsafe {
            let root = tree.root.unwrap();
            assert_eq!(
                tree.balance(root),
                Balance {
                    diff: 1,
                    taller: Dir::Left
                }
            );
        }

        tree.insert(TestNode::new(3));

        unsafe {
            let root = tree.root.unwrap();
            assert_eq!(
                tree.balance(root),
                Balance {
                    diff: 0,
                    taller: Dir::Left
                }
            );
        }
    }

    #[test]
    fn duplicates_rotate_like_distinct_keys() {
        let tree = build(&[7, 7, 7]);
        assert_eq!(root_key(&tree), 7);
        assert_eq!(tree.height(), 1);
        assert_eq!(tree.len(), 3);
    }

    #[test]
    #[should_panic(expected = "heights are corrupt")]
    fn corrupt_heights_are_fatal() {
        let mut tree = build(&[2, 1, 3, 4]);

        unsafe {
            // The root's left subtree has height 0, so a right height of 3 is 3 apart.
            let root = tree.root.unwrap();
            let right = tree.links(root).right().unwrap();
            tree.links_mut(right).set_height(3);

            tree.rebalance_from(Some(root));
        }
    }
}
