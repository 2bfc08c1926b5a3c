//! Reference-model equivalence testing.
//!
//! Operations are applied both to an [`AvlTree`] and to a `BTreeMap` counting occurrences of each
//! key, and the two are compared after every step.

extern crate std;

use std::{collections::BTreeMap, prelude::v1::*, ptr::NonNull};

use arbitrary::Arbitrary;
use cordyceps::Linked;
use proptest::strategy::{Just, Strategy};

use crate::{AvlTree, Links, TreeNode};

#[derive(Debug)]
#[repr(C)]
pub struct TestNode {
    pub links: Links<TestNode>,
    pub key: u32,
}

impl TestNode {
    pub fn new(key: u32) -> Box<TestNode> {
        Box::new(TestNode {
            links: Links::new(),
            key,
        })
    }
}

unsafe impl Linked<Links<TestNode>> for TestNode {
    type Handle = Box<TestNode>;

    fn into_ptr(r: Self::Handle) -> NonNull<Self> {
        NonNull::new(Box::into_raw(r)).unwrap()
    }

    unsafe fn from_ptr(ptr: NonNull<Self>) -> Self::Handle {
        unsafe { Box::from_raw(ptr.as_ptr()) }
    }

    unsafe fn links(ptr: NonNull<Self>) -> NonNull<Links<TestNode>> {
        // SAFETY: Self is #[repr(C)] and `links` is first field
        ptr.cast()
    }
}

impl TreeNode<Links<TestNode>> for TestNode {
    type Key = u32;

    fn key(&self) -> &Self::Key {
        &self.key
    }
}

/// Returns `true` if `height` is possible for an AVL tree holding `len` elements.
///
/// For `len >= 1` this is `floor(log2(len)) <= height <= floor(1.45 * log2(len + 2))`. An empty
/// tree reports height 0.
pub fn is_avl_height(len: usize, height: usize) -> bool {
    if len == 0 {
        return height == 0;
    }

    let min = (len as f64).log2().floor() as usize;
    let max = (1.45 * ((len + 2) as f64).log2()).floor() as usize;

    (min..=max).contains(&height)
}

#[derive(Copy, Clone, Debug, Arbitrary)]
pub enum ItemValue {
    Index(usize),
    Random(u32),
}

proptest::prop_compose! {
    fn index_strategy()(
        index in 0usize..1000,
    ) -> ItemValue {
        ItemValue::Index(index)
    }
}

proptest::prop_compose! {
    fn random_strategy()(
        random in 0u32..1000,
    ) -> ItemValue {
        ItemValue::Random(random)
    }
}

fn value_strategy() -> impl Strategy<Value = ItemValue> {
    proptest::prop_oneof![index_strategy(), random_strategy()]
}

#[derive(Copy, Clone, Debug, Arbitrary)]
pub enum Op {
    Insert(ItemValue),
    Contains(ItemValue),
    Remove(ItemValue),
    First,
    PopFirst,
    Last,
    PopLast,
}

impl Op {
    // Resolves index-based values against the distinct keys currently stored, so that lookups and
    // removals hit existing keys often.
    fn finalize(self, keys: &[u32]) -> FinalOp {
        fn get_value(v: &[u32], i: ItemValue) -> u32 {
            match i {
                ItemValue::Index(idx) => {
                    if v.is_empty() {
                        idx as u32
                    } else {
                        v[idx % v.len()]
                    }
                }
                ItemValue::Random(v) => v,
            }
        }

        match self {
            Op::Insert(item) => FinalOp::Insert(get_value(keys, item)),
            Op::Contains(item) => FinalOp::Contains(get_value(keys, item)),
            Op::Remove(item) => FinalOp::Remove(get_value(keys, item)),
            Op::First => FinalOp::First,
            Op::PopFirst => FinalOp::PopFirst,
            Op::Last => FinalOp::Last,
            Op::PopLast => FinalOp::PopLast,
        }
    }
}

#[derive(Copy, Clone, Debug)]
enum FinalOp {
    Insert(u32),
    Contains(u32),
    Remove(u32),
    First,
    PopFirst,
    Last,
    PopLast,
}

pub fn op_strategy() -> impl Strategy<Value = Op> {
    proptest::prop_oneof![
        value_strategy().prop_map(Op::Insert),
        value_strategy().prop_map(Op::Contains),
        value_strategy().prop_map(Op::Remove),
        Just(Op::First),
        Just(Op::PopFirst),
        Just(Op::Last),
        Just(Op::PopLast),
    ]
}

// Removes one occurrence of `key` from the counting model.
fn model_remove(model: &mut BTreeMap<u32, usize>, key: u32) -> Option<u32> {
    let count = model.get_mut(&key)?;
    *count -= 1;

    if *count == 0 {
        model.remove(&key);
    }

    Some(key)
}

pub fn run_multiset_equivalence(ops: Vec<Op>) {
    let mut model: BTreeMap<u32, usize> = BTreeMap::new();
    let mut avl: AvlTree<TestNode> = AvlTree::new();

    #[inline]
    #[allow(clippy::boxed_local)]
    fn node_key(node: Box<TestNode>) -> u32 {
        node.key
    }

    for (op_id, op) in ops.into_iter().enumerate() {
        let keys: Vec<u32> = model.keys().copied().collect();
        let final_op = op.finalize(&keys);

        match final_op {
            FinalOp::Insert(value) => {
                *model.entry(value).or_insert(0) += 1;
                avl.insert(TestNode::new(value));
            }

            FinalOp::Contains(value) => {
                let from_model = model.contains_key(&value);
                let from_avl = avl.contains_key(&value);

                assert_eq!(from_model, from_avl, "FinalOp #{op_id}: {final_op:?}");
            }

            FinalOp::Remove(value) => {
                let from_model = model_remove(&mut model, value);
                let from_avl = avl.remove(&value).map(node_key);

                assert_eq!(from_model, from_avl, "FinalOp #{op_id}: {final_op:?}");
            }

            FinalOp::First => {
                let from_model = model.keys().next().copied();
                let from_avl = avl.first().map(|node| node.key);

                assert_eq!(from_model, from_avl, "FinalOp #{op_id}: {final_op:?}");
            }

            FinalOp::PopFirst => {
                let first = model.keys().next().copied();
                let from_model = first.and_then(|key| model_remove(&mut model, key));
                let from_avl = avl.pop_first().map(node_key);

                assert_eq!(from_model, from_avl, "FinalOp #{op_id}: {final_op:?}");
            }

            FinalOp::Last => {
                let from_model = model.keys().next_back().copied();
                let from_avl = avl.last().map(|node| node.key);

                assert_eq!(from_model, from_avl, "FinalOp #{op_id}: {final_op:?}");
            }

            FinalOp::PopLast => {
                let last = model.keys().next_back().copied();
                let from_model = last.and_then(|key| model_remove(&mut model, key));
                let from_avl = avl.pop_last().map(node_key);

                assert_eq!(from_model, from_avl, "FinalOp #{op_id}: {final_op:?}");
            }
        }

        avl.assert_invariants();

        let expected: Vec<u32> = model
            .iter()
            .flat_map(|(&key, &count)| std::iter::repeat(key).take(count))
            .collect();
        let actual: Vec<u32> = avl.iter().map(|node| node.key).collect();

        assert_eq!(expected, actual, "FinalOp #{op_id}: {final_op:?}");
        assert!(
            is_avl_height(avl.len(), avl.height()),
            "height {} out of bounds for {} elements",
            avl.height(),
            avl.len()
        );
    }
}
