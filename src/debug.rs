extern crate std;

use core::ptr::NonNull;
use std::{collections::VecDeque, fmt, prelude::v1::*};

use crate::{AvlTree, Links, TreeNode};

impl<T> AvlTree<T>
where
    T: TreeNode<Links<T>>,
    T::Key: fmt::Display,
{
    /// Writes the tree as a Graphviz digraph named `name`.
    ///
    /// Every node is labelled `key:height`. Missing children are drawn as points so that left and
    /// right children remain distinguishable. Nodes are identified by address, so equal keys are
    /// drawn as separate nodes.
    pub fn dotgraph<W>(&self, name: &str, mut w: W) -> fmt::Result
    where
        W: fmt::Write,
    {
        let root = match self.root {
            Some(r) => r,
            None => return write!(w, "digraph \"graph-{name}\" {{}}"),
        };

        enum Item<T> {
            Node(NonNull<T>),
            Missing(u32),
        }

        let mut queue = VecDeque::new();
        queue.push_back(Item::Node(root));

        write!(
            w,
            "digraph \"graph-{name}\" {{\n subgraph \"subgraph-{name}\" {{"
        )?;

        let mut missing = 0;
        let mut edges = String::new();

        while !queue.is_empty() {
            use fmt::Write;

            write!(w, "{{rank=same; ")?;

            // Drain exactly one level of the tree.
            for _ in 0..queue.len() {
                let Some(item) = queue.pop_front() else {
                    break;
                };

                let node = match item {
                    Item::Node(node) => node,
                    Item::Missing(id) => {
                        write!(w, "\"graph{name}-missing{id}\" [shape=point]; ")?;
                        continue;
                    }
                };

                let key = unsafe { node.as_ref().key() };
                let height = unsafe { self.links(node).height() };
                write!(w, "\"graph{name}-{node:p}\" [label=\"{key}:{height}\"]; ")?;

                for child in unsafe { [self.links(node).left(), self.links(node).right()] } {
                    match child {
                        Some(child) => {
                            queue.push_back(Item::Node(child));
                            writeln!(
                                edges,
                                "\"graph{name}-{node:p}\" -> \"graph{name}-{child:p}\";"
                            )?;
                        }

                        None => {
                            queue.push_back(Item::Missing(missing));
                            writeln!(
                                edges,
                                "\"graph{name}-{node:p}\" -> \"graph{name}-missing{missing}\";"
                            )?;
                            missing += 1;
                        }
                    }
                }
            }

            writeln!(w, "}}")?;
        }

        w.write_str(&edges)?;

        w.write_str(" }\n}")
    }
}
