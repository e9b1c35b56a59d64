//! Post-order tree rewriting
//!
//! A pass implements [`TreeRewriter`]; the driver rewrites a node's children
//! first, stores whatever ids they return in the node's child slots, and then
//! hands the node itself to the pass. The id returned for the node replaces
//! it in its parent (or becomes the new root).

use super::tree::{AlgebraTree, NodeId};
use crate::error::Result;

/// A bottom-up rewrite pass
pub trait TreeRewriter {
    /// Whether the driver should visit the children of `id` before
    /// rewriting it. Defaults to always.
    fn descend_into(&mut self, _tree: &AlgebraTree, _id: NodeId) -> bool {
        true
    }

    /// Rewrites a node whose children have already been rewritten and
    /// returns the id that takes its place.
    fn rewrite(&mut self, tree: &mut AlgebraTree, id: NodeId) -> Result<NodeId>;
}

impl AlgebraTree {
    /// Runs `rewriter` post-order over the subtree rooted at `id`
    pub fn rewrite_post_order<R>(&mut self, id: NodeId, rewriter: &mut R) -> Result<NodeId>
    where
        R: TreeRewriter + ?Sized,
    {
        if rewriter.descend_into(self, id) {
            for (index, child) in self.children(id).into_iter().enumerate() {
                let rewritten = self.rewrite_post_order(child, rewriter)?;
                if rewritten != child {
                    self.replace_child_at(id, index, rewritten);
                }
            }
        }
        rewriter.rewrite(self, id)
    }

    /// Runs `rewriter` over the whole plan and installs the new root
    pub fn rewrite_root<R>(&mut self, rewriter: &mut R) -> Result<()>
    where
        R: TreeRewriter + ?Sized,
    {
        let root = self.root();
        let new_root = self.rewrite_post_order(root, rewriter)?;
        self.set_root(new_root);
        Ok(())
    }
}
