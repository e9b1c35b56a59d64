//! Federation Rewriting
//!
//! Bottom-up pass that inserts ownership markers. A subtree is wrapped in an
//! [`OwnedTupleExpr`](crate::algebra::OwnedTupleExpr) when one member holds
//! all of its data, and replicated as a union of per-member markers when it
//! is a subject star over local predicates. Anything else stays generic and
//! is evaluated across all members by the executor.

use crate::algebra::{AlgebraNode, AlgebraTree, NodeId, TreeRewriter};
use crate::error::Result;
use crate::member::MemberId;
use crate::ownership::OwnershipAnalyzer;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Counters of one rewriting run
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewriteStats {
    /// Ownership markers inserted, replicas included
    pub markers_created: usize,
    /// Subtrees replicated across every member
    pub replicated: usize,
    /// Filters, projections and slices moved inside a marker
    pub pushed_down: usize,
}

/// Inserts ownership markers, post-order
pub struct FederationRewriter<'r, 'a> {
    analyzer: &'r mut OwnershipAnalyzer<'a>,
    push_unary: bool,
    stats: RewriteStats,
}

impl<'r, 'a> FederationRewriter<'r, 'a> {
    pub fn new(analyzer: &'r mut OwnershipAnalyzer<'a>) -> Self {
        Self {
            analyzer,
            push_unary: true,
            stats: RewriteStats::default(),
        }
    }

    /// Moves unary operators over a marker inside it
    pub fn with_unary_push_down(mut self, enabled: bool) -> Self {
        self.push_unary = enabled;
        self
    }

    pub fn stats(&self) -> RewriteStats {
        self.stats
    }

    /// Rewrites the whole plan
    pub fn run(&mut self, tree: &mut AlgebraTree) -> Result<RewriteStats> {
        tree.rewrite_root(self)?;
        debug!(
            "Federation rewrite: {} markers, {} replicated, {} pushed down",
            self.stats.markers_created, self.stats.replicated, self.stats.pushed_down
        );
        Ok(self.stats)
    }

    fn rewrite_join(&mut self, tree: &mut AlgebraTree, id: NodeId) -> Result<NodeId> {
        let binary = matches!(tree.node(id), AlgebraNode::Join { .. });
        let children = tree.children(id);
        if children.is_empty() {
            return Ok(id);
        }

        let mut owned_children = Vec::with_capacity(children.len());
        for &child in &children {
            owned_children.push((self.analyzer.single_owner(tree, child)?, child));
        }
        let by_owner = group_by(owned_children.iter().cloned());

        let by_subject = group_by(children.iter().map(|&child| {
            let subject = self.analyzer.local_subject(tree, child);
            (subject.map(|v| v.name().to_string()), child)
        }));
        let local = by_subject
            .iter()
            .any(|(subject, group)| subject.is_some() && group.len() > 1);

        if let [(owner, _)] = by_owner.as_slice() {
            match owner {
                Some(owner) => return Ok(self.wrap(tree, owner.clone(), id)),
                None if !local => return Ok(id),
                None => {}
            }
        }

        let mut args = Vec::new();
        if local {
            for (subject, group) in by_subject {
                if subject.is_some() {
                    let node = group_node(tree, binary, group);
                    let arg = match self.analyzer.single_owner(tree, node)? {
                        Some(owner) => self.wrap(tree, owner, node),
                        None => self.replicate(tree, node),
                    };
                    args.push(arg);
                } else {
                    let owners = owned_children
                        .iter()
                        .filter(|(_, child)| group.contains(child))
                        .cloned();
                    self.wrap_owner_groups(tree, binary, group_by(owners), &mut args);
                }
            }
        } else {
            self.wrap_owner_groups(tree, binary, by_owner, &mut args);
        }

        if args == children {
            return Ok(id);
        }
        Ok(group_node(tree, binary, args))
    }

    /// Wraps each concrete-owner group; children without an owner are kept
    fn wrap_owner_groups(
        &mut self,
        tree: &mut AlgebraTree,
        binary: bool,
        groups: Vec<(Option<MemberId>, Vec<NodeId>)>,
        args: &mut Vec<NodeId>,
    ) {
        for (owner, group) in groups {
            match owner {
                Some(owner) => {
                    let node = group_node(tree, binary, group);
                    args.push(self.wrap(tree, owner, node));
                }
                None => args.extend(group),
            }
        }
    }

    fn rewrite_left_join(&mut self, tree: &mut AlgebraTree, id: NodeId) -> Result<NodeId> {
        let (left, right) = match tree.node(id) {
            AlgebraNode::LeftJoin { left, right, .. } => (*left, *right),
            _ => return Ok(id),
        };
        let lo = self.analyzer.single_owner(tree, left)?;
        let ro = self.analyzer.single_owner(tree, right)?;
        let local = match (
            self.analyzer.local_subject(tree, left),
            self.analyzer.local_subject(tree, right),
        ) {
            (Some(l), Some(r)) => l.name() == r.name(),
            _ => false,
        };

        match (lo, ro) {
            (Some(lo), Some(ro)) if lo == ro => Ok(self.wrap(tree, lo, id)),
            (None, None) if local => Ok(self.replicate(tree, id)),
            (None, None) => Ok(id),
            (Some(lo), None) if local => Ok(self.wrap(tree, lo, id)),
            (None, Some(ro)) if local => {
                // the optional side only exists at its owner
                let mut branches = Vec::new();
                for member in self.analyzer.members() {
                    let branch = if *member.id() == ro {
                        self.wrap(tree, ro.clone(), id)
                    } else {
                        let left_copy = tree.clone_subtree(left);
                        self.wrap(tree, member.id().clone(), left_copy)
                    };
                    branches.push(branch);
                }
                self.stats.replicated += 1;
                Ok(tree.union_all(branches).unwrap_or(id))
            }
            (lo, ro) => {
                if let Some(lo) = lo {
                    let wrapped = self.wrap(tree, lo, left);
                    tree.replace_child_at(id, 0, wrapped);
                }
                if let Some(ro) = ro {
                    let wrapped = self.wrap(tree, ro, right);
                    tree.replace_child_at(id, 1, wrapped);
                }
                Ok(id)
            }
        }
    }

    fn rewrite_union(&mut self, tree: &mut AlgebraTree, id: NodeId) -> Result<NodeId> {
        let (left, right) = match tree.node(id) {
            AlgebraNode::Union { left, right } => (*left, *right),
            _ => return Ok(id),
        };
        let lo = self.analyzer.single_owner(tree, left)?;
        let ro = self.analyzer.single_owner(tree, right)?;

        if let (Some(l), Some(r)) = (&lo, &ro) {
            if l == r {
                return Ok(self.wrap(tree, l.clone(), id));
            }
        }
        if let Some(lo) = lo {
            let wrapped = self.wrap(tree, lo, left);
            tree.replace_child_at(id, 0, wrapped);
        }
        if let Some(ro) = ro {
            let wrapped = self.wrap(tree, ro, right);
            tree.replace_child_at(id, 1, wrapped);
        }
        Ok(id)
    }

    /// `Op(Owned(m, X))` becomes `Owned(m, Op(X))`, reusing both nodes
    fn push_into_owner(&mut self, tree: &mut AlgebraTree, id: NodeId) -> NodeId {
        let Some(&marker) = tree.children(id).first() else {
            return id;
        };
        let Some(inner) = tree.node(marker).as_owned().map(|owned| owned.arg) else {
            return id;
        };
        tree.replace_child_at(id, 0, inner);
        tree.replace_child_at(marker, 0, id);
        self.stats.pushed_down += 1;
        marker
    }

    fn wrap(&mut self, tree: &mut AlgebraTree, owner: MemberId, id: NodeId) -> NodeId {
        self.stats.markers_created += 1;
        tree.owned(owner, id)
    }

    /// Union over all members of `Owned(member, copy of id)`
    fn replicate(&mut self, tree: &mut AlgebraTree, id: NodeId) -> NodeId {
        let mut branches = Vec::new();
        for (index, member) in self.analyzer.members().iter().enumerate() {
            let arg = if index == 0 { id } else { tree.clone_subtree(id) };
            branches.push(self.wrap(tree, member.id().clone(), arg));
        }
        self.stats.replicated += 1;
        debug!(
            "Replicated {} across {} members",
            tree.node(id).kind(),
            branches.len()
        );
        tree.union_all(branches).unwrap_or(id)
    }
}

impl TreeRewriter for FederationRewriter<'_, '_> {
    fn rewrite(&mut self, tree: &mut AlgebraTree, id: NodeId) -> Result<NodeId> {
        if self.analyzer.members().is_empty() {
            return Ok(id);
        }
        match tree.node(id) {
            AlgebraNode::Join { .. } | AlgebraNode::NaryJoin { .. } => self.rewrite_join(tree, id),
            AlgebraNode::LeftJoin { .. } => self.rewrite_left_join(tree, id),
            AlgebraNode::Union { .. } => self.rewrite_union(tree, id),
            AlgebraNode::Projection { .. }
            | AlgebraNode::Selection { .. }
            | AlgebraNode::RowSelection { .. }
                if self.push_unary =>
            {
                Ok(self.push_into_owner(tree, id))
            }
            _ => Ok(id),
        }
    }
}

/// Groups items by key, keeping groups in order of first appearance
fn group_by<K: PartialEq>(
    items: impl IntoIterator<Item = (K, NodeId)>,
) -> Vec<(K, Vec<NodeId>)> {
    let mut groups: Vec<(K, Vec<NodeId>)> = Vec::new();
    for (key, id) in items {
        match groups.iter_mut().find(|(k, _)| *k == key) {
            Some((_, group)) => group.push(id),
            None => groups.push((key, vec![id])),
        }
    }
    groups
}

/// A single node for a group of join arguments
fn group_node(tree: &mut AlgebraTree, binary: bool, mut group: Vec<NodeId>) -> NodeId {
    match group.len() {
        1 => group.remove(0),
        2 if binary => tree.join(group[0], group[1]),
        _ => tree.nary_join(group),
    }
}
