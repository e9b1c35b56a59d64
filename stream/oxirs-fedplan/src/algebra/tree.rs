//! Arena-backed query algebra tree
//!
//! Nodes live in a `Vec` owned by [`AlgebraTree`] and refer to their children
//! through [`NodeId`] slots. Replacing a node means overwriting one child
//! slot of its parent; the replaced subtree stays in the arena, unreachable,
//! until [`AlgebraTree::compact`] drops it.
//!
//! Every node owns its children exclusively: the same `NodeId` never appears
//! in two slots. Use [`AlgebraTree::clone_subtree`] when a subtree has to be
//! duplicated.

use super::expression::Expression;
use super::term::Var;
use crate::member::{MemberId, QueryLanguage};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Index of a node in its [`AlgebraTree`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Which graphs a statement pattern matches against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ContextScope {
    /// Default graph and all named graphs
    AllContexts,
    /// Default graph only
    NullContext,
    /// Named graphs only
    NamedContexts,
}

/// Triple/quad pattern leaf
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StatementPattern {
    pub subject: Var,
    pub predicate: Var,
    pub object: Var,
    pub context: Option<Var>,
    pub scope: ContextScope,
}

impl StatementPattern {
    pub fn new(subject: Var, predicate: Var, object: Var) -> Self {
        Self {
            subject,
            predicate,
            object,
            context: None,
            scope: ContextScope::AllContexts,
        }
    }

    /// Restricts the pattern to named graphs, binding the graph to `context`
    pub fn in_context(mut self, context: Var) -> Self {
        self.context = Some(context);
        self.scope = ContextScope::NamedContexts;
        self
    }

    pub fn with_scope(mut self, scope: ContextScope) -> Self {
        self.scope = scope;
        self
    }

    /// Present slots: subject, predicate, object and the context if any
    pub fn slots(&self) -> impl Iterator<Item = &Var> {
        [&self.subject, &self.predicate, &self.object]
            .into_iter()
            .chain(self.context.as_ref())
    }

    /// Names of the unbound slots
    pub fn binding_names(&self) -> BTreeSet<String> {
        self.slots()
            .filter(|v| !v.is_bound())
            .map(|v| v.name().to_string())
            .collect()
    }

    fn fmt_sse(&self, f: &mut impl fmt::Write) -> fmt::Result {
        write!(f, "(pattern {} {} {}", self.subject, self.predicate, self.object)?;
        if let Some(ctx) = &self.context {
            write!(f, " {ctx}")?;
        }
        match self.scope {
            ContextScope::AllContexts => {}
            ContextScope::NullContext => f.write_str(" default")?,
            ContextScope::NamedContexts => f.write_str(" named")?,
        }
        f.write_str(")")
    }
}

/// One renaming of a projection
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProjectionElem {
    pub source: String,
    pub target: String,
}

impl ProjectionElem {
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
        }
    }

    /// Keeps a binding under its own name
    pub fn keep(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            source: name.clone(),
            target: name,
        }
    }

    pub fn is_rename(&self) -> bool {
        self.source != self.target
    }
}

/// Query text prepared for push-down to a member
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RemoteQuery {
    pub language: QueryLanguage,
    pub text: String,
    /// Projected binding names, in the order of the query's select clause
    pub bindings: Vec<String>,
}

/// Ownership marker: the argument is evaluated entirely at `owner`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OwnedTupleExpr {
    pub owner: MemberId,
    pub arg: NodeId,
    /// Eligible for push-down as one remote sub-query
    pub prepared: bool,
    pub remote_query: Option<RemoteQuery>,
}

/// Query algebra node
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AlgebraNode {
    StatementPattern(StatementPattern),
    Join {
        left: NodeId,
        right: NodeId,
    },
    /// Optional join; rows of `left` without a compatible `right` row
    /// satisfying `condition` are kept unextended
    LeftJoin {
        left: NodeId,
        right: NodeId,
        condition: Option<Expression>,
    },
    Union {
        left: NodeId,
        right: NodeId,
    },
    Difference {
        left: NodeId,
        right: NodeId,
    },
    Intersection {
        left: NodeId,
        right: NodeId,
    },
    NaryJoin {
        args: Vec<NodeId>,
    },
    Projection {
        arg: NodeId,
        elements: Vec<ProjectionElem>,
    },
    Selection {
        arg: NodeId,
        condition: Expression,
    },
    RowSelection {
        arg: NodeId,
        offset: Option<u64>,
        limit: Option<u64>,
    },
    EmptySet,
    SingletonSet,
    OwnedTupleExpr(OwnedTupleExpr),
    /// Opaque tuple source supplied by the caller
    ExternalSet {
        name: String,
        bindings: BTreeSet<String>,
    },
}

impl AlgebraNode {
    /// Child slots in evaluation order
    pub fn children(&self) -> Vec<NodeId> {
        match self {
            AlgebraNode::StatementPattern(_)
            | AlgebraNode::EmptySet
            | AlgebraNode::SingletonSet
            | AlgebraNode::ExternalSet { .. } => Vec::new(),
            AlgebraNode::Join { left, right }
            | AlgebraNode::LeftJoin { left, right, .. }
            | AlgebraNode::Union { left, right }
            | AlgebraNode::Difference { left, right }
            | AlgebraNode::Intersection { left, right } => vec![*left, *right],
            AlgebraNode::NaryJoin { args } => args.clone(),
            AlgebraNode::Projection { arg, .. }
            | AlgebraNode::Selection { arg, .. }
            | AlgebraNode::RowSelection { arg, .. } => vec![*arg],
            AlgebraNode::OwnedTupleExpr(owned) => vec![owned.arg],
        }
    }

    /// Mutable child slots, same order as [`AlgebraNode::children`]
    pub fn children_mut(&mut self) -> Vec<&mut NodeId> {
        match self {
            AlgebraNode::StatementPattern(_)
            | AlgebraNode::EmptySet
            | AlgebraNode::SingletonSet
            | AlgebraNode::ExternalSet { .. } => Vec::new(),
            AlgebraNode::Join { left, right }
            | AlgebraNode::LeftJoin { left, right, .. }
            | AlgebraNode::Union { left, right }
            | AlgebraNode::Difference { left, right }
            | AlgebraNode::Intersection { left, right } => vec![left, right],
            AlgebraNode::NaryJoin { args } => args.iter_mut().collect(),
            AlgebraNode::Projection { arg, .. }
            | AlgebraNode::Selection { arg, .. }
            | AlgebraNode::RowSelection { arg, .. } => vec![arg],
            AlgebraNode::OwnedTupleExpr(owned) => vec![&mut owned.arg],
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            AlgebraNode::StatementPattern(_) => "pattern",
            AlgebraNode::Join { .. } => "join",
            AlgebraNode::LeftJoin { .. } => "leftjoin",
            AlgebraNode::Union { .. } => "union",
            AlgebraNode::Difference { .. } => "difference",
            AlgebraNode::Intersection { .. } => "intersection",
            AlgebraNode::NaryJoin { .. } => "multijoin",
            AlgebraNode::Projection { .. } => "project",
            AlgebraNode::Selection { .. } => "filter",
            AlgebraNode::RowSelection { .. } => "slice",
            AlgebraNode::EmptySet => "empty",
            AlgebraNode::SingletonSet => "singleton",
            AlgebraNode::OwnedTupleExpr(_) => "owned",
            AlgebraNode::ExternalSet { .. } => "external",
        }
    }

    pub fn is_empty_set(&self) -> bool {
        matches!(self, AlgebraNode::EmptySet)
    }

    pub fn is_singleton_set(&self) -> bool {
        matches!(self, AlgebraNode::SingletonSet)
    }

    pub fn as_owned(&self) -> Option<&OwnedTupleExpr> {
        match self {
            AlgebraNode::OwnedTupleExpr(owned) => Some(owned),
            _ => None,
        }
    }

    /// Copy of the node with every child slot zeroed, for payload comparison
    fn without_children(&self) -> AlgebraNode {
        let mut node = self.clone();
        for slot in node.children_mut() {
            *slot = NodeId(0);
        }
        node
    }
}

/// A query plan: node arena plus root
#[derive(Debug, Clone, Default)]
pub struct AlgebraTree {
    nodes: Vec<AlgebraNode>,
    root: Option<NodeId>,
}

impl AlgebraTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a detached node to the arena
    pub fn add(&mut self, node: AlgebraNode) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(node);
        id
    }

    pub fn set_root(&mut self, root: NodeId) {
        assert!(root.0 < self.nodes.len(), "root {root} is not in the arena");
        self.root = Some(root);
    }

    /// Root of the plan. Panics when no root has been set.
    pub fn root(&self) -> NodeId {
        match self.root {
            Some(root) => root,
            None => panic!("algebra tree has no root"),
        }
    }

    pub fn has_root(&self) -> bool {
        self.root.is_some()
    }

    pub fn node(&self, id: NodeId) -> &AlgebraNode {
        &self.nodes[id.0]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut AlgebraNode {
        &mut self.nodes[id.0]
    }

    pub fn children(&self, id: NodeId) -> Vec<NodeId> {
        self.node(id).children()
    }

    /// Number of nodes in the arena, including unreachable ones
    pub fn arena_len(&self) -> usize {
        self.nodes.len()
    }

    /// Number of nodes reachable from the root
    pub fn len(&self) -> usize {
        self.root.map_or(0, |root| self.subtree_ids(root).len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // ------------------------------------------------------------------
    // Builders
    // ------------------------------------------------------------------

    pub fn pattern(&mut self, pattern: StatementPattern) -> NodeId {
        self.add(AlgebraNode::StatementPattern(pattern))
    }

    pub fn join(&mut self, left: NodeId, right: NodeId) -> NodeId {
        self.add(AlgebraNode::Join { left, right })
    }

    pub fn nary_join(&mut self, args: Vec<NodeId>) -> NodeId {
        self.add(AlgebraNode::NaryJoin { args })
    }

    pub fn left_join(
        &mut self,
        left: NodeId,
        right: NodeId,
        condition: Option<Expression>,
    ) -> NodeId {
        self.add(AlgebraNode::LeftJoin {
            left,
            right,
            condition,
        })
    }

    pub fn union(&mut self, left: NodeId, right: NodeId) -> NodeId {
        self.add(AlgebraNode::Union { left, right })
    }

    pub fn difference(&mut self, left: NodeId, right: NodeId) -> NodeId {
        self.add(AlgebraNode::Difference { left, right })
    }

    pub fn intersection(&mut self, left: NodeId, right: NodeId) -> NodeId {
        self.add(AlgebraNode::Intersection { left, right })
    }

    pub fn projection(&mut self, arg: NodeId, elements: Vec<ProjectionElem>) -> NodeId {
        self.add(AlgebraNode::Projection { arg, elements })
    }

    pub fn selection(&mut self, arg: NodeId, condition: Expression) -> NodeId {
        self.add(AlgebraNode::Selection { arg, condition })
    }

    pub fn row_selection(
        &mut self,
        arg: NodeId,
        offset: Option<u64>,
        limit: Option<u64>,
    ) -> NodeId {
        self.add(AlgebraNode::RowSelection { arg, offset, limit })
    }

    pub fn empty_set(&mut self) -> NodeId {
        self.add(AlgebraNode::EmptySet)
    }

    pub fn singleton_set(&mut self) -> NodeId {
        self.add(AlgebraNode::SingletonSet)
    }

    pub fn owned(&mut self, owner: MemberId, arg: NodeId) -> NodeId {
        self.add(AlgebraNode::OwnedTupleExpr(OwnedTupleExpr {
            owner,
            arg,
            prepared: false,
            remote_query: None,
        }))
    }

    pub fn external_set<I, S>(&mut self, name: impl Into<String>, bindings: I) -> NodeId
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.add(AlgebraNode::ExternalSet {
            name: name.into(),
            bindings: bindings.into_iter().map(Into::into).collect(),
        })
    }

    /// Builds a left-deep chain of binary unions; `None` for an empty input
    pub fn union_all(&mut self, args: Vec<NodeId>) -> Option<NodeId> {
        args.into_iter().reduce(|acc, next| self.union(acc, next))
    }

    // ------------------------------------------------------------------
    // Mutation
    // ------------------------------------------------------------------

    /// Overwrites the `index`-th child slot of `parent`
    pub fn replace_child_at(&mut self, parent: NodeId, index: usize, new_child: NodeId) {
        let mut slots = self.nodes[parent.0].children_mut();
        assert!(index < slots.len(), "node {parent} has no child slot {index}");
        *slots[index] = new_child;
    }

    /// Overwrites the slot of `parent` holding `old_child`. Panics when
    /// `old_child` is not a child of `parent`.
    pub fn replace_child(&mut self, parent: NodeId, old_child: NodeId, new_child: NodeId) {
        let index = self
            .children(parent)
            .iter()
            .position(|c| *c == old_child)
            .unwrap_or_else(|| panic!("{old_child} is not a child of {parent}"));
        self.replace_child_at(parent, index, new_child);
    }

    /// Deep copy of a subtree with fresh ids
    pub fn clone_subtree(&mut self, id: NodeId) -> NodeId {
        let mut node = self.node(id).clone();
        let copies: Vec<NodeId> = node
            .children()
            .into_iter()
            .map(|child| self.clone_subtree(child))
            .collect();
        for (slot, copy) in node.children_mut().into_iter().zip(copies) {
            *slot = copy;
        }
        self.add(node)
    }

    /// Copies a subtree of another tree into this arena
    pub fn import_subtree(&mut self, other: &AlgebraTree, id: NodeId) -> NodeId {
        let mut node = other.node(id).clone();
        let copies: Vec<NodeId> = node
            .children()
            .into_iter()
            .map(|child| self.import_subtree(other, child))
            .collect();
        for (slot, copy) in node.children_mut().into_iter().zip(copies) {
            *slot = copy;
        }
        self.add(node)
    }

    /// Drops every node that is not reachable from the root
    pub fn compact(&mut self) {
        let Some(root) = self.root else {
            self.nodes.clear();
            return;
        };
        let mut compacted = AlgebraTree::new();
        let new_root = compacted.import_subtree(self, root);
        compacted.root = Some(new_root);
        *self = compacted;
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    /// Ids of a subtree in pre-order
    pub fn subtree_ids(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(next) = stack.pop() {
            out.push(next);
            let children = self.children(next);
            stack.extend(children.into_iter().rev());
        }
        out
    }

    /// Statement pattern leaves of a subtree, left to right
    pub fn statement_patterns(&self, id: NodeId) -> Vec<&StatementPattern> {
        self.subtree_ids(id)
            .into_iter()
            .filter_map(|n| match self.node(n) {
                AlgebraNode::StatementPattern(sp) => Some(sp),
                _ => None,
            })
            .collect()
    }

    /// Whether any node of the subtree satisfies `pred`
    pub fn any_in_subtree(&self, id: NodeId, pred: impl Fn(&AlgebraNode) -> bool) -> bool {
        self.subtree_ids(id).into_iter().any(|n| pred(self.node(n)))
    }

    /// Names of the bindings a node can produce
    pub fn binding_names(&self, id: NodeId) -> BTreeSet<String> {
        match self.node(id) {
            AlgebraNode::StatementPattern(sp) => sp.binding_names(),
            AlgebraNode::Join { left, right } | AlgebraNode::LeftJoin { left, right, .. } => {
                let mut names = self.binding_names(*left);
                names.extend(self.binding_names(*right));
                names
            }
            AlgebraNode::NaryJoin { args } => args
                .iter()
                .flat_map(|arg| self.binding_names(*arg))
                .collect(),
            // both arms of a well-formed union agree
            AlgebraNode::Union { left, .. }
            | AlgebraNode::Difference { left, .. }
            | AlgebraNode::Intersection { left, .. } => self.binding_names(*left),
            AlgebraNode::Projection { elements, .. } => {
                elements.iter().map(|e| e.target.clone()).collect()
            }
            AlgebraNode::Selection { arg, .. } | AlgebraNode::RowSelection { arg, .. } => {
                self.binding_names(*arg)
            }
            AlgebraNode::OwnedTupleExpr(owned) => self.binding_names(owned.arg),
            AlgebraNode::EmptySet | AlgebraNode::SingletonSet => BTreeSet::new(),
            AlgebraNode::ExternalSet { bindings, .. } => bindings.clone(),
        }
    }

    /// Compares two subtrees by shape and content, ignoring arena ids
    pub fn structurally_eq(&self, a: NodeId, other: &AlgebraTree, b: NodeId) -> bool {
        let (na, nb) = (self.node(a), other.node(b));
        let (ka, kb) = (na.children(), nb.children());
        ka.len() == kb.len()
            && na.without_children() == nb.without_children()
            && ka
                .iter()
                .zip(&kb)
                .all(|(x, y)| self.structurally_eq(*x, other, *y))
    }

    // ------------------------------------------------------------------
    // Formatting
    // ------------------------------------------------------------------

    /// Formats a subtree using an S-Expression syntax
    pub fn fmt_sse(&self, id: NodeId, f: &mut impl fmt::Write) -> fmt::Result {
        let node = self.node(id);
        match node {
            AlgebraNode::StatementPattern(sp) => return sp.fmt_sse(f),
            AlgebraNode::EmptySet | AlgebraNode::SingletonSet => {
                return write!(f, "({})", node.kind())
            }
            AlgebraNode::ExternalSet { name, bindings } => {
                write!(f, "(external {name}")?;
                for b in bindings {
                    write!(f, " ?{b}")?;
                }
                return f.write_str(")");
            }
            AlgebraNode::Projection { elements, .. } => {
                f.write_str("(project (")?;
                for (i, e) in elements.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" ")?;
                    }
                    if e.is_rename() {
                        write!(f, "?{}->?{}", e.source, e.target)?;
                    } else {
                        write!(f, "?{}", e.source)?;
                    }
                }
                f.write_str(")")?;
            }
            AlgebraNode::Selection { condition, .. } => {
                f.write_str("(filter ")?;
                condition.fmt_sse(f)?;
            }
            AlgebraNode::RowSelection { offset, limit, .. } => {
                let fmt_opt = |v: &Option<u64>| v.map_or("_".to_string(), |n| n.to_string());
                write!(f, "(slice {} {}", fmt_opt(offset), fmt_opt(limit))?;
            }
            AlgebraNode::OwnedTupleExpr(owned) => {
                write!(f, "(owned {}", owned.owner)?;
                if owned.prepared {
                    f.write_str(" prepared")?;
                }
            }
            _ => write!(f, "({}", node.kind())?,
        }
        for child in node.children() {
            f.write_str(" ")?;
            self.fmt_sse(child, f)?;
        }
        if let AlgebraNode::LeftJoin {
            condition: Some(condition),
            ..
        } = node
        {
            f.write_str(" ")?;
            condition.fmt_sse(f)?;
        }
        f.write_str(")")
    }

    pub fn to_sse(&self, id: NodeId) -> String {
        let mut out = String::new();
        // writing into a String cannot fail
        let _ = self.fmt_sse(id, &mut out);
        out
    }
}

impl PartialEq for AlgebraTree {
    fn eq(&self, other: &Self) -> bool {
        match (self.root, other.root) {
            (Some(a), Some(b)) => self.structurally_eq(a, other, b),
            (None, None) => true,
            _ => false,
        }
    }
}

impl fmt::Display for AlgebraTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.root {
            Some(root) => self.fmt_sse(root, f),
            None => f.write_str("(no-root)"),
        }
    }
}
