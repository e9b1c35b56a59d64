//! Tree Pruning
//!
//! Three bottom-up passes, each idempotent:
//!
//! 1. empty-pattern elimination replaces patterns no member can match by
//!    the empty set;
//! 2. algebraic simplification folds empty and singleton sets through the
//!    operators above them;
//! 3. marker collapse strips ownership markers nested inside another
//!    marker; the outermost one wins.

use crate::algebra::{AlgebraNode, AlgebraTree, NodeId, TreeRewriter};
use crate::error::Result;
use crate::ownership::OwnershipAnalyzer;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Counters of one pruning run
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PruneStats {
    pub patterns_eliminated: usize,
    pub simplifications: usize,
    pub markers_collapsed: usize,
}

/// Runs the pruning passes and accumulates their counters
#[derive(Debug, Default)]
pub struct TreePruner {
    stats: PruneStats,
}

impl TreePruner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self) -> PruneStats {
        self.stats
    }

    /// Replaces every statement pattern that no member matches by the empty
    /// set
    pub fn eliminate_empty_patterns(
        &mut self,
        tree: &mut AlgebraTree,
        analyzer: &mut OwnershipAnalyzer<'_>,
    ) -> Result<usize> {
        let mut pass = EmptyPatternEliminator {
            analyzer,
            eliminated: 0,
        };
        tree.rewrite_root(&mut pass)?;
        self.stats.patterns_eliminated += pass.eliminated;
        debug!("Eliminated {} empty patterns", pass.eliminated);
        Ok(pass.eliminated)
    }

    /// Folds empty and singleton sets; see [`simplify_node`]
    pub fn simplify(&mut self, tree: &mut AlgebraTree) -> Result<usize> {
        let mut pass = Simplifier { applied: 0 };
        tree.rewrite_root(&mut pass)?;
        self.stats.simplifications += pass.applied;
        debug!("Applied {} simplifications", pass.applied);
        Ok(pass.applied)
    }

    /// Strips markers nested inside another marker
    pub fn collapse_owned_markers(&mut self, tree: &mut AlgebraTree) -> Result<usize> {
        let mut pass = MarkerCollapser { collapsed: 0 };
        tree.rewrite_root(&mut pass)?;
        self.stats.markers_collapsed += pass.collapsed;
        debug!("Collapsed {} nested markers", pass.collapsed);
        Ok(pass.collapsed)
    }

    /// Runs all three passes in order
    pub fn prune(
        &mut self,
        tree: &mut AlgebraTree,
        analyzer: &mut OwnershipAnalyzer<'_>,
    ) -> Result<PruneStats> {
        let before = self.stats;
        self.eliminate_empty_patterns(tree, analyzer)?;
        self.simplify(tree)?;
        self.collapse_owned_markers(tree)?;
        Ok(PruneStats {
            patterns_eliminated: self.stats.patterns_eliminated - before.patterns_eliminated,
            simplifications: self.stats.simplifications - before.simplifications,
            markers_collapsed: self.stats.markers_collapsed - before.markers_collapsed,
        })
    }
}

struct EmptyPatternEliminator<'r, 'a> {
    analyzer: &'r mut OwnershipAnalyzer<'a>,
    eliminated: usize,
}

impl TreeRewriter for EmptyPatternEliminator<'_, '_> {
    fn rewrite(&mut self, tree: &mut AlgebraTree, id: NodeId) -> Result<NodeId> {
        let AlgebraNode::StatementPattern(sp) = tree.node(id) else {
            return Ok(id);
        };
        if self.analyzer.matching_members(sp)?.is_empty() {
            self.eliminated += 1;
            return Ok(tree.empty_set());
        }
        Ok(id)
    }
}

struct Simplifier {
    applied: usize,
}

impl TreeRewriter for Simplifier {
    fn rewrite(&mut self, tree: &mut AlgebraTree, id: NodeId) -> Result<NodeId> {
        let simplified = simplify_node(tree, id);
        if simplified != id {
            self.applied += 1;
        }
        Ok(simplified)
    }
}

/// Applies the identity laws at one node whose children are already
/// simplified:
///
/// - NaryJoin: drop singleton args; any empty arg ⇒ empty; one arg ⇒ it;
///   none ⇒ singleton
/// - Join: either arg empty ⇒ empty; singleton arg ⇒ the other
/// - LeftJoin: left empty, right empty or right singleton ⇒ left;
///   constant-true condition dropped; constant-false ⇒ left
/// - Union: either arg empty ⇒ the other; both singleton ⇒ singleton
/// - Difference: left empty ⇒ empty; right empty ⇒ left; both singleton ⇒
///   empty
/// - Intersection: either arg empty ⇒ empty
/// - Owned: over empty or singleton ⇒ that set
///
/// Dropping a constant-true condition keeps the node id; every other rule
/// returns a different node.
pub fn simplify_node(tree: &mut AlgebraTree, id: NodeId) -> NodeId {
    let empty = |tree: &AlgebraTree, id: NodeId| tree.node(id).is_empty_set();
    let single = |tree: &AlgebraTree, id: NodeId| tree.node(id).is_singleton_set();

    match tree.node(id) {
        AlgebraNode::NaryJoin { args } => {
            let args = args.clone();
            if args.iter().any(|&arg| empty(tree, arg)) {
                return tree.empty_set();
            }
            let kept: Vec<NodeId> = args
                .iter()
                .copied()
                .filter(|&arg| !single(tree, arg))
                .collect();
            match kept.len() {
                0 => tree.singleton_set(),
                1 => kept[0],
                n if n == args.len() => id,
                _ => tree.nary_join(kept),
            }
        }
        &AlgebraNode::Join { left, right } => {
            if empty(tree, left) || empty(tree, right) {
                tree.empty_set()
            } else if single(tree, left) {
                right
            } else if single(tree, right) {
                left
            } else {
                id
            }
        }
        AlgebraNode::LeftJoin {
            left,
            right,
            condition,
        } => {
            let (left, right) = (*left, *right);
            let constant = condition.as_ref().map(|c| c.as_boolean_constant());
            if empty(tree, left) || empty(tree, right) || single(tree, right) {
                return left;
            }
            match constant {
                Some(Some(false)) => left,
                Some(Some(true)) => {
                    if let AlgebraNode::LeftJoin { condition, .. } = tree.node_mut(id) {
                        *condition = None;
                    }
                    id
                }
                _ => id,
            }
        }
        &AlgebraNode::Union { left, right } => {
            if empty(tree, left) {
                right
            } else if empty(tree, right) || (single(tree, left) && single(tree, right)) {
                left
            } else {
                id
            }
        }
        &AlgebraNode::Difference { left, right } => {
            if empty(tree, left) || empty(tree, right) {
                left
            } else if single(tree, left) && single(tree, right) {
                tree.empty_set()
            } else {
                id
            }
        }
        &AlgebraNode::Intersection { left, right } => {
            if empty(tree, left) {
                left
            } else if empty(tree, right) {
                right
            } else {
                id
            }
        }
        AlgebraNode::OwnedTupleExpr(owned) => {
            if empty(tree, owned.arg) || single(tree, owned.arg) {
                owned.arg
            } else {
                id
            }
        }
        _ => id,
    }
}

/// Visits markers top-down: descent stops at a marker, which then strips
/// every marker below it
struct MarkerCollapser {
    collapsed: usize,
}

impl MarkerCollapser {
    fn strip(&mut self, tree: &mut AlgebraTree, id: NodeId) -> NodeId {
        if let Some(owned) = tree.node(id).as_owned() {
            let arg = owned.arg;
            self.collapsed += 1;
            return self.strip(tree, arg);
        }
        for (index, child) in tree.children(id).into_iter().enumerate() {
            let stripped = self.strip(tree, child);
            if stripped != child {
                tree.replace_child_at(id, index, stripped);
            }
        }
        id
    }
}

impl TreeRewriter for MarkerCollapser {
    fn descend_into(&mut self, tree: &AlgebraTree, id: NodeId) -> bool {
        tree.node(id).as_owned().is_none()
    }

    fn rewrite(&mut self, tree: &mut AlgebraTree, id: NodeId) -> Result<NodeId> {
        if let Some(owned) = tree.node(id).as_owned() {
            let arg = owned.arg;
            let stripped = self.strip(tree, arg);
            if stripped != arg {
                tree.replace_child_at(id, 0, stripped);
            }
        }
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algebra::{Expression, StatementPattern, Term, Var};
    use crate::member::{Member, MemberId, MemoryMember, Quad};
    use std::collections::HashSet;
    use std::sync::Arc;

    fn constant(value: &str) -> Var {
        Var::constant(Term::iri(format!("http://ex.org/{value}")))
    }

    fn pattern(tree: &mut AlgebraTree, s: Var, p: &str, o: Var) -> NodeId {
        tree.pattern(StatementPattern::new(s, constant(p), o))
    }

    fn simplified(mut tree: AlgebraTree) -> String {
        TreePruner::new().simplify(&mut tree).unwrap();
        tree.to_string()
    }

    #[test]
    fn test_join_rules() {
        let mut tree = AlgebraTree::new();
        let a = pattern(&mut tree, Var::new("s"), "p", Var::new("o"));
        let e = tree.empty_set();
        let j = tree.join(a, e);
        tree.set_root(j);
        assert_eq!(simplified(tree), "(empty)");

        let mut tree = AlgebraTree::new();
        let one = tree.singleton_set();
        let a = pattern(&mut tree, Var::new("s"), "p", Var::new("o"));
        let j = tree.join(one, a);
        tree.set_root(j);
        assert_eq!(simplified(tree), "(pattern ?s <http://ex.org/p> ?o)");
    }

    #[test]
    fn test_nary_join_rules() {
        let mut tree = AlgebraTree::new();
        let a = pattern(&mut tree, Var::new("s"), "p", Var::new("o"));
        let b = pattern(&mut tree, Var::new("s"), "q", Var::new("x"));
        let one = tree.singleton_set();
        let j = tree.nary_join(vec![a, one, b]);
        tree.set_root(j);
        assert_eq!(
            simplified(tree),
            "(multijoin (pattern ?s <http://ex.org/p> ?o) (pattern ?s <http://ex.org/q> ?x))"
        );

        let mut tree = AlgebraTree::new();
        let ones: Vec<_> = (0..3).map(|_| tree.singleton_set()).collect();
        let j = tree.nary_join(ones);
        tree.set_root(j);
        assert_eq!(simplified(tree), "(singleton)");
    }

    #[test]
    fn test_left_join_conditions() {
        let mut tree = AlgebraTree::new();
        let a = pattern(&mut tree, Var::new("s"), "p", Var::new("o"));
        let b = pattern(&mut tree, Var::new("s"), "q", Var::new("x"));
        let lj = tree.left_join(a, b, Some(Expression::not(Expression::boolean(false))));
        tree.set_root(lj);
        assert_eq!(
            simplified(tree),
            "(leftjoin (pattern ?s <http://ex.org/p> ?o) (pattern ?s <http://ex.org/q> ?x))"
        );

        let mut tree = AlgebraTree::new();
        let a = pattern(&mut tree, Var::new("s"), "p", Var::new("o"));
        let b = pattern(&mut tree, Var::new("s"), "q", Var::new("x"));
        let lj = tree.left_join(a, b, Some(Expression::boolean(false)));
        tree.set_root(lj);
        assert_eq!(simplified(tree), "(pattern ?s <http://ex.org/p> ?o)");

        let mut tree = AlgebraTree::new();
        let a = pattern(&mut tree, Var::new("s"), "p", Var::new("o"));
        let e = tree.empty_set();
        let lj = tree.left_join(a, e, Some(Expression::bound("x")));
        tree.set_root(lj);
        assert_eq!(simplified(tree), "(pattern ?s <http://ex.org/p> ?o)");
    }

    #[test]
    fn test_set_operator_rules() {
        let mut tree = AlgebraTree::new();
        let (s1, s2) = (tree.singleton_set(), tree.singleton_set());
        let u = tree.union(s1, s2);
        tree.set_root(u);
        assert_eq!(simplified(tree), "(singleton)");

        let mut tree = AlgebraTree::new();
        let (s1, s2) = (tree.singleton_set(), tree.singleton_set());
        let d = tree.difference(s1, s2);
        tree.set_root(d);
        assert_eq!(simplified(tree), "(empty)");

        let mut tree = AlgebraTree::new();
        let a = pattern(&mut tree, Var::new("s"), "p", Var::new("o"));
        let e = tree.empty_set();
        let d = tree.difference(a, e);
        let e2 = tree.empty_set();
        let u = tree.union(e2, d);
        tree.set_root(u);
        assert_eq!(simplified(tree), "(pattern ?s <http://ex.org/p> ?o)");

        let mut tree = AlgebraTree::new();
        let a = pattern(&mut tree, Var::new("s"), "p", Var::new("o"));
        let e = tree.empty_set();
        let i = tree.intersection(a, e);
        tree.set_root(i);
        assert_eq!(simplified(tree), "(empty)");
    }

    #[test]
    fn test_emptiness_propagates_upwards() {
        let mut tree = AlgebraTree::new();
        let a = pattern(&mut tree, Var::new("s"), "p", Var::new("o"));
        let e = tree.empty_set();
        let inner = tree.join(a, e);
        let b = pattern(&mut tree, Var::new("s"), "q", Var::new("x"));
        let outer = tree.nary_join(vec![b, inner]);
        let filter = tree.selection(outer, Expression::bound("x"));
        tree.set_root(filter);
        assert_eq!(simplified(tree), "(filter (bound ?x) (empty))");
    }

    #[test]
    fn test_marker_collapse_outermost_wins() {
        let mut tree = AlgebraTree::new();
        let x = pattern(&mut tree, Var::new("s"), "p", Var::new("o"));
        let inner = tree.owned(MemberId::new("m2"), x);
        let y = pattern(&mut tree, Var::new("s"), "q", Var::new("v"));
        let deep = tree.owned(MemberId::new("m3"), y);
        let join = tree.join(inner, deep);
        let outer = tree.owned(MemberId::new("m1"), join);
        tree.set_root(outer);

        let mut pruner = TreePruner::new();
        assert_eq!(pruner.collapse_owned_markers(&mut tree).unwrap(), 2);
        assert_eq!(
            tree.to_string(),
            "(owned m1 (join (pattern ?s <http://ex.org/p> ?o) (pattern ?s <http://ex.org/q> ?v)))"
        );
        assert_eq!(pruner.collapse_owned_markers(&mut tree).unwrap(), 0);
    }

    #[test]
    fn test_owned_identity_sets() {
        let mut tree = AlgebraTree::new();
        let e = tree.empty_set();
        let owned = tree.owned(MemberId::new("a"), e);
        let a = pattern(&mut tree, Var::new("s"), "p", Var::new("o"));
        let u = tree.union(a, owned);
        tree.set_root(u);
        assert_eq!(simplified(tree), "(pattern ?s <http://ex.org/p> ?o)");
    }

    #[test]
    fn test_prune_eliminates_and_is_idempotent() {
        let members: Vec<Arc<dyn Member>> = vec![Arc::new(MemoryMember::new("a").with_quads([
            Quad::triple(
                Term::iri("http://ex.org/s1"),
                Term::iri("http://ex.org/p"),
                Term::iri("http://ex.org/o1"),
            ),
        ]))];
        let local = HashSet::new();
        let mut analyzer = OwnershipAnalyzer::new(&members, &local);

        let mut tree = AlgebraTree::new();
        let hit = pattern(&mut tree, Var::new("s"), "p", Var::new("o"));
        let miss = pattern(&mut tree, Var::new("s"), "missing", Var::new("x"));
        let join = tree.join(hit, miss);
        let other = pattern(&mut tree, Var::new("s"), "p", Var::new("y"));
        let union = tree.union(join, other);
        tree.set_root(union);

        let mut pruner = TreePruner::new();
        let stats = pruner.prune(&mut tree, &mut analyzer).unwrap();
        assert_eq!(stats.patterns_eliminated, 1);
        assert_eq!(stats.simplifications, 2);
        assert_eq!(tree.to_string(), "(pattern ?s <http://ex.org/p> ?y)");

        let once = tree.clone();
        let again = pruner.prune(&mut tree, &mut analyzer).unwrap();
        assert_eq!(again, PruneStats::default());
        assert_eq!(tree, once);
        assert_eq!(pruner.stats().patterns_eliminated, 1);
    }
}
