//! Cardinality Estimation
//!
//! Relative cost of a plan subtree, used to compare plan shapes and to order
//! joins. The model is a selectivity heuristic, not sampled statistics:
//!
//! - a statement pattern with `n` slots of which `c` are bound costs
//!   `1000^((n - c) / n)`;
//! - joins multiply (nested-loop model), unions and set operators add.
//!
//! Joins are not discounted for variables shared between their children.
//! Downstream join ordering depends on these exact numbers.

use crate::algebra::{AlgebraNode, AlgebraTree, NodeId, StatementPattern};
use std::collections::HashMap;

/// Cardinality of a pattern with every slot unbound
pub const UNBOUND_PATTERN_CARDINALITY: f64 = 1000.0;

/// Per-call memoizing estimator
#[derive(Debug)]
pub struct CardinalityEstimator<'a> {
    tree: &'a AlgebraTree,
    memo: HashMap<NodeId, f64>,
}

impl<'a> CardinalityEstimator<'a> {
    pub fn new(tree: &'a AlgebraTree) -> Self {
        Self {
            tree,
            memo: HashMap::new(),
        }
    }

    pub fn estimate(&mut self, id: NodeId) -> f64 {
        if let Some(&cached) = self.memo.get(&id) {
            return cached;
        }
        let estimate = match self.tree.node(id) {
            AlgebraNode::EmptySet => 0.0,
            AlgebraNode::SingletonSet => 1.0,
            AlgebraNode::StatementPattern(sp) => pattern_cardinality(sp),
            AlgebraNode::Join { left, right } | AlgebraNode::LeftJoin { left, right, .. } => {
                self.estimate(*left) * self.estimate(*right)
            }
            AlgebraNode::NaryJoin { args } => {
                args.iter().map(|arg| self.estimate(*arg)).product()
            }
            AlgebraNode::Union { left, right }
            | AlgebraNode::Difference { left, right }
            | AlgebraNode::Intersection { left, right } => {
                self.estimate(*left) + self.estimate(*right)
            }
            AlgebraNode::RowSelection { arg, limit, .. } => {
                let inner = self.estimate(*arg);
                match limit {
                    Some(limit) => inner.min(*limit as f64),
                    None => inner,
                }
            }
            AlgebraNode::Projection { arg, .. } | AlgebraNode::Selection { arg, .. } => {
                self.estimate(*arg)
            }
            AlgebraNode::OwnedTupleExpr(owned) => self.estimate(owned.arg),
            AlgebraNode::ExternalSet { .. } => UNBOUND_PATTERN_CARDINALITY,
        };
        self.memo.insert(id, estimate);
        estimate
    }
}

/// `1000^((n - c) / n)` for `n` present slots of which `c` are bound
pub fn pattern_cardinality(pattern: &StatementPattern) -> f64 {
    let slots = pattern.slots().count();
    let bound = pattern.slots().filter(|v| v.is_bound()).count();
    let unbound_ratio = (slots - bound) as f64 / slots as f64;
    UNBOUND_PATTERN_CARDINALITY.powf(unbound_ratio)
}

/// Estimates the cardinality of a subtree
pub fn cardinality(tree: &AlgebraTree, id: NodeId) -> f64 {
    CardinalityEstimator::new(tree).estimate(id)
}
