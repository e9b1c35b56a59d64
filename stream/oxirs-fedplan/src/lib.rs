//! # OxiRS FedPlan
//!
//! Federated query planning core.
//!
//! Given a query algebra tree and the members of a federation, the optimizer
//! works out which subtrees a single member can answer on its own, marks them
//! with ownership markers, prunes what cannot match anywhere and flags the
//! markers that can be pushed down as one remote query.
//!
//! ```no_run
//! use oxirs_fedplan::{
//!     AlgebraTree, FederationOptimizer, Member, MemoryMember, OptimizerConfig,
//!     StatementPattern, Term, Var,
//! };
//! use std::sync::Arc;
//!
//! let members: Vec<Arc<dyn Member>> = vec![
//!     Arc::new(MemoryMember::new("a")),
//!     Arc::new(MemoryMember::new("b")),
//! ];
//! let mut tree = AlgebraTree::new();
//! let name = Var::constant(Term::iri("http://xmlns.com/foaf/0.1/name"));
//! let root = tree.pattern(StatementPattern::new(Var::new("s"), name, Var::new("n")));
//! tree.set_root(root);
//!
//! let config = OptimizerConfig::default().with_local_namespaces(["http://xmlns.com/foaf/0.1/"]);
//! let report = FederationOptimizer::new(config).optimize(&mut tree, &members)?;
//! println!("{tree}\n{}", report.to_json()?);
//! # Ok::<(), oxirs_fedplan::FederationError>(())
//! ```

pub mod algebra;
pub mod cardinality;
pub mod config;
pub mod error;
pub mod member;
pub mod ownership;
pub mod preparer;
pub mod pruner;
pub mod rewriter;
pub mod sparql;

pub use algebra::*;
pub use cardinality::{cardinality, CardinalityEstimator};
pub use config::OptimizerConfig;
pub use error::{FederationError, Result};
pub use member::{
    Member, MemberId, MemoryMember, ProtocolMetadata, ProtocolVersion, Quad, QueryLanguage,
};
pub use ownership::OwnershipAnalyzer;
pub use preparer::{PlanPreparer, PrepareStats};
pub use pruner::{PruneStats, TreePruner};
pub use rewriter::{FederationRewriter, RewriteStats};
pub use sparql::SparqlRenderer;

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info};

/// Summary of one optimize call
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OptimizeReport {
    pub patterns_eliminated: usize,
    pub simplifications: usize,
    pub markers_created: usize,
    pub markers_collapsed: usize,
    pub markers_prepared: usize,
    pub remote_queries: usize,
    pub replicated: usize,
    pub pushed_down: usize,
    pub probes_issued: usize,
    pub cardinality_before: f64,
    pub cardinality_after: f64,
}

impl OptimizeReport {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Federated query optimizer
#[derive(Debug, Clone, Default)]
pub struct FederationOptimizer {
    config: OptimizerConfig,
}

impl FederationOptimizer {
    pub fn new(config: OptimizerConfig) -> Self {
        Self { config }
    }

    pub fn with_defaults() -> Self {
        Self::default()
    }

    pub fn config(&self) -> &OptimizerConfig {
        &self.config
    }

    /// Rewrites `tree` in place for evaluation over `members`.
    ///
    /// On error the tree is left half-rewritten and must be discarded.
    pub fn optimize(
        &self,
        tree: &mut AlgebraTree,
        members: &[Arc<dyn Member>],
    ) -> Result<OptimizeReport> {
        if !tree.has_root() {
            return Ok(OptimizeReport::default());
        }
        let cardinality_before = cardinality(tree, tree.root());
        debug!(
            "Optimizing plan of {} nodes over {} members",
            tree.len(),
            members.len()
        );

        let mut analyzer = OwnershipAnalyzer::new(members, &self.config.local_namespaces)
            .with_parallel_probes(self.config.parallel_probes);
        let mut pruner = TreePruner::new();

        if self.config.eliminate_empty_patterns && !members.is_empty() {
            pruner.eliminate_empty_patterns(tree, &mut analyzer)?;
        }
        pruner.simplify(tree)?;

        let rewrite = FederationRewriter::new(&mut analyzer)
            .with_unary_push_down(self.config.push_unary_into_owner)
            .run(tree)?;

        pruner.simplify(tree)?;
        pruner.collapse_owned_markers(tree)?;

        let prepare = PlanPreparer::new(members, self.config.protocol)
            .with_remote_queries(self.config.render_remote_queries)
            .prepare(tree);
        tree.compact();

        let pruned = pruner.stats();
        let report = OptimizeReport {
            patterns_eliminated: pruned.patterns_eliminated,
            simplifications: pruned.simplifications,
            markers_created: rewrite.markers_created,
            markers_collapsed: pruned.markers_collapsed,
            markers_prepared: prepare.prepared,
            remote_queries: prepare.remote_queries,
            replicated: rewrite.replicated,
            pushed_down: rewrite.pushed_down,
            probes_issued: analyzer.probes_issued(),
            cardinality_before,
            cardinality_after: cardinality(tree, tree.root()),
        };
        info!(
            "Optimized federated plan: {} markers ({} prepared), {} probes, \
             cardinality {:.1} -> {:.1}",
            prepare.markers,
            report.markers_prepared,
            report.probes_issued,
            report.cardinality_before,
            report.cardinality_after
        );
        Ok(report)
    }
}

/// Optimizes `tree` for `members` with the default configuration and the
/// given local namespaces
pub fn optimize(
    tree: &mut AlgebraTree,
    members: &[Arc<dyn Member>],
    local_namespaces: &HashSet<String>,
) -> Result<()> {
    let config = OptimizerConfig::default().with_local_namespaces(local_namespaces.iter().cloned());
    FederationOptimizer::new(config).optimize(tree, members)?;
    Ok(())
}
