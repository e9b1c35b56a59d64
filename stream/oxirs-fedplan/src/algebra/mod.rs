//! Query Algebra Module
//!
//! This module provides the algebraic representation of federated query plans:
//! statement patterns, relational operators, ownership markers, and the
//! post-order rewriting driver the planning passes are built on.

pub mod expression;
pub mod rewrite;
pub mod term;
pub mod tree;

pub use expression::{BinaryOperator, Expression};
pub use rewrite::TreeRewriter;
pub use term::{Iri, Literal, Term, Var, XSD_BOOLEAN};
pub use tree::{
    AlgebraNode, AlgebraTree, ContextScope, NodeId, OwnedTupleExpr, ProjectionElem, RemoteQuery,
    StatementPattern,
};
