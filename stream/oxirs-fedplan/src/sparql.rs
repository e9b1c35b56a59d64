//! SPARQL rendering of delegated subtrees
//!
//! Turns the argument of a prepared ownership marker into one SPARQL
//! `SELECT` query the owning member can evaluate as a whole. Every operator
//! argument is rendered as its own group (`{ ... }`) so that filter scope
//! follows the tree.

use crate::algebra::{
    AlgebraNode, AlgebraTree, BinaryOperator, ContextScope, Expression, NodeId, Term, Var,
};
use std::fmt::Write;

/// Rendering failures
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    /// The subtree contains an operator without a SPARQL form
    #[error("{0} has no SPARQL form")]
    Unsupported(&'static str),

    #[error(transparent)]
    Fmt(#[from] std::fmt::Error),
}

/// A rendered query and the bindings it selects
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectQuery {
    pub text: String,
    pub bindings: Vec<String>,
}

/// SPARQL writer for algebra subtrees
#[derive(Debug, Default)]
pub struct SparqlRenderer {
    graph_vars: usize,
}

impl SparqlRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// `SELECT` over the sorted binding names of `id`
    pub fn render_select(
        &mut self,
        tree: &AlgebraTree,
        id: NodeId,
    ) -> Result<SelectQuery, RenderError> {
        self.graph_vars = 0;
        let bindings: Vec<String> = tree.binding_names(id).into_iter().collect();
        let mut text = String::from("SELECT");
        if bindings.is_empty() {
            text.push_str(" *");
        }
        for name in &bindings {
            write!(text, " ?{name}")?;
        }
        text.push_str(" WHERE { ");
        self.write_group(tree, id, &mut text)?;
        text.push_str(" }");
        Ok(SelectQuery { text, bindings })
    }

    /// Writes the body of a group graph pattern
    fn write_group(
        &mut self,
        tree: &AlgebraTree,
        id: NodeId,
        out: &mut String,
    ) -> Result<(), RenderError> {
        match tree.node(id) {
            AlgebraNode::StatementPattern(sp) => {
                let graph = match (&sp.context, sp.scope) {
                    (Some(ctx), _) => Some(term(ctx)?),
                    (None, ContextScope::NamedContexts) => {
                        self.graph_vars += 1;
                        Some(format!("?_graph{}", self.graph_vars))
                    }
                    (None, _) => None,
                };
                let triple = format!(
                    "{} {} {} .",
                    term(&sp.subject)?,
                    term(&sp.predicate)?,
                    term(&sp.object)?
                );
                match graph {
                    Some(graph) => write!(out, "GRAPH {graph} {{ {triple} }}")?,
                    None => out.push_str(&triple),
                }
            }
            AlgebraNode::Join { .. } | AlgebraNode::NaryJoin { .. } => {
                for (index, child) in tree.children(id).into_iter().enumerate() {
                    if index > 0 {
                        out.push(' ');
                    }
                    self.write_braced(tree, child, out)?;
                }
            }
            AlgebraNode::LeftJoin {
                left,
                right,
                condition,
            } => {
                self.write_braced(tree, *left, out)?;
                out.push_str(" OPTIONAL { ");
                self.write_braced(tree, *right, out)?;
                if let Some(condition) = condition {
                    out.push_str(" FILTER(");
                    write_expression(condition, out)?;
                    out.push(')');
                }
                out.push_str(" }");
            }
            AlgebraNode::Union { left, right } => {
                self.write_braced(tree, *left, out)?;
                out.push_str(" UNION ");
                self.write_braced(tree, *right, out)?;
            }
            AlgebraNode::Difference { left, right } => {
                self.write_braced(tree, *left, out)?;
                out.push_str(" MINUS ");
                self.write_braced(tree, *right, out)?;
            }
            AlgebraNode::Intersection { .. } => {
                return Err(RenderError::Unsupported("intersection"))
            }
            AlgebraNode::Selection { arg, condition } => {
                self.write_braced(tree, *arg, out)?;
                out.push_str(" FILTER(");
                write_expression(condition, out)?;
                out.push(')');
            }
            AlgebraNode::Projection { arg, elements } => {
                if elements.is_empty() {
                    return Err(RenderError::Unsupported("empty projection"));
                }
                out.push_str("{ SELECT");
                for e in elements {
                    if e.is_rename() {
                        write!(out, " (?{} AS ?{})", e.source, e.target)?;
                    } else {
                        write!(out, " ?{}", e.source)?;
                    }
                }
                out.push_str(" WHERE ");
                self.write_braced(tree, *arg, out)?;
                out.push_str(" }");
            }
            AlgebraNode::RowSelection { arg, offset, limit } => {
                out.push_str("{ SELECT * WHERE ");
                self.write_braced(tree, *arg, out)?;
                if let Some(limit) = limit {
                    write!(out, " LIMIT {limit}")?;
                }
                if let Some(offset) = offset {
                    write!(out, " OFFSET {offset}")?;
                }
                out.push_str(" }");
            }
            AlgebraNode::SingletonSet => {}
            AlgebraNode::EmptySet => out.push_str("VALUES () {}"),
            AlgebraNode::OwnedTupleExpr(owned) => self.write_group(tree, owned.arg, out)?,
            AlgebraNode::ExternalSet { .. } => return Err(RenderError::Unsupported("external set")),
        }
        Ok(())
    }

    fn write_braced(
        &mut self,
        tree: &AlgebraTree,
        id: NodeId,
        out: &mut String,
    ) -> Result<(), RenderError> {
        out.push_str("{ ");
        self.write_group(tree, id, out)?;
        out.push_str(" }");
        Ok(())
    }
}

fn term(var: &Var) -> Result<String, RenderError> {
    match var.value() {
        Some(value) => constant(value),
        None => Ok(format!("?{}", var.name())),
    }
}

/// A blank node in query text is a variable scoped to one group, not a
/// constant
fn constant(value: &Term) -> Result<String, RenderError> {
    match value {
        Term::BlankNode(_) => Err(RenderError::Unsupported("blank node constant")),
        _ => Ok(value.to_string()),
    }
}

/// Writes an expression in SPARQL syntax
pub fn write_expression(expr: &Expression, out: &mut String) -> Result<(), RenderError> {
    match expr {
        Expression::Constant(term) => out.push_str(&constant(term)?),
        Expression::Variable(name) => write!(out, "?{name}")?,
        Expression::Bound(name) => write!(out, "BOUND(?{name})")?,
        Expression::Binary {
            op: BinaryOperator::SameTerm,
            left,
            right,
        } => {
            out.push_str("sameTerm(");
            write_expression(left, out)?;
            out.push_str(", ");
            write_expression(right, out)?;
            out.push(')');
        }
        Expression::Binary { op, left, right } => {
            out.push('(');
            write_expression(left, out)?;
            write!(out, " {} ", op.symbol())?;
            write_expression(right, out)?;
            out.push(')');
        }
        Expression::Not(inner) => {
            out.push_str("!(");
            write_expression(inner, out)?;
            out.push(')');
        }
        Expression::Function { name, args } => {
            if name.contains(':') {
                write!(out, "<{name}>(")?;
            } else {
                write!(out, "{name}(")?;
            }
            for (index, arg) in args.iter().enumerate() {
                if index > 0 {
                    out.push_str(", ");
                }
                write_expression(arg, out)?;
            }
            out.push(')');
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algebra::{ProjectionElem, StatementPattern};

    fn foaf(local: &str) -> Var {
        Var::constant(Term::iri(format!("http://xmlns.com/foaf/0.1/{local}")))
    }

    #[test]
    fn test_star_query() {
        let mut tree = AlgebraTree::new();
        let name = tree.pattern(StatementPattern::new(Var::new("s"), foaf("name"), Var::new("n")));
        let mbox = tree.pattern(StatementPattern::new(Var::new("s"), foaf("mbox"), Var::new("m")));
        let join = tree.join(name, mbox);
        let filter = tree.selection(join, Expression::bound("m"));

        let query = SparqlRenderer::new().render_select(&tree, filter).unwrap();
        assert_eq!(query.bindings, vec!["m", "n", "s"]);
        assert_eq!(
            query.text,
            "SELECT ?m ?n ?s WHERE { { { ?s <http://xmlns.com/foaf/0.1/name> ?n . } \
             { ?s <http://xmlns.com/foaf/0.1/mbox> ?m . } } FILTER(BOUND(?m)) }"
        );
    }

    #[test]
    fn test_optional_union_and_graph() {
        let mut tree = AlgebraTree::new();
        let name = tree.pattern(
            StatementPattern::new(Var::new("s"), foaf("name"), Var::new("n"))
                .in_context(Var::new("g")),
        );
        let nick = tree.pattern(StatementPattern::new(Var::new("s"), foaf("nick"), Var::new("k")));
        let lj = tree.left_join(
            name,
            nick,
            Some(Expression::equal(
                Expression::variable("k"),
                Expression::Constant(Term::literal("bob")),
            )),
        );
        let query = SparqlRenderer::new().render_select(&tree, lj).unwrap();
        assert_eq!(
            query.text,
            "SELECT ?g ?k ?n ?s WHERE { { GRAPH ?g { ?s <http://xmlns.com/foaf/0.1/name> ?n . } } \
             OPTIONAL { { ?s <http://xmlns.com/foaf/0.1/nick> ?k . } FILTER((?k = \"bob\")) } }"
        );

        let named = tree.pattern(
            StatementPattern::new(Var::new("s"), foaf("name"), Var::new("n"))
                .with_scope(ContextScope::NamedContexts),
        );
        let nick2 = tree.pattern(StatementPattern::new(Var::new("s"), foaf("nick"), Var::new("k")));
        let u = tree.union(named, nick2);
        let query = SparqlRenderer::new().render_select(&tree, u).unwrap();
        assert!(query.text.contains("{ GRAPH ?_graph1 { ?s"));
        assert!(query.text.contains(" UNION "));
    }

    #[test]
    fn test_subselects() {
        let mut tree = AlgebraTree::new();
        let name = tree.pattern(StatementPattern::new(Var::new("s"), foaf("name"), Var::new("n")));
        let proj = tree.projection(
            name,
            vec![ProjectionElem::keep("s"), ProjectionElem::new("n", "label")],
        );
        let slice = tree.row_selection(proj, Some(5), Some(10));

        let query = SparqlRenderer::new().render_select(&tree, slice).unwrap();
        assert_eq!(
            query.text,
            "SELECT ?label ?s WHERE { { SELECT * WHERE { { SELECT ?s (?n AS ?label) WHERE \
             { ?s <http://xmlns.com/foaf/0.1/name> ?n . } } } LIMIT 10 OFFSET 5 } }"
        );
    }

    #[test]
    fn test_unsupported_operators() {
        let mut tree = AlgebraTree::new();
        let a = tree.pattern(StatementPattern::new(Var::new("s"), foaf("name"), Var::new("n")));
        let b = tree.pattern(StatementPattern::new(Var::new("s"), foaf("nick"), Var::new("n")));
        let i = tree.intersection(a, b);
        let err = SparqlRenderer::new().render_select(&tree, i).unwrap_err();
        assert!(matches!(err, RenderError::Unsupported("intersection")));

        let ext = tree.external_set("bindings", ["s"]);
        assert!(SparqlRenderer::new().render_select(&tree, ext).is_err());
    }

    #[test]
    fn test_blank_node_constants_are_not_rendered() {
        let mut tree = AlgebraTree::new();
        let b0 = || Var::constant(Term::BlankNode("b0".to_string()));
        let name = tree.pattern(StatementPattern::new(b0(), foaf("name"), Var::new("n")));
        let mbox = tree.pattern(StatementPattern::new(b0(), foaf("mbox"), Var::new("m")));
        let join = tree.join(name, mbox);
        let err = SparqlRenderer::new().render_select(&tree, join).unwrap_err();
        assert!(matches!(err, RenderError::Unsupported("blank node constant")));

        let s = tree.pattern(StatementPattern::new(Var::new("s"), foaf("name"), Var::new("n")));
        let filter = tree.selection(
            s,
            Expression::equal(
                Expression::variable("s"),
                Expression::Constant(Term::BlankNode("b1".to_string())),
            ),
        );
        assert!(SparqlRenderer::new().render_select(&tree, filter).is_err());
    }

    #[test]
    fn test_expressions() {
        let mut out = String::new();
        let expr = Expression::not(Expression::and(
            Expression::bound("x"),
            Expression::binary(
                BinaryOperator::SameTerm,
                Expression::variable("x"),
                Expression::Constant(Term::iri("http://ex.org/a")),
            ),
        ));
        write_expression(&expr, &mut out).unwrap();
        assert_eq!(out, "!((BOUND(?x) && sameTerm(?x, <http://ex.org/a>)))");
    }
}
