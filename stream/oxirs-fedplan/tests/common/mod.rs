//! Shared fixtures for the integration tests
//!
//! Besides term helpers this holds a small reference evaluator with set
//! semantics. A plan is evaluated against the union of all members' data,
//! except below an ownership marker, where only the owner's statements are
//! visible.

#![allow(dead_code)]

use oxirs_fedplan::{
    AlgebraNode, AlgebraTree, BinaryOperator, ContextScope, Expression, Literal, Member,
    MemoryMember, NodeId, Quad, StatementPattern, Term, Var,
};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

pub const EX: &str = "http://ex.org/";
pub const FOAF: &str = "http://xmlns.com/foaf/0.1/";

pub fn ex(local: &str) -> Term {
    Term::iri(format!("{EX}{local}"))
}

pub fn foaf(local: &str) -> Term {
    Term::iri(format!("{FOAF}{local}"))
}

/// Constant FOAF predicate slot
pub fn fp(local: &str) -> Var {
    Var::constant(foaf(local))
}

/// Constant slot in the `ex:` namespace
pub fn c(local: &str) -> Var {
    Var::constant(ex(local))
}

pub fn v(name: &str) -> Var {
    Var::new(name)
}

pub fn sp(s: Var, p: Var, o: Var) -> StatementPattern {
    StatementPattern::new(s, p, o)
}

pub fn triple(s: Term, p: Term, o: Term) -> Quad {
    Quad::triple(s, p, o)
}

pub fn as_members(members: &[Arc<MemoryMember>]) -> Vec<Arc<dyn Member>> {
    members
        .iter()
        .map(|m| Arc::clone(m) as Arc<dyn Member>)
        .collect()
}

/// Member A holds `(s1, p1, o1)`, member B holds `(s2, p1, o2)`
pub fn disjoint_members() -> Vec<Arc<MemoryMember>> {
    vec![
        Arc::new(MemoryMember::new("A").with_quads([triple(ex("s1"), ex("p1"), ex("o1"))])),
        Arc::new(MemoryMember::new("B").with_quads([triple(ex("s2"), ex("p1"), ex("o2"))])),
    ]
}

/// Solution mapping
pub type Row = BTreeMap<String, Term>;

/// Evaluates the plan rooted at the tree's root
pub fn evaluate(tree: &AlgebraTree, members: &[Arc<MemoryMember>]) -> BTreeSet<Row> {
    eval(tree, tree.root(), members, None)
}

fn eval(
    tree: &AlgebraTree,
    id: NodeId,
    members: &[Arc<MemoryMember>],
    scope: Option<&MemoryMember>,
) -> BTreeSet<Row> {
    match tree.node(id) {
        AlgebraNode::StatementPattern(pattern) => {
            let quads: Vec<&Quad> = match scope {
                Some(member) => member.quads().iter().collect(),
                None => members.iter().flat_map(|m| m.quads()).collect(),
            };
            quads
                .into_iter()
                .filter_map(|quad| match_quad(pattern, quad))
                .collect()
        }
        AlgebraNode::Join { left, right } => join(
            &eval(tree, *left, members, scope),
            &eval(tree, *right, members, scope),
        ),
        AlgebraNode::NaryJoin { args } => {
            let mut acc: BTreeSet<Row> = [Row::new()].into_iter().collect();
            for arg in args {
                acc = join(&acc, &eval(tree, *arg, members, scope));
            }
            acc
        }
        AlgebraNode::LeftJoin {
            left,
            right,
            condition,
        } => {
            let rights = eval(tree, *right, members, scope);
            let mut out = BTreeSet::new();
            for l in eval(tree, *left, members, scope) {
                let mut extended = false;
                for r in &rights {
                    if let Some(merged) = merge(&l, r) {
                        if condition.as_ref().map_or(true, |c| truth(c, &merged) == Some(true)) {
                            out.insert(merged);
                            extended = true;
                        }
                    }
                }
                if !extended {
                    out.insert(l);
                }
            }
            out
        }
        AlgebraNode::Union { left, right } => {
            let mut out = eval(tree, *left, members, scope);
            out.extend(eval(tree, *right, members, scope));
            out
        }
        AlgebraNode::Difference { left, right } => {
            let rights = eval(tree, *right, members, scope);
            eval(tree, *left, members, scope)
                .into_iter()
                .filter(|l| rights.iter().all(|r| merge(l, r).is_none()))
                .collect()
        }
        AlgebraNode::Intersection { left, right } => {
            let rights = eval(tree, *right, members, scope);
            eval(tree, *left, members, scope)
                .into_iter()
                .filter(|l| rights.contains(l))
                .collect()
        }
        AlgebraNode::Projection { arg, elements } => eval(tree, *arg, members, scope)
            .into_iter()
            .map(|row| {
                elements
                    .iter()
                    .filter_map(|e| row.get(&e.source).map(|t| (e.target.clone(), t.clone())))
                    .collect()
            })
            .collect(),
        AlgebraNode::Selection { arg, condition } => eval(tree, *arg, members, scope)
            .into_iter()
            .filter(|row| truth(condition, row) == Some(true))
            .collect(),
        AlgebraNode::RowSelection { arg, offset, limit } => eval(tree, *arg, members, scope)
            .into_iter()
            .skip(offset.unwrap_or(0) as usize)
            .take(limit.map_or(usize::MAX, |l| l as usize))
            .collect(),
        AlgebraNode::EmptySet => BTreeSet::new(),
        AlgebraNode::SingletonSet => [Row::new()].into_iter().collect(),
        AlgebraNode::OwnedTupleExpr(owned) => {
            let owner = members
                .iter()
                .find(|m| *m.id() == owned.owner)
                .unwrap_or_else(|| panic!("unknown owner {}", owned.owner));
            eval(tree, owned.arg, members, Some(owner.as_ref()))
        }
        AlgebraNode::ExternalSet { name, .. } => panic!("cannot evaluate external set {name}"),
    }
}

fn match_quad(pattern: &StatementPattern, quad: &Quad) -> Option<Row> {
    let mut row = Row::new();
    if !bind(&mut row, &pattern.subject, &quad.subject)
        || !bind(&mut row, &pattern.predicate, &quad.predicate)
        || !bind(&mut row, &pattern.object, &quad.object)
    {
        return None;
    }
    let context_ok = match (&pattern.context, &quad.context) {
        (Some(var), Some(ctx)) => bind(&mut row, var, ctx),
        (Some(_), None) => false,
        (None, ctx) => match pattern.scope {
            ContextScope::AllContexts => true,
            ContextScope::NullContext => ctx.is_none(),
            ContextScope::NamedContexts => ctx.is_some(),
        },
    };
    context_ok.then_some(row)
}

fn bind(row: &mut Row, var: &Var, term: &Term) -> bool {
    if let Some(value) = var.value() {
        return value == term;
    }
    match row.get(var.name()) {
        Some(existing) => existing == term,
        None => {
            row.insert(var.name().to_string(), term.clone());
            true
        }
    }
}

fn merge(left: &Row, right: &Row) -> Option<Row> {
    let mut merged = left.clone();
    for (name, term) in right {
        match merged.get(name) {
            Some(existing) if existing != term => return None,
            Some(_) => {}
            None => {
                merged.insert(name.clone(), term.clone());
            }
        }
    }
    Some(merged)
}

fn join(left: &BTreeSet<Row>, right: &BTreeSet<Row>) -> BTreeSet<Row> {
    left.iter()
        .flat_map(|l| right.iter().filter_map(move |r| merge(l, r)))
        .collect()
}

fn truth(expr: &Expression, row: &Row) -> Option<bool> {
    match expr {
        Expression::Constant(Term::Literal(lit)) => lit.as_boolean(),
        Expression::Constant(_) | Expression::Variable(_) | Expression::Function { .. } => None,
        Expression::Bound(name) => Some(row.contains_key(name)),
        Expression::Not(inner) => truth(inner, row).map(|b| !b),
        Expression::Binary {
            op: BinaryOperator::And,
            left,
            right,
        } => match (truth(left, row), truth(right, row)) {
            (Some(false), _) | (_, Some(false)) => Some(false),
            (Some(true), Some(true)) => Some(true),
            _ => None,
        },
        Expression::Binary {
            op: BinaryOperator::Or,
            left,
            right,
        } => match (truth(left, row), truth(right, row)) {
            (Some(true), _) | (_, Some(true)) => Some(true),
            (Some(false), Some(false)) => Some(false),
            _ => None,
        },
        Expression::Binary { op, left, right } => {
            let (a, b) = (value(left, row)?, value(right, row)?);
            match op {
                BinaryOperator::Equal | BinaryOperator::SameTerm => Some(a == b),
                BinaryOperator::NotEqual => Some(a != b),
                BinaryOperator::Less => Some(a < b),
                BinaryOperator::LessEqual => Some(a <= b),
                BinaryOperator::Greater => Some(a > b),
                BinaryOperator::GreaterEqual => Some(a >= b),
                BinaryOperator::And | BinaryOperator::Or => None,
            }
        }
    }
}

fn value(expr: &Expression, row: &Row) -> Option<Term> {
    match expr {
        Expression::Constant(term) => Some(term.clone()),
        Expression::Variable(name) => row.get(name).cloned(),
        other => truth(other, row).map(|b| Term::Literal(Literal::boolean(b))),
    }
}
