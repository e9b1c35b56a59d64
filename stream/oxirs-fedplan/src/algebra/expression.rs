//! Value expressions used as selection and left-join conditions

use super::term::{Literal, Term};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Condition expression
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Expression {
    /// Constant term
    Constant(Term),
    /// Variable reference
    Variable(String),
    /// Bound variable check
    Bound(String),
    /// Binary operation
    Binary {
        op: BinaryOperator,
        left: Box<Expression>,
        right: Box<Expression>,
    },
    /// Logical negation
    Not(Box<Expression>),
    /// Function call, either a builtin name or a function IRI
    Function { name: String, args: Vec<Expression> },
}

/// Binary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinaryOperator {
    And,
    Or,
    Equal,
    NotEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    SameTerm,
}

impl BinaryOperator {
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOperator::And => "&&",
            BinaryOperator::Or => "||",
            BinaryOperator::Equal => "=",
            BinaryOperator::NotEqual => "!=",
            BinaryOperator::Less => "<",
            BinaryOperator::LessEqual => "<=",
            BinaryOperator::Greater => ">",
            BinaryOperator::GreaterEqual => ">=",
            BinaryOperator::SameTerm => "sameTerm",
        }
    }
}

impl Expression {
    pub fn boolean(value: bool) -> Self {
        Expression::Constant(Term::Literal(Literal::boolean(value)))
    }

    pub fn variable(name: impl Into<String>) -> Self {
        Expression::Variable(name.into())
    }

    pub fn bound(name: impl Into<String>) -> Self {
        Expression::Bound(name.into())
    }

    pub fn binary(op: BinaryOperator, left: Expression, right: Expression) -> Self {
        Expression::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn and(left: Expression, right: Expression) -> Self {
        Self::binary(BinaryOperator::And, left, right)
    }

    pub fn or(left: Expression, right: Expression) -> Self {
        Self::binary(BinaryOperator::Or, left, right)
    }

    pub fn equal(left: Expression, right: Expression) -> Self {
        Self::binary(BinaryOperator::Equal, left, right)
    }

    pub fn not(expr: Expression) -> Self {
        Expression::Not(Box::new(expr))
    }

    /// Folds the expression to a boolean constant when it does not depend on
    /// any binding.
    ///
    /// `&&` and `||` short-circuit: `false && ?x` is constant-false even
    /// though the right operand is not constant.
    pub fn as_boolean_constant(&self) -> Option<bool> {
        match self {
            Expression::Constant(Term::Literal(lit)) => lit.as_boolean(),
            Expression::Not(inner) => inner.as_boolean_constant().map(|b| !b),
            Expression::Binary {
                op: BinaryOperator::And,
                left,
                right,
            } => match (left.as_boolean_constant(), right.as_boolean_constant()) {
                (Some(false), _) | (_, Some(false)) => Some(false),
                (Some(true), Some(true)) => Some(true),
                _ => None,
            },
            Expression::Binary {
                op: BinaryOperator::Or,
                left,
                right,
            } => match (left.as_boolean_constant(), right.as_boolean_constant()) {
                (Some(true), _) | (_, Some(true)) => Some(true),
                (Some(false), Some(false)) => Some(false),
                _ => None,
            },
            _ => None,
        }
    }

    /// Formats using the SPARQL S-Expression syntax
    pub fn fmt_sse(&self, f: &mut impl fmt::Write) -> fmt::Result {
        match self {
            Expression::Constant(term) => write!(f, "{term}"),
            Expression::Variable(name) => write!(f, "?{name}"),
            Expression::Bound(name) => write!(f, "(bound ?{name})"),
            Expression::Binary { op, left, right } => {
                write!(f, "({} ", op.symbol())?;
                left.fmt_sse(f)?;
                f.write_str(" ")?;
                right.fmt_sse(f)?;
                f.write_str(")")
            }
            Expression::Not(inner) => {
                f.write_str("(! ")?;
                inner.fmt_sse(f)?;
                f.write_str(")")
            }
            Expression::Function { name, args } => {
                write!(f, "({name}")?;
                for arg in args {
                    f.write_str(" ")?;
                    arg.fmt_sse(f)?;
                }
                f.write_str(")")
            }
        }
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.fmt_sse(f)
    }
}
