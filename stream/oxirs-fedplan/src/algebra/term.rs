//! RDF terms and pattern variables
//!
//! Terms are the constants a statement pattern can be bound to. A [`Var`]
//! occupies one slot of a pattern and is either a query variable (unbound) or
//! a constant (bound to a [`Term`]).

use serde::{Deserialize, Serialize};
use std::fmt;

/// Datatype IRI of boolean literals
pub const XSD_BOOLEAN: &str = "http://www.w3.org/2001/XMLSchema#boolean";

/// IRI (Internationalized Resource Identifier)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Iri(pub String);

impl Iri {
    pub fn new(iri: impl Into<String>) -> Self {
        Iri(iri.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Namespace part of the IRI: everything up to and including the last
    /// `#`, otherwise the last `/`, otherwise the last `:`.
    pub fn namespace(&self) -> &str {
        let split = self
            .0
            .rfind('#')
            .or_else(|| self.0.rfind('/'))
            .or_else(|| self.0.rfind(':'));
        match split {
            Some(idx) => &self.0[..=idx],
            None => "",
        }
    }

    /// Local name following [`Iri::namespace`]
    pub fn local_name(&self) -> &str {
        &self.0[self.namespace().len()..]
    }
}

impl fmt::Display for Iri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{}>", self.0)
    }
}

/// Literal value with optional language tag or datatype
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Literal {
    pub value: String,
    pub language: Option<String>,
    pub datatype: Option<Iri>,
}

impl Literal {
    pub fn simple(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            language: None,
            datatype: None,
        }
    }

    pub fn lang_tagged(value: impl Into<String>, language: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            language: Some(language.into()),
            datatype: None,
        }
    }

    pub fn typed(value: impl Into<String>, datatype: Iri) -> Self {
        Self {
            value: value.into(),
            language: None,
            datatype: Some(datatype),
        }
    }

    pub fn boolean(value: bool) -> Self {
        Self::typed(value.to_string(), Iri::new(XSD_BOOLEAN))
    }

    /// The boolean value of an `xsd:boolean` literal
    pub fn as_boolean(&self) -> Option<bool> {
        match &self.datatype {
            Some(dt) if dt.as_str() == XSD_BOOLEAN => match self.value.as_str() {
                "true" | "1" => Some(true),
                "false" | "0" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("\"")?;
        for c in self.value.chars() {
            match c {
                '"' => f.write_str("\\\"")?,
                '\\' => f.write_str("\\\\")?,
                '\n' => f.write_str("\\n")?,
                '\r' => f.write_str("\\r")?,
                '\t' => f.write_str("\\t")?,
                c => write!(f, "{c}")?,
            }
        }
        f.write_str("\"")?;
        if let Some(lang) = &self.language {
            write!(f, "@{}", lang)?;
        } else if let Some(dt) = &self.datatype {
            write!(f, "^^{}", dt)?;
        }
        Ok(())
    }
}

/// RDF term that can be bound to a pattern slot
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Term {
    Iri(Iri),
    Literal(Literal),
    BlankNode(String),
}

impl Term {
    pub fn iri(iri: impl Into<String>) -> Self {
        Term::Iri(Iri::new(iri))
    }

    pub fn literal(value: impl Into<String>) -> Self {
        Term::Literal(Literal::simple(value))
    }

    pub fn as_iri(&self) -> Option<&Iri> {
        match self {
            Term::Iri(iri) => Some(iri),
            _ => None,
        }
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Term::Iri(iri) => write!(f, "{}", iri),
            Term::Literal(lit) => write!(f, "{}", lit),
            Term::BlankNode(id) => write!(f, "_:{}", id),
        }
    }
}

impl From<Iri> for Term {
    fn from(iri: Iri) -> Self {
        Term::Iri(iri)
    }
}

impl From<Literal> for Term {
    fn from(literal: Literal) -> Self {
        Term::Literal(literal)
    }
}

/// A slot of a statement pattern
///
/// A bound `Var` behaves as a constant; an unbound one is a query variable
/// that contributes its name to the binding set of the pattern.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Var {
    name: String,
    value: Option<Term>,
    anonymous: bool,
}

impl Var {
    /// Named, unbound query variable
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: None,
            anonymous: false,
        }
    }

    /// Constant slot
    pub fn constant(value: impl Into<Term>) -> Self {
        let value = value.into();
        Self {
            name: format!("_const_{}", const_suffix(&value)),
            value: Some(value),
            anonymous: true,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> Option<&Term> {
        self.value.as_ref()
    }

    pub fn is_bound(&self) -> bool {
        self.value.is_some()
    }

    pub fn is_anonymous(&self) -> bool {
        self.anonymous
    }
}

impl fmt::Display for Var {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.value {
            Some(value) => write!(f, "{}", value),
            None => write!(f, "?{}", self.name),
        }
    }
}

fn const_suffix(term: &Term) -> String {
    let raw = match term {
        Term::Iri(iri) => iri.local_name(),
        Term::Literal(lit) => lit.value.as_str(),
        Term::BlankNode(id) => id.as_str(),
    };
    raw.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}
