//! Federation members
//!
//! A member is one autonomous data source of the federation. The planner only
//! ever talks to it through the narrow, read-only [`Member`] trait: a
//! statement-existence probe and the protocol metadata it advertises.
//! [`MemoryMember`] is an in-memory implementation backed by a quad list.

use crate::algebra::Term;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Stable identifier of a federation member
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MemberId(String);

impl MemberId {
    pub fn new(id: impl Into<String>) -> Self {
        MemberId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MemberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for MemberId {
    fn from(id: &str) -> Self {
        MemberId::new(id)
    }
}

impl From<String> for MemberId {
    fn from(id: String) -> Self {
        MemberId(id)
    }
}

/// Query languages a member can evaluate remotely
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum QueryLanguage {
    Sparql,
    Serql,
}

/// Remote protocol version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProtocolVersion {
    pub major: u32,
    pub minor: u32,
}

impl ProtocolVersion {
    pub const fn new(major: u32, minor: u32) -> Self {
        Self { major, minor }
    }
}

impl Default for ProtocolVersion {
    fn default() -> Self {
        Self::new(1, 0)
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// Metadata a member advertises about its remote protocol
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolMetadata {
    pub version: ProtocolVersion,
    pub languages: BTreeSet<QueryLanguage>,
}

impl ProtocolMetadata {
    pub fn new(
        version: ProtocolVersion,
        languages: impl IntoIterator<Item = QueryLanguage>,
    ) -> Self {
        Self {
            version,
            languages: languages.into_iter().collect(),
        }
    }

    pub fn supports(&self, language: QueryLanguage) -> bool {
        self.languages.contains(&language)
    }
}

impl Default for ProtocolMetadata {
    fn default() -> Self {
        Self::new(ProtocolVersion::default(), [QueryLanguage::Sparql])
    }
}

/// A participant of the federation
///
/// Implementations are shared between concurrently planned queries, so they
/// must be `Send + Sync`; probes are read-only. Timeouts and cancellation
/// belong to the implementation: an aborted probe is reported as an error.
pub trait Member: Send + Sync {
    /// Identifier recorded in ownership markers
    fn id(&self) -> &MemberId;

    /// Whether the member holds at least one statement matching the given
    /// terms. `None` matches anything; an empty `contexts` slice matches
    /// statements in any context.
    fn has_statement(
        &self,
        subject: Option<&Term>,
        predicate: Option<&Term>,
        object: Option<&Term>,
        include_inferred: bool,
        contexts: &[Term],
    ) -> anyhow::Result<bool>;

    /// Protocol version and query languages the member understands
    fn protocol_metadata(&self) -> ProtocolMetadata;
}

/// A stored statement
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Quad {
    pub subject: Term,
    pub predicate: Term,
    pub object: Term,
    pub context: Option<Term>,
}

impl Quad {
    pub fn triple(subject: Term, predicate: Term, object: Term) -> Self {
        Self {
            subject,
            predicate,
            object,
            context: None,
        }
    }

    pub fn in_context(mut self, context: Term) -> Self {
        self.context = Some(context);
        self
    }

    fn matches(
        &self,
        subject: Option<&Term>,
        predicate: Option<&Term>,
        object: Option<&Term>,
        contexts: &[Term],
    ) -> bool {
        subject.map_or(true, |s| *s == self.subject)
            && predicate.map_or(true, |p| *p == self.predicate)
            && object.map_or(true, |o| *o == self.object)
            && (contexts.is_empty()
                || self
                    .context
                    .as_ref()
                    .is_some_and(|c| contexts.contains(c)))
    }
}

/// In-memory member holding a fixed set of quads
#[derive(Debug)]
pub struct MemoryMember {
    id: MemberId,
    quads: Vec<Quad>,
    metadata: ProtocolMetadata,
    probes: AtomicUsize,
}

impl MemoryMember {
    pub fn new(id: impl Into<MemberId>) -> Self {
        Self {
            id: id.into(),
            quads: Vec::new(),
            metadata: ProtocolMetadata::default(),
            probes: AtomicUsize::new(0),
        }
    }

    pub fn with_metadata(mut self, metadata: ProtocolMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_quads(mut self, quads: impl IntoIterator<Item = Quad>) -> Self {
        self.quads.extend(quads);
        self
    }

    pub fn insert(&mut self, quad: Quad) {
        self.quads.push(quad);
    }

    pub fn quads(&self) -> &[Quad] {
        &self.quads
    }

    /// Number of `has_statement` calls served so far
    pub fn probe_count(&self) -> usize {
        self.probes.load(Ordering::Relaxed)
    }
}

impl Member for MemoryMember {
    fn id(&self) -> &MemberId {
        &self.id
    }

    fn has_statement(
        &self,
        subject: Option<&Term>,
        predicate: Option<&Term>,
        object: Option<&Term>,
        _include_inferred: bool,
        contexts: &[Term],
    ) -> anyhow::Result<bool> {
        self.probes.fetch_add(1, Ordering::Relaxed);
        Ok(self
            .quads
            .iter()
            .any(|q| q.matches(subject, predicate, object, contexts)))
    }

    fn protocol_metadata(&self) -> ProtocolMetadata {
        self.metadata.clone()
    }
}
