//! Ownership Analysis
//!
//! Decides which member, if any, can answer a subtree on its own. Two scans
//! are offered:
//!
//! - [`OwnershipAnalyzer::single_owner`] probes every member for every
//!   statement pattern of the subtree and reports the one member that
//!   holds all of the matching data;
//! - [`OwnershipAnalyzer::local_subject`] checks that the subtree is a star
//!   around one subject variable over predicates from the configured local
//!   namespaces, whose statements are stored next to their subject.
//!
//! Probes with identical terms are issued once per analyzer.

use crate::algebra::{AlgebraNode, AlgebraTree, NodeId, StatementPattern, Term, Var};
use crate::error::{FederationError, Result};
use crate::member::{Member, MemberId};
use rayon::prelude::*;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::trace;

/// Terms sent to a member by `has_statement`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct Probe {
    subject: Option<Term>,
    predicate: Option<Term>,
    object: Option<Term>,
    contexts: Vec<Term>,
}

impl Probe {
    fn of(pattern: &StatementPattern) -> Self {
        Self {
            subject: pattern.subject.value().cloned(),
            predicate: pattern.predicate.value().cloned(),
            object: pattern.object.value().cloned(),
            contexts: pattern
                .context
                .as_ref()
                .and_then(|ctx| ctx.value().cloned())
                .into_iter()
                .collect(),
        }
    }

    fn ask(&self, member: &dyn Member) -> Result<bool> {
        member
            .has_statement(
                self.subject.as_ref(),
                self.predicate.as_ref(),
                self.object.as_ref(),
                true,
                &self.contexts,
            )
            .map_err(|e| FederationError::probe(member.id(), e))
    }
}

/// Accumulated usage of a subtree's patterns, by member index
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OwnerScan {
    /// No member matched any pattern so far
    Unused,
    /// Exactly this member matched every used pattern
    Owned(usize),
    /// Two different members matched; final for the scan
    Shared,
}

impl OwnerScan {
    fn record(self, member: usize) -> Self {
        match self {
            OwnerScan::Unused => OwnerScan::Owned(member),
            OwnerScan::Owned(owner) if owner == member => self,
            OwnerScan::Owned(_) | OwnerScan::Shared => OwnerScan::Shared,
        }
    }
}

/// Ownership analysis over a fixed member list
pub struct OwnershipAnalyzer<'a> {
    members: &'a [Arc<dyn Member>],
    local_namespaces: &'a HashSet<String>,
    parallel: bool,
    memo: HashMap<Probe, Vec<bool>>,
    probes_issued: usize,
}

impl<'a> OwnershipAnalyzer<'a> {
    pub fn new(members: &'a [Arc<dyn Member>], local_namespaces: &'a HashSet<String>) -> Self {
        Self {
            members,
            local_namespaces,
            parallel: false,
            memo: HashMap::new(),
            probes_issued: 0,
        }
    }

    /// Fans the probes of one pattern out across members
    pub fn with_parallel_probes(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn members(&self) -> &'a [Arc<dyn Member>] {
        self.members
    }

    /// Number of `has_statement` calls sent to members so far
    pub fn probes_issued(&self) -> usize {
        self.probes_issued
    }

    /// Ids of the members holding at least one statement matching `pattern`
    pub fn matching_members(&mut self, pattern: &StatementPattern) -> Result<Vec<MemberId>> {
        let answers = self.probe_all(pattern)?;
        Ok(self
            .members
            .iter()
            .zip(answers)
            .filter(|(_, found)| *found)
            .map(|(member, _)| member.id().clone())
            .collect())
    }

    /// The member that alone holds all data matching the subtree's patterns.
    ///
    /// `None` when two members share the data or when no member matches at
    /// all.
    pub fn single_owner(&mut self, tree: &AlgebraTree, id: NodeId) -> Result<Option<MemberId>> {
        match self.scan(tree, id, OwnerScan::Unused)? {
            OwnerScan::Owned(index) => Ok(Some(self.members[index].id().clone())),
            OwnerScan::Unused | OwnerScan::Shared => Ok(None),
        }
    }

    fn scan(&mut self, tree: &AlgebraTree, id: NodeId, mut acc: OwnerScan) -> Result<OwnerScan> {
        if acc == OwnerScan::Shared {
            return Ok(acc);
        }
        match tree.node(id) {
            AlgebraNode::StatementPattern(sp) => {
                let answers = self.probe_all(sp)?;
                for (index, _) in answers.iter().enumerate().filter(|(_, found)| **found) {
                    acc = acc.record(index);
                }
                Ok(acc)
            }
            node => {
                for child in node.children() {
                    acc = self.scan(tree, child, acc)?;
                }
                Ok(acc)
            }
        }
    }

    /// One answer per member, in member order
    fn probe_all(&mut self, pattern: &StatementPattern) -> Result<Vec<bool>> {
        let probe = Probe::of(pattern);
        if let Some(answers) = self.memo.get(&probe) {
            return Ok(answers.clone());
        }

        let answers: Vec<bool> = if self.parallel {
            let results: Vec<Result<bool>> = self
                .members
                .par_iter()
                .map(|member| probe.ask(member.as_ref()))
                .collect();
            results.into_iter().collect::<Result<_>>()?
        } else {
            self.members
                .iter()
                .map(|member| probe.ask(member.as_ref()))
                .collect::<Result<_>>()?
        };
        self.probes_issued += self.members.len();
        trace!(
            "Probed {} members for {:?} {:?} {:?}: {:?}",
            self.members.len(),
            probe.subject,
            probe.predicate,
            probe.object,
            answers
        );

        self.memo.insert(probe, answers.clone());
        Ok(answers)
    }

    /// The unbound subject variable shared by every pattern of the subtree,
    /// provided every predicate lives in a local namespace.
    ///
    /// Returns `None` as well for subtrees that cannot be evaluated member by
    /// member and merged: those containing a singleton, a slice, an external
    /// source or an ownership marker, and those projecting the subject away.
    pub fn local_subject(&self, tree: &AlgebraTree, id: NodeId) -> Option<Var> {
        let mut subject: Option<&Var> = None;
        let mut projections = Vec::new();

        for node_id in tree.subtree_ids(id) {
            match tree.node(node_id) {
                AlgebraNode::StatementPattern(sp) => {
                    if sp.subject.is_bound() || !self.is_local_predicate(&sp.predicate) {
                        return None;
                    }
                    match subject {
                        None => subject = Some(&sp.subject),
                        Some(s) if s.name() == sp.subject.name() => {}
                        Some(_) => return None,
                    }
                }
                AlgebraNode::Projection { elements, .. } => projections.push(elements),
                AlgebraNode::Join { .. }
                | AlgebraNode::NaryJoin { .. }
                | AlgebraNode::LeftJoin { .. }
                | AlgebraNode::Union { .. }
                | AlgebraNode::Difference { .. }
                | AlgebraNode::Intersection { .. }
                | AlgebraNode::Selection { .. }
                | AlgebraNode::EmptySet => {}
                AlgebraNode::SingletonSet
                | AlgebraNode::RowSelection { .. }
                | AlgebraNode::OwnedTupleExpr(_)
                | AlgebraNode::ExternalSet { .. } => return None,
            }
        }

        let subject = subject?;
        let keeps_subject = projections.iter().all(|elements| {
            elements
                .iter()
                .any(|e| e.source == subject.name() && e.target == subject.name())
        });
        keeps_subject.then(|| subject.clone())
    }

    /// Whether `predicate` is a constant IRI in a local namespace
    pub fn is_local_predicate(&self, predicate: &Var) -> bool {
        predicate
            .value()
            .and_then(Term::as_iri)
            .is_some_and(|iri| {
                let namespace = iri.namespace();
                self.local_namespaces
                    .iter()
                    .any(|prefix| namespace.starts_with(prefix.as_str()))
            })
    }
}
