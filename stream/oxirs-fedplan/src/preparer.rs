//! Push-down Preparation
//!
//! Final pass over the ownership markers left after pruning. A marker is
//! prepared when its whole argument can be shipped to the owner as one
//! remote query; otherwise the executor decomposes it into primitive calls.

use crate::algebra::{AlgebraNode, AlgebraTree, NodeId, RemoteQuery};
use crate::member::{Member, ProtocolVersion, QueryLanguage};
use crate::sparql::SparqlRenderer;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

/// Counters of one preparation run
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrepareStats {
    pub markers: usize,
    pub prepared: usize,
    pub remote_queries: usize,
}

/// Flags ownership markers eligible for push-down
pub struct PlanPreparer<'a> {
    members: &'a [Arc<dyn Member>],
    protocol: ProtocolVersion,
    render_queries: bool,
}

impl<'a> PlanPreparer<'a> {
    pub fn new(members: &'a [Arc<dyn Member>], protocol: ProtocolVersion) -> Self {
        Self {
            members,
            protocol,
            render_queries: true,
        }
    }

    /// Attaches SPARQL text to prepared markers of SPARQL members
    pub fn with_remote_queries(mut self, enabled: bool) -> Self {
        self.render_queries = enabled;
        self
    }

    /// Sets the `prepared` flag of every reachable marker
    pub fn prepare(&self, tree: &mut AlgebraTree) -> PrepareStats {
        let mut stats = PrepareStats::default();
        if !tree.has_root() {
            return stats;
        }
        let markers: Vec<NodeId> = tree
            .subtree_ids(tree.root())
            .into_iter()
            .filter(|&id| tree.node(id).as_owned().is_some())
            .collect();

        for marker in markers {
            stats.markers += 1;
            let (prepared, remote_query) = self.prepare_marker(tree, marker);
            if prepared {
                stats.prepared += 1;
            }
            if remote_query.is_some() {
                stats.remote_queries += 1;
            }
            if let AlgebraNode::OwnedTupleExpr(owned) = tree.node_mut(marker) {
                owned.prepared = prepared;
                owned.remote_query = remote_query;
            }
        }
        debug!(
            "Prepared {} of {} markers, {} with remote queries",
            stats.prepared, stats.markers, stats.remote_queries
        );
        stats
    }

    fn prepare_marker(&self, tree: &AlgebraTree, marker: NodeId) -> (bool, Option<RemoteQuery>) {
        let Some(owned) = tree.node(marker).as_owned() else {
            return (false, None);
        };
        let arg = owned.arg;

        if matches!(tree.node(arg), AlgebraNode::StatementPattern(_))
            || tree.binding_names(arg).is_empty()
            || tree.any_in_subtree(arg, |node| matches!(node, AlgebraNode::ExternalSet { .. }))
        {
            return (false, None);
        }

        let Some(member) = self.members.iter().find(|m| *m.id() == owned.owner) else {
            warn!("Marker {} names unknown member {}", marker, owned.owner);
            return (false, None);
        };
        let metadata = member.protocol_metadata();
        if metadata.version.major != self.protocol.major
            || metadata.version.minor != self.protocol.minor
        {
            debug!(
                "Member {} speaks protocol {}, coordinator {}; not preparing {}",
                owned.owner, metadata.version, self.protocol, marker
            );
            return (false, None);
        }

        if !self.render_queries || !metadata.supports(QueryLanguage::Sparql) {
            return (true, None);
        }
        match SparqlRenderer::new().render_select(tree, arg) {
            Ok(query) => (
                true,
                Some(RemoteQuery {
                    language: QueryLanguage::Sparql,
                    text: query.text,
                    bindings: query.bindings,
                }),
            ),
            Err(e) => {
                debug!("No remote query for {}: {}", marker, e);
                (true, None)
            }
        }
    }
}
